//! Download tasks, their work items and per-item outcomes

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One thing to download: a beatmap checksum or an already known content id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkItem {
    Checksum(String),
    ContentId(i32),
}

impl WorkItem {
    pub fn checksum(&self) -> Option<&str> {
        match self {
            Self::Checksum(checksum) => Some(checksum),
            Self::ContentId(_) => None,
        }
    }

    pub fn content_id(&self) -> Option<i32> {
        match self {
            Self::Checksum(_) => None,
            Self::ContentId(id) => Some(*id),
        }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Checksum(checksum) => f.write_str(checksum),
            Self::ContentId(id) => write!(f, "#{id}"),
        }
    }
}

impl From<i32> for WorkItem {
    fn from(id: i32) -> Self {
        Self::ContentId(id)
    }
}

impl From<&str> for WorkItem {
    fn from(checksum: &str) -> Self {
        Self::Checksum(checksum.to_string())
    }
}

impl From<String> for WorkItem {
    fn from(checksum: String) -> Self {
        Self::Checksum(checksum)
    }
}

/// A batch of work items submitted together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTask {
    /// Unique among queued tasks
    pub id: String,
    /// Display name, usually the collection name
    pub name: String,
    pub items: Vec<WorkItem>,
}

impl DownloadTask {
    pub fn new(id: impl Into<String>, items: impl IntoIterator<Item = WorkItem>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            items: items.into_iter().collect(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Waiting,
    InProgress,
    Finished,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Waiting => "waiting",
            Self::InProgress => "in progress",
            Self::Finished => "finished",
            Self::Cancelled => "cancelled",
        })
    }
}

/// How a single item ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Archive fetched and written
    Downloaded { content_id: i32, path: PathBuf },
    /// Archive already on disk, nothing fetched
    Skipped { content_id: i32 },
    Failed { reason: String },
}

/// Terminal state of one item of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStatus {
    /// Position in the task's item list
    pub index: usize,
    pub item: WorkItem,
    pub outcome: ItemOutcome,
}

impl ItemStatus {
    pub fn is_success(&self) -> bool {
        !matches!(self.outcome, ItemOutcome::Failed { .. })
    }

    pub fn content_id(&self) -> Option<i32> {
        match &self.outcome {
            ItemOutcome::Downloaded { content_id, .. } | ItemOutcome::Skipped { content_id } => {
                Some(*content_id)
            }
            ItemOutcome::Failed { .. } => self.item.content_id(),
        }
    }
}

/// Queue snapshot row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: String,
    pub name: String,
    pub status: TaskStatus,
    pub completed: usize,
    pub total: usize,
}
