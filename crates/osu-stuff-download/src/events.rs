//! Events emitted while tasks are queued and processed

use serde::{Deserialize, Serialize};

use crate::task::ItemStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum DownloadEvent {
    /// A task was accepted into the queue
    DownloadCreate { task_id: String, name: String },
    /// An item reached a terminal state
    ProgressUpdate {
        task_id: String,
        /// Items finished so far, never decreases within a task
        completed: usize,
        total: usize,
        item: ItemStatus,
    },
    /// Sent once per task after all of its workers exited
    ProgressEnd {
        task_id: String,
        name: String,
        success: bool,
    },
}

impl DownloadEvent {
    pub fn task_id(&self) -> &str {
        match self {
            Self::DownloadCreate { task_id, .. }
            | Self::ProgressUpdate { task_id, .. }
            | Self::ProgressEnd { task_id, .. } => task_id,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Self::ProgressEnd { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_shape() {
        let event = DownloadEvent::ProgressEnd {
            task_id: "t".to_string(),
            name: "n".to_string(),
            success: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "progress-end");
        assert_eq!(json["success"], false);
        assert!(event.is_end());
        assert_eq!(event.task_id(), "t");
    }
}
