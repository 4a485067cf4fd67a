//! Catalog bound to the buffer it was read from

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::{CatalogFile, DecodeOptions};
use crate::error::Result;

/// Catalog shared between the library owner and download workers
pub type SharedCatalog = Arc<RwLock<CatalogFile>>;

/// Original catalog bytes plus the decoded view, decoded at most once
#[derive(Debug)]
pub struct CatalogDatabase {
    buffer: Vec<u8>,
    options: DecodeOptions,
    decoded: Option<SharedCatalog>,
}

impl CatalogDatabase {
    pub fn new(buffer: Vec<u8>) -> Self {
        Self {
            buffer,
            options: DecodeOptions::default(),
            decoded: None,
        }
    }

    /// Read the catalog file into memory without decoding it
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let buffer = std::fs::read(path)?;
        debug!(path = %path.display(), bytes = buffer.len(), "Read catalog file");
        Ok(Self::new(buffer))
    }

    #[must_use]
    pub fn with_options(mut self, options: DecodeOptions) -> Self {
        self.options = options;
        self
    }

    /// Original bytes
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn is_decoded(&self) -> bool {
        self.decoded.is_some()
    }

    /// Decode on first call; later calls hand back the same catalog
    pub fn decode(&mut self) -> Result<SharedCatalog> {
        if let Some(catalog) = &self.decoded {
            return Ok(Arc::clone(catalog));
        }
        let catalog = Arc::new(RwLock::new(CatalogFile::decode_with(
            &self.buffer,
            self.options,
        )?));
        self.decoded = Some(Arc::clone(&catalog));
        Ok(catalog)
    }

    /// Encode the current catalog state against the original bytes
    ///
    /// Before decoding this writes the original bytes unchanged.
    pub fn encode<W: Write>(&self, output: &mut W) -> Result<usize> {
        match &self.decoded {
            Some(catalog) => catalog.read().encode(&self.buffer, output),
            None => {
                output.write_all(&self.buffer)?;
                Ok(self.buffer.len())
            }
        }
    }

    /// Encode to `path`, going through a sibling temporary file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let mut bytes = Vec::with_capacity(self.buffer.len());
        let written = self.encode(&mut bytes)?;

        let tmp = path.with_extension("db.tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), bytes = written, "Saved catalog file");
        Ok(written)
    }
}
