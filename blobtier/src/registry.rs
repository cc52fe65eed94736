//! Registry mapping backend kinds to their constructors

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::error::BlobError;
use crate::io::{Backend, BackendKind, FileBackend, MemoryBackend};

/// Type for backend constructors
pub type BackendFactory = Box<dyn Fn() -> io::Result<Box<dyn Backend>> + Send + Sync>;

/// Registry mapping backend kinds to the functions that build them
pub struct BackendRegistry {
    factories: HashMap<BackendKind, BackendFactory>,
}

impl BackendRegistry {
    /// Empty registry; every `create` fails until kinds are registered
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the in-memory backend and a file backend spooling
    /// into `spool_dir`
    #[must_use]
    pub fn with_defaults(spool_dir: PathBuf) -> Self {
        let mut registry = Self::new();
        registry.register(BackendKind::Memory, || {
            Ok(Box::new(MemoryBackend::new()) as Box<dyn Backend>)
        });
        registry.register(BackendKind::File, move || {
            Ok(Box::new(FileBackend::new_in(&spool_dir)?) as Box<dyn Backend>)
        });
        registry
    }

    /// Register a constructor, replacing any previous one for `kind`
    pub fn register<F>(&mut self, kind: BackendKind, factory: F)
    where
        F: Fn() -> io::Result<Box<dyn Backend>> + Send + Sync + 'static,
    {
        self.factories.insert(kind, Box::new(factory));
    }

    #[must_use]
    pub fn contains(&self, kind: BackendKind) -> bool {
        self.factories.contains_key(&kind)
    }

    /// Build a fresh, empty backend of `kind`
    ///
    /// # Errors
    ///
    /// Returns `BlobError::Construction` if the kind is not registered or
    /// its constructor fails.
    pub fn create(&self, kind: BackendKind) -> Result<Box<dyn Backend>, BlobError> {
        let factory = self.factories.get(&kind).ok_or_else(|| BlobError::Construction {
            kind,
            source: io::Error::new(io::ErrorKind::NotFound, "backend kind not registered"),
        })?;
        factory().map_err(|source| BlobError::Construction { kind, source })
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_defaults(std::env::temp_dir())
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&'static str> = self.factories.keys().map(|k| k.name()).collect();
        kinds.sort_unstable();
        f.debug_struct("BackendRegistry").field("kinds", &kinds).finish()
    }
}
