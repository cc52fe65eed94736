pub mod config;
pub mod error;
pub mod io;
pub mod migrating;
pub mod registry;
pub mod selecting;
pub mod tiers;

// Re-export container types for convenience
pub use selecting::{global_factory, ContainerChannel, ContainerFactory, SelectingContainer, TierSwitch};

// Re-export backend types for convenience
pub use io::{Backend, BackendKind, BufferView, FileBackend, MemoryBackend, SeekableChannel};

// Re-export tier and registry types
pub use registry::{BackendFactory, BackendRegistry};
pub use tiers::{Tier, TierTable};

pub use config::{BlobConfig, ConstructionPolicy};
pub use error::BlobError;
pub use migrating::{GrowthTrigger, MigratingChannel};
