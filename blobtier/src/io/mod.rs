//! Storage backends for payload containers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  SelectingContainer                 │
//! │  - picks a tier for the data size   │
//! │  - owns one Box<dyn Backend>        │
//! └─────────────────────────────────────┘
//!          ▲
//!          │ created by BackendRegistry
//!          ▼
//! ┌─────────────────────────────────────┐
//! │  Backend (storage contract)         │
//! │  - whole-payload get/set            │
//! │  - SeekableChannel for streaming    │
//! │  - deep copy                        │
//! └─────────────────────────────────────┘
//!      ▲                    ▲
//!      │                    │
//!  MemoryBackend       FileBackend
//! ```

pub mod buffer;
pub mod filebuf;
pub mod types;

pub use buffer::{MemoryBackend, MemoryChannel};
pub use filebuf::{FileBackend, FileChannel};
pub use types::{closed_channel, pinned_by_view, Backend, BackendKind, BufferView, SeekableChannel};
