//! Backend types and traits

use memmap2::Mmap;
use parking_lot::RwLockReadGuard;
use serde::Deserialize;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::Deref;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Storage strategy of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Bytes held on the heap
    Memory,
    /// Bytes held in a temporary spool file
    File,
}

impl BackendKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            other => Err(format!("Unknown backend kind: {other}")),
        }
    }
}

/// Error returned by any operation on a closed channel
#[must_use]
pub fn closed_channel() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "channel is closed")
}

/// Error returned by a channel mutation while a buffer view pins the contents
#[must_use]
pub fn pinned_by_view() -> io::Error {
    io::Error::new(
        io::ErrorKind::WouldBlock,
        "contents are pinned by an open buffer view",
    )
}

/// Seekable, readable and writable byte channel
///
/// Position semantics follow a random-access file: seeking past the end is
/// allowed, and a later write fills the gap with zeros.
pub trait SeekableChannel: Read + Write + Seek + Send {
    /// Current size of the underlying contents
    fn size(&mut self) -> io::Result<u64>;

    /// Cut the contents to `size` bytes. No-op if already smaller.
    /// A position beyond the new size is moved back to it.
    fn truncate(&mut self, size: u64) -> io::Result<()>;

    /// Release the channel. Idempotent; later operations fail.
    fn close(&mut self) -> io::Result<()>;

    fn is_open(&self) -> bool;

    fn position(&mut self) -> io::Result<u64> {
        self.stream_position()
    }

    fn set_position(&mut self, pos: u64) -> io::Result<()> {
        self.seek(SeekFrom::Start(pos)).map(|_| ())
    }
}

/// Capabilities every storage tier provides
///
/// A container holds a `Box<dyn Backend>` and never a concrete type, so a
/// tier switch is a matter of replacing the box.
pub trait Backend: Send + fmt::Debug {
    fn kind(&self) -> BackendKind;

    /// Full contents as one byte vector
    fn data(&self) -> io::Result<Vec<u8>>;

    /// Replace the contents. `None` empties the backend.
    fn set_data(&mut self, data: Option<&[u8]>) -> io::Result<()>;

    /// Replace the contents with `data[offset..offset + length]`
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the range does not fit in `data`.
    fn set_data_range(&mut self, data: &[u8], offset: usize, length: usize) -> io::Result<()> {
        let slice = offset
            .checked_add(length)
            .and_then(|end| data.get(offset..end))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("range {offset}+{length} out of bounds for {}", data.len()),
                )
            })?;
        self.set_data(Some(slice))
    }

    fn len(&self) -> io::Result<u64>;

    fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Low-copy read-only view of the contents
    ///
    /// The view never changes while it is alive. Channels that are open at
    /// the same time either write to fresh storage (memory) or fail with
    /// `WouldBlock` until the view is dropped (file).
    fn buffer_view(&self) -> io::Result<BufferView<'_>>;

    /// Open a channel over the existing contents, positioned at the start
    fn channel(&self) -> io::Result<Box<dyn SeekableChannel>>;

    /// Discard the contents and open a channel over the fresh, empty storage.
    /// `estimated_size` is advisory.
    fn new_channel(&mut self, estimated_size: u64) -> io::Result<Box<dyn SeekableChannel>>;

    /// Independent deep copy: writes to either side never show up in the other
    fn try_clone_backend(&self) -> io::Result<Box<dyn Backend>>;

    /// Path of the backing file, for file-resident backends
    fn file_path(&self) -> Option<&Path> {
        None
    }
}

enum ViewInner<'a> {
    Shared(Arc<Vec<u8>>),
    Mapped {
        // Dropped before `_pin`, so the map is gone once writers are let in
        map: Mmap,
        _pin: RwLockReadGuard<'a, ()>,
    },
    Empty,
}

/// Read-only view of backend contents
///
/// For in-memory backends it is a shared snapshot of the storage; writes
/// made while the view is alive go to a private copy. For file backends it
/// is a memory map of the spool file, guarded against concurrent changes.
pub struct BufferView<'a>(ViewInner<'a>);

impl<'a> BufferView<'a> {
    pub(crate) fn shared(data: Arc<Vec<u8>>) -> Self {
        Self(ViewInner::Shared(data))
    }

    pub(crate) fn mapped(map: Mmap, pin: RwLockReadGuard<'a, ()>) -> Self {
        Self(ViewInner::Mapped { map, _pin: pin })
    }

    pub(crate) fn empty() -> Self {
        Self(ViewInner::Empty)
    }
}

impl Deref for BufferView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.0 {
            ViewInner::Shared(data) => data.as_slice(),
            ViewInner::Mapped { map, .. } => &map[..],
            ViewInner::Empty => &[],
        }
    }
}

impl AsRef<[u8]> for BufferView<'_> {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl fmt::Debug for BufferView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.0 {
            ViewInner::Shared(_) => "memory",
            ViewInner::Mapped { .. } => "mmap",
            ViewInner::Empty => "empty",
        };
        write!(f, "BufferView(source={source}, len={})", self.len())
    }
}
