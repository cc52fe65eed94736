//! In-memory backend with internal locking
//!
//! Bytes live in an `Arc<Vec<u8>>` behind a shared mutex. Channels opened on
//! the backend share that slot, so bytes written through a channel are
//! visible to `data()` and `len()` of the backend.
//!
//! A buffer view clones the inner `Arc` and releases the lock. The next
//! write copies the bytes first (`Arc::make_mut`), so a view is a stable
//! snapshot and never blocks a channel.

use parking_lot::Mutex;
use std::cmp::min;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use super::types::{closed_channel, Backend, BackendKind, BufferView, SeekableChannel};

/// Upper bound for reserving capacity from an advisory size estimate
const MAX_PREALLOC: u64 = 1024 * 1024;

type Storage = Arc<Mutex<Arc<Vec<u8>>>>;

/// Heap-resident backend
///
/// # Example
///
/// ```
/// use blobtier::io::{Backend, MemoryBackend};
///
/// let mut backend = MemoryBackend::new();
/// backend.set_data(Some(b"hello")).unwrap();
///
/// let view = backend.buffer_view().unwrap();
/// assert_eq!(&*view, b"hello");
/// ```
pub struct MemoryBackend(Storage);

impl MemoryBackend {
    /// Create a new empty backend
    #[must_use]
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    #[must_use]
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self(Arc::new(Mutex::new(Arc::new(data))))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryBackend(len={})", self.0.lock().len())
    }
}

impl Backend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn data(&self) -> io::Result<Vec<u8>> {
        Ok(Vec::clone(&self.0.lock()))
    }

    fn set_data(&mut self, data: Option<&[u8]>) -> io::Result<()> {
        *self.0.lock() = Arc::new(data.map(<[u8]>::to_vec).unwrap_or_default());
        Ok(())
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.0.lock().len() as u64)
    }

    fn buffer_view(&self) -> io::Result<BufferView<'_>> {
        Ok(BufferView::shared(Arc::clone(&self.0.lock())))
    }

    fn channel(&self) -> io::Result<Box<dyn SeekableChannel>> {
        Ok(Box::new(MemoryChannel::new(Arc::clone(&self.0))))
    }

    fn new_channel(&mut self, estimated_size: u64) -> io::Result<Box<dyn SeekableChannel>> {
        #[allow(clippy::cast_possible_truncation)]
        let capacity = min(estimated_size, MAX_PREALLOC) as usize;
        *self.0.lock() = Arc::new(Vec::with_capacity(capacity));
        self.channel()
    }

    fn try_clone_backend(&self) -> io::Result<Box<dyn Backend>> {
        Ok(Box::new(Self::from_vec(Vec::clone(&self.0.lock()))))
    }
}

/// Channel over the shared in-memory storage with its own position
pub struct MemoryChannel {
    storage: Storage,
    pos: u64,
    open: bool,
}

impl MemoryChannel {
    fn new(storage: Storage) -> Self {
        Self {
            storage,
            pos: 0,
            open: true,
        }
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(closed_channel())
        }
    }
}

fn to_index(pos: u64) -> io::Result<usize> {
    usize::try_from(pos).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("position {pos} does not fit in memory"),
        )
    })
}

impl Read for MemoryChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.ensure_open()?;
        let data = self.storage.lock();
        let start = min(to_index(self.pos).unwrap_or(usize::MAX), data.len());
        let n = min(buf.len(), data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for MemoryChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ensure_open()?;
        let start = to_index(self.pos)?;
        let end = start
            .checked_add(buf.len())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "write past addressable memory"))?;

        let mut slot = self.storage.lock();
        let data = Arc::make_mut(&mut *slot);
        if data.len() < end {
            data.try_reserve(end - data.len())
                .map_err(|e| io::Error::new(io::ErrorKind::OutOfMemory, e))?;
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        self.pos = end as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.ensure_open()
    }
}

impl Seek for MemoryChannel {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.ensure_open()?;
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(delta) => (self.storage.lock().len() as u64).checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "invalid seek to a negative position")
        })?;
        self.pos = target;
        Ok(target)
    }
}

impl SeekableChannel for MemoryChannel {
    fn size(&mut self) -> io::Result<u64> {
        self.ensure_open()?;
        Ok(self.storage.lock().len() as u64)
    }

    fn truncate(&mut self, size: u64) -> io::Result<()> {
        self.ensure_open()?;
        let mut slot = self.storage.lock();
        if size < slot.len() as u64 {
            Arc::make_mut(&mut *slot).truncate(to_index(size)?);
        }
        if self.pos > size {
            self.pos = size;
        }
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
