//! File-resident backend
//!
//! Bytes live in a spool file created with `tempfile` inside a configurable
//! directory. The file is removed when the backend is dropped, so nothing
//! outlives the process.
//!
//! Buffer views map the spool file. A view holds the read side of the
//! backend's pin lock; channel writes and truncates take the write side
//! with `try_write` and fail with `WouldBlock` while any view is alive.

use memmap2::Mmap;
use parking_lot::RwLock;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

use super::types::{closed_channel, pinned_by_view, Backend, BackendKind, BufferView, SeekableChannel};

type ViewPin = Arc<RwLock<()>>;

/// Spool-file backend
pub struct FileBackend {
    file: NamedTempFile,
    pin: ViewPin,
}

impl FileBackend {
    /// Create an empty spool file in the OS temp directory
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created.
    pub fn new() -> io::Result<Self> {
        Self::new_in(std::env::temp_dir())
    }

    /// Create an empty spool file in `dir`
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created.
    pub fn new_in<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("blobtier-")
            .suffix(".spool")
            .tempfile_in(dir)?;
        Ok(Self {
            file,
            pin: Arc::new(RwLock::new(())),
        })
    }

    fn spool_dir(&self) -> PathBuf {
        self.file
            .path()
            .parent()
            .map_or_else(std::env::temp_dir, Path::to_path_buf)
    }
}

impl fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileBackend")
            .field("path", &self.file.path())
            .field("len", &self.len().ok())
            .finish()
    }
}

impl Backend for FileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::File
    }

    fn data(&self) -> io::Result<Vec<u8>> {
        let mut file = self.file.reopen()?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    fn set_data(&mut self, data: Option<&[u8]>) -> io::Result<()> {
        let file = self.file.as_file_mut();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        if let Some(data) = data {
            file.write_all(data)?;
        }
        file.flush()
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.file.as_file().metadata()?.len())
    }

    fn buffer_view(&self) -> io::Result<BufferView<'_>> {
        let pin = self.pin.read();
        if self.len()? == 0 {
            // Zero-length files cannot be mapped
            return Ok(BufferView::empty());
        }
        // SAFETY: the spool file is private to this backend. It changes only
        // through `set_data` and `new_channel`, which need `&mut self` and so
        // cannot run while the view borrows `self`, or through channel writes
        // and truncates, which need the write side of `pin`. The view keeps
        // the read side until the map is dropped.
        let map = unsafe { Mmap::map(self.file.as_file())? };
        Ok(BufferView::mapped(map, pin))
    }

    fn channel(&self) -> io::Result<Box<dyn SeekableChannel>> {
        Ok(Box::new(FileChannel {
            file: Some(self.file.reopen()?),
            pin: Arc::clone(&self.pin),
        }))
    }

    fn new_channel(&mut self, _estimated_size: u64) -> io::Result<Box<dyn SeekableChannel>> {
        self.file.as_file().set_len(0)?;
        self.channel()
    }

    fn try_clone_backend(&self) -> io::Result<Box<dyn Backend>> {
        let mut copy = Self::new_in(self.spool_dir())?;
        let mut source = self.file.reopen()?;
        io::copy(&mut source, copy.file.as_file_mut())?;
        Ok(Box::new(copy))
    }

    fn file_path(&self) -> Option<&Path> {
        Some(self.file.path())
    }
}

/// Channel over a spool file with its own file descriptor and cursor
pub struct FileChannel {
    file: Option<File>,
    pin: ViewPin,
}

impl FileChannel {
    fn file(&mut self) -> io::Result<&mut File> {
        self.file.as_mut().ok_or_else(closed_channel)
    }

    /// Run an operation that changes the file contents or length
    fn modify<R>(&mut self, op: impl FnOnce(&mut File) -> io::Result<R>) -> io::Result<R> {
        let file = self.file.as_mut().ok_or_else(closed_channel)?;
        let _guard = self.pin.try_write().ok_or_else(pinned_by_view)?;
        op(file)
    }
}

impl Read for FileChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file()?.read(buf)
    }
}

impl Write for FileChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.modify(|file| file.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file()?.flush()
    }
}

impl Seek for FileChannel {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file()?.seek(pos)
    }
}

impl SeekableChannel for FileChannel {
    fn size(&mut self) -> io::Result<u64> {
        Ok(self.file()?.metadata()?.len())
    }

    fn truncate(&mut self, size: u64) -> io::Result<()> {
        self.modify(|file| {
            if size < file.metadata()?.len() {
                file.set_len(size)?;
            }
            if file.stream_position()? > size {
                file.seek(SeekFrom::Start(size))?;
            }
            Ok(())
        })
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }
}
