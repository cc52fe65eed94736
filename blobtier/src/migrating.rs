//! Channel that can move to another backend while it is being written
//!
//! `MigratingChannel` exposes the plain `SeekableChannel` contract. After
//! every successful write it asks its `GrowthTrigger` whether the data still
//! belongs where it is. If the trigger hands back a replacement channel, the
//! wrapper swaps it in and all later calls go to the replacement. The caller
//! keeps the same wrapper value throughout.
//!
//! A write that starts past the end would zero-fill the gap in the current
//! storage, so the trigger is asked before such a write, with the size the
//! channel is about to reach.
//!
//! A trigger error after a write cannot fail that write: its bytes are
//! already stored, and `Write::write` must not report an error for bytes it
//! took. The error is kept and returned by the next `write`, `flush` or
//! `close`.
//!
//! The wrapper owns its inner channel exclusively. Migration assumes a single
//! writer: nothing else touches the channel while the trigger copies data.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::mem;

use crate::io::SeekableChannel;

/// Decides whether a grown channel must move to new storage
pub trait GrowthTrigger: Send {
    /// Called when `channel` has grown to `size` bytes, or is about to.
    ///
    /// Return `Ok(None)` to keep the current channel. To migrate, copy the
    /// bytes into new storage, close `channel`, and return the new channel
    /// positioned where `channel` was.
    ///
    /// # Errors
    ///
    /// An error before a write fails that write. An error after a write is
    /// reported by the next call that can fail. The current channel must
    /// stay usable in both cases.
    fn on_growth(
        &mut self,
        channel: &mut dyn SeekableChannel,
        size: u64,
    ) -> io::Result<Option<Box<dyn SeekableChannel>>>;
}

/// Seekable channel whose inner channel can be replaced mid-stream
pub struct MigratingChannel<T: GrowthTrigger> {
    inner: Box<dyn SeekableChannel>,
    trigger: T,
    migrations: usize,
    pending: Option<io::Error>,
}

impl<T: GrowthTrigger> MigratingChannel<T> {
    #[must_use]
    pub fn new(inner: Box<dyn SeekableChannel>, trigger: T) -> Self {
        Self {
            inner,
            trigger,
            migrations: 0,
            pending: None,
        }
    }

    /// Number of times the inner channel has been replaced
    #[must_use]
    pub fn migrations(&self) -> usize {
        self.migrations
    }

    fn migrate(&mut self, size: u64) -> io::Result<()> {
        let Some(replacement) = self.trigger.on_growth(self.inner.as_mut(), size)? else {
            return Ok(());
        };
        let mut old = mem::replace(&mut self.inner, replacement);
        if old.is_open() {
            old.close()?;
        }
        self.migrations += 1;
        Ok(())
    }

    fn take_pending(&mut self) -> io::Result<()> {
        self.pending.take().map_or(Ok(()), Err)
    }
}

impl<T: GrowthTrigger> Read for MigratingChannel<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<T: GrowthTrigger> Write for MigratingChannel<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.take_pending()?;
        if buf.is_empty() {
            return self.inner.write(buf);
        }

        let position = self.inner.position()?;
        if position > self.inner.size()? {
            self.migrate(position.saturating_add(buf.len() as u64))?;
        }

        let n = self.inner.write(buf)?;
        if n > 0 {
            if let Err(e) = self.inner.size().and_then(|size| self.migrate(size)) {
                self.pending = Some(e);
            }
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.take_pending()?;
        self.inner.flush()
    }
}

impl<T: GrowthTrigger> Seek for MigratingChannel<T> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl<T: GrowthTrigger> SeekableChannel for MigratingChannel<T> {
    fn size(&mut self) -> io::Result<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, size: u64) -> io::Result<()> {
        self.inner.truncate(size)
    }

    fn close(&mut self) -> io::Result<()> {
        let pending = self.pending.take();
        self.inner.close()?;
        pending.map_or(Ok(()), Err)
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
}

impl<T: GrowthTrigger> fmt::Debug for MigratingChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigratingChannel")
            .field("open", &self.inner.is_open())
            .field("migrations", &self.migrations)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{Backend, MemoryBackend};
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Moves the data into `target` once the channel reaches `limit` bytes
    struct MoveAt {
        limit: u64,
        target: Arc<Mutex<MemoryBackend>>,
        fired: bool,
    }

    impl GrowthTrigger for MoveAt {
        fn on_growth(
            &mut self,
            channel: &mut dyn SeekableChannel,
            size: u64,
        ) -> io::Result<Option<Box<dyn SeekableChannel>>> {
            if self.fired || size < self.limit {
                return Ok(None);
            }
            self.fired = true;
            let pos = channel.position()?;
            channel.set_position(0)?;
            let mut fresh = self.target.lock().new_channel(0)?;
            io::copy(channel, &mut fresh)?;
            channel.close()?;
            fresh.set_position(pos)?;
            Ok(Some(fresh))
        }
    }

    struct Refuse;

    impl GrowthTrigger for Refuse {
        fn on_growth(
            &mut self,
            _channel: &mut dyn SeekableChannel,
            _size: u64,
        ) -> io::Result<Option<Box<dyn SeekableChannel>>> {
            Err(io::Error::other("no room"))
        }
    }

    #[test]
    fn test_swap_keeps_position_and_content() {
        let source = MemoryBackend::new();
        let target = Arc::new(Mutex::new(MemoryBackend::new()));
        let trigger = MoveAt {
            limit: 8,
            target: Arc::clone(&target),
            fired: false,
        };
        let mut channel = MigratingChannel::new(source.channel().unwrap(), trigger);

        channel.write_all(b"0123").unwrap();
        assert_eq!(channel.migrations(), 0);
        channel.write_all(b"4567").unwrap();
        assert_eq!(channel.migrations(), 1);
        assert_eq!(channel.position().unwrap(), 8);

        channel.write_all(b"89").unwrap();
        assert_eq!(target.lock().data().unwrap(), b"0123456789");
        // Old storage no longer receives writes
        assert_eq!(source.data().unwrap(), b"01234567");
    }

    #[test]
    fn test_reads_follow_the_swap() {
        let source = MemoryBackend::new();
        let target = Arc::new(Mutex::new(MemoryBackend::new()));
        let trigger = MoveAt {
            limit: 1,
            target,
            fired: false,
        };
        let mut channel = MigratingChannel::new(source.channel().unwrap(), trigger);
        channel.write_all(b"abc").unwrap();
        channel.seek(SeekFrom::Start(1)).unwrap();

        let mut out = String::new();
        channel.read_to_string(&mut out).unwrap();
        assert_eq!(out, "bc");
    }

    #[test]
    fn test_trigger_error_after_write_is_deferred() {
        let source = MemoryBackend::new();
        let mut channel = MigratingChannel::new(source.channel().unwrap(), Refuse);
        assert_eq!(channel.write(b"x").unwrap(), 1);
        assert_eq!(source.data().unwrap(), b"x");

        assert!(channel.flush().is_err());
        channel.flush().unwrap();
        // Empty writes never grow the channel
        assert_eq!(channel.write(b"").unwrap(), 0);
        assert!(channel.is_open());
    }

    #[test]
    fn test_pending_error_fails_next_write_without_writing() {
        let source = MemoryBackend::new();
        let mut channel = MigratingChannel::new(source.channel().unwrap(), Refuse);
        channel.write_all(b"ab").unwrap();
        assert!(channel.write(b"cd").is_err());
        assert_eq!(source.data().unwrap(), b"ab");
    }

    #[test]
    fn test_pending_error_reported_by_close() {
        let source = MemoryBackend::new();
        let mut channel = MigratingChannel::new(source.channel().unwrap(), Refuse);
        channel.write_all(b"ab").unwrap();
        assert!(channel.close().is_err());
        assert!(!channel.is_open());
    }

    #[test]
    fn test_gap_write_asks_trigger_first() {
        let source = MemoryBackend::new();
        let mut channel = MigratingChannel::new(source.channel().unwrap(), Refuse);
        channel.seek(SeekFrom::Start(5)).unwrap();
        assert!(channel.write(b"x").is_err());
        assert!(source.data().unwrap().is_empty());
    }

    #[test]
    fn test_gap_write_lands_in_replacement() {
        let source = MemoryBackend::new();
        let target = Arc::new(Mutex::new(MemoryBackend::new()));
        let trigger = MoveAt {
            limit: 4,
            target: Arc::clone(&target),
            fired: false,
        };
        let mut channel = MigratingChannel::new(source.channel().unwrap(), trigger);
        channel.write_all(b"ab").unwrap();
        channel.seek(SeekFrom::Start(6)).unwrap();
        channel.write_all(b"z").unwrap();

        assert_eq!(channel.migrations(), 1);
        assert_eq!(source.data().unwrap(), b"ab");
        assert_eq!(target.lock().data().unwrap(), b"ab\0\0\0\0z");
    }

    #[test]
    fn test_close_closes_inner() {
        let source = MemoryBackend::new();
        let mut channel = MigratingChannel::new(source.channel().unwrap(), Refuse);
        channel.close().unwrap();
        assert!(!channel.is_open());
        assert!(channel.size().is_err());
    }
}
