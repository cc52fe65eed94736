//! Size-adaptive payload container
//!
//! `SelectingContainer` owns exactly one backend at a time and moves the
//! payload to the tier that fits its size:
//!
//! - whole-payload writes pick the tier for the new size up front, replacing
//!   the backend (and dropping the old contents) if the kind changes;
//! - streaming writes go through a `MigratingChannel` whose `TierSwitch`
//!   trigger copies the data into a bigger tier once the damped size has
//!   outgrown the current one.
//!
//! A container and its open channel are single-writer. The channel borrows
//! the container mutably for the whole session, so the container cannot be
//! read or written while a channel is open.

use std::fmt;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use lazy_static::lazy_static;
use tracing::{debug, error, warn};

use crate::config::{self, ConstructionPolicy};
use crate::error::BlobError;
use crate::io::{Backend, BackendKind, BufferView, MemoryBackend, SeekableChannel};
use crate::migrating::{GrowthTrigger, MigratingChannel};
use crate::registry::BackendRegistry;
use crate::tiers::TierTable;

lazy_static! {
    static ref GLOBAL_FACTORY: ContainerFactory = config::factory_from_env();
}

/// Process-wide factory, built once from `BLOBTIER_CONFIG` on first use
#[must_use]
pub fn global_factory() -> &'static ContainerFactory {
    &GLOBAL_FACTORY
}

/// Shared, immutable setup for containers: tiers, constructors, policy
#[derive(Clone)]
pub struct ContainerFactory {
    tiers: Arc<TierTable>,
    registry: Arc<BackendRegistry>,
    policy: ConstructionPolicy,
}

impl ContainerFactory {
    #[must_use]
    pub fn new(tiers: TierTable, registry: BackendRegistry) -> Self {
        Self {
            tiers: Arc::new(tiers),
            registry: Arc::new(registry),
            policy: ConstructionPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ConstructionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// New container holding an empty in-memory backend
    #[must_use]
    pub fn create(&self) -> SelectingContainer {
        SelectingContainer {
            active: Box::new(MemoryBackend::new()),
            factory: self.clone(),
        }
    }

    #[must_use]
    pub fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    #[must_use]
    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    #[must_use]
    pub fn policy(&self) -> ConstructionPolicy {
        self.policy
    }

    /// Apply the construction policy to a failed backend creation
    fn construction_failed(&self, err: BlobError) -> Result<(), BlobError> {
        match self.policy {
            ConstructionPolicy::Degrade => {
                error!(error = %err, "Unable to instantiate backend, keeping the current one");
                Ok(())
            }
            ConstructionPolicy::Fail => Err(err),
        }
    }
}

impl Default for ContainerFactory {
    fn default() -> Self {
        Self::new(TierTable::default(), BackendRegistry::default())
    }
}

impl fmt::Debug for ContainerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerFactory")
            .field("tiers", &self.tiers.to_string())
            .field("registry", &self.registry)
            .field("policy", &self.policy)
            .finish()
    }
}

/// Channel returned by `SelectingContainer::open_channel`
pub type ContainerChannel<'a> = MigratingChannel<TierSwitch<'a>>;

/// Byte payload that keeps itself in the tier matching its size
pub struct SelectingContainer {
    active: Box<dyn Backend>,
    factory: ContainerFactory,
}

impl SelectingContainer {
    /// Container configured by the process-wide factory
    #[must_use]
    pub fn new() -> Self {
        global_factory().create()
    }

    /// Replace the contents. `None` empties the container.
    ///
    /// If the tier for the new size differs from the current backend, the
    /// backend is replaced first; old contents are not carried over.
    ///
    /// # Errors
    ///
    /// `NoTierForSize` if no tier covers the size, `Construction` under the
    /// `fail` policy, or an I/O error from the backend.
    pub fn write_all(&mut self, data: Option<&[u8]>) -> Result<(), BlobError> {
        let size = data.map_or(0, |d| d.len() as u64);
        self.ensure_backend(size)?;
        self.active.set_data(data)?;
        Ok(())
    }

    /// Replace the contents with `data[offset..offset + length]`
    ///
    /// # Errors
    ///
    /// `InvalidRange` if the range does not fit in `data` (the container is
    /// left untouched), otherwise as `write_all`.
    pub fn write_range(&mut self, data: &[u8], offset: usize, length: usize) -> Result<(), BlobError> {
        if offset.checked_add(length).map_or(true, |end| end > data.len()) {
            return Err(BlobError::InvalidRange {
                offset,
                length,
                available: data.len(),
            });
        }
        self.ensure_backend(length as u64)?;
        self.active.set_data_range(data, offset, length)?;
        Ok(())
    }

    /// Full contents as one byte vector
    ///
    /// # Errors
    ///
    /// `ExceedsArrayLimit` if the payload is larger than the configured
    /// materialization limit. Channels and `buffer_view` still work then.
    pub fn read_all(&self) -> Result<Vec<u8>, BlobError> {
        let size = self.len()?;
        let max = self.factory.tiers.max_array_length();
        if size > max {
            return Err(BlobError::ExceedsArrayLimit { size, max });
        }
        Ok(self.active.data()?)
    }

    /// # Errors
    ///
    /// I/O error from the backend.
    pub fn len(&self) -> Result<u64, BlobError> {
        Ok(self.active.len()?)
    }

    /// # Errors
    ///
    /// I/O error from the backend.
    pub fn is_empty(&self) -> Result<bool, BlobError> {
        Ok(self.len()? == 0)
    }

    /// # Errors
    ///
    /// I/O error from the backend.
    pub fn buffer_view(&self) -> Result<BufferView<'_>, BlobError> {
        Ok(self.active.buffer_view()?)
    }

    /// Channel over the existing contents, positioned at the start
    ///
    /// Writes through the channel may move the payload to another tier.
    ///
    /// # Errors
    ///
    /// I/O error from the backend.
    pub fn open_channel(&mut self) -> Result<ContainerChannel<'_>, BlobError> {
        let inner = self.active.channel()?;
        Ok(MigratingChannel::new(inner, TierSwitch::new(self)))
    }

    /// Channel over fresh, empty contents in the tier for `estimated_size`
    ///
    /// The estimate only picks the starting tier; growth through the channel
    /// can still migrate the payload.
    ///
    /// # Errors
    ///
    /// As `write_all`.
    pub fn open_sized_channel(&mut self, estimated_size: u64) -> Result<ContainerChannel<'_>, BlobError> {
        self.ensure_backend(estimated_size)?;
        let inner = self.active.new_channel(estimated_size)?;
        Ok(MigratingChannel::new(inner, TierSwitch::new(self)))
    }

    /// Deep copy sharing no storage with `self`
    ///
    /// # Errors
    ///
    /// I/O error while copying the backend.
    pub fn try_clone(&self) -> Result<Self, BlobError> {
        Ok(Self {
            active: self.active.try_clone_backend()?,
            factory: self.factory.clone(),
        })
    }

    /// Path of the backing file if the payload is file-resident
    #[must_use]
    pub fn file_path(&self) -> Option<&Path> {
        self.active.file_path()
    }

    /// Kind of the active backend
    #[must_use]
    pub fn backend_kind(&self) -> BackendKind {
        self.active.kind()
    }

    #[must_use]
    pub fn factory(&self) -> &ContainerFactory {
        &self.factory
    }

    /// Make the active backend match the tier for `size`, without copying
    fn ensure_backend(&mut self, size: u64) -> Result<(), BlobError> {
        let target = self.factory.tiers.resolve(size)?;
        let current = self.active.kind();
        if current == target {
            return Ok(());
        }
        debug!(from = %current, to = %target, size, "Switching backend");
        match self.factory.registry.create(target) {
            Ok(backend) => {
                self.active = backend;
                Ok(())
            }
            Err(e) => self.factory.construction_failed(e),
        }
    }
}

impl Default for SelectingContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SelectingContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectingContainer")
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

/// Growth trigger moving a container's payload to the tier its channel needs
///
/// Under the `degrade` policy, a backend kind that failed to construct is
/// not tried again for the rest of the channel session.
pub struct TierSwitch<'a> {
    container: &'a mut SelectingContainer,
    unavailable: Option<BackendKind>,
}

impl<'a> TierSwitch<'a> {
    fn new(container: &'a mut SelectingContainer) -> Self {
        Self {
            container,
            unavailable: None,
        }
    }

    /// Rewind `channel`, open a fresh channel on `backend` and copy everything
    fn copy_into(
        channel: &mut dyn SeekableChannel,
        backend: &mut dyn Backend,
        size: u64,
    ) -> io::Result<Box<dyn SeekableChannel>> {
        channel.set_position(0)?;
        let mut fresh = backend.new_channel(size)?;
        io::copy(channel, &mut fresh)?;
        fresh.flush()?;
        Ok(fresh)
    }
}

impl GrowthTrigger for TierSwitch<'_> {
    fn on_growth(
        &mut self,
        channel: &mut dyn SeekableChannel,
        size: u64,
    ) -> io::Result<Option<Box<dyn SeekableChannel>>> {
        let target = {
            let tiers = &self.container.factory.tiers;
            tiers.resolve(tiers.projected_size(size))?
        };
        let current = self.container.active.kind();
        if target == current || self.unavailable == Some(target) {
            return Ok(None);
        }

        debug!(from = %current, to = %target, size, "Channel outgrew its tier, migrating");
        let position = channel.position()?;
        let mut backend = match self.container.factory.registry.create(target) {
            Ok(backend) => backend,
            Err(e) => {
                self.container.factory.construction_failed(e)?;
                self.unavailable = Some(target);
                return Ok(None);
            }
        };

        let mut fresh = match Self::copy_into(channel, backend.as_mut(), size) {
            Ok(fresh) => fresh,
            Err(e) => {
                if let Err(seek_err) = channel.set_position(position) {
                    warn!(error = %seek_err, "Unable to restore position after failed migration");
                }
                return Err(e);
            }
        };
        channel.close()?;
        fresh.set_position(position)?;
        self.container.active = backend;
        debug!(to = %target, size, position, "Migration complete");
        Ok(Some(fresh))
    }
}
