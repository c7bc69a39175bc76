//! In-memory vector store
//!
//! Composes the identifier manager and the batch sequence behind one facade.
//! All mutable state lives in [`StoreState`] under a single
//! multi-reader/single-writer lock: the convenience methods on [`MemStore`]
//! acquire it per call, while [`MemStore::read`] / [`MemStore::write`] hand
//! out the guard itself so the index layer can keep several related
//! operations in one critical section.
//!
//! Every mutator takes a caller-supplied `snapshot_id` and stamps it last,
//! after the mutation is complete; a reader that observes snapshot `S` has
//! observed every mutation stamped at or before `S`.

pub mod batch;
pub mod id_manager;

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::metric::{DataType, Metric, SimdLevel};
use crate::space::VectorSpace;
use batch::VectorBatch;
use id_manager::{IdManager, LabelEntity};

/// Opaque per-slot status word owned by the outer layer.
pub type StoreStatus = u64;

/// Status bit marking a logically deleted (but physically present) vector.
pub const TOMBSTONE: StoreStatus = 1;

/// Construction parameters for a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Logical dimensionality of the vector space.
    pub dim: usize,
    pub metric: Metric,
    pub data_type: DataType,
    pub simd_level: SimdLevel,
    /// Size of the reserved lid prefix; also the minimum `next_id`.
    pub reserved: u64,
    /// Slots per vector batch.
    pub batch_size: u64,
    /// Upper bound on lids; `add_vector` fails beyond it.
    pub max_elements: u64,
}

/// The mutable half of a store, guarded by the facade's lock.
#[derive(Debug)]
pub struct StoreState {
    space: Arc<VectorSpace>,
    options: StoreOptions,
    id_manager: IdManager,
    batches: Vec<VectorBatch>,
    snapshot_id: u64,
}

impl StoreState {
    #[inline]
    fn locate(&self, lid: u64) -> (usize, usize) {
        (
            (lid / self.options.batch_size) as usize,
            (lid % self.options.batch_size) as usize,
        )
    }

    fn check_payload(&self, label: u64, vector: &[u8]) -> Result<()> {
        if vector.len() > self.space.vector_byte_size {
            return Err(Error::invalid_argument(format!(
                "vector for label {label} is {} bytes, stride is {}",
                vector.len(),
                self.space.vector_byte_size
            )));
        }
        Ok(())
    }

    /// Grow the batch sequence until `lid` has backing storage.
    fn ensure_space(&mut self, lid: u64) -> Result<()> {
        if lid >= self.options.max_elements {
            return Err(Error::out_of_range(format!(
                "lid {lid} exceeds max_elements {}",
                self.options.max_elements
            )));
        }
        let (batch_index, _) = self.locate(lid);
        while self.batches.len() <= batch_index {
            let batch = VectorBatch::new(
                self.space.vector_byte_size,
                self.options.batch_size as usize,
            )?;
            self.batches.push(batch);
            tracing::debug!(batches = self.batches.len(), "vector batch materialized");
        }
        Ok(())
    }

    /// Copy `vector` into the slot for `lid`, zero-filling the padding.
    fn write_slot(&mut self, lid: u64, vector: &[u8]) {
        let (batch_index, slot_index) = self.locate(lid);
        // slot is always present here, ensure_space ran first
        if let Some(slot) = self.batches[batch_index].at_mut(slot_index) {
            slot[..vector.len()].copy_from_slice(vector);
            slot[vector.len()..].fill(0);
        }
    }

    fn vector_at(&self, lid: u64) -> Result<&[u8]> {
        let (batch_index, slot_index) = self.locate(lid);
        self.batches
            .get(batch_index)
            .and_then(|b| b.at(slot_index))
            .ok_or_else(|| Error::out_of_range(format!("lid {lid} has no backing storage")))
    }

    /// Allocate a lid for `label` and store `vector` under it.
    ///
    /// A failure to back the lid with storage rolls the allocation back;
    /// the store is unchanged on any error.
    pub fn add_vector(&mut self, snapshot_id: u64, label: u64, vector: &[u8]) -> Result<u64> {
        self.check_payload(label, vector)?;
        let lid = self.id_manager.alloc_id(label)?;
        if let Err(err) = self.ensure_space(lid) {
            self.id_manager.free_local_id(lid);
            return Err(err);
        }
        self.write_slot(lid, vector);
        self.snapshot_id = snapshot_id;
        Ok(lid)
    }

    /// Overwrite the vector stored under an existing label.
    pub fn set_vector(&mut self, snapshot_id: u64, label: u64, vector: &[u8]) -> Result<u64> {
        self.check_payload(label, vector)?;
        let lid = self.id_manager.local_id(label)?;
        let (batch_index, slot_index) = self.locate(lid);
        let slot = self
            .batches
            .get_mut(batch_index)
            .and_then(|b| b.at_mut(slot_index))
            .ok_or_else(|| {
                Error::out_of_range(format!("lid {lid} for label {label} has no backing storage"))
            })?;
        slot[..vector.len()].copy_from_slice(vector);
        slot[vector.len()..].fill(0);
        self.snapshot_id = snapshot_id;
        Ok(lid)
    }

    /// Physically free the slot mapped to `label`; the lid becomes reusable.
    pub fn remove_vector_by_label(&mut self, snapshot_id: u64, label: u64) {
        self.id_manager.free_id(label);
        self.snapshot_id = snapshot_id;
    }

    /// Physically free `lid` directly.
    pub fn remove_vector_by_id(&mut self, snapshot_id: u64, lid: u64) {
        self.id_manager.free_local_id(lid);
        self.snapshot_id = snapshot_id;
    }

    /// Logically delete without freeing: the lid keeps its mapping and bytes
    /// so index structures pointing at it stay valid.
    pub fn tombstone_vector_by_label(&mut self, snapshot_id: u64, label: u64) {
        self.id_manager.set_label_status(label, TOMBSTONE);
        self.snapshot_id = snapshot_id;
    }

    pub fn tombstone_vector_by_id(&mut self, snapshot_id: u64, lid: u64) {
        self.id_manager.set_local_id_status(lid, TOMBSTONE);
        self.snapshot_id = snapshot_id;
    }

    pub fn get_vector_by_label(&self, label: u64) -> Result<&[u8]> {
        self.vector_at(self.id_manager.local_id(label)?)
    }

    pub fn get_vector_by_id(&self, lid: u64) -> Result<&[u8]> {
        self.vector_at(lid)
    }

    pub fn get_id(&self, label: u64) -> Result<u64> {
        self.id_manager.local_id(label)
    }

    pub fn get_label(&self, lid: u64) -> Result<u64> {
        Ok(self.id_manager.local_entity(lid)?.label)
    }

    /// Number of mapped labels (reserved mappings included).
    pub fn size(&self) -> u64 {
        self.id_manager.id_map().len() as u64
    }

    /// Bytes occupied by mapped vectors at the padded stride.
    pub fn bytes_size(&self) -> u64 {
        self.size() * self.space.vector_byte_size as u64
    }

    /// Bytes backed by materialized batches.
    pub fn allocated_bytes(&self) -> u64 {
        self.allocated_vector_size() * self.space.vector_byte_size as u64
    }

    /// Bytes held by freed-but-not-compacted slots.
    pub fn free_bytes(&self) -> u64 {
        self.free_vector_size() * self.space.vector_byte_size as u64
    }

    /// Slots backed by materialized batches.
    pub fn allocated_vector_size(&self) -> u64 {
        self.batches.len() as u64 * self.options.batch_size
    }

    /// Physical holes in the active range.
    pub fn free_vector_size(&self) -> u64 {
        self.id_manager.free_ids().len() as u64
    }

    fn scan_tombstones(&self) -> impl Iterator<Item = (u64, &LabelEntity)> {
        let ids = self.id_manager.ids();
        let end = (self.id_manager.next_id() as usize).min(ids.len());
        let start = (self.id_manager.reserved_id() as usize).min(end);
        ids[start..end]
            .iter()
            .enumerate()
            .filter(|(_, e)| e.status == TOMBSTONE)
            .map(move |(i, e)| ((start + i) as u64, e))
    }

    /// Count of logically deleted slots in the active range.
    pub fn tombstones(&self) -> u64 {
        self.scan_tombstones().count() as u64
    }

    pub fn tombstone_local_ids(&self) -> Vec<u64> {
        self.scan_tombstones().map(|(lid, _)| lid).collect()
    }

    pub fn tombstone_labels(&self) -> Vec<u64> {
        self.scan_tombstones().map(|(_, e)| e.label).collect()
    }

    #[inline]
    pub fn snapshot_id(&self) -> u64 {
        self.snapshot_id
    }

    #[inline]
    pub fn vector_space(&self) -> &VectorSpace {
        &self.space
    }

    #[inline]
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// The identifier manager, for index-layer walks and the serializer.
    #[inline]
    pub fn id_manager(&self) -> &IdManager {
        &self.id_manager
    }

    /// Mutable access for the serializer/coordinator boundary, e.g.
    /// installing reserved entry points via
    /// [`IdManager::set_reserved_id`].
    #[inline]
    pub fn id_manager_mut(&mut self) -> &mut IdManager {
        &mut self.id_manager
    }

    /// The materialized batch sequence.
    #[inline]
    pub fn batches(&self) -> &[VectorBatch] {
        &self.batches
    }
}

/// The facade the index layer sees: one vector space plus locked state.
#[derive(Debug)]
pub struct MemStore {
    space: Arc<VectorSpace>,
    state: RwLock<StoreState>,
}

impl MemStore {
    /// Create an empty store, resolving kernels from the global registry.
    pub fn open(options: StoreOptions) -> Result<MemStore> {
        Self::build(options, Vec::new(), None)
    }

    /// Rebuild a store from a pool captured by the serializer.
    ///
    /// Re-adopts the pool, then materializes enough batches to back the
    /// active range so restored vectors can be written with `set_vector`.
    pub fn restore(
        options: StoreOptions,
        pool: Vec<LabelEntity>,
        next_id: u64,
    ) -> Result<MemStore> {
        Self::build(options, pool, Some(next_id))
    }

    fn build(
        options: StoreOptions,
        pool: Vec<LabelEntity>,
        restore_next_id: Option<u64>,
    ) -> Result<MemStore> {
        if options.batch_size == 0 {
            return Err(Error::invalid_argument("batch_size must be non-zero"));
        }
        let space = Arc::new(VectorSpace::create(
            options.dim,
            options.metric,
            options.data_type,
            options.simd_level,
        )?);
        let next_id = restore_next_id.unwrap_or(options.reserved).max(options.reserved);
        let mut id_manager = IdManager::new();
        id_manager.initialize(pool, options.reserved, next_id)?;

        let mut state = StoreState {
            space: Arc::clone(&space),
            options,
            id_manager,
            batches: Vec::new(),
            snapshot_id: 0,
        };
        if next_id > state.options.reserved {
            state.ensure_space(next_id - 1)?;
        }
        Ok(MemStore {
            space,
            state: RwLock::new(state),
        })
    }

    /// The immutable space descriptor; no lock needed.
    #[inline]
    pub fn vector_space(&self) -> &VectorSpace {
        &self.space
    }

    /// Shared-mode guard over the state, for extended read sections.
    pub fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read()
    }

    /// Exclusive-mode guard over the state, for extended write sections.
    pub fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write()
    }

    pub fn add_vector(&self, snapshot_id: u64, label: u64, vector: &[u8]) -> Result<u64> {
        self.state.write().add_vector(snapshot_id, label, vector)
    }

    pub fn set_vector(&self, snapshot_id: u64, label: u64, vector: &[u8]) -> Result<u64> {
        self.state.write().set_vector(snapshot_id, label, vector)
    }

    pub fn remove_vector_by_label(&self, snapshot_id: u64, label: u64) {
        self.state.write().remove_vector_by_label(snapshot_id, label)
    }

    pub fn remove_vector_by_id(&self, snapshot_id: u64, lid: u64) {
        self.state.write().remove_vector_by_id(snapshot_id, lid)
    }

    pub fn tombstone_vector_by_label(&self, snapshot_id: u64, label: u64) {
        self.state.write().tombstone_vector_by_label(snapshot_id, label)
    }

    pub fn tombstone_vector_by_id(&self, snapshot_id: u64, lid: u64) {
        self.state.write().tombstone_vector_by_id(snapshot_id, lid)
    }

    /// Copy of the stored bytes; borrow through [`MemStore::read`] instead
    /// when the copy matters.
    pub fn get_vector_by_label(&self, label: u64) -> Result<Vec<u8>> {
        Ok(self.state.read().get_vector_by_label(label)?.to_vec())
    }

    pub fn get_vector_by_id(&self, lid: u64) -> Result<Vec<u8>> {
        Ok(self.state.read().get_vector_by_id(lid)?.to_vec())
    }

    pub fn get_id(&self, label: u64) -> Result<u64> {
        self.state.read().get_id(label)
    }

    pub fn get_label(&self, lid: u64) -> Result<u64> {
        self.state.read().get_label(lid)
    }

    pub fn size(&self) -> u64 {
        self.state.read().size()
    }

    pub fn bytes_size(&self) -> u64 {
        self.state.read().bytes_size()
    }

    pub fn allocated_bytes(&self) -> u64 {
        self.state.read().allocated_bytes()
    }

    pub fn free_bytes(&self) -> u64 {
        self.state.read().free_bytes()
    }

    pub fn allocated_vector_size(&self) -> u64 {
        self.state.read().allocated_vector_size()
    }

    pub fn free_vector_size(&self) -> u64 {
        self.state.read().free_vector_size()
    }

    pub fn tombstones(&self) -> u64 {
        self.state.read().tombstones()
    }

    pub fn tombstone_local_ids(&self) -> Vec<u64> {
        self.state.read().tombstone_local_ids()
    }

    pub fn tombstone_labels(&self) -> Vec<u64> {
        self.state.read().tombstone_labels()
    }

    pub fn snapshot_id(&self) -> u64 {
        self.state.read().snapshot_id()
    }
}
