//! Quiver Core – In-memory vector storage substrate
//!
//! The storage layer a vector-search engine builds its index on top of:
//! label↔local-id management, SIMD-aligned batch storage, and runtime
//! distance-kernel dispatch.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  MemStore (facade + RwLock)                 │
//! │     add / set / remove / tombstone / get / accounting       │
//! ├──────────────────────────┬──────────────────────────────────┤
//! │        IdManager         │        VectorBatch sequence      │
//! │  label ↔ lid, free set,  │   64-byte aligned slabs, lazily  │
//! │  reserved prefix, status │   grown, lid → (batch, slot)     │
//! ├──────────────────────────┴──────────────────────────────────┤
//! │   VectorSpace (dim, dtype, stride, resolved kernel pair)    │
//! ├─────────────────────────────────────────────────────────────┤
//! │   MetricRegistry (metric × dtype × SIMD level → kernels)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Construction resolves kernels once: a [`VectorSpace`] captures both the
//! scalar reference entity and the fast-path entity for its (metric, element
//! type, SIMD level), so query-time dispatch is a single indirect call.
//!
//! The store itself is not durable and runs no background work. It exposes
//! the counts (physical holes, tombstones) an outer coordinator uses to
//! decide when to rebuild a fresh store from live entries and hot-swap it in.

pub mod error;
pub mod metric;
pub mod ops;
pub mod space;
pub mod store;

pub use error::{Error, Result};
pub use metric::{DataType, Metric, SimdLevel};
pub use ops::{
    default_arch_name, detect_simd_level, register_builtins, DistanceFn, MetricRegistry, NormFn,
    NormalizeFn, OperatorEntity,
};
pub use space::{AlignedBytes, VectorSpace, ALIGNMENT_BYTES};
pub use store::batch::VectorBatch;
pub use store::id_manager::{IdManager, LabelEntity, INVALID_ID};
pub use store::{MemStore, StoreOptions, StoreStatus, TOMBSTONE};
