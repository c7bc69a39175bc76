//! Vector-space descriptor
//!
//! An immutable record created once per store: dimensionality, element type,
//! byte widths padded to the SIMD alignment boundary, and the two kernel
//! records resolved from the registry (the scalar reference entity and the
//! requested fast path). Query-time dispatch is an indirect call through the
//! captured entity; the registry is never consulted again.

use std::alloc;
use std::alloc::Layout;
use std::ptr::NonNull;

use crate::error::{Error, Result};
use crate::metric::{DataType, Metric, SimdLevel};
use crate::ops::{default_arch_name, MetricRegistry, OperatorEntity};

/// Alignment boundary for every vector slot and slab, in bytes.
pub const ALIGNMENT_BYTES: usize = 64;

/// An owned byte buffer aligned to [`ALIGNMENT_BYTES`], zero-initialized.
///
/// Move-only: the buffer is released exactly once on drop.
pub struct AlignedBytes {
    ptr: NonNull<u8>,
    len: usize,
}

// The buffer is plain bytes with unique ownership.
unsafe impl Send for AlignedBytes {}
unsafe impl Sync for AlignedBytes {}

impl AlignedBytes {
    /// Allocate `len` zeroed bytes at the alignment boundary.
    ///
    /// Fails `Unavailable` when the allocator refuses.
    pub fn zeroed(len: usize) -> Result<Self> {
        if len == 0 {
            return Ok(AlignedBytes {
                ptr: NonNull::dangling(),
                len: 0,
            });
        }
        let layout = Layout::from_size_align(len, ALIGNMENT_BYTES)
            .map_err(|e| Error::invalid_argument(format!("slab layout for {len} bytes: {e}")))?;
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or_else(|| {
            Error::unavailable(format!("aligned allocation of {len} bytes failed"))
        })?;
        Ok(AlignedBytes { ptr, len })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr covers len initialized bytes for the lifetime of self.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, plus exclusive access through &mut self.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for AlignedBytes {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        // SAFETY: same layout the buffer was allocated with.
        unsafe {
            let layout = Layout::from_size_align_unchecked(self.len, ALIGNMENT_BYTES);
            alloc::dealloc(self.ptr.as_ptr(), layout);
        }
    }
}

impl std::fmt::Debug for AlignedBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBytes").field("len", &self.len).finish()
    }
}

/// Immutable description of one vector space.
#[derive(Debug, Clone)]
pub struct VectorSpace {
    /// Logical dimensionality.
    pub dim: usize,
    pub metric: Metric,
    pub data_type: DataType,
    /// Per-element width in bytes.
    pub element_size: usize,
    /// `dim × element_size`, before padding.
    pub raw_byte_size: usize,
    /// Raw byte size rounded up to [`ALIGNMENT_BYTES`]; the storage stride.
    pub vector_byte_size: usize,
    /// `vector_byte_size / element_size`.
    pub aligned_dim: usize,
    /// Whether vectors must be L2-normalized before insertion.
    pub need_normalize_vector: bool,
    /// Best instruction set the binary was compiled to assume.
    pub arch_name: &'static str,
    /// Scalar reference kernels (`SimdLevel::None`), for verification.
    pub standard: OperatorEntity,
    /// Kernels at the requested SIMD level; the query fast path.
    pub operation: OperatorEntity,
}

impl VectorSpace {
    /// Resolve a vector space from the global registry.
    ///
    /// Fails `Unavailable` when either the scalar reference entity or the
    /// entity at `simd_level` is not registered for (metric, data type).
    pub fn create(
        dim: usize,
        metric: Metric,
        data_type: DataType,
        simd_level: SimdLevel,
    ) -> Result<VectorSpace> {
        if dim == 0 {
            return Err(Error::invalid_argument("vector space dim must be non-zero"));
        }
        let element_size = data_type.element_size();
        let raw_byte_size = dim * element_size;
        let vector_byte_size =
            (raw_byte_size + ALIGNMENT_BYTES - 1) / ALIGNMENT_BYTES * ALIGNMENT_BYTES;
        let aligned_dim = vector_byte_size / element_size;

        let registry = MetricRegistry::global().read();
        let standard = registry.lookup(metric, data_type, SimdLevel::None)?;
        let operation = registry.lookup(metric, data_type, simd_level)?;
        drop(registry);
        if !operation.supports {
            return Err(Error::unavailable(format!(
                "operator for metric {:?} dtype {:?} simd {:?} is not supported",
                metric, data_type, simd_level
            )));
        }

        tracing::debug!(
            dim,
            ?metric,
            ?data_type,
            ?simd_level,
            vector_byte_size,
            "vector space created"
        );
        Ok(VectorSpace {
            dim,
            metric,
            data_type,
            element_size,
            raw_byte_size,
            vector_byte_size,
            aligned_dim,
            need_normalize_vector: operation.need_normalize_vector,
            arch_name: default_arch_name(),
            standard,
            operation,
        })
    }

    /// Distance through the fast-path kernel.
    #[inline]
    pub fn distance(&self, a: &[u8], b: &[u8]) -> f32 {
        (self.operation.distance)(a, b)
    }

    /// Distance through the scalar reference kernel.
    #[inline]
    pub fn standard_distance(&self, a: &[u8], b: &[u8]) -> f32 {
        (self.standard.distance)(a, b)
    }

    /// Normalize `input` into `output` with the fast-path kernel, when the
    /// metric carries one.
    pub fn normalize(&self, input: &[u8], output: &mut [u8]) -> Result<()> {
        let f = self.operation.normalize.ok_or_else(|| {
            Error::unavailable(format!("metric {:?} has no normalize kernel", self.metric))
        })?;
        f(input, output);
        Ok(())
    }

    /// Allocate a zeroed, aligned buffer for `n` vectors at the padded stride.
    pub fn alloc_vectors(&self, n: usize) -> Result<AlignedBytes> {
        AlignedBytes::zeroed(n * self.vector_byte_size)
    }

    /// Whether a span starts on the alignment boundary.
    #[inline]
    pub fn is_aligned(bytes: &[u8]) -> bool {
        bytes.as_ptr() as usize % ALIGNMENT_BYTES == 0
    }
}
