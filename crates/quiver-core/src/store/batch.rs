//! Fixed-capacity aligned vector slab
//!
//! One contiguous allocation of `capacity × vector_byte_size` bytes at the
//! 64-byte boundary. Slot `i` is the byte window
//! `[i × vector_byte_size, (i + 1) × vector_byte_size)`; because the stride is
//! a multiple of the alignment, every slot starts aligned.

use crate::error::Result;
use crate::space::AlignedBytes;

/// A move-only slab of vector slots.
#[derive(Debug)]
pub struct VectorBatch {
    vector_byte_size: usize,
    capacity: usize,
    data: AlignedBytes,
}

impl VectorBatch {
    /// Allocate a slab for `n` slots of `vector_byte_size` bytes each.
    ///
    /// Fails `Unavailable` when the allocator refuses. Slots are
    /// zero-initialized.
    pub fn new(vector_byte_size: usize, n: usize) -> Result<VectorBatch> {
        let data = AlignedBytes::zeroed(vector_byte_size * n)?;
        Ok(VectorBatch {
            vector_byte_size,
            capacity: n,
            data,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn vector_byte_size(&self) -> usize {
        self.vector_byte_size
    }

    /// The slot at `index`, or `None` when `index ≥ capacity`. Never panics.
    #[inline]
    pub fn at(&self, index: usize) -> Option<&[u8]> {
        if index >= self.capacity {
            return None;
        }
        let start = index * self.vector_byte_size;
        Some(&self.data.as_slice()[start..start + self.vector_byte_size])
    }

    /// Mutable view of the slot at `index`, or `None` when out of range.
    #[inline]
    pub fn at_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        if index >= self.capacity {
            return None;
        }
        let start = index * self.vector_byte_size;
        Some(&mut self.data.as_mut_slice()[start..start + self.vector_byte_size])
    }

    /// Copy exactly `vector_byte_size` bytes from `value` into slot `index`.
    ///
    /// No-op when `index ≥ capacity`. `value` must be at least
    /// `vector_byte_size` bytes long.
    pub fn set(&mut self, index: usize, value: &[u8]) {
        let width = self.vector_byte_size;
        if let Some(slot) = self.at_mut(index) {
            slot.copy_from_slice(&value[..width]);
        }
    }

    /// Zero-fill slot `index`; no-op when out of range.
    pub fn clear(&mut self, index: usize) {
        if let Some(slot) = self.at_mut(index) {
            slot.fill(0);
        }
    }

    /// The whole slab.
    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }
}
