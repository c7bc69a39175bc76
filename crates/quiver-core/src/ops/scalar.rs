//! Scalar reference kernels
//!
//! One generic implementation per metric, monomorphized over the element
//! type. These are the `SimdLevel::None` entities in the registry: every
//! vector space resolves one as its verification kernel, and non-x86 targets
//! run them as the fast path too (LLVM auto-vectorizes the loops under
//! `-C target-cpu=native`).
//!
//! Kernel inputs are raw byte spans of identical length. Spans must be
//! aligned for the element type; batch slots and `AlignedBytes` buffers
//! always are.

use half::f16;

/// Element type an interpretation of the byte span promotes to f32.
pub(crate) trait Element: bytemuck::Pod {
    fn to_f32(self) -> f32;
}

impl Element for u8 {
    #[inline(always)]
    fn to_f32(self) -> f32 {
        self as f32
    }
}

impl Element for f16 {
    #[inline(always)]
    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }
}

impl Element for f32 {
    #[inline(always)]
    fn to_f32(self) -> f32 {
        self
    }
}

#[inline(always)]
fn cast<T: Element>(bytes: &[u8]) -> impl Iterator<Item = f32> + '_ {
    bytemuck::cast_slice::<u8, T>(bytes).iter().map(|v| v.to_f32())
}

// ============================================================================
// Dense metrics
// ============================================================================

pub(crate) fn l1<T: Element>(a: &[u8], b: &[u8]) -> f32 {
    cast::<T>(a).zip(cast::<T>(b)).map(|(x, y)| (x - y).abs()).sum()
}

pub(crate) fn l2<T: Element>(a: &[u8], b: &[u8]) -> f32 {
    let sum: f32 = cast::<T>(a)
        .zip(cast::<T>(b))
        .map(|(x, y)| (x - y) * (x - y))
        .sum();
    sum.sqrt()
}

pub(crate) fn ip<T: Element>(a: &[u8], b: &[u8]) -> f32 {
    cast::<T>(a).zip(cast::<T>(b)).map(|(x, y)| x * y).sum()
}

/// Dot product and both squared norms in a single pass.
#[inline]
fn dot_and_norms<T: Element>(a: &[u8], b: &[u8]) -> (f32, f32, f32) {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in cast::<T>(a).zip(cast::<T>(b)) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    (dot, norm_a, norm_b)
}

/// Cosine of the angle between the vectors; 0 when either norm is 0.
pub(crate) fn cosine<T: Element>(a: &[u8], b: &[u8]) -> f32 {
    let (dot, norm_a, norm_b) = dot_and_norms::<T>(a, b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b).sqrt()
}

pub(crate) fn angle<T: Element>(a: &[u8], b: &[u8]) -> f32 {
    cosine::<T>(a, b).clamp(-1.0, 1.0).acos()
}

// ============================================================================
// Normalized metrics (inputs assumed unit length)
// ============================================================================

pub(crate) fn normalized_l2<T: Element>(a: &[u8], b: &[u8]) -> f32 {
    // ||a - b||² = 2 - 2·(a · b) for unit vectors
    let v = 2.0 - 2.0 * ip::<T>(a, b);
    if v < 0.0 {
        return 0.0;
    }
    v.sqrt()
}

pub(crate) fn normalized_cosine<T: Element>(a: &[u8], b: &[u8]) -> f32 {
    ip::<T>(a, b)
}

pub(crate) fn normalized_angle<T: Element>(a: &[u8], b: &[u8]) -> f32 {
    ip::<T>(a, b).clamp(-1.0, 1.0).acos()
}

// ============================================================================
// Norm / normalize
// ============================================================================

pub(crate) fn norm_l2<T: Element>(a: &[u8]) -> f32 {
    cast::<T>(a).map(|x| x * x).sum::<f32>().sqrt()
}

/// L2-normalize `input` into `output`; zero-fills the output when the input
/// norm is 0.
pub(crate) fn normalize_l2_f32(input: &[u8], output: &mut [u8]) {
    let norm = norm_l2::<f32>(input);
    let src = bytemuck::cast_slice::<u8, f32>(input);
    let dst = bytemuck::cast_slice_mut::<u8, f32>(output);
    if norm == 0.0 {
        dst.fill(0.0);
        return;
    }
    for (d, s) in dst.iter_mut().zip(src) {
        *d = s / norm;
    }
}

pub(crate) fn normalize_l2_f16(input: &[u8], output: &mut [u8]) {
    let norm = norm_l2::<f16>(input);
    let src = bytemuck::cast_slice::<u8, f16>(input);
    let dst = bytemuck::cast_slice_mut::<u8, f16>(output);
    if norm == 0.0 {
        dst.fill(f16::from_f32(0.0));
        return;
    }
    for (d, s) in dst.iter_mut().zip(src) {
        *d = f16::from_f32(s.to_f32() / norm);
    }
}

// ============================================================================
// Bit-set metrics (u8 payload read as packed u64 words)
// ============================================================================

#[inline]
fn u64_words(bytes: &[u8]) -> impl Iterator<Item = u64> + '_ {
    bytes
        .chunks_exact(8)
        .map(|w| u64::from_le_bytes(w.try_into().unwrap()))
}

pub(crate) fn hamming(a: &[u8], b: &[u8]) -> f32 {
    u64_words(a)
        .zip(u64_words(b))
        .map(|(x, y)| (x ^ y).count_ones())
        .sum::<u32>() as f32
}

/// Jaccard distance over bit sets; 0 when the union is empty.
pub(crate) fn jaccard(a: &[u8], b: &[u8]) -> f32 {
    let mut inter = 0u64;
    let mut union = 0u64;
    for (x, y) in u64_words(a).zip(u64_words(b)) {
        inter += (x & y).count_ones() as u64;
        union += (x | y).count_ones() as u64;
    }
    if union == 0 {
        return 0.0;
    }
    1.0 - inter as f32 / union as f32
}
