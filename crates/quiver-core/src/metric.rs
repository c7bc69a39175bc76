//! Closed enums for the three dispatch axes: metric, element type, SIMD level.
//!
//! The operator registry is a dense table indexed by these axes, so each enum
//! exposes a stable `as_index` and a `COUNT` for table sizing.

use serde::{Deserialize, Serialize};

/// Distance metric selecting a kernel family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    L1,
    L2,
    /// Inner product (raw dot product, higher = more similar).
    Ip,
    /// Bit-set metric over packed u64 words.
    Hamming,
    /// Bit-set metric over packed u64 words.
    Jaccard,
    Cosine,
    Angle,
    /// Assumes inputs are already L2-normalized.
    NormalizedL2,
    /// Assumes inputs are already L2-normalized.
    NormalizedCosine,
    /// Assumes inputs are already L2-normalized.
    NormalizedAngle,
}

impl Metric {
    pub const COUNT: usize = 10;

    pub const ALL: [Metric; Metric::COUNT] = [
        Metric::L1,
        Metric::L2,
        Metric::Ip,
        Metric::Hamming,
        Metric::Jaccard,
        Metric::Cosine,
        Metric::Angle,
        Metric::NormalizedL2,
        Metric::NormalizedCosine,
        Metric::NormalizedAngle,
    ];

    #[inline]
    pub fn as_index(self) -> usize {
        self as usize
    }

    /// Whether kernels for this metric assume L2-normalized inputs.
    pub fn assumes_normalized(self) -> bool {
        matches!(
            self,
            Metric::NormalizedL2 | Metric::NormalizedCosine | Metric::NormalizedAngle
        )
    }
}

/// Element type of the stored vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    U8,
    F16,
    F32,
}

impl DataType {
    pub const COUNT: usize = 3;

    #[inline]
    pub fn as_index(self) -> usize {
        self as usize
    }

    /// Per-element width in bytes.
    #[inline]
    pub fn element_size(self) -> usize {
        match self {
            DataType::U8 => 1,
            DataType::F16 => 2,
            DataType::F32 => 4,
        }
    }
}

/// Instruction-set tier a kernel was compiled for.
///
/// `None` is the scalar reference tier; it is always populated for every
/// built-in (metric, data type) combination and is what the vector-space
/// factory resolves as the verification kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimdLevel {
    None,
    Sse2,
    Avx2,
    Avx512,
}

impl SimdLevel {
    pub const COUNT: usize = 4;

    pub const ALL: [SimdLevel; SimdLevel::COUNT] = [
        SimdLevel::None,
        SimdLevel::Sse2,
        SimdLevel::Avx2,
        SimdLevel::Avx512,
    ];

    #[inline]
    pub fn as_index(self) -> usize {
        self as usize
    }
}
