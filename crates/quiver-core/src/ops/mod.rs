//! Operator registry: (metric × element type × SIMD level) → kernel record
//!
//! A dense three-dimensional table resolved once per vector space. Each
//! populated cell is an [`OperatorEntity`] holding the kernel function
//! pointers plus metadata; query-time dispatch is a single indirect call
//! through the entity the space captured, never a table walk.
//!
//! The process-wide registry is populated with the built-in kernels and
//! frozen via [`MetricRegistry::finish_build`] on first access, so it is
//! immutable before any store can observe it and safe to share freely.
//! A standalone [`MetricRegistry`] stays mutable until its own
//! `finish_build` call, which is where custom kernels go.

pub(crate) mod scalar;
#[cfg(target_arch = "x86_64")]
pub(crate) mod x86;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::metric::{DataType, Metric, SimdLevel};

/// Distance between two equal-length byte spans.
pub type DistanceFn = fn(&[u8], &[u8]) -> f32;

/// Norm of a single byte span.
pub type NormFn = fn(&[u8]) -> f32;

/// Normalization of `input` into `output` (same length).
pub type NormalizeFn = fn(&[u8], &mut [u8]);

/// A resolved kernel record for one (metric, element type, SIMD level) cell.
#[derive(Debug, Clone, Copy)]
pub struct OperatorEntity {
    /// False marks a placeholder that must never be dispatched.
    pub supports: bool,
    /// Whether vectors must be L2-normalized before insertion.
    pub need_normalize_vector: bool,
    pub simd_level: SimdLevel,
    pub metric: Metric,
    pub data_type: DataType,
    pub distance: DistanceFn,
    pub norm: Option<NormFn>,
    pub normalize: Option<NormalizeFn>,
}

/// Dense dispatch table over the three closed axes.
pub struct MetricRegistry {
    cells: Vec<Option<OperatorEntity>>,
    frozen: bool,
}

impl MetricRegistry {
    pub fn new() -> Self {
        MetricRegistry {
            cells: vec![None; Metric::COUNT * DataType::COUNT * SimdLevel::COUNT],
            frozen: false,
        }
    }

    /// The process-wide registry; built-ins registered and frozen on first
    /// access.
    pub fn global() -> &'static RwLock<MetricRegistry> {
        &GLOBAL
    }

    #[inline]
    fn cell_index(metric: Metric, dt: DataType, level: SimdLevel) -> usize {
        (metric.as_index() * DataType::COUNT + dt.as_index()) * SimdLevel::COUNT
            + level.as_index()
    }

    /// Install an entity in its cell.
    ///
    /// Fails `FailedPrecondition` once the registry is frozen,
    /// `InvalidArgument` for an entity whose `supports` flag is off, and
    /// `AlreadyExists` when the cell is populated and `replace` is false.
    pub fn register(&mut self, entity: OperatorEntity, replace: bool) -> Result<()> {
        if self.frozen {
            return Err(Error::failed_precondition(
                "metric registry is frozen, register before finish_build",
            ));
        }
        if !entity.supports {
            return Err(Error::invalid_argument(format!(
                "refusing unsupported operator for metric {:?} dtype {:?} simd {:?}",
                entity.metric, entity.data_type, entity.simd_level
            )));
        }
        let idx = Self::cell_index(entity.metric, entity.data_type, entity.simd_level);
        if self.cells[idx].is_some() && !replace {
            return Err(Error::already_exists(format!(
                "operator cell metric {:?} dtype {:?} simd {:?}",
                entity.metric, entity.data_type, entity.simd_level
            )));
        }
        self.cells[idx] = Some(entity);
        Ok(())
    }

    /// Resolve the entity for a cell; `Unavailable` when unpopulated.
    pub fn lookup(&self, metric: Metric, dt: DataType, level: SimdLevel) -> Result<OperatorEntity> {
        self.cells[Self::cell_index(metric, dt, level)].ok_or_else(|| {
            Error::unavailable(format!(
                "no operator registered for metric {:?} dtype {:?} simd {:?}",
                metric, dt, level
            ))
        })
    }

    /// Freeze the registry; all further registrations fail.
    pub fn finish_build(&mut self) {
        self.frozen = true;
        tracing::debug!(operators = self.len(), "metric registry frozen");
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Number of populated cells.
    pub fn len(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every populated entity, in axis order.
    pub fn all_operators(&self) -> Vec<OperatorEntity> {
        self.cells.iter().filter_map(|c| *c).collect()
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: Lazy<RwLock<MetricRegistry>> = Lazy::new(|| {
    let mut registry = MetricRegistry::new();
    register_builtins(&mut registry).expect("built-in operator registration is infallible");
    registry.finish_build();
    RwLock::new(registry)
});

/// Name of the best instruction set this binary was compiled to assume.
pub fn default_arch_name() -> &'static str {
    #[cfg(target_arch = "x86_64")]
    {
        if cfg!(target_feature = "avx512f") {
            "avx512"
        } else if cfg!(target_feature = "avx2") {
            "avx2"
        } else {
            "sse2"
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        "neon"
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        "generic"
    }
}

/// Highest SIMD level the built-in registration populated on this machine.
pub fn detect_simd_level() -> SimdLevel {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
            SimdLevel::Avx2
        } else {
            SimdLevel::Sse2
        }
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        SimdLevel::None
    }
}

fn entity(
    metric: Metric,
    dt: DataType,
    level: SimdLevel,
    distance: DistanceFn,
    norm: Option<NormFn>,
    normalize: Option<NormalizeFn>,
) -> OperatorEntity {
    OperatorEntity {
        supports: true,
        need_normalize_vector: metric.assumes_normalized(),
        simd_level: level,
        metric,
        data_type: dt,
        distance,
        norm,
        normalize,
    }
}

fn register_dense_scalar<T: scalar::Element>(r: &mut MetricRegistry, dt: DataType) -> Result<()> {
    use Metric::*;
    use SimdLevel::None as L0;

    let norm: NormFn = scalar::norm_l2::<T>;
    r.register(entity(L1, dt, L0, scalar::l1::<T>, None, None), false)?;
    r.register(entity(L2, dt, L0, scalar::l2::<T>, Some(norm), None), false)?;
    r.register(entity(Ip, dt, L0, scalar::ip::<T>, None, None), false)?;
    r.register(entity(Cosine, dt, L0, scalar::cosine::<T>, Some(norm), None), false)?;
    r.register(entity(Angle, dt, L0, scalar::angle::<T>, Some(norm), None), false)?;
    Ok(())
}

fn register_normalized_scalar<T: scalar::Element>(
    r: &mut MetricRegistry,
    dt: DataType,
    normalize: NormalizeFn,
) -> Result<()> {
    use Metric::*;
    use SimdLevel::None as L0;

    let norm: NormFn = scalar::norm_l2::<T>;
    r.register(
        entity(NormalizedL2, dt, L0, scalar::normalized_l2::<T>, Some(norm), Some(normalize)),
        false,
    )?;
    r.register(
        entity(
            NormalizedCosine,
            dt,
            L0,
            scalar::normalized_cosine::<T>,
            Some(norm),
            Some(normalize),
        ),
        false,
    )?;
    r.register(
        entity(
            NormalizedAngle,
            dt,
            L0,
            scalar::normalized_angle::<T>,
            Some(norm),
            Some(normalize),
        ),
        false,
    )?;
    Ok(())
}

#[cfg(target_arch = "x86_64")]
fn register_x86(r: &mut MetricRegistry) -> Result<()> {
    use DataType::F32;
    use Metric::*;

    let tiers: &[(SimdLevel, bool)] = &[
        (SimdLevel::Sse2, true),
        (
            SimdLevel::Avx2,
            is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma"),
        ),
    ];

    for &(level, available) in tiers {
        if !available {
            continue;
        }
        let (l1, l2, ip, cos, ang, nl2, ncos, nang): (
            DistanceFn,
            DistanceFn,
            DistanceFn,
            DistanceFn,
            DistanceFn,
            DistanceFn,
            DistanceFn,
            DistanceFn,
        ) = match level {
            SimdLevel::Sse2 => (
                x86::l1_sse2,
                x86::l2_sse2,
                x86::ip_sse2,
                x86::cosine_sse2,
                x86::angle_sse2,
                x86::normalized_l2_sse2,
                x86::normalized_cosine_sse2,
                x86::normalized_angle_sse2,
            ),
            SimdLevel::Avx2 => (
                x86::l1_avx2,
                x86::l2_avx2,
                x86::ip_avx2,
                x86::cosine_avx2,
                x86::angle_avx2,
                x86::normalized_l2_avx2,
                x86::normalized_cosine_avx2,
                x86::normalized_angle_avx2,
            ),
            _ => unreachable!(),
        };
        let (norm, normalize): (NormFn, NormalizeFn) = match level {
            SimdLevel::Sse2 => (x86::norm_l2_sse2, x86::normalize_l2_sse2),
            SimdLevel::Avx2 => (x86::norm_l2_avx2, x86::normalize_l2_avx2),
            _ => unreachable!(),
        };

        r.register(entity(L1, F32, level, l1, None, None), false)?;
        r.register(entity(L2, F32, level, l2, Some(norm), None), false)?;
        r.register(entity(Ip, F32, level, ip, None, None), false)?;
        r.register(entity(Cosine, F32, level, cos, Some(norm), None), false)?;
        r.register(entity(Angle, F32, level, ang, Some(norm), None), false)?;
        r.register(entity(NormalizedL2, F32, level, nl2, Some(norm), Some(normalize)), false)?;
        r.register(
            entity(NormalizedCosine, F32, level, ncos, Some(norm), Some(normalize)),
            false,
        )?;
        r.register(
            entity(NormalizedAngle, F32, level, nang, Some(norm), Some(normalize)),
            false,
        )?;
    }
    Ok(())
}

/// Populate a registry with every built-in kernel this binary supports.
///
/// Scalar entities cover all dense metrics for u8/f16/f32 and the bit-set
/// metrics for u8; on x86_64 the f32 dense metrics additionally get SSE2 and
/// (when detected) AVX2 entities.
pub fn register_builtins(r: &mut MetricRegistry) -> Result<()> {
    use half::f16;
    use Metric::{Hamming, Jaccard};
    use SimdLevel::None as L0;

    register_dense_scalar::<u8>(r, DataType::U8)?;
    register_dense_scalar::<f16>(r, DataType::F16)?;
    register_dense_scalar::<f32>(r, DataType::F32)?;

    register_normalized_scalar::<f16>(r, DataType::F16, scalar::normalize_l2_f16)?;
    register_normalized_scalar::<f32>(r, DataType::F32, scalar::normalize_l2_f32)?;

    r.register(entity(Hamming, DataType::U8, L0, scalar::hamming, None, None), false)?;
    r.register(entity(Jaccard, DataType::U8, L0, scalar::jaccard, None, None), false)?;

    #[cfg(target_arch = "x86_64")]
    register_x86(r)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy(metric: Metric, dt: DataType, level: SimdLevel) -> OperatorEntity {
        entity(metric, dt, level, scalar::l1::<f32>, None, None)
    }

    #[test]
    fn test_register_and_lookup() {
        let mut r = MetricRegistry::new();
        r.register(dummy(Metric::L2, DataType::F32, SimdLevel::None), false)
            .unwrap();

        let e = r.lookup(Metric::L2, DataType::F32, SimdLevel::None).unwrap();
        assert!(e.supports);
        assert_eq!(e.metric, Metric::L2);
        assert_eq!(e.data_type, DataType::F32);
    }

    #[test]
    fn test_lookup_unpopulated_cell() {
        let r = MetricRegistry::new();
        let err = r
            .lookup(Metric::L2, DataType::F32, SimdLevel::Avx512)
            .unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
    }

    #[test]
    fn test_duplicate_cell_requires_replace() {
        let mut r = MetricRegistry::new();
        r.register(dummy(Metric::L1, DataType::F32, SimdLevel::None), false)
            .unwrap();

        let err = r
            .register(dummy(Metric::L1, DataType::F32, SimdLevel::None), false)
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));

        r.register(dummy(Metric::L1, DataType::F32, SimdLevel::None), true)
            .unwrap();
    }

    #[test]
    fn test_register_after_freeze_fails() {
        let mut r = MetricRegistry::new();
        r.finish_build();
        let err = r
            .register(dummy(Metric::L1, DataType::F32, SimdLevel::None), false)
            .unwrap_err();
        assert!(matches!(err, Error::FailedPrecondition(_)));
    }

    #[test]
    fn test_unsupported_entity_rejected() {
        let mut r = MetricRegistry::new();
        let mut e = dummy(Metric::L1, DataType::F32, SimdLevel::None);
        e.supports = false;
        assert!(matches!(r.register(e, false), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_builtins_cover_scalar_reference() {
        let mut r = MetricRegistry::new();
        register_builtins(&mut r).unwrap();

        // every dense metric has a scalar f32 reference entity
        for metric in [Metric::L1, Metric::L2, Metric::Ip, Metric::Cosine, Metric::Angle] {
            for dt in [DataType::U8, DataType::F16, DataType::F32] {
                r.lookup(metric, dt, SimdLevel::None).unwrap();
            }
        }
        // bit-set metrics are u8 only
        r.lookup(Metric::Hamming, DataType::U8, SimdLevel::None).unwrap();
        r.lookup(Metric::Jaccard, DataType::U8, SimdLevel::None).unwrap();
        assert!(r.lookup(Metric::Hamming, DataType::F32, SimdLevel::None).is_err());
        // normalized metrics skip u8
        assert!(r.lookup(Metric::NormalizedL2, DataType::U8, SimdLevel::None).is_err());
    }

    #[test]
    fn test_normalized_builtins_carry_normalize_kernel() {
        let mut r = MetricRegistry::new();
        register_builtins(&mut r).unwrap();

        for metric in [Metric::NormalizedL2, Metric::NormalizedCosine, Metric::NormalizedAngle] {
            let e = r.lookup(metric, DataType::F32, SimdLevel::None).unwrap();
            assert!(e.need_normalize_vector);
            assert!(e.normalize.is_some());
        }
        let e = r.lookup(Metric::L2, DataType::F32, SimdLevel::None).unwrap();
        assert!(!e.need_normalize_vector);
    }

    #[test]
    fn test_all_operators_enumerates_populated_cells() {
        let mut r = MetricRegistry::new();
        register_builtins(&mut r).unwrap();
        let all = r.all_operators();
        assert_eq!(all.len(), r.len());
        assert!(all.iter().all(|e| e.supports));
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_sse2_builtins_present() {
        let mut r = MetricRegistry::new();
        register_builtins(&mut r).unwrap();
        let e = r.lookup(Metric::L2, DataType::F32, SimdLevel::Sse2).unwrap();
        assert_eq!(e.simd_level, SimdLevel::Sse2);
    }
}
