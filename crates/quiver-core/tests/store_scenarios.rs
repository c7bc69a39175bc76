//! End-to-end store scenarios
//!
//! Exercises the facade the way the index layer drives it: allocation and
//! reuse, trailing compaction, tombstones, snapshot stamping, kernel
//! agreement between the fast path and the scalar reference, and slot
//! alignment.

use quiver_core::{
    detect_simd_level, DataType, Error, MemStore, Metric, MetricRegistry, SimdLevel, StoreOptions,
    VectorSpace, ALIGNMENT_BYTES, TOMBSTONE,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn small_store() -> MemStore {
    MemStore::open(StoreOptions {
        dim: 8,
        metric: Metric::L2,
        data_type: DataType::F32,
        simd_level: SimdLevel::None,
        reserved: 5,
        batch_size: 4,
        max_elements: 1024,
    })
    .unwrap()
}

fn payload(store: &MemStore, seed: f32) -> Vec<u8> {
    let space = store.vector_space();
    let values: Vec<f32> = (0..space.dim).map(|i| seed * 10.0 + i as f32).collect();
    let mut bytes = vec![0u8; space.vector_byte_size];
    bytes[..values.len() * 4].copy_from_slice(bytemuck::cast_slice(&values));
    bytes
}

#[test]
fn fresh_store_allocates_past_reserved_prefix() {
    let store = small_store();
    // dim 8 × f32 = 32 raw bytes, padded to one 64-byte stride
    assert_eq!(store.vector_space().vector_byte_size, 64);

    assert_eq!(store.add_vector(1, 100, &payload(&store, 1.0)).unwrap(), 5);
    assert_eq!(store.add_vector(2, 101, &payload(&store, 2.0)).unwrap(), 6);

    let state = store.read();
    assert!(state.id_manager().ids().len() >= 7);
    assert_eq!(state.size(), 2);
    assert_eq!(state.bytes_size(), 2 * 64);
}

#[test]
fn trailing_remove_compacts_and_reuses_from_next_id() {
    let store = small_store();
    store.add_vector(1, 100, &payload(&store, 1.0)).unwrap();
    store.add_vector(2, 101, &payload(&store, 2.0)).unwrap();

    store.remove_vector_by_label(3, 101);
    {
        let state = store.read();
        assert_eq!(state.id_manager().next_id(), 6);
        assert!(state.id_manager().free_ids().is_empty());
    }

    // the freed tail comes back from next_id, not the (empty) free set
    assert_eq!(store.add_vector(4, 102, &payload(&store, 3.0)).unwrap(), 6);
}

#[test]
fn interior_remove_leaves_hole_and_reuses_it() {
    let store = small_store();
    store.add_vector(1, 100, &payload(&store, 1.0)).unwrap();
    store.add_vector(2, 101, &payload(&store, 2.0)).unwrap();

    store.remove_vector_by_label(3, 100);
    {
        let state = store.read();
        assert_eq!(state.id_manager().next_id(), 7);
        assert_eq!(
            state.id_manager().free_ids().iter().copied().collect::<Vec<_>>(),
            vec![5]
        );
    }

    assert_eq!(store.add_vector(4, 103, &payload(&store, 4.0)).unwrap(), 5);
}

#[test]
fn tombstone_is_logical_not_physical() {
    let store = small_store();
    let bytes = payload(&store, 7.0);
    let lid = store.add_vector(1, 200, &bytes).unwrap();

    store.tombstone_vector_by_label(2, 200);

    let state = store.read();
    assert_eq!(state.id_manager().local_entity(lid).unwrap().status, TOMBSTONE);
    assert_eq!(state.tombstones(), 1);
    assert_eq!(state.tombstone_local_ids(), vec![lid]);
    assert_eq!(state.tombstone_labels(), vec![200]);
    // the bytes stay readable, only the status changed
    assert_eq!(state.get_vector_by_label(200).unwrap(), bytes.as_slice());
    assert_eq!(state.get_id(200).unwrap(), lid);
}

#[test]
fn duplicate_label_leaves_store_untouched() {
    let store = small_store();
    store.add_vector(1, 100, &payload(&store, 1.0)).unwrap();

    let err = store.add_vector(2, 100, &payload(&store, 9.0)).unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)));

    assert_eq!(store.size(), 1);
    assert_eq!(store.snapshot_id(), 1);
    assert_eq!(store.get_vector_by_label(100).unwrap(), payload(&store, 1.0));
}

#[test]
fn kernel_selection_by_simd_level() {
    // AVX2 entities exist only when the machine supports them; either the
    // space resolves with matching metadata or creation reports Unavailable.
    match VectorSpace::create(8, Metric::L2, DataType::F32, SimdLevel::Avx2) {
        Ok(space) => {
            assert_eq!(detect_simd_level(), SimdLevel::Avx2);
            assert!(!space.need_normalize_vector);
            assert_eq!(space.operation.simd_level, SimdLevel::Avx2);
            assert_eq!(space.standard.simd_level, SimdLevel::None);
            assert_eq!(space.arch_name, quiver_core::default_arch_name());
        }
        Err(err) => {
            assert_ne!(detect_simd_level(), SimdLevel::Avx2);
            assert!(matches!(err, Error::Unavailable(_)));
        }
    }
}

#[test]
fn snapshot_id_tracks_every_mutation() {
    let store = small_store();
    assert_eq!(store.snapshot_id(), 0);

    store.add_vector(10, 1, &payload(&store, 1.0)).unwrap();
    assert_eq!(store.snapshot_id(), 10);

    store.set_vector(11, 1, &payload(&store, 2.0)).unwrap();
    assert_eq!(store.snapshot_id(), 11);

    store.tombstone_vector_by_label(12, 1);
    assert_eq!(store.snapshot_id(), 12);

    store.remove_vector_by_label(13, 1);
    assert_eq!(store.snapshot_id(), 13);
}

#[test]
fn every_returned_span_is_aligned() {
    let store = small_store();
    let mut lids = Vec::new();
    // span three batches so batch boundaries are covered
    for label in 0..10u64 {
        lids.push(store.add_vector(label + 1, label, &payload(&store, label as f32)).unwrap());
    }

    let state = store.read();
    for (label, lid) in lids.iter().enumerate() {
        let by_label = state.get_vector_by_label(label as u64).unwrap();
        let by_id = state.get_vector_by_id(*lid).unwrap();
        assert_eq!(by_label.as_ptr() as usize % ALIGNMENT_BYTES, 0);
        assert_eq!(by_id.as_ptr() as usize % ALIGNMENT_BYTES, 0);
        assert_eq!(by_label, by_id);
    }
}

#[test]
fn reserved_mappings_survive_normal_churn() {
    let store = small_store();
    {
        // the coordinator path installs reserved entry points directly
        let mut state = store.write();
        assert_eq!(state.id_manager().reserved_id(), 5);
        state.id_manager_mut().set_reserved_id(3, 9999);
    }
    for label in 0..8u64 {
        store.add_vector(label + 1, label, &payload(&store, label as f32)).unwrap();
    }
    store.remove_vector_by_label(100, 7);

    // allocation, freeing and compaction never touched the reserved mapping
    assert_eq!(store.get_id(9999).unwrap(), 3);
}

#[test]
fn fast_kernels_agree_with_scalar_reference() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let registry = MetricRegistry::global().read();

    for entity in registry.all_operators() {
        if entity.simd_level == SimdLevel::None || entity.data_type != DataType::F32 {
            continue;
        }
        let standard = registry
            .lookup(entity.metric, entity.data_type, SimdLevel::None)
            .unwrap();

        for round in 0..50 {
            // uneven length exercises the scalar tails
            let dim = 16 + (round % 21);
            let mut a: Vec<f32> = (0..dim).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect();
            let mut b: Vec<f32> = (0..dim).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect();
            if entity.need_normalize_vector {
                normalize(&mut a);
                normalize(&mut b);
            }
            let (ab, bb): (&[u8], &[u8]) =
                (bytemuck::cast_slice(&a), bytemuck::cast_slice(&b));

            let fast = (entity.distance)(ab, bb);
            let reference = (standard.distance)(ab, bb);
            let tolerance = reference.abs().max(1.0) * 1e-4;
            assert!(
                (fast - reference).abs() < tolerance,
                "{:?} {:?} {:?}: fast {fast} vs scalar {reference}",
                entity.metric,
                entity.data_type,
                entity.simd_level,
            );
        }
    }
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
