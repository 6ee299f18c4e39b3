//! End-to-end façade scenarios exercising `Index` the way an embedder would.

use vindex::{HnswConfig, Index, IndexKind, Metric};

fn hnsw(dims: u32, metric: Metric) -> Index {
    Index::alloc_index(IndexKind::Hnsw, HnswConfig::new(dims, metric)).expect("valid config")
}

#[test]
fn empty_index_search_reports_index_empty() {
    let idx = hnsw(4, Metric::L2Squared);
    let err = idx.search(&[0.0, 0.0, 0.0, 0.0], 5, 0).unwrap_err();
    assert_eq!(err, vindex::IndexError::IndexEmpty);
}

#[test]
fn single_element_returns_sentinel_padded_results() {
    let idx = hnsw(4, Metric::L2Squared);
    idx.insert(1, &[1.0, 0.0, 0.0, 0.0], 0).unwrap();

    let out = idx.search(&[0.9, 0.0, 0.0, 0.0], 3, 0).unwrap();
    assert_eq!(out.len(), 3);
    assert_eq!(out[0].id, 1);
    assert!((out[0].distance - 0.01).abs() < 1e-4);
    assert_eq!(out[1].id, 0);
    assert_eq!(out[1].distance, Metric::L2Squared.worst_match_value());
    assert_eq!(out[2].id, 0);
}

#[test]
fn duplicate_insert_is_rejected_and_size_stays_one() {
    let idx = hnsw(2, Metric::L2Squared);
    idx.insert(7, &[0.0, 0.0], 0).unwrap();
    let err = idx.insert(7, &[1.0, 1.0], 0).unwrap_err();
    assert_eq!(err, vindex::IndexError::DuplicatedEntry(7));
    assert_eq!(idx.size().unwrap(), 1);
}

#[test]
fn logical_delete_hides_from_results_but_preserves_size() {
    let idx = hnsw(3, Metric::L2Squared);
    for i in 1..=100u64 {
        #[allow(clippy::cast_precision_loss)]
        let v = [i as f32, (i % 5) as f32, (i % 3) as f32];
        idx.insert(i, &v, 0).unwrap();
    }
    idx.delete(42).unwrap();
    assert_eq!(idx.size().unwrap(), 100);
    assert!(!idx.contains(42).unwrap());

    for _ in 0..20 {
        let out = idx.search(&[42.0, 2.0, 0.0], 10, 0).unwrap();
        assert!(out.iter().all(|m| m.id != 42), "deleted id leaked into results: {out:?}");
    }
}

#[test]
fn deleting_the_entry_point_does_not_break_subsequent_search() {
    let idx = hnsw(2, Metric::L2Squared);
    let first = 1u64;
    idx.insert(first, &[0.0, 0.0], 0).unwrap();
    for i in 2..=30u64 {
        #[allow(clippy::cast_precision_loss)]
        let v = [i as f32 * 0.1, 0.0];
        idx.insert(i, &v, 0).unwrap();
    }
    // The first-ever insert becomes the initial entry point.
    idx.delete(first).unwrap();
    let out = idx.search(&[1.0, 0.0], 5, 0).unwrap();
    assert!(out.iter().all(|m| m.id != first));
    assert!(out.iter().any(|m| m.id != 0), "search should still find live neighbors");
}

#[test]
fn tag_filtered_search_only_returns_matching_ids_ordered_by_distance() {
    let idx = hnsw(1, Metric::L2Squared);
    for i in 1..=1000u64 {
        #[allow(clippy::cast_precision_loss)]
        let v = [i as f32];
        let tag = 1u64 << (i % 4);
        idx.insert(i, &v, tag).unwrap();
    }

    let mask = 0b0101u64;
    let out = idx.search(&[500.0], 20, mask).unwrap();
    let mut last_distance = f32::NEG_INFINITY;
    for m in &out {
        if m.id == 0 {
            continue;
        }
        assert!(m.id % 4 == 0 || m.id % 4 == 2, "id {} has a tag outside the mask", m.id);
        assert!(m.distance >= last_distance, "results must be ordered best-first");
        last_distance = m.distance;
    }
}

#[test]
fn delete_then_reinsert_establishes_new_mapping() {
    let idx = hnsw(2, Metric::L2Squared);
    idx.insert(5, &[0.0, 0.0], 0).unwrap();
    idx.delete(5).unwrap();
    idx.insert(5, &[9.0, 9.0], 0).unwrap();
    assert!(idx.contains(5).unwrap());
    let out = idx.search(&[9.0, 9.0], 1, 0).unwrap();
    assert_eq!(out[0].id, 5);
}

#[test]
fn query_k_larger_than_element_count_pads_remaining_slots_with_sentinel() {
    let idx = hnsw(2, Metric::L2Squared);
    idx.insert(1, &[0.0, 0.0], 0).unwrap();
    idx.insert(2, &[1.0, 1.0], 0).unwrap();
    let out = idx.search(&[0.0, 0.0], 10, 0).unwrap();
    assert_eq!(out.len(), 10);
    let real = out.iter().filter(|m| m.id != 0).count();
    assert_eq!(real, 2);
    for m in out.iter().skip(2) {
        assert_eq!(m.id, 0);
        assert_eq!(m.distance, Metric::L2Squared.worst_match_value());
    }
}

#[test]
fn update_context_changes_search_breadth_without_touching_metric_or_dims() {
    let idx = hnsw(2, Metric::Cosine);
    idx.insert(1, &[1.0, 0.0], 0).unwrap();
    let wide = HnswConfig::new(2, Metric::L2Squared).with_ef_search(500);
    idx.update_context(&wide, vindex::UpdateMask::SET_EF_SEARCH).unwrap();
    // dims mismatch would now surface on the next insert if dims had changed,
    // which it must not have:
    let err = idx.insert(2, &[1.0], 0).unwrap_err();
    assert!(matches!(err, vindex::IndexError::InvalidDimensions { expected: 2, .. }));
}

#[test]
fn stats_records_only_successful_operations() {
    let idx = hnsw(2, Metric::L2Squared);
    idx.insert(1, &[0.0, 0.0], 0).unwrap();
    let _ = idx.insert(1, &[0.0, 0.0], 0); // duplicate, must not be recorded
    idx.insert(2, &[1.0, 1.0], 0).unwrap();

    let stats = idx.stats();
    let insert_stats = stats.get(&vindex::OpKind::Insert).expect("insert stats present");
    assert_eq!(insert_stats.count, 2);
}
