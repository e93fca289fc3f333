mod common;

use common::{add, service, service_with};
use std::sync::Arc;
use witness_index::{FragmentRef, IndexerConfig};

const EPS: f64 = 1e-12;

#[test]
fn idf_matches_hand_computed_value() {
    let dir = tempfile::tempdir().unwrap();
    let (service, registry) = service(dir.path());
    add(&service, &registry, "R1", "F1", "saudade mar", true);
    add(&service, &registry, "R2", "F2", "ceu sol", true);
    add(&service, &registry, "R3", "F3", "terra vento", true);
    // Non-representative witnesses never count towards document frequency.
    add(&service, &registry, "X1", "F2", "saudade saudade", false);

    let weights = service.tfidf(&registry.fragment("F1")).unwrap();
    let expected = 0.5 * (3.0f64 / 2.0).ln();
    assert!((weights.get("saudade").unwrap() - expected).abs() < EPS);
    assert!((weights.get("mar").unwrap() - expected).abs() < EPS);
    assert_eq!(weights.top_terms(10), vec!["mar".to_string(), "saudade".to_string()]);
}

#[test]
fn term_frequency_is_normalized_by_document_length() {
    let dir = tempfile::tempdir().unwrap();
    let (service, registry) = service(dir.path());
    let witness = registry.insert("A", "F1", "the quick fox the", true);
    service.add_document(&witness).unwrap();

    let tf = service.term_frequency(&witness).unwrap();
    assert_eq!(tf.len(), 3);
    assert!((tf["the"] - 0.5).abs() < EPS);
    assert!((tf["quick"] - 0.25).abs() < EPS);
    assert!((tf.values().sum::<f64>() - 1.0).abs() < EPS);

    let unknown = registry.insert("Z", "F9", "never indexed", false);
    assert!(service.term_frequency(&unknown).unwrap().is_empty());
}

#[test]
fn cached_weights_are_reused_without_index_io() {
    let dir = tempfile::tempdir().unwrap();
    let (service, registry) = service(dir.path());
    add(&service, &registry, "A", "F1", "the quick fox", true);
    add(&service, &registry, "B", "F2", "the lazy dog", true);
    let fragment = registry.fragment("F1");

    assert!(!service.is_cached("F1"));
    let first = service.tfidf(&fragment).unwrap();
    assert!(service.is_cached("F1"));
    assert!(!service.is_cached("F2"));
    let sessions = service.store().sessions_opened();
    let second = service.tfidf(&fragment).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(service.store().sessions_opened(), sessions);
    assert_eq!(service.tfidf_terms(&fragment, 2).unwrap().len(), 2);
    assert_eq!(service.store().sessions_opened(), sessions);

    service.clear_cache();
    assert_eq!(service.cached_fragments(), 0);
    assert!(!service.is_cached("F1"));
    let third = service.tfidf(&fragment).unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(*first, *third);
    assert!(service.store().sessions_opened() > sessions);
}

#[test]
fn cache_is_not_refreshed_by_reindexing() {
    let dir = tempfile::tempdir().unwrap();
    let (service, registry) = service(dir.path());
    add(&service, &registry, "A", "F1", "mar salgado", true);
    add(&service, &registry, "B", "F2", "ceu azul", true);
    let fragment = registry.fragment("F1");
    assert!(service.tfidf(&fragment).unwrap().get("mar").is_some());

    let updated = registry.insert("A", "F1", "terra seca", true);
    service.reindex_document(&updated).unwrap();
    assert!(service.tfidf(&fragment).unwrap().get("mar").is_some());

    service.clear_cache();
    let fresh = service.tfidf(&fragment).unwrap();
    assert!(fresh.get("mar").is_none());
    assert!(fresh.get("terra").is_some());
}

#[test]
fn weights_are_truncated_to_significant_terms() {
    let dir = tempfile::tempdir().unwrap();
    let (service, registry) = service(dir.path());
    let mut words = Vec::new();
    for i in 0..1200 {
        for _ in 0..(i % 3) + 1 {
            words.push(format!("t{i:04}"));
        }
    }
    add(&service, &registry, "BIG", "F1", &words.join(" "), true);
    add(&service, &registry, "SMALL", "F2", "t0001 t0002 outra", true);
    add(&service, &registry, "OTHER", "F3", "alma pequena", true);

    let weights = service.tfidf(&registry.fragment("F1")).unwrap();
    assert_eq!(weights.len(), 1000);
    assert!(weights.iter().all(|(_, w)| w > 0.0));
    let values: Vec<f64> = weights.iter().map(|(_, w)| w).collect();
    assert!(values.windows(2).all(|w| w[0] >= w[1]));
    let terms: Vec<&str> = weights.iter().map(|(t, _)| t).collect();
    for pair in weights.iter().collect::<Vec<_>>().windows(2) {
        if pair[0].1 == pair[1].1 {
            assert!(pair[0].0 < pair[1].0);
        }
    }
    assert!(!terms.contains(&"t0001"));
}

#[test]
fn restricting_to_terms() {
    let dir = tempfile::tempdir().unwrap();
    let (service, registry) = service(dir.path());
    add(&service, &registry, "A", "F1", "the quick fox", true);
    add(&service, &registry, "B", "F2", "the lazy dog", true);
    let fragment = registry.fragment("F1");

    let some = service.tfidf_for_terms(&fragment, &["fox", "the", "absent"]).unwrap();
    assert_eq!(some.len(), 2);
    assert!(some.get("quick").is_none());
    assert_eq!(some.get("fox"), service.tfidf(&fragment).unwrap().get("fox"));
}

#[test]
fn missing_term_vectors_give_empty_weights() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = IndexerConfig::new(dir.path());
    config.store_term_vectors = false;
    let (service, registry) = service_with(config);
    add(&service, &registry, "A", "F1", "the quick fox", true);

    let witness = registry.insert("A", "F1", "the quick fox", true);
    assert!(service.term_frequency(&witness).unwrap().is_empty());
    assert!(service.tfidf(&registry.fragment("F1")).unwrap().is_empty());
    assert_eq!(service.search("quick").unwrap().len(), 1);
}

#[test]
fn non_representative_witness_has_no_fragment_weights() {
    let dir = tempfile::tempdir().unwrap();
    let (service, registry) = service(dir.path());
    add(&service, &registry, "C", "F1", "the quick fox", false);

    let fragment = FragmentRef::new("F1", "C");
    assert!(service.tfidf(&fragment).unwrap().is_empty());
    assert_eq!(service.cached_fragments(), 1);
}

#[test]
fn failures_are_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let (service, registry) = service(dir.path());
    add(&service, &registry, "A", "F1", "the quick fox", true);
    let meta = dir.path().join("meta.json");
    let good = std::fs::read(&meta).unwrap();
    std::fs::write(&meta, b"{").unwrap();

    let fragment = registry.fragment("F1");
    assert!(service.tfidf(&fragment).unwrap_err().is_unavailable());
    assert_eq!(service.cached_fragments(), 0);
    assert!(!service.is_cached("F1"));

    std::fs::write(&meta, good).unwrap();
    assert!(!service.tfidf(&fragment).unwrap().is_empty());
    assert!(service.is_cached("F1"));
}
