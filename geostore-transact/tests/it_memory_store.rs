//! Memory store transactions end to end.

#[allow(dead_code)]
mod tracing_test_utils;

use geostore_core::{
    parse_wkt, read_all, AttributeBinding, AttributeValue, Envelope, Feature, FeatureType,
    GenericName,
};
use geostore_filter::{literal, property, Filter};
use geostore_transact::{MemoryDataStore, MemoryStoreConfig, Query, TransactError, Transaction};
use std::sync::Arc;
use tracing::Level;
use tracing_test_utils::init_test_tracing;

fn roads() -> Arc<FeatureType> {
    FeatureType::builder("roads")
        .attribute("name", AttributeBinding::String)
        .attribute("lanes", AttributeBinding::Long)
        .geometry("geom", None)
        .build()
        .unwrap()
}

fn road(ft: &Arc<FeatureType>, id: &str, name: &str, lanes: i64, wkt: &str) -> Feature {
    Feature::builder(ft)
        .set("name", name)
        .unwrap()
        .set("lanes", lanes)
        .unwrap()
        .set("geom", parse_wkt(wkt).unwrap())
        .unwrap()
        .build(id)
        .unwrap()
}

fn store_with(config: MemoryStoreConfig) -> (MemoryDataStore, Arc<FeatureType>) {
    let store = MemoryDataStore::new(config);
    let ft = roads();
    store.create_schema(ft.clone()).unwrap();
    (store, ft)
}

/// Store with `roads.1`..`roads.3` committed.
fn seeded() -> (MemoryDataStore, Arc<FeatureType>) {
    let (store, ft) = store_with(MemoryStoreConfig::default());
    store
        .add_features(
            &Transaction::auto_commit(),
            "roads",
            vec![
                road(&ft, "tmp", "Main", 2, "LINESTRING(0 0, 10 0)"),
                road(&ft, "tmp", "High", 4, "LINESTRING(0 5, 10 5)"),
                road(&ft, "tmp", "Mill", 1, "LINESTRING(20 20, 30 30)"),
            ],
        )
        .unwrap();
    (store, ft)
}

fn ids(store: &MemoryDataStore, txn: &Transaction, query: &Query) -> Vec<String> {
    let mut reader = store.feature_reader(txn, query).unwrap();
    read_all(&mut reader)
        .unwrap()
        .iter()
        .map(|f| f.id().to_string())
        .collect()
}

#[test]
fn pending_changes_visible_only_inside_transaction() {
    let (store, ft) = seeded();
    let txn = Transaction::new();
    let auto = Transaction::auto_commit();

    let added = store
        .add_features(&txn, "roads", vec![road(&ft, "tmp", "New", 2, "POINT(1 1)")])
        .unwrap();
    assert_eq!(added[0].as_str(), "roads.4");
    store
        .remove_features(&txn, "roads", &Filter::fids(["roads.1"]))
        .unwrap();

    assert_eq!(ids(&store, &txn, &Query::all("roads")), vec!["roads.2", "roads.3", "roads.4"]);
    assert_eq!(ids(&store, &auto, &Query::all("roads")), vec!["roads.1", "roads.2", "roads.3"]);

    store.commit(&txn).unwrap();
    assert!(txn.is_closed());
    assert_eq!(ids(&store, &auto, &Query::all("roads")), vec!["roads.2", "roads.3", "roads.4"]);
}

#[test]
fn rollback_discards_changes() {
    let (store, ft) = seeded();
    let txn = Transaction::new();
    store
        .add_features(&txn, "roads", vec![road(&ft, "tmp", "New", 2, "POINT(1 1)")])
        .unwrap();
    store
        .modify_features(
            &txn,
            "roads",
            &[("lanes", AttributeValue::Long(6))],
            &Filter::Include,
        )
        .unwrap();
    store.rollback(&txn).unwrap();

    let auto = Transaction::auto_commit();
    assert_eq!(store.count(&auto, &Query::all("roads")).unwrap(), 3);
    let wide = Query::filtered("roads", Filter::equals(property("lanes"), literal(6)));
    assert_eq!(store.count(&auto, &wide).unwrap(), 0);
}

#[test]
fn closed_transaction_rejects_use() {
    let (store, ft) = seeded();
    let txn = Transaction::new();
    store.rollback(&txn).unwrap();

    let err = store
        .add_features(&txn, "roads", vec![road(&ft, "tmp", "New", 2, "POINT(1 1)")])
        .unwrap_err();
    assert!(matches!(err, TransactError::TransactionClosed(id) if id == txn.id()));
    assert!(matches!(
        store.feature_reader(&txn, &Query::all("roads")),
        Err(TransactError::TransactionClosed(_))
    ));
    assert!(matches!(store.commit(&txn), Err(TransactError::TransactionClosed(_))));
}

#[test]
fn modify_shadows_committed_value_in_filter() {
    let (store, _ft) = seeded();
    let txn = Transaction::new();
    let changed = store
        .modify_features(
            &txn,
            "roads",
            &[("lanes", AttributeValue::Long(8))],
            &Filter::fids(["roads.1"]),
        )
        .unwrap();
    assert_eq!(changed, 1);

    let wide = Query::filtered("roads", Filter::greater_than(property("lanes"), literal(3)));
    assert_eq!(ids(&store, &txn, &wide), vec!["roads.1", "roads.2"]);

    let narrow = Query::filtered("roads", Filter::equals(property("lanes"), literal(2)));
    assert!(ids(&store, &txn, &narrow).is_empty());
}

#[test]
fn remove_then_readd_with_provided_fid() {
    let (store, ft) = store_with(MemoryStoreConfig::default().with_use_provided_fid(true));
    let auto = Transaction::auto_commit();
    store
        .add_features(&auto, "roads", vec![road(&ft, "r1", "Main", 2, "POINT(0 0)")])
        .unwrap();

    let txn = Transaction::new();
    let dup = store
        .add_features(&txn, "roads", vec![road(&ft, "r1", "Again", 2, "POINT(0 0)")])
        .unwrap_err();
    assert!(matches!(dup, TransactError::DuplicateFeature(_)));

    store
        .remove_features(&txn, "roads", &Filter::fids(["r1"]))
        .unwrap();
    store
        .add_features(&txn, "roads", vec![road(&ft, "r1", "Rebuilt", 3, "POINT(0 0)")])
        .unwrap();
    store.commit(&txn).unwrap();

    let mut reader = store.feature_reader(&auto, &Query::all("roads")).unwrap();
    let features = read_all(&mut reader).unwrap();
    assert_eq!(features.len(), 1);
    assert_eq!(features[0].attribute("name").unwrap().as_str(), Some("Rebuilt"));
}

#[test]
fn commit_conflict_leaves_transaction_open() {
    let (store, ft) = store_with(MemoryStoreConfig::default().with_use_provided_fid(true));
    let first = Transaction::new();
    let second = Transaction::new();
    store
        .add_features(&first, "roads", vec![road(&ft, "r1", "A", 1, "POINT(0 0)")])
        .unwrap();
    store
        .add_features(&second, "roads", vec![road(&ft, "r1", "B", 1, "POINT(0 0)")])
        .unwrap();
    store
        .add_features(&second, "roads", vec![road(&ft, "r2", "C", 1, "POINT(1 1)")])
        .unwrap();
    store.commit(&first).unwrap();

    let (traces, _guard) = init_test_tracing();
    let err = store.commit(&second).unwrap_err();
    assert!(matches!(err, TransactError::CommitConflict { ref type_name, .. } if type_name == "roads"));
    assert!(!second.is_closed());

    // nothing from the failed commit is applied
    let auto = Transaction::auto_commit();
    assert_eq!(ids(&store, &auto, &Query::all("roads")), vec!["r1"]);

    let warnings = traces.find_events(Level::WARN, "commit conflict");
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].field("id"), Some("r1"));
    assert_eq!(warnings[0].parent_name.as_deref(), Some("store_commit"));

    store.rollback(&second).unwrap();
}

#[test]
fn modify_conflicts_with_concurrent_delete() {
    let (store, _ft) = seeded();
    let txn = Transaction::new();
    store
        .modify_features(
            &txn,
            "roads",
            &[("name", AttributeValue::from("Renamed"))],
            &Filter::fids(["roads.2"]),
        )
        .unwrap();
    store
        .remove_features(&Transaction::auto_commit(), "roads", &Filter::fids(["roads.2"]))
        .unwrap();

    assert!(matches!(
        store.commit(&txn),
        Err(TransactError::CommitConflict { .. })
    ));
}

#[test]
fn commit_opens_span() {
    let (store, ft) = seeded();
    let (traces, _guard) = init_test_tracing();
    let txn = Transaction::new();
    store
        .add_features(&txn, "roads", vec![road(&ft, "tmp", "New", 2, "POINT(1 1)")])
        .unwrap();
    store.commit(&txn).unwrap();

    let spans = traces.find_spans("store_commit");
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].level, Level::INFO);
    assert_eq!(spans[0].field("types"), Some("1"));
    assert_eq!(spans[0].field("txn"), Some(txn.id().to_string().as_str()));
}

#[test]
fn count_and_bounds_follow_transaction_view() {
    let (store, ft) = seeded();
    let auto = Transaction::auto_commit();
    assert_eq!(
        store.bounds(&auto, &Query::all("roads")).unwrap(),
        Some(Envelope::new(0.0, 0.0, 30.0, 30.0))
    );

    let txn = Transaction::new();
    store
        .remove_features(&txn, "roads", &Filter::fids(["roads.3"]))
        .unwrap();
    store
        .add_features(&txn, "roads", vec![road(&ft, "tmp", "Spur", 1, "POINT(-5 2)")])
        .unwrap();
    assert_eq!(store.count(&txn, &Query::all("roads")).unwrap(), 3);
    assert_eq!(
        store.bounds(&txn, &Query::all("roads")).unwrap(),
        Some(Envelope::new(-5.0, 0.0, 10.0, 5.0))
    );

    let none = Query::filtered("roads", Filter::equals(property("name"), literal("Nowhere")));
    assert_eq!(store.bounds(&txn, &none).unwrap(), None);
}

#[test]
fn bbox_query_through_transaction() {
    let (store, ft) = seeded();
    let txn = Transaction::new();
    store
        .add_features(&txn, "roads", vec![road(&ft, "tmp", "Loop", 1, "POINT(25 25)")])
        .unwrap();
    let query = Query::filtered("roads", Filter::bbox("geom", Envelope::new(15.0, 15.0, 35.0, 35.0)));
    assert_eq!(ids(&store, &txn, &query), vec!["roads.3", "roads.4"]);
}

#[test]
fn max_features_caps_overlay() {
    let (store, ft) = seeded();
    let txn = Transaction::new();
    store
        .add_features(&txn, "roads", vec![road(&ft, "tmp", "New", 2, "POINT(1 1)")])
        .unwrap();
    let query = Query::all("roads").with_max_features(2);
    assert_eq!(ids(&store, &txn, &query), vec!["roads.1", "roads.2"]);
    assert_eq!(store.count(&txn, &query).unwrap(), 2);
}

#[test]
fn type_names_take_configured_namespace() {
    let store = MemoryDataStore::new(MemoryStoreConfig::default().with_namespace("http://example.org/gis"));
    store.create_schema(roads()).unwrap();
    let rivers = FeatureType::builder(GenericName::qualified("urn:hydro", "rivers"))
        .attribute("name", AttributeBinding::String)
        .build()
        .unwrap();
    store.create_schema(rivers).unwrap();

    let names = store.type_names();
    assert_eq!(names.len(), 2);
    assert!(names.iter().all(GenericName::is_qualified));
    assert!(names
        .iter()
        .any(|n| n.local_part() == "roads" && n.namespace() == Some("http://example.org/gis")));
    assert!(names
        .iter()
        .any(|n| n.local_part() == "rivers" && n.namespace() == Some("urn:hydro")));

    assert!(matches!(
        store.create_schema(roads()),
        Err(TransactError::DuplicateType(_))
    ));
    assert!(matches!(
        store.schema("lakes"),
        Err(TransactError::UnknownType(_))
    ));
}

#[test]
fn failed_batch_adds_nothing() {
    let (store, ft) = store_with(MemoryStoreConfig::default().with_use_provided_fid(true));
    let other = FeatureType::builder("rivers")
        .attribute("name", AttributeBinding::String)
        .build()
        .unwrap();
    let stray = Feature::builder(&other).set("name", "Avon").unwrap().build("b").unwrap();
    let auto = Transaction::auto_commit();

    let err = store
        .add_features(&auto, "roads", vec![road(&ft, "a", "Main", 2, "POINT(0 0)"), stray.clone()])
        .unwrap_err();
    assert!(matches!(err, TransactError::Core(_)));
    assert_eq!(store.count(&auto, &Query::all("roads")).unwrap(), 0);

    let txn = Transaction::new();
    assert!(store
        .add_features(&txn, "roads", vec![road(&ft, "a", "Main", 2, "POINT(0 0)"), stray])
        .is_err());
    let repeated = store
        .add_features(
            &txn,
            "roads",
            vec![
                road(&ft, "c", "Mill", 1, "POINT(1 1)"),
                road(&ft, "c", "Mill", 1, "POINT(1 1)"),
            ],
        )
        .unwrap_err();
    assert!(matches!(repeated, TransactError::DuplicateFeature(_)));
    assert_eq!(store.count(&txn, &Query::all("roads")).unwrap(), 0);
    assert!(txn.touched_types().is_empty());
}

#[test]
fn failed_batch_does_not_consume_generated_ids() {
    let (store, ft) = seeded();
    let other = FeatureType::builder("rivers").build().unwrap();
    let stray = Feature::builder(&other).build("x").unwrap();
    let auto = Transaction::auto_commit();
    assert!(store
        .add_features(&auto, "roads", vec![road(&ft, "tmp", "New", 2, "POINT(1 1)"), stray])
        .is_err());

    let ids = store
        .add_features(&auto, "roads", vec![road(&ft, "tmp", "New", 2, "POINT(1 1)")])
        .unwrap();
    assert_eq!(ids[0].as_str(), "roads.4");
}

#[test]
fn writes_racing_commit_are_applied_or_rejected() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let (store, ft) = store_with(MemoryStoreConfig::default());
    let txn = Transaction::new();
    let accepted = AtomicUsize::new(0);

    let rejection = std::thread::scope(|scope| {
        let writer = scope.spawn(|| loop {
            let feature = road(&ft, "tmp", "Spur", 1, "POINT(0 0)");
            match store.add_features(&txn, "roads", vec![feature]) {
                Ok(_) => {
                    accepted.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => return e,
            }
        });
        while accepted.load(Ordering::SeqCst) < 20 {
            std::thread::yield_now();
        }
        store.commit(&txn).unwrap();
        writer.join().unwrap()
    });

    assert!(matches!(rejection, TransactError::TransactionClosed(_)));
    let committed = store.count(&Transaction::auto_commit(), &Query::all("roads")).unwrap();
    assert_eq!(committed, accepted.load(Ordering::SeqCst));
}
