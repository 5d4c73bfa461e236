//! End-to-end scenarios through the public facade
//!
//! Run with `RUST_LOG=keyed=trace cargo test --test end_to_end -- --nocapture`
//! to see the store's tracing output.

use keyedstore::{CancelSignal, Error, GroupedKeyedStore, KeyedFutureStore, StoreConfig};
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn sample() -> GroupedKeyedStore<&'static str, u32, &'static str> {
    let store = GroupedKeyedStore::new();
    store
        .add_or_update_items(
            vec![("A", 1, "x"), ("A", 2, "y"), ("B", 1, "z")],
            &CancelSignal::new(),
        )
        .await
        .unwrap();
    store
}

// ============================================================================
// Keyed future store
// ============================================================================

#[tokio::test]
async fn immediate_read_after_write() {
    init_tracing();
    let store = KeyedFutureStore::new();
    store.put("Hello".to_string(), 5i64).unwrap();
    assert_eq!(store.get(&"Hello".to_string()).await, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delayed_reads_resolve_in_any_order() {
    init_tracing();
    let store: Arc<KeyedFutureStore<&'static str, u32>> = Arc::new(KeyedFutureStore::new());
    let producer = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            store.put("World", 1).unwrap();
            store.put("Bar", 2).unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            store.put("Foo", 3).unwrap();
        })
    };

    let world = store.get(&"World");
    let foo = store.get(&"Foo");
    let bar = store.get(&"Bar");
    assert!(!world.is_resolved());

    assert_eq!(world.await, 1);
    assert_eq!(bar.await, 2);
    assert_eq!(foo.await, 3);
    producer.await.unwrap();
}

#[tokio::test]
async fn caller_side_timeout_leaves_other_waiters() {
    init_tracing();
    let store: KeyedFutureStore<u8, u8> = KeyedFutureStore::new();
    let abandoned = store.get(&1);
    let kept = store.get(&1);

    let timed_out = tokio::time::timeout(Duration::from_millis(10), abandoned).await;
    assert!(timed_out.is_err());

    store.put(1, 2).unwrap();
    assert_eq!(kept.await, 2);
}

#[test]
fn configured_store_from_toml() {
    let config =
        StoreConfig::from_toml_str("initial_capacity = 8\nprune_abandoned_threshold = 2").unwrap();
    let store: KeyedFutureStore<u8, u8> = KeyedFutureStore::with_config(config);
    assert_eq!(store.config().prune_abandoned_threshold, Some(2));

    drop(store.get(&0));
    drop(store.get(&0));
    let _live = store.get(&0);
    assert_eq!(store.pending_count(&0), 1);
}

#[test]
fn duplicate_write_surfaces_already_present() {
    let store = KeyedFutureStore::new();
    store.put(1, "a").unwrap();
    match store.put(1, "b") {
        Err(Error::AlreadyPresent { key }) => assert_eq!(key, "1"),
        other => panic!("expected AlreadyPresent, got {:?}", other),
    }
}

// ============================================================================
// Grouped store
// ============================================================================

#[tokio::test]
async fn groupings_after_bulk_write() {
    init_tracing();
    let store = sample().await;
    let none = CancelSignal::new();

    let a = store.get_grouping(&"A", &none).await.unwrap();
    assert_eq!(a.len(), 2);
    assert_eq!(a[&1], "x");
    assert_eq!(a[&2], "y");

    let b = store.get_grouping(&"B", &none).await.unwrap();
    assert_eq!(b.len(), 1);
    assert_eq!(b[&1], "z");

    match store.get_grouping(&"C", &none).await {
        Err(Error::NotFound { key }) => assert_eq!(key, "\"C\""),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn returned_grouping_is_a_snapshot() {
    let store = sample().await;
    let none = CancelSignal::new();
    let mut a = store.get_grouping(&"A", &none).await.unwrap();
    a.clear();
    assert_eq!(store.get_grouping(&"A", &none).await.unwrap().len(), 2);
}

#[tokio::test]
async fn remove_by_value_predicate() {
    init_tracing();
    let store = sample().await;
    let none = CancelSignal::new();

    let removed: Vec<_> = store
        .stream_remove(None, |_, _, v| v == Some(&"x"), &none)
        .await
        .unwrap()
        .collect();
    assert_eq!(removed, vec![("A", 1, Some("x"))]);

    let a = store.get_grouping(&"A", &none).await.unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(a[&2], "y");
    assert_eq!(store.len().await, 2);
}

#[tokio::test]
async fn streams_hold_values_not_views() {
    let store = sample().await;
    let none = CancelSignal::new();
    let mut items: Vec<_> = store.stream_items(&none).await.unwrap().collect();
    items.sort();
    assert_eq!(items, vec![("A", 1, "x"), ("A", 2, "y"), ("B", 1, "z")]);

    store.clear(&none).await.unwrap();
    assert_eq!(items.len(), 3);
    assert!(store.is_empty().await);
    assert_eq!(store.group_count().await, 0);
}
