mod common;

use std::sync::{Arc, Mutex};

use common::{recorder, seen, CountingObservable};
use vigil::kernel::{
    CallbackObserver, EventCollection, EventKind, Observable, ObservableKey, ObserverRegistry,
};
use vigil::model::{DelegatingObservable, ObservablePropertyModel};
use vigil::RegistryConfig;

#[test]
fn test_delegate_keeps_one_observer_on_target() {
    let registry: ObserverRegistry<String> = ObserverRegistry::default();
    let target = CountingObservable::new("node:7");
    let as_dyn: Arc<dyn Observable<String>> = target.clone();
    let delegate = Arc::new(DelegatingObservable::new("model:title", Some(as_dyn)));

    let sources = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&sources);
    let observer = CallbackObserver::new(Arc::clone(&delegate), move |events: &EventCollection<String>| {
        for event in events {
            sink.lock()
                .unwrap()
                .push((event.source().to_string(), event.as_payload().cloned()));
        }
        Ok(())
    });
    let first = registry.register_observer(observer);
    let (second, _) = recorder(&delegate);
    let second = registry.register_observer(second);

    // Delegate context + target context; one delegated observer
    assert_eq!(registry.context_count(), 2);
    assert_eq!(registry.observer_count(), 3);
    assert_eq!(target.starts(), 1);
    assert!(delegate.target_observer().is_some());
    let delegate_ctx = registry.context(&ObservableKey::from("model:title")).unwrap();
    assert_eq!(delegate_ctx.delegated_count(), 1);

    target.publish(&["a", "b"]);
    // Target batch, then the re-published batch queued during fan-out
    let report = registry.process_pending();
    assert_eq!(report.batches, 2);
    assert_eq!(
        *sources.lock().unwrap(),
        vec![
            ("model:title".to_string(), Some("a".to_string())),
            ("model:title".to_string(), Some("b".to_string())),
        ]
    );

    registry.unregister_observer(first);
    assert_eq!(target.stops(), 0);
    registry.unregister_observer(second);
    assert_eq!(target.stops(), 1);
    assert_eq!(registry.context_count(), 0);
    assert_eq!(registry.observer_count(), 0);
    assert!(delegate.target_observer().is_none());

    println!("✅ Delegation lifecycle verified");
}

#[test]
fn test_swap_stops_old_before_starting_new() {
    let registry: ObserverRegistry<String> = ObserverRegistry::default();
    let journal = Arc::new(Mutex::new(Vec::new()));
    let old = CountingObservable::with_journal("node:1", Arc::clone(&journal));
    let new = CountingObservable::with_journal("node:2", Arc::clone(&journal));

    let old_dyn: Arc<dyn Observable<String>> = old.clone();
    let delegate = Arc::new(DelegatingObservable::new("model:swap", Some(old_dyn)));
    let (observer, log) = recorder(&delegate);
    registry.register_observer(observer);

    let new_dyn: Arc<dyn Observable<String>> = new.clone();
    delegate.set_target(Some(new_dyn)).unwrap();

    assert_eq!(
        *journal.lock().unwrap(),
        vec!["start:node:1", "stop:node:1", "start:node:2"]
    );
    assert_eq!(registry.context_count(), 2);

    new.publish(&["fresh"]);
    registry.process_pending();
    assert_eq!(seen(&log), vec!["fresh"]);
}

#[test]
fn test_old_target_events_suppressed_after_swap() {
    let registry: ObserverRegistry<String> = ObserverRegistry::default();
    let old = CountingObservable::new("node:old");
    let new = CountingObservable::new("node:new");

    // Someone else keeps the old target's context alive
    let (direct, direct_log) = recorder(&old);
    registry.register_observer(direct);

    let old_dyn: Arc<dyn Observable<String>> = old.clone();
    let delegate = Arc::new(DelegatingObservable::new("model:stale", Some(old_dyn)));
    let (observer, log) = recorder(&delegate);
    registry.register_observer(observer);

    // Queued before the swap, applied after it
    old.publish(&["stale"]);
    let new_dyn: Arc<dyn Observable<String>> = new.clone();
    delegate.set_target(Some(new_dyn)).unwrap();
    new.publish(&["current"]);
    registry.process_pending();
    registry.process_pending();

    assert_eq!(seen(&direct_log), vec!["stale"]);
    assert_eq!(seen(&log), vec!["current"]);
    assert_eq!(old.stops(), 0);
}

#[test]
fn test_republished_copy_dropped_when_target_swapped() {
    // One batch per pass, so the re-published copy is still queued at swap time
    let config = RegistryConfig {
        max_batches_per_tick: 1,
        ..RegistryConfig::default()
    };
    let registry: ObserverRegistry<String> = ObserverRegistry::new(config);
    let old = CountingObservable::new("node:before");
    let new = CountingObservable::new("node:after");

    let old_dyn: Arc<dyn Observable<String>> = old.clone();
    let delegate = Arc::new(DelegatingObservable::new("model:queued", Some(old_dyn)));
    let (observer, log) = recorder(&delegate);
    registry.register_observer(observer);

    old.publish(&["stale"]);
    assert_eq!(registry.process_pending().batches, 1);

    let new_dyn: Arc<dyn Observable<String>> = new.clone();
    delegate.set_target(Some(new_dyn)).unwrap();

    let report = registry.process_pending();
    assert_eq!(report.batches, 0);
    assert_eq!(report.dropped, 1);
    assert!(registry.process_pending().is_idle());
    assert!(seen(&log).is_empty());

    new.publish(&["fresh"]);
    while !registry.process_pending().is_idle() {}
    assert_eq!(seen(&log), vec!["fresh"]);
}

#[test]
fn test_stop_drops_queued_copies() {
    let config = RegistryConfig {
        max_batches_per_tick: 1,
        ..RegistryConfig::default()
    };
    let registry: ObserverRegistry<String> = ObserverRegistry::new(config);
    let node = CountingObservable::new("node:stopping");
    let node_dyn: Arc<dyn Observable<String>> = node.clone();
    let delegate = Arc::new(DelegatingObservable::new("model:stopping", Some(node_dyn)));
    let (observer, log) = recorder(&delegate);
    registry.register_observer(observer);

    node.publish(&["pending"]);
    registry.process_pending();
    registry.stop();

    assert_eq!(registry.process_pending().dropped, 1);
    assert!(seen(&log).is_empty());
}

#[test]
fn test_swap_while_unobserved_only_records_target() {
    let registry: ObserverRegistry<String> = ObserverRegistry::default();
    let target = CountingObservable::new("node:idle");
    let delegate = DelegatingObservable::<String>::new("model:idle", None);

    let as_dyn: Arc<dyn Observable<String>> = target.clone();
    delegate.set_target(Some(as_dyn)).unwrap();

    assert!(delegate.target().is_some());
    assert!(delegate.target_observer().is_none());
    assert_eq!(target.starts(), 0);
    assert_eq!(registry.context_count(), 0);
}

#[test]
fn test_clearing_target_releases_it() {
    let registry: ObserverRegistry<String> = ObserverRegistry::default();
    let target = CountingObservable::new("node:cleared");
    let as_dyn: Arc<dyn Observable<String>> = target.clone();
    let delegate = Arc::new(DelegatingObservable::new("model:cleared", Some(as_dyn)));
    registry.register_observer(recorder(&delegate).0);

    delegate.set_target(None).unwrap();
    assert_eq!(target.stops(), 1);
    assert_eq!(registry.context_count(), 1);
    assert!(!target.publish(&["nobody listens"]));
}

#[test]
fn test_chained_delegates() {
    let registry: ObserverRegistry<String> = ObserverRegistry::default();
    let node = CountingObservable::new("node:leaf");
    let node_dyn: Arc<dyn Observable<String>> = node.clone();
    let middle: Arc<dyn Observable<String>> =
        Arc::new(DelegatingObservable::new("model:middle", Some(node_dyn)));
    let top = Arc::new(DelegatingObservable::new("model:top", Some(middle)));

    let (observer, log) = recorder(&top);
    let id = registry.register_observer(observer);
    assert_eq!(registry.context_count(), 3);
    assert_eq!(node.starts(), 1);

    node.publish(&["deep"]);
    while !registry.process_pending().is_idle() {}
    assert_eq!(seen(&log), vec!["deep"]);

    registry.unregister_observer(id);
    assert_eq!(registry.context_count(), 0);
    assert_eq!(node.stops(), 1);
}

#[test]
fn test_property_model_publishes_changed() {
    let registry: ObserverRegistry<String> = ObserverRegistry::default();
    let model = Arc::new(ObservablePropertyModel::<String, String>::new(
        "prop:title",
        "Draft".to_string(),
    ));

    // Nobody observes yet
    assert!(!model.set("Unseen".to_string()));

    let changes = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&changes);
    let observer = CallbackObserver::new(Arc::clone(&model), move |events: &EventCollection<String>| {
        let changed = events
            .iter()
            .filter(|event| event.kind == EventKind::Changed)
            .count();
        *sink.lock().unwrap() += changed;
        Ok(())
    });
    let id = registry.register_observer(observer);

    assert!(model.set("Final".to_string()));
    registry.process_pending();
    assert_eq!(*changes.lock().unwrap(), 1);
    assert_eq!(model.get(), "Final");

    registry.unregister_observer(id);
    assert!(!model.set("Again".to_string()));
}

#[test]
fn test_property_model_follows_target() {
    let registry: ObserverRegistry<String> = ObserverRegistry::default();
    let node = CountingObservable::new("node:owner");
    let node_dyn: Arc<dyn Observable<String>> = node.clone();
    let model = Arc::new(ObservablePropertyModel::following(
        "prop:owner",
        0u32,
        node_dyn,
    ));

    let (observer, log) = recorder(&model);
    registry.register_observer(observer);
    assert_eq!(node.starts(), 1);
    assert!(model.target().is_some());

    node.publish(&["node saved"]);
    while !registry.process_pending().is_idle() {}
    assert_eq!(seen(&log), vec!["node saved"]);
}
