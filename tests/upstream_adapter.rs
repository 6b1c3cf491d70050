use std::sync::{Arc, Mutex};

use vigil::kernel::{CallbackObserver, EventCollection, Observer, ObserverRegistry};
use vigil::upstream::{
    ChangeKind, ChangeKinds, InMemoryRepository, Locator, NativeChange, NodeId, RepositoryChange,
    RepositoryObservable, SubscriptionDescriptor, TypeName, UpstreamSource,
};
use vigil::ObservationError;

type ChangeLog = Arc<Mutex<Vec<(ChangeKind, String)>>>;

fn change_recorder(observable: &Arc<RepositoryObservable>) -> (Arc<dyn Observer<RepositoryChange>>, ChangeLog) {
    let log: ChangeLog = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let observer: Arc<dyn Observer<RepositoryChange>> = CallbackObserver::new(
        Arc::clone(observable),
        move |events: &EventCollection<RepositoryChange>| {
            let mut log = sink.lock().unwrap();
            for change in events.payloads() {
                log.push((change.kind, change.path.to_string()));
            }
            Ok(())
        },
    );
    (observer, log)
}

fn repository_with_content() -> (Arc<InMemoryRepository>, Arc<dyn UpstreamSource>) {
    let repository = Arc::new(InMemoryRepository::new());
    repository.add_node("/content", "hippostd:folder").unwrap();
    repository.save();
    let source: Arc<dyn UpstreamSource> = repository.clone();
    (repository, source)
}

fn locator(raw: &str) -> Locator {
    Locator::parse(raw).unwrap()
}

#[test]
fn test_locator_parsing() {
    assert_eq!(locator("//content//doc/").as_str(), "/content/doc");
    assert_eq!(locator("/").as_str(), "/");
    assert!(locator("/").is_root());
    assert_eq!(locator("/content/doc").name(), "doc");
    assert_eq!(locator("/content/doc").parent(), Some(locator("/content")));
    assert_eq!(locator("/content").parent(), Some(Locator::root()));
    assert_eq!(Locator::root().parent(), None);

    assert!(matches!(Locator::parse("content"), Err(ObservationError::InvalidLocator(_))));
    assert!(matches!(Locator::parse("/a/../b"), Err(ObservationError::InvalidLocator(_))));

    assert!(locator("/content").is_ancestor_of(&locator("/content/doc/x")));
    assert!(!locator("/content").is_ancestor_of(&locator("/content")));
    assert!(!locator("/content").is_ancestor_of(&locator("/contents")));
    assert!(Locator::root().is_ancestor_of(&locator("/content")));
}

#[test]
fn test_change_kinds_bitmask() {
    assert_eq!(ChangeKinds::all().bits(), 0x7f);
    let kinds = ChangeKinds::of(&[ChangeKind::NodeAdded, ChangeKind::PropertyChanged]);
    assert_eq!(kinds.bits(), 0x11);
    assert!(kinds.contains(ChangeKind::NodeAdded));
    assert!(!kinds.contains(ChangeKind::NodeRemoved));
    assert_eq!(
        kinds.iter().collect::<Vec<_>>(),
        vec![ChangeKind::NodeAdded, ChangeKind::PropertyChanged]
    );
    assert!(ChangeKinds::NONE.is_empty());
}

#[test]
fn test_descriptor_matching() {
    let change = |kind, path: &str, node_type: &str| NativeChange {
        kind,
        path: locator(path),
        node_id: NodeId("n1".into()),
        node_type: TypeName(node_type.into()),
        user: None,
    };

    let deep = SubscriptionDescriptor::new(locator("/content"));
    assert!(deep.matches(&change(ChangeKind::NodeAdded, "/content/a", "doc")));
    assert!(deep.matches(&change(ChangeKind::NodeAdded, "/content/a/b/c", "doc")));
    assert!(!deep.matches(&change(ChangeKind::NodeAdded, "/other/a", "doc")));
    // Reported against the parent of /content
    assert!(!deep.matches(&change(ChangeKind::NodeRemoved, "/content", "folder")));

    let shallow = SubscriptionDescriptor::new(locator("/content")).shallow();
    assert!(shallow.matches(&change(ChangeKind::NodeAdded, "/content/a", "doc")));
    assert!(!shallow.matches(&change(ChangeKind::NodeAdded, "/content/a/b", "doc")));
    assert!(!shallow.matches(&change(ChangeKind::PropertyChanged, "/content/a/title", "doc")));

    let typed = SubscriptionDescriptor::new(locator("/content"))
        .with_change_types(ChangeKinds::of(&[ChangeKind::NodeAdded]))
        .with_types(vec![TypeName("doc".into())]);
    assert!(typed.matches(&change(ChangeKind::NodeAdded, "/content/a", "doc")));
    assert!(!typed.matches(&change(ChangeKind::NodeAdded, "/content/a", "folder")));
    assert!(!typed.matches(&change(ChangeKind::NodeRemoved, "/content/a", "doc")));

    let by_id = SubscriptionDescriptor::new(locator("/")).with_ids(vec![NodeId("n2".into())]);
    assert!(!by_id.matches(&change(ChangeKind::NodeAdded, "/content/a", "doc")));
}

#[test]
fn test_descriptor_keys() {
    let a = SubscriptionDescriptor::new(locator("/content"))
        .with_types(vec![TypeName("b".into()), TypeName("a".into())]);
    let b = SubscriptionDescriptor::new(locator("/content/"))
        .with_types(vec![TypeName("a".into()), TypeName("b".into()), TypeName("a".into())]);
    assert_eq!(a.key(), b.key());
    assert_eq!(a.key().namespace(), "jcr");

    assert_ne!(a.key(), a.clone().shallow().key());
    assert_ne!(
        a.key(),
        a.clone().with_change_types(ChangeKinds::of(&[ChangeKind::NodeAdded])).key()
    );
}

#[test]
fn test_descriptor_from_json_validates_root() {
    let json = r#"{"change_types": 3, "root": "/content//news", "deep": false}"#;
    let descriptor: SubscriptionDescriptor = serde_json::from_str(json).unwrap();
    assert_eq!(descriptor.root.as_str(), "/content/news");
    assert!(descriptor.id_filter.is_empty());
    assert!(descriptor.change_types.contains(ChangeKind::NodeRemoved));

    let bad = r#"{"change_types": 3, "root": "content", "deep": true}"#;
    assert!(serde_json::from_str::<SubscriptionDescriptor>(bad).is_err());
}

#[test]
fn test_repository_changes_reach_observers() {
    let (repository, source) = repository_with_content();
    let registry: ObserverRegistry<RepositoryChange> = ObserverRegistry::default();

    let observable = RepositoryObservable::shared(
        source,
        SubscriptionDescriptor::new(locator("/content")),
    );
    let (observer, log) = change_recorder(&observable);
    registry.register_observer(observer);
    assert!(observable.is_subscribed());
    assert_eq!(repository.subscription_count(), 1);

    repository.add_node("/content/a", "doc").unwrap();
    repository.set_property("/content/a", "title", "x").unwrap();
    // Nothing until save
    assert!(registry.process_pending().is_idle());

    assert_eq!(repository.save(), 2);
    let report = registry.process_pending();
    assert_eq!(report.batches, 1);
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            (ChangeKind::NodeAdded, "/content/a".to_string()),
            (ChangeKind::PropertyAdded, "/content/a/title".to_string()),
        ]
    );
}

#[test]
fn test_equal_descriptors_share_one_listener() {
    let (repository, source) = repository_with_content();
    let registry: ObserverRegistry<RepositoryChange> = ObserverRegistry::default();
    let descriptor = SubscriptionDescriptor::new(locator("/content"));

    let first = RepositoryObservable::shared(Arc::clone(&source), descriptor.clone());
    let second = RepositoryObservable::shared(source, descriptor);
    let (o1, log1) = change_recorder(&first);
    let (o2, log2) = change_recorder(&second);
    let id1 = registry.register_observer(o1);
    let id2 = registry.register_observer(o2);

    assert_eq!(registry.context_count(), 1);
    assert_eq!(repository.subscription_count(), 1);

    repository.add_node("/content/shared", "doc").unwrap();
    repository.save();
    registry.process_pending();
    assert_eq!(log1.lock().unwrap().len(), 1);
    assert_eq!(log2.lock().unwrap().len(), 1);

    registry.unregister_observer(id1);
    assert_eq!(repository.subscription_count(), 1);
    registry.unregister_observer(id2);
    assert_eq!(repository.subscription_count(), 0);
    assert!(!first.is_subscribed());
}

#[test]
fn test_missing_root_degrades_then_recovers() {
    let (repository, source) = repository_with_content();
    let registry: ObserverRegistry<RepositoryChange> = ObserverRegistry::default();

    let observable = RepositoryObservable::shared(
        source,
        SubscriptionDescriptor::new(locator("/content/news")),
    );
    let key = observable.descriptor().key();
    let (observer, log) = change_recorder(&observable);
    let id = registry.register_observer(observer);

    // Registered, but without an upstream link
    assert!(registry.is_registered(id));
    assert!(registry.context(&key).unwrap().is_degraded());
    assert_eq!(repository.subscription_count(), 0);
    assert_eq!(registry.telemetry().lifecycle_stats.start_failures, 1);

    repository.add_node("/content/news", "folder").unwrap();
    repository.save();
    assert!(registry.restart_observation(&key));
    assert_eq!(repository.subscription_count(), 1);

    repository.add_node("/content/news/today", "doc").unwrap();
    repository.save();
    registry.process_pending();
    assert_eq!(
        *log.lock().unwrap(),
        vec![(ChangeKind::NodeAdded, "/content/news/today".to_string())]
    );
}

#[test]
fn test_subtree_removal_reports_each_node() {
    let (repository, source) = repository_with_content();
    repository.add_node("/content/doc", "doc").unwrap();
    repository.add_node("/content/doc/part", "compound").unwrap();
    repository.save();

    let registry: ObserverRegistry<RepositoryChange> = ObserverRegistry::default();
    let observable = RepositoryObservable::shared(
        source,
        SubscriptionDescriptor::new(locator("/content"))
            .with_change_types(ChangeKinds::of(&[ChangeKind::NodeRemoved])),
    );
    let (observer, log) = change_recorder(&observable);
    registry.register_observer(observer);

    repository.remove_node("/content/doc").unwrap();
    repository.save();
    registry.process_pending();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            (ChangeKind::NodeRemoved, "/content/doc/part".to_string()),
            (ChangeKind::NodeRemoved, "/content/doc".to_string()),
        ]
    );
    assert!(!repository.exists("/content/doc/part"));
}

#[test]
fn test_repository_errors() {
    let (repository, _) = repository_with_content();
    assert!(matches!(
        repository.add_node("/missing/child", "doc"),
        Err(ObservationError::NotFound(_))
    ));
    assert!(matches!(
        repository.add_node("/content", "doc"),
        Err(ObservationError::ItemExists(_))
    ));
    assert!(repository.remove_node("/").is_err());

    // Property names are single path segments
    assert!(matches!(
        repository.set_property("/content", "", "x"),
        Err(ObservationError::InvalidLocator(_))
    ));
    assert!(matches!(
        repository.set_property("/content", "nested/title", "x"),
        Err(ObservationError::InvalidLocator(_))
    ));
    assert!(matches!(
        repository.remove_property("/content", "a/b"),
        Err(ObservationError::InvalidLocator(_))
    ));
    assert_eq!(repository.staged_count(), 0);

    // Same value: nothing staged
    repository.set_property("/content", "title", "x").unwrap();
    repository.set_property("/content", "title", "x").unwrap();
    assert_eq!(repository.staged_count(), 1);
    assert_eq!(repository.discard(), 1);
    assert_eq!(repository.property("/content", "title").as_deref(), Some("x"));
}

#[test]
fn test_save_from_writer_thread() {
    let (repository, source) = repository_with_content();
    let registry: ObserverRegistry<RepositoryChange> = ObserverRegistry::default();
    let observable = RepositoryObservable::shared(
        source,
        SubscriptionDescriptor::new(locator("/content")),
    );
    let (observer, log) = change_recorder(&observable);
    registry.register_observer(observer);

    let writer = Arc::clone(&repository);
    std::thread::spawn(move || {
        for i in 0..5 {
            writer.add_node(&format!("/content/n{i}"), "doc").unwrap();
            writer.save();
        }
    })
    .join()
    .unwrap();

    let report = registry.process_pending();
    assert_eq!(report.batches, 5);
    let paths: Vec<String> = log.lock().unwrap().iter().map(|(_, p)| p.clone()).collect();
    assert_eq!(
        paths,
        (0..5).map(|i| format!("/content/n{i}")).collect::<Vec<_>>()
    );
}

#[test]
fn test_registry_stop_detaches_listener() {
    let (repository, source) = repository_with_content();
    let registry: ObserverRegistry<RepositoryChange> = ObserverRegistry::default();
    let observable = RepositoryObservable::shared(
        source,
        SubscriptionDescriptor::new(locator("/content")),
    );
    registry.register_observer(change_recorder(&observable).0);

    registry.stop();
    assert_eq!(repository.subscription_count(), 0);
    registry.start();
    assert_eq!(repository.subscription_count(), 1);
}
