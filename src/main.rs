use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use vigil::kernel::{
    CallbackObserver, EventCollection, ObservationSession, ObserverRegistry, Reactor,
};
use vigil::upstream::{
    ChangeKind, ChangeKinds, InMemoryRepository, Locator, RepositoryChange, RepositoryObservable,
    SubscriptionDescriptor, UpstreamSource,
};
use vigil::RegistryConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Setup Logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // 2. Config: optional JSON file as first argument
    let config = match std::env::args().nth(1) {
        Some(path) => RegistryConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => RegistryConfig::default(),
    };
    tracing::info!(?config, "Vigil demo booting");

    // 3. Upstream + Registry
    let repository = Arc::new(InMemoryRepository::new());
    repository.add_node("/content", "hippostd:folder")?;
    repository.add_node("/content/doc", "hippo:document")?;
    repository.save();

    let registry: ObserverRegistry<RepositoryChange> = ObserverRegistry::new(config);
    let session = ObservationSession::new(registry.clone());

    let source: Arc<dyn UpstreamSource> = repository.clone();
    let descriptor = SubscriptionDescriptor::new(Locator::parse("/content")?);
    let content = RepositoryObservable::shared(Arc::clone(&source), descriptor.clone());
    let edits = RepositoryObservable::shared(
        source,
        descriptor.with_change_types(ChangeKinds::of(&[ChangeKind::PropertyChanged])),
    );

    session.register(CallbackObserver::new(content, |events: &EventCollection<RepositoryChange>| {
        for change in events.payloads() {
            println!("[content] {} {}", change.kind, change.path);
        }
        Ok(())
    }));
    session.register(CallbackObserver::new(edits, |events: &EventCollection<RepositoryChange>| {
        println!("[edits] {} property change(s)", events.len());
        Ok(())
    }));

    // 4. Repository notification thread
    let writer = Arc::clone(&repository);
    let notifier = std::thread::spawn(move || -> anyhow::Result<()> {
        for round in 0..3 {
            writer.set_property("/content/doc", "title", &format!("Draft {round}"))?;
            writer.add_node(&format!("/content/doc/section{round}"), "hippo:compound")?;
            writer.save();
            std::thread::sleep(Duration::from_millis(50));
        }
        writer.remove_node("/content/doc")?;
        writer.save();
        Ok(())
    });

    // 5. Run Reactor until the writer finishes or Ctrl+C
    let shutdown = CancellationToken::new();
    let stopper = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = tokio::time::sleep(Duration::from_millis(400)) => {}
        }
        stopper.cancel();
    });

    let mut reactor = Reactor::new(registry.clone());
    reactor.run(shutdown).await;

    match notifier.join() {
        Ok(result) => result?,
        Err(_) => anyhow::bail!("repository writer panicked"),
    }

    let closed = session.close();
    let telemetry = registry.telemetry();
    tracing::info!(
        closed,
        batches = telemetry.delivery_stats.batches,
        events = telemetry.delivery_stats.events,
        "Vigil demo finished"
    );
    Ok(())
}
