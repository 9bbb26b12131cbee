/**
 * VIGIL KERNEL - Point d'entrée principal du service
 *
 * RÔLE : Orchestration de tous les modules : config, ports, files, boucles
 * de fond, session MQTT, API REST de contrôle.
 *
 * ARCHITECTURE : Ingestion event-driven via MQTT + API REST + ports de
 * persistence + workers (flush batch, mails, caches TTL).
 */

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use vigil_kernel::batcher::SampleBatcher;
use vigil_kernel::config::load_config;
use vigil_kernel::coordinator::{session_from_config, spawn_mqtt_listener, Coordinator};
use vigil_kernel::directory::RecipientDirectory;
use vigil_kernel::evaluator::ThresholdEvaluator;
use vigil_kernel::http::{build_router, AppState};
use vigil_kernel::mailqueue::MailQueue;
use vigil_kernel::ports::jsonstore::{
    JsonDirectoryStore, JsonSampleStore, JsonThresholdStore, LogMailer,
};
use vigil_kernel::ports::Mailer;
use vigil_kernel::registry::ThresholdRegistry;
use vigil_kernel::smtp::SmtpMailer;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cfg = load_config().await;
    let data_dir = PathBuf::from(cfg.data_dir());
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {:?}", data_dir))?;

    // ports par défaut : stores JSON locaux
    let sample_store = Arc::new(JsonSampleStore::new(data_dir.join("samples.json")));
    let threshold_store = Arc::new(JsonThresholdStore::new(data_dir.join("thresholds.json")));
    let directory_store = Arc::new(JsonDirectoryStore::new(data_dir.join("directory.json")));

    let mailer: Arc<dyn Mailer> = match &cfg.smtp {
        Some(smtp) => Arc::new(SmtpMailer::new(smtp)),
        None => {
            warn!("[kernel] no SMTP relay configured, alerts will only be logged");
            Arc::new(LogMailer)
        }
    };

    // files et caches, avec leurs tâches de fond
    let mail = MailQueue::new(mailer);
    mail.spawn_worker();

    let registry = Arc::new(ThresholdRegistry::new(threshold_store));
    registry.spawn_sweeper();
    registry.spawn_flush();

    let directory = Arc::new(RecipientDirectory::new(directory_store));
    directory.spawn_sweeper();

    let batcher = Arc::new(SampleBatcher::new(sample_store));
    batcher.spawn_flush_task();

    let evaluator = Arc::new(ThresholdEvaluator::new(
        registry.clone(),
        directory,
        mail.clone(),
    ));

    // session MQTT : le coordinateur réabonne tout à chaque ConnAck
    let (link, eventloop) = session_from_config(&cfg.mqtt)?;
    let coordinator = Arc::new(Coordinator::new(link, batcher, evaluator, registry));
    spawn_mqtt_listener(coordinator.clone(), eventloop);

    for topic in &cfg.topics {
        coordinator.subscribe_to_topic(topic).await;
    }

    // API REST de contrôle
    let app = build_router(AppState {
        coordinator: coordinator.clone(),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.http_port()));
    info!("[kernel] listening on http://{addr}");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
