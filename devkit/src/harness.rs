/*!
Harness de test pour le kernel Vigil

Assemble un kernel complet (coordinateur, batcher, évaluateur, registre,
annuaire, file mail) câblé sur les mocks mémoire. Aucune tâche de fond n'est
lancée automatiquement : les tests pilotent les flushs et le worker mail.
*/

use crate::mqtt_stub::MockMqttLink;
use crate::store_stub::{
    MemoryDirectoryStore, MemorySampleStore, MemoryThresholdStore, MockMailer,
};
use std::sync::Arc;
use vigil_kernel::batcher::SampleBatcher;
use vigil_kernel::coordinator::Coordinator;
use vigil_kernel::directory::RecipientDirectory;
use vigil_kernel::evaluator::ThresholdEvaluator;
use vigil_kernel::mailqueue::MailQueue;
use vigil_kernel::models::ThresholdLevel;
use vigil_kernel::registry::ThresholdRegistry;

pub struct TestHarness {
    pub link: Arc<MockMqttLink>,
    pub sample_store: Arc<MemorySampleStore>,
    pub threshold_store: Arc<MemoryThresholdStore>,
    pub directory_store: Arc<MemoryDirectoryStore>,
    pub mailer: Arc<MockMailer>,
    pub mail: MailQueue,
    pub registry: Arc<ThresholdRegistry>,
    pub directory: Arc<RecipientDirectory>,
    pub batcher: Arc<SampleBatcher>,
    pub evaluator: Arc<ThresholdEvaluator>,
    pub coordinator: Arc<Coordinator>,
}

impl TestHarness {
    pub fn new() -> Self {
        let link = Arc::new(MockMqttLink::new());
        let sample_store = Arc::new(MemorySampleStore::new());
        let threshold_store = Arc::new(MemoryThresholdStore::new());
        let directory_store = Arc::new(MemoryDirectoryStore::new());
        let mailer = Arc::new(MockMailer::new());

        let mail = MailQueue::new(mailer.clone());
        let registry = Arc::new(ThresholdRegistry::new(threshold_store.clone()));
        let directory = Arc::new(RecipientDirectory::new(directory_store.clone()));
        let batcher = Arc::new(SampleBatcher::new(sample_store.clone()));
        let evaluator = Arc::new(ThresholdEvaluator::new(
            registry.clone(),
            directory.clone(),
            mail.clone(),
        ));
        let coordinator = Arc::new(Coordinator::new(
            link.clone(),
            batcher.clone(),
            evaluator.clone(),
            registry.clone(),
        ));

        Self {
            link,
            sample_store,
            threshold_store,
            directory_store,
            mailer,
            mail,
            registry,
            directory,
            batcher,
            evaluator,
            coordinator,
        }
    }

    /// Configure les paliers d'un topic directement dans le store.
    pub fn set_thresholds(&self, topic: &str, levels: Vec<(&str, f64, f64)>) {
        self.threshold_store.set_levels(
            topic,
            levels
                .into_iter()
                .map(|(color, value, reset_value)| ThresholdLevel {
                    color: color.to_string(),
                    value,
                    reset_value,
                })
                .collect(),
        );
    }

    /// Simule l'arrivée d'un message broker sur le coordinateur.
    pub async fn publish(&self, topic: &str, payload: &[u8]) {
        self.coordinator.handle_message(topic, payload).await;
    }

    /// Lance le worker d'expédition des mails (à faire explicitement).
    pub fn start_mail_worker(&self) {
        self.mail.spawn_worker();
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
