/**
 * BATCHER DE PERSISTENCE - Files par topic et flush périodique
 *
 * RÔLE : Amortit les écritures vers le store d'historique. Chaque mesure est
 * empilée dans la file de son topic (bornée à 100, on jette les plus
 * anciennes) ; toutes les secondes un flush prélève au plus 10 mesures par
 * topic et envoie tous les lots ensemble.
 *
 * FONCTIONNEMENT : Un seul flush actif à la fois (un tick qui arrive pendant
 * un flush en cours est sauté). Les lots déjà prélevés ne sont pas remis en
 * file si l'écriture échoue : durabilité best-effort assumée.
 */

use crate::models::Sample;
use crate::ports::SampleStore;
use crate::state::{new_state, Shared};
use futures::future::join_all;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

pub const BATCH_SIZE: usize = 10;
pub const BATCH_INTERVAL: Duration = Duration::from_millis(1000);
pub const MAX_QUEUE_SIZE: usize = 100;

pub struct SampleBatcher {
    store: Arc<dyn SampleStore>,
    queues: Shared<HashMap<String, VecDeque<Sample>>>,
    flushing: AtomicBool,
}

impl SampleBatcher {
    pub fn new(store: Arc<dyn SampleStore>) -> Self {
        Self {
            store,
            queues: new_state(HashMap::new()),
            flushing: AtomicBool::new(false),
        }
    }

    /// Empile une mesure, en expulsant les plus anciennes au-delà de la borne.
    pub fn enqueue(&self, topic: &str, sample: Sample) {
        let mut queues = self.queues.lock();
        let queue = queues.entry(topic.to_string()).or_default();
        queue.push_back(sample);
        while queue.len() > MAX_QUEUE_SIZE {
            queue.pop_front();
            trace!("[batcher] queue overflow on {topic}, oldest sample dropped");
        }
    }

    /// Crée la file vide d'un topic fraîchement abonné.
    pub fn init_topic(&self, topic: &str) {
        self.queues.lock().entry(topic.to_string()).or_default();
    }

    /// Jette la file d'un topic désabonné, mesures non flushées comprises.
    pub fn remove_topic(&self, topic: &str) {
        if let Some(queue) = self.queues.lock().remove(topic) {
            if !queue.is_empty() {
                debug!(
                    "[batcher] dropped {} unflushed samples for {topic}",
                    queue.len()
                );
            }
        }
    }

    pub fn queue_len(&self, topic: &str) -> usize {
        self.queues.lock().get(topic).map_or(0, VecDeque::len)
    }

    pub fn has_topic(&self, topic: &str) -> bool {
        self.queues.lock().contains_key(topic)
    }

    /// Un passage de flush : prélève au plus BATCH_SIZE mesures par topic et
    /// pousse tous les lots ensemble vers le store. Les échecs sont tracés
    /// par lot et n'empêchent pas les lots voisins.
    pub async fn flush_once(&self) {
        if self
            .flushing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("[batcher] flush already running, tick skipped");
            return;
        }

        let batches: Vec<(String, Vec<Sample>)> = {
            let mut queues = self.queues.lock();
            queues
                .iter_mut()
                .filter(|(_, queue)| !queue.is_empty())
                .map(|(topic, queue)| {
                    let take = queue.len().min(BATCH_SIZE);
                    (topic.clone(), queue.drain(..take).collect())
                })
                .collect()
        };

        if !batches.is_empty() {
            let writes = batches
                .iter()
                .map(|(topic, samples)| self.store.append_samples(topic, samples));
            let results = join_all(writes).await;

            for ((topic, samples), result) in batches.iter().zip(results) {
                match result {
                    Ok(()) => trace!("[batcher] flushed {} samples for {topic}", samples.len()),
                    // pas de remise en file : les mesures du lot sont perdues
                    Err(e) => warn!(
                        "[batcher] append failed for {topic}, {} samples lost: {e}",
                        samples.len()
                    ),
                }
            }
        }

        self.flushing.store(false, Ordering::SeqCst);
    }

    /// Lance le ticker de flush (toutes les BATCH_INTERVAL).
    pub fn spawn_flush_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let batcher = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(BATCH_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                batcher.flush_once().await;
            }
        })
    }
}
