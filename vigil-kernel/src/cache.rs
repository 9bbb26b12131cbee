/**
 * CACHE TTL - Mémoïsation des lectures vers les stores externes
 *
 * RÔLE : Petit cache clé → valeur avec durée de vie, partagé par l'annuaire
 * des destinataires et le registre des seuils. Une tâche de fond balaie
 * périodiquement les entrées expirées pour borner la mémoire.
 */

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

struct Entry<V> {
    value: V,
    stored_at: Instant,
}

/// Cache TTL keyé par topic. `get` purge à la volée les entrées expirées ;
/// `sweep` fait le ménage complet (appelé par la tâche périodique).
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: String, value: V) {
        self.entries.lock().insert(
            key,
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    /// Vide tout le cache (flush global périodique du registre des seuils).
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Retire les entrées expirées, retourne le nombre supprimé.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Lance la tâche de balayage périodique d'un cache.
pub fn spawn_sweeper<V>(
    cache: Arc<TtlCache<V>>,
    period: Duration,
    tag: &'static str,
) -> tokio::task::JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let removed = cache.sweep();
            if removed > 0 {
                debug!("[cache] {tag}: swept {removed} expired entries");
            }
        }
    })
}
