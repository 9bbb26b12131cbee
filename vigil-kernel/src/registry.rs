/**
 * REGISTRE DES SEUILS - Configuration d'alerte par topic
 *
 * RÔLE : Lecture mémoïsée des paliers de seuil et écriture write-through
 * vers le store. L'entrée du cache est invalidée à chaque écriture ; un
 * flush global périodique rend visibles les éditions hors-bande du store.
 */

use crate::cache::{spawn_sweeper, TtlCache};
use crate::models::ThresholdLevel;
use crate::ports::ThresholdStore;
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const THRESHOLDS_CACHE_TTL: Duration = Duration::from_secs(1800);
pub const THRESHOLDS_SWEEP_PERIOD: Duration = Duration::from_secs(300);
pub const THRESHOLDS_FLUSH_PERIOD: Duration = Duration::from_secs(120);

pub struct ThresholdRegistry {
    store: Arc<dyn ThresholdStore>,
    cache: Arc<TtlCache<Vec<ThresholdLevel>>>,
}

impl ThresholdRegistry {
    pub fn new(store: Arc<dyn ThresholdStore>) -> Self {
        Self {
            store,
            cache: Arc::new(TtlCache::new(THRESHOLDS_CACHE_TTL)),
        }
    }

    /// Paliers configurés pour un topic, ou None si aucun (ou store en panne,
    /// traité comme "pas de seuil" pour cette évaluation).
    pub async fn thresholds(&self, topic: &str) -> Option<Vec<ThresholdLevel>> {
        if let Some(cached) = self.cache.get(topic) {
            return Some(cached);
        }
        match self.store.load_thresholds(topic).await {
            Ok(Some(levels)) => {
                self.cache.insert(topic.to_string(), levels.clone());
                Some(levels)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("[thresholds] load failed for {topic}: {e}");
                None
            }
        }
    }

    /// Upsert write-through. Valide le contrat des paliers, écrit dans le
    /// store puis invalide l'entrée du cache. Pas de retry interne.
    pub async fn update_thresholds(
        &self,
        topic: &str,
        levels: Vec<ThresholdLevel>,
    ) -> Result<()> {
        validate_levels(&levels)?;

        if let Err(e) = self.store.upsert_thresholds(topic, levels).await {
            warn!("[thresholds] update failed for {topic}: {e}");
            return Err(e).context("threshold upsert");
        }
        self.cache.invalidate(topic);
        info!("[thresholds] updated levels for {topic}");
        Ok(())
    }

    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        spawn_sweeper(self.cache.clone(), THRESHOLDS_SWEEP_PERIOD, "thresholds")
    }

    /// Flush global : vide tout le cache toutes les 2 minutes pour que les
    /// écritures hors-bande dans le store finissent par être vues.
    pub fn spawn_flush(&self) -> tokio::task::JoinHandle<()> {
        let cache = self.cache.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(THRESHOLDS_FLUSH_PERIOD);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                cache.clear();
                debug!("[thresholds] cache flushed");
            }
        })
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

fn validate_levels(levels: &[ThresholdLevel]) -> Result<()> {
    for level in levels {
        if level.reset_value > level.value {
            bail!(
                "level {} has reset_value {} above value {}",
                level.color,
                level.reset_value,
                level.value
            );
        }
    }
    for (i, a) in levels.iter().enumerate() {
        for b in &levels[i + 1..] {
            if a.color == b.color && a.value == b.value {
                bail!("duplicate level ({}, {})", a.color, a.value);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PortError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeThresholdStore {
        levels: Mutex<HashMap<String, Vec<ThresholdLevel>>>,
        loads: Mutex<usize>,
        fail_writes: bool,
    }

    #[async_trait]
    impl ThresholdStore for FakeThresholdStore {
        async fn load_thresholds(
            &self,
            topic: &str,
        ) -> Result<Option<Vec<ThresholdLevel>>, PortError> {
            *self.loads.lock() += 1;
            Ok(self.levels.lock().get(topic).cloned())
        }

        async fn upsert_thresholds(
            &self,
            topic: &str,
            levels: Vec<ThresholdLevel>,
        ) -> Result<(), PortError> {
            if self.fail_writes {
                return Err(PortError::Unavailable("down".into()));
            }
            self.levels.lock().insert(topic.to_string(), levels);
            Ok(())
        }
    }

    fn level(color: &str, value: f64, reset: f64) -> ThresholdLevel {
        ThresholdLevel {
            color: color.into(),
            value,
            reset_value: reset,
        }
    }

    #[tokio::test]
    async fn test_read_through_caches_levels() {
        let store = Arc::new(FakeThresholdStore::default());
        store
            .levels
            .lock()
            .insert("t".into(), vec![level("yellow", 50.0, 40.0)]);
        let registry = ThresholdRegistry::new(store.clone());

        assert!(registry.thresholds("t").await.is_some());
        assert!(registry.thresholds("t").await.is_some());
        assert_eq!(*store.loads.lock(), 1);
    }

    #[tokio::test]
    async fn test_update_invalidates_cache() {
        let store = Arc::new(FakeThresholdStore::default());
        store
            .levels
            .lock()
            .insert("t".into(), vec![level("yellow", 50.0, 40.0)]);
        let registry = ThresholdRegistry::new(store.clone());

        // peuple le cache puis écrit une nouvelle config
        registry.thresholds("t").await;
        registry
            .update_thresholds("t", vec![level("red", 90.0, 80.0)])
            .await
            .unwrap();

        let seen = registry.thresholds("t").await.unwrap();
        assert_eq!(seen[0].color, "red");
        assert_eq!(*store.loads.lock(), 2);
    }

    #[tokio::test]
    async fn test_update_rejects_bad_contract() {
        let registry = ThresholdRegistry::new(Arc::new(FakeThresholdStore::default()));
        // reset au-dessus de value
        assert!(registry
            .update_thresholds("t", vec![level("yellow", 50.0, 60.0)])
            .await
            .is_err());
        // doublon (couleur, valeur)
        assert!(registry
            .update_thresholds(
                "t",
                vec![level("yellow", 50.0, 40.0), level("yellow", 50.0, 30.0)]
            )
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_cache_and_reports() {
        let store = Arc::new(FakeThresholdStore {
            fail_writes: true,
            ..Default::default()
        });
        store
            .levels
            .lock()
            .insert("t".into(), vec![level("yellow", 50.0, 40.0)]);
        let registry = ThresholdRegistry::new(store.clone());
        registry.thresholds("t").await;

        assert!(registry
            .update_thresholds("t", vec![level("red", 90.0, 80.0)])
            .await
            .is_err());
        // l'entrée en cache n'a pas bougé, pas de relecture du store
        assert_eq!(registry.cached_entries(), 1);
    }

    #[tokio::test]
    async fn test_missing_topic_is_none() {
        let registry = ThresholdRegistry::new(Arc::new(FakeThresholdStore::default()));
        assert!(registry.thresholds("unknown").await.is_none());
    }
}
