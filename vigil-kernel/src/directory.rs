/**
 * ANNUAIRE DES DESTINATAIRES - Résolution topic → adresses email
 *
 * RÔLE : Répond à "qui prévenir quand ce topic dépasse un seuil ?".
 * Interroge l'annuaire externe (employés + superviseurs) et mémoïse le
 * résultat une heure pour ne pas marteler le store à chaque alerte.
 *
 * FONCTIONNEMENT : Les deux requêtes partent en parallèle, les emails sont
 * fusionnés sans doublon dans l'ordre de première apparition. Un échec de
 * l'annuaire donne une liste vide (l'alerte est perdue, jamais le handler).
 */

use crate::cache::{spawn_sweeper, TtlCache};
use crate::ports::DirectoryStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const RECIPIENTS_CACHE_TTL: Duration = Duration::from_secs(3600);
pub const RECIPIENTS_SWEEP_PERIOD: Duration = Duration::from_secs(600);

pub struct RecipientDirectory {
    store: Arc<dyn DirectoryStore>,
    cache: Arc<TtlCache<Vec<String>>>,
}

impl RecipientDirectory {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self {
            store,
            cache: Arc::new(TtlCache::new(RECIPIENTS_CACHE_TTL)),
        }
    }

    /// Variante de test avec TTL contrôlé.
    pub fn with_ttl(store: Arc<dyn DirectoryStore>, ttl: Duration) -> Self {
        Self {
            store,
            cache: Arc::new(TtlCache::new(ttl)),
        }
    }

    /// Adresses à prévenir pour un topic. Ne lève jamais d'erreur.
    pub async fn recipients(&self, topic: &str) -> Vec<String> {
        if let Some(cached) = self.cache.get(topic) {
            return cached;
        }

        let (employees, supervisors) = tokio::join!(
            self.store.employees_by_topic(topic),
            self.store.supervisors_by_topic(topic),
        );

        let (employees, supervisors) = match (employees, supervisors) {
            (Ok(e), Ok(s)) => (e, s),
            (Err(e), _) | (_, Err(e)) => {
                warn!("[directory] lookup failed for {topic}: {e}");
                return Vec::new();
            }
        };

        let mut merged: Vec<String> = Vec::new();
        for contact in employees.into_iter().chain(supervisors) {
            if !merged.contains(&contact.email) {
                merged.push(contact.email);
            }
        }

        // seul un résultat non vide mérite d'être mémoïsé : un topic sans
        // destinataire peut en gagner d'un instant à l'autre
        if merged.is_empty() {
            debug!("[directory] no recipients for {topic}");
        } else {
            self.cache.insert(topic.to_string(), merged.clone());
        }
        merged
    }

    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        spawn_sweeper(self.cache.clone(), RECIPIENTS_SWEEP_PERIOD, "recipients")
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Contact;
    use crate::ports::{DirectoryStore, PortError};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct FakeDirectory {
        employees: Vec<(&'static str, &'static str)>,
        supervisors: Vec<(&'static str, &'static str)>,
        fail: bool,
        lookups: Mutex<usize>,
    }

    impl FakeDirectory {
        fn contacts(rows: &[(&str, &str)], topic: &str) -> Vec<Contact> {
            rows.iter()
                .filter(|(t, _)| *t == topic)
                .map(|(_, email)| Contact {
                    email: email.to_string(),
                })
                .collect()
        }
    }

    #[async_trait]
    impl DirectoryStore for FakeDirectory {
        async fn employees_by_topic(&self, topic: &str) -> Result<Vec<Contact>, PortError> {
            *self.lookups.lock() += 1;
            if self.fail {
                return Err(PortError::Unavailable("down".into()));
            }
            Ok(Self::contacts(&self.employees, topic))
        }

        async fn supervisors_by_topic(&self, topic: &str) -> Result<Vec<Contact>, PortError> {
            if self.fail {
                return Err(PortError::Unavailable("down".into()));
            }
            Ok(Self::contacts(&self.supervisors, topic))
        }
    }

    #[tokio::test]
    async fn test_union_dedup_first_seen_order() {
        let directory = RecipientDirectory::new(Arc::new(FakeDirectory {
            employees: vec![("t", "a@x"), ("t", "b@x")],
            supervisors: vec![("t", "b@x"), ("t", "c@x")],
            fail: false,
            lookups: Mutex::new(0),
        }));
        assert_eq!(directory.recipients("t").await, vec!["a@x", "b@x", "c@x"]);
    }

    #[tokio::test]
    async fn test_non_empty_result_is_cached() {
        let store = Arc::new(FakeDirectory {
            employees: vec![("t", "a@x")],
            supervisors: vec![],
            fail: false,
            lookups: Mutex::new(0),
        });
        let directory = RecipientDirectory::new(store.clone());
        directory.recipients("t").await;
        directory.recipients("t").await;
        assert_eq!(*store.lookups.lock(), 1);
    }

    #[tokio::test]
    async fn test_empty_result_is_not_cached() {
        let store = Arc::new(FakeDirectory {
            employees: vec![],
            supervisors: vec![],
            fail: false,
            lookups: Mutex::new(0),
        });
        let directory = RecipientDirectory::new(store.clone());
        assert!(directory.recipients("t").await.is_empty());
        assert!(directory.recipients("t").await.is_empty());
        assert_eq!(*store.lookups.lock(), 2);
        assert_eq!(directory.cached_entries(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_gives_empty_list() {
        let directory = RecipientDirectory::new(Arc::new(FakeDirectory {
            employees: vec![("t", "a@x")],
            supervisors: vec![],
            fail: true,
            lookups: Mutex::new(0),
        }));
        assert!(directory.recipients("t").await.is_empty());
    }
}
