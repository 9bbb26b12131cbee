/*!
Mocks mémoire des ports du kernel

Stores, annuaire et mailer en mémoire pure, avec enregistrement des appels
pour les assertions et injection de pannes pour les chemins d'erreur.
*/

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::time::Instant;
use vigil_kernel::models::{Contact, Sample, ThresholdLevel};
use vigil_kernel::ports::{DirectoryStore, Mailer, PortError, SampleStore, ThresholdStore};

/// Store d'échantillons en mémoire : enregistre chaque lot reçu.
#[derive(Default)]
pub struct MemorySampleStore {
    batches: Mutex<Vec<(String, Vec<Sample>)>>,
    fail: Mutex<bool>,
}

impl MemorySampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    /// Lots reçus dans l'ordre d'arrivée.
    pub fn batches(&self) -> Vec<(String, Vec<Sample>)> {
        self.batches.lock().clone()
    }

    /// Valeurs persistées pour un topic, tous lots confondus.
    pub fn values_for(&self, topic: &str) -> Vec<f64> {
        self.batches
            .lock()
            .iter()
            .filter(|(t, _)| t == topic)
            .flat_map(|(_, samples)| samples.iter().map(|s| s.value))
            .collect()
    }
}

#[async_trait]
impl SampleStore for MemorySampleStore {
    async fn append_samples(&self, topic: &str, samples: &[Sample]) -> Result<(), PortError> {
        if *self.fail.lock() {
            return Err(PortError::Unavailable("sample store down".into()));
        }
        self.batches
            .lock()
            .push((topic.to_string(), samples.to_vec()));
        Ok(())
    }
}

/// Store de seuils en mémoire avec compteur de lectures.
#[derive(Default)]
pub struct MemoryThresholdStore {
    levels: Mutex<HashMap<String, Vec<ThresholdLevel>>>,
    loads: Mutex<usize>,
    fail: Mutex<bool>,
}

impl MemoryThresholdStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_levels(&self, topic: &str, levels: Vec<ThresholdLevel>) {
        self.levels.lock().insert(topic.to_string(), levels);
    }

    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    pub fn load_count(&self) -> usize {
        *self.loads.lock()
    }
}

#[async_trait]
impl ThresholdStore for MemoryThresholdStore {
    async fn load_thresholds(
        &self,
        topic: &str,
    ) -> Result<Option<Vec<ThresholdLevel>>, PortError> {
        *self.loads.lock() += 1;
        if *self.fail.lock() {
            return Err(PortError::Unavailable("threshold store down".into()));
        }
        Ok(self.levels.lock().get(topic).cloned())
    }

    async fn upsert_thresholds(
        &self,
        topic: &str,
        levels: Vec<ThresholdLevel>,
    ) -> Result<(), PortError> {
        if *self.fail.lock() {
            return Err(PortError::Unavailable("threshold store down".into()));
        }
        self.levels.lock().insert(topic.to_string(), levels);
        Ok(())
    }
}

/// Annuaire en mémoire : employés et superviseurs par topic.
#[derive(Default)]
pub struct MemoryDirectoryStore {
    employees: Mutex<HashMap<String, Vec<String>>>,
    supervisors: Mutex<HashMap<String, Vec<String>>>,
    fail: Mutex<bool>,
}

impl MemoryDirectoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_employee(&self, topic: &str, email: &str) {
        self.employees
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(email.to_string());
    }

    pub fn add_supervisor(&self, topic: &str, email: &str) {
        self.supervisors
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(email.to_string());
    }

    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    fn contacts(map: &Mutex<HashMap<String, Vec<String>>>, topic: &str) -> Vec<Contact> {
        map.lock()
            .get(topic)
            .map(|emails| {
                emails
                    .iter()
                    .map(|email| Contact {
                        email: email.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl DirectoryStore for MemoryDirectoryStore {
    async fn employees_by_topic(&self, topic: &str) -> Result<Vec<Contact>, PortError> {
        if *self.fail.lock() {
            return Err(PortError::Unavailable("directory down".into()));
        }
        Ok(Self::contacts(&self.employees, topic))
    }

    async fn supervisors_by_topic(&self, topic: &str) -> Result<Vec<Contact>, PortError> {
        if *self.fail.lock() {
            return Err(PortError::Unavailable("directory down".into()));
        }
        Ok(Self::contacts(&self.supervisors, topic))
    }
}

/// Un envoi constaté par le mailer factice.
#[derive(Debug, Clone)]
pub struct SentMail {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub at: Instant,
}

/// Passerelle mail factice : enregistre chaque tentative et peut échouer un
/// nombre scripté de fois pour un destinataire donné.
#[derive(Default)]
pub struct MockMailer {
    attempts: Mutex<Vec<SentMail>>,
    failures: Mutex<HashMap<String, u32>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Les `count` prochains envois vers `recipient` échoueront.
    pub fn fail_next(&self, recipient: &str, count: u32) {
        self.failures.lock().insert(recipient.to_string(), count);
    }

    /// Toutes les tentatives, succès et échecs confondus.
    pub fn attempts(&self) -> Vec<SentMail> {
        self.attempts.lock().clone()
    }

    pub fn attempts_for(&self, recipient: &str) -> Vec<SentMail> {
        self.attempts
            .lock()
            .iter()
            .filter(|mail| mail.recipient == recipient)
            .cloned()
            .collect()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.attempts.lock().iter().map(|m| m.subject.clone()).collect()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send_mail(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), PortError> {
        self.attempts.lock().push(SentMail {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            at: Instant::now(),
        });

        let mut failures = self.failures.lock();
        if let Some(left) = failures.get_mut(recipient) {
            if *left > 0 {
                *left -= 1;
                return Err(PortError::Delivery(format!("{recipient} refused")));
            }
        }
        Ok(())
    }
}
