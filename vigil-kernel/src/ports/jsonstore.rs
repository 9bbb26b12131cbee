/**
 * STORES JSON - Implémentations par défaut des ports sur fichiers JSON
 *
 * RÔLE :
 * Persistence locale du kernel quand aucune base externe n'est branchée.
 * Un fichier par domaine : samples.json, thresholds.json, directory.json.
 *
 * FONCTIONNEMENT :
 * - Lecture du fichier à chaque opération (les éditions hors-bande faites à
 *   la main dans thresholds.json ou directory.json sont donc visibles, c'est
 *   le cache TTL du kernel qui amortit le coût)
 * - Écriture complète du fichier à chaque mutation, en JSON indenté
 * - Fichier absent = store vide, jamais une erreur
 */

use super::{DirectoryStore, Mailer, PortError, SampleStore, ThresholdStore};
use crate::models::{Contact, Sample, ThresholdLevel};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info};

async fn read_json<T: DeserializeOwned + Default>(path: &PathBuf) -> Result<T, PortError> {
    if !path.exists() {
        return Ok(T::default());
    }
    let content = fs::read_to_string(path).await?;
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    Ok(serde_json::from_str(&content)?)
}

async fn write_json<T: Serialize>(path: &PathBuf, value: &T) -> Result<(), PortError> {
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content).await?;
    Ok(())
}

/// Historique des mesures : map topic -> enregistrements `{message, timestamp}`.
pub struct JsonSampleStore {
    path: PathBuf,
}

impl JsonSampleStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        info!("[store] sample store at {:?}", path);
        Self { path }
    }
}

#[async_trait]
impl SampleStore for JsonSampleStore {
    async fn append_samples(&self, topic: &str, samples: &[Sample]) -> Result<(), PortError> {
        let mut all: HashMap<String, Vec<Sample>> = read_json(&self.path).await?;
        all.entry(topic.to_string())
            .or_default()
            .extend(samples.iter().cloned());
        write_json(&self.path, &all).await?;
        debug!("[store] appended {} samples for {}", samples.len(), topic);
        Ok(())
    }
}

/// Configuration des seuils : map topic -> paliers.
pub struct JsonThresholdStore {
    path: PathBuf,
}

impl JsonThresholdStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        info!("[store] threshold store at {:?}", path);
        Self { path }
    }
}

#[async_trait]
impl ThresholdStore for JsonThresholdStore {
    async fn load_thresholds(
        &self,
        topic: &str,
    ) -> Result<Option<Vec<ThresholdLevel>>, PortError> {
        let all: HashMap<String, Vec<ThresholdLevel>> = read_json(&self.path).await?;
        Ok(all.get(topic).cloned())
    }

    async fn upsert_thresholds(
        &self,
        topic: &str,
        levels: Vec<ThresholdLevel>,
    ) -> Result<(), PortError> {
        let mut all: HashMap<String, Vec<ThresholdLevel>> = read_json(&self.path).await?;
        all.insert(topic.to_string(), levels);
        write_json(&self.path, &all).await?;
        debug!("[store] upserted thresholds for {}", topic);
        Ok(())
    }
}

/// Une personne de l'annuaire avec les topics qui la concernent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub email: String,
    #[serde(default)]
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    employees: Vec<DirectoryEntry>,
    #[serde(default)]
    supervisors: Vec<DirectoryEntry>,
}

/// Annuaire sur fichier : employés et superviseurs rattachés à des topics.
pub struct JsonDirectoryStore {
    path: PathBuf,
}

impl JsonDirectoryStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        info!("[store] directory store at {:?}", path);
        Self { path }
    }

    async fn by_topic(
        &self,
        topic: &str,
        supervisors: bool,
    ) -> Result<Vec<Contact>, PortError> {
        let file: DirectoryFile = read_json(&self.path).await?;
        let entries = if supervisors {
            file.supervisors
        } else {
            file.employees
        };
        Ok(entries
            .into_iter()
            .filter(|entry| entry.topics.iter().any(|t| t == topic))
            .map(|entry| Contact { email: entry.email })
            .collect())
    }
}

#[async_trait]
impl DirectoryStore for JsonDirectoryStore {
    async fn employees_by_topic(&self, topic: &str) -> Result<Vec<Contact>, PortError> {
        self.by_topic(topic, false).await
    }

    async fn supervisors_by_topic(&self, topic: &str) -> Result<Vec<Contact>, PortError> {
        self.by_topic(topic, true).await
    }
}

/// Mailer de secours quand aucun relais SMTP n'est configuré : trace l'alerte
/// et déclare l'envoi réussi pour ne pas faire tourner les retries à vide.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_mail(
        &self,
        recipient: &str,
        subject: &str,
        _body: &str,
    ) -> Result<(), PortError> {
        info!("[mail] (no relay configured) would send to {recipient}: {subject}");
        Ok(())
    }
}
