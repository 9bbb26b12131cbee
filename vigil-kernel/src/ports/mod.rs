/**
 * PORTS v1 - Contrats vers les collaborateurs externes du kernel
 *
 * RÔLE :
 * Ce module définit les interfaces que le kernel consomme sans connaître
 * leur implémentation : store d'échantillons, store de seuils, annuaire des
 * destinataires, passerelle mail.
 *
 * FONCTIONNEMENT :
 * - Un trait async par collaborateur, consommé en `Arc<dyn ...>`
 * - PortError = erreurs communes (I/O, sérialisation, indisponibilité)
 * - Implémentations par défaut sur fichiers JSON dans `jsonstore`
 * - Mocks mémoire dans le devkit pour les tests sans broker ni relais
 *
 * UTILITÉ POUR VIGIL :
 * ✅ Le coordinateur reste testable sans MongoDB/SMTP réels
 * ✅ Les stores peuvent évoluer (fichier JSON → base) sans toucher au coeur
 * ✅ Les erreurs externes sont toutes absorbées au même endroit
 */

pub mod jsonstore;

use crate::models::{Contact, Sample, ThresholdLevel};
use async_trait::async_trait;

/// Erreurs possibles lors des opérations sur les ports
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

/// Store durable de l'historique des mesures.
/// `append_samples` est un upsert : le document du topic est créé au premier
/// lot puis les enregistrements `{message, timestamp}` y sont ajoutés.
#[async_trait]
pub trait SampleStore: Send + Sync {
    async fn append_samples(&self, topic: &str, samples: &[Sample]) -> Result<(), PortError>;
}

/// Store de configuration des seuils par topic.
#[async_trait]
pub trait ThresholdStore: Send + Sync {
    async fn load_thresholds(&self, topic: &str)
        -> Result<Option<Vec<ThresholdLevel>>, PortError>;
    async fn upsert_thresholds(
        &self,
        topic: &str,
        levels: Vec<ThresholdLevel>,
    ) -> Result<(), PortError>;
}

/// Annuaire : qui doit recevoir les alertes d'un topic.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn employees_by_topic(&self, topic: &str) -> Result<Vec<Contact>, PortError>;
    async fn supervisors_by_topic(&self, topic: &str) -> Result<Vec<Contact>, PortError>;
}

/// Passerelle d'envoi de mail, un destinataire à la fois.
/// Toute erreur signale au worker de la file qu'il faut réessayer.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_mail(&self, recipient: &str, subject: &str, body: &str)
        -> Result<(), PortError>;
}
