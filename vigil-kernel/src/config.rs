/**
 * CONFIGURATION KERNEL - Chargement des paramètres Vigil
 *
 * RÔLE :
 * Ce module gère la configuration centralisée du kernel depuis un fichier
 * YAML. Broker MQTT, relais SMTP, API de contrôle, répertoire de données et
 * topics à suivre au démarrage, avec fallback par défaut.
 *
 * FONCTIONNEMENT :
 * - Lecture de kernel.yaml (ou variable VIGIL_KERNEL_CONFIG)
 * - Parsing YAML -> structures typées avec serde
 * - Fallback vers configuration par défaut si fichier absent/invalide
 *
 * EXEMPLE KERNEL.YAML :
 * ```yaml
 * mqtt:
 *   host: "192.168.1.100"
 *   port: 1883
 * smtp:
 *   host: "127.0.0.1"
 *   port: 25
 *   from: "vigil@local"
 * http:
 *   port: 8080
 * data_dir: "./data"
 * topics:
 *   - "sensors/temperature"
 *   - "sensors/pressure"
 * ```
 */

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::warn;

/// Configuration principale du kernel Vigil
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KernelConfig {
    /// Connexion au broker MQTT
    pub mqtt: MqttConf,
    /// Relais SMTP pour les alertes ; absent = mailer de log
    pub smtp: Option<SmtpConf>,
    /// API REST de contrôle ; absent = port 8080
    pub http: Option<HttpConf>,
    /// Répertoire des stores JSON par défaut
    pub data_dir: Option<String>,
    /// Topics abonnés au démarrage
    #[serde(default)]
    pub topics: Vec<String>,
}

/// Configuration du broker MQTT
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    /// Hostname ou IP du broker
    pub host: String,
    /// Port du broker (généralement 1883 non-TLS, 8883 TLS)
    pub port: u16,
    /// Identifiant client ; défaut "vigil-kernel"
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Chemin d'un certificat CA ; présent = connexion TLS
    pub tls_ca: Option<String>,
    /// Session propre côté broker ; défaut true
    pub clean_session: Option<bool>,
}

/// Relais SMTP utilisé par la passerelle mail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SmtpConf {
    pub host: String,
    pub port: u16,
    /// Adresse expéditrice des alertes
    pub from: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpConf {
    pub port: u16,
}

impl Default for KernelConfig {
    /// Configuration par défaut si aucun kernel.yaml trouvé :
    /// broker localhost:1883, pas de SMTP, API sur 8080, data ./data
    fn default() -> Self {
        Self {
            mqtt: MqttConf {
                host: "localhost".into(),
                port: 1883,
                client_id: None,
                username: None,
                password: None,
                tls_ca: None,
                clean_session: None,
            },
            smtp: None,
            http: Some(HttpConf { port: 8080 }),
            data_dir: None,
            topics: Vec::new(),
        }
    }
}

impl KernelConfig {
    pub fn data_dir(&self) -> &str {
        self.data_dir.as_deref().unwrap_or("./data")
    }

    pub fn http_port(&self) -> u16 {
        self.http.as_ref().map_or(8080, |h| h.port)
    }
}

/// Charge la configuration depuis le fichier YAML.
/// Gère les erreurs gracieusement avec fallback vers config par défaut.
pub async fn load_config() -> KernelConfig {
    let path =
        std::env::var("VIGIL_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());

    if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        if txt.trim().is_empty() {
            return KernelConfig::default();
        }

        serde_yaml::from_str(&txt).unwrap_or_else(|e| {
            warn!("[config] invalid YAML in {path}: {e}, using defaults");
            KernelConfig::default()
        })
    } else {
        warn!("[config] {path} not found, using defaults");
        KernelConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_yaml_parses() {
        let yaml = r#"
mqtt:
  host: "broker.local"
  port: 8883
  username: "vigil"
  password: "secret"
  tls_ca: "/etc/vigil/ca.pem"
smtp:
  host: "mail.local"
  port: 25
  from: "vigil@local"
http:
  port: 9090
data_dir: "/var/lib/vigil"
topics:
  - "sensors/a"
  - "sensors/b"
"#;
        let cfg: KernelConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.mqtt.host, "broker.local");
        assert_eq!(cfg.mqtt.port, 8883);
        assert_eq!(cfg.http_port(), 9090);
        assert_eq!(cfg.data_dir(), "/var/lib/vigil");
        assert_eq!(cfg.topics.len(), 2);
        assert_eq!(cfg.smtp.unwrap().from, "vigil@local");
    }

    #[test]
    fn test_minimal_yaml_gets_defaults() {
        let yaml = "mqtt:\n  host: \"localhost\"\n  port: 1883\n";
        let cfg: KernelConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.smtp.is_none());
        assert_eq!(cfg.http_port(), 8080);
        assert_eq!(cfg.data_dir(), "./data");
        assert!(cfg.topics.is_empty());
    }
}
