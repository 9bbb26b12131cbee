/**
 * MODÈLES DE DONNÉES - Structures centrales du kernel Vigil
 *
 * RÔLE : Définit les structures partagées entre tous les modules.
 * Types principaux : Sample (mesure horodatée), LiveMessage (dernier payload
 * brut), ThresholdLevel (palier d'alerte), LevelState (état d'hystérésis).
 *
 * UTILITÉ : Cohérence des données, sérialisation JSON, typage fort.
 */

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Une mesure numérique décodée, telle qu'elle part vers le store.
/// Le champ `value` est sérialisé sous le nom historique `message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(rename = "message")]
    pub value: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Dernier payload brut reçu sur un topic, écrasé à chaque arrivée.
/// Conservé même quand le payload n'est pas décodable en nombre.
#[derive(Debug, Clone, Serialize)]
pub struct LiveMessage {
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Un palier de seuil : `value` déclenche, `reset_value` ré-arme.
/// Contrat : `reset_value <= value`. La couleur "red" est toujours
/// prioritaire, quelle que soit sa valeur numérique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdLevel {
    pub color: String,
    pub value: f64,
    pub reset_value: f64,
}

/// Clé composite typée d'un palier : (couleur, valeur).
/// Les bits du f64 servent de clé pour rester Hash/Eq sans concaténation de
/// chaînes (une valeur contenant un délimiteur ne peut pas collisionner).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LevelKey {
    pub color: String,
    value_bits: u64,
}

impl LevelKey {
    pub fn new(color: &str, value: f64) -> Self {
        Self {
            color: color.to_string(),
            value_bits: value.to_bits(),
        }
    }

    pub fn value(&self) -> f64 {
        f64::from_bits(self.value_bits)
    }
}

/// État d'hystérésis d'un palier pour un topic donné.
/// `last_alert = None` correspond à l'état initial (jamais déclenché).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelState {
    pub triggered: bool,
    pub last_alert: Option<OffsetDateTime>,
}

/// Une entrée de l'annuaire : employé ou superviseur rattaché à des topics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_key_roundtrip() {
        let key = LevelKey::new("red", 90.5);
        assert_eq!(key.color, "red");
        assert_eq!(key.value(), 90.5);
    }

    #[test]
    fn test_level_key_distinguishes_colors_and_values() {
        assert_ne!(LevelKey::new("red", 50.0), LevelKey::new("yellow", 50.0));
        assert_ne!(LevelKey::new("red", 50.0), LevelKey::new("red", 50.1));
        assert_eq!(LevelKey::new("red", 50.0), LevelKey::new("red", 50.0));
    }

    #[test]
    fn test_sample_serializes_with_message_field() {
        let sample = Sample {
            value: 23.5,
            timestamp: OffsetDateTime::UNIX_EPOCH,
        };
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["message"], 23.5);
        assert_eq!(json["timestamp"], "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_threshold_level_camel_case() {
        let level: ThresholdLevel =
            serde_json::from_str(r#"{"color":"yellow","value":50,"resetValue":40}"#).unwrap();
        assert_eq!(level.reset_value, 40.0);
    }
}
