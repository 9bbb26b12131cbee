/*!
Stub du lien MQTT pour développement sans broker

Enregistre les abonnements et désabonnements demandés par le coordinateur et
permet de simuler un refus du broker (NACK).
*/

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use vigil_kernel::coordinator::MqttLink;

/// Lien broker factice, compatible avec le coordinateur du kernel.
#[derive(Default)]
pub struct MockMqttLink {
    subscribes: Mutex<Vec<String>>,
    unsubscribes: Mutex<Vec<String>>,
    refuse: Mutex<bool>,
}

impl MockMqttLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fait échouer les prochains subscribe/unsubscribe (NACK broker).
    pub fn set_refuse(&self, refuse: bool) {
        *self.refuse.lock() = refuse;
    }

    /// Abonnements demandés, dans l'ordre (pour assertions de tests).
    pub fn subscribe_calls(&self) -> Vec<String> {
        self.subscribes.lock().clone()
    }

    pub fn unsubscribe_calls(&self) -> Vec<String> {
        self.unsubscribes.lock().clone()
    }

    /// Reset des appels enregistrés.
    pub fn clear(&self) {
        self.subscribes.lock().clear();
        self.unsubscribes.lock().clear();
    }
}

#[async_trait]
impl MqttLink for MockMqttLink {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        if *self.refuse.lock() {
            anyhow::bail!("broker refused subscription to {topic}");
        }
        self.subscribes.lock().push(topic.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        if *self.refuse.lock() {
            anyhow::bail!("broker refused unsubscription from {topic}");
        }
        self.unsubscribes.lock().push(topic.to_string());
        Ok(())
    }
}

/// Générateur des formes de payload publiées par les capteurs.
pub struct PayloadBuilder;

impl PayloadBuilder {
    /// Nombre nu : `23.5`
    pub fn plain(value: f64) -> Vec<u8> {
        value.to_string().into_bytes()
    }

    /// Forme plate : `{"message": "23.5"}`
    pub fn flat(value: f64) -> Vec<u8> {
        serde_json::json!({ "message": value.to_string() })
            .to_string()
            .into_bytes()
    }

    /// Forme imbriquée : `{"message": {"message": 23.5}}`
    pub fn nested(value: f64) -> Vec<u8> {
        serde_json::json!({ "message": { "message": value } })
            .to_string()
            .into_bytes()
    }

    /// Payload de statut non numérique.
    pub fn status(text: &str) -> Vec<u8> {
        serde_json::json!({ "message": text }).to_string().into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_kernel::decoder::{decode, Decoded};

    #[tokio::test]
    async fn test_mock_link_records_and_refuses() {
        let link = MockMqttLink::new();
        link.subscribe("t").await.unwrap();
        assert_eq!(link.subscribe_calls(), vec!["t"]);

        link.set_refuse(true);
        assert!(link.subscribe("u").await.is_err());
        assert_eq!(link.subscribe_calls(), vec!["t"]);
    }

    #[test]
    fn test_payload_shapes_decode_to_same_number() {
        assert_eq!(decode(&PayloadBuilder::plain(23.5)), Decoded::Number(23.5));
        assert_eq!(decode(&PayloadBuilder::flat(23.5)), Decoded::Number(23.5));
        assert_eq!(decode(&PayloadBuilder::nested(23.5)), Decoded::Number(23.5));
        assert!(matches!(
            decode(&PayloadBuilder::status("calibrating")),
            Decoded::Passthrough(_)
        ));
    }
}
