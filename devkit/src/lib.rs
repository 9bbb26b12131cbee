/*!
# Vigil DevKit - Stubs et Utilitaires pour Développement

Bibliothèque facilitant le développement et les tests du kernel Vigil avec:
- Stub du lien MQTT pour tests sans broker
- Mocks mémoire des ports (stores, annuaire, mailer)
- Générateurs des formes de payload capteur
- Harness assemblant un kernel complet sur mocks
*/

pub mod harness;
pub mod mqtt_stub;
pub mod store_stub;

pub use harness::TestHarness;
pub use mqtt_stub::{MockMqttLink, PayloadBuilder};
pub use store_stub::{MemoryDirectoryStore, MemorySampleStore, MemoryThresholdStore, MockMailer};
