/**
 * VIGIL KERNEL - Ingestion télémétrie MQTT + alerting par seuils
 *
 * RÔLE : Coeur du système Vigil. S'abonne au broker MQTT, décode les mesures
 * capteurs, persiste l'historique par topic en lots bornés, évalue les seuils
 * configurés et expédie les alertes email avec retries.
 *
 * ARCHITECTURE : Event-driven via MQTT + API REST de contrôle + ports de
 * persistence + boucles de fond (flush batch, worker mail, caches TTL).
 */

pub mod batcher;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod decoder;
pub mod directory;
pub mod evaluator;
pub mod http;
pub mod mailqueue;
pub mod models;
pub mod ports;
pub mod registry;
pub mod smtp;
pub mod state;
