/**
 * COORDINATEUR MQTT - Session broker, ingestion et surface de contrôle
 *
 * RÔLE : Possède la session MQTT et l'ensemble des topics abonnés. Chaque
 * message entrant traverse le pipeline : décodage → dernier message →
 * batcher → évaluateur de seuils. À chaque (re)connexion, tous les topics
 * de l'ensemble sont réabonnés.
 *
 * FONCTIONNEMENT : La boucle d'événements rumqttc tourne dans une tâche
 * dédiée ; les erreurs de connexion y sont absorbées (reconnexion auto du
 * client). Aucune erreur du pipeline ne peut tuer la session.
 */

use crate::batcher::SampleBatcher;
use crate::config::MqttConf;
use crate::decoder::{decode, Decoded};
use crate::evaluator::ThresholdEvaluator;
use crate::models::{LiveMessage, Sample, ThresholdLevel};
use crate::registry::ThresholdRegistry;
use crate::state::{new_state, Shared};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rumqttc::{
    AsyncClient, Event, EventLoop, Incoming, MqttOptions, NetworkOptions, QoS,
    SubscribeReasonCode, TlsConfiguration, Transport,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub const MQTT_KEEPALIVE: Duration = Duration::from_secs(30);
pub const RECONNECT_PERIOD: Duration = Duration::from_millis(1000);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Au-delà de cette taille un payload est considéré comme du trafic de
/// contrôle ou de diagnostic : il met à jour le dernier message mais ne
/// produit ni échantillon ni évaluation de seuil.
pub const SAMPLE_PAYLOAD_LIMIT: usize = 100;

/// Le strict nécessaire de la session broker vu du coordinateur. Implémenté
/// par rumqttc en production et par le stub du devkit dans les tests.
#[async_trait]
pub trait MqttLink: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<()>;
    async fn unsubscribe(&self, topic: &str) -> Result<()>;
}

pub struct RumqttcLink {
    client: AsyncClient,
}

#[async_trait]
impl MqttLink for RumqttcLink {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .context("broker subscribe")
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.client
            .unsubscribe(topic)
            .await
            .context("broker unsubscribe")
    }
}

/// Cycle de vie de la session broker.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Offline,
}

pub struct Coordinator {
    link: Arc<dyn MqttLink>,
    topics: Shared<HashSet<String>>,
    latest: Shared<HashMap<String, LiveMessage>>,
    connection: Shared<ConnectionState>,
    batcher: Arc<SampleBatcher>,
    evaluator: Arc<ThresholdEvaluator>,
    registry: Arc<ThresholdRegistry>,
}

impl Coordinator {
    pub fn new(
        link: Arc<dyn MqttLink>,
        batcher: Arc<SampleBatcher>,
        evaluator: Arc<ThresholdEvaluator>,
        registry: Arc<ThresholdRegistry>,
    ) -> Self {
        Self {
            link,
            topics: new_state(HashSet::new()),
            latest: new_state(HashMap::new()),
            connection: new_state(ConnectionState::Connecting),
            batcher,
            evaluator,
            registry,
        }
    }

    /// Abonnement idempotent : un topic déjà abonné ne repart pas vers le
    /// broker. L'état local ne change que si le broker accepte.
    pub async fn subscribe_to_topic(&self, topic: &str) {
        if topic.is_empty() {
            warn!("[mqtt] ignoring subscription to empty topic");
            return;
        }
        if self.topics.lock().contains(topic) {
            debug!("[mqtt] already subscribed to {topic}");
            return;
        }
        match self.link.subscribe(topic).await {
            Ok(()) => {
                self.topics.lock().insert(topic.to_string());
                self.batcher.init_topic(topic);
                info!("[mqtt] subscribed to {topic}");
            }
            Err(e) => warn!("[mqtt] subscribe to {topic} failed, state unchanged: {e}"),
        }
    }

    /// Désabonnement idempotent. Sur acquittement, tout l'état par-topic est
    /// démonté : dernier message, file d'échantillons, états de seuil.
    pub async fn unsubscribe_from_topic(&self, topic: &str) {
        if !self.topics.lock().contains(topic) {
            return;
        }
        match self.link.unsubscribe(topic).await {
            Ok(()) => {
                self.topics.lock().remove(topic);
                self.latest.lock().remove(topic);
                self.batcher.remove_topic(topic);
                self.evaluator.clear_topic(topic);
                info!("[mqtt] unsubscribed from {topic}");
            }
            Err(e) => warn!("[mqtt] unsubscribe from {topic} failed: {e}"),
        }
    }

    pub fn is_topic_subscribed(&self, topic: &str) -> bool {
        self.topics.lock().contains(topic)
    }

    pub fn subscribed_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.topics.lock().iter().cloned().collect();
        topics.sort();
        topics
    }

    pub fn get_latest_live_message(&self, topic: &str) -> Option<LiveMessage> {
        self.latest.lock().get(topic).cloned()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.lock().clone()
    }

    pub async fn update_thresholds(&self, topic: &str, levels: Vec<ThresholdLevel>) -> Result<()> {
        self.registry.update_thresholds(topic, levels).await
    }

    /// Pipeline d'ingestion d'un message entrant. Ne retourne jamais
    /// d'erreur : tout est tracé et absorbé ici.
    pub async fn handle_message(&self, topic: &str, payload: &[u8]) {
        let now = OffsetDateTime::now_utc();
        let decoded = decode(payload);

        // le dernier message est mis à jour dans tous les cas, payload
        // décodable ou non
        self.latest.lock().insert(
            topic.to_string(),
            LiveMessage {
                message: String::from_utf8_lossy(payload).into_owned(),
                timestamp: now,
            },
        );

        match decoded {
            Decoded::Number(value) if payload.len() < SAMPLE_PAYLOAD_LIMIT => {
                self.batcher.enqueue(topic, Sample { value, timestamp: now });
                self.evaluator.evaluate(topic, value).await;
            }
            Decoded::Number(_) => {
                debug!("[mqtt] oversized payload on {topic}, kept as live message only")
            }
            Decoded::Passthrough(_) => debug!("[mqtt] non-numeric payload on {topic}"),
            Decoded::Undecodable => warn!("[mqtt] undecodable payload on {topic}"),
        }
    }

    /// Appelé sur chaque ConnAck, reconnexions comprises : tous les topics de
    /// l'ensemble sont réabonnés. Un échec laisse le topic en place, la
    /// prochaine reconnexion retentera.
    pub async fn handle_connected(&self) {
        *self.connection.lock() = ConnectionState::Connected;
        let topics = self.subscribed_topics();
        if !topics.is_empty() {
            info!("[mqtt] connected, resubscribing {} topics", topics.len());
        }
        for topic in topics {
            if let Err(e) = self.link.subscribe(&topic).await {
                warn!("[mqtt] resubscribe to {topic} failed: {e}");
            }
        }
    }

    pub fn mark_reconnecting(&self) {
        *self.connection.lock() = ConnectionState::Reconnecting;
    }

    pub fn mark_offline(&self) {
        *self.connection.lock() = ConnectionState::Offline;
    }
}

/// Construit la session rumqttc depuis la configuration.
pub fn session_from_config(conf: &MqttConf) -> Result<(Arc<RumqttcLink>, EventLoop)> {
    let client_id = conf
        .client_id
        .clone()
        .unwrap_or_else(|| "vigil-kernel".to_string());
    let mut options = MqttOptions::new(client_id, &conf.host, conf.port);
    options.set_keep_alive(MQTT_KEEPALIVE);
    options.set_clean_session(conf.clean_session.unwrap_or(true));
    if let (Some(user), Some(password)) = (&conf.username, &conf.password) {
        options.set_credentials(user, password);
    }
    if let Some(ca_path) = &conf.tls_ca {
        let ca = std::fs::read(ca_path)
            .with_context(|| format!("reading TLS CA from {ca_path}"))?;
        options.set_transport(Transport::Tls(TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth: None,
        }));
    }

    let (client, mut eventloop) = AsyncClient::new(options, 100);
    let mut network = NetworkOptions::new();
    network.set_connection_timeout(CONNECT_TIMEOUT.as_secs());
    eventloop.set_network_options(network);

    Ok((Arc::new(RumqttcLink { client }), eventloop))
}

/// Boucle d'événements MQTT dans une tâche dédiée. Les erreurs de connexion
/// sont tracées puis absorbées : rumqttc retente à la prochaine itération.
pub fn spawn_mqtt_listener(
    coordinator: Arc<Coordinator>,
    mut eventloop: EventLoop,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    coordinator.handle_connected().await;
                }
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    coordinator
                        .handle_message(&publish.topic, &publish.payload)
                        .await;
                }
                Ok(Event::Incoming(Incoming::SubAck(ack))) => {
                    for code in &ack.return_codes {
                        if matches!(code, SubscribeReasonCode::Failure) {
                            warn!("[mqtt] broker rejected a subscription (pkid {})", ack.pkid);
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    coordinator.mark_reconnecting();
                    warn!(
                        "[mqtt] connection error: {e}, retrying in {}ms",
                        RECONNECT_PERIOD.as_millis()
                    );
                    sleep(RECONNECT_PERIOD).await;
                }
            }
        }
    })
}
