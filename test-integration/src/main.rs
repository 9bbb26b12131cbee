use anyhow::Result;
use log::{error, info, warn};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::time::{sleep, Duration};

// ===== Configuration =====
const MQTT_BROKER: &str = "127.0.0.1";
const MQTT_PORT: u16 = 1883;
const CLIENT_ID: &str = "vigil-test-publisher";
const TOPIC: &str = "sensors/demo";

/// Publie une rampe de valeurs en dents de scie (0 → 120) sur `sensors/demo`
/// pour faire franchir au kernel les seuils yellow/red d'une config type :
/// `[{color: yellow, value: 50, resetValue: 40}, {color: red, value: 90, resetValue: 80}]`.
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("🚀 Starting vigil test publisher on {TOPIC}");

    let mut mqttoptions = MqttOptions::new(CLIENT_ID, MQTT_BROKER, MQTT_PORT);
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);

    // boucle d'événements en fond, juste pour garder la session vivante
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => info!("✅ Connected to broker"),
                Ok(_) => {}
                Err(e) => {
                    warn!("⚠️ MQTT connection error: {e}. Reconnecting...");
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    // alterne les trois formes de payload que le kernel sait décoder
    let mut tick: u64 = 0;
    loop {
        let value = (tick % 25) as f64 * 5.0; // 0, 5, ..., 120 puis retour à 0
        let payload = match tick % 3 {
            0 => value.to_string(),
            1 => serde_json::json!({ "message": value.to_string() }).to_string(),
            _ => serde_json::json!({ "message": { "message": value } }).to_string(),
        };

        match client
            .publish(TOPIC, QoS::AtLeastOnce, false, payload.clone())
            .await
        {
            Ok(()) => info!("📤 Published {value} to {TOPIC}"),
            Err(e) => error!("❌ Publish failed: {e}"),
        }

        tick += 1;
        sleep(Duration::from_secs(1)).await;
    }
}
