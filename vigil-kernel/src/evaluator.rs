/**
 * ÉVALUATEUR DE SEUILS - Machine à états d'alerte par topic et par palier
 *
 * RÔLE : Décide pour chaque mesure si une alerte part, et à quel niveau.
 * Les paliers sont parcourus par valeur décroissante ; "red" domine tout :
 * quand il se déclenche, les paliers inférieurs sont réduits au silence pour
 * cette mesure.
 *
 * FONCTIONNEMENT :
 * - Franchissement (v >= value) : alerte si le palier n'était pas déclenché
 *   ou si le cooldown de 30 s est écoulé
 * - Retombée (v < reset_value) : ré-arme le palier (hystérésis)
 * - Zone morte (reset_value <= v < value) : état inchangé
 */

use crate::directory::RecipientDirectory;
use crate::mailqueue::MailQueue;
use crate::models::{LevelKey, LevelState, ThresholdLevel};
use crate::registry::ThresholdRegistry;
use crate::state::{new_state, Shared};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info};

pub const THRESHOLD_COOLDOWN_PERIOD: time::Duration = time::Duration::seconds(30);

/// Couleur prioritaire, quelle que soit sa valeur numérique.
pub const DANGER_COLOR: &str = "red";

type TopicStates = HashMap<String, HashMap<LevelKey, LevelState>>;

pub struct ThresholdEvaluator {
    registry: Arc<ThresholdRegistry>,
    directory: Arc<RecipientDirectory>,
    mail: MailQueue,
    states: Shared<TopicStates>,
}

impl ThresholdEvaluator {
    pub fn new(
        registry: Arc<ThresholdRegistry>,
        directory: Arc<RecipientDirectory>,
        mail: MailQueue,
    ) -> Self {
        Self {
            registry,
            directory,
            mail,
            states: new_state(HashMap::new()),
        }
    }

    /// Évalue une mesure fraîchement reçue sur un topic.
    pub async fn evaluate(&self, topic: &str, value: f64) {
        self.evaluate_at(topic, value, OffsetDateTime::now_utc()).await;
    }

    /// Variante avec horloge explicite (le cooldown devient testable).
    pub async fn evaluate_at(&self, topic: &str, value: f64, now: OffsetDateTime) {
        let Some(mut levels) = self.registry.thresholds(topic).await else {
            return;
        };
        if levels.is_empty() {
            return;
        }

        // tri stable par valeur décroissante ; pas de départage par couleur
        levels.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(Ordering::Equal));

        let fired = self.walk_levels(topic, &levels, value, now);
        if fired.is_empty() {
            return;
        }

        let recipients = self.directory.recipients(topic).await;
        if recipients.is_empty() {
            debug!("[evaluator] alert on {topic} dropped, no recipients");
            return;
        }

        for level in fired {
            let (subject, body) = build_alert(topic, value, &level, now);
            info!("[evaluator] {} alert on {topic} at {value}", level.color);
            self.mail
                .enqueue(recipients.clone(), subject, body);
        }
    }

    /// Parcourt la ladder sous le verrou d'état et retourne les paliers qui
    /// doivent alerter. La résolution des destinataires se fait après.
    fn walk_levels(
        &self,
        topic: &str,
        levels: &[ThresholdLevel],
        value: f64,
        now: OffsetDateTime,
    ) -> Vec<ThresholdLevel> {
        let mut all = self.states.lock();
        let topic_states = all.entry(topic.to_string()).or_default();

        let mut fired = Vec::new();
        let mut danger_triggered = false;

        for level in levels {
            let key = LevelKey::new(&level.color, level.value);
            let state = topic_states.entry(key).or_default();
            let is_danger = level.color == DANGER_COLOR;

            if value >= level.value {
                if is_danger {
                    danger_triggered = true;
                } else if danger_triggered {
                    // red a franchi : silence sur les paliers inférieurs
                    continue;
                }

                let cooled_down = match state.last_alert {
                    Some(last) => now - last >= THRESHOLD_COOLDOWN_PERIOD,
                    None => true,
                };
                if !state.triggered || cooled_down {
                    state.triggered = true;
                    state.last_alert = Some(now);
                    fired.push(level.clone());
                    if is_danger {
                        break;
                    }
                }
            } else if value < level.reset_value {
                // hystérésis : le palier est ré-armé
                *state = LevelState::default();
            }
            // reset_value <= value < value : zone morte, état inchangé
        }

        fired
    }

    /// Oubli de tout l'état d'un topic (désabonnement).
    pub fn clear_topic(&self, topic: &str) {
        self.states.lock().remove(topic);
    }

    pub fn has_state(&self, topic: &str) -> bool {
        self.states.lock().contains_key(topic)
    }
}

/// Construit sujet et corps d'une alerte.
fn build_alert(
    topic: &str,
    value: f64,
    level: &ThresholdLevel,
    now: OffsetDateTime,
) -> (String, String) {
    let is_danger = level.color == DANGER_COLOR;
    let kind = if is_danger { "Danger" } else { "Warning" };
    let severity = if is_danger { "critical" } else { "warning" };
    let closing = if is_danger {
        "IMMEDIATE ACTION REQUIRED: Critical threshold exceeded!"
    } else {
        "WARNING: Monitor situation closely."
    };
    let timestamp = now.format(&Rfc3339).unwrap_or_default();

    let subject = format!("{kind}: {topic} Threshold Exceeded");
    let body = format!(
        "{kind} alert for {topic}\n\
         Current value: {value}\n\
         Threshold: {}\n\
         Severity: {severity}\n\
         Timestamp: {timestamp}\n\
         {closing}",
        level.value
    );
    (subject, body)
}
