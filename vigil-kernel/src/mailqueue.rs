/**
 * FILE D'EMAILS - Expédition des alertes avec retries bornés
 *
 * RÔLE : FIFO d'emails en attente, traitée par un worker unique. Chaque
 * envoi part une fois par destinataire en parallèle ; un seul destinataire
 * en échec fait réessayer l'email entier, au plus 3 fois, avec 1 s entre
 * deux tentatives. Au-delà, l'email est abandonné.
 *
 * FONCTIONNEMENT : Le worker est réveillé par un signal à l'enqueue (pas de
 * polling). Les retries repartent en queue de file : FIFO best-effort.
 */

use crate::ports::Mailer;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

pub const MAX_MAIL_RETRIES: u32 = 3;
pub const MAIL_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Un email en attente d'expédition.
#[derive(Debug, Clone)]
pub struct PendingEmail {
    pub id: Uuid,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    retries: u32,
    next_eligible: Instant,
}

struct Inner {
    mailer: Arc<dyn Mailer>,
    pending: Mutex<VecDeque<PendingEmail>>,
    notify: Notify,
}

#[derive(Clone)]
pub struct MailQueue {
    inner: Arc<Inner>,
}

impl MailQueue {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self {
            inner: Arc::new(Inner {
                mailer,
                pending: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
            }),
        }
    }

    /// Enfile un email et réveille le worker. Temps constant.
    pub fn enqueue(&self, recipients: Vec<String>, subject: String, body: String) {
        let mail = PendingEmail {
            id: Uuid::new_v4(),
            recipients,
            subject,
            body,
            retries: 0,
            next_eligible: Instant::now(),
        };
        debug!("[mail] queued {} -> {:?}", mail.id, mail.recipients);
        self.inner.pending.lock().push_back(mail);
        self.inner.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.pending.lock().is_empty()
    }

    /// Lance le worker d'expédition (tâche unique, jamais ré-entrant).
    pub fn spawn_worker(&self) -> tokio::task::JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            loop {
                run_round(&inner).await;
            }
        })
    }
}

enum Wait {
    /// File vide : on attend un enqueue.
    Empty,
    /// La tête n'est pas encore éligible : on dort jusqu'à son échéance.
    Until(Instant),
}

/// Un tour de worker : prélève les emails expédiables, les envoie en
/// parallèle, remet les échecs en queue de file.
async fn run_round(inner: &Inner) {
    let mut round: Vec<PendingEmail> = Vec::new();
    let mut wait: Option<Wait> = None;

    {
        let mut pending = inner.pending.lock();
        loop {
            let (retries, next_eligible) = match pending.front() {
                None => {
                    if round.is_empty() {
                        wait = Some(Wait::Empty);
                    }
                    break;
                }
                Some(head) => (head.retries, head.next_eligible),
            };

            if retries >= MAX_MAIL_RETRIES {
                if let Some(dropped) = pending.pop_front() {
                    warn!(
                        "[mail] dropping {} after {} failed attempts",
                        dropped.id, dropped.retries
                    );
                }
                continue;
            }

            if retries > 0 && Instant::now() < next_eligible {
                if round.is_empty() {
                    wait = Some(Wait::Until(next_eligible));
                }
                break;
            }

            if let Some(mail) = pending.pop_front() {
                round.push(mail);
            }
        }
    }

    match wait {
        Some(Wait::Empty) => {
            inner.notify.notified().await;
            return;
        }
        Some(Wait::Until(at)) => {
            tokio::time::sleep_until(at).await;
            return;
        }
        None => {}
    }

    if round.is_empty() {
        return;
    }

    let outcomes = join_all(round.iter().map(|mail| dispatch(&*inner.mailer, mail))).await;

    let retry_at = Instant::now() + MAIL_RETRY_DELAY;
    let mut pending = inner.pending.lock();
    for (mut mail, delivered) in round.into_iter().zip(outcomes) {
        if delivered {
            debug!("[mail] delivered {}", mail.id);
        } else {
            mail.retries += 1;
            mail.next_eligible = retry_at;
            pending.push_back(mail);
        }
    }
}

/// Expédie un email : un envoi par destinataire, en parallèle. Le moindre
/// destinataire en échec fait échouer l'email entier.
async fn dispatch(mailer: &dyn Mailer, mail: &PendingEmail) -> bool {
    let sends = mail
        .recipients
        .iter()
        .map(|recipient| mailer.send_mail(recipient, &mail.subject, &mail.body));
    let results = join_all(sends).await;

    let mut delivered = true;
    for (recipient, result) in mail.recipients.iter().zip(results) {
        if let Err(e) = result {
            warn!("[mail] send to {recipient} failed for {}: {e}", mail.id);
            delivered = false;
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PortError;
    use async_trait::async_trait;

    /// Mailer scripté : échoue tant que le compteur d'échecs n'est pas épuisé.
    struct ScriptedMailer {
        fail_recipient: Option<String>,
        failures_left: Mutex<u32>,
        attempts: Mutex<Vec<(String, Instant)>>,
    }

    impl ScriptedMailer {
        fn new(fail_recipient: Option<&str>, failures: u32) -> Arc<Self> {
            Arc::new(Self {
                fail_recipient: fail_recipient.map(String::from),
                failures_left: Mutex::new(failures),
                attempts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Mailer for ScriptedMailer {
        async fn send_mail(
            &self,
            recipient: &str,
            _subject: &str,
            _body: &str,
        ) -> Result<(), PortError> {
            self.attempts
                .lock()
                .push((recipient.to_string(), Instant::now()));
            if Some(recipient) == self.fail_recipient.as_deref() {
                let mut left = self.failures_left.lock();
                if *left > 0 {
                    *left -= 1;
                    return Err(PortError::Delivery("refused".into()));
                }
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success_with_one_second_spacing() {
        let mailer = ScriptedMailer::new(Some("b@x"), 2);
        let queue = MailQueue::new(mailer.clone());
        queue.spawn_worker();

        let start = Instant::now();
        queue.enqueue(
            vec!["a@x".into(), "b@x".into()],
            "s".into(),
            "corps".into(),
        );

        // 2 échecs puis succès : l'email disparaît de la file
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(queue.is_empty());

        let attempts = mailer.attempts.lock();
        let b_times: Vec<Duration> = attempts
            .iter()
            .filter(|(r, _)| r == "b@x")
            .map(|(_, at)| *at - start)
            .collect();
        assert_eq!(b_times.len(), 3);
        assert_eq!(b_times[0], Duration::ZERO);
        assert_eq!(b_times[1], Duration::from_secs(1));
        assert_eq!(b_times[2], Duration::from_secs(2));
        // a@x est retenté avec l'email entier
        assert_eq!(attempts.iter().filter(|(r, _)| r == "a@x").count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_after_retry_cap() {
        let mailer = ScriptedMailer::new(Some("a@x"), u32::MAX);
        let queue = MailQueue::new(mailer.clone());
        queue.spawn_worker();

        queue.enqueue(vec!["a@x".into()], "s".into(), "corps".into());
        tokio::time::sleep(Duration::from_secs(10)).await;

        // 3 tentatives puis abandon
        assert_eq!(mailer.attempts.lock().len(), MAX_MAIL_RETRIES as usize);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_and_retry_moves_to_tail() {
        let mailer = ScriptedMailer::new(Some("flaky@x"), 1);
        let queue = MailQueue::new(mailer.clone());

        queue.enqueue(vec!["flaky@x".into()], "premier".into(), "c".into());
        queue.enqueue(vec!["ok@x".into()], "second".into(), "c".into());
        queue.spawn_worker();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(queue.is_empty());

        let attempts = mailer.attempts.lock();
        let order: Vec<&str> = attempts.iter().map(|(r, _)| r.as_str()).collect();
        // le premier tour expédie les deux ensemble, le retry repasse seul
        assert_eq!(order, vec!["flaky@x", "ok@x", "flaky@x"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_sleeps_when_empty() {
        let mailer = ScriptedMailer::new(None, 0);
        let queue = MailQueue::new(mailer.clone());
        queue.spawn_worker();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(mailer.attempts.lock().is_empty());

        queue.enqueue(vec!["a@x".into()], "s".into(), "c".into());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(mailer.attempts.lock().len(), 1);
    }
}
