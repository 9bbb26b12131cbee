//! Client SMTP minimal pour l'envoi des alertes.
//!
//! Dialogue en clair avec le relais configuré (EHLO/MAIL/RCPT/DATA), un
//! destinataire par envoi. Pas de STARTTLS ni d'authentification : le relais
//! est supposé local ou de confiance, comme le broker MQTT.

use crate::config::SmtpConf;
use crate::ports::{Mailer, PortError};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

pub struct SmtpMailer {
    host: String,
    port: u16,
    from: String,
}

impl SmtpMailer {
    pub fn new(conf: &SmtpConf) -> Self {
        Self {
            host: conf.host.clone(),
            port: conf.port,
            from: conf.from.clone(),
        }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_mail(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), PortError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| PortError::Unavailable(format!("smtp connect: {e}")))?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        expect_reply(&mut reader, "greeting").await?;

        let commands = [
            format!("EHLO vigil\r\n"),
            format!("MAIL FROM:<{}>\r\n", self.from),
            format!("RCPT TO:<{recipient}>\r\n"),
            "DATA\r\n".to_string(),
        ];
        for command in &commands {
            write_half.write_all(command.as_bytes()).await?;
            expect_reply(&mut reader, command.trim_end()).await?;
        }

        let message = format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\n\r\n{}\r\n.\r\n",
            self.from,
            recipient,
            subject,
            dot_stuff(body)
        );
        write_half.write_all(message.as_bytes()).await?;
        expect_reply(&mut reader, "DATA body").await?;

        // le QUIT est de politesse, son échec n'invalide pas l'envoi
        let _ = write_half.write_all(b"QUIT\r\n").await;

        debug!("[mail] delivered to {recipient} via {}:{}", self.host, self.port);
        Ok(())
    }
}

/// Lit une réponse SMTP (multi-lignes "250-" incluses) et vérifie son code.
async fn expect_reply<R>(reader: &mut BufReader<R>, stage: &str) -> Result<(), PortError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(PortError::Delivery(format!("{stage}: connection closed")));
        }
        // "250-..." = suite de réponse, "250 ..." = dernière ligne
        if line.len() >= 4 && line.as_bytes()[3] == b'-' {
            continue;
        }
        if reply_accepted(&line) {
            return Ok(());
        }
        return Err(PortError::Delivery(format!("{stage}: {}", line.trim_end())));
    }
}

/// Codes 2xx et 3xx acceptés (354 attendu après DATA).
fn reply_accepted(line: &str) -> bool {
    matches!(line.as_bytes().first(), Some(b'2') | Some(b'3'))
}

/// Une ligne du corps commençant par '.' terminerait le DATA trop tôt.
fn dot_stuff(body: &str) -> String {
    body.lines()
        .map(|line| {
            if line.starts_with('.') {
                format!(".{line}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_accepted() {
        assert!(reply_accepted("250 OK\r\n"));
        assert!(reply_accepted("354 End data with <CR><LF>.<CR><LF>\r\n"));
        assert!(!reply_accepted("550 No such user\r\n"));
        assert!(!reply_accepted("421 Service not available\r\n"));
    }

    #[test]
    fn test_dot_stuffing() {
        assert_eq!(dot_stuff("hello\n.danger\nworld"), "hello\r\n..danger\r\nworld");
        assert_eq!(dot_stuff("plain"), "plain");
    }

    #[tokio::test]
    async fn test_expect_reply_multiline() {
        let input: &[u8] = b"250-relay.local\r\n250-SIZE 1000\r\n250 OK\r\n";
        let mut reader = BufReader::new(input);
        assert!(expect_reply(&mut reader, "EHLO").await.is_ok());
    }

    #[tokio::test]
    async fn test_expect_reply_rejection() {
        let input: &[u8] = b"550 mailbox unavailable\r\n";
        let mut reader = BufReader::new(input);
        let err = expect_reply(&mut reader, "RCPT").await.unwrap_err();
        assert!(err.to_string().contains("550"));
    }
}
