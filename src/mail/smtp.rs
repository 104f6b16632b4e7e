//! Outbound delivery over SMTP (implicit TLS) via lettre.

use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message as Email, SmtpTransport, Transport};
use secrecy::ExposeSecret;

use crate::config::MailConfig;
use crate::error::MailError;

use super::Reply;

/// Build the outgoing message. Split out so address validation is testable
/// without a server.
pub fn build_email(from: &str, reply: &Reply) -> Result<Email, MailError> {
    let failed = |reason: String| MailError::SendFailed {
        to: reply.to.clone(),
        reason,
    };

    Email::builder()
        .from(from.parse().map_err(|e| failed(format!("Invalid from address: {e}")))?)
        .to(reply.to.parse().map_err(|e| failed(format!("Invalid to address: {e}")))?)
        .subject(reply.subject.as_str())
        .body(reply.body.clone())
        .map_err(|e| failed(format!("Failed to build email: {e}")))
}

/// Send a reply. Blocking, run it in `spawn_blocking`.
pub fn send_reply(config: &MailConfig, reply: &Reply) -> Result<(), MailError> {
    let email = build_email(&config.from_address, reply)?;

    let creds = Credentials::new(
        config.username.clone(),
        config.password.expose_secret().to_string(),
    );
    let transport = SmtpTransport::relay(&config.smtp_host)
        .map_err(|e| MailError::SendFailed {
            to: reply.to.clone(),
            reason: format!("SMTP relay error: {e}"),
        })?
        .port(config.smtp_port)
        .credentials(creds)
        .build();

    transport.send(&email).map_err(|e| MailError::SendFailed {
        to: reply.to.clone(),
        reason: format!("SMTP send failed: {e}"),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(to: &str) -> Reply {
        Reply {
            to: to.to_string(),
            subject: "Re: Question".to_string(),
            body: "Answer".to_string(),
        }
    }

    #[test]
    fn builds_email_with_headers() {
        let email = build_email("agent@example.com", &reply("alice@example.com")).unwrap();
        let raw = String::from_utf8(email.formatted()).unwrap();

        assert!(raw.contains("To: alice@example.com"));
        assert!(raw.contains("From: agent@example.com"));
        assert!(raw.contains("Subject: Re: Question"));
    }

    #[test]
    fn invalid_recipient_is_a_send_failure() {
        let err = build_email("agent@example.com", &reply("not an address")).unwrap_err();
        assert!(matches!(err, MailError::SendFailed { ref to, .. } if to == "not an address"));
    }
}
