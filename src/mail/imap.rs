//! Minimal blocking IMAP client over rustls (run it inside `spawn_blocking`).
//!
//! Only what the batch needs: LOGIN, SELECT, UID SEARCH/FETCH/STORE, LOGOUT.
//! Literals (`{n}\r\n` followed by n bytes) are read by length, so message
//! bodies containing lines that look like tagged responses are safe.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use rustls_pki_types::ServerName;
use secrecy::ExposeSecret;
use tracing::debug;

use crate::config::MailConfig;
use crate::error::MailError;

/// Socket read timeout; a stuck server fails the call instead of hanging.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Server response to one tagged command.
#[derive(Debug, Default)]
pub struct Response {
    /// Untagged and continuation lines, CRLF stripped.
    pub lines: Vec<String>,
    /// Literal payloads in the order they appeared.
    pub literals: Vec<Vec<u8>>,
}

/// An authenticated IMAP session with INBOX selected.
pub struct ImapSession {
    stream: BufReader<TlsStream>,
    next_tag: u32,
}

impl ImapSession {
    /// Connect over TLS, log in, and select INBOX.
    pub fn connect(config: &MailConfig) -> Result<Self, MailError> {
        let tcp = TcpStream::connect((config.imap_host.as_str(), config.imap_port)).map_err(|e| {
            MailError::Connect {
                host: config.imap_host.clone(),
                port: config.imap_port,
                reason: e.to_string(),
            }
        })?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = ServerName::try_from(config.imap_host.clone())
            .map_err(|e| MailError::Tls(format!("invalid server name: {e}")))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| MailError::Tls(e.to_string()))?;

        let mut session = Self {
            stream: BufReader::new(rustls::StreamOwned::new(conn, tcp)),
            next_tag: 1,
        };

        let greeting = session.read_line()?;
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(MailError::Protocol(format!("unexpected greeting: {greeting}")));
        }

        let login = format!(
            "LOGIN {} {}",
            quote(&config.username),
            quote(config.password.expose_secret())
        );
        session
            .command(&login)
            .map_err(|_| MailError::AuthFailed(config.username.clone()))?;
        session.command("SELECT \"INBOX\"")?;

        debug!(host = %config.imap_host, "IMAP session open");
        Ok(session)
    }

    /// UIDs of unseen messages, in mailbox order.
    pub fn search_unseen(&mut self) -> Result<Vec<String>, MailError> {
        let response = self.command("UID SEARCH UNSEEN")?;
        Ok(parse_search(&response.lines))
    }

    /// Raw bytes of one message. `BODY.PEEK` leaves the `\Seen` flag alone.
    pub fn fetch_raw(&mut self, uid: &str) -> Result<Vec<u8>, MailError> {
        let command = format!("UID FETCH {uid} BODY.PEEK[]");
        let mut response = self.command(&command)?;
        if response.literals.is_empty() {
            return Err(MailError::Command {
                command,
                reason: "no message body in response".into(),
            });
        }
        Ok(response.literals.swap_remove(0))
    }

    /// Set `\Seen` on a message.
    pub fn mark_seen(&mut self, uid: &str) -> Result<(), MailError> {
        self.command(&format!("UID STORE {uid} +FLAGS (\\Seen)"))?;
        Ok(())
    }

    /// Log out. The server may already have closed the connection.
    pub fn logout(mut self) -> Result<(), MailError> {
        self.command("LOGOUT")?;
        Ok(())
    }

    /// Send a tagged command and collect everything up to its completion line.
    fn command(&mut self, command: &str) -> Result<Response, MailError> {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;

        let stream = self.stream.get_mut();
        stream.write_all(format!("{tag} {command}\r\n").as_bytes())?;
        stream.flush()?;

        let mut response = Response::default();
        loop {
            let line = self.read_line()?;
            if let Some(status) = line.strip_prefix(&tag) {
                let status = status.trim();
                if status.starts_with("OK") {
                    return Ok(response);
                }
                // Never echo LOGIN arguments back into errors or logs.
                let verb = command.split_whitespace().next().unwrap_or_default().to_string();
                return Err(MailError::Command {
                    command: if verb == "LOGIN" { verb } else { command.to_string() },
                    reason: status.to_string(),
                });
            }

            if let Some(len) = literal_len(&line) {
                let mut literal = vec![0_u8; len];
                self.stream.read_exact(&mut literal)?;
                response.literals.push(literal);
            }
            response.lines.push(line);
        }
    }

    fn read_line(&mut self) -> Result<String, MailError> {
        let mut buf = Vec::new();
        let n = self.stream.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Err(MailError::Protocol("IMAP connection closed".into()));
        }
        let line = String::from_utf8_lossy(&buf);
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Length of the literal announced at the end of a response line, if any.
pub fn literal_len(line: &str) -> Option<usize> {
    let body = line.strip_suffix('}')?;
    let open = body.rfind('{')?;
    body[open + 1..].parse().ok()
}

/// UIDs listed in `* SEARCH` lines.
pub fn parse_search(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| line.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace().map(str::to_string))
        .collect()
}

/// Quote a LOGIN argument as an IMAP quoted string.
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}
