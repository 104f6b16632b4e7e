//! Turning raw RFC 822 bytes into a [`Message`].

use mail_parser::{MessageParser, MimeHeaders};

use super::Message;

/// Parse a raw message. Returns `None` when the bytes are not a message at all.
pub fn parse_message(uid: &str, raw: &[u8]) -> Option<Message> {
    let parsed = MessageParser::default().parse(raw)?;

    Some(Message::new(
        uid,
        parsed.subject().unwrap_or("(no subject)"),
        extract_sender(&parsed),
        extract_text(&parsed),
    ))
}

/// Extract the sender address from a parsed email.
fn extract_sender(parsed: &mail_parser::Message) -> String {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into())
}

/// Extract readable text: the first text/plain part, else the HTML part
/// stripped of tags, else an inline text attachment.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    for part in parsed.attachments() {
        if let Some(ct) = MimeHeaders::content_type(part)
            && ct.ctype() == "text"
            && let Ok(text) = std::str::from_utf8(part.contents())
        {
            return text.to_string();
        }
    }
    String::new()
}

/// Strip HTML tags from content (basic). Lines and their indentation are
/// kept so code pasted into HTML mail survives extraction.
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
