//! Raw RFC 5322 message → [`FetchedMessage`].

use chrono::{DateTime, NaiveDate, Utc};
use mail_parser::{MessageParser, MimeHeaders};

use crate::mailstore::types::{Envelope, FetchedMessage};

/// Parse a raw message fetched for `seq`/`uid`.
///
/// Returns `None` when the bytes are not a parseable message.
pub fn parse_message(seq: u32, uid: u32, raw: &[u8]) -> Option<FetchedMessage> {
    let parsed = MessageParser::default().parse(raw)?;

    let envelope = Envelope {
        subject: parsed.subject().unwrap_or_default().to_string(),
        from: extract_addresses(parsed.from()),
        date: parsed.date().and_then(to_utc),
    };
    let body = extract_text(&parsed);

    Some(FetchedMessage::new(seq, uid, envelope, body))
}

/// Extract email addresses from an optional address header.
pub fn extract_addresses(addr: Option<&mail_parser::Address>) -> Vec<String> {
    let Some(addr) = addr else {
        return Vec::new();
    };
    match addr {
        mail_parser::Address::List(addrs) => addrs
            .iter()
            .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            .collect(),
        mail_parser::Address::Group(groups) => groups
            .iter()
            .flat_map(|g| {
                g.addresses
                    .iter()
                    .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            })
            .collect(),
    }
}

/// Strip HTML tags from content (basic).
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
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract readable text from a parsed message.
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

fn to_utc(d: &mail_parser::DateTime) -> Option<DateTime<Utc>> {
    let naive = NaiveDate::from_ymd_opt(i32::from(d.year), u32::from(d.month), u32::from(d.day))?
        .and_hms_opt(u32::from(d.hour), u32::from(d.minute), u32::from(d.second))?;
    let offset_secs = (i64::from(d.tz_hour) * 3600 + i64::from(d.tz_minute) * 60)
        * if d.tz_before_gmt { -1 } else { 1 };
    let utc = naive.and_utc() - chrono::Duration::seconds(offset_secs);
    Some(utc)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "From: Alice <alice@example.com>, bob@example.com\r\n\
Subject: Limited time offer\r\n\
Date: Mon, 19 Oct 2026 10:30:00 +0200\r\n\
Message-ID: <abc@example.com>\r\n\
\r\n\
Buy now!\r\n";

    #[test]
    fn parses_envelope() {
        let msg = parse_message(3, 42, RAW.as_bytes()).unwrap();
        assert_eq!(msg.seq, 3);
        assert_eq!(msg.uid, 42);
        assert_eq!(msg.subject(), "Limited time offer");
        assert_eq!(msg.envelope.from, vec!["alice@example.com", "bob@example.com"]);
        assert!(msg.body.contains("Buy now!"));
    }

    #[test]
    fn date_is_normalised_to_utc() {
        let msg = parse_message(1, 1, RAW.as_bytes()).unwrap();
        let date = msg.envelope.date.unwrap();
        assert_eq!(date.to_rfc3339(), "2026-10-19T08:30:00+00:00");
    }

    #[test]
    fn missing_headers_yield_empty_fields() {
        let msg = parse_message(1, 7, b"X-Other: 1\r\n\r\nbody only\r\n").unwrap();
        assert_eq!(msg.subject(), "");
        assert!(msg.envelope.from.is_empty());
        assert!(msg.envelope.date.is_none());
    }

    #[test]
    fn html_only_body_is_stripped() {
        let raw = "From: a@example.com\r\n\
Subject: html\r\n\
Content-Type: text/html\r\n\
\r\n\
<p>Hello <b>there</b></p>\r\n";
        let msg = parse_message(1, 1, raw.as_bytes()).unwrap();
        assert!(msg.body.contains("Hello"));
        assert!(!msg.body.contains("<p>"));
    }

    #[test]
    fn strip_html_nested_tags() {
        assert_eq!(
            strip_html("<div><b>Bold</b> and <i>italic</i></div>"),
            "Bold and italic"
        );
    }

    #[test]
    fn strip_html_plain_text_passthrough() {
        assert_eq!(strip_html("No HTML here"), "No HTML here");
    }

    #[test]
    fn extract_addresses_none_is_empty() {
        assert!(extract_addresses(None).is_empty());
    }
}
