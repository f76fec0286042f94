// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Legacy OCS XML dialect.
//!
//! Pre-JSON inventory servers speak
//! `<REQUEST><DEVICEID>…</DEVICEID><QUERY>…</QUERY></REQUEST>` with a
//! PROLOG handshake advertising the polling frequency in hours.

use quick_xml::events::Event;
use quick_xml::Reader;

/// Build a PROLOG handshake request.
pub fn prolog_request(deviceid: &str) -> Vec<u8> {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<REQUEST>\n");
    xml.push_str(&format!("  <DEVICEID>{}</DEVICEID>\n", escape_xml(deviceid)));
    xml.push_str("  <QUERY>PROLOG</QUERY>\n</REQUEST>\n");
    xml.into_bytes()
}

/// Parsed fields of a legacy server reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyAnswer {
    /// `SEND` asks for a full inventory, `STOP` for none.
    pub response: Option<String>,
    /// Polling frequency, hours.
    pub prolog_freq: Option<u64>,
}

impl LegacyAnswer {
    /// Extract the useful fields from a `<REPLY>` document. Unknown
    /// elements are ignored.
    pub fn parse(xml: &[u8]) -> Option<Self> {
        let mut reader = Reader::from_reader(xml);
        let mut answer = LegacyAnswer::default();
        let mut inside: Option<String> = None;
        let mut saw_reply = false;
        let mut buffer = Vec::new();
        loop {
            match reader.read_event_into(&mut buffer) {
                Ok(Event::Start(start)) => {
                    let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
                    if name == "REPLY" {
                        saw_reply = true;
                    } else {
                        inside = Some(name);
                    }
                }
                Ok(Event::Text(text)) => {
                    let value = text.unescape().ok()?.trim().to_string();
                    match inside.as_deref() {
                        Some("RESPONSE") => answer.response = Some(value),
                        Some("PROLOG_FREQ") => answer.prolog_freq = value.parse().ok(),
                        _ => {}
                    }
                }
                Ok(Event::End(_)) => inside = None,
                Ok(Event::Eof) => break,
                Err(_) => return None,
                _ => {}
            }
            buffer.clear();
        }
        saw_reply.then_some(answer)
    }

    /// True when the server asks for an inventory.
    pub fn inventory_requested(&self) -> bool {
        self.response.as_deref() == Some("SEND")
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
#[path = "legacy_tests.rs"]
mod tests;
