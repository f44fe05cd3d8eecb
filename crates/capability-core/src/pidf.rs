//! PIDF presence document parsing
//!
//! Parses the `application/pidf+xml` bodies delivered by presence NOTIFY
//! requests into the entity URI and its service tuples. Namespace prefixes
//! vary between networks, so elements are matched on their local name.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::errors::{CapabilityError, Result};

/// Tuple basic status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasicStatus {
    Open,
    Closed,
}

/// One `<tuple>` element: a service and whether it is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceTuple {
    pub id: String,
    pub service_id: Option<String>,
    pub status: BasicStatus,
}

/// A parsed presence document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceDocument {
    pub entity: String,
    pub tuples: Vec<PresenceTuple>,
}

fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&b| b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Parse a PIDF XML document.
pub fn parse(xml: &str) -> Result<PresenceDocument> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entity = String::new();
    let mut tuples = Vec::new();
    let mut current: Option<PresenceTuple> = None;
    let mut in_basic = false;
    let mut in_service_id = false;

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match local_name(e.name().as_ref()) {
                b"presence" => {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"entity" {
                            entity = String::from_utf8_lossy(&attr.value).to_string();
                        }
                    }
                }
                b"tuple" => {
                    let mut id = String::new();
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"id" {
                            id = String::from_utf8_lossy(&attr.value).to_string();
                        }
                    }
                    current = Some(PresenceTuple {
                        id,
                        service_id: None,
                        status: BasicStatus::Closed,
                    });
                }
                b"basic" => in_basic = true,
                b"service-id" => in_service_id = true,
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| CapabilityError::MalformedPayload(err.to_string()))?
                    .to_string();
                if in_basic {
                    if let Some(tuple) = current.as_mut() {
                        tuple.status = if text.eq_ignore_ascii_case("open") {
                            BasicStatus::Open
                        } else {
                            BasicStatus::Closed
                        };
                    }
                    in_basic = false;
                } else if in_service_id {
                    if let Some(tuple) = current.as_mut() {
                        tuple.service_id = Some(text);
                    }
                    in_service_id = false;
                }
            }
            Ok(Event::End(ref e)) => match local_name(e.name().as_ref()) {
                b"tuple" => {
                    if let Some(tuple) = current.take() {
                        tuples.push(tuple);
                    }
                }
                b"basic" => in_basic = false,
                b"service-id" => in_service_id = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(CapabilityError::MalformedPayload(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if entity.is_empty() {
        return Err(CapabilityError::MalformedPayload(
            "presence document without entity".into(),
        ));
    }

    Ok(PresenceDocument { entity, tuples })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<presence xmlns="urn:ietf:params:xml:ns:pidf"
          xmlns:op="urn:oma:xml:prs:pidf:oma-pres"
          entity="sip:+33612345678@ims.example.com">
  <tuple id="t1">
    <status><basic>open</basic></status>
    <op:service-description>
      <op:service-id>org.gsma.videoshare</op:service-id>
      <op:version>1.0</op:version>
    </op:service-description>
  </tuple>
  <tuple id="t2">
    <status><basic>closed</basic></status>
    <op:service-description>
      <op:service-id>org.openmobilealliance:IM-session</op:service-id>
    </op:service-description>
  </tuple>
</presence>"#;

    #[test]
    fn parses_entity_and_tuples() {
        let document = parse(DOCUMENT).unwrap();
        assert_eq!(document.entity, "sip:+33612345678@ims.example.com");
        assert_eq!(document.tuples.len(), 2);

        assert_eq!(document.tuples[0].service_id.as_deref(), Some("org.gsma.videoshare"));
        assert_eq!(document.tuples[0].status, BasicStatus::Open);
        assert_eq!(document.tuples[1].status, BasicStatus::Closed);
    }

    #[test]
    fn rejects_document_without_entity() {
        let result = parse("<presence><tuple id=\"t\"/></presence>");
        assert!(matches!(result, Err(CapabilityError::MalformedPayload(_))));
    }

    #[test]
    fn rejects_malformed_xml() {
        let result = parse("<presence entity=\"sip:x\"><tuple");
        assert!(result.is_err());
    }
}
