//! Inbound body classification.
//!
//! The raw bytes are what gets forwarded; the parsed view only feeds debug
//! logging. A body whose content type claims JSON but does not parse is kept
//! as opaque bytes and still forwarded untouched.

use axum::body::Bytes;
use axum::http::{header, HeaderMap};
use serde_json::{Map, Value};

/// How the body was understood.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
    Opaque,
}

/// A fully buffered inbound body.
#[derive(Debug, Clone)]
pub struct InboundBody {
    raw: Bytes,
    parsed: ParsedBody,
}

impl InboundBody {
    pub fn parse(headers: &HeaderMap, raw: Bytes) -> Self {
        let parsed = if raw.is_empty() {
            ParsedBody::Empty
        } else {
            match media_type(headers).as_deref() {
                Some(ty) if is_json(ty) => serde_json::from_slice(&raw)
                    .map(ParsedBody::Json)
                    .unwrap_or(ParsedBody::Opaque),
                Some("application/x-www-form-urlencoded") => ParsedBody::Form(
                    url::form_urlencoded::parse(&raw)
                        .map(|(k, v)| (k.into_owned(), v.into_owned()))
                        .collect(),
                ),
                _ => ParsedBody::Opaque,
            }
        };
        Self { raw, parsed }
    }

    pub fn parsed(&self) -> &ParsedBody {
        &self.parsed
    }

    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn into_bytes(self) -> Bytes {
        self.raw
    }

    /// Text for the debug log, or `None` when there is nothing worth showing.
    pub fn debug_view(&self) -> Option<String> {
        match &self.parsed {
            ParsedBody::Empty => None,
            ParsedBody::Json(Value::Object(map)) if map.is_empty() => None,
            ParsedBody::Json(value) => Some(value.to_string()),
            ParsedBody::Form(pairs) if pairs.is_empty() => None,
            ParsedBody::Form(pairs) => {
                let map: Map<String, Value> = pairs
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                Some(Value::Object(map).to_string())
            }
            ParsedBody::Opaque => Some(format!("<{} bytes>", self.raw.len())),
        }
    }
}

/// Lower-cased media type without parameters.
fn media_type(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let essence = value.split(';').next()?.trim();
    Some(essence.to_ascii_lowercase())
}

fn is_json(media_type: &str) -> bool {
    media_type == "application/json" || media_type.ends_with("+json")
}
