//! Text frame encoding for the event transport.
//!
//! ```text
//! client → server   {"event": "name", "args": [..], "ack": 7}
//!                   42["name", ..]        legacy, no reply
//!                   427["name", ..]       legacy, reply requested with id 7
//! server → client   {"ack": 7, "data": ..}
//!                   437[..]               legacy reply
//!                   {"event": "name", "args": [..]}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dispatch::Outbound;

/// Errors raised while decoding an inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame carries no event name")]
    MissingEventName,
    #[error("legacy packets are disabled")]
    LegacyDisabled,
    #[error("unsupported packet type {0:?}")]
    Unsupported(String),
}

/// A decoded client event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFrame {
    pub name: String,
    pub args: Vec<Value>,
    /// Present when the client asked for a reply.
    pub ack: Option<u64>,
    /// Whether the frame used the legacy packet dialect.
    pub legacy: bool,
}

#[derive(Deserialize)]
struct ObjectFrame {
    event: String,
    #[serde(default)]
    args: Vec<Value>,
    #[serde(default)]
    ack: Option<u64>,
}

#[derive(Serialize)]
struct AckFrame<'a> {
    ack: u64,
    data: &'a Value,
}

#[derive(Serialize)]
struct PushFrame<'a> {
    event: &'a str,
    args: &'a [Value],
}

const LEGACY_EVENT: &str = "42";
const LEGACY_ACK: &str = "43";

/// Decode one text frame.
pub fn parse_frame(text: &str, legacy_enabled: bool) -> Result<EventFrame, FrameError> {
    let text = text.trim();
    if text.starts_with('{') {
        let frame: ObjectFrame = serde_json::from_str(text)?;
        if frame.event.is_empty() {
            return Err(FrameError::MissingEventName);
        }
        return Ok(EventFrame {
            name: frame.event,
            args: frame.args,
            ack: frame.ack,
            legacy: false,
        });
    }

    if !legacy_enabled {
        return Err(FrameError::LegacyDisabled);
    }
    let Some(rest) = text.strip_prefix(LEGACY_EVENT) else {
        return Err(FrameError::Unsupported(text.chars().take(8).collect()));
    };

    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    let ack = if digits > 0 {
        Some(
            rest[..digits]
                .parse::<u64>()
                .map_err(|_| FrameError::Unsupported(rest[..digits].to_string()))?,
        )
    } else {
        None
    };

    let mut items: Vec<Value> = serde_json::from_str(&rest[digits..])?;
    if items.is_empty() {
        return Err(FrameError::MissingEventName);
    }
    let name = match items.remove(0) {
        Value::String(name) if !name.is_empty() => name,
        _ => return Err(FrameError::MissingEventName),
    };

    Ok(EventFrame {
        name,
        args: items,
        ack,
        legacy: true,
    })
}

/// Encode one outbound message as text.
pub fn encode_outbound(message: &Outbound) -> String {
    match message {
        Outbound::Event { name, args } => {
            json_text(&PushFrame { event: name, args })
        }
        Outbound::Ack {
            id,
            legacy: false,
            data,
        } => json_text(&AckFrame { ack: *id, data }),
        Outbound::Ack {
            id,
            legacy: true,
            data,
        } => format!("{LEGACY_ACK}{id}{}", json_text(&[data])),
    }
}

fn json_text<T: Serialize + ?Sized>(value: &T) -> String {
    // Serialising plain JSON values into a String cannot fail.
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}
