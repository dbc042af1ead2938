//! chat-wire: the relay's JSON frame schema and its line framing.
//!
//! All frames are tagged by a top-level `kind` field for discriminated
//! deserialization. TCP and UDP frame one JSON object per line (`\n`
//! terminated); WebSocket carries one JSON object per text frame.

use serde::{Deserialize, Serialize};

/// One parsed wire frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
#[serde(rename_all = "snake_case")]
pub enum Frame {
    Register(Register),
    Exit(Exit),
    Broadcast(Broadcast),
    Whisper(Whisper),
    Error(ErrorFrame),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Register {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Exit {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Broadcast {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Whisper {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub dst: String,
}

/// Server-to-client error frame.
///
/// Always serializes as `{"kind":"error","text":...}`. Two historical
/// shapes exist on the wire (`text` and `message`); decode accepts both,
/// preferring `text` when both are present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct ErrorFrame {
    pub text: String,
}

impl<'de> Deserialize<'de> for ErrorFrame {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            #[serde(default)]
            text: Option<String>,
            #[serde(default)]
            message: Option<String>,
        }
        let raw = Raw::deserialize(deserializer)?;
        Ok(ErrorFrame {
            text: raw.text.or(raw.message).unwrap_or_default(),
        })
    }
}

impl Frame {
    pub fn error(text: impl Into<String>) -> Self {
        Frame::Error(ErrorFrame { text: text.into() })
    }

    pub fn broadcast(name: impl Into<String>, text: impl Into<String>, time: impl Into<String>) -> Self {
        Frame::Broadcast(Broadcast {
            name: name.into(),
            text: text.into(),
            time: time.into(),
        })
    }

    pub fn whisper(
        name: impl Into<String>,
        dst: impl Into<String>,
        text: impl Into<String>,
        time: impl Into<String>,
    ) -> Self {
        Frame::Whisper(Whisper {
            name: name.into(),
            dst: dst.into(),
            text: text.into(),
            time: time.into(),
        })
    }

    /// The author-claimed name carried by this frame, if any.
    pub fn claimed_name(&self) -> Option<&str> {
        match self {
            Frame::Register(r) => Some(&r.name),
            Frame::Exit(e) => Some(&e.name),
            Frame::Broadcast(b) => Some(&b.name),
            Frame::Whisper(w) => Some(&w.name),
            Frame::Error(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidJson;

impl std::fmt::Display for InvalidJson {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid json format")
    }
}

impl std::error::Error for InvalidJson {}

/// Decode a single frame from one line of text (TCP/UDP) or one
/// WebSocket text frame payload. Leading/trailing whitespace and a
/// trailing `\r`/`\n` are tolerated.
pub fn decode(line: &str) -> Result<Frame, InvalidJson> {
    serde_json::from_str(line.trim()).map_err(|_| InvalidJson)
}

/// Compact JSON for this frame, with no trailing newline — used for a
/// single WebSocket text frame.
pub fn encode(frame: &Frame) -> String {
    serde_json::to_string(frame).expect("Frame serialization is infallible")
}

/// Compact JSON for this frame followed by `\n` — used for TCP/UDP framing.
pub fn encode_line(frame: &Frame) -> String {
    let mut s = encode(frame);
    s.push('\n');
    s
}
