//! Control-channel wire format.
//!
//! Every message on the control channel is a UTF-8 JSON object carrying a
//! `type` tag. Inbound tags that this crate does not know decode to
//! [`ServerEvent::Unknown`] so that newer endpoints never break dispatch.

use crate::error::MessageParseError;
use serde::{Deserialize, Serialize};

/// Messages received from the remote endpoint.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// A fragment of the assistant's streamed text response.
    #[serde(rename = "text.delta")]
    TextDelta {
        #[serde(default)]
        delta: Option<TextDelta>,
    },
    /// The assistant's response is complete.
    #[serde(rename = "text.end")]
    TextEnd,
    /// The assistant started emitting audio.
    #[serde(rename = "speech.start")]
    SpeechStart,
    /// The assistant stopped emitting audio.
    #[serde(rename = "speech.end")]
    SpeechEnd,
    /// An in-progress transcription of the user's speech.
    #[serde(rename = "transcript.partial")]
    TranscriptPartial {
        #[serde(default)]
        transcript: Option<String>,
    },
    /// The settled transcription of the user's speech.
    #[serde(rename = "transcript.final")]
    TranscriptFinal {
        #[serde(default)]
        transcript: Option<String>,
    },
    /// The endpoint reported an error.
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: Option<ErrorDetail>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct TextDelta {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
}

impl ServerEvent {
    /// Decodes a raw control-channel message.
    pub fn parse(raw: &str) -> Result<Self, MessageParseError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// The wire tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::TextDelta { .. } => "text.delta",
            ServerEvent::TextEnd => "text.end",
            ServerEvent::SpeechStart => "speech.start",
            ServerEvent::SpeechEnd => "speech.end",
            ServerEvent::TranscriptPartial { .. } => "transcript.partial",
            ServerEvent::TranscriptFinal { .. } => "transcript.final",
            ServerEvent::Error { .. } => "error",
            ServerEvent::Unknown => "unknown",
        }
    }
}

/// Output modalities requested for a response.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Audio,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResponseOptions {
    pub modalities: Vec<Modality>,
    pub instructions: String,
}

/// Messages sent to the remote endpoint.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Asks the endpoint to produce a response.
    #[serde(rename = "response.create")]
    ResponseCreate { response: ResponseOptions },
}

impl ClientEvent {
    /// A text-and-audio response driven by `instructions`.
    pub fn respond_to(instructions: impl Into<String>) -> Self {
        ClientEvent::ResponseCreate {
            response: ResponseOptions {
                modalities: vec![Modality::Text, Modality::Audio],
                instructions: instructions.into(),
            },
        }
    }
}
