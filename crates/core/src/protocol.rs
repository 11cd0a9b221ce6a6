//! The wire protocol (spec §6): JSON text frames, tagged by `type`, over a
//! bidirectional ordered transport. Unknown `type` values fail to parse and
//! the caller must surface `protocol_error` (spec §9).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::audio::{AudioEncoding, Channels};
use crate::chunk::AudioChunk;

/// Messages a client sends to the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Start {
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        audio_format: AudioEncoding,
        sample_rate: u32,
        channels: Channels,
    },
    TextDelta {
        session_id: String,
        seq: u64,
        text: String,
    },
    TextEnd {
        session_id: String,
        seq: u64,
    },
    Cancel {
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    Resume {
        session_id: String,
        last_unit_index_received: u64,
    },
}

/// The `error.kind` values a client may observe (spec §7). Exhaustive: any
/// new failure mode is a deliberate protocol change, not a silent addition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ProtocolError,
    AuthFailed,
    CapacityExhausted,
    UnsupportedSampleRate,
    ResumeNotAvailable,
    Backpressure,
    EngineError,
    InternalError,
}

/// The `kind`/`message` pair carried by a server `error` message, kept as
/// its own type so upstream crates (`ws-tts-session`, `ws-tts-server`) can
/// build it without constructing the whole tagged enum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
}

/// Messages the gateway sends to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    StartAck {
        session_id: String,
        audio_format: AudioEncoding,
        sample_rate: u32,
        channels: Channels,
        seq: u64,
    },
    AudioChunk {
        seq: u64,
        chunk_seq: u64,
        unit_index_start: u64,
        unit_index_end: u64,
        audio_base64: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        wav_header_base64: Option<String>,
    },
    TtsEnd {
        seq: u64,
        cancelled: bool,
    },
    Error {
        seq: u64,
        kind: ErrorKind,
        message: String,
    },
}

impl ServerMessage {
    pub fn start_ack(
        session_id: impl Into<String>,
        audio_format: AudioEncoding,
        sample_rate: u32,
        channels: Channels,
    ) -> Self {
        ServerMessage::StartAck {
            session_id: session_id.into(),
            audio_format,
            sample_rate,
            channels,
            seq: 0,
        }
    }

    /// Builds an `audio_chunk` message from a session's `AudioChunk`,
    /// base64-encoding the PCM payload (and the WAV header, if present).
    pub fn audio_chunk(seq: u64, chunk: &AudioChunk) -> Self {
        ServerMessage::AudioChunk {
            seq,
            chunk_seq: chunk.chunk_seq,
            unit_index_start: chunk.unit_index_start,
            unit_index_end: chunk.unit_index_end,
            audio_base64: BASE64.encode(&chunk.audio_bytes),
            wav_header_base64: chunk.wav_header.map(|h| BASE64.encode(h)),
        }
    }

    pub fn tts_end(seq: u64, cancelled: bool) -> Self {
        ServerMessage::TtsEnd { seq, cancelled }
    }

    pub fn error(seq: u64, payload: ErrorPayload) -> Self {
        ServerMessage::Error {
            seq,
            kind: payload.kind,
            message: payload.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_message_round_trips() {
        let json = r#"{"type":"start","audio_format":"pcm16_raw","sample_rate":16000,"channels":1}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Start {
                session_id,
                sample_rate,
                ..
            } => {
                assert!(session_id.is_none());
                assert_eq!(sample_rate, 16000);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_type_fails_to_parse() {
        let json = r#"{"type":"not_a_real_message"}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::UnsupportedSampleRate).unwrap();
        assert_eq!(json, "\"unsupported_sample_rate\"");
    }
}
