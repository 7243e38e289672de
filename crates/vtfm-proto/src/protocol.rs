use serde::{Deserialize, Serialize};

use crate::catalog::{Quality, QualityId, Selection, Station, StationId};

/// Current protocol version.  Bump this when the wire format changes in a
/// breaking way.  Clients check it on connect.
pub const PROTOCOL_VERSION: u32 = 1;

/// Frames larger than this are treated as corrupt.
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// Messages sent from a client to the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    TogglePlayback,
    ChangeStation { station: StationId },
    ChangeQuality { quality: QualityId },
    Stop,
    /// Hide the onboarding prompt.  `remember` keeps it hidden on later runs.
    DismissOnboarding { remember: bool },
    GetState,
}

/// Messages sent from the daemon to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "broadcast")]
pub enum Broadcast {
    /// Sent immediately on connect: protocol version + full snapshot.
    Hello {
        protocol_version: u32,
        state: PlayerState,
    },
    State {
        data: PlayerState,
    },
    Title {
        title: String,
    },
    /// Transient, non-blocking notice (e.g. an engine command failed).
    Notice {
        message: String,
    },
    Log {
        message: String,
    },
}

/// Playback status as reported by the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle, // nothing loaded
    Connecting, // track addressed, stream not open yet
    Buffering,  // waiting for data
    Playing,
    Paused,
    Stopped,
}

impl PlaybackState {
    /// Playing or about to be: a toggle in this state pauses.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PlaybackState::Playing | PlaybackState::Buffering | PlaybackState::Connecting
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Connecting => "connecting",
            PlaybackState::Buffering => "buffering",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Stopped => "stopped",
        }
    }
}

/// Whether the engine currently holds the playlist.
///
/// Transitions:
///   Empty -> Loading -> Loaded -> Empty (stop / failed re-address)
///   Loading -> Empty (failed cold start)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Empty,
    Loading,
    Loaded,
}

/// Controls the engine exposes to remote surfaces (media keys, notifications).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Capability {
    Play,
    Pause,
    Stop,
}

/// Read-only snapshot of the coordinator.  `rev` increases on every change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerState {
    pub rev: u64,
    pub stations: Vec<Station>,
    pub qualities: Vec<Quality>,
    pub selection: Selection,
    pub title: String,
    pub load_state: LoadState,
    pub playback: PlaybackState,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    pub onboarding_pending: bool,
    #[serde(default)]
    pub onboarding_link: String,
    /// Most recent non-fatal failure, cleared by the next successful command.
    #[serde(default)]
    pub notice: Option<String>,
}

impl PlayerState {
    pub fn current_station(&self) -> Option<&Station> {
        self.stations.iter().find(|s| s.id == self.selection.station)
    }

    pub fn current_quality(&self) -> Option<&Quality> {
        self.qualities.iter().find(|q| q.id == self.selection.quality)
    }
}

/// Wrapper for socket communication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Command(Command),
    Broadcast(Broadcast),
}

impl Message {
    /// Length-prefixed frame: u32 big-endian body length, then JSON.
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let len = json.len() as u32;
        let mut result = Vec::with_capacity(4 + json.len());
        result.extend_from_slice(&len.to_be_bytes());
        result.extend_from_slice(&json);
        Ok(result)
    }

    /// Decode one frame from the front of `data`.  `Ok(None)` means more bytes
    /// are needed; an error means the stream is corrupt.
    pub fn decode(data: &[u8]) -> anyhow::Result<Option<(Self, usize)>> {
        if data.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if len > MAX_FRAME_LEN {
            anyhow::bail!("frame of {} bytes exceeds limit", len);
        }
        if data.len() < 4 + len {
            return Ok(None);
        }
        let msg: Self = serde_json::from_slice(&data[4..4 + len])?;
        Ok(Some((msg, 4 + len)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    fn sample_state() -> PlayerState {
        let catalog = Catalog::builtin();
        PlayerState {
            rev: 42,
            stations: catalog.stations().to_vec(),
            qualities: catalog.qualities().to_vec(),
            selection: catalog.default_selection(),
            title: "X".into(),
            load_state: LoadState::Loaded,
            playback: PlaybackState::Playing,
            capabilities: vec![Capability::Play, Capability::Pause, Capability::Stop],
            onboarding_pending: false,
            onboarding_link: String::new(),
            notice: None,
        }
    }

    #[test]
    fn test_command_wire_format() {
        let msg = Message::Command(Command::ChangeStation {
            station: StationId::new(222),
        });
        let encoded = msg.encode().unwrap();
        let body = std::str::from_utf8(&encoded[4..]).unwrap();
        assert_eq!(body, r#"{"cmd":"ChangeStation","station":"222"}"#);

        let (decoded, len) = Message::decode(&encoded).unwrap().unwrap();
        assert_eq!(len, encoded.len());
        match decoded {
            Message::Command(cmd) => assert_eq!(
                cmd,
                Command::ChangeStation {
                    station: StationId::new(222)
                }
            ),
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_hello_decodes_as_broadcast() {
        let msg = Message::Broadcast(Broadcast::Hello {
            protocol_version: PROTOCOL_VERSION,
            state: sample_state(),
        });
        let encoded = msg.encode().unwrap();
        let (decoded, _) = Message::decode(&encoded).unwrap().unwrap();
        match decoded {
            Message::Broadcast(Broadcast::Hello {
                protocol_version,
                state,
            }) => {
                assert_eq!(protocol_version, PROTOCOL_VERSION);
                assert_eq!(state.rev, 42);
                assert_eq!(state.current_station().unwrap().slug, "vocaltrance");
                assert_eq!(state.current_quality().unwrap().bitrate, 256);
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_partial_frame_needs_more_bytes() {
        let encoded = Message::Command(Command::Stop).encode().unwrap();
        assert!(Message::decode(&encoded[..2]).unwrap().is_none());
        assert!(Message::decode(&encoded[..encoded.len() - 1])
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_two_frames_back_to_back() {
        let mut buf = Message::Command(Command::TogglePlayback).encode().unwrap();
        buf.extend(Message::Command(Command::Stop).encode().unwrap());

        let (first, used) = Message::decode(&buf).unwrap().unwrap();
        assert!(matches!(first, Message::Command(Command::TogglePlayback)));
        let (second, _) = Message::decode(&buf[used..]).unwrap().unwrap();
        assert!(matches!(second, Message::Command(Command::Stop)));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buf = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes().to_vec();
        buf.extend_from_slice(b"{}");
        assert!(Message::decode(&buf).is_err());
    }

    #[test]
    fn test_playback_state_activity() {
        assert!(PlaybackState::Buffering.is_active());
        assert!(PlaybackState::Connecting.is_active());
        assert!(!PlaybackState::Paused.is_active());
        assert!(!PlaybackState::Stopped.is_active());
    }
}
