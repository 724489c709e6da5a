use crate::clock::VideoState;
use crate::document::DocumentSnapshot;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ConnectionId = u32;
pub type RoomId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientCommand {
    GetEpisodes,
    #[serde(rename_all = "camelCase")]
    CreateOrJoinRoom {
        #[serde(default)]
        room_id: Option<RoomId>,
    },
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: RoomId },
    LeaveRoom,
    SetEpisode { name: Option<String> },
    FetchSubtitles,
    NewSubtitles { document: DocumentSnapshot },
    FetchVideoState,
    #[serde(rename_all = "camelCase")]
    TogglePause {
        playing: bool,
        media_timestamp_ms: f64,
        vocals_active: bool,
    },
    /// Re-attach a fresh socket to a connection dropped less than a grace window ago.
    #[serde(rename_all = "camelCase")]
    Resume { connection_id: ConnectionId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    Connected { connection_id: ConnectionId },
    Episodes { episodes: Vec<String> },
    #[serde(rename_all = "camelCase")]
    JoinedRoom { room_id: RoomId },
    LeftRoom,
    #[serde(rename_all = "camelCase")]
    UnavailableRoom { room_id: RoomId },
    SetEpisode { name: Option<String> },
    Subtitles { document: Option<DocumentSnapshot> },
    VideoState(VideoState),
    Failure { reason: FailureReason },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureReason {
    NotInRoom,
    Storage(String),
    MalformedMessage(String),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid json frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid bincode frame: {0}")]
    Bincode(#[from] bincode::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Json,
    Bincode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    pub fn encoding(&self) -> Encoding {
        match self {
            Frame::Text(_) => Encoding::Json,
            Frame::Binary(_) => Encoding::Bincode,
        }
    }

    pub fn encode<T: Serialize>(value: &T, encoding: Encoding) -> Result<Frame, ProtocolError> {
        Ok(match encoding {
            Encoding::Json => Frame::Text(serde_json::to_string(value)?),
            Encoding::Bincode => Frame::Binary(bincode::serialize(value)?),
        })
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        Ok(match self {
            Frame::Text(text) => serde_json::from_str(text)?,
            Frame::Binary(bytes) => bincode::deserialize(bytes)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::CaptionRecord;

    #[test]
    fn it_reads_camel_case_json() {
        let frame = Frame::Text(
            r#"{"togglePause":{"playing":true,"mediaTimestampMs":1500.5,"vocalsActive":false}}"#
                .into(),
        );
        assert_eq!(
            frame.decode::<ClientCommand>().expect("valid"),
            ClientCommand::TogglePause {
                playing: true,
                media_timestamp_ms: 1500.5,
                vocals_active: false,
            }
        );
        let frame = Frame::Text(r#""fetchVideoState""#.into());
        assert_eq!(
            frame.decode::<ClientCommand>().expect("valid"),
            ClientCommand::FetchVideoState
        );
        let frame = Frame::Text(r#"{"createOrJoinRoom":{}}"#.into());
        assert_eq!(
            frame.decode::<ClientCommand>().expect("valid"),
            ClientCommand::CreateOrJoinRoom { room_id: None }
        );
    }

    #[test]
    fn it_writes_video_state_as_json() {
        let event = ServerEvent::VideoState(VideoState {
            playing: false,
            media_timestamp_ms: 42.0,
            vocals_active: true,
            account_for_latency: false,
        });
        let frame = Frame::encode(&event, Encoding::Json).expect("encodable");
        assert_eq!(
            frame,
            Frame::Text(
                r#"{"videoState":{"playing":false,"mediaTimestampMs":42.0,"vocalsActive":true,"accountForLatency":false}}"#
                    .into()
            )
        );
    }

    #[test]
    fn it_carries_documents_over_bincode() {
        let command = ClientCommand::NewSubtitles {
            document: DocumentSnapshot {
                characters: vec![],
                captions: vec![CaptionRecord {
                    character: None,
                    start: 0.0,
                    end: 1.0,
                    text: "hi".into(),
                }],
            },
        };
        let frame = Frame::encode(&command, Encoding::Bincode).expect("encodable");
        assert_eq!(frame.encoding(), Encoding::Bincode);
        assert_eq!(frame.decode::<ClientCommand>().expect("decodable"), command);
    }

    #[test]
    fn it_rejects_garbage() {
        assert!(matches!(
            Frame::Text("{".into()).decode::<ClientCommand>(),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            Frame::Binary(vec![255, 255, 255, 255]).decode::<ClientCommand>(),
            Err(ProtocolError::Bincode(_))
        ));
    }
}
