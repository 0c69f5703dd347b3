//! Session-key parsing for peer identity recovery.
//!
//! Session keys are opaque colon-delimited routing strings minted by the
//! host (`agent:<id>:...`). The parser recovers the sender id, the channel
//! when the key carries one, and the peer kind; scope keys without a peer
//! segment (such as `agent:<id>:main`) parse to `None`.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `PeerKind` values.
pub enum PeerKind {
    Direct,
    Group,
    Channel,
}

impl PeerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
            Self::Channel => "channel",
        }
    }

    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "direct" => Some(Self::Direct),
            "group" => Some(Self::Group),
            "channel" => Some(Self::Channel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// Public struct `ParsedSessionKey` used across Warden components.
pub struct ParsedSessionKey {
    pub peer_id: String,
    pub channel: Option<String>,
    pub peer_kind: PeerKind,
}

/// Recovers `{peer_id, channel, peer_kind}` from a session key.
///
/// Scans segments from index 2 for the first peer-kind marker; the segment
/// after it is the peer id. A marker at index 3 or later means the segment
/// at index 2 names the channel. Peer ids are opaque and pass through
/// unmodified.
pub fn parse_session_key(session_key: &str) -> Option<ParsedSessionKey> {
    let segments: Vec<&str> = session_key.split(':').collect();
    if segments.len() < 4 {
        return None;
    }

    for (index, segment) in segments.iter().enumerate().skip(2) {
        let Some(peer_kind) = PeerKind::from_segment(segment) else {
            continue;
        };
        let peer_id = segments.get(index + 1).copied().unwrap_or_default();
        if peer_id.is_empty() {
            return None;
        }
        let channel = if index >= 3 {
            Some(segments[2].to_string())
        } else {
            None
        };
        return Some(ParsedSessionKey {
            peer_id: peer_id.to_string(),
            channel,
            peer_kind,
        });
    }

    None
}
