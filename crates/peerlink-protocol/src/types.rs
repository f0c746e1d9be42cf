//! Signaling message types.
//!
//! Two shapes travel over the signaling socket, and they carry no common
//! tag field to tell them apart:
//!
//! ```text
//! { "type": "offer" | "answer" | "pranswer" | "rollback", "sdp": "..." }
//! { "candidate": "...", "sdpMid": "...", "sdpMLineIndex": 0 }
//! ```
//!
//! [`SignalingMessage`] is therefore `#[serde(untagged)]`: serde tries
//! each variant in order and keeps the first one whose required fields
//! are present. A payload that fits neither fails to decode.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// SdpKind
// ---------------------------------------------------------------------------

/// The role of a session description in the offer/answer exchange.
///
/// Serialized lowercase, matching `RTCSdpType` in the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
    /// Provisional answer. A final answer may follow.
    Pranswer,
    Rollback,
}

impl fmt::Display for SdpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Pranswer => "pranswer",
            Self::Rollback => "rollback",
        })
    }
}

// ---------------------------------------------------------------------------
// SessionDescription
// ---------------------------------------------------------------------------

/// An SDP blob and what it is for.
///
/// On the wire the kind lives under `"type"`, so the field is renamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn new(kind: SdpKind, sdp: impl Into<String>) -> Self {
        Self {
            kind,
            sdp: sdp.into(),
        }
    }

    pub fn offer(sdp: impl Into<String>) -> Self {
        Self::new(SdpKind::Offer, sdp)
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self::new(SdpKind::Answer, sdp)
    }
}

// ---------------------------------------------------------------------------
// IceCandidate
// ---------------------------------------------------------------------------

/// One trickled ICE candidate.
///
/// Browsers send `sdpMid: null` for some candidates and add extra fields
/// such as `usernameFragment`; both are tolerated. An empty `candidate`
/// string is the end-of-candidates marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, deserialize_with = "null_as_default")]
    pub sdp_mid: String,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        deserialize_with = "null_as_default"
    )]
    pub sdp_mline_index: u16,
}

impl IceCandidate {
    pub fn new(
        candidate: impl Into<String>,
        sdp_mid: impl Into<String>,
        sdp_mline_index: u16,
    ) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: sdp_mid.into(),
            sdp_mline_index,
        }
    }

    /// Returns `true` for the end-of-candidates marker.
    pub fn is_end_of_candidates(&self) -> bool {
        self.candidate.is_empty()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// SignalingMessage
// ---------------------------------------------------------------------------

/// Everything a peer can say on the signaling channel.
///
/// Variant order matters for decoding: a description is tried first, so a
/// candidate message that also carries `"type":"candidate"` (as the native
/// peer's serializer emits) falls through to [`SignalingMessage::Candidate`]
/// because `"candidate"` is not a valid [`SdpKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalingMessage {
    Description(SessionDescription),
    Candidate(IceCandidate),
}

impl SignalingMessage {
    pub fn is_description(&self) -> bool {
        matches!(self, Self::Description(_))
    }

    pub fn is_candidate(&self) -> bool {
        matches!(self, Self::Candidate(_))
    }

    /// Short label for logs: the SDP kind, or `"candidate"`.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Description(d) => match d.kind {
                SdpKind::Offer => "offer",
                SdpKind::Answer => "answer",
                SdpKind::Pranswer => "pranswer",
                SdpKind::Rollback => "rollback",
            },
            Self::Candidate(_) => "candidate",
        }
    }
}

impl From<SessionDescription> for SignalingMessage {
    fn from(desc: SessionDescription) -> Self {
        Self::Description(desc)
    }
}

impl From<IceCandidate> for SignalingMessage {
    fn from(candidate: IceCandidate) -> Self {
        Self::Candidate(candidate)
    }
}
