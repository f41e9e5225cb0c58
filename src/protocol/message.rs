//! # Envelopes
//!
//! An [`Envelope`] is the routed unit of the pipeline. On the wire it is a mapping with
//! three reserved keys:
//!
//! | key | kind    | meaning          |
//! |-----|---------|------------------|
//! | `c` | Byte    | routing target   |
//! | `a` | Short   | action id        |
//! | `p` | Mapping | payload          |
//!
//! The channel hint and UDP sequence number are transport metadata and never encoded into
//! the container itself.

use std::fmt;

use crate::core::container::{Container, ValueMap};
use crate::core::serialization::{decode_exact, encode};
use crate::core::value::Value;
use crate::error::{CodecError, CodecReason, ValueError};

/// Action identifier within a routing target
pub type ActionId = u16;

const KEY_TARGET: &str = "c";
const KEY_ACTION: &str = "a";
const KEY_PAYLOAD: &str = "p";

/// Action ids understood by the built-in controllers
pub mod actions {
    use super::ActionId;

    // System
    pub const HANDSHAKE: ActionId = 0;
    pub const LOGIN: ActionId = 1;
    pub const LOGOUT: ActionId = 2;
    pub const JOIN_ROOM: ActionId = 4;
    pub const PUBLIC_MESSAGE: ActionId = 7;
    pub const MANUAL_DISCONNECTION: ActionId = 26;
    pub const PING_PONG: ActionId = 29;
    pub const USER_ENTER_ROOM: ActionId = 1000;
    pub const USER_EXIT_ROOM: ActionId = 1004;
    pub const CLIENT_DISCONNECTION: ActionId = 1005;

    // Extension
    pub const CALL_EXTENSION: ActionId = 12;
    pub const UDP_INIT: ActionId = 13;
}

/// Routing namespace of an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    System,
    Extension,
    /// A target byte no built-in namespace claims; kept so dispatch can report it
    Other(u8),
}

impl Target {
    pub fn id(self) -> u8 {
        match self {
            Target::System => 0,
            Target::Extension => 1,
            Target::Other(id) => id,
        }
    }

    pub fn from_id(id: u8) -> Self {
        match id {
            0 => Target::System,
            1 => Target::Extension,
            other => Target::Other(other),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::System => f.write_str("system"),
            Target::Extension => f.write_str("extension"),
            Target::Other(id) => write!(f, "target#{id}"),
        }
    }
}

/// Which channel an envelope may travel on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelHint {
    #[default]
    Tcp,
    UdpEligible,
}

/// A routed message: header fields plus a mapping payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub target: Target,
    pub action: ActionId,
    pub payload: ValueMap,
    pub channel: ChannelHint,
    /// Set only on envelopes received over UDP
    pub sequence: Option<u32>,
}

impl Envelope {
    pub fn new(target: Target, action: ActionId, payload: ValueMap) -> Self {
        Self {
            target,
            action,
            payload,
            channel: ChannelHint::Tcp,
            sequence: None,
        }
    }

    pub fn system(action: ActionId, payload: ValueMap) -> Self {
        Self::new(Target::System, action, payload)
    }

    pub fn extension(action: ActionId, payload: ValueMap) -> Self {
        Self::new(Target::Extension, action, payload)
    }

    /// Mark the envelope as allowed to travel over UDP
    pub fn udp_eligible(mut self) -> Self {
        self.channel = ChannelHint::UdpEligible;
        self
    }

    /// Build the wire container.
    ///
    /// # Errors
    /// Returns `ValueError::DepthExceeded` when wrapping the payload would nest too deep
    pub fn to_container(&self) -> Result<Container, ValueError> {
        let mut map = ValueMap::new();
        map.insert(KEY_TARGET, self.target.id())?;
        // Action ids above i16::MAX keep their bit pattern on the wire
        map.insert(KEY_ACTION, self.action as i16)?;
        map.insert(KEY_PAYLOAD, self.payload.clone())?;
        Ok(Container::Map(map))
    }

    /// Rebuild an envelope from a decoded container.
    ///
    /// # Errors
    /// Returns `CodecReason::InvalidEnvelope` if the container lacks the reserved keys or
    /// carries them with the wrong kind
    pub fn from_container(container: Container) -> Result<Self, CodecError> {
        let invalid = || CodecError::new(0, CodecReason::InvalidEnvelope);

        let mut map = container.into_map().ok_or_else(invalid)?;
        let target = map.get_byte(KEY_TARGET).ok_or_else(invalid)?;
        let action = match map.get(KEY_ACTION) {
            Some(Value::Short(a)) => *a as u16,
            _ => return Err(invalid()),
        };
        let payload = match map.remove(KEY_PAYLOAD) {
            Some(Value::Map(p)) => p,
            _ => return Err(invalid()),
        };

        Ok(Self::new(Target::from_id(target), action, payload))
    }

    /// Encode to codec bytes (no frame header)
    pub fn to_bytes(&self) -> Result<Vec<u8>, ValueError> {
        Ok(encode(&self.to_container()?))
    }

    /// Decode codec bytes that must contain exactly one envelope container
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        Self::from_container(decode_exact(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::container::ValueList;

    #[test]
    fn envelope_roundtrip() {
        let payload = ValueMap::new().with("zn", "arena").unwrap().with("un", "p1").unwrap();
        let envelope = Envelope::system(actions::LOGIN, payload);
        let bytes = envelope.to_bytes().unwrap();
        assert_eq!(Envelope::from_bytes(&bytes).unwrap(), envelope);
    }

    #[test]
    fn high_action_ids_survive_short_encoding() {
        let envelope = Envelope::extension(40_000, ValueMap::new());
        let decoded = Envelope::from_bytes(&envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.action, 40_000);
    }

    #[test]
    fn unknown_target_is_preserved() {
        assert_eq!(Target::from_id(7), Target::Other(7));
        let envelope = Envelope::new(Target::Other(7), 3, ValueMap::new());
        let decoded = Envelope::from_bytes(&envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.target, Target::Other(7));
    }

    #[test]
    fn list_container_is_not_an_envelope() {
        let list = ValueList::new().with(1i32).unwrap();
        let err = Envelope::from_container(Container::List(list)).unwrap_err();
        assert_eq!(err.reason, CodecReason::InvalidEnvelope);
    }

    #[test]
    fn wrong_kind_for_reserved_key_is_rejected() {
        let map = ValueMap::new()
            .with("c", 0u8)
            .unwrap()
            .with("a", 1i32)
            .unwrap()
            .with("p", ValueMap::new())
            .unwrap();
        let err = Envelope::from_container(Container::Map(map)).unwrap_err();
        assert_eq!(err.reason, CodecReason::InvalidEnvelope);

        let missing_payload = ValueMap::new()
            .with("c", 0u8)
            .unwrap()
            .with("a", Value::Short(1))
            .unwrap();
        assert!(Envelope::from_container(Container::Map(missing_payload)).is_err());
    }

    #[test]
    fn metadata_is_not_encoded() {
        let mut envelope = Envelope::extension(actions::CALL_EXTENSION, ValueMap::new()).udp_eligible();
        envelope.sequence = Some(9);
        let decoded = Envelope::from_bytes(&envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.channel, ChannelHint::Tcp);
        assert_eq!(decoded.sequence, None);
    }
}
