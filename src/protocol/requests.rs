//! # Request Builders
//!
//! Thin DTOs that turn application intent into outbound [`Envelope`]s. None of them carry
//! protocol state; the connection decides which channel an envelope travels on.

use crate::core::container::ValueMap;
use crate::error::ValueError;
use crate::protocol::message::{actions, Envelope};

/// Client API version announced in the handshake
pub const CLIENT_API_VERSION: &str = "1.8.0";

/// Client type string announced in the handshake
pub const CLIENT_TYPE: &str = "bitswarm-rust";

const KEY_API: &str = "api";
const KEY_CLIENT: &str = "cl";
const KEY_RECONNECTION_TOKEN: &str = "rt";
const KEY_ZONE: &str = "zn";
const KEY_USER_NAME: &str = "un";
const KEY_PASSWORD: &str = "pw";
const KEY_PARAMS: &str = "p";
const KEY_ROOM_ID: &str = "i";
const KEY_ROOM_NAME: &str = "n";
const KEY_PASSWORD_ROOM: &str = "pw";
const KEY_AS_SPECTATOR: &str = "sp";
const KEY_ROOM: &str = "r";
const KEY_MESSAGE: &str = "m";
const KEY_COMMAND: &str = "c";

/// Anything that can be sent to the server.
pub trait Request {
    fn to_envelope(&self) -> Result<Envelope, ValueError>;
}

impl Request for Envelope {
    fn to_envelope(&self) -> Result<Envelope, ValueError> {
        Ok(self.clone())
    }
}

/// First message on a fresh connection
#[derive(Debug, Clone, Default)]
pub struct HandshakeRequest {
    /// Token from a previous session, to resume it
    pub reconnection_token: Option<String>,
}

impl Request for HandshakeRequest {
    fn to_envelope(&self) -> Result<Envelope, ValueError> {
        let mut payload = ValueMap::new()
            .with(KEY_API, CLIENT_API_VERSION)?
            .with(KEY_CLIENT, CLIENT_TYPE)?;
        if let Some(token) = &self.reconnection_token {
            payload.insert(KEY_RECONNECTION_TOKEN, token.as_str())?;
        }
        Ok(Envelope::system(actions::HANDSHAKE, payload))
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoginRequest {
    pub zone: String,
    pub user_name: String,
    pub password: String,
    pub params: Option<ValueMap>,
}

impl LoginRequest {
    pub fn new(zone: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            user_name: user_name.into(),
            ..Self::default()
        }
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn params(mut self, params: ValueMap) -> Self {
        self.params = Some(params);
        self
    }
}

impl Request for LoginRequest {
    fn to_envelope(&self) -> Result<Envelope, ValueError> {
        let mut payload = ValueMap::new()
            .with(KEY_ZONE, self.zone.as_str())?
            .with(KEY_USER_NAME, self.user_name.as_str())?
            .with(KEY_PASSWORD, self.password.as_str())?;
        if let Some(params) = &self.params {
            payload.insert(KEY_PARAMS, params.clone())?;
        }
        Ok(Envelope::system(actions::LOGIN, payload))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogoutRequest;

impl Request for LogoutRequest {
    fn to_envelope(&self) -> Result<Envelope, ValueError> {
        Ok(Envelope::system(actions::LOGOUT, ValueMap::new()))
    }
}

/// Room to join, by id or by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomRef {
    Id(i32),
    Name(String),
}

#[derive(Debug, Clone)]
pub struct JoinRoomRequest {
    pub room: RoomRef,
    pub password: Option<String>,
    pub as_spectator: bool,
}

impl JoinRoomRequest {
    pub fn by_id(id: i32) -> Self {
        Self {
            room: RoomRef::Id(id),
            password: None,
            as_spectator: false,
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            room: RoomRef::Name(name.into()),
            password: None,
            as_spectator: false,
        }
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn spectator(mut self) -> Self {
        self.as_spectator = true;
        self
    }
}

impl Request for JoinRoomRequest {
    fn to_envelope(&self) -> Result<Envelope, ValueError> {
        let mut payload = ValueMap::new();
        match &self.room {
            RoomRef::Id(id) => payload.insert(KEY_ROOM_ID, *id)?,
            RoomRef::Name(name) => payload.insert(KEY_ROOM_NAME, name.as_str())?,
        };
        if let Some(password) = &self.password {
            payload.insert(KEY_PASSWORD_ROOM, password.as_str())?;
        }
        payload.insert(KEY_AS_SPECTATOR, self.as_spectator)?;
        Ok(Envelope::system(actions::JOIN_ROOM, payload))
    }
}

#[derive(Debug, Clone)]
pub struct PublicMessageRequest {
    pub room_id: i32,
    pub message: String,
    pub params: Option<ValueMap>,
}

impl PublicMessageRequest {
    pub fn new(room_id: i32, message: impl Into<String>) -> Self {
        Self {
            room_id,
            message: message.into(),
            params: None,
        }
    }
}

impl Request for PublicMessageRequest {
    fn to_envelope(&self) -> Result<Envelope, ValueError> {
        let mut payload = ValueMap::new()
            .with(KEY_ROOM, self.room_id)?
            .with(KEY_MESSAGE, self.message.as_str())?;
        if let Some(params) = &self.params {
            payload.insert(KEY_PARAMS, params.clone())?;
        }
        Ok(Envelope::system(actions::PUBLIC_MESSAGE, payload))
    }
}

/// Call a server-side extension command
#[derive(Debug, Clone)]
pub struct ExtensionRequest {
    pub command: String,
    pub params: ValueMap,
    pub room_id: Option<i32>,
    /// Allow the request to travel over the UDP channel
    pub use_udp: bool,
}

impl ExtensionRequest {
    pub fn new(command: impl Into<String>, params: ValueMap) -> Self {
        Self {
            command: command.into(),
            params,
            room_id: None,
            use_udp: false,
        }
    }

    pub fn in_room(mut self, room_id: i32) -> Self {
        self.room_id = Some(room_id);
        self
    }

    pub fn over_udp(mut self) -> Self {
        self.use_udp = true;
        self
    }
}

impl Request for ExtensionRequest {
    fn to_envelope(&self) -> Result<Envelope, ValueError> {
        let mut payload = ValueMap::new()
            .with(KEY_COMMAND, self.command.as_str())?
            .with(KEY_PARAMS, self.params.clone())?;
        if let Some(room_id) = self.room_id {
            payload.insert(KEY_ROOM, room_id)?;
        }
        let envelope = Envelope::extension(actions::CALL_EXTENSION, payload);
        Ok(if self.use_udp {
            envelope.udp_eligible()
        } else {
            envelope
        })
    }
}

/// Sent over UDP once the channel is bound; the server acknowledges over TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpInitRequest;

impl Request for UdpInitRequest {
    fn to_envelope(&self) -> Result<Envelope, ValueError> {
        Ok(Envelope::extension(actions::UDP_INIT, ValueMap::new()).udp_eligible())
    }
}
