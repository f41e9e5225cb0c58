//! Built-in System and Extension controllers.
//!
//! Each handler reads the short payload keys the server uses and turns them into a typed
//! [`Event`]. A response missing a required key is a handler error: it is reported as a
//! dispatch failure and the connection stays up.

use crate::core::container::ValueMap;
use crate::error::{constants, DispatchError, Result};
use crate::protocol::dispatcher::Controller;
use crate::protocol::event::Event;
use crate::protocol::message::{actions, Target};

/// Payload keys shared by requests and responses
pub mod keys {
    pub const SESSION_ID: &str = "sid";
    pub const TOKEN: &str = "tk";
    pub const MAX_MESSAGE_SIZE: &str = "ms";
    pub const USER_ID: &str = "id";
    pub const USER_NAME: &str = "un";
    pub const ZONE: &str = "zn";
    pub const ERROR_CODE: &str = "ec";
    pub const ERROR_MESSAGE: &str = "em";
    pub const ROOM_ID: &str = "rid";
    pub const ROOM_NAME: &str = "rn";
    pub const ROOM: &str = "r";
    pub const USER: &str = "u";
    pub const MESSAGE: &str = "m";
    pub const DISCONNECT_REASON: &str = "dr";
    pub const TIMESTAMP: &str = "t";
    pub const COMMAND: &str = "c";
    pub const PARAMS: &str = "p";
    pub const UDP_OK: &str = "ok";
}

fn field<T>(value: Option<T>, key: &str) -> Result<T> {
    value.ok_or_else(|| {
        DispatchError::Handler(format!("{} ({key})", constants::ERR_MISSING_FIELD)).into()
    })
}

fn error_parts(payload: &ValueMap) -> Option<(i16, String)> {
    let code = payload.get_short(keys::ERROR_CODE)?;
    let message = payload
        .get_str(keys::ERROR_MESSAGE)
        .unwrap_or_default()
        .to_owned();
    Some((code, message))
}

fn handshake(payload: &ValueMap) -> Result<Vec<Event>> {
    let raw_id = field(payload.get_long(keys::SESSION_ID), keys::SESSION_ID)?;
    // Session ids go out in every datagram header as u64
    let session_id = u64::try_from(raw_id).map_err(|_| {
        DispatchError::Handler(format!("{} ({raw_id})", constants::ERR_NEGATIVE_SESSION_ID))
    })?;
    Ok(vec![Event::Handshake {
        session_id,
        token: field(payload.get_str(keys::TOKEN), keys::TOKEN)?.to_owned(),
        max_message_size: payload.get_int(keys::MAX_MESSAGE_SIZE).unwrap_or(0),
    }])
}

fn login(payload: &ValueMap) -> Result<Vec<Event>> {
    if let Some((code, message)) = error_parts(payload) {
        return Ok(vec![Event::LoginError { code, message }]);
    }
    Ok(vec![Event::Login {
        user_id: field(payload.get_int(keys::USER_ID), keys::USER_ID)?,
        user_name: field(payload.get_str(keys::USER_NAME), keys::USER_NAME)?.to_owned(),
        zone: field(payload.get_str(keys::ZONE), keys::ZONE)?.to_owned(),
    }])
}

fn join_room(payload: &ValueMap) -> Result<Vec<Event>> {
    if let Some((code, message)) = error_parts(payload) {
        return Ok(vec![Event::RoomJoinError { code, message }]);
    }
    Ok(vec![Event::RoomJoin {
        room_id: field(payload.get_int(keys::ROOM_ID), keys::ROOM_ID)?,
        room_name: field(payload.get_str(keys::ROOM_NAME), keys::ROOM_NAME)?.to_owned(),
    }])
}

fn public_message(payload: &ValueMap) -> Result<Vec<Event>> {
    Ok(vec![Event::PublicMessage {
        room_id: field(payload.get_int(keys::ROOM), keys::ROOM)?,
        sender_id: field(payload.get_int(keys::USER), keys::USER)?,
        message: field(payload.get_str(keys::MESSAGE), keys::MESSAGE)?.to_owned(),
    }])
}

fn user_enter_room(payload: &ValueMap) -> Result<Vec<Event>> {
    Ok(vec![Event::UserEnterRoom {
        room_id: field(payload.get_int(keys::ROOM), keys::ROOM)?,
        user_id: field(payload.get_int(keys::USER), keys::USER)?,
        user_name: field(payload.get_str(keys::USER_NAME), keys::USER_NAME)?.to_owned(),
    }])
}

fn user_exit_room(payload: &ValueMap) -> Result<Vec<Event>> {
    Ok(vec![Event::UserExitRoom {
        room_id: field(payload.get_int(keys::ROOM), keys::ROOM)?,
        user_id: field(payload.get_int(keys::USER), keys::USER)?,
    }])
}

fn ping_pong(payload: &ValueMap) -> Result<Vec<Event>> {
    Ok(vec![Event::PingPong {
        echoed_ms: field(payload.get_long(keys::TIMESTAMP), keys::TIMESTAMP)?,
    }])
}

fn client_disconnection(payload: &ValueMap) -> Result<Vec<Event>> {
    Ok(vec![Event::Kicked {
        reason: payload.get_int(keys::DISCONNECT_REASON).unwrap_or(0),
    }])
}

fn extension_response(payload: &ValueMap) -> Result<Vec<Event>> {
    Ok(vec![Event::ExtensionResponse {
        command: field(payload.get_str(keys::COMMAND), keys::COMMAND)?.to_owned(),
        room_id: payload.get_int(keys::ROOM),
        params: payload.get_map(keys::PARAMS).cloned().unwrap_or_default(),
    }])
}

fn udp_init(payload: &ValueMap) -> Result<Vec<Event>> {
    Ok(vec![Event::UdpInit {
        success: payload.get_bool(keys::UDP_OK).unwrap_or(false),
    }])
}

/// Handlers for login, handshake, rooms, chat, keep-alive and kicks.
pub fn system_controller() -> Result<Controller> {
    Controller::new(Target::System)
        .with(actions::HANDSHAKE, handshake)?
        .with(actions::LOGIN, login)?
        .with(actions::LOGOUT, |_| Ok(vec![Event::Logout]))?
        .with(actions::JOIN_ROOM, join_room)?
        .with(actions::PUBLIC_MESSAGE, public_message)?
        // The server only acknowledges; the local close already emitted Disconnected
        .with(actions::MANUAL_DISCONNECTION, |_| Ok(Vec::new()))?
        .with(actions::PING_PONG, ping_pong)?
        .with(actions::USER_ENTER_ROOM, user_enter_room)?
        .with(actions::USER_EXIT_ROOM, user_exit_room)?
        .with(actions::CLIENT_DISCONNECTION, client_disconnection)
}

/// Handlers for game-specific extension traffic.
pub fn extension_controller() -> Result<Controller> {
    Controller::new(Target::Extension)
        .with(actions::CALL_EXTENSION, extension_response)?
        .with(actions::UDP_INIT, udp_init)
}
