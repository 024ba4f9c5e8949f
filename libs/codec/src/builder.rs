//! # Edge Message Catalogue - Construction
//!
//! One pure constructor per message kind. Each returns a freshly populated
//! [`Message`]; nothing here touches shared state, so construction is safe
//! from any thread.
//!
//! Headers that carry their wire default are left off to save bytes: a bind
//! with cost 0 and default precedence sends neither header.

use crate::constants::*;
use crate::content_type::ContentType;
use crate::message::Message;
use crate::options::{ConnType, DialOptions, ListenOptions, Precedence};
use bytes::Bytes;

fn conn_msg(content_type: ContentType, conn_id: u32, seq: u32, body: impl Into<Bytes>) -> Message {
    let mut msg = Message::new(content_type, body);
    msg.put_header(CONN_ID_HEADER, conn_id);
    msg.put_header(SEQ_HEADER, seq);
    msg
}

/// Payload for one direction of a connection
pub fn new_data_msg(conn_id: u32, seq: u32, data: impl Into<Bytes>) -> Message {
    conn_msg(ContentType::Data, conn_id, seq, data)
}

/// Final data message for a direction; sets [`FIN`] in the flags header
pub fn new_fin_data_msg(conn_id: u32, seq: u32, data: impl Into<Bytes>) -> Message {
    let mut msg = new_data_msg(conn_id, seq, data);
    msg.put_header(FLAGS_HEADER, FIN);
    msg
}

pub fn new_probe_msg() -> Message {
    Message::empty(ContentType::Probe)
}

pub fn new_trace_route_msg(conn_id: u32, hops: u32, timestamp: u64) -> Message {
    let mut msg = Message::empty(ContentType::TraceRoute);
    msg.put_header(CONN_ID_HEADER, conn_id);
    msg.put_header(TRACE_HOP_COUNT_HEADER, hops);
    msg.put_header(TIMESTAMP_HEADER, timestamp);
    msg
}

pub fn new_trace_route_response_msg(
    conn_id: u32,
    hops: u32,
    timestamp: u64,
    hop_type: &str,
    hop_id: &str,
) -> Message {
    let mut msg = Message::empty(ContentType::TraceRouteResponse);
    msg.put_header(CONN_ID_HEADER, conn_id);
    msg.put_header(TRACE_HOP_COUNT_HEADER, hops);
    msg.put_header(TIMESTAMP_HEADER, timestamp);
    msg.put_raw_header(TRACE_HOP_TYPE_HEADER, hop_type.as_bytes().to_vec());
    msg.put_raw_header(TRACE_HOP_ID_HEADER, hop_id.as_bytes().to_vec());
    msg
}

pub fn new_conn_inspect_request_msg(conn_id: u32) -> Message {
    let mut msg = Message::empty(ContentType::ConnInspectRequest);
    msg.put_header(CONN_ID_HEADER, conn_id);
    msg
}

/// Inspect answer; `state` is free-form detail for the operator
pub fn new_conn_inspect_response_msg(conn_id: u32, conn_type: ConnType, state: &str) -> Message {
    let mut msg = Message::new(ContentType::ConnInspectResponse, state.as_bytes().to_vec());
    msg.put_header(CONN_ID_HEADER, conn_id);
    msg.put_header(CONN_TYPE_HEADER, conn_type as u8);
    msg
}

/// Open a logical connection to a service.
///
/// The public key, when given, is attached together with the negotiated
/// crypto method from `options`.
pub fn new_connect_msg(
    conn_id: u32,
    token: &str,
    public_key: Option<&[u8]>,
    options: &DialOptions,
) -> Message {
    let mut msg = conn_msg(ContentType::Connect, conn_id, 0, token.as_bytes().to_vec());
    if let Some(key) = public_key {
        msg.put_raw_header(PUBLIC_KEY_HEADER, key.to_vec());
        msg.put_header(CRYPTO_METHOD_HEADER, options.crypto_method as u8);
    }

    if !options.identity.is_empty() {
        msg.put_header(TERMINATOR_IDENTITY_HEADER, options.identity.as_str());
    }
    if !options.caller_id.is_empty() {
        msg.put_header(CALLER_ID_HEADER, options.caller_id.as_str());
    }
    if let Some(app_data) = &options.app_data {
        msg.put_raw_header(APP_DATA_HEADER, app_data.clone());
    }
    msg
}

pub fn new_state_connected_msg(conn_id: u32) -> Message {
    conn_msg(ContentType::StateConnected, conn_id, 0, Bytes::new())
}

pub fn new_state_closed_msg(conn_id: u32, message: &str) -> Message {
    conn_msg(ContentType::StateClosed, conn_id, 0, message.as_bytes().to_vec())
}

/// Dial sent by the router to a hosting terminator. The caller id header is
/// always present, possibly empty.
pub fn new_dial_msg(conn_id: u32, token: &str, caller_id: &str) -> Message {
    let mut msg = conn_msg(ContentType::Dial, conn_id, 0, token.as_bytes().to_vec());
    msg.put_header(CALLER_ID_HEADER, caller_id);
    msg
}

/// Register as a terminator for a service.
///
/// Always advertises inspect and bind-success support and asks the router
/// to assign connIds for incoming dials.
pub fn new_bind_msg(
    conn_id: u32,
    token: &str,
    public_key: Option<&[u8]>,
    options: &ListenOptions,
) -> Message {
    let mut msg = conn_msg(ContentType::Bind, conn_id, 0, token.as_bytes().to_vec());
    msg.put_header(SUPPORTS_INSPECT_HEADER, true);
    msg.put_header(SUPPORTS_BIND_SUCCESS_HEADER, true);

    if let Some(key) = public_key {
        msg.put_raw_header(PUBLIC_KEY_HEADER, key.to_vec());
        msg.put_header(CRYPTO_METHOD_HEADER, options.crypto_method as u8);
    }

    if options.cost > 0 {
        msg.put_header(COST_HEADER, options.cost);
    }
    if options.precedence != Precedence::Default {
        msg.put_header(PRECEDENCE_HEADER, options.precedence as u8);
    }

    if !options.identity.is_empty() {
        msg.put_header(TERMINATOR_IDENTITY_HEADER, options.identity.as_str());

        if !options.identity_secret.is_empty() {
            msg.put_header(TERMINATOR_IDENTITY_SECRET_HEADER, options.identity_secret.as_str());
        }
    }

    if !options.listener_id.is_empty() {
        msg.put_header(LISTENER_ID_HEADER, options.listener_id.as_str());
    }

    msg.put_header(ROUTER_PROVIDED_CONN_ID_HEADER, true);
    msg
}

pub fn new_bind_success_msg(conn_id: u32) -> Message {
    conn_msg(ContentType::BindSuccess, conn_id, 0, Bytes::new())
}

pub fn new_unbind_msg(conn_id: u32, token: &str) -> Message {
    conn_msg(ContentType::Unbind, conn_id, 0, token.as_bytes().to_vec())
}

/// Partial bind update: only the fields given are sent, absent ones leave
/// the router's state untouched.
pub fn new_update_bind_msg(
    conn_id: u32,
    token: &str,
    cost: Option<u16>,
    precedence: Option<Precedence>,
) -> Message {
    let mut msg = conn_msg(ContentType::UpdateBind, conn_id, 0, token.as_bytes().to_vec());
    if let Some(cost) = cost {
        msg.put_header(COST_HEADER, cost);
    }
    if let Some(precedence) = precedence {
        msg.put_header(PRECEDENCE_HEADER, precedence as u8);
    }
    msg
}

pub fn new_health_event_msg(conn_id: u32, token: &str, pass: bool) -> Message {
    let mut msg = conn_msg(ContentType::HealthEvent, conn_id, 0, token.as_bytes().to_vec());
    msg.put_header(HEALTH_STATUS_HEADER, pass);
    msg
}

/// Body is the 4-byte little-endian connId assigned to the new connection
pub fn new_dial_success_msg(conn_id: u32, new_conn_id: u32) -> Message {
    conn_msg(ContentType::DialSuccess, conn_id, 0, new_conn_id.to_le_bytes().to_vec())
}

pub fn new_dial_failed_msg(conn_id: u32, message: &str) -> Message {
    conn_msg(ContentType::DialFailed, conn_id, 0, message.as_bytes().to_vec())
}

/// Session-wide end notice, addressed to connId 0
pub fn new_state_session_ended_msg(reason: &str) -> Message {
    conn_msg(ContentType::StateSessionEnded, 0, 0, reason.as_bytes().to_vec())
}

/// Replace the session token before the current one expires.
///
/// If no refresh lands before expiry, the session and every service
/// connection multiplexed on it are torn down.
pub fn new_update_token_msg(token: impl Into<Bytes>) -> Message {
    Message::new(ContentType::UpdateToken, token)
}

/// Response to a token update that failed validation
pub fn new_update_token_failed_msg(err: &dyn std::error::Error) -> Message {
    Message::new(ContentType::UpdateTokenFailure, err.to_string().into_bytes())
}

/// Response to a token update that was accepted
pub fn new_update_token_success_msg() -> Message {
    Message::empty(ContentType::UpdateTokenSuccess)
}
