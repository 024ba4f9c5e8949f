//! # Edge Message Catalogue - Parsing
//!
//! Typed views over received messages. Each parser checks the content type
//! first and reports the expected kind alongside what actually arrived, so a
//! stray message is never coerced into the wrong result.

use crate::constants::*;
use crate::content_type::ContentType;
use crate::error::{ProtocolError, ProtocolResult};
use crate::message::Message;
use crate::options::{ConnType, CryptoMethod, Precedence};
use serde::{Deserialize, Serialize};

/// Outcome of a dial: exactly one of `new_conn_id` / `message` is meaningful
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialResult {
    pub conn_id: u32,
    pub new_conn_id: u32,
    pub success: bool,
    pub message: String,
}

pub fn unmarshal_dial_result(msg: &Message) -> ProtocolResult<DialResult> {
    let conn_id = msg
        .conn_id()?
        .ok_or_else(|| ProtocolError::missing_header(CONN_ID_HEADER, "edge message with no connection id header"))?;

    match msg.kind() {
        Some(ContentType::DialSuccess) => {
            let body: [u8; 4] = msg.body().as_ref().try_into().map_err(|_| {
                ProtocolError::MalformedDialSuccess {
                    body_len: msg.body().len(),
                }
            })?;
            Ok(DialResult {
                conn_id,
                new_conn_id: u32::from_le_bytes(body),
                success: true,
                message: String::new(),
            })
        }
        Some(ContentType::DialFailed) => Ok(DialResult {
            conn_id,
            new_conn_id: 0,
            success: false,
            message: msg.body_text(),
        }),
        _ => Err(ProtocolError::unexpected_content_type(
            "dial result message",
            msg.content_type(),
        )),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectResult {
    pub conn_id: u32,
    pub conn_type: ConnType,
    pub detail: String,
}

/// A response without a conn-type header is reported as [`ConnType::Unknown`]
pub fn unmarshal_inspect_result(msg: &Message) -> ProtocolResult<InspectResult> {
    if !msg.is(ContentType::ConnInspectResponse) {
        return Err(ProtocolError::unexpected_content_type(
            "inspect result message",
            msg.content_type(),
        ));
    }

    let conn_id = msg.conn_id()?.unwrap_or(0);
    let conn_type = msg
        .get_header::<u8>(CONN_TYPE_HEADER)?
        .map(ConnType::from_byte)
        .unwrap_or(ConnType::Unknown);

    Ok(InspectResult {
        conn_id,
        conn_type,
        detail: msg.body_text(),
    })
}

/// One hop of a trace-route reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRouteHop {
    pub conn_id: u32,
    pub hops: u32,
    pub timestamp: u64,
    pub hop_type: String,
    pub hop_id: String,
}

pub fn unmarshal_trace_route_response(msg: &Message) -> ProtocolResult<TraceRouteHop> {
    if !msg.is(ContentType::TraceRouteResponse) {
        return Err(ProtocolError::unexpected_content_type(
            "trace route response",
            msg.content_type(),
        ));
    }

    Ok(TraceRouteHop {
        conn_id: msg.conn_id()?.unwrap_or(0),
        hops: msg.require_header(TRACE_HOP_COUNT_HEADER, "trace route response")?,
        timestamp: msg.require_header(TIMESTAMP_HEADER, "trace route response")?,
        hop_type: msg.get_header(TRACE_HOP_TYPE_HEADER)?.unwrap_or_default(),
        hop_id: msg.get_header(TRACE_HOP_ID_HEADER)?.unwrap_or_default(),
    })
}

/// Fields of an update-bind; `None` means leave the current value alone
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindUpdate {
    pub cost: Option<u16>,
    pub precedence: Option<Precedence>,
}

pub fn unmarshal_update_bind(msg: &Message) -> ProtocolResult<BindUpdate> {
    if !msg.is(ContentType::UpdateBind) {
        return Err(ProtocolError::unexpected_content_type(
            "update bind message",
            msg.content_type(),
        ));
    }

    Ok(BindUpdate {
        cost: msg.get_header(COST_HEADER)?,
        precedence: decode_precedence(msg)?,
    })
}

/// Everything a router learns from a bind request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRequest {
    pub conn_id: u32,
    pub token: String,
    pub public_key: Option<Vec<u8>>,
    pub crypto_method: Option<CryptoMethod>,
    pub cost: u16,
    pub precedence: Precedence,
    pub identity: Option<String>,
    pub identity_secret: Option<String>,
    pub listener_id: Option<String>,
    pub supports_inspect: bool,
    pub supports_bind_success: bool,
    pub router_provided_conn_id: bool,
}

pub fn unmarshal_bind(msg: &Message) -> ProtocolResult<BindRequest> {
    if !msg.is(ContentType::Bind) {
        return Err(ProtocolError::unexpected_content_type("bind message", msg.content_type()));
    }

    let crypto_method = match msg.get_header::<u8>(CRYPTO_METHOD_HEADER)? {
        None => None,
        Some(raw) => Some(CryptoMethod::try_from(raw).map_err(|_| {
            ProtocolError::InvalidHeaderValue {
                header_id: CRYPTO_METHOD_HEADER,
                value: u64::from(raw),
                kind: "CryptoMethod",
            }
        })?),
    };

    Ok(BindRequest {
        conn_id: msg.require_header(CONN_ID_HEADER, "bind message")?,
        token: msg.body_text(),
        public_key: msg.get_header(PUBLIC_KEY_HEADER)?,
        crypto_method,
        cost: msg.get_header(COST_HEADER)?.unwrap_or(0),
        precedence: decode_precedence(msg)?.unwrap_or_default(),
        identity: msg.get_header(TERMINATOR_IDENTITY_HEADER)?,
        identity_secret: msg.get_header(TERMINATOR_IDENTITY_SECRET_HEADER)?,
        listener_id: msg.get_header(LISTENER_ID_HEADER)?,
        supports_inspect: msg.get_header(SUPPORTS_INSPECT_HEADER)?.unwrap_or(false),
        supports_bind_success: msg.get_header(SUPPORTS_BIND_SUCCESS_HEADER)?.unwrap_or(false),
        router_provided_conn_id: msg.get_header(ROUTER_PROVIDED_CONN_ID_HEADER)?.unwrap_or(false),
    })
}

fn decode_precedence(msg: &Message) -> ProtocolResult<Option<Precedence>> {
    match msg.get_header::<u8>(PRECEDENCE_HEADER)? {
        None => Ok(None),
        Some(raw) => Precedence::try_from(raw).map(Some).map_err(|_| {
            ProtocolError::InvalidHeaderValue {
                header_id: PRECEDENCE_HEADER,
                value: u64::from(raw),
                kind: "Precedence",
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::*;
    use crate::options::ListenOptions;

    #[test]
    fn test_dial_success() {
        let result = unmarshal_dial_result(&new_dial_success_msg(3, 77)).unwrap();
        assert_eq!(
            result,
            DialResult {
                conn_id: 3,
                new_conn_id: 77,
                success: true,
                message: String::new(),
            }
        );
    }

    #[test]
    fn test_dial_success_short_body() {
        let mut msg = Message::new(ContentType::DialSuccess, vec![1u8, 2, 3]);
        msg.put_header(CONN_ID_HEADER, 3u32);
        assert_eq!(
            unmarshal_dial_result(&msg),
            Err(ProtocolError::MalformedDialSuccess { body_len: 3 })
        );
    }

    #[test]
    fn test_dial_failed() {
        let result = unmarshal_dial_result(&new_dial_failed_msg(3, "service not found")).unwrap();
        assert!(!result.success);
        assert_eq!(result.message, "service not found");
        assert_eq!(result.conn_id, 3);
    }

    #[test]
    fn test_dial_result_requires_conn_id() {
        let msg = Message::new(ContentType::DialFailed, b"nope".to_vec());
        assert!(matches!(
            unmarshal_dial_result(&msg),
            Err(ProtocolError::MissingHeader { header_id: CONN_ID_HEADER, .. })
        ));
    }

    #[test]
    fn test_dial_result_wrong_type() {
        let err = unmarshal_dial_result(&new_state_connected_msg(3)).unwrap_err();
        match err {
            ProtocolError::UnexpectedContentType { expected, actual } => {
                assert_eq!(expected, "dial result message");
                assert_eq!(actual, "EdgeStateConnectedType");
            }
            other => panic!("Expected UnexpectedContentType, got {other:?}"),
        }
    }

    #[test]
    fn test_inspect_result() {
        let msg = new_conn_inspect_response_msg(9, ConnType::Bind, "bound");
        let result = unmarshal_inspect_result(&msg).unwrap();
        assert_eq!(result.conn_id, 9);
        assert_eq!(result.conn_type, ConnType::Bind);
        assert_eq!(result.detail, "bound");

        let mut bare = Message::new(ContentType::ConnInspectResponse, b"?".to_vec());
        bare.put_header(CONN_ID_HEADER, 9u32);
        assert_eq!(unmarshal_inspect_result(&bare).unwrap().conn_type, ConnType::Unknown);

        assert!(unmarshal_inspect_result(&new_probe_msg()).is_err());
    }

    #[test]
    fn test_trace_route_response() {
        let msg = new_trace_route_response_msg(1, 3, 42, "sdk", "client-1");
        let hop = unmarshal_trace_route_response(&msg).unwrap();
        assert_eq!(hop.hops, 3);
        assert_eq!(hop.timestamp, 42);
        assert_eq!(hop.hop_type, "sdk");
        assert_eq!(hop.hop_id, "client-1");
    }

    #[test]
    fn test_update_bind_roundtrip_keeps_absence() {
        let msg = new_update_bind_msg(1, "t", Some(25), None);
        let update = unmarshal_update_bind(&msg).unwrap();
        assert_eq!(update.cost, Some(25));
        assert_eq!(update.precedence, None);
    }

    #[test]
    fn test_bind_bad_precedence() {
        let mut msg = new_bind_msg(1, "t", None, &ListenOptions::default());
        msg.put_header(PRECEDENCE_HEADER, 7u8);
        assert!(matches!(
            unmarshal_bind(&msg),
            Err(ProtocolError::InvalidHeaderValue { kind: "Precedence", .. })
        ));
    }
}
