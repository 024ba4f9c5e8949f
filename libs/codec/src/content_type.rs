//! # Content Type Registry
//!
//! Every edge message carries an `i32` content type. Edge connection
//! management lives in the 60000s; the posture response keeps its older
//! value. Unknown values stay representable on [`crate::Message`] as raw
//! integers so foreign traffic on the same channel is never fatal.

use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, Serialize, Deserialize)]
pub enum ContentType {
    Connect = 60783,
    StateConnected = 60784,
    StateClosed = 60785,
    Data = 60786,
    Dial = 60787,
    DialSuccess = 60788,
    DialFailed = 60789,
    Bind = 60790,
    Unbind = 60791,
    StateSessionEnded = 60792,
    Probe = 60793,
    UpdateBind = 60794,
    HealthEvent = 60795,
    TraceRoute = 60796,
    TraceRouteResponse = 60797,
    ConnInspectRequest = 60798,
    ConnInspectResponse = 60799,
    BindSuccess = 60800,
    UpdateTokenSuccess = 60801,
    UpdateTokenFailure = 60802,
    UpdateToken = 60803,

    PostureResponse = 10800,
}

impl ContentType {
    pub const ALL: &'static [ContentType] = &[
        ContentType::Connect,
        ContentType::StateConnected,
        ContentType::StateClosed,
        ContentType::Data,
        ContentType::Dial,
        ContentType::DialSuccess,
        ContentType::DialFailed,
        ContentType::Bind,
        ContentType::Unbind,
        ContentType::StateSessionEnded,
        ContentType::Probe,
        ContentType::UpdateBind,
        ContentType::HealthEvent,
        ContentType::TraceRoute,
        ContentType::TraceRouteResponse,
        ContentType::ConnInspectRequest,
        ContentType::ConnInspectResponse,
        ContentType::BindSuccess,
        ContentType::UpdateTokenSuccess,
        ContentType::UpdateTokenFailure,
        ContentType::UpdateToken,
        ContentType::PostureResponse,
    ];

    /// Wire value
    pub fn value(self) -> i32 {
        self as i32
    }

    /// Name used in logs and diagnostics
    pub fn name(self) -> &'static str {
        match self {
            ContentType::Connect => "EdgeConnectType",
            ContentType::StateConnected => "EdgeStateConnectedType",
            ContentType::StateClosed => "EdgeStateClosedType",
            ContentType::Data => "EdgeDataType",
            ContentType::Dial => "EdgeDialType",
            ContentType::DialSuccess => "EdgeDialSuccessType",
            ContentType::DialFailed => "EdgeDialFailedType",
            ContentType::Bind => "EdgeBindType",
            ContentType::Unbind => "EdgeUnbindType",
            ContentType::StateSessionEnded => "EdgeStateSessionEndedType",
            ContentType::Probe => "EdgeProbeType",
            ContentType::UpdateBind => "EdgeUpdateBindType",
            ContentType::HealthEvent => "EdgeHealthEventType",
            ContentType::TraceRoute => "EdgeTraceRouteType",
            ContentType::TraceRouteResponse => "EdgeTraceRouteResponseType",
            ContentType::ConnInspectRequest => "EdgeConnInspectRequestType",
            ContentType::ConnInspectResponse => "EdgeConnInspectResponseType",
            ContentType::BindSuccess => "EdgeBindSuccessType",
            ContentType::UpdateTokenSuccess => "EdgeUpdateTokenSuccessType",
            ContentType::UpdateTokenFailure => "EdgeUpdateTokenFailureType",
            ContentType::UpdateToken => "EdgeUpdateTokenType",
            ContentType::PostureResponse => "EdgePostureResponseType",
        }
    }

    /// Reverse lookup of [`ContentType::name`]
    pub fn from_name(name: &str) -> Option<ContentType> {
        Self::ALL.iter().copied().find(|ct| ct.name() == name)
    }

    /// Name for a raw wire value, falling back to the number itself
    pub fn describe(raw: i32) -> String {
        match ContentType::try_from(raw) {
            Ok(ct) => ct.name().to_string(),
            Err(_) => raw.to_string(),
        }
    }

    /// Content types that carry a connId and belong to one logical connection
    pub fn is_connection_scoped(self) -> bool {
        !matches!(
            self,
            ContentType::Probe
                | ContentType::UpdateToken
                | ContentType::UpdateTokenSuccess
                | ContentType::UpdateTokenFailure
                | ContentType::PostureResponse
        )
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.value())
    }
}

impl From<ContentType> for i32 {
    fn from(ct: ContentType) -> Self {
        ct as i32
    }
}
