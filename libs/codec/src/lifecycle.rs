//! # Connection Lifecycle State Machine
//!
//! Tracks what each connId on a session may do next, driven purely by the
//! messages sent and received for it. Two role machines share the connId
//! space:
//!
//! ```text
//! Dial: Idle -> DialSent -> Connected -> Closed
//!                       \-> Failed
//! Bind: Idle -> BindSent -> Bound -> Unbound | Closed
//!                       \-> Failed
//! ```
//!
//! A dial or bind the caller gave up on is marked `Failed` through
//! [`ConnectionTracker::on_timeout`], so a late answer cannot revive it.
//!
//! `Data` is only accepted on `Connected` or `Bound` connections. Data for an
//! unknown or terminal connId is returned as an error (and logged); the
//! caller decides whether to drop it.
//!
//! The session token is tracked here as well: once it expires without a
//! successful refresh every connection riding the session is torn down.

use crate::builder::new_conn_inspect_response_msg;
use crate::content_type::ContentType;
use crate::error::LifecycleError;
use crate::message::Message;
use crate::options::{ConnType, Precedence};
use crate::parser::{unmarshal_bind, unmarshal_dial_result, unmarshal_update_bind, InspectResult};
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Dial,
    Bind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnState {
    Idle,
    DialSent,
    Connected,
    Failed,
    BindSent,
    Bound,
    Unbound,
    Closed,
}

impl ConnState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnState::Failed | ConnState::Unbound | ConnState::Closed)
    }

    pub fn accepts_data(self) -> bool {
        matches!(self, ConnState::Connected | ConnState::Bound)
    }
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Observable effect of feeding one message to the tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Changed {
        conn_id: u32,
        from: ConnState,
        to: ConnState,
    },
    /// Accepted with no state change (data, update-bind, health, incoming dial)
    Unchanged { conn_id: u32, state: ConnState },
    /// Session-wide close; lists every connection it ended
    SessionEnded { closed: Vec<u32> },
    /// Not connection-scoped, or a content type this tracker does not follow
    Ignored,
}

#[derive(Debug, Clone)]
pub struct ConnEntry {
    pub role: Role,
    pub state: ConnState,
    pub cost: u16,
    pub precedence: Precedence,
    pub last_seq_sent: Option<u32>,
    pub last_seq_received: Option<u32>,
    pub close_reason: Option<String>,
}

impl ConnEntry {
    fn new(role: Role, state: ConnState) -> Self {
        Self {
            role,
            state,
            cost: 0,
            precedence: Precedence::Default,
            last_seq_sent: None,
            last_seq_received: None,
            close_reason: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct TokenState {
    expires_at: Option<Instant>,
    staged_expiry: Option<Instant>,
    refresh_pending: bool,
    last_failure: Option<String>,
}

/// Per-session connection tracker
#[derive(Debug)]
pub struct ConnectionTracker {
    conns: HashMap<u32, ConnEntry>,
    peer_supports_bind_success: bool,
    token: TokenState,
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self {
            conns: HashMap::new(),
            peer_supports_bind_success: true,
            token: TokenState::default(),
        }
    }

    /// Peers without bind-success never confirm a bind; treat it as bound
    /// as soon as it is sent.
    pub fn with_peer_bind_success(mut self, supported: bool) -> Self {
        self.peer_supports_bind_success = supported;
        self
    }

    pub fn state(&self, conn_id: u32) -> Option<ConnState> {
        self.conns.get(&conn_id).map(|e| e.state)
    }

    pub fn entry(&self, conn_id: u32) -> Option<&ConnEntry> {
        self.conns.get(&conn_id)
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// connIds still able to carry traffic
    pub fn active(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .conns
            .iter()
            .filter(|(_, e)| !e.state.is_terminal())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Drop every terminal entry
    pub fn prune(&mut self) -> usize {
        let before = self.conns.len();
        self.conns.retain(|_, e| !e.state.is_terminal());
        before - self.conns.len()
    }

    /// Record a message this side sent
    pub fn on_send(&mut self, msg: &Message) -> Result<Transition, LifecycleError> {
        let _span = msg.span().entered();
        let Some(kind) = msg.kind() else {
            return Ok(Transition::Ignored);
        };

        match kind {
            ContentType::Connect | ContentType::Dial => {
                let conn_id = self.conn_id(msg)?;
                self.open(conn_id, Role::Dial, ConnState::DialSent, msg)
            }
            ContentType::Bind => {
                let conn_id = self.conn_id(msg)?;
                let request = unmarshal_bind(msg)?;
                let state = if self.peer_supports_bind_success {
                    ConnState::BindSent
                } else {
                    ConnState::Bound
                };
                let transition = self.open(conn_id, Role::Bind, state, msg)?;
                if let Some(entry) = self.conns.get_mut(&conn_id) {
                    entry.cost = request.cost;
                    entry.precedence = request.precedence;
                }
                Ok(transition)
            }
            ContentType::UpdateBind => {
                let conn_id = self.conn_id(msg)?;
                let update = unmarshal_update_bind(msg)?;
                let entry = self.live_entry(conn_id, msg, Some(Role::Bind))?;
                if let Some(cost) = update.cost {
                    entry.cost = cost;
                }
                if let Some(precedence) = update.precedence {
                    entry.precedence = precedence;
                }
                Ok(Transition::Unchanged {
                    conn_id,
                    state: entry.state,
                })
            }
            ContentType::HealthEvent => {
                let conn_id = self.conn_id(msg)?;
                let entry = self.live_entry(conn_id, msg, Some(Role::Bind))?;
                Ok(Transition::Unchanged {
                    conn_id,
                    state: entry.state,
                })
            }
            ContentType::Unbind => {
                let conn_id = self.conn_id(msg)?;
                self.live_entry(conn_id, msg, Some(Role::Bind))?;
                Ok(self.set_state(conn_id, ConnState::Unbound, None))
            }
            ContentType::Data => {
                let conn_id = self.conn_id(msg)?;
                let seq = msg.edge_seq()?;
                let entry = self.data_entry(conn_id, msg)?;
                entry.last_seq_sent = seq.or(entry.last_seq_sent);
                Ok(Transition::Unchanged {
                    conn_id,
                    state: entry.state,
                })
            }
            ContentType::StateClosed => {
                let conn_id = self.conn_id(msg)?;
                self.live_entry(conn_id, msg, None)?;
                Ok(self.set_state(conn_id, ConnState::Closed, Some(msg.body_text())))
            }
            ContentType::DialSuccess => {
                // Hosting side accepting an incoming dial on one of its binds
                let result = unmarshal_dial_result(msg)?;
                self.expect_state(result.conn_id, msg, ConnState::Bound)?;
                let transition =
                    self.open(result.new_conn_id, Role::Dial, ConnState::Connected, msg)?;
                debug!(
                    bind_conn_id = result.conn_id,
                    new_conn_id = result.new_conn_id,
                    "Accepted incoming dial"
                );
                Ok(transition)
            }
            ContentType::UpdateToken => {
                self.token.refresh_pending = true;
                debug!("Session token refresh sent");
                Ok(Transition::Ignored)
            }
            _ => Ok(Transition::Ignored),
        }
    }

    /// Record a message received from the peer
    pub fn on_receive(&mut self, msg: &Message) -> Result<Transition, LifecycleError> {
        let _span = msg.span().entered();
        let Some(kind) = msg.kind() else {
            debug!("Ignoring message with unknown content type");
            return Ok(Transition::Ignored);
        };

        match kind {
            ContentType::DialSuccess | ContentType::StateConnected => {
                let conn_id = self.conn_id(msg)?;
                if kind == ContentType::DialSuccess {
                    unmarshal_dial_result(msg)?;
                }
                self.expect_state(conn_id, msg, ConnState::DialSent)?;
                Ok(self.set_state(conn_id, ConnState::Connected, None))
            }
            ContentType::DialFailed => {
                let conn_id = self.conn_id(msg)?;
                self.expect_state(conn_id, msg, ConnState::DialSent)?;
                Ok(self.set_state(conn_id, ConnState::Failed, Some(msg.body_text())))
            }
            ContentType::BindSuccess => {
                let conn_id = self.conn_id(msg)?;
                self.expect_state(conn_id, msg, ConnState::BindSent)?;
                Ok(self.set_state(conn_id, ConnState::Bound, None))
            }
            ContentType::StateClosed => {
                let conn_id = self.conn_id(msg)?;
                self.live_entry(conn_id, msg, None)?;
                Ok(self.set_state(conn_id, ConnState::Closed, Some(msg.body_text())))
            }
            ContentType::StateSessionEnded => {
                let conn_id = self.conn_id(msg)?;
                let reason = msg.body_text();
                if conn_id != 0 {
                    self.live_entry(conn_id, msg, None)?;
                    return Ok(self.set_state(conn_id, ConnState::Closed, Some(reason)));
                }

                let targets: Vec<u32> = self
                    .conns
                    .iter()
                    .filter(|(_, e)| e.role == Role::Dial && !e.state.is_terminal())
                    .map(|(id, _)| *id)
                    .collect();
                let closed = self.close_all(&targets, &reason);
                info!(closed = closed.len(), reason = %reason, "Session ended");
                Ok(Transition::SessionEnded { closed })
            }
            ContentType::Data => {
                let conn_id = self.conn_id(msg)?;
                let seq = msg.edge_seq()?;
                let entry = self.data_entry(conn_id, msg)?;
                entry.last_seq_received = seq.or(entry.last_seq_received);
                Ok(Transition::Unchanged {
                    conn_id,
                    state: entry.state,
                })
            }
            ContentType::Dial => {
                let conn_id = self.conn_id(msg)?;
                self.expect_state(conn_id, msg, ConnState::Bound)?;
                Ok(Transition::Unchanged {
                    conn_id,
                    state: ConnState::Bound,
                })
            }
            ContentType::UpdateTokenSuccess => {
                self.token.refresh_pending = false;
                self.token.last_failure = None;
                // without a staged expiry the new token's lifetime is unknown
                self.token.expires_at = self.token.staged_expiry.take();
                info!(
                    has_expiry = self.token.expires_at.is_some(),
                    "Session token refreshed"
                );
                Ok(Transition::Ignored)
            }
            ContentType::UpdateTokenFailure => {
                let reason = msg.body_text();
                warn!(reason = %reason, "Session token refresh rejected");
                self.token.refresh_pending = false;
                self.token.staged_expiry = None;
                self.token.last_failure = Some(reason);
                Ok(Transition::Ignored)
            }
            _ => Ok(Transition::Ignored),
        }
    }

    /// Give up on a dial or bind that got no answer in time.
    ///
    /// The connId becomes `Failed`: late confirmations are rejected as
    /// terminal and [`prune`](Self::prune) reclaims the entry.
    pub fn on_timeout(&mut self, conn_id: u32) -> Result<Transition, LifecycleError> {
        const CONTEXT: &str = "dial timeout";
        let state = self.live_entry_for(conn_id, CONTEXT, None)?.state;
        if !matches!(state, ConnState::DialSent | ConnState::BindSent) {
            return Err(self.report(LifecycleError::InvalidTransition {
                conn_id,
                state: state.to_string(),
                content_type: CONTEXT.to_string(),
            }));
        }
        warn!(conn_id, %state, "Connection setup timed out");
        Ok(self.set_state(conn_id, ConnState::Failed, Some("timed out".to_string())))
    }

    /// Inspect view of a connection; unknown ids report [`ConnType::Invalid`]
    pub fn inspect(&self, conn_id: u32) -> InspectResult {
        match self.conns.get(&conn_id) {
            None => InspectResult {
                conn_id,
                conn_type: ConnType::Invalid,
                detail: format!("invalid conn id [{conn_id}]"),
            },
            Some(entry) => {
                let conn_type = match entry.role {
                    Role::Dial => ConnType::Dial,
                    Role::Bind => ConnType::Bind,
                };
                let mut detail = format!("state={}", entry.state);
                if entry.role == Role::Bind {
                    detail.push_str(&format!(" cost={} precedence={}", entry.cost, entry.precedence));
                }
                if let Some(seq) = entry.last_seq_sent {
                    detail.push_str(&format!(" sent_seq={seq}"));
                }
                if let Some(seq) = entry.last_seq_received {
                    detail.push_str(&format!(" recv_seq={seq}"));
                }
                if let Some(reason) = &entry.close_reason {
                    detail.push_str(&format!(" reason={reason:?}"));
                }
                InspectResult {
                    conn_id,
                    conn_type,
                    detail,
                }
            }
        }
    }

    /// Answer an inspect request for `conn_id`
    pub fn inspect_response(&self, conn_id: u32) -> Message {
        let result = self.inspect(conn_id);
        new_conn_inspect_response_msg(result.conn_id, result.conn_type, &result.detail)
    }

    // =========================================================================
    // Session token
    // =========================================================================

    pub fn set_token_expiry(&mut self, expires_at: Instant) {
        self.token.expires_at = Some(expires_at);
    }

    /// Expiry of a token about to be sent; applied when the peer accepts it
    pub fn stage_token_expiry(&mut self, expires_at: Instant) {
        self.token.staged_expiry = Some(expires_at);
    }

    pub fn token_refresh_pending(&self) -> bool {
        self.token.refresh_pending
    }

    pub fn last_token_failure(&self) -> Option<&str> {
        self.token.last_failure.as_deref()
    }

    /// Tear everything down once the token has expired unrefreshed.
    ///
    /// This is not optional: a session whose token lapsed cannot keep any of
    /// its multiplexed connections.
    pub fn check_token_expiry(&mut self, now: Instant) -> Result<(), LifecycleError> {
        let Some(expires_at) = self.token.expires_at else {
            return Ok(());
        };
        if now < expires_at {
            return Ok(());
        }

        let targets = self.active();
        let torn_down = self.close_all(&targets, "session token expired");
        self.token.expires_at = None;
        warn!(
            torn_down = torn_down.len(),
            refresh_pending = self.token.refresh_pending,
            "Session token expired without refresh"
        );
        Err(LifecycleError::TokenExpired { torn_down })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn conn_id(&self, msg: &Message) -> Result<u32, LifecycleError> {
        Ok(msg.require_header(crate::constants::CONN_ID_HEADER, "connection-scoped message")?)
    }

    fn open(
        &mut self,
        conn_id: u32,
        role: Role,
        state: ConnState,
        msg: &Message,
    ) -> Result<Transition, LifecycleError> {
        if let Some(existing) = self.conns.get(&conn_id) {
            if !existing.state.is_terminal() {
                return Err(self.report(LifecycleError::InvalidTransition {
                    conn_id,
                    state: existing.state.to_string(),
                    content_type: ContentType::describe(msg.content_type()),
                }));
            }
        }
        self.conns.insert(conn_id, ConnEntry::new(role, state));
        debug!(conn_id, ?role, to = %state, "Connection opened");
        Ok(Transition::Changed {
            conn_id,
            from: ConnState::Idle,
            to: state,
        })
    }

    fn set_state(&mut self, conn_id: u32, to: ConnState, reason: Option<String>) -> Transition {
        match self.conns.get_mut(&conn_id) {
            Some(entry) => {
                let from = entry.state;
                entry.state = to;
                if reason.is_some() {
                    entry.close_reason = reason;
                }
                debug!(conn_id, %from, %to, "Connection state changed");
                Transition::Changed { conn_id, from, to }
            }
            None => Transition::Ignored,
        }
    }

    fn close_all(&mut self, targets: &[u32], reason: &str) -> Vec<u32> {
        let mut closed = Vec::with_capacity(targets.len());
        for conn_id in targets {
            if let Some(entry) = self.conns.get_mut(conn_id) {
                entry.state = ConnState::Closed;
                entry.close_reason = Some(reason.to_string());
                closed.push(*conn_id);
            }
        }
        closed.sort_unstable();
        closed
    }

    fn expect_state(
        &mut self,
        conn_id: u32,
        msg: &Message,
        expected: ConnState,
    ) -> Result<(), LifecycleError> {
        let entry = self.live_entry(conn_id, msg, None)?;
        if entry.state != expected {
            let err = LifecycleError::InvalidTransition {
                conn_id,
                state: entry.state.to_string(),
                content_type: ContentType::describe(msg.content_type()),
            };
            return Err(self.report(err));
        }
        Ok(())
    }

    fn live_entry(
        &mut self,
        conn_id: u32,
        msg: &Message,
        role: Option<Role>,
    ) -> Result<&mut ConnEntry, LifecycleError> {
        self.live_entry_for(conn_id, &ContentType::describe(msg.content_type()), role)
    }

    fn live_entry_for(
        &mut self,
        conn_id: u32,
        context: &str,
        role: Option<Role>,
    ) -> Result<&mut ConnEntry, LifecycleError> {
        let content_type = context.to_string();
        let err = match self.conns.get(&conn_id) {
            None => Some(LifecycleError::UnknownConnection {
                conn_id,
                content_type,
            }),
            Some(e) if e.state.is_terminal() => Some(LifecycleError::TerminalConnection {
                conn_id,
                state: e.state.to_string(),
                content_type,
            }),
            Some(e) if role.is_some_and(|r| r != e.role) => Some(LifecycleError::InvalidTransition {
                conn_id,
                state: e.state.to_string(),
                content_type,
            }),
            Some(_) => None,
        };
        if let Some(err) = err {
            return Err(self.report(err));
        }
        self.conns
            .get_mut(&conn_id)
            .ok_or_else(|| LifecycleError::UnknownConnection {
                conn_id,
                content_type: context.to_string(),
            })
    }

    fn data_entry(&mut self, conn_id: u32, msg: &Message) -> Result<&mut ConnEntry, LifecycleError> {
        let state = self.live_entry(conn_id, msg, None)?.state;
        if !state.accepts_data() {
            let err = LifecycleError::InvalidTransition {
                conn_id,
                state: state.to_string(),
                content_type: ContentType::describe(msg.content_type()),
            };
            return Err(self.report(err));
        }
        self.live_entry(conn_id, msg, None)
    }

    fn report(&self, err: LifecycleError) -> LifecycleError {
        warn!(error = %err, "Edge lifecycle violation");
        err
    }
}
