//! Sandbox → host lifecycle messages and their per-session routing.
//!
//! The sandbox posts every message wrapped in an [`Envelope`] carrying the
//! channel name and session id. The host hands raw JSON to a [`MessageBus`],
//! which delivers it only to the subscriber of that exact session.

use lazy_static::lazy_static;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;

use crate::error::Result;

/// Channel name used when the host does not pick one.
pub const DEFAULT_CHANNEL: &str = "component-preview";

const SESSION_BUFFER: usize = 32;

lazy_static! {
    static ref NOT_DEFINED_RE: Regex =
        Regex::new(r"([A-Za-z_$][\w$]*) is not defined|Can't find variable: ([A-Za-z_$][\w$]*)")
            .unwrap();
}

/// Scopes messages to one preview session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelToken {
    pub channel: String,
    pub session_id: String,
}

impl ChannelToken {
    pub fn new(channel: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            session_id: session_id.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineno: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colno: Option<u32>,
}

impl SandboxError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Identifier named by an "X is not defined" reference error.
    pub fn undefined_identifier(&self) -> Option<&str> {
        let caps = NOT_DEFINED_RE.captures(&self.message)?;
        caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LifecycleMessage {
    #[serde(rename_all = "camelCase")]
    Ready {
        component_name: String,
        /// Milliseconds since the epoch, as reported by the sandbox clock.
        timestamp: u64,
        /// Identifiers the runtime trap stubbed during this render.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        runtime_stubs: Vec<String>,
    },
    Error {
        error: SandboxError,
    },
}

impl LifecycleMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleMessage::Ready { .. } => "Ready",
            LifecycleMessage::Error { .. } => "Error",
        }
    }
}

/// A lifecycle message as posted over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub channel: String,
    pub session_id: String,
    #[serde(flatten)]
    pub message: LifecycleMessage,
}

impl Envelope {
    pub fn new(token: &ChannelToken, message: LifecycleMessage) -> Self {
        Self {
            channel: token.channel.clone(),
            session_id: token.session_id.clone(),
            message,
        }
    }

    pub fn token(&self) -> ChannelToken {
        ChannelToken::new(self.channel.clone(), self.session_id.clone())
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MESSAGE BUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Routes envelopes to the subscriber of their session.
#[derive(Default)]
pub struct MessageBus {
    sessions: RwLock<HashMap<ChannelToken, broadcast::Sender<LifecycleMessage>>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, token: &ChannelToken) -> broadcast::Receiver<LifecycleMessage> {
        let mut sessions = self.sessions.write();
        sessions
            .entry(token.clone())
            .or_insert_with(|| broadcast::channel(SESSION_BUFFER).0)
            .subscribe()
    }

    pub fn unsubscribe(&self, token: &ChannelToken) {
        self.sessions.write().remove(token);
    }

    pub fn is_subscribed(&self, token: &ChannelToken) -> bool {
        self.sessions.read().contains_key(token)
    }

    /// Deliver `envelope` to its session. Returns `false` when nobody owns that session.
    pub fn dispatch(&self, envelope: Envelope) -> bool {
        let token = envelope.token();
        let sessions = self.sessions.read();
        let Some(tx) = sessions.get(&token) else {
            tracing::debug!(
                channel = %token.channel,
                session_id = %token.session_id,
                "dropping message for unknown session"
            );
            return false;
        };
        tx.send(envelope.message).is_ok()
    }

    /// Parse and deliver a raw `postMessage` payload. Foreign or malformed
    /// payloads are dropped.
    pub fn dispatch_raw(&self, raw: &str) -> bool {
        match Envelope::from_json(raw) {
            Ok(envelope) => self.dispatch(envelope),
            Err(e) => {
                tracing::debug!(error = %e, "ignoring malformed lifecycle message");
                false
            }
        }
    }
}
