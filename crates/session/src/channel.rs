//! Cross-tab session notifications
//!
//! Every [`crate::Auth`] instance plays the part of one browser tab. Tabs that
//! share a [`BroadcastHub`] see each other's logouts through a named channel.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::SessionError;

const CHANNEL_CAPACITY: usize = 16;

/// Event carried on the auth channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthEvent {
    Logout,
}

impl AuthEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Logout => "logout",
        }
    }

    pub fn parse(payload: &str) -> Option<Self> {
        match payload {
            "logout" => Some(Self::Logout),
            _ => None,
        }
    }
}

impl fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message on the auth channel, tagged with the tab that sent it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub origin: Uuid,
    pub event: AuthEvent,
}

/// Process-wide publish/subscribe capability used for cross-tab logout
pub trait AuthChannel: Send + Sync {
    /// Publish a message to every subscriber, the sender's own included
    fn post(&self, message: ChannelMessage) -> Result<(), SessionError>;

    /// Start receiving messages
    fn subscribe(&self) -> Result<broadcast::Receiver<ChannelMessage>, SessionError>;
}

/// Registry of named in-process channels.
///
/// Cloning the hub shares the registry, so every clone opens the same
/// channels.
#[derive(Clone, Default)]
pub struct BroadcastHub {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<ChannelMessage>>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the channel called `name`, creating it on first use
    pub fn channel(&self, name: &str) -> LocalChannel {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let sender = channels
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone();
        LocalChannel {
            name: name.to_string(),
            sender,
        }
    }
}

impl fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .channels
            .lock()
            .map(|channels| channels.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("BroadcastHub").field("channels", &names).finish()
    }
}

/// One named channel of a [`BroadcastHub`]
#[derive(Debug, Clone)]
pub struct LocalChannel {
    name: String,
    sender: broadcast::Sender<ChannelMessage>,
}

impl LocalChannel {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl AuthChannel for LocalChannel {
    fn post(&self, message: ChannelMessage) -> Result<(), SessionError> {
        match self.sender.send(message) {
            Ok(receivers) => {
                debug!("Posted to {} ({} receivers)", self.name, receivers);
                Ok(())
            }
            Err(broadcast::error::SendError(message)) => {
                debug!("No receivers on {} for {}", self.name, message.event);
                Ok(())
            }
        }
    }

    fn subscribe(&self) -> Result<broadcast::Receiver<ChannelMessage>, SessionError> {
        Ok(self.sender.subscribe())
    }
}

/// Channel that is never available, for runtimes without cross-tab support
#[derive(Debug, Default, Clone, Copy)]
pub struct NoChannel;

impl AuthChannel for NoChannel {
    fn post(&self, _message: ChannelMessage) -> Result<(), SessionError> {
        Err(SessionError::ChannelUnavailable("no broadcast support".to_string()))
    }

    fn subscribe(&self) -> Result<broadcast::Receiver<ChannelMessage>, SessionError> {
        warn!("Broadcast channel not supported, running standalone");
        Err(SessionError::ChannelUnavailable("no broadcast support".to_string()))
    }
}
