//! Application core: the node's state machines and the ports they use.
//!
//! Machines are plain `&'static` state tables driven by the
//! [`Engine`](crate::fsm::Engine).  All interaction with the outside world
//! goes through the **port traits** in [`ports`], so every machine here runs
//! unchanged against mock adapters on the host.

pub mod heartbeat;
pub mod link;
pub mod ports;

use heapless::String;
use log::info;

use crate::config::{LINE_MAX, NodeConfig};
use crate::error::Result;
use ports::{ConfigError, ConfigPort};

/// Payload carried by events in the node's engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodePayload {
    /// One line received from a [`LineSocket`](ports::LineSocket), CR/LF stripped.
    Line(String<LINE_MAX>),
    /// New baud rate for the modem link.
    Baud(u32),
}

impl NodePayload {
    /// The line text, if this payload carries one.
    pub fn as_line(&self) -> Option<&str> {
        match self {
            Self::Line(s) => Some(s.as_str()),
            Self::Baud(_) => None,
        }
    }
}

impl From<String<LINE_MAX>> for NodePayload {
    fn from(line: String<LINE_MAX>) -> Self {
        Self::Line(line)
    }
}

/// Load the stored config, writing defaults on first boot.
pub fn load_or_init_config(store: &mut impl ConfigPort) -> Result<NodeConfig> {
    match store.load() {
        Ok(config) => Ok(config),
        Err(ConfigError::NotFound) => {
            info!("No stored config, writing defaults");
            let config = NodeConfig::default();
            store.save(&config)?;
            Ok(config)
        }
        Err(e) => Err(e.into()),
    }
}

/// Apply a JSON provisioning document and persist it.  The stored config
/// is left untouched when the document is rejected.
pub fn provision_config(store: &mut impl ConfigPort, json: &[u8]) -> Result<NodeConfig> {
    let config = NodeConfig::from_json(json)?;
    store.save(&config)?;
    info!("Provisioned config for {}", config.link_device);
    Ok(config)
}
