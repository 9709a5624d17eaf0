//! Normalized machine state shared by the inventory and the reconciler.

use std::fmt;
use std::net::IpAddr;

use crate::error::{Result, SyncError};

/// Power state of a virtual machine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PowerState {
    #[default]
    Unknown,
    Running,
    Stopped,
    Deallocated,
    Starting,
    Stopping,
    Deallocating,
    /// Any state token the provider reports that we do not model.
    Other(String),
}

impl PowerState {
    /// Parse a canonical state token (`running`, `stopped`, ...).
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "" | "unknown" => PowerState::Unknown,
            "running" => PowerState::Running,
            "stopped" => PowerState::Stopped,
            "deallocated" => PowerState::Deallocated,
            "starting" => PowerState::Starting,
            "stopping" => PowerState::Stopping,
            "deallocating" => PowerState::Deallocating,
            other => PowerState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PowerState::Unknown => "unknown",
            PowerState::Running => "running",
            PowerState::Stopped => "stopped",
            PowerState::Deallocated => "deallocated",
            PowerState::Starting => "starting",
            PowerState::Stopping => "stopping",
            PowerState::Deallocating => "deallocating",
            PowerState::Other(token) => token,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, PowerState::Running)
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A machine as seen by one reconciliation run.
///
/// The address is present if and only if the machine is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineRecord {
    identifier: String,
    display_name: String,
    power_state: PowerState,
    network_address: Option<IpAddr>,
}

impl MachineRecord {
    /// A machine whose state has not been resolved yet.
    pub fn new(identifier: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            display_name: display_name.into(),
            power_state: PowerState::Unknown,
            network_address: None,
        }
    }

    /// Shorthand for a resolved running machine.
    pub fn running(
        identifier: impl Into<String>,
        display_name: impl Into<String>,
        address: IpAddr,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            display_name: display_name.into(),
            power_state: PowerState::Running,
            network_address: Some(address),
        }
    }

    /// Fix the power state and address of this record.
    ///
    /// A running state without an address fails; an address reported for a
    /// machine that is not running is dropped.
    pub fn resolve(mut self, state: PowerState, address: Option<IpAddr>) -> Result<Self> {
        if state.is_running() {
            let address = address.ok_or_else(|| SyncError::AddressResolution {
                machine: self.display_name.clone(),
                reason: "no public address assigned".to_string(),
            })?;
            self.network_address = Some(address);
        } else {
            self.network_address = None;
        }
        self.power_state = state;
        Ok(self)
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn power_state(&self) -> &PowerState {
        &self.power_state
    }

    pub fn network_address(&self) -> Option<IpAddr> {
        self.network_address
    }

    pub fn is_running(&self) -> bool {
        self.power_state.is_running()
    }
}
