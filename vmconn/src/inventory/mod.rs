//! Machine inventory.
//!
//! A [`FleetSession`] answers the three raw provider queries; [`Inventory`]
//! turns their answers into [`MachineRecord`]s:
//! 1. list every machine (id + name),
//! 2. resolve the power state of each machine,
//! 3. resolve the public address of running machines only.

pub mod azure;

use std::net::IpAddr;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::machine::{MachineRecord, PowerState};

pub use azure::AzureCli;

/// Prefix of the instance status code that carries the power state.
pub const POWER_STATE_PREFIX: &str = "PowerState/";

/// Entry of the bulk machine listing.
#[derive(Debug, Clone, Deserialize)]
pub struct VmSummary {
    pub id: String,
    pub name: String,
}

/// Instance view of a single machine.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceView {
    #[serde(default)]
    pub instance_view: InstanceViewStatuses,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstanceViewStatuses {
    #[serde(default)]
    pub statuses: Vec<InstanceStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstanceStatus {
    pub code: String,
}

impl InstanceView {
    /// Power state carried by the first `PowerState/` status, `Unknown` if none.
    pub fn power_state(&self) -> PowerState {
        self.instance_view
            .statuses
            .iter()
            .find_map(|status| status.code.strip_prefix(POWER_STATE_PREFIX))
            .map(PowerState::from_token)
            .unwrap_or_default()
    }
}

/// One entry of the address listing of a machine.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmAddresses {
    pub virtual_machine: VmNetworkView,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VmNetworkView {
    #[serde(default)]
    pub network: VmNetwork,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmNetwork {
    #[serde(default)]
    pub public_ip_addresses: Vec<PublicIpAddress>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicIpAddress {
    #[serde(default)]
    pub ip_address: Option<String>,
}

/// Pick the first public address of the first listing entry.
///
/// Any further addresses are ignored.
pub fn first_public_address(machine: &str, listing: &[VmAddresses]) -> Result<IpAddr> {
    let raw = listing
        .first()
        .and_then(|entry| entry.virtual_machine.network.public_ip_addresses.first())
        .and_then(|public| public.ip_address.as_deref())
        .ok_or_else(|| SyncError::AddressResolution {
            machine: machine.to_string(),
            reason: "no public address assigned".to_string(),
        })?;

    raw.trim()
        .parse()
        .map_err(|e| SyncError::AddressResolution {
            machine: machine.to_string(),
            reason: format!("invalid address '{}': {}", raw, e),
        })
}

/// Authenticated access to the fleet-management service.
#[async_trait]
pub trait FleetSession: Send + Sync {
    /// List every machine regardless of state.
    async fn list_vms(&self) -> Result<Vec<VmSummary>>;

    /// Describe the instance view of one machine.
    async fn instance_view(&self, id: &str) -> Result<InstanceView>;

    /// List the network addresses of one machine.
    async fn ip_addresses(&self, id: &str) -> Result<Vec<VmAddresses>>;
}

/// Produces normalized machine records from a fleet session.
pub struct Inventory<S> {
    session: S,
}

impl<S: FleetSession> Inventory<S> {
    pub fn new(session: S) -> Self {
        Self { session }
    }

    /// List all machines with resolved state and address.
    ///
    /// Order follows the provider's listing.
    pub async fn list_machines(&self) -> Result<Vec<MachineRecord>> {
        let summaries = self.session.list_vms().await?;
        info!(count = summaries.len(), "Listed machines");

        let mut machines = Vec::with_capacity(summaries.len());
        for summary in summaries {
            machines.push(self.resolve(summary).await?);
        }
        Ok(machines)
    }

    async fn resolve(&self, summary: VmSummary) -> Result<MachineRecord> {
        let record = MachineRecord::new(summary.id, summary.name);

        let state = self
            .session
            .instance_view(record.identifier())
            .await?
            .power_state();
        debug!(machine = %record.display_name(), state = %state, "Resolved power state");

        let address = if state.is_running() {
            let listing = self.session.ip_addresses(record.identifier()).await?;
            let address = first_public_address(record.display_name(), &listing)?;
            debug!(machine = %record.display_name(), address = %address, "Resolved address");
            Some(address)
        } else {
            None
        };

        record.resolve(state, address)
    }
}
