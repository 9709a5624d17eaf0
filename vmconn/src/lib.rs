//! vmconn: keeps a Royal TSX document in line with the running Azure VMs.
//!
//! Each run lists the fleet, drops every connection in the owned folders of
//! the document and recreates one connection per running machine from the
//! document's template.

pub mod config;
pub mod document;
pub mod error;
pub mod inventory;
pub mod machine;
pub mod reconciler;

pub use config::{AzureSettings, SyncConfig, TargetFolders};
pub use document::{DocumentLayout, DocumentStore, ManagedDocument};
pub use error::{Result, SyncError};
pub use inventory::{AzureCli, FleetSession, Inventory};
pub use machine::{MachineRecord, PowerState};
pub use reconciler::{ReconcileReport, Reconciler, sync};
