//! Reconciler - rewrites the owned folders of the document from the fleet.
//!
//! Every run deletes all connections in the owned folders and regenerates
//! one entry per running machine from the template. Nothing is carried over
//! between runs.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::config::{SyncConfig, TargetFolders};
use crate::document::{DocumentStore, Folder, ManagedDocument};
use crate::error::Result;
use crate::inventory::{FleetSession, Inventory};
use crate::machine::MachineRecord;

/// Connection created by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedEntry {
    pub id: String,
    pub name: String,
    pub folder: String,
    pub address: String,
}

/// Machine that produced no entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedMachine {
    pub name: String,
    pub state: String,
}

/// Outcome of a reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Owned connections deleted before regeneration.
    pub removed: usize,
    pub added: Vec<GeneratedEntry>,
    pub skipped: Vec<SkippedMachine>,
    /// Whether the secondary folder was found and populated.
    pub secondary_active: bool,
    pub persisted: bool,
}

/// Rewrites the owned folders of one document.
pub struct Reconciler {
    store: DocumentStore,
    targets: TargetFolders,
    dry_run: bool,
}

impl Reconciler {
    pub fn new(store: DocumentStore, targets: TargetFolders) -> Self {
        Self {
            store,
            targets,
            dry_run: false,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        let store = DocumentStore::new(&config.document_path, config.layout.clone())
            .require_folder(config.targets.primary.clone());
        Self::new(store, config.targets.clone()).dry_run(config.dry_run)
    }

    /// Skip the final persist.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Load the document, reconcile it against `machines` and persist it.
    pub fn run(&self, machines: &[MachineRecord]) -> Result<ReconcileReport> {
        let mut document = self.store.load()?;
        self.reconcile(&mut document, machines)
    }

    /// Reconcile `document` against `machines` and persist it.
    ///
    /// Nothing reaches the disk unless the whole in-memory rewrite succeeded.
    pub fn reconcile(
        &self,
        document: &mut ManagedDocument,
        machines: &[MachineRecord],
    ) -> Result<ReconcileReport> {
        let mut report = self.apply(document, machines)?;

        if self.dry_run {
            info!(path = %self.store.path().display(), "Dry run, document not written");
        } else {
            self.store.persist(document)?;
            report.persisted = true;
        }
        Ok(report)
    }

    /// Rewrite the owned folders in memory.
    ///
    /// Folder resolution happens before any mutation, so a missing primary
    /// folder leaves the document untouched.
    pub fn apply(
        &self,
        document: &mut ManagedDocument,
        machines: &[MachineRecord],
    ) -> Result<ReconcileReport> {
        let primary = document.find_folder(&self.targets.primary)?;
        let secondary = self.resolve_secondary(document);

        let mut owned: HashSet<String> = HashSet::new();
        owned.insert(primary.id.clone());
        if let Some(folder) = &secondary {
            owned.insert(folder.id.clone());
        }

        let mut report = ReconcileReport {
            removed: document.delete_owned(&owned),
            secondary_active: secondary.is_some(),
            ..Default::default()
        };

        for machine in machines {
            if !machine.is_running() {
                warn!(
                    machine = %machine.display_name(),
                    state = %machine.power_state(),
                    "Skipping machine that is not running"
                );
                report.skipped.push(SkippedMachine {
                    name: machine.display_name().to_string(),
                    state: machine.power_state().to_string(),
                });
                continue;
            }

            report
                .added
                .push(self.add_entry(document, &primary, machine, None)?);

            if let Some(folder) = &secondary {
                let marker = self.targets.sidedoor_marker.as_str();
                report
                    .added
                    .push(self.add_entry(document, folder, machine, Some(marker))?);
            }
        }

        info!(
            removed = report.removed,
            added = report.added.len(),
            skipped = report.skipped.len(),
            "Reconciled connections"
        );
        Ok(report)
    }

    fn resolve_secondary(&self, document: &ManagedDocument) -> Option<Folder> {
        let name = self.targets.secondary.as_deref()?;
        match document.find_folder(name) {
            Ok(folder) => Some(folder),
            Err(_) => {
                debug!(folder = %name, "No secondary folder in document");
                None
            }
        }
    }

    fn add_entry(
        &self,
        document: &mut ManagedDocument,
        folder: &Folder,
        machine: &MachineRecord,
        address_override: Option<&str>,
    ) -> Result<GeneratedEntry> {
        let (id, address) = document.add_connection(&folder.id, machine, address_override)?;
        debug!(machine = %machine.display_name(), folder = %folder.name, address = %address, "Added connection");
        Ok(GeneratedEntry {
            id,
            name: machine.display_name().to_string(),
            folder: folder.name.clone(),
            address,
        })
    }
}

/// Query the fleet through `session` and reconcile the configured document.
///
/// The inventory is resolved completely before the document is opened, so
/// provider failures never touch the file.
pub async fn sync<S: FleetSession>(session: S, config: &SyncConfig) -> Result<ReconcileReport> {
    let machines = Inventory::new(session).list_machines().await?;
    let running = machines.iter().filter(|m| m.is_running()).count();
    if running == 0 {
        warn!("No running machines, owned folders will be emptied");
    }
    info!(total = machines.len(), running, "Inventory resolved");

    Reconciler::from_config(config).run(&machines)
}
