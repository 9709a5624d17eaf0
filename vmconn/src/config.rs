//! Run configuration.
//!
//! Built by the binary from its command line; the library never reads
//! ambient state on its own.

use std::path::PathBuf;

use crate::document::DocumentLayout;

/// Provider settings for the Azure CLI session.
#[derive(Debug, Clone)]
pub struct AzureSettings {
    /// Path or name of the `az` executable.
    pub program: String,
    pub subscription: Option<String>,
    /// Only list machines of this resource group.
    pub resource_group: Option<String>,
}

impl Default for AzureSettings {
    fn default() -> Self {
        Self {
            program: "az".to_string(),
            subscription: None,
            resource_group: None,
        }
    }
}

/// Folders the reconciler owns.
#[derive(Debug, Clone)]
pub struct TargetFolders {
    /// Required folder receiving one entry per running machine.
    pub primary: String,
    /// Optional folder receiving a parallel entry, if the document has it.
    pub secondary: Option<String>,
    /// Address written into secondary entries in place of the real one.
    pub sidedoor_marker: String,
}

impl Default for TargetFolders {
    fn default() -> Self {
        Self {
            primary: "Connections".to_string(),
            secondary: Some("Sidedoor".to_string()),
            sidedoor_marker: "Sidedoor".to_string(),
        }
    }
}

/// Everything one reconciliation run needs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub document_path: PathBuf,
    pub layout: DocumentLayout,
    pub targets: TargetFolders,
    pub azure: AzureSettings,
    /// Compute the new document but do not write it.
    pub dry_run: bool,
}

impl SyncConfig {
    pub fn new(document_path: impl Into<PathBuf>) -> Self {
        Self {
            document_path: document_path.into(),
            layout: DocumentLayout::default(),
            targets: TargetFolders::default(),
            azure: AzureSettings::default(),
            dry_run: false,
        }
    }
}
