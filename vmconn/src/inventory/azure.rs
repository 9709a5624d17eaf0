//! Azure fleet session backed by the `az` command line tool.
//!
//! The CLI keeps its own login state; this session only shells out and
//! classifies the answers.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{FleetSession, InstanceView, VmAddresses, VmSummary};
use crate::config::AzureSettings;
use crate::error::{Result, SyncError};

/// Output fragments that mean the login session is gone.
const SESSION_MARKERS: &[&str] = &[
    "Credentials have expired due to inactivity",
    "Please run 'az login'",
];

/// Session that runs `az vm ...` commands.
pub struct AzureCli {
    settings: AzureSettings,
}

impl AzureCli {
    pub fn new(settings: AzureSettings) -> Self {
        Self { settings }
    }

    /// Arguments appended to every call.
    fn scope_args(&self) -> Vec<String> {
        match &self.settings.subscription {
            Some(subscription) => vec!["--subscription".to_string(), subscription.clone()],
            None => Vec::new(),
        }
    }

    async fn run_json<T: DeserializeOwned>(&self, mut args: Vec<String>) -> Result<T> {
        args.extend(self.scope_args());
        args.extend(["--output".to_string(), "json".to_string()]);

        debug!(program = %self.settings.program, args = ?args, "Running provider query");

        let output = Command::new(&self.settings.program)
            .args(&args)
            .output()
            .await
            .map_err(|e| {
                SyncError::ProviderError(format!(
                    "failed to run {}: {}",
                    self.settings.program, e
                ))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        classify(output.status.success(), &stdout, &stderr)?;
        if !stderr.trim().is_empty() {
            warn!(stderr = %stderr.trim(), "Provider query wrote to stderr");
        }

        serde_json::from_str(&stdout).map_err(|e| {
            SyncError::ProviderError(format!(
                "unexpected output of 'az {}': {}",
                args[..2].join(" "),
                e
            ))
        })
    }
}

/// Map a finished provider call onto the error taxonomy.
fn classify(success: bool, stdout: &str, stderr: &str) -> Result<()> {
    let expired = SESSION_MARKERS
        .iter()
        .any(|marker| stdout.contains(marker) || stderr.contains(marker));
    if expired {
        return Err(SyncError::ProviderUnavailable(
            "not logged in, run `az login`".to_string(),
        ));
    }
    if !success {
        return Err(SyncError::ProviderError(stderr.trim().to_string()));
    }
    Ok(())
}

#[async_trait]
impl FleetSession for AzureCli {
    async fn list_vms(&self) -> Result<Vec<VmSummary>> {
        let mut args = vec!["vm".to_string(), "list".to_string()];
        if let Some(group) = &self.settings.resource_group {
            args.extend(["--resource-group".to_string(), group.clone()]);
        }
        self.run_json(args).await
    }

    async fn instance_view(&self, id: &str) -> Result<InstanceView> {
        self.run_json(vec![
            "vm".to_string(),
            "get-instance-view".to_string(),
            "--ids".to_string(),
            id.to_string(),
        ])
        .await
    }

    async fn ip_addresses(&self, id: &str) -> Result<Vec<VmAddresses>> {
        self.run_json(vec![
            "vm".to_string(),
            "list-ip-addresses".to_string(),
            "--ids".to_string(),
            id.to_string(),
        ])
        .await
    }
}
