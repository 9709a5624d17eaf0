use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vmconn::{AzureCli, AzureSettings, DocumentLayout, SyncConfig, TargetFolders};

#[derive(Parser, Debug)]
#[command(name = "vmconn", version)]
#[command(about = "Sync Royal TSX connections with the running Azure VMs")]
struct Args {
    /// Royal TSX document to reconcile (rewritten in place)
    #[arg(env = "VMCONN_DOCUMENT")]
    document: PathBuf,

    /// Azure CLI executable
    #[arg(long, env = "VMCONN_AZ", default_value = "az")]
    az: String,

    /// Azure subscription to query
    #[arg(long, env = "VMCONN_SUBSCRIPTION")]
    subscription: Option<String>,

    /// Only list machines of this resource group
    #[arg(long, env = "VMCONN_RESOURCE_GROUP")]
    resource_group: Option<String>,

    /// Folder receiving one connection per running machine
    #[arg(long, default_value = "Connections")]
    primary_folder: String,

    /// Folder receiving a side-door connection per running machine, if present
    #[arg(long, default_value = "Sidedoor")]
    secondary_folder: String,

    /// Do not generate side-door connections
    #[arg(long)]
    no_secondary: bool,

    /// Address written into side-door connections
    #[arg(long, default_value = "Sidedoor")]
    sidedoor_marker: String,

    /// Element tag of folders
    #[arg(long, default_value = "RoyalFolder")]
    folder_tag: String,

    /// Element tag of managed connections
    #[arg(long, default_value = "RoyalSSHConnection")]
    connection_tag: String,

    /// Connection field holding the machine address
    #[arg(long, default_value = "CustomField1")]
    address_field: String,

    /// Name of the template connection
    #[arg(long, default_value = "Stencil")]
    template: String,

    /// Reconcile in memory only, do not write the document
    #[arg(long)]
    dry_run: bool,
}

impl From<Args> for SyncConfig {
    fn from(args: Args) -> Self {
        SyncConfig {
            document_path: args.document,
            layout: DocumentLayout {
                folder_tag: args.folder_tag,
                connection_tag: args.connection_tag,
                address_field: args.address_field,
                template_name: args.template,
            },
            targets: TargetFolders {
                primary: args.primary_folder,
                secondary: (!args.no_secondary).then_some(args.secondary_folder),
                sidedoor_marker: args.sidedoor_marker,
            },
            azure: AzureSettings {
                program: args.az,
                subscription: args.subscription,
                resource_group: args.resource_group,
            },
            dry_run: args.dry_run,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vmconn=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = SyncConfig::from(Args::parse());
    info!(document = %config.document_path.display(), "Starting vmconn");

    let session = AzureCli::new(config.azure.clone());
    let report = vmconn::sync(session, &config).await?;

    for entry in &report.added {
        info!(name = %entry.name, folder = %entry.folder, address = %entry.address, "Connection");
    }
    info!(
        removed = report.removed,
        added = report.added.len(),
        skipped = report.skipped.len(),
        persisted = report.persisted,
        "Done"
    );

    Ok(())
}
