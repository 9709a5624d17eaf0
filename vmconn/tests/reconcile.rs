//! End-to-end reconciliation runs against a document on disk.
//!
//! The fleet is an in-memory session answering with the same JSON shapes
//! the Azure CLI produces.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::json;

use vmconn::document::Connection;
use vmconn::inventory::{InstanceView, VmAddresses, VmSummary};
use vmconn::{DocumentLayout, DocumentStore, FleetSession, SyncConfig, SyncError};

const DOCUMENT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<RoyalDocument>
  <RoyalFolder>
    <Name>Connections</Name>
    <ID>F1</ID>
  </RoyalFolder>
  <RoyalFolder>
    <Name>Sidedoor</Name>
    <ID>F2</ID>
  </RoyalFolder>
  <RoyalFolder>
    <Name>Templates</Name>
    <ID>F9</ID>
  </RoyalFolder>
  <RoyalSSHConnection>
    <Name>Stencil</Name>
    <ID>T1</ID>
    <ParentID>F9</ParentID>
    <CustomField1 />
    <Port>2222</Port>
  </RoyalSSHConnection>
  <RoyalSSHConnection>
    <Name>gone</Name>
    <ID>C1</ID>
    <ParentID>F1</ParentID>
    <CustomField1>10.1.1.1</CustomField1>
  </RoyalSSHConnection>
  <RoyalSSHConnection>
    <Name>gone</Name>
    <ID>C2</ID>
    <ParentID>F2</ParentID>
    <CustomField1>Sidedoor</CustomField1>
  </RoyalSSHConnection>
  <RoyalSSHConnection>
    <Name>router</Name>
    <ID>C3</ID>
    <ParentID>F9</ParentID>
    <CustomField1>192.168.0.1</CustomField1>
  </RoyalSSHConnection>
</RoyalDocument>
"#;

#[derive(Default)]
struct Fleet {
    vms: Vec<VmSummary>,
    views: HashMap<String, InstanceView>,
    addresses: HashMap<String, Vec<VmAddresses>>,
    broken: Option<SyncErrorKind>,
}

#[derive(Clone, Copy)]
enum SyncErrorKind {
    Expired,
    Failed,
}

impl Fleet {
    fn vm(mut self, name: &str, state: &str, public: &[&str]) -> Self {
        let id = format!("/subscriptions/s/resourceGroups/rg/providers/vm/{}", name);
        self.vms.push(
            serde_json::from_value(json!({ "id": id, "name": name, "location": "westeurope" }))
                .unwrap(),
        );
        self.views.insert(
            id.clone(),
            serde_json::from_value(json!({
                "name": name,
                "instanceView": { "statuses": [
                    { "code": "ProvisioningState/succeeded" },
                    { "code": format!("PowerState/{}", state) }
                ]}
            }))
            .unwrap(),
        );
        let public: Vec<_> = public.iter().map(|ip| json!({ "ipAddress": ip })).collect();
        self.addresses.insert(
            id,
            serde_json::from_value(json!([{
                "virtualMachine": {
                    "name": name,
                    "network": {
                        "privateIpAddresses": ["10.0.0.4"],
                        "publicIpAddresses": public
                    }
                }
            }]))
            .unwrap(),
        );
        self
    }
}

#[async_trait]
impl FleetSession for Fleet {
    async fn list_vms(&self) -> vmconn::Result<Vec<VmSummary>> {
        match self.broken {
            Some(SyncErrorKind::Expired) => Err(SyncError::ProviderUnavailable(
                "not logged in".to_string(),
            )),
            Some(SyncErrorKind::Failed) => Err(SyncError::ProviderError("boom".to_string())),
            None => Ok(self.vms.clone()),
        }
    }

    async fn instance_view(&self, id: &str) -> vmconn::Result<InstanceView> {
        Ok(self.views[id].clone())
    }

    async fn ip_addresses(&self, id: &str) -> vmconn::Result<Vec<VmAddresses>> {
        Ok(self.addresses[id].clone())
    }
}

fn setup(xml: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fleet.rtsz");
    std::fs::write(&path, xml).unwrap();
    (dir, path)
}

fn connections(path: &Path) -> Vec<Connection> {
    DocumentStore::new(path, DocumentLayout::default())
        .load()
        .unwrap()
        .connections()
}

fn owned(path: &Path, folder_id: &str) -> Vec<(String, String)> {
    let mut entries: Vec<_> = connections(path)
        .into_iter()
        .filter(|c| c.parent_id.as_deref() == Some(folder_id))
        .map(|c| (c.name.unwrap_or_default(), c.address.unwrap_or_default()))
        .collect();
    entries.sort();
    entries
}

fn fleet() -> Fleet {
    Fleet::default()
        .vm("web1", "running", &["10.0.0.5"])
        .vm("web2", "stopped", &[])
        .vm("db1", "running", &["20.1.1.1", "20.2.2.2"])
        .vm("batch", "deallocated", &[])
}

#[tokio::test]
async fn test_sync_rewrites_owned_folders() {
    let (_dir, path) = setup(DOCUMENT);
    let report = vmconn::sync(fleet(), &SyncConfig::new(&path)).await.unwrap();

    assert!(report.persisted);
    assert_eq!(report.removed, 2);
    assert_eq!(report.skipped.len(), 2);

    assert_eq!(
        owned(&path, "F1"),
        [
            ("db1".to_string(), "20.1.1.1".to_string()),
            ("web1".to_string(), "10.0.0.5".to_string()),
        ]
    );
    assert_eq!(
        owned(&path, "F2"),
        [
            ("db1".to_string(), "Sidedoor".to_string()),
            ("web1".to_string(), "Sidedoor".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_sync_is_idempotent() {
    let (_dir, path) = setup(DOCUMENT);
    let config = SyncConfig::new(&path);

    vmconn::sync(fleet(), &config).await.unwrap();
    let first = (owned(&path, "F1"), owned(&path, "F2"));
    let first_ids: Vec<_> = connections(&path).into_iter().filter_map(|c| c.id).collect();

    vmconn::sync(fleet(), &config).await.unwrap();
    let second = (owned(&path, "F1"), owned(&path, "F2"));
    let second_ids: Vec<_> = connections(&path).into_iter().filter_map(|c| c.id).collect();

    assert_eq!(first, second);
    // generated ids are fresh every run, fixed ones stay
    assert_ne!(first_ids, second_ids);
    assert!(second_ids.contains(&"T1".to_string()));
    assert!(second_ids.contains(&"C3".to_string()));
}

#[tokio::test]
async fn test_sync_preserves_unowned_and_template() {
    let (_dir, path) = setup(DOCUMENT);
    let unowned = |path: &Path| -> Vec<Connection> {
        connections(path)
            .into_iter()
            .filter(|c| c.parent_id.as_deref() == Some("F9"))
            .collect()
    };
    let before = unowned(&path);

    vmconn::sync(fleet(), &SyncConfig::new(&path)).await.unwrap();

    assert_eq!(unowned(&path), before);
    let xml = std::fs::read_to_string(&path).unwrap();
    // template fields are cloned into every generated entry
    assert_eq!(xml.matches("<Port>2222</Port>").count(), 5);
}

#[tokio::test]
async fn test_sync_provider_failure_leaves_document() {
    for kind in [SyncErrorKind::Expired, SyncErrorKind::Failed] {
        let (_dir, path) = setup(DOCUMENT);
        let fleet = Fleet {
            broken: Some(kind),
            ..Default::default()
        };
        let err = vmconn::sync(fleet, &SyncConfig::new(&path)).await.unwrap_err();
        match kind {
            SyncErrorKind::Expired => assert!(matches!(err, SyncError::ProviderUnavailable(_))),
            SyncErrorKind::Failed => assert!(matches!(err, SyncError::ProviderError(_))),
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), DOCUMENT);
    }
}

#[tokio::test]
async fn test_sync_running_without_address_aborts() {
    let (_dir, path) = setup(DOCUMENT);
    let fleet = fleet().vm("web3", "running", &[]);
    let err = vmconn::sync(fleet, &SyncConfig::new(&path)).await.unwrap_err();
    assert!(matches!(err, SyncError::AddressResolution { ref machine, .. } if machine == "web3"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), DOCUMENT);
}

#[tokio::test]
async fn test_sync_missing_primary_folder() {
    let xml = DOCUMENT.replace("<Name>Connections</Name>", "<Name>Hosts</Name>");
    let (_dir, path) = setup(&xml);
    let err = vmconn::sync(fleet(), &SyncConfig::new(&path)).await.unwrap_err();
    assert!(matches!(err, SyncError::FolderMissing(ref name) if name == "Connections"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), xml);
}

#[tokio::test]
async fn test_sync_missing_document() {
    let dir = tempfile::tempdir().unwrap();
    let config = SyncConfig::new(dir.path().join("absent.rtsz"));
    let err = vmconn::sync(fleet(), &config).await.unwrap_err();
    assert!(matches!(err, SyncError::DocumentNotFound(_)));
}

#[tokio::test]
async fn test_sync_dry_run() {
    let (_dir, path) = setup(DOCUMENT);
    let mut config = SyncConfig::new(&path);
    config.dry_run = true;

    let report = vmconn::sync(fleet(), &config).await.unwrap();
    assert!(!report.persisted);
    assert_eq!(report.added.len(), 4);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), DOCUMENT);
}

#[tokio::test]
async fn test_sync_without_secondary() {
    let (_dir, path) = setup(DOCUMENT);
    let mut config = SyncConfig::new(&path);
    config.targets.secondary = None;

    let report = vmconn::sync(fleet(), &config).await.unwrap();
    assert!(!report.secondary_active);
    assert_eq!(owned(&path, "F1").len(), 2);
    assert_eq!(
        owned(&path, "F2"),
        [("gone".to_string(), "Sidedoor".to_string())]
    );
}
