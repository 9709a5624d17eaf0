//! Connection-manager document.
//!
//! The document is a Royal TSX XML file. The direct children of its root are
//! folders and connections; everything else is carried through untouched.

pub mod node;
pub mod store;

use std::collections::HashSet;
use std::io::{Read, Write};

use tracing::debug;
use uuid::Uuid;
use xmltree::{Element, EmitterConfig, XMLNode};

use crate::error::{Result, SyncError};
use crate::machine::MachineRecord;

pub use store::DocumentStore;

const NAME_FIELD: &str = "Name";
const ID_FIELD: &str = "ID";
const PARENT_ID_FIELD: &str = "ParentID";

/// Tags and field names used to interpret the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLayout {
    pub folder_tag: String,
    pub connection_tag: String,
    /// Connection field holding the machine address.
    pub address_field: String,
    /// Name of the connection cloned for every generated entry.
    pub template_name: String,
}

impl Default for DocumentLayout {
    fn default() -> Self {
        Self {
            folder_tag: "RoyalFolder".to_string(),
            connection_tag: "RoyalSSHConnection".to_string(),
            address_field: "CustomField1".to_string(),
            template_name: "Stencil".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub name: String,
    pub id: String,
}

/// Read-only view of a connection node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub name: Option<String>,
    pub id: Option<String>,
    pub parent_id: Option<String>,
    pub address: Option<String>,
}

/// In-memory document tree.
#[derive(Debug, Clone)]
pub struct ManagedDocument {
    /// Comments and processing instructions before the root element.
    prolog: Vec<XMLNode>,
    root: Element,
    /// Same, after the root element.
    epilog: Vec<XMLNode>,
    layout: DocumentLayout,
}

impl ManagedDocument {
    /// Parse and validate a document.
    ///
    /// Every folder needs a name and an id, and exactly one connection must
    /// be named after the template.
    pub fn parse<R: Read>(reader: R, layout: DocumentLayout) -> Result<Self> {
        let nodes =
            Element::parse_all(reader).map_err(|e| SyncError::DocumentMalformed(e.to_string()))?;

        let mut prolog = Vec::new();
        let mut epilog = Vec::new();
        let mut root = None;
        for node in nodes {
            match node {
                XMLNode::Element(el) if root.is_none() => root = Some(el),
                XMLNode::Element(el) => {
                    return Err(SyncError::DocumentMalformed(format!(
                        "unexpected second root element <{}>",
                        el.name
                    )));
                }
                other if root.is_none() => prolog.push(other),
                other => epilog.push(other),
            }
        }
        let root =
            root.ok_or_else(|| SyncError::DocumentMalformed("no root element".to_string()))?;

        let document = Self {
            prolog,
            root,
            epilog,
            layout,
        };
        document.validate()?;
        Ok(document)
    }

    fn validate(&self) -> Result<()> {
        for folder in node::children_tagged(&self.root, &self.layout.folder_tag) {
            if node::field(folder, NAME_FIELD).is_none() || node::field(folder, ID_FIELD).is_none()
            {
                return Err(SyncError::DocumentMalformed(format!(
                    "{} without {} or {}",
                    self.layout.folder_tag, NAME_FIELD, ID_FIELD
                )));
            }
        }

        match self.templates().count() {
            1 => Ok(()),
            0 => Err(SyncError::DocumentMalformed(format!(
                "no '{}' template connection",
                self.layout.template_name
            ))),
            n => Err(SyncError::DocumentMalformed(format!(
                "{} connections named '{}', expected exactly one",
                n, self.layout.template_name
            ))),
        }
    }

    fn is_template(&self, el: &Element) -> bool {
        el.name == self.layout.connection_tag
            && node::field(el, NAME_FIELD).as_deref() == Some(self.layout.template_name.as_str())
    }

    fn templates(&self) -> impl Iterator<Item = &Element> {
        node::children_tagged(&self.root, &self.layout.connection_tag)
            .filter(move |el| self.is_template(el))
    }

    pub fn folders(&self) -> Vec<Folder> {
        node::children_tagged(&self.root, &self.layout.folder_tag)
            .filter_map(|el| {
                Some(Folder {
                    name: node::field(el, NAME_FIELD)?,
                    id: node::field(el, ID_FIELD)?,
                })
            })
            .collect()
    }

    /// First folder with the given name.
    pub fn find_folder(&self, name: &str) -> Result<Folder> {
        self.folders()
            .into_iter()
            .find(|folder| folder.name == name)
            .ok_or_else(|| SyncError::FolderMissing(name.to_string()))
    }

    /// All connection nodes in document order, template included.
    pub fn connections(&self) -> Vec<Connection> {
        node::children_tagged(&self.root, &self.layout.connection_tag)
            .map(|el| self.view(el))
            .collect()
    }

    pub fn template(&self) -> Option<Connection> {
        self.templates().next().map(|el| self.view(el))
    }

    fn view(&self, el: &Element) -> Connection {
        Connection {
            name: node::field(el, NAME_FIELD),
            id: node::field(el, ID_FIELD),
            parent_id: node::field(el, PARENT_ID_FIELD),
            address: node::field(el, &self.layout.address_field),
        }
    }

    /// Remove every connection parented under one of `folder_ids`.
    ///
    /// The template is never removed. Returns the number of removed nodes.
    pub fn delete_owned(&mut self, folder_ids: &HashSet<String>) -> usize {
        let before = self.root.children.len();
        let layout = &self.layout;
        self.root.children.retain(|child| {
            let Some(el) = child.as_element() else {
                return true;
            };
            if el.name != layout.connection_tag {
                return true;
            }
            let is_template =
                node::field(el, NAME_FIELD).as_deref() == Some(layout.template_name.as_str());
            let owned = node::field(el, PARENT_ID_FIELD)
                .is_some_and(|parent| folder_ids.contains(&parent));
            is_template || !owned
        });
        let removed = before - self.root.children.len();
        debug!(removed, "Deleted owned connections");
        removed
    }

    /// Clone the template into a new connection for `record` under `folder_id`.
    ///
    /// The address is `address_override` if given, otherwise the machine's
    /// address. Returns the generated id and the address that was written.
    pub fn add_connection(
        &mut self,
        folder_id: &str,
        record: &MachineRecord,
        address_override: Option<&str>,
    ) -> Result<(String, String)> {
        let address = match address_override {
            Some(address) => address.to_string(),
            None => record
                .network_address()
                .map(|ip| ip.to_string())
                .ok_or_else(|| SyncError::AddressResolution {
                    machine: record.display_name().to_string(),
                    reason: format!("machine is {}", record.power_state()),
                })?,
        };

        let mut entry = self.templates().next().cloned().ok_or_else(|| {
            SyncError::DocumentMalformed("template connection vanished".to_string())
        })?;

        let id = Uuid::new_v4().to_string();
        node::set_field(&mut entry, NAME_FIELD, record.display_name());
        node::set_field(&mut entry, &self.layout.address_field, &address);
        node::set_field(&mut entry, ID_FIELD, &id);
        node::set_field(&mut entry, PARENT_ID_FIELD, folder_id);

        self.root.children.push(XMLNode::Element(entry));
        Ok((id, address))
    }

    /// Serialize the full tree, including nodes around the root element.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        write_top_level(&mut buf, &self.prolog).map_err(serialize_error)?;
        self.root
            .write_with_config(
                &mut buf,
                EmitterConfig::new()
                    .perform_indent(true)
                    .write_document_declaration(false),
            )
            .map_err(serialize_error)?;
        buf.push(b'\n');
        write_top_level(&mut buf, &self.epilog).map_err(serialize_error)?;
        Ok(buf)
    }
}

fn serialize_error(e: impl std::fmt::Display) -> SyncError {
    SyncError::DocumentMalformed(format!("cannot serialize document: {}", e))
}

/// Write comments and processing instructions that sit beside the root.
fn write_top_level(out: &mut Vec<u8>, nodes: &[XMLNode]) -> std::io::Result<()> {
    for node in nodes {
        match node {
            XMLNode::Comment(text) => writeln!(out, "<!--{}-->", text)?,
            XMLNode::ProcessingInstruction(name, Some(data)) => {
                writeln!(out, "<?{} {}?>", name, data)?
            }
            XMLNode::ProcessingInstruction(name, None) => writeln!(out, "<?{}?>", name)?,
            _ => {}
        }
    }
    Ok(())
}
