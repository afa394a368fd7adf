//! File-backed provider
//!
//! Each resource is a JSON document at `<root>/<kind>/<physical id>.json`.

use super::validate::validate;
use chrono::{DateTime, Utc};
use declarative::{Attributes, Provider, ProviderError, ProviderOutput, ResourceKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// What the local provider keeps per resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalDocument {
    pub logical_id: String,
    pub kind: ResourceKind,
    pub physical_id: String,
    pub attributes: Attributes,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct LocalProvider {
    root: PathBuf,
    seq: AtomicU64,
}

impl LocalProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, kind: ResourceKind, physical_id: &str) -> PathBuf {
        self.root.join(kind.as_str()).join(format!("{physical_id}.json"))
    }

    /// New physical id: kind prefix plus 17 hex chars of a blake3 hash
    fn mint_id(&self, kind: ResourceKind, logical_id: &str) -> String {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();

        let mut hasher = blake3::Hasher::new();
        hasher.update(self.root.to_string_lossy().as_bytes());
        hasher.update(kind.as_str().as_bytes());
        hasher.update(logical_id.as_bytes());
        hasher.update(&nanos.to_le_bytes());
        hasher.update(&seq.to_le_bytes());
        let hex = hasher.finalize().to_hex();
        format!("{}-{}", kind.id_prefix(), &hex[..17])
    }

    fn outputs(kind: ResourceKind, doc: &LocalDocument) -> ProviderOutput {
        let mut out = ProviderOutput::new(&doc.physical_id).with_output(
            "arn",
            format!("arn:local:{}/{}", kind, doc.physical_id),
        );
        match kind {
            ResourceKind::Cluster => {
                out = out.with_output("endpoint", format!("https://{}.local", doc.physical_id));
            }
            ResourceKind::Network => {
                if let Some(cidr) = doc.attributes.get("cidr").and_then(|v| v.as_str()) {
                    out = out.with_output("cidr", cidr);
                }
            }
            _ => {}
        }
        out
    }

    fn load(&self, kind: ResourceKind, physical_id: &str) -> Result<Option<LocalDocument>, ProviderError> {
        let path = self.path_for(kind, physical_id);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, &e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| ProviderError::Rejected(format!("corrupt document {}: {e}", path.display())))
    }

    fn store(&self, doc: &LocalDocument) -> Result<(), ProviderError> {
        let path = self.path_for(doc.kind, &doc.physical_id);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| io_error(dir, &e))?;
        }
        let content = serde_json::to_string_pretty(doc)
            .map_err(|e| ProviderError::Rejected(e.to_string()))?;
        fs::write(&path, content).map_err(|e| io_error(&path, &e))
    }
}

fn io_error(path: &Path, e: &io::Error) -> ProviderError {
    let msg = format!("{}: {}", path.display(), e);
    match e.kind() {
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
            ProviderError::Transient(msg)
        }
        _ => ProviderError::Rejected(msg),
    }
}

fn not_found(kind: ResourceKind, physical_id: &str) -> ProviderError {
    ProviderError::NotFound {
        kind: kind.to_string(),
        physical_id: physical_id.to_string(),
    }
}

impl Provider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn create(
        &self,
        kind: ResourceKind,
        logical_id: &str,
        attributes: &Attributes,
    ) -> Result<ProviderOutput, ProviderError> {
        validate(kind, attributes).map_err(|e| ProviderError::Rejected(e.to_string()))?;

        let now = Utc::now();
        let doc = LocalDocument {
            logical_id: logical_id.to_string(),
            kind,
            physical_id: self.mint_id(kind, logical_id),
            attributes: attributes.clone(),
            created_at: now,
            updated_at: now,
        };
        self.store(&doc)?;
        log::debug!("Created {} {} as {}", kind, logical_id, doc.physical_id);
        Ok(Self::outputs(kind, &doc))
    }

    fn read(
        &self,
        kind: ResourceKind,
        physical_id: &str,
    ) -> Result<Option<ProviderOutput>, ProviderError> {
        Ok(self
            .load(kind, physical_id)?
            .map(|doc| Self::outputs(kind, &doc)))
    }

    fn update(
        &self,
        kind: ResourceKind,
        physical_id: &str,
        attributes: &Attributes,
    ) -> Result<ProviderOutput, ProviderError> {
        validate(kind, attributes).map_err(|e| ProviderError::Rejected(e.to_string()))?;

        let mut doc = self
            .load(kind, physical_id)?
            .ok_or_else(|| not_found(kind, physical_id))?;
        doc.attributes = attributes.clone();
        doc.updated_at = Utc::now();
        self.store(&doc)?;
        log::debug!("Updated {} {}", kind, physical_id);
        Ok(Self::outputs(kind, &doc))
    }

    fn delete(&self, kind: ResourceKind, physical_id: &str) -> Result<(), ProviderError> {
        let path = self.path_for(kind, physical_id);
        match fs::remove_file(&path) {
            Ok(()) => {
                log::debug!("Deleted {} {}", kind, physical_id);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(not_found(kind, physical_id)),
            Err(e) => Err(io_error(&path, &e)),
        }
    }
}
