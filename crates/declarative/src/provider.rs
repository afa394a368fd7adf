//! Provider capability interface
//!
//! The executor never talks to a target system directly. Everything
//! provider-specific sits behind [`Provider`]: one create/read/update/delete
//! call per resource kind. Attributes handed to a provider have every token
//! already resolved.

use crate::error::ProviderError;
use crate::types::{Attributes, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// What a provider reports about a materialized resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderOutput {
    /// Provider-assigned identifier
    pub physical_id: String,
    /// Named outputs other resources can reference as `${ref:ID:NAME}`
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

impl ProviderOutput {
    pub fn new(physical_id: impl Into<String>) -> Self {
        Self {
            physical_id: physical_id.into(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn with_output(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.outputs.insert(name.into(), value.into());
        self
    }
}

/// Create/read/update/delete against a target system
///
/// Implementations must be safe to call from several threads at once;
/// the executor applies independent resources in parallel.
pub trait Provider: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Materialize a new resource
    fn create(
        &self,
        kind: ResourceKind,
        logical_id: &str,
        attributes: &Attributes,
    ) -> Result<ProviderOutput, ProviderError>;

    /// Look up a resource; `Ok(None)` when it no longer exists
    fn read(
        &self,
        kind: ResourceKind,
        physical_id: &str,
    ) -> Result<Option<ProviderOutput>, ProviderError>;

    /// Change an existing resource in place
    fn update(
        &self,
        kind: ResourceKind,
        physical_id: &str,
        attributes: &Attributes,
    ) -> Result<ProviderOutput, ProviderError>;

    /// Remove a resource
    fn delete(&self, kind: ResourceKind, physical_id: &str) -> Result<(), ProviderError>;
}

/// One scripted failure for [`MemoryProvider`]
#[derive(Debug, Clone)]
struct Fault {
    op: &'static str,
    logical_id: String,
    error: ProviderError,
    remaining: u32,
}

/// A resource held by [`MemoryProvider`]
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRecord {
    pub kind: ResourceKind,
    pub logical_id: String,
    pub attributes: Attributes,
}

/// Thread-safe in-memory provider
///
/// Useful as a dry target and in tests. Failures can be scripted per
/// operation and logical id.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    records: Mutex<HashMap<String, MemoryRecord>>,
    faults: Mutex<Vec<Fault>>,
    calls: Mutex<Vec<String>>,
    counter: AtomicU64,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` calls of `op` ("create", "update", "delete")
    /// on `logical_id` fail with `error`
    pub fn fail_on(&self, op: &'static str, logical_id: &str, error: ProviderError, times: u32) {
        lock(&self.faults).push(Fault {
            op,
            logical_id: logical_id.to_string(),
            error,
            remaining: times,
        });
    }

    /// Every call made so far, as "op logical_id"
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Number of resources currently held
    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a held resource by logical id
    pub fn find(&self, logical_id: &str) -> Option<MemoryRecord> {
        lock(&self.records)
            .values()
            .find(|r| r.logical_id == logical_id)
            .cloned()
    }

    fn check_fault(&self, op: &'static str, logical_id: &str) -> Result<(), ProviderError> {
        lock(&self.calls).push(format!("{op} {logical_id}"));
        let mut faults = lock(&self.faults);
        if let Some(fault) = faults
            .iter_mut()
            .find(|f| f.op == op && f.logical_id == logical_id && f.remaining > 0)
        {
            fault.remaining -= 1;
            return Err(fault.error.clone());
        }
        Ok(())
    }

    fn logical_id_of(&self, physical_id: &str) -> Option<String> {
        lock(&self.records)
            .get(physical_id)
            .map(|r| r.logical_id.clone())
    }

    fn output_for(kind: ResourceKind, physical_id: &str) -> ProviderOutput {
        ProviderOutput::new(physical_id)
            .with_output("arn", format!("arn:memory:{}:{}", kind, physical_id))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Provider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn create(
        &self,
        kind: ResourceKind,
        logical_id: &str,
        attributes: &Attributes,
    ) -> Result<ProviderOutput, ProviderError> {
        self.check_fault("create", logical_id)?;
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let physical_id = format!("{}-{:08x}", kind.id_prefix(), n);
        lock(&self.records).insert(
            physical_id.clone(),
            MemoryRecord {
                kind,
                logical_id: logical_id.to_string(),
                attributes: attributes.clone(),
            },
        );
        Ok(Self::output_for(kind, &physical_id))
    }

    fn read(
        &self,
        kind: ResourceKind,
        physical_id: &str,
    ) -> Result<Option<ProviderOutput>, ProviderError> {
        Ok(lock(&self.records)
            .get(physical_id)
            .filter(|r| r.kind == kind)
            .map(|_| Self::output_for(kind, physical_id)))
    }

    fn update(
        &self,
        kind: ResourceKind,
        physical_id: &str,
        attributes: &Attributes,
    ) -> Result<ProviderOutput, ProviderError> {
        let logical_id = self.logical_id_of(physical_id).unwrap_or_default();
        self.check_fault("update", &logical_id)?;
        let mut records = lock(&self.records);
        let record = records
            .get_mut(physical_id)
            .ok_or_else(|| ProviderError::NotFound {
                kind: kind.to_string(),
                physical_id: physical_id.to_string(),
            })?;
        record.attributes = attributes.clone();
        Ok(Self::output_for(kind, physical_id))
    }

    fn delete(&self, kind: ResourceKind, physical_id: &str) -> Result<(), ProviderError> {
        let logical_id = self.logical_id_of(physical_id).unwrap_or_default();
        self.check_fault("delete", &logical_id)?;
        lock(&self.records)
            .remove(physical_id)
            .map(|_| ())
            .ok_or_else(|| ProviderError::NotFound {
                kind: kind.to_string(),
                physical_id: physical_id.to_string(),
            })
    }
}
