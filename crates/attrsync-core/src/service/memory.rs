//! In-memory attribute store and registry
//!
//! Used by the test suites and by the server's `memory` backend mode. The
//! registry records every call so tests can assert on write counts.

use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use attrsync_common::{
    Attribute, AttributePage, AttributeStore, RegistryClient, RegistryError, RegistryGroup,
    StoreError, normalize_id,
};

/// Attribute store backed by a sorted map
///
/// Continuation tokens are the last id of the previous page, so attributes
/// added or removed mid-listing never cause an unseen id to be skipped.
#[derive(Default)]
pub struct MemoryAttributeStore {
    attributes: RwLock<BTreeMap<String, Attribute>>,
    page_reads: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryAttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an attribute, keyed by its id
    pub fn upsert(&self, attribute: Attribute) {
        self.attributes
            .write()
            .insert(attribute.id.clone(), attribute);
    }

    pub fn remove(&self, id: &str) -> Option<Attribute> {
        self.attributes.write().remove(&normalize_id(id))
    }

    pub fn len(&self) -> usize {
        self.attributes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.read().is_empty()
    }

    /// Number of `list_page` calls served so far
    pub fn page_reads(&self) -> usize {
        self.page_reads.load(Ordering::SeqCst)
    }

    /// Make every read fail with `StoreError::Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store marked unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AttributeStore for MemoryAttributeStore {
    async fn get_by_id(&self, id: &str) -> Result<Option<Attribute>, StoreError> {
        self.check_available()?;
        Ok(self.attributes.read().get(&normalize_id(id)).cloned())
    }

    async fn list_page(
        &self,
        page_size: usize,
        token: Option<&str>,
    ) -> Result<AttributePage, StoreError> {
        self.check_available()?;
        self.page_reads.fetch_add(1, Ordering::SeqCst);

        let page_size = page_size.max(1);
        let attributes = self.attributes.read();
        let lower = match token.filter(|t| !t.is_empty()) {
            Some(last) => Bound::Excluded(last.to_string()),
            None => Bound::Unbounded,
        };

        let page: Vec<Attribute> = attributes
            .range((lower, Bound::Unbounded))
            .take(page_size)
            .map(|(_, a)| a.clone())
            .collect();

        let has_more = page
            .last()
            .is_some_and(|last| {
                attributes
                    .range((Bound::Excluded(last.id.clone()), Bound::Unbounded))
                    .next()
                    .is_some()
            });
        let next_token = if has_more {
            page.last().map(|a| a.id.clone())
        } else {
            None
        };

        Ok(AttributePage {
            attributes: page,
            next_token,
        })
    }
}

/// A call made against [`MemoryRegistry`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryOp {
    Get(String),
    Create(String),
    Update(String),
    Tag(String, BTreeMap<String, String>),
    Delete(String),
}

impl RegistryOp {
    pub fn is_write(&self) -> bool {
        !matches!(self, RegistryOp::Get(_))
    }
}

/// Registry held in a concurrent map, with call recording and fault injection
#[derive(Default)]
pub struct MemoryRegistry {
    groups: DashMap<String, RegistryGroup>,
    ops: Mutex<Vec<RegistryOp>>,
    failures: Mutex<VecDeque<RegistryError>>,
    omit_identifiers: AtomicBool,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier the registry assigns to a group name
    pub fn identifier_for(name: &str) -> String {
        format!("arn:attrsync:group/{}", name)
    }

    /// Seed or overwrite a group directly, bypassing the op log
    pub fn insert(&self, group: RegistryGroup) {
        self.groups.insert(group.name.clone(), group);
    }

    pub fn group(&self, name: &str) -> Option<RegistryGroup> {
        self.groups.get(name).map(|g| g.clone())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn ops(&self) -> Vec<RegistryOp> {
        self.ops.lock().clone()
    }

    pub fn write_count(&self) -> usize {
        self.ops.lock().iter().filter(|op| op.is_write()).count()
    }

    pub fn clear_ops(&self) {
        self.ops.lock().clear();
    }

    /// Fail the next call with `error`; queued failures are consumed in order
    pub fn fail_next(&self, error: RegistryError) {
        self.failures.lock().push_back(error);
    }

    /// Make create/update responses carry no identifier
    pub fn set_omit_identifiers(&self, omit: bool) {
        self.omit_identifiers.store(omit, Ordering::SeqCst);
    }

    fn record(&self, op: RegistryOp) -> Result<(), RegistryError> {
        self.ops.lock().push(op);
        match self.failures.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn response_identifier(&self, name: &str) -> Option<String> {
        if self.omit_identifiers.load(Ordering::SeqCst) {
            None
        } else {
            Some(Self::identifier_for(name))
        }
    }
}

#[async_trait::async_trait]
impl RegistryClient for MemoryRegistry {
    async fn get(&self, name: &str) -> Result<RegistryGroup, RegistryError> {
        self.record(RegistryOp::Get(name.to_string()))?;
        self.group(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    async fn create(
        &self,
        name: &str,
        description: &str,
        payload: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<Option<String>, RegistryError> {
        self.record(RegistryOp::Create(name.to_string()))?;
        if self.groups.contains_key(name) {
            return Err(RegistryError::Fatal(format!(
                "group '{}' already exists",
                name
            )));
        }
        self.groups.insert(
            name.to_string(),
            RegistryGroup {
                name: name.to_string(),
                description: description.to_string(),
                attributes_payload: payload.to_string(),
                tags: tags.clone(),
                identifier: Some(Self::identifier_for(name)),
            },
        );
        Ok(self.response_identifier(name))
    }

    async fn update(
        &self,
        name: &str,
        description: &str,
        payload: &str,
    ) -> Result<Option<String>, RegistryError> {
        self.record(RegistryOp::Update(name.to_string()))?;
        let mut group = self
            .groups
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        group.description = description.to_string();
        group.attributes_payload = payload.to_string();
        drop(group);
        Ok(self.response_identifier(name))
    }

    async fn tag(
        &self,
        identifier: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), RegistryError> {
        self.record(RegistryOp::Tag(identifier.to_string(), tags.clone()))?;
        let mut group = self
            .groups
            .iter_mut()
            .find(|g| g.identifier.as_deref() == Some(identifier))
            .ok_or_else(|| RegistryError::NotFound(identifier.to_string()))?;
        group.tags.extend(tags.clone());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), RegistryError> {
        self.record(RegistryOp::Delete(name.to_string()))?;
        self.groups
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }
}
