//! Reconcile-one-entity
//!
//! Brings the registry group of one attribute id in line with the store:
//! create when missing, update when description/payload drift, add missing
//! management tags, delete when the attribute is gone. Every branch reads
//! before it writes, so a repeated call against unchanged state performs no
//! writes at all.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use attrsync_common::model::MANAGED_BY_TAG;
use attrsync_common::{
    Attribute, AttributeStore, DEFAULT_APPLICATION_NAME, DEFAULT_GROUP_PREFIX, RegistryClient,
    RegistryError, RegistryGroup, SyncError, build_payload, group_name, is_blank_id,
    missing_tags, normalize_id,
};

/// Settings shared by every reconcile call
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Leading segment of every registry group name
    pub group_prefix: String,
    /// Value of the `managedBy` tag
    pub application_name: String,
    /// Additional management tags required on every group
    pub extra_tags: BTreeMap<String, String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            group_prefix: DEFAULT_GROUP_PREFIX.to_string(),
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
            extra_tags: BTreeMap::new(),
        }
    }
}

impl SyncConfig {
    /// The full set of tags every managed group must carry
    pub fn required_tags(&self) -> BTreeMap<String, String> {
        let mut tags = self.extra_tags.clone();
        tags.insert(MANAGED_BY_TAG.to_string(), self.application_name.clone());
        tags
    }
}

/// What a successful reconcile did to the registry
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created,
    Updated {
        content_changed: bool,
        tags_added: usize,
    },
    Unchanged,
    Deleted,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Created => "created",
            ReconcileOutcome::Updated { .. } => "updated",
            ReconcileOutcome::Unchanged => "unchanged",
            ReconcileOutcome::Deleted => "deleted",
        }
    }
}

/// The single code path allowed to mutate the external registry
pub struct Reconciler {
    store: Arc<dyn AttributeStore>,
    registry: Arc<dyn RegistryClient>,
    config: SyncConfig,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn AttributeStore>,
        registry: Arc<dyn RegistryClient>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Registry group name for an attribute id
    pub fn group_name(&self, id: &str) -> String {
        group_name(&self.config.group_prefix, id)
    }

    /// Reconcile one attribute id
    pub async fn reconcile(&self, id: &str) -> Result<ReconcileOutcome, SyncError> {
        if is_blank_id(id) {
            return Err(SyncError::InvalidMessage("empty attribute id".to_string()));
        }
        let id = normalize_id(id);
        let name = self.group_name(&id);

        let attribute = self.store.get_by_id(&id).await?;
        let existing = match self.registry.get(&name).await {
            Ok(group) => Some(group),
            Err(RegistryError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };

        match (attribute, existing) {
            (Some(attribute), None) => self.create(&name, &attribute).await,
            (Some(attribute), Some(group)) => self.update(&name, &attribute, &group).await,
            (None, Some(_)) => {
                self.registry.delete(&name).await?;
                info!("Deleted registry group {} for removed attribute {}", name, id);
                Ok(ReconcileOutcome::Deleted)
            }
            (None, None) => {
                warn!(
                    "Attribute {} unknown to both store and registry, dropping request",
                    id
                );
                Err(SyncError::NotFound(id))
            }
        }
    }

    async fn create(
        &self,
        name: &str,
        attribute: &Attribute,
    ) -> Result<ReconcileOutcome, SyncError> {
        let payload = Self::payload(attribute)?;
        let identifier = self
            .registry
            .create(
                name,
                &attribute.description,
                &payload,
                &self.config.required_tags(),
            )
            .await?;

        if usable(identifier.as_deref()).is_none() {
            return Err(SyncError::Fatal(format!(
                "registry create for '{}' returned no identifier",
                name
            )));
        }

        info!("Created registry group {} for attribute {}", name, attribute.id);
        Ok(ReconcileOutcome::Created)
    }

    async fn update(
        &self,
        name: &str,
        attribute: &Attribute,
        group: &RegistryGroup,
    ) -> Result<ReconcileOutcome, SyncError> {
        let payload = Self::payload(attribute)?;
        let content_changed =
            group.description != attribute.description || group.attributes_payload != payload;
        let tags = missing_tags(&self.config.required_tags(), &group.tags);

        if !content_changed && tags.is_empty() {
            debug!("Registry group {} already in sync", name);
            return Ok(ReconcileOutcome::Unchanged);
        }

        let identifier = if content_changed {
            let returned = self
                .registry
                .update(name, &attribute.description, &payload)
                .await?;
            usable(returned.as_deref())
                .map(str::to_string)
                .ok_or_else(|| {
                    SyncError::Fatal(format!(
                        "registry update for '{}' returned no identifier",
                        name
                    ))
                })?
        } else {
            group.usable_identifier().map(str::to_string).ok_or_else(|| {
                SyncError::Fatal(format!("registry group '{}' has no identifier", name))
            })?
        };

        if !tags.is_empty() {
            self.registry.tag(&identifier, &tags).await?;
        }

        info!(
            "Updated registry group {} (content changed: {}, tags added: {})",
            name,
            content_changed,
            tags.len()
        );
        Ok(ReconcileOutcome::Updated {
            content_changed,
            tags_added: tags.len(),
        })
    }

    fn payload(attribute: &Attribute) -> Result<String, SyncError> {
        build_payload(attribute).map_err(|e| {
            SyncError::Fatal(format!(
                "failed to serialize payload for '{}': {}",
                attribute.id, e
            ))
        })
    }
}

fn usable(identifier: Option<&str>) -> Option<&str> {
    identifier.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::memory::{MemoryAttributeStore, MemoryRegistry, RegistryOp};

    struct Fixture {
        store: Arc<MemoryAttributeStore>,
        registry: Arc<MemoryRegistry>,
        reconciler: Reconciler,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryAttributeStore::new());
        let registry = Arc::new(MemoryRegistry::new());
        let config = SyncConfig {
            group_prefix: "PREFIX".to_string(),
            ..Default::default()
        };
        let reconciler = Reconciler::new(store.clone(), registry.clone(), config);
        Fixture {
            store,
            registry,
            reconciler,
        }
    }

    #[test]
    fn test_required_tags() {
        let mut config = SyncConfig::default();
        config
            .extra_tags
            .insert("team".to_string(), "platform".to_string());
        let tags = config.required_tags();
        assert_eq!(tags["managedBy"], "attrsync");
        assert_eq!(tags["team"], "platform");
    }

    #[tokio::test]
    async fn test_create_when_missing() {
        let f = fixture();
        f.store
            .upsert(Attribute::new("Env", "Prod", "a", BTreeMap::new()));

        let outcome = f.reconciler.reconcile("ENV:PROD").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Created);

        let group = f.registry.group("PREFIX.ENV.PROD").unwrap();
        assert_eq!(group.description, "a");
        assert_eq!(group.tags["managedBy"], "attrsync");
    }

    #[tokio::test]
    async fn test_create_without_identifier_is_fatal() {
        let f = fixture();
        f.store.upsert(Attribute::new("A", "B", "", BTreeMap::new()));
        f.registry.set_omit_identifiers(true);

        let err = f.reconciler.reconcile("A:B").await.unwrap_err();
        assert!(matches!(err, SyncError::Fatal(_)));
    }

    #[tokio::test]
    async fn test_tags_only_uses_existing_identifier() {
        let f = fixture();
        let attr = Attribute::new("A", "B", "d", BTreeMap::new());
        f.store.upsert(attr.clone());
        f.registry.insert(RegistryGroup {
            name: "PREFIX.A.B".to_string(),
            description: "d".to_string(),
            attributes_payload: build_payload(&attr).unwrap(),
            tags: BTreeMap::new(),
            identifier: Some("arn:existing".to_string()),
        });

        let outcome = f.reconciler.reconcile("A:B").await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Updated {
                content_changed: false,
                tags_added: 1
            }
        );
        assert_eq!(
            f.registry.ops(),
            vec![
                RegistryOp::Get("PREFIX.A.B".to_string()),
                RegistryOp::Tag(
                    "arn:existing".to_string(),
                    BTreeMap::from([("managedBy".to_string(), "attrsync".to_string())])
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_update_without_identifier_is_fatal() {
        let f = fixture();
        f.store.upsert(Attribute::new("A", "B", "new", BTreeMap::new()));
        f.registry.insert(RegistryGroup {
            name: "PREFIX.A.B".to_string(),
            description: "old".to_string(),
            identifier: Some("arn:x".to_string()),
            ..Default::default()
        });
        f.registry.set_omit_identifiers(true);

        let err = f.reconciler.reconcile("A:B").await.unwrap_err();
        assert!(matches!(err, SyncError::Fatal(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_transient_registry_error_is_retryable() {
        let f = fixture();
        f.store.upsert(Attribute::new("A", "B", "", BTreeMap::new()));
        f.registry
            .fail_next(RegistryError::Transient("throttled".to_string()));

        let err = f.reconciler.reconcile("A:B").await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(f.registry.write_count(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_transient() {
        let f = fixture();
        f.store.set_unavailable(true);
        let err = f.reconciler.reconcile("A:B").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(f.registry.ops().is_empty());
    }

    #[tokio::test]
    async fn test_blank_id_is_invalid() {
        let f = fixture();
        let err = f.reconciler.reconcile("  ").await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidMessage(_)));
    }
}
