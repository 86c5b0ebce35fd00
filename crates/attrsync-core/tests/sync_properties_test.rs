// Integration tests for the synchronizer
// Exercises idempotence, convergence, deletion, tag preservation and sweep pagination.
// Idempotence is also checked over generated attribute and registry states.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use attrsync_common::{Attribute, RegistryGroup, SyncError, SyncQueue, build_payload};
use attrsync_core::{
    Enqueuer, MemoryAttributeStore, MemoryRegistry, MemorySyncQueue, PeriodicReconciler,
    QueueConfig, ReconcileOutcome, Reconciler, ReconcilerConfig, RegistryOp, SyncConfig,
    SyncWorker, WorkerConfig,
};
use proptest::prelude::*;

struct Harness {
    store: Arc<MemoryAttributeStore>,
    registry: Arc<MemoryRegistry>,
    queue: Arc<MemorySyncQueue>,
    reconciler: Arc<Reconciler>,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryAttributeStore::new());
        let registry = Arc::new(MemoryRegistry::new());
        let queue = Arc::new(MemorySyncQueue::new(QueueConfig {
            redelivery_delay: Duration::ZERO,
            ..Default::default()
        }));
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            registry.clone(),
            SyncConfig {
                group_prefix: "PREFIX".to_string(),
                application_name: "attrsync".to_string(),
                extra_tags: BTreeMap::new(),
            },
        ));
        Self {
            store,
            registry,
            queue,
            reconciler,
        }
    }

    fn worker(&self) -> SyncWorker {
        SyncWorker::new(
            self.queue.clone(),
            self.reconciler.clone(),
            WorkerConfig {
                poll_wait: Duration::from_millis(5),
                ..Default::default()
            },
        )
    }

    fn sweeper(&self, page_size: usize) -> PeriodicReconciler {
        PeriodicReconciler::new(
            self.store.clone(),
            Enqueuer::new(self.queue.clone()),
            ReconcilerConfig {
                page_size,
                ..Default::default()
            },
        )
    }

    fn assert_in_sync(&self, attribute: &Attribute) {
        let name = self.reconciler.group_name(&attribute.id);
        let group = self.registry.group(&name).expect("group missing");
        assert_eq!(group.description, attribute.description);
        assert_eq!(group.attributes_payload, build_payload(attribute).unwrap());
        assert_eq!(group.tags.get("managedBy").map(String::as_str), Some("attrsync"));
    }
}

fn metadata(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn test_created_attribute_produces_group() {
    let h = Harness::new();
    let attr = Attribute::new("Env", "Prod", "production", metadata(&[("owner", "ops")]));
    assert_eq!(attr.id, "ENV:PROD");
    h.store.upsert(attr.clone());

    let outcome = h.reconciler.reconcile("ENV:PROD").await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Created);

    let group = h.registry.group("PREFIX.ENV.PROD").unwrap();
    assert_eq!(group.description, "production");
    let payload: BTreeMap<String, String> =
        serde_json::from_str(&group.attributes_payload).unwrap();
    assert_eq!(payload["attributeKey"], "Env");
    assert_eq!(payload["attributeValue"], "Prod");
    assert_eq!(payload["owner"], "ops");
    assert!(group.identifier.is_some());
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let h = Harness::new();
    h.store
        .upsert(Attribute::new("Env", "Prod", "a", BTreeMap::new()));

    h.reconciler.reconcile("env:prod").await.unwrap();
    let first = h.registry.group("PREFIX.ENV.PROD").unwrap();
    h.registry.clear_ops();

    let outcome = h.reconciler.reconcile("ENV:PROD").await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Unchanged);
    assert_eq!(h.registry.write_count(), 0);
    assert_eq!(h.registry.group("PREFIX.ENV.PROD").unwrap(), first);
}

#[tokio::test]
async fn test_description_change_updates_without_tagging() {
    let h = Harness::new();
    let mut attr = Attribute::new("Env", "Prod", "a", BTreeMap::new());
    h.store.upsert(attr.clone());
    h.reconciler.reconcile("ENV:PROD").await.unwrap();
    h.registry.clear_ops();

    attr.touch("b", BTreeMap::new());
    h.store.upsert(attr.clone());

    let outcome = h.reconciler.reconcile("ENV:PROD").await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Updated {
            content_changed: true,
            tags_added: 0
        }
    );
    assert_eq!(
        h.registry.ops(),
        vec![
            RegistryOp::Get("PREFIX.ENV.PROD".to_string()),
            RegistryOp::Update("PREFIX.ENV.PROD".to_string()),
        ]
    );
    assert_eq!(h.registry.group("PREFIX.ENV.PROD").unwrap().description, "b");

    // Unchanged afterwards
    h.registry.clear_ops();
    h.reconciler.reconcile("ENV:PROD").await.unwrap();
    assert_eq!(h.registry.write_count(), 0);
}

#[tokio::test]
async fn test_removed_attribute_deletes_group_once() {
    let h = Harness::new();
    h.store
        .upsert(Attribute::new("Env", "Prod", "a", BTreeMap::new()));
    h.reconciler.reconcile("ENV:PROD").await.unwrap();
    h.store.remove("ENV:PROD");
    h.registry.clear_ops();

    let outcome = h.reconciler.reconcile("ENV:PROD").await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Deleted);
    let deletes = h
        .registry
        .ops()
        .into_iter()
        .filter(|op| matches!(op, RegistryOp::Delete(_)))
        .count();
    assert_eq!(deletes, 1);
    assert!(h.registry.is_empty());

    // Second run: both sides empty now
    h.registry.clear_ops();
    let err = h.reconciler.reconcile("ENV:PROD").await.unwrap_err();
    assert_eq!(err, SyncError::NotFound("ENV:PROD".to_string()));
    assert_eq!(h.registry.write_count(), 0);
}

#[tokio::test]
async fn test_unknown_id_is_not_found_without_writes() {
    let h = Harness::new();

    let err = h.reconciler.reconcile("FOO:BAR").await.unwrap_err();
    assert_eq!(err, SyncError::NotFound("FOO:BAR".to_string()));
    assert_eq!(h.registry.write_count(), 0);
    assert_eq!(
        h.registry.ops(),
        vec![RegistryOp::Get("PREFIX.FOO.BAR".to_string())]
    );
}

#[tokio::test]
async fn test_external_tags_are_never_removed() {
    let h = Harness::new();
    let attr = Attribute::new("Team", "Core", "old", BTreeMap::new());
    h.store.upsert(attr.clone());
    h.registry.insert(RegistryGroup {
        name: "PREFIX.TEAM.CORE".to_string(),
        description: "old".to_string(),
        attributes_payload: "{}".to_string(),
        tags: metadata(&[("costCenter", "42")]),
        identifier: Some(MemoryRegistry::identifier_for("PREFIX.TEAM.CORE")),
    });

    let outcome = h.reconciler.reconcile("TEAM:CORE").await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Updated {
            content_changed: true,
            tags_added: 1
        }
    );

    let group = h.registry.group("PREFIX.TEAM.CORE").unwrap();
    assert_eq!(group.tags["costCenter"], "42");
    assert_eq!(group.tags["managedBy"], "attrsync");
    h.assert_in_sync(&attr);

    h.registry.clear_ops();
    h.reconciler.reconcile("TEAM:CORE").await.unwrap();
    assert_eq!(h.registry.write_count(), 0);
    assert_eq!(
        h.registry.group("PREFIX.TEAM.CORE").unwrap().tags["costCenter"],
        "42"
    );
}

#[tokio::test]
async fn test_sweep_pagination_completeness() {
    let h = Harness::new();
    for i in 0..250 {
        h.store.upsert(Attribute::new(
            "k",
            &format!("{:03}", i),
            "",
            BTreeMap::new(),
        ));
    }

    let report = h.sweeper(100).sweep().await.unwrap();
    assert_eq!(h.store.page_reads(), 3);
    assert_eq!(report.pages, 3);
    assert_eq!(report.enqueued, 250);
    assert_eq!(report.failed, 0);
    assert_eq!(h.queue.stats().await.pending, 250);
}

#[tokio::test]
async fn test_sweep_converges_after_message_loss() {
    let h = Harness::new();
    let mut attributes = Vec::new();
    for i in 0..25 {
        let attr = Attribute::new(
            "Region",
            &format!("r{}", i),
            &format!("region {}", i),
            metadata(&[("index", &i.to_string())]),
        );
        h.store.upsert(attr.clone());
        attributes.push(attr);
    }

    // Drifted group left behind by a lost message
    h.registry.insert(RegistryGroup {
        name: "PREFIX.REGION.R3".to_string(),
        description: "stale".to_string(),
        attributes_payload: "{}".to_string(),
        tags: BTreeMap::new(),
        identifier: Some("arn:r3".to_string()),
    });

    let report = h.sweeper(10).sweep().await.unwrap();
    assert_eq!(report.enqueued, 25);

    let processed = h.worker().drain().await;
    assert_eq!(processed, 25);
    for attr in &attributes {
        h.assert_in_sync(attr);
    }
    assert!(h.queue.dead_letters().await.is_empty());

    // A second sweep and drain performs no writes
    h.registry.clear_ops();
    h.sweeper(10).sweep().await.unwrap();
    h.worker().drain().await;
    assert_eq!(h.registry.write_count(), 0);
}

#[tokio::test]
async fn test_whitespace_in_key_or_value_converges() {
    let h = Harness::new();
    let padded_value = Attribute::new("Env", "Prod ", "padded", BTreeMap::new());
    let padded_key = Attribute::new(" Env", "Prod", "leading", BTreeMap::new());
    let plain = Attribute::new("Env", "Prod", "plain", BTreeMap::new());
    assert_eq!(padded_value.id, "ENV:PROD ");
    for attr in [&padded_value, &padded_key, &plain] {
        h.store.upsert(attr.clone());
    }

    let report = h.sweeper(10).sweep().await.unwrap();
    assert_eq!(report.enqueued, 3);
    assert_eq!(h.worker().drain().await, 3);

    // Three distinct ids, three distinct groups
    assert_eq!(h.registry.len(), 3);
    h.assert_in_sync(&padded_value);
    h.assert_in_sync(&padded_key);
    h.assert_in_sync(&plain);
    assert!(h.queue.dead_letters().await.is_empty());
}

#[tokio::test]
async fn test_real_time_path_end_to_end() {
    let h = Harness::new();
    let enqueuer = Enqueuer::new(h.queue.clone());
    let worker = h.worker();

    let mut attr = Attribute::new("Env", "Prod", "a", BTreeMap::new());
    h.store.upsert(attr.clone());
    enqueuer.enqueue(&attr.id).await.unwrap();
    worker.drain().await;
    h.assert_in_sync(&attr);

    attr.touch("b", metadata(&[("tier", "gold")]));
    h.store.upsert(attr.clone());
    // Burst of updates collapses to one delivery
    for _ in 0..3 {
        enqueuer.enqueue(&attr.id).await.unwrap();
    }
    assert_eq!(worker.drain().await, 1);
    h.assert_in_sync(&attr);

    h.store.remove(&attr.id);
    enqueuer.enqueue(&attr.id).await.unwrap();
    worker.drain().await;
    assert!(h.registry.is_empty());
}

/// Registry state found before the first reconcile
#[derive(Clone, Debug)]
enum StartingGroup {
    Absent,
    /// Stale description and payload, management tag present
    Drifted,
    /// Matching content but no management tag
    Untagged,
    InSync,
}

fn starting_group() -> impl Strategy<Value = StartingGroup> {
    prop_oneof![
        Just(StartingGroup::Absent),
        Just(StartingGroup::Drifted),
        Just(StartingGroup::Untagged),
        Just(StartingGroup::InSync),
    ]
}

fn seed_group(
    h: &Harness,
    attr: &Attribute,
    start: &StartingGroup,
    external: &BTreeMap<String, String>,
) {
    let name = h.reconciler.group_name(&attr.id);
    let payload = build_payload(attr).unwrap();
    let mut tags = external.clone();
    let (description, attributes_payload) = match start {
        StartingGroup::Absent => return,
        StartingGroup::Drifted => {
            tags.insert("managedBy".to_string(), "attrsync".to_string());
            ("stale".to_string(), "{}".to_string())
        }
        StartingGroup::Untagged => (attr.description.clone(), payload),
        StartingGroup::InSync => {
            tags.insert("managedBy".to_string(), "attrsync".to_string());
            (attr.description.clone(), payload)
        }
    };
    h.registry.insert(RegistryGroup {
        identifier: Some(MemoryRegistry::identifier_for(&name)),
        name,
        description,
        attributes_payload,
        tags,
    });
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_second_reconcile_writes_nothing(
        description in "[a-zA-Z ]{0,12}",
        metadata in prop::collection::btree_map("[a-z]{1,6}", "[a-zA-Z0-9 ]{0,6}", 0..4),
        start in starting_group(),
        external in prop::collection::btree_map("ext[a-z]{1,4}", "[a-z0-9]{1,4}", 0..3),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let h = Harness::new();
            let attr = Attribute::new("Prop", "Case", &description, metadata);
            h.store.upsert(attr.clone());
            seed_group(&h, &attr, &start, &external);
            let name = h.reconciler.group_name(&attr.id);

            h.reconciler.reconcile(&attr.id).await.unwrap();
            let first = h.registry.group(&name).unwrap();
            h.registry.clear_ops();

            let outcome = h.reconciler.reconcile(&attr.id).await.unwrap();
            assert_eq!(outcome, ReconcileOutcome::Unchanged);
            assert_eq!(h.registry.write_count(), 0);
            assert_eq!(h.registry.group(&name).unwrap(), first);
            h.assert_in_sync(&attr);

            if !matches!(start, StartingGroup::Absent) {
                for (key, value) in &external {
                    assert_eq!(first.tags.get(key), Some(value));
                }
            }
        });
    }
}
