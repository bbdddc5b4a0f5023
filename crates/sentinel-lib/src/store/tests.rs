//! Tests for the in-memory store
//!
//! These tests verify:
//! - Transaction isolation and rollback on drop
//! - Dedupe-key idempotent inserts
//! - Snapshot persistence across restarts

use super::*;
use crate::anomaly::dedupe_key;
use chrono::TimeZone;
use serde_json::json;
use tempfile::TempDir;

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, hour, 15, 0).unwrap()
}

fn new_notification(vm_name: &str, metric: MetricKind, hour: u32) -> NewNotification {
    NewNotification {
        provider: Provider::Vmware,
        vm_id: None,
        vm_name: vm_name.to_string(),
        metric,
        value_pct: 91.0,
        threshold_pct: 85.0,
        env: Some("PROD".to_string()),
        at: at(hour),
        created_at: at(hour),
        disks: None,
        dedupe_key: dedupe_key(Provider::Vmware, vm_name, metric, at(hour)),
    }
}

mod transaction_tests {
    use super::*;

    #[tokio::test]
    async fn test_commit_makes_writes_visible() {
        let store = InMemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        let (created, is_new) = tx
            .insert(new_notification("vm-01", MetricKind::Cpu, 12))
            .await
            .unwrap();
        assert!(is_new);
        tx.append(AuditAction::NotificationCreated, created.id, json!({}), at(12))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let stored = store.get(created.id).await.unwrap().unwrap();
        assert_eq!(stored.status, NotificationStatus::Open);
        assert_eq!(store.audit_events(&AuditFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_drop_without_commit_rolls_back() {
        let store = InMemoryStore::new();

        {
            let mut tx = store.begin().await.unwrap();
            let (created, _) = tx
                .insert(new_notification("vm-01", MetricKind::Cpu, 12))
                .await
                .unwrap();
            tx.append(AuditAction::NotificationCreated, created.id, json!({}), at(12))
                .await
                .unwrap();
        }

        assert!(store.is_empty().await);
        assert!(store.audit_events(&AuditFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transaction_sees_its_own_writes() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert(new_notification("vm-01", MetricKind::Ram, 12)).await.unwrap();

        let found = tx
            .find_active(Provider::Vmware, "vm-01", MetricKind::Ram)
            .await
            .unwrap();
        assert!(found.is_some());
        assert_eq!(tx.list_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_twice_is_rejected() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.commit().await.unwrap();

        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::TransactionClosed));
        assert!(tx.list_active().await.is_err());
    }

    #[tokio::test]
    async fn test_insert_is_idempotent_on_dedupe_key() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let (first, first_new) = tx

            .insert(new_notification("vm-01", MetricKind::Cpu, 12))

            .await

            .unwrap();
        let mut same_hour = new_notification("vm-01", MetricKind::Cpu, 12);
        same_hour.value_pct = 99.0;
        let (second, second_new) = tx.insert(same_hour).await.unwrap();

        assert!(first_new);
        assert!(!second_new);
        assert_eq!(first.id, second.id);
        assert_eq!(second.value_pct, 91.0);

        let (_, next_hour_new) = tx

            .insert(new_notification("vm-01", MetricKind::Cpu, 13))

            .await

            .unwrap();
        assert!(next_hour_new);
    }

    #[tokio::test]
    async fn test_find_active_ignores_cleared_rows() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let (mut row, _) = tx
            .insert(new_notification("vm-01", MetricKind::Cpu, 12))
            .await
            .unwrap();
        row.status = NotificationStatus::Cleared;
        row.cleared_at = Some(at(13));
        tx.update(&row).await.unwrap();

        assert!(tx
            .find_active(Provider::Vmware, "vm-01", MetricKind::Cpu)
            .await
            .unwrap()
            .is_none());
        assert!(tx.list_active().await.unwrap().is_empty());
    }
}

mod listing_tests {
    use super::*;

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        for (i, name) in ["vm-a", "vm-b", "vm-c"].iter().enumerate() {
            tx.insert(new_notification(name, MetricKind::Cpu, 10 + i as u32))
                .await
                .unwrap();
        }
        let (mut ram, _) = tx
            .insert(new_notification("vm-a", MetricKind::Ram, 14))
            .await
            .unwrap();
        ram.status = NotificationStatus::Cleared;
        tx.update(&ram).await.unwrap();
        tx.commit().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_list_newest_first_with_paging() {
        let store = seeded().await;

        let page = store
            .list(&NotificationFilter {
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(page.total, 4);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].metric, MetricKind::Ram);
        assert_eq!(page.items[1].vm_name, "vm-c");

        let rest = store
            .list(&NotificationFilter {
                limit: Some(2),
                offset: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(rest.items.len(), 2);
        assert_eq!(rest.offset, 2);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let store = seeded().await;

        let open = store
            .list(&NotificationFilter {
                status: Some(NotificationStatus::Open),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(open.total, 3);

        let ram = store
            .list(&NotificationFilter {
                metric: Some(MetricKind::Ram),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(ram.total, 1);

        let by_vm = store
            .list(&NotificationFilter {
                vm_name: Some("vm-a".to_string()),
                env: Some("prod".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_vm.total, 2);
    }

    #[tokio::test]
    async fn test_archived_rows_hidden_by_default() {
        let store = InMemoryStore::new();
        let mut archived = new_notification("vm-old", MetricKind::Cpu, 1).into_notification(0);
        archived.archived = true;
        store.seed(archived).await.unwrap();

        let hidden = store.list(&NotificationFilter::default()).await.unwrap();
        assert_eq!(hidden.total, 0);

        let shown = store
            .list(&NotificationFilter {
                include_archived: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(shown.total, 1);
    }

    #[test]
    fn test_limit_is_clamped() {
        let filter = NotificationFilter {
            limit: Some(100_000),
            ..Default::default()
        };
        assert_eq!(filter.effective_limit(), MAX_PAGE_LIMIT);
        assert_eq!(NotificationFilter::default().effective_limit(), DEFAULT_PAGE_LIMIT);
    }
}

mod persistence_tests {
    use super::*;

    #[tokio::test]
    async fn test_snapshot_survives_restart() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state").join("notifications.json");

        let id = {
            let store = InMemoryStore::with_persistence(&path).unwrap();
            let mut tx = store.begin().await.unwrap();
            let (row, _) = tx
                .insert(new_notification("vm-01", MetricKind::Disk, 12))
                .await
                .unwrap();
            tx.append(AuditAction::NotificationCreated, row.id, json!({"value_pct": 91.0}), at(12))
                .await
                .unwrap();
            tx.commit().await.unwrap();
            row.id
        };

        let reopened = InMemoryStore::with_persistence(&path).unwrap();
        let row = reopened.get(id).await.unwrap().unwrap();
        assert_eq!(row.metric, MetricKind::Disk);
        assert_eq!(reopened.audit_events(&AuditFilter::default()).await.unwrap().len(), 1);

        // Ids keep increasing after a restart
        let mut tx = reopened.begin().await.unwrap();
        let (next, _) = tx
            .insert(new_notification("vm-02", MetricKind::Cpu, 12))
            .await
            .unwrap();
        assert!(next.id > id);
    }

    #[tokio::test]
    async fn test_uncommitted_writes_not_persisted() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notifications.json");

        {
            let store = InMemoryStore::with_persistence(&path).unwrap();
            let mut tx = store.begin().await.unwrap();
            tx.insert(new_notification("vm-01", MetricKind::Cpu, 12)).await.unwrap();
        }

        assert!(!path.exists());
    }

    #[test]
    fn test_corrupt_snapshot_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notifications.json");
        std::fs::write(&path, b"not json").unwrap();

        let result = InMemoryStore::with_persistence(&path);
        assert!(matches!(result, Err(StoreError::Json(_))));
    }
}
