// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign manager running on SQLite storage.

use std::sync::Arc;

use chrono::{Duration, Utc};
use livequery_campaign::{CampaignManager, CampaignService, Collaborators};
use livequery_config::{CampaignConfig, StorageConfig};
use livequery_core::{
    CampaignStatus, CloseReason, Host, HostId, LabelId, QueryId, QueryRef, SavedQuery, Viewer,
};
use livequery_storage::SqliteStorage;
use livequery_test_utils::AllowAll;
use tempfile::tempdir;

async fn seeded_storage(path: &str) -> Arc<SqliteStorage> {
    let storage = SqliteStorage::open(&StorageConfig {
        database_path: path.to_string(),
        wal_mode: true,
    })
    .await
    .unwrap();
    let now = Utc::now();
    for (id, name, seen) in [
        (7, "web-7", now),
        (9, "web-9", now - Duration::hours(5)),
        (11, "db-11", now),
    ] {
        storage
            .upsert_host(&Host {
                id: HostId(id),
                identifier: name.into(),
                last_seen: seen,
            })
            .await
            .unwrap();
    }
    storage.upsert_label(LabelId(1), "web").await.unwrap();
    storage.add_label_member(LabelId(1), HostId(7)).await.unwrap();
    storage.add_label_member(LabelId(1), HostId(9)).await.unwrap();
    storage
        .upsert_query(&SavedQuery {
            id: QueryId(2),
            name: "uptime".into(),
            text: "SELECT * FROM uptime".into(),
        })
        .await
        .unwrap();
    Arc::new(storage)
}

async fn manager(storage: Arc<SqliteStorage>) -> CampaignManager {
    CampaignManager::open(
        &CampaignConfig::default(),
        Collaborators {
            datastore: storage.clone(),
            queries: storage.clone(),
            persistence: storage,
            authorizer: Arc::new(AllowAll),
        },
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn campaign_survives_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("livequery.db");
    let path = path.to_str().unwrap();
    let viewer = Viewer::new("operator");

    let storage = seeded_storage(path).await;
    let first = manager(storage.clone()).await;
    let campaign = first
        .create_campaign_by_names(
            &viewer,
            QueryRef {
                id: Some(QueryId(2)),
                text: String::new(),
            },
            vec!["db-11".into()],
            vec!["web".into()],
        )
        .await
        .unwrap();
    assert_eq!(campaign.query_text, "SELECT * FROM uptime");
    assert_eq!(campaign.metrics.total_hosts, 3);
    assert_eq!(campaign.metrics.offline_hosts, 1);

    first
        .ingest_result(campaign.id, HostId(11), Vec::new(), None)
        .await
        .unwrap();
    first.close_campaign(&viewer, campaign.id).await.unwrap();
    drop(first);

    let second = manager(storage).await;
    let stored = second.get_campaign(&viewer, campaign.id).await.unwrap();
    assert_eq!(stored.status, CampaignStatus::Completed);
    assert_eq!(stored.close_reason, Some(CloseReason::Explicit));
    assert_eq!(stored.metrics.active_hosts, 1);
    assert_eq!(stored.target.len(), 3);

    let next = second
        .create_campaign_by_names(
            &viewer,
            QueryRef {
                id: None,
                text: "SELECT 1".into(),
            },
            vec!["web-7".into()],
            Vec::new(),
        )
        .await
        .unwrap();
    assert!(next.id > campaign.id);
}

#[tokio::test]
async fn orphaned_campaigns_can_be_expired_after_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("livequery.db");
    let path = path.to_str().unwrap();
    let viewer = Viewer::new("operator");

    let storage = seeded_storage(path).await;
    let first = manager(storage.clone()).await;
    let campaign = first
        .create_campaign_by_names(
            &viewer,
            QueryRef {
                id: None,
                text: "SELECT 1".into(),
            },
            Vec::new(),
            vec!["web".into()],
        )
        .await
        .unwrap();
    drop(first);

    let second = manager(storage.clone()).await;
    let orphans = storage.unfinished_campaigns().await.unwrap();
    assert_eq!(orphans.len(), 1);
    for orphan in orphans {
        second
            .store()
            .close(orphan.id, CloseReason::Expired)
            .await
            .unwrap();
    }
    assert!(storage.unfinished_campaigns().await.unwrap().is_empty());
    let stored = second.get_campaign(&viewer, campaign.id).await.unwrap();
    assert_eq!(stored.close_reason, Some(CloseReason::Expired));
}
