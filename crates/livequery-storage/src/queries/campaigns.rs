// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign record persistence.
//!
//! The resolved target is stored as JSON; metrics are flattened into
//! columns so they can be inspected with plain SQL.

use std::str::FromStr;

use livequery_core::{
    Campaign, CampaignId, CampaignStatus, CloseReason, HostTarget, LiveQueryError, Metrics,
    QueryId,
};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, params};

use super::{column_id, column_time, parse_time, sql_id, write_id};
use crate::database::{Database, map_tr_err};

const CAMPAIGN_COLUMNS: &str = "id, query_id, query_text, created_by, created_at, status, \
     total_hosts, online_hosts, offline_hosts, missing_hosts, active_hosts, target, \
     closed_at, close_reason";

/// Inserts the campaign or replaces the existing record with the same ID.
pub async fn save_campaign(db: &Database, campaign: &Campaign) -> Result<(), LiveQueryError> {
    let id = write_id("campaign", campaign.id.0)?;
    let query_id = campaign
        .query_id
        .map(|q| write_id("query", q.0))
        .transpose()?;
    let target = serde_json::to_string(&campaign.target).map_err(LiveQueryError::persistence)?;
    let campaign = campaign.clone();
    db.connection()
        .call(move |conn| {
            let m = campaign.metrics;
            conn.execute(
                "INSERT INTO campaigns (id, query_id, query_text, created_by, created_at, status,
                     total_hosts, online_hosts, offline_hosts, missing_hosts, active_hosts,
                     target, closed_at, close_reason)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                 ON CONFLICT(id) DO UPDATE SET
                     query_id = excluded.query_id,
                     query_text = excluded.query_text,
                     created_by = excluded.created_by,
                     created_at = excluded.created_at,
                     status = excluded.status,
                     total_hosts = excluded.total_hosts,
                     online_hosts = excluded.online_hosts,
                     offline_hosts = excluded.offline_hosts,
                     missing_hosts = excluded.missing_hosts,
                     active_hosts = excluded.active_hosts,
                     target = excluded.target,
                     closed_at = excluded.closed_at,
                     close_reason = excluded.close_reason",
                params![
                    id,
                    query_id,
                    campaign.query_text,
                    campaign.created_by,
                    campaign.created_at.to_rfc3339(),
                    campaign.status.to_string(),
                    m.total_hosts,
                    m.online_hosts,
                    m.offline_hosts,
                    m.missing_hosts,
                    m.active_hosts,
                    target,
                    campaign.closed_at.map(|t| t.to_rfc3339()),
                    campaign.close_reason.map(|r| r.to_string()),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Loads a campaign by ID.
pub async fn load_campaign(
    db: &Database,
    id: CampaignId,
) -> Result<Option<Campaign>, LiveQueryError> {
    let Some(raw) = sql_id(id.0) else {
        return Ok(None);
    };
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1"),
                params![raw],
                campaign_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Highest campaign ID on record.
pub async fn last_campaign_id(db: &Database) -> Result<Option<CampaignId>, LiveQueryError> {
    let max: Option<i64> = db
        .connection()
        .call(|conn| conn.query_row("SELECT MAX(id) FROM campaigns", [], |row| row.get(0)))
        .await
        .map_err(map_tr_err)?;
    Ok(max.and_then(|id| u64::try_from(id).ok()).map(CampaignId))
}

/// Campaigns not yet completed, oldest first.
pub async fn list_unfinished(db: &Database) -> Result<Vec<Campaign>, LiveQueryError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE status != 'completed' ORDER BY id"
            ))?;
            let rows = stmt.query_map([], campaign_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

fn campaign_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Campaign> {
    let query_id: Option<i64> = row.get(1)?;
    let status: String = row.get(5)?;
    let target: String = row.get(11)?;
    let closed_at: Option<String> = row.get(12)?;
    let close_reason: Option<String> = row.get(13)?;

    Ok(Campaign {
        id: CampaignId(column_id(row, 0)?),
        query_id: query_id.and_then(|q| u64::try_from(q).ok()).map(QueryId),
        query_text: row.get(2)?,
        created_by: row.get(3)?,
        created_at: column_time(row, 4)?,
        status: CampaignStatus::from_str(&status).map_err(|e| conversion(5, e))?,
        metrics: Metrics {
            total_hosts: row.get(6)?,
            online_hosts: row.get(7)?,
            offline_hosts: row.get(8)?,
            missing_hosts: row.get(9)?,
            active_hosts: row.get(10)?,
        },
        target: serde_json::from_str::<HostTarget>(&target).map_err(|e| conversion(11, e))?,
        closed_at: closed_at.as_deref().map(|t| parse_time(t, 12)).transpose()?,
        close_reason: close_reason
            .as_deref()
            .map(CloseReason::from_str)
            .transpose()
            .map_err(|e| conversion(13, e))?,
    })
}

fn conversion(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Utc;
    use livequery_core::{HostId, HostTargets, LabelId};
    use tempfile::tempdir;

    use super::*;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn make_campaign(id: u64) -> Campaign {
        let requested = HostTargets {
            host_ids: vec![HostId(7), HostId(9)],
            host_names: vec!["db-1".into()],
            label_ids: vec![LabelId(3)],
        };
        let hosts: BTreeSet<HostId> = [HostId(7), HostId(9)].into_iter().collect();
        Campaign {
            id: CampaignId(id),
            query_id: Some(QueryId(12)),
            query_text: "SELECT * FROM osquery_info".into(),
            created_by: "alice".into(),
            created_at: Utc::now(),
            status: CampaignStatus::Waiting,
            metrics: Metrics {
                total_hosts: 3,
                online_hosts: 1,
                offline_hosts: 1,
                missing_hosts: 1,
                active_hosts: 0,
            },
            target: HostTarget::new(requested, hosts),
            closed_at: None,
            close_reason: None,
        }
    }

    #[tokio::test]
    async fn save_and_load_preserves_record() {
        let (db, _dir) = setup_db().await;
        let campaign = make_campaign(1);
        save_campaign(&db, &campaign).await.unwrap();

        let loaded = load_campaign(&db, CampaignId(1)).await.unwrap().unwrap();
        assert_eq!(loaded.query_id, Some(QueryId(12)));
        assert_eq!(loaded.metrics, campaign.metrics);
        assert_eq!(loaded.target, campaign.target);
        assert_eq!(loaded.status, CampaignStatus::Waiting);
        assert_eq!(loaded.created_at.timestamp(), campaign.created_at.timestamp());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn save_replaces_existing_record() {
        let (db, _dir) = setup_db().await;
        let mut campaign = make_campaign(4);
        save_campaign(&db, &campaign).await.unwrap();

        campaign.status = CampaignStatus::Completed;
        campaign.metrics.active_hosts = 2;
        campaign.closed_at = Some(Utc::now());
        campaign.close_reason = Some(CloseReason::Expired);
        save_campaign(&db, &campaign).await.unwrap();

        let loaded = load_campaign(&db, CampaignId(4)).await.unwrap().unwrap();
        assert_eq!(loaded.status, CampaignStatus::Completed);
        assert_eq!(loaded.metrics.active_hosts, 2);
        assert_eq!(loaded.close_reason, Some(CloseReason::Expired));
        assert!(loaded.closed_at.is_some());
        assert!(list_unfinished(&db).await.unwrap().is_empty());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn missing_campaign_is_none() {
        let (db, _dir) = setup_db().await;
        assert!(load_campaign(&db, CampaignId(99)).await.unwrap().is_none());
        assert_eq!(last_campaign_id(&db).await.unwrap(), None);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn last_id_tracks_highest() {
        let (db, _dir) = setup_db().await;
        for id in [3, 11, 5] {
            save_campaign(&db, &make_campaign(id)).await.unwrap();
        }
        assert_eq!(last_campaign_id(&db).await.unwrap(), Some(CampaignId(11)));
        assert_eq!(list_unfinished(&db).await.unwrap().len(), 3);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn out_of_range_campaign_ids_are_rejected() {
        let (db, _dir) = setup_db().await;
        let err = save_campaign(&db, &make_campaign(u64::MAX)).await.unwrap_err();
        assert!(matches!(err, LiveQueryError::Persistence { .. }));
        assert!(load_campaign(&db, CampaignId(u64::MAX)).await.unwrap().is_none());
        assert_eq!(last_campaign_id(&db).await.unwrap(), None);
        db.close().await.unwrap();
    }
}
