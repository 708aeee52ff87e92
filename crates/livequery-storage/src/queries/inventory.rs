// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hosts, labels and saved queries.

use livequery_core::{Host, HostId, HostLookup, LabelId, LiveQueryError, QueryId, SavedQuery};
use rusqlite::{OptionalExtension, params};

use super::{column_id, column_time, sql_id, write_id};
use crate::database::{Database, map_tr_err};

fn host_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Host> {
    Ok(Host {
        id: HostId(column_id(row, 0)?),
        identifier: row.get(1)?,
        last_seen: column_time(row, 2)?,
    })
}

/// Inserts a host or updates its identifier and check-in time.
pub async fn upsert_host(db: &Database, host: &Host) -> Result<(), LiveQueryError> {
    let id = write_id("host", host.id.0)?;
    let host = host.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO hosts (id, identifier, last_seen) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                     identifier = excluded.identifier,
                     last_seen = excluded.last_seen",
                params![id, host.identifier, host.last_seen.to_rfc3339()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Looks hosts up by ID, preserving request order.
pub async fn hosts_by_ids(db: &Database, ids: &[HostId]) -> Result<HostLookup, LiveQueryError> {
    let ids = ids.to_vec();
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare("SELECT id, identifier, last_seen FROM hosts WHERE id = ?1")?;
            let mut lookup = HostLookup::default();
            for id in ids {
                let Some(raw) = sql_id(id.0) else {
                    lookup.missing.push(id.to_string());
                    continue;
                };
                match stmt
                    .query_row(params![raw], host_from_row)
                    .optional()?
                {
                    Some(host) => lookup.found.push(host),
                    None => lookup.missing.push(id.to_string()),
                }
            }
            Ok(lookup)
        })
        .await
        .map_err(map_tr_err)
}

/// Looks hosts up by identifier, preserving request order.
pub async fn hosts_by_identifiers(
    db: &Database,
    identifiers: &[String],
) -> Result<HostLookup, LiveQueryError> {
    let identifiers = identifiers.to_vec();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn
                .prepare("SELECT id, identifier, last_seen FROM hosts WHERE identifier = ?1")?;
            let mut lookup = HostLookup::default();
            for identifier in identifiers {
                match stmt
                    .query_row(params![identifier], host_from_row)
                    .optional()?
                {
                    Some(host) => lookup.found.push(host),
                    None => lookup.missing.push(identifier),
                }
            }
            Ok(lookup)
        })
        .await
        .map_err(map_tr_err)
}

/// Creates a label, or renames an existing one.
pub async fn upsert_label(db: &Database, id: LabelId, name: &str) -> Result<(), LiveQueryError> {
    let id = write_id("label", id.0)?;
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO labels (id, name) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                params![id, name],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Adds a host to a label. Adding an existing member is a no-op.
pub async fn add_label_member(
    db: &Database,
    label: LabelId,
    host: HostId,
) -> Result<(), LiveQueryError> {
    let label = write_id("label", label.0)?;
    let host = write_id("host", host.0)?;
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO label_membership (label_id, host_id) VALUES (?1, ?2)",
                params![label, host],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn remove_label_member(
    db: &Database,
    label: LabelId,
    host: HostId,
) -> Result<(), LiveQueryError> {
    let label = write_id("label", label.0)?;
    let host = write_id("host", host.0)?;
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM label_membership WHERE label_id = ?1 AND host_id = ?2",
                params![label, host],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Current members of a label, by host ID.
pub async fn label_members(db: &Database, label: LabelId) -> Result<Vec<Host>, LiveQueryError> {
    let Some(label) = sql_id(label.0) else {
        return Ok(Vec::new());
    };
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT h.id, h.identifier, h.last_seen
                 FROM hosts h
                 JOIN label_membership m ON m.host_id = h.id
                 WHERE m.label_id = ?1
                 ORDER BY h.id",
            )?;
            let rows = stmt.query_map(params![label], host_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Label IDs for the given names. Names without a label are skipped.
pub async fn label_ids_by_names(
    db: &Database,
    names: &[String],
) -> Result<Vec<LabelId>, LiveQueryError> {
    let names = names.to_vec();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare("SELECT id FROM labels WHERE name = ?1")?;
            let mut ids = Vec::with_capacity(names.len());
            for name in names {
                if let Some(id) = stmt
                    .query_row(params![name], |row| column_id(row, 0))
                    .optional()?
                {
                    ids.push(LabelId(id));
                }
            }
            Ok(ids)
        })
        .await
        .map_err(map_tr_err)
}

/// Inserts or replaces a saved query.
pub async fn upsert_query(db: &Database, query: &SavedQuery) -> Result<(), LiveQueryError> {
    let id = write_id("query", query.id.0)?;
    let query = query.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO queries (id, name, query) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name, query = excluded.query",
                params![id, query.name, query.text],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_query(db: &Database, id: QueryId) -> Result<Option<SavedQuery>, LiveQueryError> {
    let Some(raw) = sql_id(id.0) else {
        return Ok(None);
    };
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, name, query FROM queries WHERE id = ?1",
                params![raw],
                |row| {
                    Ok(SavedQuery {
                        id: QueryId(column_id(row, 0)?),
                        name: row.get(1)?,
                        text: row.get(2)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    use super::*;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn host(id: u64, identifier: &str) -> Host {
        Host {
            id: HostId(id),
            identifier: identifier.into(),
            last_seen: Utc::now(),
        }
    }

    #[tokio::test]
    async fn lookup_reports_found_and_missing() {
        let (db, _dir) = setup_db().await;
        upsert_host(&db, &host(1, "alpha")).await.unwrap();
        upsert_host(&db, &host(2, "beta")).await.unwrap();

        let lookup = hosts_by_ids(&db, &[HostId(2), HostId(5)]).await.unwrap();
        assert_eq!(lookup.found.len(), 1);
        assert_eq!(lookup.found[0].identifier, "beta");
        assert_eq!(lookup.missing, vec!["5".to_string()]);

        let lookup = hosts_by_identifiers(&db, &["alpha".into(), "gamma".into()])
            .await
            .unwrap();
        assert_eq!(lookup.found[0].id, HostId(1));
        assert_eq!(lookup.missing, vec!["gamma".to_string()]);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn upsert_host_updates_check_in() {
        let (db, _dir) = setup_db().await;
        let mut h = host(1, "alpha");
        h.last_seen = Utc::now() - Duration::days(2);
        upsert_host(&db, &h).await.unwrap();
        h.last_seen = Utc::now();
        upsert_host(&db, &h).await.unwrap();

        let lookup = hosts_by_ids(&db, &[HostId(1)]).await.unwrap();
        assert!(Utc::now() - lookup.found[0].last_seen < Duration::minutes(1));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn label_membership_round_trip() {
        let (db, _dir) = setup_db().await;
        upsert_host(&db, &host(1, "alpha")).await.unwrap();
        upsert_host(&db, &host(2, "beta")).await.unwrap();
        upsert_label(&db, LabelId(10), "linux").await.unwrap();
        add_label_member(&db, LabelId(10), HostId(2)).await.unwrap();
        add_label_member(&db, LabelId(10), HostId(1)).await.unwrap();
        add_label_member(&db, LabelId(10), HostId(1)).await.unwrap();

        let members = label_members(&db, LabelId(10)).await.unwrap();
        let ids: Vec<HostId> = members.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![HostId(1), HostId(2)]);

        remove_label_member(&db, LabelId(10), HostId(1)).await.unwrap();
        assert_eq!(label_members(&db, LabelId(10)).await.unwrap().len(), 1);
        assert!(label_members(&db, LabelId(99)).await.unwrap().is_empty());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn label_names_skip_unknown() {
        let (db, _dir) = setup_db().await;
        upsert_label(&db, LabelId(1), "linux").await.unwrap();
        upsert_label(&db, LabelId(2), "macos").await.unwrap();
        let ids = label_ids_by_names(&db, &["macos".into(), "beos".into(), "linux".into()])
            .await
            .unwrap();
        assert_eq!(ids, vec![LabelId(2), LabelId(1)]);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn saved_queries() {
        let (db, _dir) = setup_db().await;
        let query = SavedQuery {
            id: QueryId(3),
            name: "processes".into(),
            text: "SELECT * FROM processes".into(),
        };
        upsert_query(&db, &query).await.unwrap();
        assert_eq!(get_query(&db, QueryId(3)).await.unwrap(), Some(query));
        assert_eq!(get_query(&db, QueryId(4)).await.unwrap(), None);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn ids_beyond_sqlite_range_never_match() {
        let (db, _dir) = setup_db().await;
        let top = i64::MAX as u64;
        upsert_host(&db, &host(top, "edge")).await.unwrap();
        upsert_label(&db, LabelId(top), "edge").await.unwrap();
        add_label_member(&db, LabelId(top), HostId(top)).await.unwrap();

        let lookup = hosts_by_ids(&db, &[HostId(u64::MAX), HostId(top)]).await.unwrap();
        assert_eq!(lookup.found.len(), 1);
        assert_eq!(lookup.found[0].id, HostId(top));
        assert_eq!(lookup.missing, vec![u64::MAX.to_string()]);

        assert!(label_members(&db, LabelId(u64::MAX)).await.unwrap().is_empty());
        assert_eq!(get_query(&db, QueryId(u64::MAX)).await.unwrap(), None);

        let err = upsert_host(&db, &host(u64::MAX, "overflow")).await.unwrap_err();
        assert!(matches!(err, LiveQueryError::Persistence { .. }));
        assert!(
            add_label_member(&db, LabelId(top), HostId(u64::MAX))
                .await
                .is_err()
        );
        db.close().await.unwrap();
    }
}
