// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the campaign collaborator traits.

use async_trait::async_trait;
use tracing::debug;

use livequery_config::StorageConfig;
use livequery_core::{
    Campaign, CampaignId, CampaignPersistence, Host, HostDatastore, HostId, HostLookup, LabelId,
    LiveQueryError, QueryCatalog, QueryId, SavedQuery,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed storage.
///
/// One instance serves as campaign persistence, host datastore and query
/// catalog; all three share the same connection.
pub struct SqliteStorage {
    db: Database,
}

impl SqliteStorage {
    /// Opens the database described by `config`, applying migrations.
    pub async fn open(config: &StorageConfig) -> Result<Self, LiveQueryError> {
        let db = Database::open_config(config).await?;
        debug!(path = %config.database_path, "SQLite storage initialized");
        Ok(Self { db })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Verifies the connection answers queries.
    pub async fn health_check(&self) -> Result<(), LiveQueryError> {
        self.db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Campaigns a previous process left waiting or running.
    pub async fn unfinished_campaigns(&self) -> Result<Vec<Campaign>, LiveQueryError> {
        queries::campaigns::list_unfinished(&self.db).await
    }

    pub async fn upsert_host(&self, host: &Host) -> Result<(), LiveQueryError> {
        queries::inventory::upsert_host(&self.db, host).await
    }

    pub async fn upsert_label(&self, id: LabelId, name: &str) -> Result<(), LiveQueryError> {
        queries::inventory::upsert_label(&self.db, id, name).await
    }

    pub async fn add_label_member(
        &self,
        label: LabelId,
        host: HostId,
    ) -> Result<(), LiveQueryError> {
        queries::inventory::add_label_member(&self.db, label, host).await
    }

    pub async fn remove_label_member(
        &self,
        label: LabelId,
        host: HostId,
    ) -> Result<(), LiveQueryError> {
        queries::inventory::remove_label_member(&self.db, label, host).await
    }

    pub async fn upsert_query(&self, query: &SavedQuery) -> Result<(), LiveQueryError> {
        queries::inventory::upsert_query(&self.db, query).await
    }

    /// Checkpoints the WAL and closes the connection.
    pub async fn close(self) -> Result<(), LiveQueryError> {
        self.db.close().await
    }
}

#[async_trait]
impl CampaignPersistence for SqliteStorage {
    async fn save_campaign(&self, campaign: &Campaign) -> Result<(), LiveQueryError> {
        queries::campaigns::save_campaign(&self.db, campaign).await
    }

    async fn load_campaign(&self, id: CampaignId) -> Result<Option<Campaign>, LiveQueryError> {
        queries::campaigns::load_campaign(&self.db, id).await
    }

    async fn last_campaign_id(&self) -> Result<Option<CampaignId>, LiveQueryError> {
        queries::campaigns::last_campaign_id(&self.db).await
    }
}

#[async_trait]
impl HostDatastore for SqliteStorage {
    async fn lookup_hosts_by_ids(&self, ids: &[HostId]) -> Result<HostLookup, LiveQueryError> {
        queries::inventory::hosts_by_ids(&self.db, ids).await
    }

    async fn lookup_hosts_by_identifiers(
        &self,
        identifiers: &[String],
    ) -> Result<HostLookup, LiveQueryError> {
        queries::inventory::hosts_by_identifiers(&self.db, identifiers).await
    }

    async fn lookup_hosts_by_label(&self, label: LabelId) -> Result<Vec<Host>, LiveQueryError> {
        queries::inventory::label_members(&self.db, label).await
    }

    async fn lookup_label_ids_by_names(
        &self,
        names: &[String],
    ) -> Result<Vec<LabelId>, LiveQueryError> {
        queries::inventory::label_ids_by_names(&self.db, names).await
    }
}

#[async_trait]
impl QueryCatalog for SqliteStorage {
    async fn lookup_query(&self, id: QueryId) -> Result<Option<SavedQuery>, LiveQueryError> {
        queries::inventory::get_query(&self.db, id).await
    }
}
