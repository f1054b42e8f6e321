//! mdk-db
//!
//! Memo Store: persistence for memo documents and registered users.
//!
//! - [`MemoStore`] / [`UserStore`] are the seams every caller goes through.
//! - [`MemoryMemoStore`] keeps everything in-process (daemon default, tests).
//! - [`PgMemoStore`] persists to Postgres with embedded migrations.
//! - [`subscribe`] turns a store's change feed into a cancellable stream of
//!   filtered snapshots.
//!
//! Every `update` is one atomic merge. Concurrent transitions on the same memo
//! resolve last-write-wins; there is no version guard.

use anyhow::{Context, Result};
use async_trait::async_trait;
use mdk_schemas::{Memo, MemoDraft, MemoError, MemoFilter, MemoId, MemoPatch, UserRecord};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::sync::broadcast;

mod memory;
mod postgres;
mod subscription;

pub use memory::MemoryMemoStore;
pub use postgres::PgMemoStore;
pub use subscription::{subscribe, MemoSubscription};

pub const ENV_DB_URL: &str = "MDK_DATABASE_URL";

/// Default capacity of a store's change feed.
pub const DEFAULT_CHANGE_FEED_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// Store traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait MemoStore: Send + Sync {
    /// Persist a new memo as `Pending` with `escalationLevel = 0` and return
    /// its freshly assigned id. The draft is normalized first; a draft that
    /// fails validation is never written.
    async fn create(&self, draft: MemoDraft) -> Result<MemoId, MemoError>;

    /// Merge `patch` into the stored memo in one step and return the result.
    /// On error the prior record is untouched.
    async fn update(&self, id: MemoId, patch: &MemoPatch) -> Result<Memo, MemoError>;

    async fn get(&self, id: MemoId) -> Result<Memo, MemoError>;

    /// Memos matching `filter`, oldest first (ties broken by id).
    async fn list(&self, filter: &MemoFilter) -> Result<Vec<Memo>, MemoError>;

    /// Change feed: the id of every memo created or updated from now on.
    fn changes(&self) -> broadcast::Receiver<MemoId>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert or overwrite the record for `user.user_id`.
    async fn put_user(&self, user: UserRecord) -> Result<(), MemoError>;

    async fn get_user(&self, user_id: &str) -> Result<UserRecord, MemoError>;
}

// ---------------------------------------------------------------------------
// Postgres plumbing
// ---------------------------------------------------------------------------

/// Connect to Postgres using MDK_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url, 10).await
}

pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='memos'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_memos_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_memos_table: bool,
}

/// Sort memos the way every `list` implementation returns them.
pub(crate) fn sort_memos(memos: &mut [Memo]) {
    memos.sort_by(|a, b| {
        a.created_at_utc
            .cmp(&b.created_at_utc)
            .then_with(|| a.id.cmp(&b.id))
    });
}
