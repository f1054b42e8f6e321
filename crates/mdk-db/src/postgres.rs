//! Postgres-backed memo store.
//!
//! `create` is a single INSERT and `update` a single UPDATE ... RETURNING, so
//! per-row atomicity comes from Postgres. The change feed is in-process: it
//! reports writes made through this store instance.

use async_trait::async_trait;
use mdk_schemas::{
    Memo, MemoDraft, MemoError, MemoFilter, MemoId, MemoPatch, MemoStatus, Role, UserRecord,
};
use sqlx::{postgres::PgRow, PgPool, Row};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::{MemoStore, UserStore, DEFAULT_CHANGE_FEED_CAPACITY};

const MEMO_COLUMNS: &str = r#"
    memo_id, title, description, nature_of_complaint, raised_by, status,
    assigned_to, escalation_level, tagged_departments, notes, ward, floor,
    duty_timing, departments, created_at_utc, updated_at_utc
"#;

pub struct PgMemoStore {
    pool: PgPool,
    feed: broadcast::Sender<MemoId>,
}

impl PgMemoStore {
    pub fn new(pool: PgPool) -> Self {
        Self::with_feed_capacity(pool, DEFAULT_CHANGE_FEED_CAPACITY)
    }

    pub fn with_feed_capacity(pool: PgPool, capacity: usize) -> Self {
        let (feed, _rx) = broadcast::channel(capacity.max(1));
        Self { pool, feed }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn notify(&self, id: MemoId) {
        let _ = self.feed.send(id);
    }
}

fn memo_from_row(row: &PgRow) -> Result<Memo, MemoError> {
    let status: String = row.try_get("status").map_err(MemoError::write)?;
    let level: i32 = row.try_get("escalation_level").map_err(MemoError::write)?;
    let escalation_level = u32::try_from(level)
        .map_err(|_| MemoError::write(format!("negative escalation_level in row: {level}")))?;

    Ok(Memo {
        id: MemoId(row.try_get::<Uuid, _>("memo_id").map_err(MemoError::write)?),
        title: row.try_get("title").map_err(MemoError::write)?,
        description: row.try_get("description").map_err(MemoError::write)?,
        nature_of_complaint: row.try_get("nature_of_complaint").map_err(MemoError::write)?,
        raised_by: row.try_get("raised_by").map_err(MemoError::write)?,
        status: MemoStatus::parse(&status)
            .map_err(|_| MemoError::write(format!("invalid status in row: {status}")))?,
        assigned_to: row.try_get("assigned_to").map_err(MemoError::write)?,
        escalation_level,
        tagged_departments: row.try_get("tagged_departments").map_err(MemoError::write)?,
        notes: row.try_get("notes").map_err(MemoError::write)?,
        ward: row.try_get("ward").map_err(MemoError::write)?,
        floor: row.try_get("floor").map_err(MemoError::write)?,
        duty_timing: row.try_get("duty_timing").map_err(MemoError::write)?,
        departments: row.try_get("departments").map_err(MemoError::write)?,
        created_at_utc: row.try_get("created_at_utc").map_err(MemoError::write)?,
        updated_at_utc: row.try_get("updated_at_utc").map_err(MemoError::write)?,
    })
}

#[async_trait]
impl MemoStore for PgMemoStore {
    async fn create(&self, draft: MemoDraft) -> Result<MemoId, MemoError> {
        let draft = draft.normalize()?;
        let id = MemoId::new_v4();

        sqlx::query(
            r#"
            insert into memos (
              memo_id, title, description, nature_of_complaint, raised_by,
              ward, floor, duty_timing, departments
            ) values (
              $1, $2, $3, $4, $5, $6, $7, $8, $9
            )
            "#,
        )
        .bind(id.as_uuid())
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(&draft.nature_of_complaint)
        .bind(&draft.raised_by)
        .bind(&draft.ward)
        .bind(&draft.floor)
        .bind(&draft.duty_timing)
        .bind(&draft.departments)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoError::write(format!("insert memo failed: {e}")))?;

        debug!(memo_id = %id, "pg store: created memo");
        self.notify(id);
        Ok(id)
    }

    async fn update(&self, id: MemoId, patch: &MemoPatch) -> Result<Memo, MemoError> {
        let sql = format!(
            r#"
            update memos
            set status             = coalesce($2, status),
                assigned_to        = coalesce($3, assigned_to),
                escalation_level   = escalation_level + $4,
                tagged_departments = case
                                       when $5::text is null then tagged_departments
                                       when $5::text = any(tagged_departments) then tagged_departments
                                       else array_append(tagged_departments, $5::text)
                                     end,
                notes              = coalesce($6, notes),
                updated_at_utc     = now()
            where memo_id = $1
            returning {MEMO_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(patch.status.map(|s| s.as_str()))
            .bind(patch.assigned_to.as_deref())
            .bind(if patch.escalate { 1_i32 } else { 0_i32 })
            .bind(patch.tag_department.as_deref())
            .bind(patch.notes.as_deref())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoError::write(format!("update memo failed: {e}")))?
            .ok_or(MemoError::NotFound(id))?;

        let merged = memo_from_row(&row)?;
        debug!(memo_id = %id, status = %merged.status, "pg store: merged patch");
        self.notify(id);
        Ok(merged)
    }

    async fn get(&self, id: MemoId) -> Result<Memo, MemoError> {
        let sql = format!("select {MEMO_COLUMNS} from memos where memo_id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoError::write(format!("fetch memo failed: {e}")))?
            .ok_or(MemoError::NotFound(id))?;
        memo_from_row(&row)
    }

    async fn list(&self, filter: &MemoFilter) -> Result<Vec<Memo>, MemoError> {
        let sql = format!(
            r#"
            select {MEMO_COLUMNS}
            from memos
            where ($1::text is null or status = $1::text)
              and ($2::text is null or assigned_to = $2::text)
            order by created_at_utc asc, memo_id asc
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.assigned_to.as_deref())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoError::write(format!("list memos failed: {e}")))?;

        rows.iter().map(memo_from_row).collect()
    }

    fn changes(&self) -> broadcast::Receiver<MemoId> {
        self.feed.subscribe()
    }
}

#[async_trait]
impl UserStore for PgMemoStore {
    async fn put_user(&self, user: UserRecord) -> Result<(), MemoError> {
        sqlx::query(
            r#"
            insert into users (user_id, phone, role)
            values ($1, $2, $3)
            on conflict (user_id) do update
              set phone = excluded.phone,
                  role = excluded.role,
                  updated_at_utc = now()
            "#,
        )
        .bind(&user.user_id)
        .bind(&user.phone)
        .bind(user.role.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoError::write(format!("upsert user failed: {e}")))?;

        debug!(user_id = %user.user_id, role = %user.role, "pg store: put user");
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<UserRecord, MemoError> {
        let row = sqlx::query("select user_id, phone, role from users where user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoError::write(format!("fetch user failed: {e}")))?
            .ok_or_else(|| MemoError::UserNotFound(user_id.to_string()))?;

        let role: String = row.try_get("role").map_err(MemoError::write)?;
        Ok(UserRecord {
            user_id: row.try_get("user_id").map_err(MemoError::write)?,
            phone: row.try_get("phone").map_err(MemoError::write)?,
            role: Role::parse(&role)
                .map_err(|_| MemoError::write(format!("invalid role in row: {role}")))?,
        })
    }
}
