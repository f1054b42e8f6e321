use std::sync::{Arc, Mutex};

use mdk_audit::{AuditWriter, TransitionRecord};
use mdk_db::{subscribe, MemoStore, MemoSubscription, UserStore};
use mdk_schemas::{Memo, MemoDraft, MemoError, MemoFilter, MemoId, Role, User, UserRecord};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::engine::{plan_transition, MemoAction};
use crate::roles::user_view;

/// Memo operations as callers see them: every transition goes through the
/// engine, is merged by the store in one step, then audited and logged.
///
/// Errors are returned as-is. Nothing is retried.
pub struct LifecycleService {
    memos: Arc<dyn MemoStore>,
    users: Arc<dyn UserStore>,
    audit: Option<Mutex<AuditWriter>>,
}

impl LifecycleService {
    pub fn new(memos: Arc<dyn MemoStore>, users: Arc<dyn UserStore>) -> Self {
        Self {
            memos,
            users,
            audit: None,
        }
    }

    /// One store serving both memos and users.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: MemoStore + UserStore + 'static,
    {
        Self::new(store.clone(), store)
    }

    /// Append every committed transition to `writer`.
    pub fn with_audit(mut self, writer: AuditWriter) -> Self {
        self.audit = Some(Mutex::new(writer));
        self
    }

    pub fn memo_store(&self) -> Arc<dyn MemoStore> {
        Arc::clone(&self.memos)
    }

    // -----------------------------------------------------------------------
    // Memos
    // -----------------------------------------------------------------------

    pub async fn submit(&self, draft: MemoDraft, actor: &str) -> Result<Memo, MemoError> {
        let id = match self.memos.create(draft).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "memo submit rejected");
                return Err(e);
            }
        };
        let memo = self.memos.get(id).await?;

        self.record(TransitionRecord {
            memo_id: id,
            actor: actor.to_string(),
            action: "submit".to_string(),
            from_status: None,
            to_status: memo.status,
            payload: json!({
                "raisedBy": memo.raised_by,
                "title": memo.title,
                "departments": memo.departments,
            }),
        });
        info!(memo_id = %id, raised_by = %memo.raised_by, actor, "memo submitted");
        Ok(memo)
    }

    pub async fn approve(
        &self,
        id: MemoId,
        assigned_to: Option<String>,
        actor: &str,
    ) -> Result<Memo, MemoError> {
        self.transition(id, MemoAction::Approve { assigned_to }, actor).await
    }

    pub async fn escalate(&self, id: MemoId, actor: &str) -> Result<Memo, MemoError> {
        self.transition(id, MemoAction::Escalate, actor).await
    }

    pub async fn mark_complete(&self, id: MemoId, actor: &str) -> Result<Memo, MemoError> {
        self.transition(id, MemoAction::MarkComplete, actor).await
    }

    pub async fn withhold(
        &self,
        id: MemoId,
        reason: impl Into<String>,
        actor: &str,
    ) -> Result<Memo, MemoError> {
        let reason = reason.into();
        self.transition(id, MemoAction::Withhold { reason }, actor).await
    }

    pub async fn tag_department(
        &self,
        id: MemoId,
        department: impl Into<String>,
        actor: &str,
    ) -> Result<Memo, MemoError> {
        let department = department.into();
        self.transition(id, MemoAction::TagDepartment { department }, actor)
            .await
    }

    /// get -> plan -> merge -> audit. A planned no-op returns the memo as read
    /// and writes nothing.
    pub async fn transition(
        &self,
        id: MemoId,
        action: MemoAction,
        actor: &str,
    ) -> Result<Memo, MemoError> {
        let current = self.memos.get(id).await?;

        let patch = match plan_transition(&current, &action) {
            Ok(Some(patch)) => patch,
            Ok(None) => {
                debug!(memo_id = %id, action = action.name(), "memo transition is a no-op");
                return Ok(current);
            }
            Err(e) => {
                warn!(
                    memo_id = %id,
                    action = action.name(),
                    status = %current.status,
                    error = %e,
                    "memo transition rejected"
                );
                return Err(e);
            }
        };

        let merged = match self.memos.update(id, &patch).await {
            Ok(m) => m,
            Err(e) => {
                warn!(memo_id = %id, action = action.name(), error = %e, "memo update failed");
                return Err(e);
            }
        };

        self.record(TransitionRecord {
            memo_id: id,
            actor: actor.to_string(),
            action: action.name().to_string(),
            from_status: Some(current.status),
            to_status: merged.status,
            payload: serde_json::to_value(&patch).unwrap_or_default(),
        });
        info!(
            memo_id = %id,
            action = action.name(),
            from = %current.status,
            to = %merged.status,
            escalation_level = merged.escalation_level,
            actor,
            "memo transition committed"
        );
        Ok(merged)
    }

    pub async fn get(&self, id: MemoId) -> Result<Memo, MemoError> {
        self.memos.get(id).await
    }

    pub async fn list(&self, filter: &MemoFilter) -> Result<Vec<Memo>, MemoError> {
        self.memos.list(filter).await
    }

    /// Cancellable stream of filtered snapshots; see [`mdk_db::subscribe`].
    pub fn subscribe(&self, filter: MemoFilter) -> MemoSubscription {
        subscribe(self.memo_store(), filter)
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    pub async fn register_user(
        &self,
        user_id: &str,
        phone: &str,
        role: &str,
    ) -> Result<User, MemoError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(MemoError::validation("userId is required"));
        }
        let phone = phone.trim();
        if phone.is_empty() {
            return Err(MemoError::validation("phone is required"));
        }
        let role = Role::parse(role)?;

        let record = UserRecord {
            user_id: user_id.to_string(),
            phone: phone.to_string(),
            role,
        };
        self.users.put_user(record.clone()).await?;
        info!(user_id, role = %role, "user registered");
        Ok(user_view(record))
    }

    pub async fn get_user(&self, user_id: &str) -> Result<User, MemoError> {
        self.users.get_user(user_id.trim()).await.map(user_view)
    }

    // -----------------------------------------------------------------------
    // Audit
    // -----------------------------------------------------------------------

    /// The store write already happened; an audit failure is logged, not
    /// returned.
    fn record(&self, rec: TransitionRecord) {
        let Some(audit) = &self.audit else {
            return;
        };
        let memo_id = rec.memo_id;
        match audit.lock() {
            Ok(mut writer) => {
                if let Err(e) = writer.append(rec) {
                    warn!(memo_id = %memo_id, error = %e, "audit append failed");
                }
            }
            Err(_) => warn!(memo_id = %memo_id, "audit writer lock poisoned"),
        }
    }
}
