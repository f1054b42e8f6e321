//! In-process memo store.
//!
//! Writes build the merged record on a copy and swap it in under the write
//! lock, so readers only ever see the previous or the next full record.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use mdk_schemas::{Memo, MemoDraft, MemoError, MemoFilter, MemoId, MemoPatch, UserRecord};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::{sort_memos, MemoStore, UserStore, DEFAULT_CHANGE_FEED_CAPACITY};

pub struct MemoryMemoStore {
    memos: RwLock<BTreeMap<MemoId, Memo>>,
    users: RwLock<BTreeMap<String, UserRecord>>,
    feed: broadcast::Sender<MemoId>,
    /// Set only through the testkit hook.
    fail_writes: AtomicBool,
}

impl Default for MemoryMemoStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMemoStore {
    pub fn new() -> Self {
        Self::with_feed_capacity(DEFAULT_CHANGE_FEED_CAPACITY)
    }

    pub fn with_feed_capacity(capacity: usize) -> Self {
        let (feed, _rx) = broadcast::channel(capacity.max(1));
        Self {
            memos: RwLock::new(BTreeMap::new()),
            users: RwLock::new(BTreeMap::new()),
            feed,
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent write fail with `MemoError::Write` until reset.
    #[cfg(any(test, feature = "testkit"))]
    pub fn fail_writes_for_test(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of live change-feed receivers (open subscriptions).
    pub fn change_feed_receivers(&self) -> usize {
        self.feed.receiver_count()
    }

    fn check_writable(&self) -> Result<(), MemoError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(MemoError::write("memory store rejected write"));
        }
        Ok(())
    }

    fn notify(&self, id: MemoId) {
        // No receivers is fine: nobody is subscribed yet.
        let _ = self.feed.send(id);
    }
}

#[async_trait]
impl MemoStore for MemoryMemoStore {
    async fn create(&self, draft: MemoDraft) -> Result<MemoId, MemoError> {
        let draft = draft.normalize()?;

        let id = {
            let mut memos = self.memos.write().await;
            self.check_writable()?;

            let mut id = MemoId::new_v4();
            while memos.contains_key(&id) {
                id = MemoId::new_v4();
            }
            memos.insert(id, Memo::from_draft(id, draft, Utc::now()));
            id
        };

        debug!(memo_id = %id, "memory store: created memo");
        self.notify(id);
        Ok(id)
    }

    async fn update(&self, id: MemoId, patch: &MemoPatch) -> Result<Memo, MemoError> {
        let merged = {
            let mut memos = self.memos.write().await;
            let current = memos.get(&id).ok_or(MemoError::NotFound(id))?;

            let mut next = current.clone();
            next.apply_patch(patch, Utc::now());

            self.check_writable()?;
            memos.insert(id, next.clone());
            next
        };

        debug!(memo_id = %id, status = %merged.status, "memory store: merged patch");
        self.notify(id);
        Ok(merged)
    }

    async fn get(&self, id: MemoId) -> Result<Memo, MemoError> {
        self.memos
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(MemoError::NotFound(id))
    }

    async fn list(&self, filter: &MemoFilter) -> Result<Vec<Memo>, MemoError> {
        let mut out: Vec<Memo> = self
            .memos
            .read()
            .await
            .values()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        sort_memos(&mut out);
        Ok(out)
    }

    fn changes(&self) -> broadcast::Receiver<MemoId> {
        self.feed.subscribe()
    }
}

#[async_trait]
impl UserStore for MemoryMemoStore {
    async fn put_user(&self, user: UserRecord) -> Result<(), MemoError> {
        let mut users = self.users.write().await;
        self.check_writable()?;
        debug!(user_id = %user.user_id, role = %user.role, "memory store: put user");
        users.insert(user.user_id.clone(), user);
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<UserRecord, MemoError> {
        self.users
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| MemoError::UserNotFound(user_id.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
