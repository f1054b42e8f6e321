//! Filtered snapshot subscriptions.
//!
//! A subscription is a lazy stream over a store's change feed. The first item
//! is the filtered set as it stands; every later item is a re-read taken after
//! a change, emitted only when the filtered set actually differs from the last
//! one delivered. Dropping the stream (or calling [`MemoSubscription::cancel`])
//! releases the feed receiver and nothing further is delivered.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::Utc;
use futures_util::stream::{self, BoxStream, Stream};
use mdk_schemas::{Memo, MemoError, MemoFilter, MemoId, MemoSnapshot};
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};

use crate::MemoStore;

pub struct MemoSubscription {
    filter: MemoFilter,
    inner: BoxStream<'static, Result<MemoSnapshot, MemoError>>,
}

impl MemoSubscription {
    pub fn filter(&self) -> &MemoFilter {
        &self.filter
    }

    /// Stop the subscription. Equivalent to dropping it.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Stream for MemoSubscription {
    type Item = Result<MemoSnapshot, MemoError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

struct SubState {
    store: Arc<dyn MemoStore>,
    filter: MemoFilter,
    rx: broadcast::Receiver<MemoId>,
    last: Option<Vec<Memo>>,
    seq: u64,
    primed: bool,
}

impl SubState {
    /// Wait for the next change, then swallow whatever else is already queued
    /// so a burst of writes costs one re-read. Returns false once the feed is
    /// closed.
    async fn wait_for_change(&mut self) -> bool {
        match self.rx.recv().await {
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => return false,
        }
        loop {
            match self.rx.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Closed) => return true,
            }
        }
    }
}

/// Subscribe to the memos matching `filter`.
///
/// The change-feed receiver is taken before the first read, so no write that
/// lands after this call can be missed. Restart by calling `subscribe` again.
pub fn subscribe(store: Arc<dyn MemoStore>, filter: MemoFilter) -> MemoSubscription {
    let rx = store.changes();
    let state = SubState {
        store,
        filter: filter.clone(),
        rx,
        last: None,
        seq: 0,
        primed: false,
    };

    let inner = stream::unfold(state, |mut st| async move {
        loop {
            if st.primed && !st.wait_for_change().await {
                return None;
            }
            st.primed = true;

            match st.store.list(&st.filter).await {
                Ok(memos) => {
                    if st.last.as_ref() == Some(&memos) {
                        continue;
                    }
                    let snap = MemoSnapshot {
                        seq: st.seq,
                        taken_at_utc: Utc::now(),
                        memos: memos.clone(),
                    };
                    st.seq += 1;
                    st.last = Some(memos);
                    return Some((Ok(snap), st));
                }
                Err(e) => return Some((Err(e), st)),
            }
        }
    });

    MemoSubscription {
        filter,
        inner: Box::pin(inner),
    }
}
