//! Filtered subscriptions only ever carry memos that match their filter, and
//! emit a fresh snapshot whenever the filtered set changes.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use mdk_db::{subscribe, MemoStore, MemoSubscription, MemoryMemoStore};
use mdk_schemas::{MemoDraft, MemoFilter, MemoId, MemoPatch, MemoSnapshot, MemoStatus};

async fn next_snapshot(sub: &mut MemoSubscription) -> MemoSnapshot {
    tokio::time::timeout(Duration::from_secs(2), sub.next())
        .await
        .expect("timed out waiting for snapshot")
        .expect("subscription ended")
        .expect("snapshot read failed")
}

fn ids(snap: &MemoSnapshot) -> Vec<MemoId> {
    snap.memos.iter().map(|m| m.id).collect()
}

fn approve_patch(assignee: &str) -> MemoPatch {
    MemoPatch {
        status: Some(MemoStatus::Approved),
        assigned_to: Some(assignee.to_string()),
        ..MemoPatch::default()
    }
}

#[tokio::test]
async fn pending_subscription_never_yields_non_pending_memo() {
    let store = Arc::new(MemoryMemoStore::new());
    let mut sub = subscribe(store.clone(), MemoFilter::status(MemoStatus::Pending));

    let first = next_snapshot(&mut sub).await;
    assert_eq!(first.seq, 0);
    assert!(first.memos.is_empty());

    let a = store
        .create(MemoDraft::new("Leak", "Alice", "pipe leak"))
        .await
        .unwrap();
    let snap = next_snapshot(&mut sub).await;
    assert_eq!(ids(&snap), vec![a]);

    let b = store
        .create(MemoDraft::new("Fan", "Bob", "ceiling fan broken"))
        .await
        .unwrap();
    let snap = next_snapshot(&mut sub).await;
    assert_eq!(ids(&snap), vec![a, b]);

    store.update(a, &approve_patch("Civil")).await.unwrap();
    let snap = next_snapshot(&mut sub).await;
    assert_eq!(ids(&snap), vec![b]);

    for snap in [&first, &snap] {
        assert!(snap.memos.iter().all(|m| m.status == MemoStatus::Pending));
    }
}

#[tokio::test]
async fn assignee_subscription_sees_memo_once_assigned() {
    let store = Arc::new(MemoryMemoStore::new());
    let id = store
        .create(MemoDraft::new("Leak", "Alice", "pipe leak"))
        .await
        .unwrap();

    let mut sub = subscribe(store.clone(), MemoFilter::assigned_to("Civil"));
    assert!(next_snapshot(&mut sub).await.memos.is_empty());

    store.update(id, &approve_patch("Civil")).await.unwrap();
    let snap = next_snapshot(&mut sub).await;
    assert_eq!(ids(&snap), vec![id]);
    assert_eq!(snap.memos[0].assigned_to.as_deref(), Some("Civil"));
}

#[tokio::test]
async fn unrelated_writes_do_not_produce_duplicate_snapshots() {
    let store = Arc::new(MemoryMemoStore::new());
    let mut sub = subscribe(store.clone(), MemoFilter::assigned_to("Laundry"));
    assert!(next_snapshot(&mut sub).await.memos.is_empty());

    // Writes outside the filter change nothing the subscriber can see.
    for i in 0..3 {
        store
            .create(MemoDraft::new(format!("Memo {i}"), "Alice", "noise"))
            .await
            .unwrap();
    }
    let quiet = tokio::time::timeout(Duration::from_millis(200), sub.next()).await;
    assert!(quiet.is_err(), "no snapshot expected for unrelated writes");

    let id = store
        .create(MemoDraft::new("Sheets", "Carol", "linen shortage"))
        .await
        .unwrap();
    store.update(id, &approve_patch("Laundry")).await.unwrap();
    let snap = next_snapshot(&mut sub).await;
    assert_eq!(snap.seq, 1);
    assert_eq!(ids(&snap), vec![id]);
}

#[tokio::test]
async fn lagged_feed_still_converges_to_latest_set() {
    let store = Arc::new(MemoryMemoStore::with_feed_capacity(1));
    let mut sub = subscribe(store.clone(), MemoFilter::all());
    assert!(next_snapshot(&mut sub).await.memos.is_empty());

    let mut created = Vec::new();
    for i in 0..10 {
        created.push(
            store
                .create(MemoDraft::new(format!("Memo {i}"), "Alice", "burst"))
                .await
                .unwrap(),
        );
    }

    let mut latest = next_snapshot(&mut sub).await;
    while latest.memos.len() < created.len() {
        latest = next_snapshot(&mut sub).await;
    }
    let mut got = ids(&latest);
    got.sort();
    created.sort();
    assert_eq!(got, created);
}
