//! mdk-audit
//!
//! Append-only audit trail of memo lifecycle transitions. One event per
//! JSON line, keys sorted, with an optional SHA-256 hash chain
//! (`hash_prev` -> `hash_self`) that [`verify_hash_chain`] can check.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use mdk_schemas::{MemoId, MemoStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Actor recorded when the caller did not name one.
pub const UNKNOWN_ACTOR: &str = "unknown";

/// What happened to a memo, before it is stamped and chained.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRecord {
    pub memo_id: MemoId,
    pub actor: String,
    /// `submit`, `approve`, `escalate`, `markComplete`, `withhold`,
    /// `tagDepartment`.
    pub action: String,
    /// `None` for submission.
    pub from_status: Option<MemoStatus>,
    pub to_status: MemoStatus,
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub memo_id: MemoId,
    pub ts_utc: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    pub from_status: Option<MemoStatus>,
    pub to_status: MemoStatus,
    pub payload: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

/// Append-only audit writer.
pub struct AuditWriter {
    path: PathBuf,
    hash_chain: bool,
    last_hash: Option<String>,
    /// Events written to this log so far; feeds `event_id` derivation.
    seq: u64,
}

impl AuditWriter {
    /// Creates the audit writer and ensures parent dirs exist. Starts a fresh
    /// chain; use [`AuditWriter::resume`] to continue an existing log.
    pub fn new(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create_dir_all {:?}", parent))?;
            }
        }

        Ok(Self {
            path,
            hash_chain,
            last_hash: None,
            seq: 0,
        })
    }

    /// Open `path` for appending, picking up the chain where the last line
    /// left it. A missing file starts a fresh chain.
    pub fn resume(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let mut w = Self::new(path, hash_chain)?;
        if !w.path.exists() {
            return Ok(w);
        }

        let content = fs::read_to_string(&w.path)
            .with_context(|| format!("read audit log {:?}", w.path))?;
        let mut count = 0u64;
        let mut last: Option<AuditEvent> = None;
        for (i, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let ev: AuditEvent = serde_json::from_str(trimmed)
                .with_context(|| format!("parse audit event at line {}", i + 1))?;
            count += 1;
            last = Some(ev);
        }

        w.seq = count;
        w.last_hash = last.and_then(|ev| ev.hash_self);
        Ok(w)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    /// Number of events in the log (including any picked up by `resume`).
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Stamp, chain and append one transition.
    pub fn append(&mut self, record: TransitionRecord) -> Result<AuditEvent> {
        let event_id = derive_event_id(self.last_hash.as_deref(), &record, self.seq)?;

        let mut ev = AuditEvent {
            event_id,
            memo_id: record.memo_id,
            ts_utc: Utc::now(),
            actor: record.actor,
            action: record.action,
            from_status: record.from_status,
            to_status: record.to_status,
            payload: record.payload,
            hash_prev: None,
            hash_self: None,
        };

        if self.hash_chain {
            ev.hash_prev = self.last_hash.clone();
            ev.hash_self = Some(compute_event_hash(&ev)?);
        }

        let line = canonical_json_line(&ev)?;
        append_line(&self.path, &line)?;

        // Only advance once the line is on disk.
        self.seq += 1;
        if self.hash_chain {
            self.last_hash = ev.hash_self.clone();
        }
        Ok(ev)
    }
}

/// Event id from chain position and content: no RNG, so replaying the same
/// transitions against the same chain head yields the same ids.
fn derive_event_id(prev: Option<&str>, record: &TransitionRecord, seq: u64) -> Result<Uuid> {
    let body = serde_json::json!({
        "memo_id": record.memo_id,
        "action": record.action,
        "payload": record.payload,
    });
    let mut hasher = Sha256::new();
    hasher.update(prev.unwrap_or("").as_bytes());
    hasher.update(b"\x1f");
    hasher.update(canonical_json_line(&body)?.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(seq.to_be_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Ok(uuid::Builder::from_random_bytes(bytes).into_uuid())
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open audit log {:?}", path))?;
    let mut buf = String::with_capacity(line.len() + 1);
    buf.push_str(line);
    buf.push('\n');
    f.write_all(buf.as_bytes())
        .context("write audit line failed")?;
    Ok(())
}

fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize audit event failed")?;
    serde_json::to_string(&sort_keys(&raw)).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                out.insert(k.clone(), sort_keys(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// SHA-256 over the canonical line of `ev` with `hash_self` cleared.
pub fn compute_event_hash(ev: &AuditEvent) -> Result<String> {
    let mut clone = ev.clone();
    clone.hash_self = None;

    let canonical = canonical_json_line(&clone)?;
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    /// First line (1-based) where the chain does not hold.
    Broken { line: usize, reason: String },
}

pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read audit log {:?}", path.as_ref()))?;
    verify_hash_chain_str(&content)
}

/// Check every line's `hash_prev` against its predecessor's `hash_self`, and
/// every `hash_self` against a recomputation. Unparseable lines are errors.
pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    let mut prev_hash: Option<String> = None;
    let mut line_count = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let ev: AuditEvent = serde_json::from_str(trimmed)
            .with_context(|| format!("parse audit event at line {}", i + 1))?;
        line_count += 1;

        if ev.hash_prev != prev_hash {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, ev.hash_prev
                ),
            });
        }

        if let Some(claimed) = ev.hash_self.as_deref() {
            let recomputed = compute_event_hash(&ev)?;
            if claimed != recomputed {
                return Ok(VerifyResult::Broken {
                    line: i + 1,
                    reason: format!("hash_self mismatch: claimed {claimed}, recomputed {recomputed}"),
                });
            }
        }

        prev_hash = ev.hash_self;
    }

    Ok(VerifyResult::Valid { lines: line_count })
}
