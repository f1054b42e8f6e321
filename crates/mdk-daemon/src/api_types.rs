//! Request and response types for all mdk-daemon HTTP endpoints.
//!
//! Memos and users go over the wire as their `mdk-schemas` shapes; only the
//! envelopes that have no schema counterpart live here.

use mdk_schemas::{MemoError, MemoFilter, MemoStatus};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
    pub store: &'static str,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// `MemoError::kind()`: "not_found" | "user_not_found" |
    /// "invalid_transition" | "validation" | "write"
    pub kind: String,
}

// ---------------------------------------------------------------------------
// Memo listing / streaming
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoQuery {
    pub status: Option<String>,
    pub assigned_to: Option<String>,
}

impl MemoQuery {
    /// Blank values are treated as absent; an unknown status is rejected.
    pub fn to_filter(&self) -> Result<MemoFilter, MemoError> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) => Some(MemoStatus::parse(s)?),
        };
        let assigned_to = self
            .assigned_to
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Ok(MemoFilter {
            status,
            assigned_to,
        })
    }
}

// ---------------------------------------------------------------------------
// Memo transitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApproveRequest {
    pub assigned_to: Option<String>,
    pub actor: Option<String>,
}

/// Body for transitions that carry nothing but the caller's identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorRequest {
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithholdRequest {
    pub reason: String,
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagRequest {
    pub department: String,
    #[serde(default)]
    pub actor: Option<String>,
}

// ---------------------------------------------------------------------------
// Users / roles / catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserRequest {
    pub user_id: String,
    pub phone: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivilegesResponse {
    pub role: String,
    pub privileges: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogResponse {
    pub roles: Vec<String>,
    pub departments: Vec<String>,
}
