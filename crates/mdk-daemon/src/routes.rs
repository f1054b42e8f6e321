//! Axum router and all HTTP handlers for mdk-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers, tests drive the bare router.

use std::{convert::Infallible, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{stream, Stream, StreamExt};
use mdk_audit::UNKNOWN_ACTOR;
use mdk_lifecycle::privilege_names;
use mdk_schemas::{MemoDraft, MemoError, MemoId, Role, DEPARTMENTS};
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use crate::{
    api_types::{
        ActorRequest, ApproveRequest, CatalogResponse, ErrorResponse, HealthResponse, MemoQuery,
        PrivilegesResponse, RegisterUserRequest, TagRequest, WithholdRequest,
    },
    state::{AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/memos", post(submit_memo).get(list_memos))
        .route("/v1/memos/stream", get(memo_stream))
        .route("/v1/memos/:id", get(get_memo))
        .route("/v1/memos/:id/approve", post(approve_memo))
        .route("/v1/memos/:id/escalate", post(escalate_memo))
        .route("/v1/memos/:id/complete", post(complete_memo))
        .route("/v1/memos/:id/withhold", post(withhold_memo))
        .route("/v1/memos/:id/tag", post(tag_memo))
        .route("/v1/users", post(register_user))
        .route("/v1/users/:id", get(get_user))
        .route("/v1/roles/:role/privileges", get(role_privileges))
        .route("/v1/catalog", get(catalog))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// `MemoError` rendered as `{error, kind}` with a matching status code.
pub struct ApiError(pub MemoError);

impl From<MemoError> for ApiError {
    fn from(e: MemoError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            MemoError::NotFound(_) | MemoError::UserNotFound(_) => StatusCode::NOT_FOUND,
            MemoError::InvalidTransition { .. } => StatusCode::CONFLICT,
            MemoError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MemoError::Write(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        debug!(status = status.as_u16(), kind = self.0.kind(), error = %self.0, "request refused");
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                kind: self.0.kind().to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn parse_id(raw: &str) -> ApiResult<MemoId> {
    Ok(raw.parse::<MemoId>()?)
}

/// Body for endpoints whose every field is optional: an empty body is the
/// default request, anything else must parse.
fn optional_body<T: DeserializeOwned + Default>(raw: &Bytes) -> ApiResult<T> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    required_body(raw)
}

/// JSON body regardless of `Content-Type`; failures become `Validation`.
fn required_body<T: DeserializeOwned>(raw: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(raw)
        .map_err(|e| ApiError(MemoError::validation(format!("malformed request body: {e}"))))
}

fn actor_or_unknown(actor: Option<String>) -> String {
    actor
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| UNKNOWN_ACTOR.to_string())
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
            store: st.store_backend,
        }),
    )
}

// ---------------------------------------------------------------------------
// /v1/memos
// ---------------------------------------------------------------------------

pub(crate) async fn submit_memo(
    State(st): State<Arc<AppState>>,
    raw: Bytes,
) -> ApiResult<Response> {
    let draft: MemoDraft = required_body(&raw)?;
    let actor = actor_or_unknown(Some(draft.raised_by.clone()));
    let memo = st.service.submit(draft, &actor).await?;
    Ok((StatusCode::CREATED, Json(memo)).into_response())
}

pub(crate) async fn list_memos(
    State(st): State<Arc<AppState>>,
    Query(q): Query<MemoQuery>,
) -> ApiResult<Response> {
    let filter = q.to_filter()?;
    let memos = st.service.list(&filter).await?;
    Ok((StatusCode::OK, Json(memos)).into_response())
}

pub(crate) async fn get_memo(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let memo = st.service.get(parse_id(&id)?).await?;
    Ok((StatusCode::OK, Json(memo)).into_response())
}

pub(crate) async fn approve_memo(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    raw: Bytes,
) -> ApiResult<Response> {
    let id = parse_id(&id)?;
    let req: ApproveRequest = optional_body(&raw)?;
    let actor = actor_or_unknown(req.actor);
    let memo = st.service.approve(id, req.assigned_to, &actor).await?;
    Ok((StatusCode::OK, Json(memo)).into_response())
}

pub(crate) async fn escalate_memo(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    raw: Bytes,
) -> ApiResult<Response> {
    let id = parse_id(&id)?;
    let req: ActorRequest = optional_body(&raw)?;
    let memo = st.service.escalate(id, &actor_or_unknown(req.actor)).await?;
    Ok((StatusCode::OK, Json(memo)).into_response())
}

pub(crate) async fn complete_memo(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    raw: Bytes,
) -> ApiResult<Response> {
    let id = parse_id(&id)?;
    let req: ActorRequest = optional_body(&raw)?;
    let memo = st
        .service
        .mark_complete(id, &actor_or_unknown(req.actor))
        .await?;
    Ok((StatusCode::OK, Json(memo)).into_response())
}

pub(crate) async fn withhold_memo(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    raw: Bytes,
) -> ApiResult<Response> {
    let id = parse_id(&id)?;
    let req: WithholdRequest = required_body(&raw)?;
    let actor = actor_or_unknown(req.actor);
    let memo = st.service.withhold(id, req.reason, &actor).await?;
    Ok((StatusCode::OK, Json(memo)).into_response())
}

pub(crate) async fn tag_memo(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    raw: Bytes,
) -> ApiResult<Response> {
    let id = parse_id(&id)?;
    let req: TagRequest = required_body(&raw)?;
    let actor = actor_or_unknown(req.actor);
    let memo = st.service.tag_department(id, req.department, &actor).await?;
    Ok((StatusCode::OK, Json(memo)).into_response())
}

// ---------------------------------------------------------------------------
// GET /v1/memos/stream  (SSE)
// ---------------------------------------------------------------------------

/// Filtered memo snapshots as `snapshot` events, interleaved with bus
/// heartbeats. The subscription lives as long as the client connection.
pub(crate) async fn memo_stream(
    State(st): State<Arc<AppState>>,
    Query(q): Query<MemoQuery>,
) -> Response {
    let filter = match q.to_filter() {
        Ok(f) => f,
        Err(e) => return ApiError(e).into_response(),
    };

    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let snapshots = st.service.subscribe(filter).filter_map(|item| async move {
        let event = match item {
            Ok(snap) => Event::default()
                .event("snapshot")
                .data(serde_json::to_string(&snap).ok()?),
            Err(e) => Event::default().event("error").data(e.to_string()),
        };
        Some(Ok::<_, Infallible>(event))
    });
    let events = stream::select(snapshots, broadcast_to_sse(st.bus.subscribe()));

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m @ BusMsg::Heartbeat { .. }) => {
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event("heartbeat").data(data)))
            }
            Err(_) => None, // lagged
        }
    })
}

// ---------------------------------------------------------------------------
// /v1/users, /v1/roles, /v1/catalog
// ---------------------------------------------------------------------------

pub(crate) async fn register_user(
    State(st): State<Arc<AppState>>,
    raw: Bytes,
) -> ApiResult<Response> {
    let req: RegisterUserRequest = required_body(&raw)?;
    let user = st
        .service
        .register_user(&req.user_id, &req.phone, &req.role)
        .await?;
    Ok((StatusCode::CREATED, Json(user)).into_response())
}

pub(crate) async fn get_user(
    State(st): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> ApiResult<Response> {
    let user = st.service.get_user(&user_id).await?;
    Ok((StatusCode::OK, Json(user)).into_response())
}

pub(crate) async fn role_privileges(Path(role): Path<String>) -> impl IntoResponse {
    let privileges = privilege_names(&role)
        .into_iter()
        .map(str::to_string)
        .collect();
    (StatusCode::OK, Json(PrivilegesResponse { role, privileges }))
}

pub(crate) async fn catalog() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(CatalogResponse {
            roles: Role::ALL.iter().map(|r| r.as_str().to_string()).collect(),
            departments: DEPARTMENTS.iter().map(|d| d.to_string()).collect(),
        }),
    )
}
