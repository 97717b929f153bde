//! Router assembly and the sync protocol handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::middleware;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use ferrotask_core::sync::wire::{
    ConflictItem, ItemKind, PullResponse, PushRequest, PushResponse, SyncItem,
};

use crate::auth::{self, AuthenticatedUser};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::store::{ProjectWrite, ServerProject, ServerStore, ServerTask, TaskWrite};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<ServerStore>,
}

impl AppState {
    pub fn from_config(config: Arc<AppConfig>) -> Result<Self, AppError> {
        let store = Arc::new(ServerStore::open(&config.database_path)?);
        Ok(Self { config, store })
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout))
        .route("/sync", get(sync_pull).post(sync_push))
        .route("/clear", post(clear))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    let api = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/magic-link", post(auth::magic_link))
        .route("/magic-link/:token", get(auth::magic_link_verify))
        .merge(protected);

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}

#[derive(Debug, Deserialize)]
struct PullQuery {
    #[serde(default)]
    since: i64,
}

/// `GET /sync?since=V`: every row with `sync_version > V`, deleted rows
/// included. Ordering within the response is unspecified.
async fn sync_pull(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<PullQuery>,
) -> Result<Json<PullResponse>, AppError> {
    let since = query.since;

    let mut items = Vec::new();
    for project in state.store.projects_changed_since(&user.user_id, since)? {
        items.push(project_to_item(project));
    }
    for task in state.store.tasks_changed_since(&user.user_id, since)? {
        items.push(task_to_item(task));
    }

    let sync_version = items
        .iter()
        .map(|item| item.sync_version)
        .fold(since, i64::max);

    tracing::debug!(
        user = short_id(&user.user_id),
        since,
        items = items.len(),
        "sync pull"
    );

    Ok(Json(PullResponse {
        items,
        sync_version,
    }))
}

/// `POST /sync`: per item, detect a stale write, otherwise upsert with a
/// fresh version. Undecodable items are skipped, never the whole batch.
async fn sync_push(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<PushRequest>,
) -> Result<Json<PushResponse>, AppError> {
    tracing::debug!(
        user = short_id(&user.user_id),
        items = request.items.len(),
        "sync push received"
    );

    let mut updated = Vec::new();
    let mut conflicts = Vec::new();

    for mut item in request.items {
        let client_time = parse_client_time(item.client_updated_at.as_deref(), &item.client_id);

        match item.kind {
            ItemKind::Project => {
                if let Some(current) =
                    state.store.project_for_conflict(&user.user_id, &item.client_id)?
                {
                    if is_stale_write(client_time, current.client_updated_at) {
                        log_conflict(&item, current.client_updated_at, client_time);
                        conflicts.push(ConflictItem {
                            client_id: item.client_id.clone(),
                            kind: ItemKind::Project,
                            server_version: current.sync_version,
                            server_data: project_to_item(current),
                            client_data: item,
                        });
                        continue;
                    }
                }

                let Some(data) = decode_blob(item.encrypted_data.as_deref()) else {
                    tracing::warn!(id = %item.client_id, "push: invalid project metadata blob, skipping");
                    continue;
                };
                let slug = non_empty(item.slug.as_deref()).unwrap_or(&item.client_id);
                let name = non_empty(item.name.as_deref()).unwrap_or(slug);

                let version = state.store.upsert_project(
                    &user.user_id,
                    &ProjectWrite {
                        client_id: &item.client_id,
                        slug,
                        name,
                        color: "#4ECDC4",
                        encrypted_data: &data,
                        deleted: item.deleted,
                        client_updated_at: client_time,
                    },
                )?;
                item.sync_version = version;
                updated.push(item);
            }
            ItemKind::Task => {
                if let Some(current) =
                    state.store.task_for_conflict(&user.user_id, &item.client_id)?
                {
                    if is_stale_write(client_time, current.client_updated_at) {
                        log_conflict(&item, current.client_updated_at, client_time);
                        conflicts.push(ConflictItem {
                            client_id: item.client_id.clone(),
                            kind: ItemKind::Task,
                            server_version: current.sync_version,
                            server_data: task_to_item(current),
                            client_data: item,
                        });
                        continue;
                    }
                }

                let Some(content) = decode_blob(item.encrypted_content.as_deref()) else {
                    tracing::warn!(id = %item.client_id, "push: invalid content blob, skipping");
                    continue;
                };

                let status = item.status.unwrap_or_default();
                let priority = item.priority.unwrap_or_default();
                let version = state.store.upsert_task(
                    &user.user_id,
                    &TaskWrite {
                        client_id: &item.client_id,
                        project_id: item.project_id.as_deref().unwrap_or("inbox"),
                        encrypted_content: &content,
                        status: status.as_str(),
                        priority: priority.into(),
                        due_date: non_empty(item.due_date.as_deref()),
                        deleted: item.deleted,
                        client_updated_at: client_time,
                    },
                )?;
                item.sync_version = version;
                updated.push(item);
            }
            ItemKind::Unknown => {
                tracing::warn!(id = %item.client_id, "push: unrecognized item type, skipping");
            }
        }
    }

    tracing::info!(
        user = short_id(&user.user_id),
        updated = updated.len(),
        conflicts = conflicts.len(),
        "sync push complete"
    );

    Ok(Json(PushResponse { updated, conflicts }))
}

/// `POST /clear`: hard-delete all rows for the authenticated user.
async fn clear(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.clear_user(&user.user_id)?;
    tracing::info!(user = short_id(&user.user_id), "user data cleared");
    Ok(Json(
        serde_json::json!({ "message": "all data cleared successfully" }),
    ))
}

/// The server holds an update the client did not know about: its stored
/// client timestamp is strictly after the incoming one. A missing
/// timestamp on either side disables detection (scriptable CLI pushes).
fn is_stale_write(incoming: Option<DateTime<Utc>>, stored: Option<DateTime<Utc>>) -> bool {
    match (incoming, stored) {
        (Some(incoming), Some(stored)) => stored > incoming,
        _ => false,
    }
}

fn parse_client_time(raw: Option<&str>, client_id: &str) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(_) => {
            tracing::warn!(id = %client_id, timestamp = raw, "push: invalid client timestamp");
            None
        }
    }
}

fn log_conflict(
    item: &SyncItem,
    stored: Option<DateTime<Utc>>,
    incoming: Option<DateTime<Utc>>,
) {
    tracing::info!(
        id = %item.client_id,
        kind = ?item.kind,
        stored = ?stored,
        incoming = ?incoming,
        "sync conflict detected"
    );
}

fn decode_blob(raw: Option<&str>) -> Option<Vec<u8>> {
    STANDARD.decode(raw.unwrap_or_default()).ok()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}

fn short_id(user_id: &str) -> &str {
    &user_id[..user_id.len().min(8)]
}

fn project_to_item(project: ServerProject) -> SyncItem {
    SyncItem {
        id: project.client_id.clone(),
        client_id: project.client_id,
        kind: ItemKind::Project,
        slug: Some(project.slug),
        name: Some(project.name),
        project_id: None,
        encrypted_data: Some(STANDARD.encode(&project.encrypted_data)),
        encrypted_content: None,
        status: None,
        priority: None,
        due_date: None,
        sync_version: project.sync_version,
        deleted: project.deleted,
        client_updated_at: None,
    }
}

fn task_to_item(task: ServerTask) -> SyncItem {
    SyncItem {
        id: task.client_id.clone(),
        client_id: task.client_id,
        kind: ItemKind::Task,
        slug: None,
        name: None,
        project_id: Some(task.project_id),
        encrypted_data: None,
        encrypted_content: Some(STANDARD.encode(&task.encrypted_content)),
        status: task.status.parse().ok(),
        priority: task.priority.try_into().ok(),
        due_date: task.due_date,
        sync_version: task.sync_version,
        deleted: task.deleted,
        client_updated_at: None,
    }
}
