//! Wire types shared by the push/pull endpoints

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Priority, Project, Task, TaskStatus};
use crate::sync::envelope;
use crate::util::{format_rfc3339, slugify};

/// Row kind on the wire.
///
/// `Unknown` absorbs unrecognized values so one bad item never fails the
/// whole batch; handlers log and skip it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Project,
    Task,
    #[serde(other)]
    Unknown,
}

/// One project or task row on the push/pull endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncItem {
    pub id: String,
    pub client_id: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Project metadata blob (legacy path), base64
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_data: Option<String>,
    /// Task content blob, base64; never inspected by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    /// 0 on first push; server-assigned thereafter
    #[serde(default)]
    pub sync_version: i64,
    #[serde(default)]
    pub deleted: bool,
    /// Client timestamp for conflict detection; optional on push
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_updated_at: Option<String>,
}

impl SyncItem {
    /// Build a push item from a local project row.
    ///
    /// Name, slug, and color travel in clear; the metadata blob duplicates
    /// name/color for the legacy path.
    #[must_use]
    pub fn from_project(project: &Project) -> Self {
        Self {
            id: project.id.clone(),
            client_id: project.id.clone(),
            kind: ItemKind::Project,
            slug: Some(project.slug.clone()),
            name: Some(project.name.clone()),
            project_id: None,
            encrypted_data: Some(envelope::encode_project_meta(&project.name, &project.color)),
            encrypted_content: None,
            status: None,
            priority: None,
            due_date: None,
            sync_version: project.sync_version.unwrap_or(0),
            deleted: project.deleted,
            client_updated_at: Some(format_rfc3339(project.updated_at)),
        }
    }

    /// Build a push item from a local task row, wrapping the content in the
    /// opaque envelope.
    #[must_use]
    pub fn from_task(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            client_id: task.id.clone(),
            kind: ItemKind::Task,
            slug: None,
            name: None,
            project_id: Some(task.project_id.clone()),
            encrypted_data: None,
            encrypted_content: Some(envelope::encode_task_content(&task.content)),
            status: Some(task.status),
            priority: Some(task.priority),
            due_date: task.due_date.map(|date| date.to_string()),
            sync_version: task.sync_version.unwrap_or(0),
            deleted: task.deleted,
            client_updated_at: Some(format_rfc3339(task.updated_at)),
        }
    }

    /// Decode a pulled item into a project row.
    ///
    /// The clear `name` wins; the legacy metadata blob is the fallback and
    /// the only source for the color.
    pub fn into_project(self) -> Result<Project> {
        if self.kind != ItemKind::Project {
            return Err(Error::InvalidInput(format!(
                "item {} is not a project",
                self.client_id
            )));
        }

        let meta = self
            .encrypted_data
            .as_deref()
            .and_then(|blob| envelope::decode_project_meta(blob).ok());

        let name = crate::util::normalize_text_option(self.name)
            .or_else(|| meta.as_ref().map(|(name, _)| name.clone()))
            .unwrap_or_else(|| self.client_id.clone());
        let slug = crate::util::normalize_text_option(self.slug)
            .unwrap_or_else(|| slugify(&name));
        let color = meta
            .map(|(_, color)| color)
            .unwrap_or_else(|| "#4ECDC4".to_string());

        let now = chrono::Utc::now();
        Ok(Project {
            id: self.client_id,
            slug,
            name,
            color,
            deleted: self.deleted,
            sync_version: Some(self.sync_version),
            created_at: now,
            updated_at: now,
        })
    }

    /// Decode a pulled item into a task row, unwrapping the content
    /// envelope. Fails on a malformed blob.
    pub fn into_task(self) -> Result<Task> {
        if self.kind != ItemKind::Task {
            return Err(Error::InvalidInput(format!(
                "item {} is not a task",
                self.client_id
            )));
        }

        let content = match self.encrypted_content.as_deref() {
            Some(blob) => envelope::decode_task_content(blob)?,
            None => String::new(),
        };
        let due_date = match self.due_date.as_deref() {
            Some(raw) if !raw.is_empty() => Some(
                chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|error| {
                    Error::InvalidInput(format!("bad due_date '{raw}': {error}"))
                })?,
            ),
            _ => None,
        };

        let now = chrono::Utc::now();
        Ok(Task {
            id: self.client_id.clone(),
            project_id: self
                .project_id
                .unwrap_or_else(|| crate::models::INBOX_PROJECT_ID.to_string()),
            content,
            status: self.status.unwrap_or_default(),
            priority: self.priority.unwrap_or_default(),
            due_date,
            deleted: self.deleted,
            sync_version: Some(self.sync_version),
            created_at: now,
            updated_at: now,
        })
    }
}

/// A push item the server refused because it held a newer row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictItem {
    pub client_id: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub server_version: i64,
    /// Full current server row
    pub server_data: SyncItem,
    /// The rejected client row, echoed back
    pub client_data: SyncItem,
}

/// Body of `GET /sync?since=V`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullResponse {
    #[serde(default)]
    pub items: Vec<SyncItem>,
    /// Max version observed in `items`, or the request's `since` when empty
    pub sync_version: i64,
}

/// Body of `POST /sync`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub items: Vec<SyncItem>,
}

/// Response of `POST /sync`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushResponse {
    #[serde(default)]
    pub updated: Vec<SyncItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<ConflictItem>,
}
