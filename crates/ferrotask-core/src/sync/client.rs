//! Sync client: drives one end-to-end synchronization against the relay.

use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::db::{
    Database, ProjectRepository, SqliteProjectRepository, SqliteTaskRepository, TaskRepository,
};
use crate::error::{Error, Result};
use crate::sync::settings::SyncSettings;
use crate::sync::wire::{ConflictItem, ItemKind, PullResponse, PushRequest, PushResponse, SyncItem};
use crate::util::compact_text;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// How a sync run treats divergence between the two sides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Push local dirties, then pull remote updates (the default)
    Merge,
    /// Discard local state and pull everything from the server
    ForcePull,
    /// Discard server state and push everything local
    ForcePush,
}

/// Outcome of one sync run
#[derive(Debug, Default, Clone)]
pub struct SyncReport {
    pub pushed: usize,
    pub pulled: usize,
    pub conflicts: Vec<ConflictItem>,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: String,
    user_id: String,
}

/// HTTP sync client for one replica.
///
/// The settings file path is an explicit constructor parameter so tests can
/// point each replica at its own temporary location.
pub struct SyncClient {
    http: reqwest::Client,
    settings: StdMutex<SyncSettings>,
    settings_path: PathBuf,
}

impl SyncClient {
    /// Create a client backed by the settings file at `settings_path`.
    pub fn new(settings_path: impl Into<PathBuf>) -> Result<Self> {
        let settings_path = settings_path.into();
        let settings = SyncSettings::load(&settings_path)?;
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            settings: StdMutex::new(settings),
            settings_path,
        })
    }

    /// Snapshot of the current settings.
    pub fn settings(&self) -> SyncSettings {
        self.lock_settings().clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.lock_settings().is_logged_in()
    }

    /// Auto-sync is allowed: logged in and initial sync completed.
    pub fn can_auto_sync(&self) -> bool {
        self.lock_settings().can_auto_sync()
    }

    /// Point the client at a different relay.
    pub fn set_server(&self, url: &str) -> Result<()> {
        let url = url.trim_end_matches('/');
        if !crate::util::is_http_url(url) {
            return Err(Error::InvalidInput(
                "server URL must include http:// or https://".to_string(),
            ));
        }
        self.update_settings(|settings| settings.server_url = url.to_string())
    }

    /// Create an account and store the issued session.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<()> {
        let response = self
            .http
            .post(self.api_url("/register"))
            .json(&json!({ "username": username, "email": email, "password": password }))
            .send()
            .await?;
        let response = self.guard_status(response).await?;
        let auth: AuthResponse = response.json().await?;
        self.store_session(auth)
    }

    /// Log in with username/password and store the issued session.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let response = self
            .http
            .post(self.api_url("/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;
        let response = self.guard_status(response).await?;
        let auth: AuthResponse = response.json().await?;
        self.store_session(auth)
    }

    /// Request a login link for `email`. Returns the token when the server
    /// is configured to hand it back directly (no mail delivery).
    pub async fn request_magic_link(&self, email: &str) -> Result<Option<String>> {
        let response = self
            .http
            .post(self.api_url("/magic-link"))
            .json(&json!({ "email": email }))
            .send()
            .await?;
        let response = self.guard_status(response).await?;

        #[derive(Deserialize)]
        struct MagicLinkResponse {
            #[serde(default)]
            token: Option<String>,
        }
        let body: MagicLinkResponse = response.json().await?;
        Ok(body.token)
    }

    /// Redeem a magic-link token and store the issued session.
    pub async fn verify_magic_link(&self, token: &str) -> Result<()> {
        let response = self
            .http
            .get(self.api_url(&format!("/magic-link/{token}")))
            .send()
            .await?;
        let response = self.guard_status(response).await?;
        let auth: AuthResponse = response.json().await?;
        self.store_session(auth)
    }

    /// Revoke the server session (best effort) and wipe local credentials.
    pub async fn logout(&self) -> Result<()> {
        if let Ok(token) = self.token() {
            let _ = self
                .http
                .post(self.api_url("/logout"))
                .bearer_auth(token)
                .send()
                .await;
        }
        self.update_settings(SyncSettings::clear_session)
    }

    /// Perform one sync in the given mode.
    pub async fn sync(&self, db: &StdMutex<Database>, mode: SyncMode) -> Result<SyncReport> {
        if !self.is_logged_in() {
            return Err(Error::NotLoggedIn);
        }

        let mut report = SyncReport::default();
        match mode {
            SyncMode::Merge => {
                let (pushed, conflicts) = self.push_changes(db, false).await?;
                report.pushed = pushed;
                report.conflicts = conflicts;
                report.pulled = self.pull_changes(db).await?;
            }
            SyncMode::ForcePull => {
                Self::clear_local(db)?;
                self.update_settings(|settings| settings.last_sync_version = 0)?;
                report.pulled = self.pull_changes(db).await?;
            }
            SyncMode::ForcePush => {
                self.clear_remote().await?;
                let (pushed, conflicts) = self.push_changes(db, true).await?;
                report.pushed = pushed;
                report.conflicts = conflicts;
            }
        }

        self.update_settings(|settings| {
            settings.has_synced_once = true;
            settings.last_auto_sync_epoch = chrono::Utc::now().timestamp();
        })?;

        tracing::info!(
            pushed = report.pushed,
            pulled = report.pulled,
            conflicts = report.conflicts.len(),
            "sync complete"
        );
        Ok(report)
    }

    /// Hard-delete all server-side rows for this user.
    pub async fn clear_remote(&self) -> Result<()> {
        let response = self
            .http
            .post(self.api_url("/clear"))
            .bearer_auth(self.token()?)
            .send()
            .await?;
        self.guard_status(response).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Push / pull
    // ------------------------------------------------------------------

    async fn push_changes(
        &self,
        db: &StdMutex<Database>,
        everything: bool,
    ) -> Result<(usize, Vec<ConflictItem>)> {
        let items = Self::collect_push_items(db, everything)?;
        if items.is_empty() {
            tracing::debug!("no items to push");
            return Ok((0, Vec::new()));
        }

        tracing::info!(count = items.len(), "pushing local changes");
        let response = self
            .http
            .post(self.api_url("/sync"))
            .bearer_auth(self.token()?)
            .json(&PushRequest { items })
            .send()
            .await?;
        let response = self.guard_status(response).await?;
        let body: PushResponse = response.json().await?;

        let db = db.lock().expect("local store mutex poisoned");
        let projects = SqliteProjectRepository::new(db.connection());
        let tasks = SqliteTaskRepository::new(db.connection());
        for item in &body.updated {
            match item.kind {
                ItemKind::Project => {
                    projects.set_sync_version(&item.client_id, item.sync_version)?;
                }
                ItemKind::Task => {
                    tasks.set_sync_version(&item.client_id, item.sync_version)?;
                }
                ItemKind::Unknown => {
                    tracing::warn!(id = %item.client_id, "server echoed unknown item type");
                }
            }
        }

        Ok((body.updated.len(), body.conflicts))
    }

    async fn pull_changes(&self, db: &StdMutex<Database>) -> Result<usize> {
        let since = self.lock_settings().last_sync_version;
        tracing::debug!(since, "pulling remote changes");

        let response = self
            .http
            .get(self.api_url("/sync"))
            .query(&[("since", since)])
            .bearer_auth(self.token()?)
            .send()
            .await?;
        let response = self.guard_status(response).await?;
        let body: PullResponse = response.json().await?;

        let mut applied = 0;
        {
            let db = db.lock().expect("local store mutex poisoned");
            for item in body.items {
                let id = item.client_id.clone();
                match Self::apply_pulled_item(&db, item) {
                    Ok(true) => applied += 1,
                    Ok(false) => {}
                    Err(error) => {
                        tracing::warn!(id = %id, %error, "skipping pulled item");
                    }
                }
            }
        }

        self.update_settings(|settings| {
            if body.sync_version > settings.last_sync_version {
                settings.last_sync_version = body.sync_version;
            }
        })?;

        Ok(applied)
    }

    /// Apply one pulled row, returning whether the local store changed.
    ///
    /// A locally dirty row is left alone: merge pushes before it pulls, so
    /// by now the dirty set is exactly the conflicted set, and overwriting
    /// would discard the local side of a reported conflict.
    fn apply_pulled_item(db: &Database, item: SyncItem) -> Result<bool> {
        match item.kind {
            ItemKind::Project => {
                let repo = SqliteProjectRepository::new(db.connection());
                if let Some(existing) = repo.get(&item.client_id)? {
                    if existing.is_dirty() {
                        tracing::debug!(id = %item.client_id, "pulled project is locally dirty, keeping local");
                        return Ok(false);
                    }
                }
                let version = item.sync_version;
                let project = item.into_project()?;
                repo.overwrite_from_server(&project, version)?;
                Ok(true)
            }
            ItemKind::Task => {
                let repo = SqliteTaskRepository::new(db.connection());
                if let Some(existing) = repo.get(&item.client_id)? {
                    if existing.is_dirty() {
                        tracing::debug!(id = %item.client_id, "pulled task is locally dirty, keeping local");
                        return Ok(false);
                    }
                }
                let version = item.sync_version;
                let task = item.into_task()?;
                repo.overwrite_from_server(&task, version)?;
                Ok(true)
            }
            ItemKind::Unknown => {
                tracing::warn!(id = %item.client_id, "skipping item of unknown type");
                Ok(false)
            }
        }
    }

    fn collect_push_items(db: &StdMutex<Database>, everything: bool) -> Result<Vec<SyncItem>> {
        let db = db.lock().expect("local store mutex poisoned");
        let projects = SqliteProjectRepository::new(db.connection());
        let tasks = SqliteTaskRepository::new(db.connection());

        let (project_rows, task_rows) = if everything {
            let mut all_tasks = tasks.list_active(None)?;
            all_tasks.extend(tasks.list_archived()?);
            (projects.list(true)?, all_tasks)
        } else {
            (projects.list_dirty()?, tasks.list_dirty()?)
        };

        let mut items = Vec::with_capacity(project_rows.len() + task_rows.len());
        items.extend(project_rows.iter().map(SyncItem::from_project));
        items.extend(task_rows.iter().map(SyncItem::from_task));
        Ok(items)
    }

    fn clear_local(db: &StdMutex<Database>) -> Result<()> {
        let db = db.lock().expect("local store mutex poisoned");
        SqliteTaskRepository::new(db.connection()).clear_all()?;
        SqliteProjectRepository::new(db.connection()).clear_all()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    fn api_url(&self, path: &str) -> String {
        let base = self.lock_settings().server_url.clone();
        format!("{}/api/v1{path}", base.trim_end_matches('/'))
    }

    fn token(&self) -> Result<String> {
        let settings = self.lock_settings();
        if settings.token.is_empty() {
            return Err(Error::NotLoggedIn);
        }
        Ok(settings.token.clone())
    }

    /// Map error statuses into the error taxonomy. A 401 means the session
    /// is gone: wipe credentials so auto-sync stops until re-login.
    async fn guard_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            tracing::warn!("server rejected session token; logging out");
            self.update_settings(SyncSettings::clear_session)?;
            return Err(Error::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Server(format!(
                "HTTP {}: {}",
                status.as_u16(),
                compact_text(&body)
            )));
        }
        Ok(response)
    }

    fn store_session(&self, auth: AuthResponse) -> Result<()> {
        self.update_settings(|settings| {
            settings.token = auth.token;
            settings.user_id = auth.user_id;
            settings.last_sync_version = 0;
            settings.has_synced_once = false;
        })
    }

    fn lock_settings(&self) -> std::sync::MutexGuard<'_, SyncSettings> {
        self.settings.lock().expect("settings mutex poisoned")
    }

    fn update_settings(&self, mutate: impl FnOnce(&mut SyncSettings)) -> Result<()> {
        let mut settings = self.lock_settings();
        mutate(&mut settings);
        settings.save(&self.settings_path)
    }

    /// Path of the backing settings file.
    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }
}
