use std::path::Path;
use std::sync::Mutex;

use ferrotask_core::{SyncClient, SyncMode, SyncSettings};

use crate::commands::common::{confirm, open_database};
use crate::error::CliError;

pub async fn run_sync(db_path: &Path, sync_config: &Path) -> Result<(), CliError> {
    let client = SyncClient::new(sync_config)?;
    if !client.is_logged_in() {
        return Err(CliError::NotLoggedIn);
    }

    let db = Mutex::new(open_database(db_path)?);
    println!("Syncing...");
    let report = client.sync(&db, SyncMode::Merge).await?;
    println!(
        "Sync complete. Pushed: {}, Pulled: {}",
        report.pushed, report.pulled
    );

    if !report.conflicts.is_empty() {
        println!("{} conflict(s) detected:", report.conflicts.len());
        for conflict in &report.conflicts {
            println!("  {:?} {}", conflict.kind, conflict.client_id);
        }
        println!("Local values were kept and will retry on the next sync.");
        println!("Edit the row again to keep local, or run `ferro sync pull` to take the server copy.");
    }
    Ok(())
}

pub async fn run_force_pull(yes: bool, db_path: &Path, sync_config: &Path) -> Result<(), CliError> {
    if !yes
        && !confirm(
            "This will DELETE all local tasks and projects and replace them with the server copy. Continue?",
        )?
    {
        return Err(CliError::Aborted);
    }

    let client = SyncClient::new(sync_config)?;
    if !client.is_logged_in() {
        return Err(CliError::NotLoggedIn);
    }

    let db = Mutex::new(open_database(db_path)?);
    let report = client.sync(&db, SyncMode::ForcePull).await?;
    println!("Force pull complete. Pulled: {}", report.pulled);
    Ok(())
}

pub async fn run_force_push(yes: bool, db_path: &Path, sync_config: &Path) -> Result<(), CliError> {
    if !yes
        && !confirm(
            "This will DELETE all server-side data for your account and replace it with this replica. Continue?",
        )?
    {
        return Err(CliError::Aborted);
    }

    let client = SyncClient::new(sync_config)?;
    if !client.is_logged_in() {
        return Err(CliError::NotLoggedIn);
    }

    let db = Mutex::new(open_database(db_path)?);
    let report = client.sync(&db, SyncMode::ForcePush).await?;
    println!("Force push complete. Pushed: {}", report.pushed);
    Ok(())
}

pub fn run_status(sync_config: &Path) -> Result<(), CliError> {
    let settings = SyncSettings::load(sync_config)?;

    println!("Server:       {}", settings.server_url);
    if settings.is_logged_in() {
        println!("User ID:      {}", settings.user_id);
        println!("Last version: {}", settings.last_sync_version);
        println!("Initial sync: {}", if settings.has_synced_once { "complete" } else { "pending" });
        println!("Status:       logged in");
    } else {
        println!("Status:       not logged in");
    }
    Ok(())
}
