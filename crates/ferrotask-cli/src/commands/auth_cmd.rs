use std::path::Path;

use ferrotask_core::SyncClient;

use crate::error::CliError;

pub async fn run_register(
    username: &str,
    email: &str,
    password: &str,
    server: Option<&str>,
    sync_config: &Path,
) -> Result<(), CliError> {
    let client = SyncClient::new(sync_config)?;
    if let Some(url) = server {
        client.set_server(url)?;
        println!("Server set to: {url}");
    }

    println!("Creating account...");
    client.register(username, email, password).await?;
    println!("Account created. You are now logged in; run `ferro sync` to start syncing.");
    Ok(())
}

pub async fn run_login(
    username: &str,
    password: &str,
    server: Option<&str>,
    sync_config: &Path,
) -> Result<(), CliError> {
    let client = SyncClient::new(sync_config)?;
    if let Some(url) = server {
        client.set_server(url)?;
        println!("Server set to: {url}");
    }

    println!("Logging in...");
    client.login(username, password).await?;
    println!("Logged in. Run `ferro sync` to pull your tasks.");
    Ok(())
}

pub async fn run_logout(sync_config: &Path) -> Result<(), CliError> {
    let client = SyncClient::new(sync_config)?;
    client.logout().await?;
    println!("Logged out.");
    Ok(())
}
