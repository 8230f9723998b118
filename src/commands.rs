use crate::cli::{Cli, Command, WatchArgs};
use crate::settings::{self, Settings};

use anyhow::{Context, Result, anyhow};
use base64::Engine;
use pairlink_core::client::store::{ACTIVE_CONNECTION_KEY, ACTIVE_PROFILE_KEY};
use pairlink_core::client::{
    ConnectionController, ConnectionSnapshot, ConnectionStatus, HttpSessionApi, JsonFileStore,
    KeyValueStore, SessionApi,
};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

/// Dispatch one CLI invocation.
pub async fn run(cli: Cli) -> Result<ExitCode> {
    let settings_path = cli.config.unwrap_or_else(settings::get_settings_path);
    let mut settings = settings::load_settings(&settings_path);
    if let Some(base_url) = cli.base_url {
        settings.remote.base_url = base_url;
    }

    match cli.command {
        Command::Connect {
            name,
            profile,
            watch,
        } => connect(&settings, &name, &profile, &watch).await,
        Command::Resume { watch } => resume(&settings, &watch).await,
        Command::Disconnect { name } => disconnect(&settings, &name).await,
        Command::Connections => list_connections(&settings).await,
        Command::Profiles => list_profiles(&settings).await,
        Command::Settings { write_defaults } => {
            show_settings(&settings_path, &settings, write_defaults)
        }
    }
}

type Controller = ConnectionController<HttpSessionApi>;

fn build_controller(settings: &Settings) -> (Controller, async_channel::Receiver<ConnectionSnapshot>) {
    let (tx, rx) = async_channel::unbounded();
    let store = JsonFileStore::open(JsonFileStore::default_path());
    log::debug!("Session store at {}", store.path().display());
    let controller = ConnectionController::new(
        HttpSessionApi::new(settings.remote.clone()),
        Arc::new(store),
        settings.controller.clone(),
        tokio::runtime::Handle::current(),
        tx,
    );
    (controller, rx)
}

async fn connect(
    settings: &Settings,
    name: &str,
    profile: &str,
    watch: &WatchArgs,
) -> Result<ExitCode> {
    let (controller, events) = build_controller(settings);
    if let Err(e) = controller.connect(name, profile).await {
        eprintln!("Failed to connect {}: {}", name, e);
        return Ok(ExitCode::FAILURE);
    }
    follow(&controller, &events, watch, &settings.controller.artifact_prefix).await
}

async fn resume(settings: &Settings, watch: &WatchArgs) -> Result<ExitCode> {
    let (controller, events) = build_controller(settings);
    if !controller.resume().await {
        eprintln!("No connection to resume");
        return Ok(ExitCode::FAILURE);
    }
    follow(&controller, &events, watch, &settings.controller.artifact_prefix).await
}

/// Print every update until the connection ends or the user interrupts.
async fn follow(
    controller: &Controller,
    events: &async_channel::Receiver<ConnectionSnapshot>,
    watch: &WatchArgs,
    artifact_prefix: &str,
) -> Result<ExitCode> {
    let mut written_artifact: Option<String> = None;

    loop {
        let snapshot = tokio::select! {
            received = events.recv() => match received {
                Ok(snapshot) => snapshot,
                Err(_) => return Ok(ExitCode::FAILURE),
            },
            _ = tokio::signal::ctrl_c() => {
                eprintln!();
                return interrupt(controller, watch).await;
            }
        };

        println!("{}", describe(&snapshot));

        if let (Some(path), Some(artifact)) = (&watch.qr_out, &snapshot.pairing_artifact) {
            if written_artifact.as_ref() != Some(artifact) {
                match write_pairing_image(path, artifact, artifact_prefix) {
                    Ok(()) => println!("Pairing code written to {}", path.display()),
                    Err(e) => log::warn!("Failed to write pairing code: {:#}", e),
                }
                written_artifact = Some(artifact.clone());
            }
        }

        if ends_watch(&snapshot) {
            return Ok(ExitCode::FAILURE);
        }
    }
}

async fn interrupt(controller: &Controller, watch: &WatchArgs) -> Result<ExitCode> {
    if !watch.disconnect_on_exit {
        if let Some(name) = controller.active_name() {
            println!("Leaving {} running, `pairlink resume` picks it up again", name);
        }
        return Ok(ExitCode::SUCCESS);
    }

    match controller.disconnect(false).await {
        Ok(()) => {
            println!("Disconnected");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// One line per update.
fn describe(snapshot: &ConnectionSnapshot) -> String {
    let mut line = format!("status: {}", snapshot.status);
    if snapshot.status == ConnectionStatus::AwaitingPairing {
        if snapshot.pairing_artifact.is_some() {
            line.push_str(" (pairing code ready, scan it with the phone)");
        } else {
            line.push_str(" (waiting for pairing code)");
        }
    }
    if let Some(ref error) = snapshot.last_error {
        line.push_str(&format!(", error: {}", error));
    }
    line
}

/// Only a fresh `connect` leaves these, so there is nothing more to watch.
fn ends_watch(snapshot: &ConnectionSnapshot) -> bool {
    snapshot.status.is_terminal() || snapshot.status == ConnectionStatus::FailedToInitialize
}

fn decode_artifact(artifact: &str, prefix: &str) -> Result<Vec<u8>> {
    let payload = artifact
        .strip_prefix(prefix)
        .ok_or_else(|| anyhow!("pairing code does not start with {}", prefix))?;
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .context("pairing code is not valid base64")
}

fn write_pairing_image(path: &Path, artifact: &str, prefix: &str) -> Result<()> {
    let bytes = decode_artifact(artifact, prefix)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

/// One-shot terminate, without polling.
async fn disconnect(settings: &Settings, name: &str) -> Result<ExitCode> {
    let api = HttpSessionApi::new(settings.remote.clone());
    api.terminate(name)
        .await
        .map_err(|e| anyhow!(e.user_message()))
        .with_context(|| format!("failed to terminate {}", name))?;

    let store = JsonFileStore::open(JsonFileStore::default_path());
    if store.get(ACTIVE_CONNECTION_KEY).as_deref() == Some(name) {
        store.clear(ACTIVE_CONNECTION_KEY)?;
        store.clear(ACTIVE_PROFILE_KEY)?;
    }

    println!("Disconnected {}", name);
    Ok(ExitCode::SUCCESS)
}

async fn list_connections(settings: &Settings) -> Result<ExitCode> {
    let api = HttpSessionApi::new(settings.remote.clone());
    let connections = api
        .list_connections()
        .await
        .map_err(|e| anyhow!(e.user_message()))
        .context("failed to list connections")?;

    if connections.is_empty() {
        println!("No connections");
        return Ok(ExitCode::SUCCESS);
    }

    println!("{:<24} {:<16} {:<20} {}", "NAME", "STATUS", "PROFILE", "PHONE");
    for connection in &connections {
        println!(
            "{:<24} {:<16} {:<20} {}",
            connection.connection_name,
            connection.last_known_status.as_deref().unwrap_or("-"),
            connection.profile_id.as_deref().unwrap_or("-"),
            connection.phone_number.as_deref().unwrap_or("-"),
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn list_profiles(settings: &Settings) -> Result<ExitCode> {
    let api = HttpSessionApi::new(settings.remote.clone());
    let profiles = api
        .list_profiles()
        .await
        .map_err(|e| anyhow!(e.user_message()))
        .context("failed to list profiles")?;

    if profiles.is_empty() {
        println!("No profiles");
        return Ok(ExitCode::SUCCESS);
    }

    println!("{:<28} {}", "ID", "NAME");
    for profile in &profiles {
        println!("{:<28} {}", profile.connect_id(), profile.name);
    }
    Ok(ExitCode::SUCCESS)
}

fn show_settings(path: &Path, settings: &Settings, write: bool) -> Result<ExitCode> {
    if write {
        settings::save_settings(path, settings)?;
        println!("Wrote {}", path.display());
    }
    println!("Settings file: {}", path.display());
    println!("{}", serde_json::to_string_pretty(&redacted(settings))?);
    Ok(ExitCode::SUCCESS)
}

/// Copy for display with the session cookie hidden.
fn redacted(settings: &Settings) -> Settings {
    let mut shown = settings.clone();
    if shown.remote.cookie.is_some() {
        shown.remote.cookie = Some("<redacted>".to_string());
    }
    shown
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairlink_core::client::ConnectionError;

    const PREFIX: &str = "data:image/png;base64,";

    #[test]
    fn decode_png_artifact() {
        // PNG signature
        let bytes = decode_artifact("data:image/png;base64,iVBORw0KGgo=", PREFIX).unwrap();
        assert_eq!(bytes, [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]);
    }

    #[test]
    fn decode_rejects_bad_artifacts() {
        assert!(decode_artifact("data:image/jpeg;base64,AAAA", PREFIX).is_err());
        assert!(decode_artifact("data:image/png;base64,not base64!", PREFIX).is_err());
    }

    #[test]
    fn write_image_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("qr.png");
        write_pairing_image(&path, "data:image/png;base64,iVBORw0KGgo=", PREFIX).unwrap();
        assert_eq!(std::fs::read(&path).unwrap().len(), 8);
    }

    #[test]
    fn describe_lines() {
        assert_eq!(
            describe(&ConnectionSnapshot::new(ConnectionStatus::Connected, None, None)),
            "status: connected"
        );
        assert_eq!(
            describe(&ConnectionSnapshot::new(
                ConnectionStatus::AwaitingPairing,
                Some("data:image/png;base64,AAAA".into()),
                None
            )),
            "status: awaiting_pairing (pairing code ready, scan it with the phone)"
        );
        assert_eq!(
            describe(&ConnectionSnapshot::new(
                ConnectionStatus::AwaitingPairing,
                None,
                Some(ConnectionError::PairingExhausted(10))
            )),
            "status: awaiting_pairing (waiting for pairing code), error: failed to retrieve pairing code after 10 attempts"
        );
    }

    #[test]
    fn watch_ends_on_terminal_and_failed_create() {
        let ended = |status| ends_watch(&ConnectionSnapshot::new(status, None, None));
        assert!(ended(ConnectionStatus::NotFound));
        assert!(ended(ConnectionStatus::AuthFailed));
        assert!(ended(ConnectionStatus::Disconnected));
        assert!(ended(ConnectionStatus::FailedToInitialize));
        assert!(!ended(ConnectionStatus::Connected));
        assert!(!ended(ConnectionStatus::AwaitingPairing));
    }

    #[test]
    fn cookie_is_hidden_from_display() {
        let mut settings = Settings::default();
        assert_eq!(redacted(&settings), settings);
        settings.remote.cookie = Some("session=secret".into());
        let shown = redacted(&settings);
        assert_eq!(shown.remote.cookie.as_deref(), Some("<redacted>"));
        assert_eq!(settings.remote.cookie.as_deref(), Some("session=secret"));
    }
}
