async fn emit_signal(emitter: &SignalEmitter<'_>, event: &SyncEvent) -> zbus::Result<()> {
    match event {
        SyncEvent::Phase(phase) => {
            SyncDbusService::sync_state_changed(emitter, phase.as_str()).await
        }
        SyncEvent::DataChanged => SyncDbusService::data_changed(emitter).await,
        SyncEvent::StatusChanged(status) => {
            SyncDbusService::status_changed(emitter, status.as_str(), &status.detail()).await
        }
        SyncEvent::ValidationFailed { .. } | SyncEvent::ConflictCreated { .. } => Ok(()),
    }
}

fn resolve_token() -> anyhow::Result<String> {
    let env_token = std::env::var("NOTESYNC_TOKEN").ok();
    let from_env = env_token
        .as_deref()
        .is_some_and(|token| !token.trim().is_empty());
    let token = pick_token(env_token, || TokenStorage::new()?.get_token())
        .context("no access token: set NOTESYNC_TOKEN or store one in the keyring")?;
    if from_env {
        remember_token(&token);
    }
    Ok(token)
}

/// Keeps the environment token for later runs; `--logout` removes it again.
fn remember_token(token: &str) {
    match TokenStorage::new().and_then(|storage| storage.save_token(token)) {
        Ok(()) => debug!("access token saved to keyring"),
        Err(err) => warn!("failed to save access token to keyring: {err}"),
    }
}

fn build_client(config: &DaemonConfig, token: String) -> anyhow::Result<NoteStoreClient> {
    let client = match &config.base_url {
        Some(url) => NoteStoreClient::with_base_url(url, token),
        None => NoteStoreClient::new(token),
    }
    .context("invalid note store client config")?;
    match &config.web_url {
        Some(url) => client.with_web_url(url).context("invalid web url"),
        None => Ok(client),
    }
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(DATA_DIR_NAME)
}

fn read_string_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_u64_env(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

/// `0` (or any non-positive value) selects manual syncing.
fn read_interval_env(name: &str, default: SyncInterval) -> SyncInterval {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<i64>().ok())
        .map(SyncInterval::from_secs)
        .unwrap_or(default)
}

fn read_bool_env(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}
