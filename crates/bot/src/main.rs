mod logging;
mod plugins;

use core::time::Duration;
use std::{
    collections::{BTreeSet, HashSet},
    fs,
    io::IsTerminal as _,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context as _, Result, anyhow};
use clap::Parser;
use matrix_sdk::{
    Client, SessionMeta,
    authentication::{SessionTokens, matrix::MatrixSession},
    config::SyncSettings,
    room::Room,
    ruma::events::room::{
        member::{MembershipState, StrippedRoomMemberEvent},
        message::{MessageType, OriginalSyncRoomMessageEvent},
    },
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::logging::init_tracing;
use plugin_core::{PluginContext, PluginRegistry, PluginSpec, RoomMessageMeta, truncate};

#[derive(Parser, Debug)]
#[command(
    name = "jira-chat-bot",
    version,
    about = "Matrix bot for looking up and updating Jira issues"
)]
struct Args {
    /// Homeserver base URL, e.g. `https://matrix-client.matrix.org`.
    #[arg(long, env = "MATRIX_HOMESERVER")]
    homeserver: String,

    /// Username (localpart or full user ID)
    #[arg(long, env = "MATRIX_USERNAME")]
    username: String,

    /// Password (if omitted, will prompt if needed)
    #[arg(long, env = "MATRIX_PASSWORD")]
    password: Option<String>,

    /// Directory for persistent state (encryption keys, sync cache)
    #[arg(long, env = "MATRIX_STORE", default_value = "./bot-store")]
    store: PathBuf,

    /// JSON session file for access token/device info
    #[arg(long, env = "MATRIX_SESSION_FILE", default_value = "./session.json")]
    session_file: PathBuf,

    /// Device display name
    #[arg(long, env = "MATRIX_DEVICE_NAME", default_value = "jira-chat-bot")]
    device_name: String,

    /// Path to the YAML bot config listing plugins
    #[arg(long, env = "MATRIX_CONFIG", default_value = "./config.yaml")]
    config: PathBuf,

    /// Directory holding per-plugin `<id>/config.yaml` overrides
    #[arg(long, env = "PLUGINS_DIR", default_value = "./plugins")]
    plugins_dir: PathBuf,

    /// Disable auto-joining rooms when invited
    #[arg(long)]
    no_autojoin: bool,

    /// Sync timeout in milliseconds
    #[arg(long, env = "MATRIX_SYNC_TIMEOUT_MS", default_value_t = 30000)]
    sync_timeout_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedSession {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    user_id: String,
    device_id: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub(crate) struct BotConfig {
    #[serde(default)]
    pub(crate) plugins: Option<Vec<PluginSpec>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    // Load .env if present so clap can pick up env vars.
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    fs::create_dir_all(&args.store)
        .with_context(|| format!("creating store directory at {}", args.store.display()))?;

    let client = Client::builder()
        .homeserver_url(&args.homeserver)
        .handle_refresh_tokens()
        .sqlite_store(&args.store, None)
        .build()
        .await
        .context("building matrix client")?;

    if let Some(session) = load_session(&args.session_file)? {
        info!("Restoring session for {}", session.user_id);
        let matrix_session = MatrixSession {
            meta: SessionMeta {
                user_id: session.user_id.parse().context("invalid stored user_id")?,
                device_id: session.device_id.into(),
            },
            tokens: SessionTokens {
                access_token: session.access_token,
                refresh_token: session.refresh_token,
            },
        };
        client
            .restore_session(matrix_session)
            .await
            .context("restoring session")?;
    } else {
        let password = resolve_password(&args)?;
        info!("Logging in as {}", args.username);
        let response = client
            .matrix_auth()
            .login_username(&args.username, &password)
            .initial_device_display_name(&args.device_name)
            .request_refresh_token()
            .send()
            .await
            .context("login failed")?;

        let session = SavedSession {
            access_token: response.access_token.clone(),
            refresh_token: response.refresh_token.clone(),
            user_id: response.user_id.to_string(),
            device_id: response.device_id.to_string(),
        };
        save_session(&args.session_file, &session)?;
        info!(
            "Logged in: user={} device={}",
            session.user_id, session.device_id
        );
    }

    let config = load_config(&args.config)?;
    let registry = plugins::build_registry(&config, &args.plugins_dir).await;
    log_triggers(&registry).await;

    if !args.no_autojoin {
        client.add_event_handler(
            async move |ev: StrippedRoomMemberEvent, room: Room, client: Client| {
                if ev.content.membership != MembershipState::Invite {
                    return;
                }
                let Some(own_id) = client.user_id() else {
                    return;
                };
                if ev.state_key != own_id.as_str() {
                    return;
                }
                info!(room_id = %room.room_id(), "Auto-joining invited room");
                if let Err(e) = room.join().await {
                    warn!(error = %e, "Failed to accept invite");
                }
            },
        );
    }

    client.add_event_handler(
        async move |ev: OriginalSyncRoomMessageEvent, room: Room, client: Client| {
            handle_message(ev, room, client, Arc::clone(&registry)).await;
        },
    );

    info!(
        timeout_ms = args.sync_timeout_ms,
        "Starting sync… Press Ctrl+C to stop."
    );
    let settings = SyncSettings::new().timeout(Duration::from_millis(args.sync_timeout_ms));
    client
        .sync(settings)
        .await
        .map_err(|e| anyhow!("sync terminated: {e}"))
}

fn resolve_password(args: &Args) -> Result<String> {
    // Treat empty env/arg as missing; avoid prompting in non-interactive (Docker) mode.
    if let Some(p) = args
        .password
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return Ok(p.to_owned());
    }
    if !std::io::stdin().is_terminal() {
        return Err(anyhow!(
            "No MATRIX_PASSWORD provided and no stored session. In non-interactive mode, set MATRIX_PASSWORD or mount an existing session at {}",
            args.session_file.display()
        ));
    }
    warn!("No password provided via --password or MATRIX_PASSWORD. Prompting...");
    #[cfg(feature = "rpassword")]
    {
        rpassword::prompt_password("Matrix password:")
            .map_err(|e| anyhow!("Failed to read password: {e}"))
    }
    #[cfg(not(feature = "rpassword"))]
    {
        Err(anyhow!(
            "rpassword feature is not enabled. Cannot prompt for password."
        ))
    }
}

async fn log_triggers(registry: &PluginRegistry) {
    let commands: BTreeSet<String> = registry
        .entries()
        .await
        .into_iter()
        .filter(|(_, entry)| entry.spec.enabled)
        .flat_map(|(_, entry)| entry.spec.triggers.commands)
        .map(|cmd| plugin_core::normalize_cmd(&cmd))
        .collect();
    info!(commands = ?commands, "Registered plugin triggers");
}

async fn handle_message(
    ev: OriginalSyncRoomMessageEvent,
    room: Room,
    client: Client,
    registry: Arc<PluginRegistry>,
) {
    let Some(own_id) = client.user_id().map(ToOwned::to_owned) else {
        return;
    };
    let body_opt = match &ev.content.msgtype {
        MessageType::Text(t) => Some(t.body.as_str()),
        MessageType::Notice(n) => Some(n.body.as_str()),
        MessageType::Audio(_)
        | MessageType::Emote(_)
        | MessageType::File(_)
        | MessageType::Image(_)
        | MessageType::Location(_)
        | MessageType::ServerNotice(_)
        | MessageType::Video(_)
        | MessageType::VerificationRequest(_)
        | _ => None,
    };
    let is_self = ev.sender == own_id;
    debug!(room_id = %room.room_id(), sender = %ev.sender, body = ?body_opt.map(|b| truncate(b, 200)), "Incoming message");
    if is_self {
        return;
    }

    let ctx = PluginContext {
        client: client.clone(),
        room: room.clone(),
    };
    let mut triggered_plugins: HashSet<String> = HashSet::new();

    if let Some(body) = body_opt.map(str::trim)
        && let Some((cmd, args)) = split_command(body)
        && let Some(entry) = registry.entry_by_command(cmd).await
    {
        let plugin_id = entry.spec.id.clone();
        info!(cmd = %cmd, plugin = %plugin_id, args = %args, "Dispatching command");
        if let Err(e) = entry.plugin.run(&ctx, args, &entry.spec).await {
            warn!(error = %e, plugin = %plugin_id, "Plugin failed");
        }
        triggered_plugins.insert(plugin_id);
    }

    let meta = RoomMessageMeta {
        body: body_opt,
        triggered_plugins: &triggered_plugins,
    };
    for (plugin_id, entry) in registry.entries().await {
        if !entry.spec.enabled || !entry.plugin.handles_room_messages() {
            continue;
        }
        if let Err(e) = entry
            .plugin
            .on_room_message(&ctx, &ev, &entry.spec, &meta)
            .await
        {
            warn!(error = %e, plugin = %plugin_id, "Plugin on_room_message failed");
        }
    }
}

/// Splits `!cmd rest of line` into the command token and its trimmed
/// arguments.
fn split_command(body: &str) -> Option<(&str, &str)> {
    if !body.starts_with('!') {
        return None;
    }
    Some(match body.split_once(char::is_whitespace) {
        Some((cmd, args)) => (cmd, args.trim()),
        None => (body, ""),
    })
}

fn load_config(path: &Path) -> Result<BotConfig> {
    if !path.exists() {
        warn!(
            "config file not found at {}; using plugin defaults",
            path.display()
        );
        return Ok(BotConfig::default());
    }
    let yaml = fs::read_to_string(path)
        .with_context(|| format!("reading config file at {}", path.display()))?;
    let cfg: BotConfig = serde_yaml::from_str(&yaml).context("parsing YAML config")?;
    Ok(cfg)
}

fn load_session(path: &Path) -> Result<Option<SavedSession>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading session file at {}", path.display()))?;
    let session: SavedSession = serde_json::from_str(&data).context("parsing session JSON")?;
    Ok(Some(session))
}

fn save_session(path: &Path, session: &SavedSession) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_string_pretty(session)?;
    fs::write(path, data).with_context(|| format!("writing session file at {}", path.display()))?;
    Ok(())
}
