mod client;
mod command;
mod config;
mod dispatch;
mod tracker;

pub use client::JiraClient;
pub use command::{
    AssignArgs, Command, CreateArgs, GetArgs, JqlArgs, SearchArgs, TransitionArgs, parse_command,
};
pub use config::{ConfigError, JiraConfig};
pub use dispatch::{CommandError, Dispatcher, Reply};
pub use tracker::{Issue, NewIssue, SEARCH_LIMIT, Tracker, TrackerError, User};

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use matrix_sdk::ruma::events::room::message::OriginalSyncRoomMessageEvent;
use plugin_core::factory::PluginFactory;
use plugin_core::{
    Plugin, PluginContext, PluginSpec, PluginTriggers, RoomMessageMeta, send_card, send_text,
};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const PLUGIN_ID: &str = "jira";
const NOT_CONFIGURED: &str = "Jira not configured.";

#[derive(Debug)]
pub struct JiraPluginFactory;

impl PluginFactory for JiraPluginFactory {
    fn register_defaults(&self, specs: &mut Vec<PluginSpec>) {
        if !specs.iter().any(|s| s.id == PLUGIN_ID) {
            specs.push(default_spec());
        }
    }

    fn build(&self) -> Arc<dyn Plugin + Send + Sync> {
        Arc::new(JiraPlugin::default())
    }
}

fn default_spec() -> PluginSpec {
    PluginSpec {
        id: PLUGIN_ID.to_owned(),
        enabled: true,
        triggers: PluginTriggers {
            commands: vec!["!jira".to_owned()],
        },
        config: serde_yaml::Value::default(),
    }
}

/// A logged-in tracker session plus the config it was opened with.
#[derive(Debug)]
struct Session {
    config: JiraConfig,
    client: JiraClient,
}

#[derive(Debug, Default)]
pub struct JiraPlugin {
    session: RwLock<Option<Arc<Session>>>,
}

enum SessionState {
    Ready(Arc<Session>),
    NotConfigured,
}

#[derive(Debug, Error)]
enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

impl SessionError {
    /// Text shown in the room. Config problems are the operator's to fix and
    /// are shown as-is; tracker failures stay generic.
    fn user_message(self) -> String {
        match self {
            Self::Config(e) => e.to_string(),
            Self::Tracker(e) => CommandError::Tracker(e).to_string(),
        }
    }
}

impl JiraPlugin {
    /// Opens the tracker session on first use and reuses it afterwards. A
    /// failed login is not cached, so the next command retries.
    async fn ensure_session(&self, spec: &PluginSpec) -> Result<SessionState, SessionError> {
        let cached = self.session.read().await.clone();
        if let Some(session) = cached {
            return Ok(SessionState::Ready(session));
        }
        let mut guard = self.session.write().await;
        if let Some(session) = guard.clone() {
            return Ok(SessionState::Ready(session));
        }

        let Some(config) = JiraConfig::from_spec(spec)? else {
            return Ok(SessionState::NotConfigured);
        };
        let client = JiraClient::login(&config).await?;
        let session = Arc::new(Session { config, client });
        *guard = Some(Arc::clone(&session));
        drop(guard);

        Ok(SessionState::Ready(session))
    }
}

/// Text worth a passive lookup: not already handled as a `!jira` command and
/// mentioning at least one issue key.
fn passive_candidate<'a>(meta: &RoomMessageMeta<'a>) -> Option<&'a str> {
    if meta.triggered_plugins.contains(PLUGIN_ID) {
        return None;
    }
    meta.body
        .filter(|body| !jira_intents::scan_mentions(body).is_empty())
}

#[async_trait]
impl Plugin for JiraPlugin {
    fn id(&self) -> &'static str {
        PLUGIN_ID
    }

    fn spec(&self) -> PluginSpec {
        default_spec()
    }

    fn handles_room_messages(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &PluginContext, args: &str, spec: &PluginSpec) -> Result<()> {
        let command = match parse_command(args) {
            Ok(command) => command,
            Err(e) => return send_text(ctx, e.to_string()).await,
        };

        let session = match self.ensure_session(spec).await {
            Ok(SessionState::Ready(session)) => session,
            Ok(SessionState::NotConfigured) => {
                warn!(plugin = PLUGIN_ID, "{NOT_CONFIGURED}");
                return send_text(ctx, NOT_CONFIGURED).await;
            }
            Err(e) => {
                warn!(plugin = PLUGIN_ID, error = %e, "Failed to open Jira session");
                return send_text(ctx, e.user_message()).await;
            }
        };

        let dispatcher = Dispatcher::new(&session.client, &session.config.project);
        match dispatcher.execute(command).await {
            Ok(Reply::Text(text)) => send_text(ctx, text).await,
            Ok(Reply::Card(card)) => send_card(ctx, &card).await,
            Err(e) => {
                info!(plugin = PLUGIN_ID, error = %e, "Jira command failed");
                send_text(ctx, e.to_string()).await
            }
        }
    }

    async fn on_room_message(
        &self,
        ctx: &PluginContext,
        event: &OriginalSyncRoomMessageEvent,
        spec: &PluginSpec,
        meta: &RoomMessageMeta<'_>,
    ) -> Result<()> {
        if ctx.client.user_id().is_some_and(|own_id| event.sender == own_id) {
            return Ok(());
        }
        let Some(body) = passive_candidate(meta) else {
            return Ok(());
        };

        // Passive lookups never surface errors to the room.
        let session = match self.ensure_session(spec).await {
            Ok(SessionState::Ready(session)) => session,
            Ok(SessionState::NotConfigured) => return Ok(()),
            Err(e) => {
                debug!(plugin = PLUGIN_ID, error = %e, "Skipping passive lookup");
                return Ok(());
            }
        };
        let dispatcher = Dispatcher::new(&session.client, &session.config.project);
        if let Some(card) = dispatcher.lookup_mentions(body).await
            && let Err(e) = send_card(ctx, &card).await
        {
            debug!(plugin = PLUGIN_ID, error = %e, "Failed to send passive issue card");
        }
        Ok(())
    }
}
