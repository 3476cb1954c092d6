pub mod card;
pub mod factory;
mod registry;

use core::fmt;
use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use matrix_sdk::{
    Client,
    room::Room,
    ruma::events::room::message::{OriginalSyncRoomMessageEvent, RoomMessageEventContent},
};
use serde::{Deserialize, Serialize};

pub use card::Card;
pub use registry::{PluginEntry, PluginRegistry, normalize_cmd};

#[derive(Clone)]
pub struct PluginContext {
    pub client: Client,
    pub room: Room,
}

impl fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginContext")
            .field("room", &self.room.room_id())
            .finish_non_exhaustive()
    }
}

/// What the dispatcher already did with a message before passive handlers
/// see it.
#[derive(Debug)]
pub struct RoomMessageMeta<'a> {
    pub body: Option<&'a str>,
    pub triggered_plugins: &'a HashSet<String>,
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn id(&self) -> &'static str;
    fn spec(&self) -> PluginSpec;
    fn handles_room_messages(&self) -> bool {
        false
    }
    async fn run(&self, ctx: &PluginContext, args: &str, spec: &PluginSpec) -> Result<()>;

    async fn on_room_message(
        &self,
        _ctx: &PluginContext,
        _event: &OriginalSyncRoomMessageEvent,
        _spec: &PluginSpec,
        _meta: &RoomMessageMeta<'_>,
    ) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PluginTriggers {
    #[serde(default)]
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginSpec {
    pub id: String,
    #[serde(default = "enabled_true")]
    pub enabled: bool,
    #[serde(default)]
    pub triggers: PluginTriggers,
    #[serde(default)]
    pub config: serde_yaml::Value,
}

const fn enabled_true() -> bool {
    true
}

#[must_use]
pub fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

pub async fn send_text(ctx: &PluginContext, text: impl Into<String>) -> Result<()> {
    let content = RoomMessageEventContent::text_plain(text.into());
    ctx.room.send(content).await?;
    Ok(())
}

pub async fn send_card(ctx: &PluginContext, card: &Card) -> Result<()> {
    let content = RoomMessageEventContent::text_html(card.to_plain(), card.to_html());
    ctx.room.send(content).await?;
    Ok(())
}
