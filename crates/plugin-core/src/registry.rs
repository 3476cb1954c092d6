use core::fmt;
use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

use crate::{Plugin, PluginSpec};

#[derive(Clone)]
pub struct PluginEntry {
    pub spec: PluginSpec,
    pub plugin: Arc<dyn Plugin>,
}

impl fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginEntry")
            .field("spec", &self.spec)
            .field("plugin", &self.plugin.id())
            .finish()
    }
}

#[derive(Default)]
struct RegistryInner {
    by_id: HashMap<String, PluginEntry>,
    by_command: HashMap<String, String>,
}

/// Maps `!command` tokens to plugins.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry").finish_non_exhaustive()
    }
}

impl PluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, spec: PluginSpec, plugin: Arc<dyn Plugin>) -> Option<PluginEntry> {
        let mut inner = self.inner.write().await;
        let id = spec.id.clone();
        let previous = inner.by_id.insert(
            id.clone(),
            PluginEntry {
                spec: spec.clone(),
                plugin,
            },
        );
        inner.by_command.retain(|_, existing| existing != &id);
        for cmd in &spec.triggers.commands {
            inner.by_command.insert(normalize_cmd(cmd), id.clone());
        }
        previous
    }

    /// Looks up a command token; matching ignores case and a missing `!`.
    pub async fn entry_by_command(&self, token: &str) -> Option<PluginEntry> {
        let inner = self.inner.read().await;
        inner
            .by_command
            .get(&normalize_cmd(token))
            .and_then(|id| inner.by_id.get(id))
            .filter(|entry| entry.spec.enabled)
            .cloned()
    }

    pub async fn entries(&self) -> Vec<(String, PluginEntry)> {
        let inner = self.inner.read().await;
        inner
            .by_id
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect()
    }
}

#[must_use]
pub fn normalize_cmd(s: &str) -> String {
    let lowered = s.trim().to_lowercase();
    if lowered.starts_with('!') {
        lowered
    } else {
        format!("!{lowered}")
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use async_trait::async_trait;

    use super::*;
    use crate::{PluginContext, PluginTriggers};

    #[derive(Debug)]
    struct Noop;

    #[async_trait]
    impl Plugin for Noop {
        fn id(&self) -> &'static str {
            "noop"
        }
        fn spec(&self) -> PluginSpec {
            spec_with(&["noop"], true)
        }
        async fn run(&self, _ctx: &PluginContext, _args: &str, _spec: &PluginSpec) -> Result<()> {
            Ok(())
        }
    }

    fn spec_with(commands: &[&str], enabled: bool) -> PluginSpec {
        PluginSpec {
            id: "noop".to_owned(),
            enabled,
            triggers: PluginTriggers {
                commands: commands.iter().map(|c| (*c).to_owned()).collect(),
            },
            config: serde_yaml::Value::default(),
        }
    }

    #[test]
    fn normalize_adds_bang_and_lowercases() {
        assert_eq!(normalize_cmd("Jira"), "!jira");
        assert_eq!(normalize_cmd("!JIRA"), "!jira");
    }

    #[tokio::test]
    async fn command_lookup_is_case_insensitive() {
        let registry = PluginRegistry::new();
        registry.register(spec_with(&["jira"], true), Arc::new(Noop)).await;
        assert!(registry.entry_by_command("!JIRA").await.is_some());
        assert!(registry.entry_by_command("!other").await.is_none());
    }

    #[tokio::test]
    async fn reregistering_replaces_old_triggers() {
        let registry = PluginRegistry::new();
        registry.register(spec_with(&["old"], true), Arc::new(Noop)).await;
        let previous = registry.register(spec_with(&["new"], true), Arc::new(Noop)).await;
        assert!(previous.is_some());
        assert!(registry.entry_by_command("!old").await.is_none());
        assert!(registry.entry_by_command("!new").await.is_some());
        assert_eq!(registry.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn disabled_plugins_do_not_answer_commands() {
        let registry = PluginRegistry::new();
        registry.register(spec_with(&["noop"], false), Arc::new(Noop)).await;
        assert!(registry.entry_by_command("!noop").await.is_none());
        assert_eq!(registry.entries().await.len(), 1);
    }
}
