use std::{collections::HashMap, path::Path, sync::Arc};

use plugin_core::factory::PluginFactory;
use plugin_core::{Plugin, PluginRegistry, PluginSpec};
use tracing::warn;

use crate::BotConfig;

fn factories() -> Vec<Box<dyn PluginFactory>> {
    vec![Box::new(plugin_jira::JiraPluginFactory)]
}

pub async fn build_registry(config: &BotConfig, plugins_dir: &Path) -> Arc<PluginRegistry> {
    let mut specs = config.plugins.clone().unwrap_or_default();
    let mut plugins: HashMap<String, Arc<dyn Plugin + Send + Sync>> = HashMap::new();
    for factory in factories() {
        let plugin = factory.build();
        merge_default_spec(&mut specs, plugin.spec());
        factory.register_defaults(&mut specs);
        plugins.insert(plugin.id().to_owned(), plugin);
    }

    let registry = Arc::new(PluginRegistry::new());
    for mut spec in specs {
        let Some(plugin) = plugins.get(spec.id.as_str()) else {
            warn!("Unknown plugin ID: {}", spec.id);
            continue;
        };
        if let Some(file_cfg) = load_plugin_config(plugins_dir, &spec.id) {
            spec.config = merge_yaml(file_cfg, spec.config);
        }
        let plugin: Arc<dyn Plugin> = Arc::<dyn Plugin + Send + Sync>::clone(plugin);
        registry.register(spec, plugin).await;
    }

    registry
}

/// Deep-merges two YAML values; on conflicting scalars the file value wins.
fn merge_yaml(file_cfg: serde_yaml::Value, spec_cfg: serde_yaml::Value) -> serde_yaml::Value {
    use serde_yaml::Value::{Mapping, Null, Sequence};
    match (file_cfg, spec_cfg) {
        (Mapping(mut a), Mapping(b)) => {
            for (k, v_b) in b {
                match a.get_mut(&k) {
                    Some(v_a) => {
                        let merged = merge_yaml(v_a.clone(), v_b);
                        *v_a = merged;
                    }
                    None => {
                        a.insert(k, v_b);
                    }
                }
            }
            Mapping(a)
        }
        (Sequence(mut a), Sequence(b)) => {
            a.extend(b);
            Sequence(a)
        }
        (Null, b) => b,
        (a, _b) => a,
    }
}

fn load_plugin_config(root: &Path, id: &str) -> Option<serde_yaml::Value> {
    let path = root.join(id).join("config.yaml");
    match std::fs::read_to_string(&path) {
        Ok(s) => match serde_yaml::from_str::<serde_yaml::Value>(&s) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(plugin = %id, file = %path.display(), error = %e, "Failed to parse plugin config YAML");
                None
            }
        },
        Err(e) => {
            if path.exists() {
                warn!(plugin = %id, file = %path.display(), error = %e, "Failed to read plugin config file");
            }
            None
        }
    }
}

fn merge_default_spec(specs: &mut [PluginSpec], default: PluginSpec) {
    if let Some(existing) = specs.iter_mut().find(|s| s.id == default.id) {
        // Keep user-provided config and enabled flag; only add missing commands.
        for cmd in default.triggers.commands {
            if !existing
                .triggers
                .commands
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&cmd))
            {
                existing.triggers.commands.push(cmd);
            }
        }
    }
}
