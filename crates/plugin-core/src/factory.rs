use std::sync::Arc;

use crate::{Plugin, PluginSpec};

/// Builds a plugin and contributes its default spec to the bot config.
pub trait PluginFactory {
    /// Adds this plugin's default spec unless the config already has one with
    /// the same id.
    fn register_defaults(&self, specs: &mut Vec<PluginSpec>);

    #[must_use]
    fn build(&self) -> Arc<dyn Plugin + Send + Sync>;
}
