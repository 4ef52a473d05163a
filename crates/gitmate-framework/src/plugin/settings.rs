//! Per-repository settings resolution.
//!
//! Each plugin declares a settings schema (`name → default`). A repository may
//! store its own values for any of them. The resolver merges the two: stored
//! values win, declared defaults fill the gaps. Settings are always scoped to a
//! single plugin, so two plugins declaring `stale_label` never see each
//! other's value.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::trace;

use gitmate_core::RepositoryContext;

use super::catalog::PluginCatalog;

/// Resolves a plugin's effective settings for a repository.
#[derive(Debug, Clone)]
pub struct SettingsResolver {
    catalog: Arc<PluginCatalog>,
}

impl SettingsResolver {
    pub fn new(catalog: Arc<PluginCatalog>) -> Self {
        Self { catalog }
    }

    /// Returns the settings of `plugin` as seen by `repository`.
    ///
    /// - unknown plugin: empty map
    /// - no repository, or no stored entry: the declared defaults
    /// - stored entry: the declared defaults overlaid with the stored values
    pub fn resolve(
        &self,
        plugin: &str,
        repository: Option<&dyn RepositoryContext>,
    ) -> Map<String, Value> {
        let Some(info) = self.catalog.get(plugin) else {
            trace!(plugin = %plugin, "Plugin not installed, no settings");
            return Map::new();
        };

        let mut settings = info.settings().clone();
        if let Some(stored) = repository.and_then(|repo| repo.settings_for(plugin)) {
            settings.extend(stored.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::plugin::Plugin;
    use gitmate_core::Repository;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn resolver() -> SettingsResolver {
        let mut catalog = PluginCatalog::default();
        catalog.insert(
            Plugin::new("pr_stale_reminder")
                .setting("stale_label", "status/STALE")
                .setting("pr_expire_limit", 7)
                .info()
                .clone(),
        );
        catalog.insert(
            Plugin::new("issue_stale_reminder")
                .setting("stale_label", "status/STALE")
                .info()
                .clone(),
        );
        SettingsResolver::new(Arc::new(catalog))
    }

    #[test]
    fn test_unknown_plugin_resolves_to_nothing() {
        let repo = Repository::new("gitmate/test")
            .with_settings("not_installed", map(json!({"anything": 1})));
        assert!(resolver().resolve("not_installed", Some(&repo)).is_empty());
        assert!(resolver().resolve("not_installed", None).is_empty());
    }

    #[test]
    fn test_defaults_without_stored_entry() {
        let resolver = resolver();
        let expected = map(json!({"stale_label": "status/STALE", "pr_expire_limit": 7}));
        assert_eq!(resolver.resolve("pr_stale_reminder", None), expected);

        let repo = Repository::new("gitmate/test").with_plugin("pr_stale_reminder");
        assert_eq!(resolver.resolve("pr_stale_reminder", Some(&repo)), expected);
    }

    #[test]
    fn test_stored_values_are_scoped_to_their_plugin() {
        let repo = Repository::new("gitmate/test")
            .with_settings("pr_stale_reminder", map(json!({"stale_label": "stale-pr"})))
            .with_settings("issue_stale_reminder", map(json!({"stale_label": "stale-issue"})));
        let resolver = resolver();

        assert_eq!(
            resolver.resolve("pr_stale_reminder", Some(&repo)),
            map(json!({"stale_label": "stale-pr", "pr_expire_limit": 7}))
        );
        assert_eq!(
            resolver.resolve("issue_stale_reminder", Some(&repo)),
            map(json!({"stale_label": "stale-issue"}))
        );
    }
}
