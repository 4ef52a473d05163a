//! The per-repository view the dispatcher reads activation and settings from.
//!
//! Persistence lives outside this workspace; [`RepositoryContext`] is the
//! boundary it implements. [`Repository`] is a plain in-memory implementation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::RepositoryHandle;
use crate::error::{RepositoryError, RepositoryResult};

/// Stored settings of one plugin for one repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSettings {
    /// Name of the plugin the settings belong to.
    pub name: String,
    #[serde(default)]
    pub settings: Map<String, Value>,
}

impl PluginSettings {
    pub fn new(name: impl Into<String>, settings: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            settings,
        }
    }
}

/// Read-only view of a repository's activation state and stored settings.
pub trait RepositoryContext: Send + Sync {
    /// `owner/name` of the repository.
    fn full_name(&self) -> &str;

    /// Whether GitMate is switched on for this repository as a whole.
    fn is_active(&self) -> bool {
        true
    }

    /// Names of the plugins enabled for this repository.
    fn active_plugins(&self) -> &BTreeSet<String>;

    /// Stored per-plugin settings.
    fn plugin_settings(&self) -> &[PluginSettings];

    /// Builds the hosting-provider domain object for this repository.
    ///
    /// This can fail, e.g. if the hosting provider is unreachable or the
    /// installation lost access to the repository.
    fn handle(&self) -> RepositoryResult<RepositoryHandle>;

    fn has_plugin(&self, plugin: &str) -> bool {
        self.active_plugins().contains(plugin)
    }

    /// The stored settings entry for `plugin`, if any.
    fn settings_for(&self, plugin: &str) -> Option<&Map<String, Value>> {
        self.plugin_settings()
            .iter()
            .find(|entry| entry.name == plugin)
            .map(|entry| &entry.settings)
    }
}

/// In-memory repository record.
#[derive(Debug, Clone)]
pub struct Repository {
    full_name: String,
    active: bool,
    plugins: BTreeSet<String>,
    settings: Vec<PluginSettings>,
    handle: Option<RepositoryHandle>,
}

impl Repository {
    /// Creates an active repository with no plugins enabled.
    ///
    /// Without a handle, [`RepositoryContext::handle`] reports the repository
    /// as unreachable.
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            active: true,
            plugins: BTreeSet::new(),
            settings: Vec::new(),
            handle: None,
        }
    }

    pub fn with_handle(mut self, handle: RepositoryHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugins.insert(plugin.into());
        self
    }

    pub fn with_settings(mut self, plugin: impl Into<String>, settings: Map<String, Value>) -> Self {
        self.set_settings(plugin, settings);
        self
    }

    pub fn enable_plugin(&mut self, plugin: impl Into<String>) {
        self.plugins.insert(plugin.into());
    }

    /// Disables a plugin. Stored settings are kept.
    pub fn disable_plugin(&mut self, plugin: &str) {
        self.plugins.remove(plugin);
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Replaces the stored settings entry for `plugin`.
    pub fn set_settings(&mut self, plugin: impl Into<String>, settings: Map<String, Value>) {
        let plugin = plugin.into();
        match self.settings.iter_mut().find(|entry| entry.name == plugin) {
            Some(entry) => entry.settings = settings,
            None => self.settings.push(PluginSettings::new(plugin, settings)),
        }
    }
}

impl RepositoryContext for Repository {
    fn full_name(&self) -> &str {
        &self.full_name
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn active_plugins(&self) -> &BTreeSet<String> {
        &self.plugins
    }

    fn plugin_settings(&self) -> &[PluginSettings] {
        &self.settings
    }

    fn handle(&self) -> RepositoryResult<RepositoryHandle> {
        self.handle
            .clone()
            .ok_or_else(|| RepositoryError::unreachable(&self.full_name, "no hosting handle"))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::Hoster;

    fn settings(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_settings_lookup() {
        let mut repo = Repository::new("gitmate/test")
            .with_plugin("welcome_commenter")
            .with_settings("welcome_commenter", settings(json!({"message": "hi"})));

        assert!(repo.has_plugin("welcome_commenter"));
        assert_eq!(
            repo.settings_for("welcome_commenter").unwrap()["message"],
            "hi"
        );
        assert!(repo.settings_for("auto_label").is_none());

        repo.set_settings("welcome_commenter", settings(json!({"message": "hello"})));
        assert_eq!(repo.plugin_settings().len(), 1);
        assert_eq!(
            repo.settings_for("welcome_commenter").unwrap()["message"],
            "hello"
        );

        repo.disable_plugin("welcome_commenter");
        assert!(!repo.has_plugin("welcome_commenter"));
        assert!(repo.settings_for("welcome_commenter").is_some());
    }

    #[test]
    fn test_handle_requires_hosting_handle() {
        let repo = Repository::new("gitmate/test");
        assert!(matches!(
            repo.handle(),
            Err(RepositoryError::Unreachable { .. })
        ));

        let handle = RepositoryHandle::new(Hoster::GitLab, "gitmate/test", 3439658);
        let repo = repo.with_handle(handle.clone());
        assert_eq!(repo.handle().unwrap(), handle);
    }
}
