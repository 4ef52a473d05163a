use super::core::PluginInfo;

/// The installed plugins, in installation order.
///
/// A plugin is "recognized" exactly when it is in the catalog. Registrations
/// whose owning plugin is missing here still dispatch, but never receive
/// options.
#[derive(Debug, Clone, Default)]
pub struct PluginCatalog {
    plugins: Vec<PluginInfo>,
}

impl PluginCatalog {
    pub fn get(&self, name: &str) -> Option<&PluginInfo> {
        self.plugins.iter().find(|p| p.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginInfo> {
        self.plugins.iter()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Adds `info`; returns `false` if a plugin with that name exists.
    pub(crate) fn insert(&mut self, info: PluginInfo) -> bool {
        if self.contains(info.name()) {
            return false;
        }
        self.plugins.push(info);
        true
    }
}
