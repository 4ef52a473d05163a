//! Plugin declarations and settings.
//!
//! # Architecture
//!
//! A [`Plugin`] is a named bundle of [`Responder`]s and scheduled jobs plus a
//! settings schema. Plugins are installed into a
//! [`RegistryBuilder`](crate::RegistryBuilder) at startup, which records each
//! plugin's [`PluginInfo`] in the [`PluginCatalog`] and its responders in the
//! registry table.
//!
//! Whether a plugin runs for a given repository is decided per event from the
//! repository's `active_plugins()`. The plugin itself never knows which
//! repositories enabled it.
//!
//! # Settings
//!
//! ```rust,ignore
//! let plugin = Plugin::new("welcome_commenter")
//!     .setting("message", "Thanks for your contribution!")
//!     .responder(
//!         [MergeRequestAction::Opened],
//!         Responder::new("add_welcome_comment", add_welcome_comment)
//!             .signature(Signature::new().arg("pr").option("message", "")),
//!     );
//! ```
//!
//! When `merge_request.opened` is dispatched for a repository, the
//! [`SettingsResolver`] produces the repository's `welcome_commenter` settings
//! and the responder receives the `message` entry, because `message` is one of
//! its declared options.

// ─── Submodules ──────────────────────────────────────────────────────────────
pub mod catalog;
pub mod core;
pub mod settings;

// ─── Re-exports from submodules ──────────────────────────────────────────────
pub use catalog::PluginCatalog;
pub use core::{Plugin, PluginInfo, Responder};
pub use settings::SettingsResolver;
