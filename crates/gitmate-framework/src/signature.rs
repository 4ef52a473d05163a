//! Declared parameter lists of responders.
//!
//! A responder receives its positional arguments from the event and its
//! *options* from the owning plugin's per-repository settings. Which of its
//! parameters are options is declared up front with a [`Signature`]: every
//! parameter that carries a default is an option, every other parameter is
//! positional.
//!
//! ```rust
//! use gitmate_framework::Signature;
//!
//! let signature = Signature::new()
//!     .arg("pr")
//!     .option("stale_label", "status/STALE")
//!     .option("pr_expire_limit", 7);
//!
//! assert_eq!(signature.options(), vec!["stale_label", "pr_expire_limit"]);
//! ```

use serde_json::{Map, Value};

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    default: Option<Value>,
}

impl Parameter {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared default, present only for options.
    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn is_option(&self) -> bool {
        self.default.is_some()
    }
}

/// Ordered parameter list of a responder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    params: Vec<Parameter>,
}

impl Signature {
    /// Creates an empty signature (no arguments, no options).
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a positional parameter.
    pub fn arg(mut self, name: impl Into<String>) -> Self {
        self.declare(name.into(), None);
        self
    }

    /// Declares an option with its default value.
    ///
    /// Declaring the same name again replaces the default but keeps the
    /// parameter's original position.
    pub fn option(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.declare(name.into(), Some(default.into()));
        self
    }

    fn declare(&mut self, name: String, default: Option<Value>) {
        match self.params.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.default = default,
            None => self.params.push(Parameter { name, default }),
        }
    }

    /// Names of all parameters that carry a default, in declaration order.
    pub fn options(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter(|p| p.is_option())
            .map(|p| p.name.as_str())
            .collect()
    }

    pub fn is_option(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name && p.is_option())
    }

    /// The declared default of option `name`.
    pub fn default_of(&self, name: &str) -> Option<&Value> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .and_then(Parameter::default)
    }

    /// All option defaults keyed by name.
    pub fn defaults(&self) -> Map<String, Value> {
        self.params
            .iter()
            .filter_map(|p| p.default.clone().map(|d| (p.name.clone(), d)))
            .collect()
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.params
    }

    /// Keeps only the entries of `settings` that name one of this signature's
    /// options.
    pub fn filter_options(&self, settings: &Map<String, Value>) -> Map<String, Value> {
        settings
            .iter()
            .filter(|(key, _)| self.is_option(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}
