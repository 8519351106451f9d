use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

use crate::error::SchemaError;
use crate::schema::ActionKind;

/// Options consumed by the form assembler and the request decoder.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WrapperConfig {
    /// `name` attribute of the generated form.
    pub form_name: String,
    /// When set, `<prefix>request` and `<prefix>response` are injected into
    /// every decoded argument set.
    pub destination_prefix: Option<String>,
    pub hooks: Hooks,
    /// Groups left out of the page. Their submit actions are still honored.
    pub skip_groups: BTreeSet<String>,
    /// Action kinds rendered as submit buttons instead of data fields.
    pub submit_actions: BTreeSet<ActionKind>,
    /// Lay groups out as tables instead of CSS grids.
    pub use_tables: bool,
}

impl Default for WrapperConfig {
    fn default() -> Self {
        Self {
            form_name: String::new(),
            destination_prefix: None,
            hooks: Hooks::default(),
            skip_groups: BTreeSet::new(),
            submit_actions: [ActionKind::Help, ActionKind::Version, ActionKind::Trigger]
                .into_iter()
                .collect(),
            use_tables: false,
        }
    }
}

/// Per-destination customizations, keyed `<dest>.handlers` and `<dest>.split`
/// in their serialized form.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "BTreeMap<String, serde_json::Value>")]
pub struct Hooks {
    handlers: BTreeMap<String, BTreeMap<String, String>>,
    split: BTreeSet<String>,
}

impl Hooks {
    /// Bind a client-side event handler; `%s` in `script` is replaced with
    /// the destination name.
    pub fn with_handler(
        mut self,
        dest: impl Into<String>,
        event: impl Into<String>,
        script: impl Into<String>,
    ) -> Self {
        self.handlers
            .entry(dest.into())
            .or_default()
            .insert(event.into(), script.into());
        self
    }

    /// Split the first posted value of `dest` on whitespace.
    pub fn with_split(mut self, dest: impl Into<String>) -> Self {
        self.split.insert(dest.into());
        self
    }

    pub fn handlers(&self, dest: &str) -> Option<&BTreeMap<String, String>> {
        self.handlers.get(dest)
    }

    pub fn splits(&self, dest: &str) -> bool {
        self.split.contains(dest)
    }
}

impl TryFrom<BTreeMap<String, serde_json::Value>> for Hooks {
    type Error = SchemaError;

    fn try_from(raw: BTreeMap<String, serde_json::Value>) -> Result<Self, Self::Error> {
        let mut hooks = Hooks::default();
        for (key, value) in raw {
            let invalid = |reason: &str| SchemaError::Hook {
                key: key.clone(),
                reason: reason.to_string(),
            };
            let Some((dest, suffix)) = key.rsplit_once('.') else {
                return Err(invalid("expected '<destination>.<hook>'"));
            };
            match suffix {
                "handlers" => {
                    let events = value
                        .as_object()
                        .ok_or_else(|| invalid("handlers must map event names to scripts"))?;
                    for (event, script) in events {
                        let script = script
                            .as_str()
                            .ok_or_else(|| invalid("handler scripts must be strings"))?;
                        hooks = hooks.with_handler(dest, event.clone(), script);
                    }
                }
                "split" => {
                    if value.as_bool().unwrap_or(false) {
                        hooks = hooks.with_split(dest);
                    }
                }
                _ => return Err(invalid("unknown hook, expected 'handlers' or 'split'")),
            }
        }
        Ok(hooks)
    }
}
