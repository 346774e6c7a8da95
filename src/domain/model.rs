use serde::{Deserialize, Serialize};
use std::fmt;

/// Resolution key of the handler/variant table: `(interface, procedure, tag?)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandlerKey {
    pub interface: String,
    pub procedure: String,
    pub tag: Option<String>,
}

impl HandlerKey {
    pub fn new(interface: &str, procedure: &str, tag: Option<&str>) -> Self {
        Self {
            interface: interface.to_string(),
            procedure: procedure.to_string(),
            tag: tag.map(str::to_string),
        }
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}.{}#{}", self.interface, self.procedure, tag),
            None => write!(f, "{}.{}", self.interface, self.procedure),
        }
    }
}

/// Scope-qualified event name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    pub scope: String,
    pub name: String,
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.name)
    }
}

/// What the broker does with the remaining subscribers once one fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriberFailure {
    #[default]
    FailFast,
    RunAll,
}
