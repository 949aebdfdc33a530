//! Tool registry capability.
//!
//! The session asks the registry whether an accumulated function name is a
//! tool it may render. The query must be pure and must tolerate partial or
//! wrong names by answering `false`.

use rustc_hash::FxHashSet;

use crate::config::AppConfig;

/// Read-only lookup deciding which tool names are emittable.
pub trait ToolRegistry: Send + Sync {
    fn is_tool_supported(&self, name: &str) -> bool;
}

impl<F> ToolRegistry for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_tool_supported(&self, name: &str) -> bool {
        self(name)
    }
}

/// Registry backed by a fixed set of tool names.
#[derive(Debug, Clone, Default)]
pub struct StaticToolRegistry {
    names: FxHashSet<Box<str>>,
}

impl StaticToolRegistry {
    #[must_use]
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|name| Box::<str>::from(name.as_ref()))
                .collect(),
        }
    }

    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.tool_names())
    }

    /// Add a name; returns `false` when it was already present.
    pub fn insert(&mut self, name: &str) -> bool {
        self.names.insert(Box::from(name))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl ToolRegistry for StaticToolRegistry {
    fn is_tool_supported(&self, name: &str) -> bool {
        !name.is_empty() && self.names.contains(name)
    }
}
