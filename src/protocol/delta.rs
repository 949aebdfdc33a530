use serde::{Deserialize, Serialize};

/// One streamed fragment of a tool call.
///
/// Every string field is a suffix to append to what has already been
/// accumulated for `index`, never a replacement. The shape matches the
/// OpenAI-compatible `delta.tool_calls[*]` wire object, so chunks can be
/// deserialized straight into it (`type` and other extras are ignored).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionDelta>,
}

/// Name/arguments suffixes within a [`ToolCallDelta`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl ToolCallDelta {
    #[must_use]
    pub fn new(index: u32) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.function.get_or_insert_with(FunctionDelta::default).name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.function
            .get_or_insert_with(FunctionDelta::default)
            .arguments = Some(arguments.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.function.as_ref()?.name.as_deref()
    }

    #[must_use]
    pub fn arguments(&self) -> Option<&str> {
        self.function.as_ref()?.arguments.as_deref()
    }
}
