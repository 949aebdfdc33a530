use rustc_hash::FxHashSet;

use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_tools(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_tools(config: &AppConfig) -> Result<(), ConfigError> {
    let mut seen = FxHashSet::default();
    for tool in &config.tools {
        if tool.name.trim().is_empty() {
            return Err(validation_err("tools contains an empty name"));
        }
        if !is_xml_name(&tool.name) {
            return Err(validation_err(format!(
                "Tool '{}': name must start with a letter or '_' and contain only letters, digits, '_', '-' or '.'",
                tool.name
            )));
        }
        if !seen.insert(tool.name.as_str()) {
            return Err(validation_err(format!(
                "Tool '{}' is declared more than once",
                tool.name
            )));
        }
    }
    Ok(())
}

const VALID_LOG_LEVELS: &[&str] = &[
    "DEBUG", "INFO", "WARNING", "WARN", "ERROR", "CRITICAL", "DISABLED",
];

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let level = config.features.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "log_level '{}' is invalid. Must be one of: {}",
            config.features.log_level,
            VALID_LOG_LEVELS.join(", ")
        )));
    }
    Ok(())
}

/// Tool names become XML tag names, so they follow a conservative subset of
/// the XML `Name` production.
fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FeaturesConfig, ToolConfig};

    fn make_valid_config() -> AppConfig {
        AppConfig {
            tools: vec![
                ToolConfig {
                    name: "read_file".to_string(),
                    description: String::new(),
                },
                ToolConfig {
                    name: "write_to_file".to_string(),
                    description: "Write a file".to_string(),
                },
            ],
            features: FeaturesConfig::default(),
            input: Default::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = make_valid_config();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_no_tools_is_allowed() {
        let mut config = make_valid_config();
        config.tools.clear();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_empty_tool_name() {
        let mut config = make_valid_config();
        config.tools[0].name = "  ".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_duplicate_tool_name() {
        let mut config = make_valid_config();
        config.tools[1].name = "read_file".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_tool_name_must_be_xml_name() {
        let mut config = make_valid_config();
        config.tools[0].name = "1read".to_string();
        assert!(validate_config(&config).is_err());
        config.tools[0].name = "read file".to_string();
        assert!(validate_config(&config).is_err());
        config.tools[0].name = "mcp.read-file_v2".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_log_level_validation() {
        let mut config = make_valid_config();
        config.features.log_level = "warning".to_string();
        assert!(validate_config(&config).is_ok());
        config.features.log_level = "VERBOSE".to_string();
        assert!(validate_config(&config).is_err());
    }
}
