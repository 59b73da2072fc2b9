use crate::config::ConfigError;

/// Reads an optional environment variable. Empty values count as unset.
pub fn get_env_var_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Reads a boolean flag such as `REMOVE_TEMP=true`.
///
/// Accepts `1/0`, `true/false`, `yes/no`, `on/off` (case-insensitive).
/// Returns `Ok(None)` when the variable is unset.
pub fn get_env_flag(name: &str) -> Result<Option<bool>, ConfigError> {
    let Some(raw) = get_env_var_opt(name) else {
        return Ok(None);
    };
    parse_flag(&raw)
        .map(Some)
        .ok_or_else(|| ConfigError::InvalidValue {
            name: name.to_string(),
            value: raw,
        })
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
