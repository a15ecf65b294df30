//! Env loading helpers.
//!
//! Values are trimmed and a blank value counts as unset, so `KEY=` in a
//! `.env` file never overrides a default.

use std::env;
use std::str::FromStr;

/// Parse `KEY=VALUE` lines of a dotenv file. Blank lines and `#` comments are
/// skipped, surrounding quotes are stripped.
pub fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(eq_pos) = line.find('=') else {
            continue;
        };
        let key = line[..eq_pos].trim();
        let mut value = line[eq_pos + 1..].trim();
        // Strip inline comment (# not inside quotes)
        if let Some(hash_pos) = value.find('#') {
            let before_hash = value[..hash_pos].trim_end();
            if !before_hash.contains('"') && !before_hash.contains('\'') {
                value = before_hash;
            }
        }
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            value = &value[1..value.len() - 1];
        }
        if !key.is_empty() {
            pairs.push((key.to_string(), value.to_string()));
        }
    }
    pairs
}

/// Load `./.env` into the process environment without overriding keys that
/// are already set. Runs at most once.
pub fn load_dotenv() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let path = env::current_dir()
            .map(|d| d.join(".env"))
            .unwrap_or_else(|_| std::path::PathBuf::from(".env"));
        if let Ok(content) = std::fs::read_to_string(&path) {
            for (key, value) in parse_dotenv(&content) {
                if env::var(&key).is_err() {
                    set_env_var(&key, &value);
                }
            }
        }
    });
}

/// Trimmed value of `key`, or `None` when unset or blank.
pub fn env_value(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Parse `key` as `T`. An unparseable value is logged and ignored.
pub fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env_value(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment value");
            None
        }
    }
}

/// On/off flag: `0`, `false`, `no` and `off` are off, any other value is on.
pub fn env_flag(key: &str, default: bool) -> bool {
    match env_value(key) {
        Some(v) => !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"),
        None => default,
    }
}

/// Comma-separated list; blank items are dropped.
pub fn env_list(key: &str) -> Vec<String> {
    env_value(key).map(|v| split_list(&v)).unwrap_or_default()
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

// SAFETY contract: mutate the environment only before the tokio runtime
// spawns worker threads.

#[allow(unsafe_code)]
fn set_env_var(key: &str, value: &str) {
    unsafe { env::set_var(key, value) };
}

#[cfg(test)]
#[allow(unsafe_code)]
fn remove_env_var(key: &str) {
    unsafe { env::remove_var(key) };
}
