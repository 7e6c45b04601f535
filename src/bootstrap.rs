//! Bootstrap helpers for statuslink.
//!
//! Device selection (`STATUS_DEVICE_IP`, `STATUS_DEVICE_PORT`) is persisted to
//! `~/.statuslink/.env` so later runs in any dApp directory find the phone
//! without repeating flags.
//!
//! File: `~/.statuslink/.env` (standard dotenvy format)

use std::path::PathBuf;

/// Path to the statuslink `.env` file: `~/.statuslink/.env`.
pub fn statuslink_env_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".statuslink")
        .join(".env")
}

/// Load env vars from `~/.statuslink/.env` (in addition to the standard `.env`).
///
/// Call this **after** `dotenvy::dotenv()` so that the standard `./.env`
/// takes priority. dotenvy never overwrites existing env vars, so the
/// effective priority is:
///
///   explicit env vars > `./.env` > `~/.statuslink/.env`
pub fn load_statuslink_env() {
    let path = statuslink_env_path();
    if path.exists()
        && let Err(e) = dotenvy::from_path(&path)
    {
        tracing::warn!("Failed to load {}: {}", path.display(), e);
    }
}

/// Write bootstrap vars to `~/.statuslink/.env`.
///
/// Creates the parent directory if it doesn't exist. Values are
/// double-quoted and escaped so dotenvy reads them back verbatim.
pub fn save_bootstrap_env(vars: &[(&str, &str)]) -> std::io::Result<()> {
    save_bootstrap_env_to(&statuslink_env_path(), vars)
}

fn save_bootstrap_env_to(path: &std::path::Path, vars: &[(&str, &str)]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut content = String::new();
    for (key, value) in vars {
        // Escape backslashes and double quotes to prevent env var injection.
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        content.push_str(&format!("{}=\"{}\"\n", key, escaped));
    }
    std::fs::write(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn env_path_under_statuslink() {
        let path = statuslink_env_path();
        assert!(path.ends_with(".statuslink/.env"));
    }

    #[test]
    fn save_bootstrap_env_round_trips_through_dotenvy() {
        let dir = tempdir().unwrap();
        let env_path = dir.path().join("nested").join(".env");

        save_bootstrap_env_to(
            &env_path,
            &[
                ("STATUS_DEVICE_IP", "192.168.1.20"),
                ("STATUS_PLUGIN_NAME", "my \"quoted\" dapp"),
            ],
        )
        .unwrap();

        let parsed: Vec<(String, String)> = dotenvy::from_path_iter(&env_path)
            .unwrap()
            .filter_map(|item| item.ok())
            .collect();

        assert_eq!(parsed.len(), 2);
        assert_eq!(
            parsed[0],
            ("STATUS_DEVICE_IP".to_string(), "192.168.1.20".to_string())
        );
        assert_eq!(
            parsed[1],
            (
                "STATUS_PLUGIN_NAME".to_string(),
                "my \"quoted\" dapp".to_string()
            )
        );
    }
}
