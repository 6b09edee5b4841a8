use std::fs;

use serde::{Deserialize, Serialize};

/// Configuration stored in ~/.editorsync/config.json
///
/// Every field has a default so the tool runs with no config file at all;
/// a present-but-malformed file is an error rather than a silent fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// MediaWiki API endpoint used for live globaluserinfo fetches.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Default staleness window in days; overridable per run with
    /// `--timedelta-days`.
    #[serde(default = "default_staleness_days")]
    pub staleness_days: i64,
    /// Explicit database path. Defaults to `~/.editorsync/editors.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

fn default_api_url() -> String {
    "https://meta.wikimedia.org/w/api.php".to_string()
}

fn default_staleness_days() -> i64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            staleness_days: default_staleness_days(),
            db_path: None,
        }
    }
}

/// Load configuration from ~/.editorsync/config.json.
///
/// A missing file yields the defaults; an unreadable or unparseable file is
/// surfaced to the caller.
pub fn load_config() -> Result<Config, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    let config_path = home.join(".editorsync").join("config.json");

    if !config_path.exists() {
        return Ok(Config::default());
    }

    let content =
        fs::read_to_string(&config_path).map_err(|e| format!("Failed to read config: {}", e))?;

    serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))
}
