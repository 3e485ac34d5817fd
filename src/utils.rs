use std::path::PathBuf;

use dirs::config_dir;

pub const CONFIG_PATH_ENV: &str = "CAMPUS_EVENTS_CONFIG";

pub fn config_root() -> PathBuf {
    config_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
        .join("campus-events")
}

/// `$CAMPUS_EVENTS_CONFIG`, else `<config dir>/campus-events/config.json`.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| config_root().join("config.json"))
}
