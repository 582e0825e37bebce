use std::fs;
use std::path::{Path, PathBuf};

use crate::services::ContactService;
use crate::types::Config;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "IDENTITY_RECONCILER_CONFIG";

/// Shared state handed to every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub contacts: ContactService,
}

impl AppState {
    pub fn new(contacts: ContactService) -> Self {
        Self { contacts }
    }
}

/// Load configuration.
///
/// Reads the file named by `IDENTITY_RECONCILER_CONFIG`, else
/// `~/.identity-reconciler/config.json` when it exists, else defaults.
/// `PORT` and `DATABASE_PATH` override whatever the file says.
pub fn load_config() -> Result<Config, String> {
    let explicit = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
    let config = match explicit {
        Some(path) => read_config_file(&path)?,
        None => match default_config_path() {
            Some(path) if path.exists() => read_config_file(&path)?,
            _ => Config::default(),
        },
    };
    apply_env_overrides(
        config,
        std::env::var("PORT").ok(),
        std::env::var_os("DATABASE_PATH").map(PathBuf::from),
    )
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".identity-reconciler").join("config.json"))
}

fn read_config_file(path: &Path) -> Result<Config, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config {}: {}", path.display(), e))?;
    serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse config {}: {}", path.display(), e))
}

fn apply_env_overrides(
    mut config: Config,
    port: Option<String>,
    database_path: Option<PathBuf>,
) -> Result<Config, String> {
    if let Some(port) = port.filter(|p| !p.trim().is_empty()) {
        config.port = port
            .trim()
            .parse()
            .map_err(|_| format!("PORT must be a port number, got {port:?}"))?;
    }
    if let Some(path) = database_path.filter(|p| !p.as_os_str().is_empty()) {
        config.database_path = Some(path);
    }
    Ok(config)
}
