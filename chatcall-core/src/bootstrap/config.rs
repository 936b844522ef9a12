//! Configuration loading

use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::Config;

/// Well-known locations, tried in order when no explicit path is given.
const SEARCH_PATHS: [&str; 2] = ["config.yaml", "/config/config.yaml"];

/// Load and validate the service configuration.
///
/// The file is resolved through `CHATCALL_CONFIG_PATH`, then `./config.yaml`,
/// then the `/config/config.yaml` container mount. Without a file the
/// environment alone supplies the values. Any validation failure aborts
/// startup; a half-configured service must not come up.
pub fn load_config() -> Result<Config> {
    // Logging is not up yet at this point, hence eprintln.
    let config = match locate_config_file()? {
        Some(path) => {
            eprintln!("Loading config from {}", path.display());
            Config::from_file(&path.to_string_lossy())
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?
        }
        None => {
            eprintln!("No config file found, using environment variables");
            Config::from_env()?
        }
    };

    if let Err(errors) = config.validate() {
        bail!("Invalid configuration:\n  - {}", errors.join("\n  - "));
    }

    Ok(config)
}

/// Resolve the config file path.
///
/// An explicitly named path that does not exist is an error rather than a
/// silent fallthrough; the well-known locations are optional.
fn locate_config_file() -> Result<Option<PathBuf>> {
    if let Ok(path) = std::env::var("CHATCALL_CONFIG_PATH") {
        let path = PathBuf::from(path);
        if !path.exists() {
            bail!(
                "CHATCALL_CONFIG_PATH points to {}, which does not exist",
                path.display()
            );
        }
        return Ok(Some(path));
    }

    Ok(SEARCH_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists()))
}
