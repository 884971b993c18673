//! Layered configuration loading
//!
//! Sources, lowest priority first:
//! 1. built-in defaults
//! 2. `/etc/procsignal/config.toml`
//! 3. `<config dir>/procsignal/config.toml` (XDG on Linux)
//! 4. `~/.procsignal.toml`
//! 5. `./.procsignal.toml`
//! 6. an explicit override file
//! 7. `PROCSIGNAL_*` environment variables

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use super::model::Config;

const APP_NAME: &str = "procsignal";

/// Environment override prefix; nested keys are separated by `__`
const ENV_PREFIX: &str = "PROCSIGNAL_";

/// Candidate config files, lowest priority first
pub fn config_paths() -> Vec<PathBuf> {
    let system = PathBuf::from("/etc").join(APP_NAME).join("config.toml");
    let user = dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.toml"));
    let home = dirs::home_dir().map(|dir| dir.join(dotfile()));

    std::iter::once(system)
        .chain(user)
        .chain(home)
        .chain(std::iter::once(PathBuf::from(dotfile())))
        .collect()
}

fn dotfile() -> String {
    format!(".{}.toml", APP_NAME)
}

/// Build the provider stack without extracting it
///
/// A missing override file is reported and skipped rather than treated as
/// an error.
pub fn layered(override_path: Option<&Path>) -> Figment {
    let files = config_paths().into_iter().filter(|p| p.is_file());

    let mut figment = files.fold(
        Figment::from(Serialized::defaults(Config::default())),
        |figment, path| {
            tracing::debug!(path = %path.display(), "Merging config file");
            figment.merge(Toml::file(path))
        },
    );

    match override_path {
        Some(path) if path.is_file() => {
            tracing::debug!(path = %path.display(), "Merging override config");
            figment = figment.merge(Toml::file(path));
        }
        Some(path) => tracing::warn!(path = %path.display(), "Override config not found"),
        None => {}
    }

    // PROCSIGNAL_LOG is the log filter, not part of the model
    figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["LOG"]).split("__"))
}

/// Load the effective configuration
///
/// e.g. `PROCSIGNAL_LAUNCH__KILL_ON_DISPOSE=false` sets
/// `launch.kill_on_dispose`.
pub fn load_config(override_path: Option<&str>) -> Result<Config> {
    layered(override_path.map(Path::new))
        .extract()
        .context("Failed to load configuration")
}

/// Config files that currently exist, lowest priority first
pub fn find_config_files() -> Vec<PathBuf> {
    config_paths().into_iter().filter(|p| p.is_file()).collect()
}
