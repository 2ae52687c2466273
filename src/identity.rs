//! Identity resolution for GitHub calls.
//!
//! A board is often written by several agents or bots. Rather than requiring
//! `--as` on every invocation, identity is resolved through a chain:
//!
//! 1. `--as <identity>`: explicit per-command override
//! 2. `BUILDBOARD_IDENTITY` env var: process/session level
//! 3. `identity` in the config file: global default
//!
//! A resolved identity selects a dedicated `gh` config directory. With no
//! identity at all, `gh` falls back to its own ambient auth (`GH_TOKEN`,
//! the user's login), which is what CI agents usually have.

use std::env;
use std::path::PathBuf;

use crate::config::Config;

/// Resolve the acting identity, if any.
pub fn resolve_identity(explicit: Option<&str>, config: &Config) -> Option<String> {
    resolve_from(explicit, env::var("BUILDBOARD_IDENTITY").ok(), config)
}

fn resolve_from(explicit: Option<&str>, from_env: Option<String>, config: &Config) -> Option<String> {
    explicit
        .map(str::to_string)
        .or(from_env)
        .or_else(|| config.identity.clone())
        .filter(|id| !id.is_empty())
}

/// Resolve the `GH_CONFIG_DIR` for a given identity.
///
/// Each identity has its own config directory under
/// `~/.buildboard/gh-config/<identity>/`. The directory must exist and
/// contain valid `gh` auth.
pub fn gh_config_dir(identity: &str) -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("could not determine home directory")?;
    let config_dir = home.join(".buildboard").join("gh-config").join(identity);
    if !config_dir.exists() {
        return Err(format!(
            "no GitHub config for identity '{identity}': expected directory at {}\n\
             Set up with: GH_CONFIG_DIR={} gh auth login",
            config_dir.display(),
            config_dir.display(),
        ));
    }
    Ok(config_dir)
}
