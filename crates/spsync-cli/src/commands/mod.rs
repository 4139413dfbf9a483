pub mod config;
pub mod sync;

use anyhow::{Context as _, Result};
use spsync_core::config::Config;

use crate::Context;

/// Loads the configuration file
///
/// A missing default file yields the defaults; a file named with
/// `--config` must exist and parse.
pub fn load_config(ctx: &Context) -> Result<Config> {
    if ctx.explicit_config {
        Config::load(&ctx.config_path).with_context(|| {
            format!("Failed to load configuration from {}", ctx.config_path.display())
        })
    } else {
        Ok(Config::load_or_default(&ctx.config_path))
    }
}
