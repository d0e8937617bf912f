//! Subcommand implementations

pub mod configuration;
pub mod deduplicate;
pub mod depth;
pub mod enqueue;
pub mod run;
pub mod worker;

use crate::app::App;
use crate::settings::Settings;
use crate::{Cli, ShardArgs};
use anyhow::Result;
use lightq_core::domain::MachineShard;

/// Load settings for `cli` and build the application
pub(crate) fn bootstrap(cli: &Cli) -> Result<App> {
    let settings = Settings::load(cli.config.as_deref())?;
    App::bootstrap(settings)
}

impl ShardArgs {
    pub(crate) fn shard(&self) -> Result<MachineShard> {
        Ok(MachineShard::new(self.machine, self.of)?)
    }
}
