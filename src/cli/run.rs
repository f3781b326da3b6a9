//! Run command implementation

use crate::config::Config;
use crate::engine::WickEngine;
use clap::Args;

#[derive(Args, Debug)]
pub struct RunArgs {}

impl RunArgs {
    pub async fn execute(&self, config: Config) -> anyhow::Result<()> {
        let engine = WickEngine::new(config)?;
        engine.run().await
    }
}
