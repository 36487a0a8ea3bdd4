use std::sync::Arc;

use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Parser;
use jsplay_config::Config;
use jsplay_engine::{ConsoleLine, NO_OUTPUT_NOTICE, NullSink, Playground, PlaygroundOptions, Trigger};
use log::info;

use crate::commands::read_source;
use crate::display::slot_table;
use crate::utils::styles::fmt_dimmed;

#[derive(Debug, Clone, Parser)]
pub struct RunCmd {
    /// JavaScript file to run
    pub file: Utf8PathBuf,

    /// Override `execution.timeout_ms`
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Print the execution result as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunCmd {
    pub(crate) async fn handle(&self, mut cfg: Config) -> Result<()> {
        if let Some(timeout_ms) = self.timeout_ms {
            cfg.execution.timeout_ms = timeout_ms;
            cfg.validate()?;
        }
        let source = read_source(&self.file)?;

        let playground = Playground::new(PlaygroundOptions::from(&cfg), Arc::new(NullSink));
        let result = playground.run(&source, Trigger::Manual).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else if result.output_slots.is_empty() {
            if result.success {
                info!("{}", fmt_dimmed(NO_OUTPUT_NOTICE));
            }
        } else {
            let lines = result
                .output_slots
                .iter()
                .map(ConsoleLine::from)
                .collect::<Vec<_>>();
            info!("{}", slot_table(&lines));
        }

        if let Some(error) = result.error {
            anyhow::bail!(error);
        }
        Ok(())
    }
}
