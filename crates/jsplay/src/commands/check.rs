use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Parser;
use jsplay_config::Config;
use jsplay_engine::cache::{fingerprint, normalize};
use jsplay_engine::classify::classify;
use jsplay_engine::{HeuristicSplitter, StatementSplitter};
use jsplay_executor::{SandboxConfig, SandboxExecutor};
use log::info;

use crate::commands::read_source;
use crate::display::statement_table;
use crate::utils::styles::{fmt_bold, fmt_error, fmt_success, fmt_yellow};

#[derive(Debug, Clone, Parser)]
pub struct CheckCmd {
    /// JavaScript file to analyse
    pub file: Utf8PathBuf,
}

impl CheckCmd {
    pub(crate) async fn handle(&self, cfg: Config) -> Result<()> {
        let source = read_source(&self.file)?;

        let statements = HeuristicSplitter.split(&source);
        if statements.is_empty() {
            info!("{} has no code", fmt_bold(self.file.as_str()));
            return Ok(());
        }
        info!("{}", statement_table(&statements));

        let categories = classify(&source);
        if categories.is_empty() {
            info!("{}", fmt_success("Deterministic, auto-run results can be cached"));
        } else {
            let names = categories.iter().map(ToString::to_string).collect::<Vec<_>>();
            info!(
                "{} Non-deterministic ({}), always re-executed",
                fmt_yellow("!"),
                names.join(", ")
            );
        }
        info!("{}: {}", fmt_bold("Fingerprint"), fingerprint(&normalize(&source)));

        let executor = SandboxExecutor::new(SandboxConfig::from(&cfg));
        match executor.check_syntax(&source).await? {
            None => info!("{}", fmt_success("Compiles")),
            Some(message) => {
                info!("{}", fmt_error(&format!("SyntaxError: {message}")));
                anyhow::bail!("{} does not compile", self.file);
            }
        }

        Ok(())
    }
}
