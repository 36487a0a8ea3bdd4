pub mod commands;
pub mod display;
pub mod utils;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

use crate::commands::{check::CheckCmd, init::InitCmd, run::RunCmd, watch::WatchCmd};
use jsplay_config::Config;

#[derive(Parser)]
#[command(name = "jsplay")]
#[command(version)]
#[command(about = "jsplay - JavaScript playground")]
#[command(
    long_about = "jsplay runs JavaScript snippets in a sandboxed V8 isolate and shows each \
statement's output next to its line, re-running automatically when the file changes."
)]
#[command(after_help = "EXAMPLES:\n  \
    jsplay init\n  \
    jsplay run snippet.js\n  \
    jsplay watch snippet.js\n  \
    jsplay check snippet.js\n\
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path, defaults to ./jsplay.json
    #[arg(long, short = 'c', global = true, default_value_t = Config::default_path())]
    pub config: Utf8PathBuf,

    /// No logging except for errors
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Verbose logging (-v) or trace logging (-vv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl Cli {
    #[allow(clippy::missing_errors_doc)]
    pub async fn handle(&self) -> anyhow::Result<()> {
        match &self.command {
            Commands::Init(cmd) => {
                cmd.handle(&self.config)?;
            }
            Commands::Run(cmd) => cmd.handle(Config::load_or_default(&self.config)?).await?,
            Commands::Watch(cmd) => cmd.handle(Config::load_or_default(&self.config)?).await?,
            Commands::Check(cmd) => cmd.handle(Config::load_or_default(&self.config)?).await?,
        }

        Ok(())
    }
}

#[derive(Debug, Subcommand)]
#[command(styles=utils::styles::get_styles())]
pub enum Commands {
    /// Run a snippet once
    #[command(long_about = "Run a JavaScript file once and print the output of each statement.")]
    Run(RunCmd),

    /// Re-run a snippet whenever it changes
    #[command(
        long_about = "Watch a JavaScript file and auto-run it after edits, reusing cached output \
when the code has not meaningfully changed."
    )]
    Watch(WatchCmd),

    /// Analyse a snippet without running it
    #[command(
        long_about = "Show how a file is split into statements, which constructs make it \
non-deterministic, and whether it compiles."
    )]
    Check(CheckCmd),

    /// Initialize configuration file
    #[command(long_about = "Initialize jsplay.json configuration file.")]
    Init(InitCmd),
}
