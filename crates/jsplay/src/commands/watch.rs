use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Parser;
use jsplay_config::Config;
use jsplay_engine::{ConsoleSink, Playground, PlaygroundOptions};
use log::{info, warn};

use crate::commands::read_source;
use crate::display::{TerminalSink, cache_stats_table, slot_table};
use crate::utils::styles::{fmt_bold, fmt_dimmed, fmt_kind};

/// Renders arriving within this window are printed once
const RENDER_COALESCE: Duration = Duration::from_millis(30);

#[derive(Debug, Clone, Parser)]
pub struct WatchCmd {
    /// JavaScript file to watch
    pub file: Utf8PathBuf,

    /// How often the file is checked for changes
    #[arg(long, default_value_t = 250)]
    pub poll_ms: u64,

    /// Execute on every change, ignoring cached results
    #[arg(long)]
    pub no_cache: bool,
}

impl WatchCmd {
    pub(crate) async fn handle(&self, cfg: Config) -> Result<()> {
        let sink = Arc::new(TerminalSink::default());
        let mut options = PlaygroundOptions::from(&cfg);
        options.auto_run = true;
        let debounce = options.debounce;
        let playground = Playground::new(options, Arc::clone(&sink) as Arc<dyn ConsoleSink>);
        if self.no_cache {
            playground.set_smart_mode(false);
        }

        info!(
            "Watching {} (auto-run after {}ms), Ctrl-C to stop",
            fmt_bold(self.file.as_str()),
            debounce.as_millis()
        );

        let mut last = read_source(&self.file)?;
        playground.notify_change(&last)?;

        let mut poll = tokio::time::interval(Duration::from_millis(self.poll_ms.max(10)));
        loop {
            tokio::select! {
                _ = poll.tick() => match tokio::fs::read_to_string(&self.file).await {
                    Ok(text) if text != last => {
                        last = text;
                        playground.notify_change(&last)?;
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Failed reading {}: {e}", self.file),
                },
                () = sink.changed() => {
                    tokio::time::sleep(RENDER_COALESCE).await;
                    self.print_update(&sink);
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        playground.enable_auto_run(false);
        playground.cancel();
        info!("");
        info!("{}", cache_stats_table(&playground.cache_stats()));
        Ok(())
    }

    fn print_update(&self, sink: &TerminalSink) {
        let (latest, notices) = sink.take();
        for (kind, message) in notices {
            info!("{}", fmt_kind(kind, &message));
        }
        if let Some(lines) = latest {
            info!("{}", fmt_dimmed(&format!("── {} ──", self.file)));
            if lines.is_empty() {
                info!("{}", fmt_dimmed("(no output)"));
            } else {
                info!("{}", slot_table(&lines));
            }
        }
    }
}
