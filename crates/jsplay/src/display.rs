//! Terminal rendering of the console model.

use std::sync::{Mutex, PoisonError};

use jsplay_engine::{CacheStats, ConsoleLine, ConsoleSink, SourceStatement};
use jsplay_runtime::OutputKind;
use tabled::settings::{Style, Width};
use tabled::{Table, Tabled};
use tokio::sync::Notify;

use crate::utils::styles::{fmt_dimmed, fmt_kind};

#[derive(Tabled)]
struct SlotRow {
    #[tabled(rename = "line")]
    line: u32,
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "output")]
    output: String,
}

#[derive(Tabled)]
struct StatementRow {
    #[tabled(rename = "lines")]
    lines: String,
    #[tabled(rename = "hash")]
    hash: String,
    #[tabled(rename = "output")]
    output: String,
    #[tabled(rename = "declares")]
    declares: String,
}

#[derive(Tabled)]
struct StatRow {
    #[tabled(rename = "cache")]
    name: &'static str,
    #[tabled(rename = "")]
    value: String,
}

fn finish(mut table: Table) -> String {
    table.with(Style::rounded());
    if let Some((terminal_size::Width(width), _)) = terminal_size::terminal_size() {
        table.with(Width::wrap(usize::from(width)));
    }
    table.to_string()
}

pub fn slot_table(lines: &[ConsoleLine]) -> String {
    let rows = lines.iter().map(|line| SlotRow {
        line: line.line,
        kind: fmt_kind(line.kind, line.kind.as_str()),
        output: fmt_kind(line.kind, &line.content.to_text()),
    });
    finish(Table::new(rows))
}

pub fn statement_table(statements: &[SourceStatement]) -> String {
    let rows = statements.iter().map(|statement| StatementRow {
        lines: if statement.start_line == statement.end_line {
            statement.start_line.to_string()
        } else {
            format!("{}-{}", statement.start_line, statement.end_line)
        },
        hash: format!("{:08x}", statement.content_hash),
        output: if statement.produces_output { "yes".into() } else { fmt_dimmed("no") },
        declares: statement.declared.join(", "),
    });
    finish(Table::new(rows))
}

pub fn cache_stats_table(stats: &CacheStats) -> String {
    let row = |name: &'static str, value: String| StatRow { name, value };
    let rows = [
        row("entries", stats.entry_count.to_string()),
        row("recent (60s)", stats.recent_count.to_string()),
        row("oldest", format!("{}ms", stats.oldest_age_ms)),
        row("smart mode", if stats.smart_mode { "on".into() } else { "off".into() }),
    ];
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    table.to_string()
}

/// Sink for long-running sessions.
///
/// Keeps only the newest console model; the printing side waits on
/// [`TerminalSink::changed`], so a burst of renders is printed once.
#[derive(Default)]
pub struct TerminalSink {
    latest: Mutex<Option<Vec<ConsoleLine>>>,
    notices: Mutex<Vec<(OutputKind, String)>>,
    changed: Notify,
}

impl TerminalSink {
    pub async fn changed(&self) {
        self.changed.notified().await;
    }

    /// Takes what arrived since the last call
    pub fn take(&self) -> (Option<Vec<ConsoleLine>>, Vec<(OutputKind, String)>) {
        let latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner).take();
        let notices = std::mem::take(&mut *self.notices.lock().unwrap_or_else(PoisonError::into_inner));
        (latest, notices)
    }
}

impl ConsoleSink for TerminalSink {
    fn render(&self, lines: &[ConsoleLine]) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(lines.to_vec());
        self.changed.notify_one();
    }

    fn notice(&self, kind: OutputKind, message: &str) {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((kind, message.to_string()));
        self.changed.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsplay_engine::{HeuristicSplitter, SlotKey, StatementSplitter};
    use jsplay_runtime::RenderedContent;

    fn line(n: u32, kind: OutputKind, text: &str) -> ConsoleLine {
        ConsoleLine {
            slot_key: SlotKey { hash: n, occurrence: 0 },
            line: n,
            kind,
            content: RenderedContent::Text(text.into()),
            timestamp: "12:00:00".into(),
        }
    }

    #[test]
    fn test_slot_table_lists_lines() {
        let table = slot_table(&[
            line(1, OutputKind::Log, "hello"),
            line(4, OutputKind::Error, "TypeError: boom"),
        ]);
        assert!(table.contains("hello"));
        assert!(table.contains("TypeError: boom"));
        assert!(table.contains("output"));
    }

    #[test]
    fn test_statement_table() {
        let statements = HeuristicSplitter.split("const a = 1;\nif (a) {\n  console.log(a);\n}");
        let table = statement_table(&statements);
        assert!(table.contains("2-4"));
        assert!(table.contains(&format!("{:08x}", statements[0].content_hash)));
    }

    #[test]
    fn test_terminal_sink_keeps_latest() {
        let sink = TerminalSink::default();
        sink.render(&[line(1, OutputKind::Log, "first")]);
        sink.render(&[line(1, OutputKind::Log, "second")]);
        sink.notice(OutputKind::Info, "cached");

        let (latest, notices) = sink.take();
        let latest = latest.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].content.to_text(), "second");
        assert_eq!(notices, vec![(OutputKind::Info, "cached".to_string())]);
        assert!(sink.take().0.is_none());
    }
}
