use anstyle::{AnsiColor, Color, Style};
use clap::builder::Styles;
use jsplay_runtime::OutputKind;

use crate::utils::{CHECK, MARK};

pub fn get_styles() -> Styles {
    Styles::styled()
        .usage(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Yellow))),
        )
        .header(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Yellow))),
        )
        .literal(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green))))
        .invalid(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .error(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .valid(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Green))),
        )
        .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::White))))
}

fn fmt_style(msg: &str, style: &Style) -> String {
    format!("{style}{msg}{style:#}")
}

fn fg(color: AnsiColor) -> Style {
    Style::new().fg_color(Some(Color::Ansi(color)))
}

pub(crate) fn fmt_green(msg: &str) -> String {
    fmt_style(msg, &fg(AnsiColor::Green))
}

pub(crate) fn fmt_cyan(msg: &str) -> String {
    fmt_style(msg, &fg(AnsiColor::BrightCyan))
}

pub(crate) fn fmt_red(msg: &str) -> String {
    fmt_style(msg, &fg(AnsiColor::Red))
}

pub(crate) fn fmt_yellow(msg: &str) -> String {
    fmt_style(msg, &fg(AnsiColor::Yellow))
}

pub(crate) fn fmt_bold(msg: &str) -> String {
    fmt_style(msg, &Style::new().bold())
}

pub(crate) fn fmt_dimmed(msg: &str) -> String {
    fmt_style(msg, &Style::new().dimmed())
}

pub(crate) fn fmt_success(msg: &str) -> String {
    format!("{} {msg}", fmt_green(CHECK))
}

pub(crate) fn fmt_error(msg: &str) -> String {
    format!("{} {msg}", fmt_red(MARK))
}

/// Colours console output by kind, the way a browser console would
pub(crate) fn fmt_kind(kind: OutputKind, msg: &str) -> String {
    match kind {
        OutputKind::Log => msg.to_string(),
        OutputKind::Info => fmt_cyan(msg),
        OutputKind::Warn => fmt_yellow(msg),
        OutputKind::Error => fmt_red(msg),
    }
}
