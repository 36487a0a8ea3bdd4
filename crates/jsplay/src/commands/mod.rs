pub mod check;
pub mod init;
pub mod run;
pub mod watch;

use anyhow::{Context, Result};
use camino::Utf8Path;

pub(crate) fn read_source(path: &Utf8Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed reading {path}"))
}
