use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Parser;
use jsplay_config::Config;
use log::info;

use crate::utils::styles::{fmt_bold, fmt_dimmed, fmt_success};

#[derive(Debug, Clone, Parser)]
pub struct InitCmd {
    /// Overwrite an existing configuration file
    #[arg(long, short)]
    pub yes: bool,
}

impl InitCmd {
    pub(crate) fn handle(&self, path: &Utf8PathBuf) -> Result<Config> {
        if path.exists() && !self.yes {
            anyhow::bail!(
                "A jsplay config already exists at {}, pass --yes to overwrite it",
                fmt_dimmed(path.as_str())
            );
        }

        let cfg = Config::default().with_path(path);
        cfg.save()?;

        info!(
            "{}",
            fmt_success(&format!(
                "{name} configuration created: {path}",
                name = fmt_bold("jsplay"),
                path = fmt_dimmed(cfg.path().as_str()),
            ))
        );

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("jsplay.json")).unwrap();

        let cfg = InitCmd { yes: false }.handle(&path).unwrap();
        assert_eq!(cfg, Config::load(&path).unwrap());

        assert!(InitCmd { yes: false }.handle(&path).is_err());
        assert!(InitCmd { yes: true }.handle(&path).is_ok());
    }
}
