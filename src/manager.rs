use crate::config::Config;
use crate::engine::Engine;
use anyhow::{Context, Result};
use glob::glob;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Runs simulations inside a directory holding a `config.toml`.
pub struct Manager {
    sim_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(sim_dir: P) -> Result<Self> {
        let sim_dir = sim_dir.as_ref().to_path_buf();

        let cfg =
            Config::from_file(sim_dir.join("config.toml")).context("failed to construct cfg")?;
        log::debug!("{cfg:#?}");

        Ok(Self { sim_dir, cfg })
    }

    pub fn cfg(&self) -> &Config {
        &self.cfg
    }

    pub fn run_simulation(&self) -> Result<()> {
        let mut engine = Engine::new(self.cfg.clone()).context("failed to construct engine")?;

        let summary = engine
            .perform_simulation(&self.sim_dir)
            .context("failed to perform simulation")?;

        let file = self.summary_file();
        let string = toml::to_string_pretty(&summary).context("failed to serialize summary")?;
        fs::write(&file, string).with_context(|| format!("failed to write {file:?}"))?;
        log::info!("wrote {file:?}");

        Ok(())
    }

    pub fn clean_sim(&self) -> Result<()> {
        let mut outputs = self.output_files("*.csv").context("failed to glob csv files")?;
        let summary = self.summary_file();
        if summary.is_file() {
            outputs.push(summary);
        }
        for file in outputs {
            fs::remove_file(&file).with_context(|| format!("failed to remove {file:?}"))?;
            log::info!("removed {file:?}");
        }
        Ok(())
    }

    fn output_files(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let pattern = self.sim_dir.join(pattern);
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let files = glob(pattern)
            .context("failed to glob output files")?
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .collect();
        Ok(files)
    }

    fn summary_file(&self) -> PathBuf {
        self.sim_dir.join("summary.toml")
    }
}
