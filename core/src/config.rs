//! Run configuration.
//!
//! Everything is optional; missing keys take the defaults below.
//!
//! ```toml
//! name = "letters"
//! work-dir = "/shared/letters"
//! memory-budget = 268435456   # bytes per rank
//! archive-format = "binary"
//! verbosity = 2
//! ```

use crate::bigmath::MemoryBudget;
use crate::distributed::Collective;
use crate::error::{Result, RlsError};
use crate::matrix::MatrixElem;
use crate::options::{ArchiveFormat, OptionsList};
use crate::tasks::BigContext;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_MEMORY_BUDGET: usize = 256 << 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RunConfig {
    /// Experiment name, also the stem of the archive file.
    pub name: String,
    /// Shared directory for archives and intermediate partitioned matrices.
    pub work_dir: PathBuf,
    /// Per-rank budget for block products, in bytes.
    pub memory_budget: usize,
    pub archive_format: ArchiveFormat,
    /// 0 warnings only, 1 stage progress, 2 block plans, 3 and up everything.
    pub verbosity: u8,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            name: "experiment".to_string(),
            work_dir: PathBuf::from("."),
            memory_budget: DEFAULT_MEMORY_BUDGET,
            archive_format: ArchiveFormat::default(),
            verbosity: 1,
        }
    }
}

impl RunConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| RlsError::Config(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| RlsError::io(path, e))?;
        Self::from_toml(&text)
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// The memory budget in elements of `T`.
    pub fn budget<T: MatrixElem>(&self) -> MemoryBudget {
        MemoryBudget::from_bytes::<T>(self.memory_budget)
    }

    /// The default option tree for this experiment.
    pub fn options(&self) -> Result<OptionsList> {
        let mut opt = OptionsList::with_defaults(self.name.as_str());
        opt.set(
            "savefile",
            format!("{}.{}", self.name, self.archive_format.extension()),
        )?;
        opt.set("tmpdir", self.work_dir.display().to_string())?;
        opt.set("verbose", f64::from(self.verbosity))?;
        Ok(opt)
    }

    /// Context for the partitioned tasks of one rank.
    pub fn context<'a, C: Collective>(&self, comm: &'a C) -> BigContext<'a, C> {
        BigContext::new(comm, self.budget::<f64>(), self.work_dir.clone())
    }

    /// `tracing` filter directive matching `verbosity`.
    pub fn log_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::SoloComm;

    #[test]
    fn test_defaults_from_empty() {
        let config = RunConfig::from_toml("").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.log_filter(), "info");
    }

    #[test]
    fn test_parse() {
        let config = RunConfig::from_toml(
            r#"
            name = "letters"
            work-dir = "/shared/letters"
            memory-budget = 800
            archive-format = "binary"
            verbosity = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.name, "letters");
        assert_eq!(config.archive_format, ArchiveFormat::Binary);
        assert_eq!(config.budget::<f64>().cells(), 100);
        assert_eq!(config.budget::<f32>().cells(), 200);
        assert_eq!(config.log_filter(), "debug");

        let opt = config.options().unwrap();
        assert_eq!(opt.get_string("savefile").unwrap(), "letters.bin");
        assert_eq!(opt.get_string("tmpdir").unwrap(), "/shared/letters");
        assert_eq!(opt.get_number("verbose").unwrap(), 2.0);

        let ctx = config.context(&SoloComm);
        assert_eq!(ctx.work_dir, PathBuf::from("/shared/letters"));
        assert_eq!(ctx.budget.cells(), 100);
    }

    #[test]
    fn test_rejects_unknown_format() {
        let err = RunConfig::from_toml("archive-format = \"xml\"").unwrap_err();
        assert!(matches!(err, RlsError::Config(_)));
    }
}
