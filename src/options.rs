//! Ingestion settings and their YAML persistence.
//!
//! Every knob has a default, so an options file only lists what it changes:
//!
//! ```yaml
//! max-samples-per-column: 3
//! summary-detection: trailing-totals
//! evaluation: cached
//! ```

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::formula::EvaluationMode;

pub const DEFAULT_MAX_SAMPLES: usize = 5;

/// How the end of the data window is located.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SummaryDetection {
    /// Bound the window by rows that look like real records.
    #[default]
    ValidData,
    /// Drop up to two trailing rows that look like column totals.
    TrailingTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct IngestOptions {
    pub max_samples_per_column: usize,
    pub summary_detection: SummaryDetection,
    pub evaluation: EvaluationMode,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            max_samples_per_column: DEFAULT_MAX_SAMPLES,
            summary_detection: SummaryDetection::default(),
            evaluation: EvaluationMode::default(),
        }
    }
}

impl IngestOptions {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening options file {path:?}"))?;
        let options: IngestOptions = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing options YAML {path:?}"))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.max_samples_per_column > 0,
            "max-samples-per-column must be at least 1"
        );
        Ok(())
    }
}
