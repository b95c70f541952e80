//! JSON artifact holding the temperature models of one run.
//!
//! Named `temperature_model_<location>_<date_start>_<date_stop>.json`. Undefined
//! coefficients are written as `null`.
use std::collections::BTreeMap;
use std::io::{Read, Write};

use camino::{Utf8Path, Utf8PathBuf};
use hifitime::Epoch;
use serde::{Deserialize, Serialize};

use crate::constants::{OpticalModuleId, MODEL_DESCRIPTION, MODEL_METHOD, MODEL_PREFIX};
use crate::overlap_errors::OverlapError;
use crate::temperature_model::TemperatureModel;
use crate::time::{format_iso, CalendarDate};

/// A module for which no model could be built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleFailure {
    pub optical_module_id: OpticalModuleId,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// ISO 8601 UTC creation time
    pub created: String,
    pub method: String,
    pub description: String,
    pub date_start: CalendarDate,
    pub date_stop: CalendarDate,
    pub models: Vec<TemperatureModel>,
    pub failures: Vec<ModuleFailure>,
}

impl ModelArtifact {
    /// Gather the outcome of every module into one artifact.
    pub fn new(
        created: Epoch,
        date_start: CalendarDate,
        date_stop: CalendarDate,
        outcomes: BTreeMap<OpticalModuleId, Result<TemperatureModel, OverlapError>>,
    ) -> Self {
        let mut models = Vec::new();
        let mut failures = Vec::new();
        for (module, outcome) in outcomes {
            match outcome {
                Ok(model) => models.push(model),
                Err(e) => failures.push(ModuleFailure {
                    optical_module_id: module,
                    error: e.to_string(),
                }),
            }
        }
        ModelArtifact {
            created: format_iso(created),
            method: MODEL_METHOD.to_string(),
            description: MODEL_DESCRIPTION.to_string(),
            date_start,
            date_stop,
            models,
            failures,
        }
    }

    /// Site of the modelled instrument, `unknown` without any model.
    pub fn location(&self) -> String {
        self.models
            .first()
            .map(|m| m.meta.location())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn file_name(&self) -> String {
        format!(
            "{MODEL_PREFIX}_{}_{}_{}.json",
            self.location(),
            self.date_start,
            self.date_stop
        )
    }

    pub fn write<W: Write>(&self, writer: W) -> Result<(), OverlapError> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Write the artifact into `output`, creating the directory if needed.
    pub fn write_to_dir(&self, output: &Utf8Path) -> Result<Utf8PathBuf, OverlapError> {
        std::fs::create_dir_all(output)?;
        let path = output.join(self.file_name());
        let file = std::fs::File::create(&path)?;
        self.write(std::io::BufWriter::new(file))?;
        Ok(path)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, OverlapError> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn read_file(path: &Utf8Path) -> Result<Self, OverlapError> {
        Self::from_reader(std::io::BufReader::new(std::fs::File::open(path)?))
    }
}
