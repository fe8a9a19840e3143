//! This module controls workload configuration parsing from the end user.
//! Errors here are reported before any value is generated.
use std::{
    fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};

use rustc_hash::FxHashSet;
use serde::Deserialize;
use sluice_payload::Param;

/// Errors produced by [`Config`]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error for a serde [`serde_yaml`].
    #[error("Failed to deserialize yaml: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    /// Error reading config file
    #[error("Failed to read config file {path:?}: {source}")]
    ReadFile {
        /// File path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: Box<io::Error>,
    },
    /// Two steps share a name
    #[error("Duplicate step name found: {0}")]
    DuplicateStep(String),
    /// Two units of a step share a name
    #[error("Duplicate unit name '{unit}' in step '{step}'")]
    DuplicateUnit {
        /// Step name
        step: String,
        /// Unit name
        unit: String,
    },
    /// Two params of a unit share a name
    #[error("Duplicate param name '{param}' in unit '{unit}'")]
    DuplicateParam {
        /// Unit name
        unit: String,
        /// Param name
        param: String,
    },
    /// A step has no units
    #[error("Step '{0}' has no units")]
    EmptyStep(String),
    /// A unit has neither params nor groups
    #[error("Unit '{unit}' in step '{step}' has no params")]
    EmptyUnit {
        /// Step name
        step: String,
        /// Unit name
        unit: String,
    },
}

fn default_one() -> isize {
    1
}

fn default_buffer_size() -> isize {
    -1
}

/// Main configuration struct for a workload
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The seed every generator of the workload derives from
    #[serde(default)]
    pub seed: u64,
    /// The steps of the workload, run one at a time
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub steps: Vec<Step>,
}

/// A workload step, the units it mixes and how many run at once
#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Step {
    /// Name of the step
    pub name: String,
    /// Bound on concurrent unit generation, zero or less runs every worker
    /// of every unit at once
    #[serde(default)]
    pub workers_limit: isize,
    /// Capacity of the transaction buffer, negative follows the resolved
    /// workers limit
    #[serde(default = "default_buffer_size")]
    pub buffer_size: isize,
    /// Units of the step
    pub units: Vec<Unit>,
}

/// A unit of work, generated as one transaction
#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Unit {
    /// Name of the unit
    pub name: String,
    /// Concurrent workers per scheduling cycle
    #[serde(default = "default_one")]
    pub workers: isize,
    /// Transactions each worker generates per scheduling cycle
    #[serde(default = "default_one")]
    pub count: isize,
    /// Independently generated params
    #[serde(default)]
    pub params: Vec<Param>,
    /// Params generated together as the cartesian product of their values
    #[serde(default)]
    pub groups: Vec<Group>,
}

/// A set of params enumerated together
#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Group {
    /// Name of the group
    pub name: String,
    /// Params of the group, the last one varies fastest
    pub params: Vec<Param>,
}

impl Unit {
    /// Names of every param of the unit, grouped or not, in generation order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name.as_str()).chain(
            self.groups
                .iter()
                .flat_map(|g| g.params.iter().map(|p| p.name.as_str())),
        )
    }
}

impl Config {
    /// Load and validate the configuration at `path`.
    ///
    /// # Errors
    ///
    /// Function will error if the file cannot be read, is not valid YAML or
    /// fails validation.
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path).map_err(|source| Error::ReadFile {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
        contents.parse()
    }

    /// Look up a step by name.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    fn validate(&self) -> Result<(), Error> {
        let mut steps = FxHashSet::default();
        for step in &self.steps {
            if !steps.insert(step.name.as_str()) {
                return Err(Error::DuplicateStep(step.name.clone()));
            }
            if step.units.is_empty() {
                return Err(Error::EmptyStep(step.name.clone()));
            }
            let mut units = FxHashSet::default();
            for unit in &step.units {
                if !units.insert(unit.name.as_str()) {
                    return Err(Error::DuplicateUnit {
                        step: step.name.clone(),
                        unit: unit.name.clone(),
                    });
                }
                let mut params = FxHashSet::default();
                for param in unit.param_names() {
                    if !params.insert(param) {
                        return Err(Error::DuplicateParam {
                            unit: unit.name.clone(),
                            param: param.to_string(),
                        });
                    }
                }
                if params.is_empty() {
                    return Err(Error::EmptyUnit {
                        step: step.name.clone(),
                        unit: unit.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(contents: &str) -> Result<Self, Self::Err> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }
}
