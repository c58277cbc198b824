use casing_machine::Limits;
use serde::Deserialize;
use thiserror_no_std::Error;

use crate::{COLUMNS_CAPACITY, LINES_CAPACITY};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("could not parse settings: {0}")]
    Parse(String),
    #[error("{name} = {value} exceeds the capacity of {capacity}")]
    LimitExceedsCapacity {
        name: &'static str,
        value: usize,
        capacity: usize,
    },
}

/// Controller settings. Missing keys fall back to the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub max_lines_per_program: usize,
    pub max_columns_per_line: usize,
    pub max_nodes_per_controller: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_lines_per_program: 40,
            max_columns_per_line: 18,
            max_nodes_per_controller: 64,
        }
    }
}

impl Settings {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let settings: Settings =
            toml::from_str(source).map_err(|err| ConfigError::Parse(err.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check("max_lines_per_program", self.max_lines_per_program, LINES_CAPACITY)?;
        check("max_columns_per_line", self.max_columns_per_line, COLUMNS_CAPACITY)?;
        Ok(())
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_lines: self.max_lines_per_program,
            max_columns: self.max_columns_per_line,
        }
    }
}

fn check(name: &'static str, value: usize, capacity: usize) -> Result<(), ConfigError> {
    if value > capacity {
        return Err(ConfigError::LimitExceedsCapacity {
            name,
            value,
            capacity,
        });
    }
    Ok(())
}
