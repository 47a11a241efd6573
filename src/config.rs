use std::collections::HashMap;
use std::str::FromStr;

use crate::error::PlanError;

pub const DEFAULT_PARALLELISM: &'static str = "parallelism.default";
pub const MAX_PARALLELISM: &'static str = "parallelism.max";
pub const BYTES_PER_INSTANCE: &'static str = "parallelism.bytes-per-instance";

/// string key/value properties as handed over by the embedding compiler
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct Properties {
    properties: HashMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Properties {
            properties: HashMap::new(),
        }
    }

    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.properties
    }

    pub fn set_str(&mut self, key: &str, value: &str) {
        self.properties.insert(key.to_string(), value.to_string());
    }

    pub fn set_u16(&mut self, key: &str, value: u16) {
        self.set_str(key, value.to_string().as_str());
    }

    pub fn get_u16(&self, key: &str) -> Result<u16, PlanError> {
        match self.properties.get(key) {
            Some(v) => {
                u16::from_str(v).map_err(|_e| PlanError::PropertyMalformed(key.to_string()))
            }
            None => Err(PlanError::PropertyNotFound(key.to_string())),
        }
    }

    pub fn set_u64(&mut self, key: &str, value: u64) {
        self.set_str(key, value.to_string().as_str());
    }

    pub fn get_u64(&self, key: &str) -> Result<u64, PlanError> {
        match self.properties.get(key) {
            Some(v) => {
                u64::from_str(v).map_err(|_e| PlanError::PropertyMalformed(key.to_string()))
            }
            None => Err(PlanError::PropertyNotFound(key.to_string())),
        }
    }
}

/// resolved planner configuration consumed by the stage resolver
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct PlannerConfig {
    /// parallelism of a stage with neither a fixed constraint nor statistics
    pub default_parallelism: u16,
    /// global ceiling for every resolved value
    pub max_parallelism: u16,
    /// target data volume per parallel instance, enables statistics sizing
    pub bytes_per_instance: Option<u64>,
}

impl PlannerConfig {
    pub fn new(default_parallelism: u16, max_parallelism: u16) -> Self {
        PlannerConfig {
            default_parallelism,
            max_parallelism,
            bytes_per_instance: None,
        }
    }

    pub fn with_bytes_per_instance(mut self, bytes_per_instance: u64) -> Self {
        self.bytes_per_instance = Some(bytes_per_instance);
        self
    }

    pub fn from_properties(properties: &Properties) -> Result<Self, PlanError> {
        let default_parallelism = properties.get_u16(DEFAULT_PARALLELISM)?;
        let max_parallelism = properties.get_u16(MAX_PARALLELISM)?;
        let bytes_per_instance = match properties.get_u64(BYTES_PER_INSTANCE) {
            Ok(n) => Some(n),
            Err(PlanError::PropertyNotFound(_)) => None,
            Err(e) => return Err(e),
        };

        Ok(PlannerConfig {
            default_parallelism,
            max_parallelism,
            bytes_per_instance,
        })
    }
}
