//! Connection configuration read from Java style .properties files.

pub mod zookeeper;

use crate::zookeeper::ConnectionError;
use enum_iterator::IntoEnumIterator;
use fs_err::File;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, BufReader};
use std::num;
use thiserror::Error;
use tracing::debug;

/// `ConfigError` is returned when properties are invalid, unknown, missing or the config file is
/// not readable.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Property error: {0}")]
    Property(#[from] java_properties::PropertiesError),
    #[error("ParseInt error: {0}")]
    ParseInt(#[from] num::ParseIntError),
    // Strings are parsed like every other type, that parse cannot fail.
    #[error("Infallible String Error {0:?}")]
    Infallible(#[from] std::convert::Infallible),
    #[error("Missing Key error: {0:?}")]
    MissingKey(String),
    #[error("Invalid Value: {0}")]
    InvalidValue(String),
    #[error("Unknown Key: {0}")]
    UnknownKey(String),
    #[error("Attempt to compare a value that is not provided and has no default: {0}")]
    ComparisonOnNone(String),
    #[error("Connection params: {0}")]
    Connection(#[from] ConnectionError),
}

/// This implementation is only for testing, for example any I/O error is considered equal
impl PartialEq for ConfigError {
    fn eq(&self, rhs: &Self) -> bool {
        match self {
            Self::Io(_) => matches!(rhs, Self::Io(_)),
            Self::Property(lhs) => {
                matches!(rhs, Self::Property(rhs) if lhs.line_number() == rhs.line_number())
            },
            Self::ParseInt(lhs) => matches!(rhs, Self::ParseInt(rhs) if lhs == rhs),
            Self::Infallible(lhs) => matches!(rhs, Self::Infallible(rhs) if lhs == rhs),
            Self::MissingKey(lhs) => matches!(rhs, Self::MissingKey(rhs) if lhs == rhs),
            Self::InvalidValue(lhs) => matches!(rhs, Self::InvalidValue(rhs) if lhs == rhs),
            Self::UnknownKey(lhs) => matches!(rhs, Self::UnknownKey(rhs) if lhs == rhs),
            Self::ComparisonOnNone(lhs) => matches!(rhs, Self::ComparisonOnNone(rhs) if lhs == rhs),
            Self::Connection(lhs) => {
                matches!(rhs, Self::Connection(rhs) if lhs.to_string() == rhs.to_string())
            },
        }
    }
}

/// A set of functions that a configuration set must implement: parsing, building, listing keys.
pub trait ConfigSet {
    type ConfigKey;
    type ConfigType;
    /// `try_set_property` transforms a string value from the config into our actual types
    fn try_set_property(
        &mut self,
        property_name: &str,
        property_value: &str,
    ) -> Result<(), ConfigError>;
    /// `resolve` turns the properties into a ConfigType.
    /// NOTE: This doesn't consume self, properties may be overridden and resolved again.
    fn resolve(&mut self) -> Result<Self::ConfigType, ConfigError>;
    /// `build` resolves and then validates the values against each other.
    fn build(&mut self) -> Result<Self::ConfigType, ConfigError> {
        let res = self.resolve()?;
        self.validate_values(&res)?;
        Ok(res)
    }
    /// `config_names` returns a list of config keys used
    fn config_names() -> Vec<String>
    where
        Self::ConfigKey: IntoEnumIterator + fmt::Display,
    {
        Self::ConfigKey::into_enum_iter().map(|val| val.to_string()).collect()
    }

    /// Transforms from a HashMap of configs into a ConfigSet.
    /// This may return ConfigError::UnknownKey errors
    fn from_properties_hashmap(input_config: HashMap<String, String>) -> Result<Self, ConfigError>
    where
        Self: Default,
    {
        let mut config_builder = Self::default();
        for (property, property_value) in &input_config {
            debug!("from_properties_hashmap: {} = {}", property, property_value);
            config_builder.try_set_property(property, property_value)?;
        }
        Ok(config_builder)
    }

    /// `read_config_file` reads a .properties file into a ConfigSet.
    fn read_config_file(filename: &str) -> Result<Self, ConfigError>
    where
        Self: Default,
    {
        debug!("read_config_file: Reading {}", filename);
        let mut config_file_content = File::open(filename)?;
        let input_config = java_properties::read(BufReader::new(&mut config_file_content))?;
        Self::from_properties_hashmap(input_config)
    }

    /// `validate_values` ensures values are compatible with others and within limits not provided
    /// by the per property validators.
    fn validate_values(&self, _cfg: &Self::ConfigType) -> Result<(), ConfigError> {
        Ok(())
    }
}
