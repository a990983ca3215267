//! Definition of a single configuration property: its key, documentation, default and validation.
use crate::config::ConfigError;
use std::fmt;
use std::str::FromStr;
use tracing::error;

/// `ConfigDefImportance` provides the levels of importance that different properties have.
#[derive(Debug, PartialEq, Clone)]
pub enum ConfigDefImportance {
    High,
    Medium,
    Low,
}

impl fmt::Display for ConfigDefImportance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// `ConfigDef` defines a configuration property, its default and how it is validated.
pub struct ConfigDef<T> {
    /// The configuration key that is used to apply this value
    key: String,
    /// How important the configuration definition is
    importance: ConfigDefImportance,
    /// `default` of the value
    default: Option<T>,
    /// The documentation of the field, used for showing errors
    doc: &'static str,
    /// Whether or not this variable was provided by the configuration file.
    provided: bool,
    /// The current value, be it the default or overwritten by config
    value: Option<T>,
    /// A validator to ensure the new field value is correct
    validator: Option<Box<dyn Fn(Option<&T>) -> Result<(), ConfigError>>>,
}

impl<T> fmt::Debug for ConfigDef<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigDef")
            .field("key", &self.key)
            .field("importance", &self.importance)
            .field("default", &self.default)
            .field("doc", &self.doc)
            .field("provided", &self.provided)
            .field("value", &self.value)
            .field("validator_exists", &self.validator.is_some())
            .finish()
    }
}

impl<T> Default for ConfigDef<T> {
    fn default() -> Self {
        Self {
            importance: ConfigDefImportance::Low,
            doc: "",
            key: String::from("unset.key"),
            default: None,
            provided: false,
            value: None,
            validator: None,
        }
    }
}

impl<T> ConfigDef<T>
where
    T: FromStr,
    ConfigError: From<<T as FromStr>::Err>,
    <T as FromStr>::Err: std::fmt::Display,
    T: std::fmt::Debug,
{
    /// Sets the `key` value, this comes from const &str values in the calling modules
    pub fn with_key(mut self, key: &str) -> Self {
        self.key = key.to_string();
        self
    }

    /// Sets the documentation field for the current ConfigDef
    pub fn with_doc(mut self, doc: &'static str) -> Self {
        self.doc = doc;
        self
    }

    pub fn with_importance(mut self, importance: ConfigDefImportance) -> Self {
        self.importance = importance;
        self
    }

    /// Sets the default value
    pub fn with_default(mut self, default: T) -> Self
    where
        T: Clone,
    {
        self.value = Some(default.clone());
        self.default = Some(default);
        self
    }

    pub fn with_validator(
        mut self,
        validator: Box<dyn Fn(Option<&T>) -> Result<(), ConfigError>>,
    ) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn set_value(&mut self, value: T) {
        self.value = Some(value);
        self.provided = true;
    }

    pub fn try_set_parsed_value(&mut self, value: &str) -> Result<(), ConfigError> {
        match value.parse::<_>() {
            Ok(val) => {
                self.set_value(val);
                Ok(())
            },
            Err(err) => {
                error!("Unable to parse property {} = {:?}: {}. Doc: {}", self.key, value, err, self.doc);
                Err(ConfigError::from(err))
            },
        }
    }

    pub fn at_least(data: Option<&T>, rhs: &T, key: &str) -> Result<(), ConfigError>
    where
        T: PartialEq + PartialOrd + fmt::Display,
    {
        match data {
            Some(val) => {
                if val < rhs {
                    Err(ConfigError::InvalidValue(format!(
                        "{}: '{}' should be at least {}",
                        key, val, rhs
                    )))
                } else {
                    Ok(())
                }
            },
            None => {
                error!("Running at_least() with no value provided for {}", key);
                Err(ConfigError::ComparisonOnNone(key.to_string()))
            },
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn doc(&self) -> &'static str {
        self.doc
    }

    pub fn get_value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn get_importance(&self) -> &ConfigDefImportance {
        &self.importance
    }

    pub fn is_provided(&self) -> bool {
        self.provided
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.validator {
            Some(validator) => (validator)(self.value.as_ref()),
            None => Ok(()),
        }
    }

    /// build() does not consume self, a property read from a .properties file may later be
    /// overridden (for example from the command line) and built again.
    pub fn build(&mut self) -> Result<T, ConfigError>
    where
        T: Clone,
    {
        self.validate()?;
        match &self.value {
            Some(value) => Ok(value.clone()),
            None => Err(ConfigError::MissingKey(self.key.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn it_builds_defaults_and_overrides() {
        let mut def: ConfigDef<u32> = ConfigDef::default()
            .with_key("some.timeout.ms")
            .with_importance(ConfigDefImportance::High)
            .with_doc("Some timeout")
            .with_default(10)
            .with_validator(Box::new(|data| ConfigDef::at_least(data, &1, "some.timeout.ms")));
        assert_eq!(def.build().unwrap(), 10);
        assert!(!def.is_provided());
        def.try_set_parsed_value("25").unwrap();
        assert!(def.is_provided());
        assert_eq!(def.get_value(), Some(&25));
        assert_eq!(def.build().unwrap(), 25);
        def.try_set_parsed_value("0").unwrap();
        assert_eq!(
            def.build().unwrap_err(),
            ConfigError::InvalidValue(String::from("some.timeout.ms: '0' should be at least 1"))
        );
        assert!(matches!(def.try_set_parsed_value("ten"), Err(ConfigError::ParseInt(_))));
    }

    #[test_log::test]
    fn it_requires_values_without_default() {
        let mut def: ConfigDef<String> = ConfigDef::default().with_key("required.key");
        assert_eq!(def.build().unwrap_err(), ConfigError::MissingKey(String::from("required.key")));
        def.set_value(String::from("value"));
        assert_eq!(def.build().unwrap(), "value");
        assert_eq!(def.get_importance(), &ConfigDefImportance::Low);
    }
}
