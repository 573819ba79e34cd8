use thiserror::Error;

pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("household record is missing required field `{field}`")]
    EmptyHousehold { field: &'static str },

    #[error("household field `{field}` is invalid: {reason}")]
    InvalidHousehold { field: &'static str, reason: String },

    #[error("parameter `{name}` is invalid: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl SimError {
    pub(crate) fn parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    pub(crate) fn household(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidHousehold {
            field,
            reason: reason.into(),
        }
    }
}
