use std::fmt;

/// Result type for pallas operations
pub type Result<T> = std::result::Result<T, PallasError>;

/// Outcome failures of a single `act` call.
///
/// Callers decide per kind whether to retry or abort; see
/// [`RetryPolicy`](crate::agent::RetryPolicy).
#[derive(Debug, Clone, PartialEq)]
pub enum ActionError {
    /// The environment rejected an action outside its available set
    NotAvailable { action: usize },

    /// The environment is already in a terminal state
    EnvironmentTerminal,

    /// The estimator produced non-finite values or loss
    EstimatorDivergence(String),
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionError::NotAvailable { action } => {
                write!(f, "action {} is not available in the current state", action)
            }
            ActionError::EnvironmentTerminal => write!(f, "environment is in a terminal state"),
            ActionError::EstimatorDivergence(msg) => write!(f, "estimator diverged: {}", msg),
        }
    }
}

impl std::error::Error for ActionError {}

/// Main error type for the pallas library
#[derive(Debug, Clone, PartialEq)]
pub enum PallasError {
    /// Feature or output width does not match the estimator
    DimensionMismatch {
        expected: String,
        actual: String,
    },

    /// Parameter value out of range
    InvalidParameter {
        name: String,
        reason: String,
    },

    /// Key not recognised by the component parsing it
    UnknownParameter {
        component: String,
        key: String,
    },

    /// Value could not be parsed to the declared type
    ParseError {
        key: String,
        value: String,
        expected: String,
    },

    /// Lifecycle call made in the wrong phase
    Protocol {
        component: String,
        message: String,
    },

    /// Action outcome failure
    Action(ActionError),

    /// Numerical computation errors
    NumericalError(String),

    /// Empty buffer or container
    EmptyBuffer(String),

    /// IO errors (file operations)
    IoError(String),

    /// Serialization/deserialization errors
    SerializationError(String),

    /// Training error
    TrainingError(String),
}

impl fmt::Display for PallasError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PallasError::DimensionMismatch { expected, actual } => {
                write!(f, "Dimension mismatch: expected {}, got {}", expected, actual)
            }
            PallasError::InvalidParameter { name, reason } => {
                write!(f, "Invalid parameter '{}': {}", name, reason)
            }
            PallasError::UnknownParameter { component, key } => {
                write!(f, "Unknown parameter '{}' for {}", key, component)
            }
            PallasError::ParseError { key, value, expected } => {
                write!(f, "Cannot parse '{}' = '{}' as {}", key, value, expected)
            }
            PallasError::Protocol { component, message } => {
                write!(f, "Protocol violation in {}: {}", component, message)
            }
            PallasError::Action(err) => write!(f, "Action error: {}", err),
            PallasError::NumericalError(msg) => write!(f, "Numerical error: {}", msg),
            PallasError::EmptyBuffer(msg) => write!(f, "Empty buffer: {}", msg),
            PallasError::IoError(msg) => write!(f, "IO error: {}", msg),
            PallasError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            PallasError::TrainingError(msg) => write!(f, "Training error: {}", msg),
        }
    }
}

impl std::error::Error for PallasError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PallasError::Action(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ActionError> for PallasError {
    fn from(err: ActionError) -> Self {
        PallasError::Action(err)
    }
}

impl From<std::io::Error> for PallasError {
    fn from(err: std::io::Error) -> Self {
        PallasError::IoError(err.to_string())
    }
}

impl From<bincode::Error> for PallasError {
    fn from(err: bincode::Error) -> Self {
        PallasError::SerializationError(err.to_string())
    }
}

impl From<serde_json::Error> for PallasError {
    fn from(err: serde_json::Error) -> Self {
        PallasError::SerializationError(err.to_string())
    }
}

impl PallasError {
    pub fn dimension_mismatch<S: Into<String>>(expected: S, actual: S) -> Self {
        PallasError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_parameter<S: Into<String>>(name: S, reason: S) -> Self {
        PallasError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn protocol<S: Into<String>>(component: S, message: S) -> Self {
        PallasError::Protocol {
            component: component.into(),
            message: message.into(),
        }
    }

    /// The action error carried by this error, if any.
    pub fn action_error(&self) -> Option<&ActionError> {
        match self {
            PallasError::Action(err) => Some(err),
            _ => None,
        }
    }
}
