use std::fmt;
use std::time::Duration;

/// Failures raised while driving the portal
///
/// Dictionary lookups never produce one of these: an unresolved term is an
/// `Option::None` plus a warning. A missing confirmation dialog is not an
/// error either.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No element matched the query
    #[error("No element found for {field} ({query})")]
    ElementNotFound { field: String, query: String },

    /// Waiting on an element or condition exceeded its budget
    #[error("Timed out after {}ms waiting for {what}", .after.as_millis())]
    Timeout { what: String, after: Duration },

    /// The element was found but the action on it failed
    #[error("Interaction with {field} failed: {message}")]
    Interaction { field: String, message: String },

    /// A row value could not be coerced into what the field expects
    #[error("Invalid value for {field}: {value:?}")]
    InvalidValue { field: String, value: String },

    /// Configuration is missing something the engine needs
    #[error("Configuration error: {0}")]
    Config(String),

    /// The WebDriver session itself failed
    #[error("WebDriver error: {0}")]
    WebDriver(String),
}

impl EngineError {
    pub fn interaction(field: impl Into<String>, message: impl fmt::Display) -> Self {
        EngineError::Interaction {
            field: field.into(),
            message: message.to_string(),
        }
    }

    pub fn not_found(field: impl Into<String>, query: impl fmt::Display) -> Self {
        EngineError::ElementNotFound {
            field: field.into(),
            query: query.to_string(),
        }
    }

    /// Attach the logical field name to an error raised below the dispatcher
    pub fn for_field(self, name: &str) -> Self {
        match self {
            EngineError::ElementNotFound { query, .. } => EngineError::ElementNotFound {
                field: name.to_string(),
                query,
            },
            EngineError::Interaction { message, .. } => EngineError::Interaction {
                field: name.to_string(),
                message,
            },
            EngineError::Timeout { what, after } => EngineError::Timeout {
                what: format!("{} ({})", name, what),
                after,
            },
            other => other,
        }
    }
}

/// CLI-level error that carries an exit code
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded or failed validation (exit code 2)
    Config(anyhow::Error),
    /// WebDriver connection failed (exit code 4)
    WebDriverFailed(String),
    /// Login or navigation failed (exit code 5)
    Login(String),
    /// Generic error (exit code 1)
    Other(anyhow::Error),
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 2,
            CliError::WebDriverFailed(_) => 4,
            CliError::Login(_) => 5,
            CliError::Other(_) => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(err) => write!(f, "Invalid configuration: {:#}", err),
            CliError::WebDriverFailed(msg) => write!(f, "WebDriver connection failed: {}", msg),
            CliError::Login(msg) => write!(f, "Login failed: {}", msg),
            CliError::Other(err) => write!(f, "{:#}", err),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(err) | CliError::Other(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        // Promote typed engine errors that bubbled up through anyhow
        if let Some(EngineError::WebDriver(msg)) = err.downcast_ref::<EngineError>() {
            return CliError::WebDriverFailed(msg.clone());
        }

        let msg = err.to_string();
        if msg.contains("Failed to connect to WebDriver") {
            CliError::WebDriverFailed(format!("{:#}", err))
        } else {
            CliError::Other(err)
        }
    }
}
