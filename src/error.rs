// 🚨 Import Errors - one taxonomy for the whole run
// Configuration and shape errors abort immediately; remote errors carry the
// response body so it can be shown before exiting.

use std::fmt;

// ============================================================================
// ERROR TYPE
// ============================================================================

#[derive(thiserror::Error, Debug)]
pub enum ImportError {
    // ------------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------------
    #[error("Column named '{0}' is not defined")]
    ColumnNotDefined(String),

    #[error("Operator '{0}' not defined")]
    UnknownOperator(String),

    #[error("malformed rule on field '{field}': {reason}")]
    MalformedRule { field: String, reason: String },

    #[error("cannot apply {operator} to {left} and {right} (field '{field}')")]
    Incomparable {
        field: String,
        operator: String,
        left: String,
        right: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ------------------------------------------------------------------------
    // Shape
    // ------------------------------------------------------------------------
    #[error("Number of fields in CSV on record {record} does not match manifest (expected {expected}, found {found})")]
    RecordLength {
        record: usize,
        expected: usize,
        found: usize,
    },

    // ------------------------------------------------------------------------
    // Source
    // ------------------------------------------------------------------------
    #[error("failed to read source: {0}")]
    Csv(#[from] csv::Error),

    // ------------------------------------------------------------------------
    // Remote
    // ------------------------------------------------------------------------
    #[error("{context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{context}: HTTP {status}")]
    Status {
        context: String,
        status: u16,
        body: String,
    },

    #[error("{context}: Unable to parse JSON output from API")]
    Decode { context: String, body: String },

    #[error("API ERROR: Instance '{0}' does not have mapped fields")]
    GroupingWithoutFields(String),
}

impl ImportError {
    pub fn transport(context: impl Into<String>, source: reqwest::Error) -> Self {
        ImportError::Transport {
            context: context.into(),
            source,
        }
    }

    /// Response body returned by the remote side, when there was one.
    pub fn response_body(&self) -> Option<&str> {
        match self {
            ImportError::Status { body, .. } | ImportError::Decode { body, .. } => {
                Some(body.as_str())
            }
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ImportError::ColumnNotDefined(_)
            | ImportError::UnknownOperator(_)
            | ImportError::MalformedRule { .. }
            | ImportError::Incomparable { .. }
            | ImportError::InvalidConfig(_) => ErrorKind::Configuration,
            ImportError::RecordLength { .. } => ErrorKind::Shape,
            ImportError::Csv(_) => ErrorKind::Source,
            ImportError::Transport { .. }
            | ImportError::Status { .. }
            | ImportError::Decode { .. }
            | ImportError::GroupingWithoutFields(_) => ErrorKind::Remote,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Shape,
    Source,
    Remote,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Shape => "shape",
            ErrorKind::Source => "source",
            ErrorKind::Remote => "remote",
        };
        f.write_str(name)
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;
