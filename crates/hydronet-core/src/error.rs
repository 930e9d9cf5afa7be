//! Error types for hydronet-core.

use thiserror::Error;

use crate::connections::Role;
use crate::model::ModelError;

/// Coarse classification of [`Error`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed device name, keyword or mode string.
    Validation,
    /// Role exclusivity, variable redefinition or duplicate name.
    Conflict,
    /// Missing device, slave, keyword or model.
    NotFound,
    /// Operation that would break the one-device-per-name rule.
    Unsupported,
    /// Failure reported by a model while wiring or preparing series.
    Model,
    /// Series persistence failure.
    Io,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid {kind} name `{name}`: not a valid identifier")]
    InvalidName { kind: &'static str, name: String },

    #[error("invalid keyword `{keyword}` for device `{device}`: not a valid identifier")]
    InvalidKeyword { keyword: String, device: String },

    #[error("invalid deploy mode `{0}`: expected `newsim`, `obs` or `oldsim`")]
    InvalidDeployMode(String),

    #[error(
        "element `{element}`: node `{node}` cannot be {} because it is already {}",
        .role.noun(),
        .opposite.noun()
    )]
    RoleConflict {
        element: String,
        node: String,
        role: Role,
        opposite: Role,
    },

    #[error("node `{node}` handles variable `{current}` and cannot be redefined to handle `{requested}`")]
    VariableConflict {
        node: String,
        current: String,
        requested: String,
    },

    #[error("cannot rename {kind} `{from}` to `{to}`: another {kind} is registered under that name")]
    NameConflict {
        kind: &'static str,
        from: String,
        to: String,
    },

    #[error("{container} object does not handle a {content} named `{name}`")]
    DeviceNotFound {
        container: &'static str,
        content: &'static str,
        name: String,
    },

    #[error("{container} object handles no {content} with name or keyword `{name}`")]
    SelectionNotFound {
        container: &'static str,
        content: &'static str,
        name: String,
    },

    #[error("{role} of `{owner}` do not handle a device named `{name}`")]
    SlaveNotFound {
        owner: String,
        role: Role,
        name: String,
    },

    #[error("no model has been assigned to element `{0}`")]
    ModelNotFound(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("step {index} is out of range for a series of {len} steps")]
    StepOutOfRange { index: usize, len: usize },

    #[error("model of element `{element}` failed: {source}")]
    Model {
        element: String,
        #[source]
        source: ModelError,
    },

    #[error("series I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidName { .. }
            | Error::InvalidKeyword { .. }
            | Error::InvalidDeployMode(_)
            | Error::StepOutOfRange { .. } => ErrorKind::Validation,
            Error::RoleConflict { .. }
            | Error::VariableConflict { .. }
            | Error::NameConflict { .. } => ErrorKind::Conflict,
            Error::DeviceNotFound { .. }
            | Error::SelectionNotFound { .. }
            | Error::SlaveNotFound { .. }
            | Error::ModelNotFound(_) => ErrorKind::NotFound,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::Model { .. } => ErrorKind::Model,
            Error::Io(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
