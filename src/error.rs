//! Error handling for the configuration builder
//!
//! Every failure the builder can report reflects an invalid configuration. Failures
//! carry an [`ErrorKind`] from a closed taxonomy, the qualified name of the offending
//! function, data source, signal or state, and a human readable message. Stages wrap
//! their failures with the stage name as context.

use crate::store::StoreError;
use std::fmt;
use thiserror::Error;

/// Closed taxonomy of configuration failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A function, data source, signal, type or state reference was not found
    UnresolvedName,
    /// A short name matched more than one candidate
    AmbiguousName,
    /// Two references disagree on the signal type
    TypeMismatch,
    /// Two references disagree on (or declare an invalid) number of dimensions
    DimensionMismatch,
    /// Two references disagree on (or declare an invalid) number of elements
    ElementCountMismatch,
    /// Default values disagree or do not fit the resolved signal
    DefaultValueMismatch,
    /// More than one function writes the same signal in the same state
    DuplicateWriter,
    /// A function appears twice in the same state
    DuplicateFunctionInState,
    /// More than one synchronising signal in a single thread
    MultipleSyncSignalsInThread,
    /// A declared range is inverted or exceeds the signal
    RangeOutOfBounds,
    /// Two writers declare intersecting ranges
    RangeOverlap,
    /// A scalar `Default` was given for a structured signal
    AmbiguousStructDefault,
    /// A flat signal was bound to a structured one (or the reverse)
    LeafMappedOnNode,
    /// A required attribute is absent
    MissingRequiredAttribute,
    /// An attribute has an unusable value or is not allowed where it appears
    InvalidAttribute,
    /// Two signals flatten to the same qualified name
    DuplicateName,
    /// The data source offers no broker for a signal
    NoCompatibleBroker,
    /// A buffer size does not fit the offset table
    SizeOverflow,
    /// A stage was run before its predecessor completed
    StageOrder,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorKind::UnresolvedName => "unresolved name",
            ErrorKind::AmbiguousName => "ambiguous name",
            ErrorKind::TypeMismatch => "type mismatch",
            ErrorKind::DimensionMismatch => "dimension mismatch",
            ErrorKind::ElementCountMismatch => "element count mismatch",
            ErrorKind::DefaultValueMismatch => "default value mismatch",
            ErrorKind::DuplicateWriter => "duplicate writer",
            ErrorKind::DuplicateFunctionInState => "duplicate function in state",
            ErrorKind::MultipleSyncSignalsInThread => "multiple sync signals in thread",
            ErrorKind::RangeOutOfBounds => "range out of bounds",
            ErrorKind::RangeOverlap => "range overlap",
            ErrorKind::AmbiguousStructDefault => "ambiguous struct default",
            ErrorKind::LeafMappedOnNode => "leaf mapped on node",
            ErrorKind::MissingRequiredAttribute => "missing required attribute",
            ErrorKind::InvalidAttribute => "invalid attribute",
            ErrorKind::DuplicateName => "duplicate name",
            ErrorKind::NoCompatibleBroker => "no compatible broker",
            ErrorKind::SizeOverflow => "size overflow",
            ErrorKind::StageOrder => "stage order",
        };
        f.write_str(text)
    }
}

/// Main error type for builder operations
#[derive(Error, Debug)]
pub enum BuildError {
    /// A configuration failure detected by one of the build stages
    #[error("{kind} at '{name}': {message}")]
    Resolution {
        kind: ErrorKind,
        name: String,
        message: String,
    },

    /// Errors raised by the hierarchical store
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Errors related to application file loading
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<BuildError>,
    },
}

impl BuildError {
    /// Create a resolution failure
    pub fn new(kind: ErrorKind, name: impl Into<String>, message: impl Into<String>) -> Self {
        BuildError::Resolution {
            kind,
            name: name.into(),
            message: message.into(),
        }
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        BuildError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The failure kind, looking through any context layers
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            BuildError::Resolution { kind, .. } => Some(*kind),
            BuildError::WithContext { source, .. } => source.kind(),
            _ => None,
        }
    }

    /// The offending qualified name, looking through any context layers
    pub fn name(&self) -> Option<&str> {
        match self {
            BuildError::Resolution { name, .. } => Some(name),
            BuildError::WithContext { source, .. } => source.name(),
            _ => None,
        }
    }
}

/// Result type alias for builder operations
pub type Result<T> = std::result::Result<T, BuildError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, StoreError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| BuildError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| BuildError::from(e).with_context(f()))
    }
}
