//! Failure types produced while preparing, sending and judging exchanges.

use attest_core::ResolveError;
use std::fmt;
use thiserror::Error;

/// A single assertion that did not hold against the settled response.
///
/// Carries the assertion's self-describing name together with optional
/// expected/actual renderings so reporters can print a useful diff line
/// without re-deriving anything from the response.
#[derive(Debug, Clone, PartialEq)]
pub struct AssertionError {
    /// Name of the assertion that failed, e.g. `status code is 200`.
    pub name: String,
    /// Human-readable description of what went wrong.
    pub message: String,
    /// What the assertion wanted to see, when it can be rendered.
    pub expected: Option<String>,
    /// What the response actually contained.
    pub actual: Option<String>,
}

impl AssertionError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            expected: None,
            actual: None,
        }
    }

    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn with_actual(mut self, actual: impl Into<String>) -> Self {
        self.actual = Some(actual.into());
        self
    }
}

impl fmt::Display for AssertionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)?;
        match (&self.expected, &self.actual) {
            (Some(expected), Some(actual)) => {
                write!(f, " (expected {expected}, got {actual})")
            }
            (Some(expected), None) => write!(f, " (expected {expected})"),
            (None, Some(actual)) => write!(f, " (got {actual})"),
            (None, None) => Ok(()),
        }
    }
}

impl std::error::Error for AssertionError {}

/// Errors raised while turning a parsed test into a concrete request.
///
/// These happen before any traffic is sent, typically because a pointer
/// reads a value that no earlier test stored.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrepareError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("uri template parameter `{{{0}}}` has no value")]
    MissingUriParameter(String),

    #[error("uri template parameter `{{{0}}}` resolved to a non-scalar value")]
    NonScalarUriParameter(String),

    #[error("`attach` requires a form body or no body at all")]
    AttachConflict,

    #[error("header `{0}` resolved to a non-scalar value")]
    NonScalarHeader(String),

    #[error("query parameter `{0}` resolved to a non-scalar value")]
    NonScalarQuery(String),

    #[error("form field `{0}` resolved to a non-scalar value")]
    NonScalarField(String),
}

/// Transport-level failures. These carry no response at all.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("invalid client configuration: {0}")]
    Client(String),

    #[error("transport error: {0}")]
    Other(String),
}

/// Why a scheduled test ended up failed.
#[derive(Debug, Clone, PartialEq)]
pub enum TestFailure {
    /// The exchange settled but one or more assertions did not hold.
    Assertions(Vec<AssertionError>),
    /// The request could not be built from the store.
    Prepare(PrepareError),
    /// The request never produced a response.
    Transport(TransportError),
}

impl fmt::Display for TestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestFailure::Assertions(errors) => {
                if errors.len() == 1 {
                    write!(f, "{}", errors[0])
                } else {
                    writeln!(f, "{} assertions failed:", errors.len())?;
                    for (index, error) in errors.iter().enumerate() {
                        writeln!(f, "  {}. {}", index + 1, error)?;
                    }
                    Ok(())
                }
            }
            TestFailure::Prepare(error) => write!(f, "{error}"),
            TestFailure::Transport(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for TestFailure {}

/// Outcome of evaluating one coverage obligation against the recorded
/// observations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoverageError {
    /// No observation matched the obligation's filter. Soft: the
    /// obligation is reported as not covered rather than broken.
    #[error("no matching observations")]
    NoMatchingResults,

    /// At least one matching observation violated the obligation.
    #[error("{0}")]
    Check(String),
}
