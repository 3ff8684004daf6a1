//! Execution engine for parsed specification documents.
//!
//! A parsed suite tree flattens into a [`RunPlan`]; the [`Scheduler`]
//! runs every test as its own tokio task, honoring declared
//! dependencies and short-circuiting dependents of failed tests without
//! sending their requests. Settled exchanges are judged by the
//! assertion checks in [`assertions`] and recorded as [`Observation`]s,
//! which the [`CoverageEngine`] later matches against the obligations a
//! RAML document declares.

pub mod assertions;
pub mod coverage;
pub mod error;
pub mod exchange;
pub mod http;
pub mod lcov;
pub mod scheduler;

pub use coverage::{Coverage, CoverageAssertion, CoverageEngine, CoverageResource, CoverageState};
pub use error::{AssertionError, CoverageError, PrepareError, TestFailure, TransportError};
pub use exchange::{prepare, Target};
pub use http::{HttpRequester, PreparedBody, PreparedRequest, Requester, Response};
pub use scheduler::{
    Observation, PlannedTest, RunOutcome, RunPlan, RunReport, Scheduler, SkipReason, TestDigest,
    TestId, TestResult, TestStatus, Totals,
};
