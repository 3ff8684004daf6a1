//! Concurrent, dependency-ordered execution of a parsed suite tree.
//!
//! Every test becomes one tokio task. A test that depends on earlier
//! tests awaits their shared completion signals before doing anything;
//! if any dependency did not pass, the test settles as skipped without
//! sending a single byte. Store reads and writes go through one
//! [`tokio::sync::RwLock`], so pointer reads never observe a
//! half-applied extraction.

use crate::assertions;
use crate::error::TestFailure;
use crate::exchange::{self, Target};
use crate::http::{PreparedRequest, Requester, Response};
use attest_core::{Context, Method, Suite, Test, TestPath};
use attest_parser::SchemaTable;
use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub type TestId = usize;

/// One leaf of the suite tree, flattened for execution.
#[derive(Debug, Clone)]
pub struct PlannedTest {
    pub id: TestId,
    pub path: TestPath,
    pub test: Test,
    /// Ids of tests that must pass before this one runs.
    pub depends_on: Vec<TestId>,
    /// Author-level skip, inherited from any enclosing suite.
    pub skip: bool,
}

/// The flattened, dependency-resolved execution plan. Tests keep their
/// declaration order, which is also the report order.
#[derive(Debug, Clone, Default)]
pub struct RunPlan {
    pub tests: Vec<PlannedTest>,
}

impl RunPlan {
    /// Flatten a suite tree. Leaves inherit `skip` from every suite on
    /// their path; dependency paths are resolved to ids of earlier
    /// leaves.
    pub fn from_suite(root: &Suite) -> RunPlan {
        fn walk(suite: &Suite, path: &TestPath, skip: bool, out: &mut Vec<(TestPath, Test, bool)>) {
            let here = path.child(&suite.name);
            let skip = skip || suite.skip;
            if let Some(test) = &suite.test {
                out.push((here.clone(), test.clone(), skip));
            }
            for child in &suite.children {
                walk(child, &here, skip, out);
            }
        }

        let mut flat = Vec::new();
        for child in &root.children {
            walk(child, &TestPath::default(), root.skip, &mut flat);
        }

        let ids: HashMap<String, TestId> = flat
            .iter()
            .enumerate()
            .map(|(id, (path, _, _))| (path.to_string(), id))
            .collect();

        let tests = flat
            .into_iter()
            .enumerate()
            .map(|(id, (path, test, skip))| {
                let depends_on = test
                    .depends_on
                    .iter()
                    .filter_map(|dependency| {
                        let found = ids.get(&dependency.to_string()).copied();
                        if found.is_none() {
                            warn!(test = %path, dependency = %dependency, "dependency not found in plan");
                        }
                        found
                    })
                    .collect();
                PlannedTest {
                    id,
                    path,
                    test,
                    depends_on,
                    skip,
                }
            })
            .collect();
        RunPlan { tests }
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

/// Why a test did not run.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// The author marked the test (or an enclosing suite) with `skip`.
    Marked,
    /// A declared dependency did not pass, so this test's pointers
    /// could dangle. No request is sent.
    DependencyFailed { dependency: String },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Marked => f.write_str("skipped"),
            SkipReason::DependencyFailed { dependency } => {
                write!(f, "dependency `{dependency}` did not pass")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TestStatus {
    Passed,
    Failed(TestFailure),
    Skipped(SkipReason),
}

#[derive(Debug, Clone)]
pub struct TestResult {
    pub id: TestId,
    pub path: TestPath,
    pub name: String,
    pub status: TestStatus,
}

impl TestResult {
    pub fn passed(&self) -> bool {
        matches!(self.status, TestStatus::Passed)
    }
}

/// Aggregate counts over a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Per-test results in declaration order.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub results: Vec<TestResult>,
}

impl RunReport {
    pub fn totals(&self) -> Totals {
        let mut totals = Totals::default();
        for result in &self.results {
            match result.status {
                TestStatus::Passed => totals.passed += 1,
                TestStatus::Failed(_) => totals.failed += 1,
                TestStatus::Skipped(_) => totals.skipped += 1,
            }
        }
        totals
    }

    /// True when at least one test failed. Skips alone do not fail a
    /// run; a skip caused by a failed dependency is already counted
    /// through that dependency.
    pub fn failed(&self) -> bool {
        self.results
            .iter()
            .any(|result| matches!(result.status, TestStatus::Failed(_)))
    }
}

/// The declared shape of the test a response was observed under.
#[derive(Debug, Clone, PartialEq)]
pub struct TestDigest {
    pub method: Method,
    pub uri_template: String,
    pub expected_status: u16,
}

impl TestDigest {
    fn of(test: &Test) -> TestDigest {
        TestDigest {
            method: test.method,
            uri_template: test.uri_template.clone(),
            expected_status: test.response.status,
        }
    }
}

/// One settled exchange, recorded for coverage regardless of whether
/// the test's assertions held.
#[derive(Debug, Clone)]
pub struct Observation {
    pub test: TestDigest,
    pub request: PreparedRequest,
    pub response: Response,
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    pub observations: Vec<Observation>,
    /// The variable store as the run left it.
    pub context: Context,
}

/// Drives a [`RunPlan`] to completion over a [`Requester`].
pub struct Scheduler {
    requester: Arc<dyn Requester>,
    target: Arc<Target>,
    schemas: Arc<SchemaTable>,
}

impl Scheduler {
    pub fn new(requester: Arc<dyn Requester>, target: Target, schemas: SchemaTable) -> Scheduler {
        Scheduler {
            requester,
            target: Arc::new(target),
            schemas: Arc::new(schemas),
        }
    }

    /// Run every planned test. Tests with no unfinished dependencies
    /// run concurrently; results come back in declaration order.
    pub async fn execute(&self, plan: RunPlan, context: Context) -> RunOutcome {
        let total = plan.tests.len();
        let context = Arc::new(RwLock::new(context));
        let observations = Arc::new(Mutex::new(Vec::new()));

        let mut senders = Vec::with_capacity(total);
        let mut completions: Vec<Shared<oneshot::Receiver<bool>>> = Vec::with_capacity(total);
        for _ in 0..total {
            let (sender, receiver) = oneshot::channel::<bool>();
            senders.push(sender);
            completions.push(receiver.shared());
        }

        let names: Vec<String> = plan
            .tests
            .iter()
            .map(|planned| planned.path.to_string())
            .collect();

        let mut tasks = JoinSet::new();
        for (planned, done) in plan.tests.into_iter().zip(senders) {
            let waits: Vec<(String, Shared<oneshot::Receiver<bool>>)> = planned
                .depends_on
                .iter()
                .map(|&dependency| (names[dependency].clone(), completions[dependency].clone()))
                .collect();
            tasks.spawn(run_one(
                planned,
                waits,
                done,
                Arc::clone(&self.requester),
                Arc::clone(&self.target),
                Arc::clone(&self.schemas),
                Arc::clone(&context),
                Arc::clone(&observations),
            ));
        }

        let mut slots: Vec<Option<TestResult>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => {
                    let id = result.id;
                    slots[id] = Some(result);
                }
                Err(error) => warn!(%error, "test task aborted"),
            }
        }

        let report = RunReport {
            results: slots.into_iter().flatten().collect(),
        };
        let observations = Arc::try_unwrap(observations)
            .map(Mutex::into_inner)
            .unwrap_or_default();
        let context = Arc::try_unwrap(context)
            .map(RwLock::into_inner)
            .unwrap_or_default();
        RunOutcome {
            report,
            observations,
            context,
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_one(
    planned: PlannedTest,
    waits: Vec<(String, Shared<oneshot::Receiver<bool>>)>,
    done: oneshot::Sender<bool>,
    requester: Arc<dyn Requester>,
    target: Arc<Target>,
    schemas: Arc<SchemaTable>,
    context: Arc<RwLock<Context>>,
    observations: Arc<Mutex<Vec<Observation>>>,
) -> TestResult {
    let PlannedTest {
        id,
        path,
        test,
        skip,
        ..
    } = planned;
    let name = test.name.clone();

    let status = async {
        for (dependency, completion) in waits {
            // A dropped sender counts as a failure: the dependency's
            // task never settled.
            let passed = completion.await.unwrap_or(false);
            if !passed {
                debug!(test = %path, %dependency, "skipping: dependency did not pass");
                return TestStatus::Skipped(SkipReason::DependencyFailed { dependency });
            }
        }

        if skip {
            debug!(test = %path, "skipping: marked");
            return TestStatus::Skipped(SkipReason::Marked);
        }

        let prepared = {
            let store = context.read().await;
            exchange::prepare(&test, &target, store.store())
        };
        let prepared = match prepared {
            Ok(prepared) => prepared,
            Err(error) => return TestStatus::Failed(TestFailure::Prepare(error)),
        };

        debug!(test = %path, method = %test.method, url = %prepared.url, "sending request");
        let timeout = Duration::from_millis(test.timeout_ms);
        let response = match requester.run(prepared.clone(), timeout).await {
            Ok(response) => response,
            Err(error) => {
                warn!(test = %path, %error, "request did not settle");
                return TestStatus::Failed(TestFailure::Transport(error));
            }
        };

        observations.lock().await.push(Observation {
            test: TestDigest::of(&test),
            request: prepared,
            response: response.clone(),
        });

        if test.response.body.print {
            info!(test = %path, body = %response.text, "response body");
        }

        let failures = {
            let mut store = context.write().await;
            let mut failures = Vec::new();
            for assertion in &test.assertions {
                if let Err(error) =
                    assertions::check(assertion, &response, store.store_mut(), &schemas)
                {
                    failures.push(error);
                }
            }
            failures
        };

        if failures.is_empty() {
            TestStatus::Passed
        } else {
            TestStatus::Failed(TestFailure::Assertions(failures))
        }
    }
    .await;

    let _ = done.send(matches!(status, TestStatus::Passed));
    TestResult {
        id,
        path,
        name,
        status,
    }
}
