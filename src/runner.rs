//! The ordered test runner.
//!
//! Cases run strictly by ascending sequence position, one at a time. Later
//! cases may depend on exactly which state their predecessors left behind,
//! so declaration order is part of the contract, not an implementation
//! detail: bare cases leak their writes to successors, fixtured cases are
//! seeded before the body and cleaned after it.
//!
//! Each case walks `setup -> body -> export -> cleanup`. A failed or
//! errored case never halts the run; whatever state it leaves is what the
//! next case gets.

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use futures_util::future::BoxFuture;
use log::{info, warn};
use tabular::{row, Table};
use tokio::sync::Mutex;

use crate::{
    dataset::{export_tables, DataSet},
    error::{Error, Result},
    query::{Row, SqlValue, TableStore},
};

/// Shared handle to the store backing a run.
pub type SharedStore<S> = Arc<Mutex<S>>;

type CaseBody<S> = Box<dyn FnOnce(TestCtx<S>) -> BoxFuture<'static, Result<()>> + Send>;

/// Fixture strategy of a test case.
///
/// These two variants are the whole branch structure of the per-case state
/// machine; there is no third path.
#[derive(Clone, Debug)]
pub enum FixtureSpec {
    /// No data set: existing table state is left untouched and no cleanup
    /// runs, so the body's writes persist for the next case.
    Bare,
    /// A data set applied before the body (truncate-then-insert) and
    /// cleaned after it (truncate).
    Fixtured(DataSet),
}

/// Post-body export directive.
#[derive(Clone, Debug)]
pub struct ExportSpec {
    /// Where to write the artifact.
    pub output: PathBuf,
    /// Tables to snapshot.
    pub tables: Vec<String>,
}

/// A single ordered test case.
pub struct TestCase<S> {
    seq: u32,
    name: String,
    fixture: FixtureSpec,
    export: Option<ExportSpec>,
    body: CaseBody<S>,
}

impl<S: TableStore + 'static> TestCase<S> {
    /// New bare case at sequence position `seq`.
    pub fn new(seq: u32, name: impl Into<String>) -> Self {
        Self {
            seq,
            name: name.into(),
            fixture: FixtureSpec::Bare,
            export: None,
            body: Box::new(|_| Box::pin(async { Ok(()) })),
        }
    }

    /// Apply `dataset` before the body and clean its tables after it.
    pub fn with_dataset(mut self, dataset: DataSet) -> Self {
        self.fixture = FixtureSpec::Fixtured(dataset);
        self
    }

    /// After the body, pass or fail, snapshot `tables` into `output`.
    pub fn export_to(mut self, output: impl Into<PathBuf>, tables: &[&str]) -> Self {
        self.export = Some(ExportSpec {
            output: output.into(),
            tables: tables.iter().map(|table| table.to_string()).collect(),
        });
        self
    }

    /// The test body.
    pub fn body<F>(mut self, body: F) -> Self
    where
        F: FnOnce(TestCtx<S>) -> BoxFuture<'static, Result<()>> + Send + 'static,
    {
        self.body = Box::new(body);
        self
    }
}

/// Handle a test body uses to talk to the shared store.
pub struct TestCtx<S> {
    store: SharedStore<S>,
}

impl<S: TableStore> TestCtx<S> {
    /// Current row count of `table`.
    pub async fn count(&self, table: &str) -> Result<i64> {
        self.store.lock().await.count_rows(table).await
    }

    /// Insert one row.
    pub async fn insert<C, V>(
        &self,
        table: &str,
        row: impl IntoIterator<Item = (C, V)>,
    ) -> Result<()>
    where
        C: Into<String>,
        V: Into<SqlValue>,
    {
        let row: Row = row
            .into_iter()
            .map(|(column, value)| (column.into(), value.into()))
            .collect();
        self.store.lock().await.insert_row(table, &row).await
    }

    /// Check the current row count of `table`, failing the case on mismatch.
    pub async fn expect_count(&self, table: &str, expected: i64) -> Result<()> {
        let actual = self.count(table).await?;
        if actual == expected {
            Ok(())
        } else {
            Err(Error::Assertion {
                table: table.to_string(),
                expected,
                actual,
            })
        }
    }
}

/// Terminal state of one case.
#[derive(Debug, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Outcome {
    /// The body completed without error.
    Passed,
    /// An assertion mismatched.
    Failed(Error),
    /// Setup or the body failed outside an assertion.
    Errored(Error),
}

impl Outcome {
    /// Whether the case passed.
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    fn from_body(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::Passed,
            Err(err) if err.is_assertion() => Self::Failed(err),
            Err(err) => Self::Errored(err),
        }
    }
}

/// Report for one executed case.
#[derive(Debug)]
pub struct CaseReport {
    /// Sequence position the case declared.
    pub seq: u32,
    /// Case name.
    pub name: String,
    /// Terminal state.
    pub outcome: Outcome,
}

/// Aggregated result of a whole run.
#[derive(Default, Debug)]
pub struct RunReport {
    cases: Vec<CaseReport>,
}

impl RunReport {
    /// Individual case reports, in execution order.
    pub fn cases(&self) -> &[CaseReport] {
        &self.cases
    }

    /// Whether every case passed.
    pub fn success(&self) -> bool {
        self.cases.iter().all(|case| case.outcome.is_passed())
    }

    /// Standard pass/fail aggregation: non-zero when any case failed or
    /// errored.
    pub fn exit_code(&self) -> ExitCode {
        if self.success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }

    /// Render the per-case summary table.
    pub fn summary(&self) -> String {
        let table = Table::new("  {:<}  {:<}  {:<}  {:<}");
        let table = self.cases.iter().fold(table, |table, case| {
            let detail = match &case.outcome {
                Outcome::Passed => String::new(),
                Outcome::Failed(err) | Outcome::Errored(err) => err.to_string(),
            };
            table.with_row(row!(case.seq, &case.name, case.outcome.as_ref(), detail))
        });
        format!("{table}")
    }
}

/// Executes test cases in declared sequence order against a shared store.
pub struct Runner<S> {
    store: SharedStore<S>,
    cases: Vec<TestCase<S>>,
}

impl<S: TableStore + 'static> Runner<S> {
    /// New runner owning `store`.
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            cases: Vec::new(),
        }
    }

    /// Shared handle to the store, e.g. for bootstrap SQL before the run.
    pub fn store(&self) -> SharedStore<S> {
        self.store.clone()
    }

    /// Add a case. Execution order follows `seq`, not insertion order.
    pub fn case(mut self, case: TestCase<S>) -> Self {
        self.cases.push(case);
        self
    }

    /// Run every case to completion, in ascending sequence order.
    pub async fn run(mut self) -> RunReport {
        self.cases.sort_by_key(|case| case.seq);
        for window in self.cases.windows(2) {
            if window[0].seq == window[1].seq {
                warn!(
                    "cases `{}` and `{}` share sequence position {}",
                    window[0].name, window[1].name, window[0].seq
                );
            }
        }

        let mut report = RunReport::default();
        for case in self.cases {
            let (seq, name) = (case.seq, case.name.clone());
            info!("case {seq}: {name}");
            let outcome = Self::run_case(self.store.clone(), case).await;
            match &outcome {
                Outcome::Passed => info!("case {seq}: passed"),
                Outcome::Failed(err) => warn!("case {seq}: failed: {err}"),
                Outcome::Errored(err) => warn!("case {seq}: errored: {err:?}"),
            }
            report.cases.push(CaseReport { seq, name, outcome });
        }
        report
    }

    async fn run_case(store: SharedStore<S>, case: TestCase<S>) -> Outcome {
        let TestCase {
            seq,
            fixture,
            export,
            body,
            ..
        } = case;

        // SETUP: a failure here is an infrastructure problem of the case,
        // not a verdict on its assertions; the body never runs.
        if let FixtureSpec::Fixtured(dataset) = &fixture {
            if let Err(err) = dataset.apply(&mut *store.lock().await).await {
                return Outcome::Errored(err);
            }
        }

        let body_result = body(TestCtx {
            store: store.clone(),
        })
        .await;

        // EXPORT runs pass or fail, and an export failure never changes
        // the outcome.
        if let Some(export) = &export {
            let mut store = store.lock().await;
            if let Err(err) = export_tables(&mut *store, &export.tables, &export.output).await {
                warn!(
                    "case {seq}: export to {} failed: {err:?}",
                    export.output.display()
                );
            }
        }

        // CLEANUP: clean-after for fixtured cases only; a failure is logged
        // and does not overturn the body result.
        if let FixtureSpec::Fixtured(dataset) = &fixture {
            if let Err(err) = dataset.clean(&mut *store.lock().await).await {
                warn!("case {seq}: cleanup failed: {err:?}");
            }
        }

        Outcome::from_body(body_result)
    }
}
