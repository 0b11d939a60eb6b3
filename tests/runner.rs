//! Runner state-machine coverage on the in-memory store.

use futures_util::FutureExt;
use pgrider::{
    dataset::DataSet,
    error::Error,
    mem::MemStore,
    runner::{Outcome, Runner, TestCase},
    TableStore,
};

const TABLE: &str = "example.pet";

fn store() -> MemStore {
    MemStore::with_tables([TABLE])
}

fn pets(count: usize) -> DataSet {
    let mut text = String::from("example.pet:\n");
    for i in 0..count {
        text.push_str(&format!("  - name: pet {i}\n"));
    }
    DataSet::parse("pets", &text).unwrap()
}

// Expects the leak left by its predecessors, then adds one row of its own.
fn leaky_case(seq: u32, expected_entry: i64) -> TestCase<MemStore> {
    TestCase::new(seq, format!("case {seq}")).body(move |ctx| {
        async move {
            ctx.expect_count(TABLE, expected_entry).await?;
            ctx.insert(TABLE, [("name", format!("pet {seq}"))]).await
        }
        .boxed()
    })
}

#[tokio::test]
async fn cases_run_in_sequence_order_not_insertion_order() {
    let report = Runner::new(store())
        .case(leaky_case(3, 2))
        .case(leaky_case(1, 0))
        .case(leaky_case(2, 1))
        .run()
        .await;

    assert!(report.success(), "{}", report.summary());
    let order = report.cases().iter().map(|case| case.seq).collect::<Vec<_>>();
    assert_eq!(order, [1, 2, 3]);
}

#[tokio::test]
async fn bare_cases_leak_their_writes() {
    let runner = Runner::new(store());
    let handle = runner.store();

    let report = runner
        .case(leaky_case(1, 0))
        .case(leaky_case(2, 1))
        .run()
        .await;

    assert!(report.success(), "{}", report.summary());
    // nothing cleaned up after the run either
    assert_eq!(handle.lock().await.count_rows(TABLE).await.unwrap(), 2);
}

#[tokio::test]
async fn dataset_seeds_exactly_and_cleans_after() {
    let runner = Runner::new(store());
    let handle = runner.store();

    let report = runner
        .case(TestCase::new(1, "litter").body(|ctx| {
            async move {
                ctx.insert(TABLE, [("name", "junk 1")]).await?;
                ctx.insert(TABLE, [("name", "junk 2")]).await?;
                ctx.insert(TABLE, [("name", "junk 3")]).await
            }
            .boxed()
        }))
        .case(
            TestCase::new(2, "seeded").with_dataset(pets(2)).body(|ctx| {
                async move {
                    // setup replaced the three leftovers with the data set
                    ctx.expect_count(TABLE, 2).await?;
                    ctx.insert(TABLE, [("name", "body pet")]).await?;
                    ctx.expect_count(TABLE, 3).await
                }
                .boxed()
            }),
        )
        .case(TestCase::new(3, "clean slate").body(|ctx| {
            async move { ctx.expect_count(TABLE, 0).await }.boxed()
        }))
        .run()
        .await;

    assert!(report.success(), "{}", report.summary());
    assert_eq!(handle.lock().await.count_rows(TABLE).await.unwrap(), 0);
}

#[tokio::test]
async fn rerunning_a_fixtured_case_sees_the_same_entry_state() {
    let entry_checked = |seq| {
        TestCase::new(seq, format!("seeded run {seq}"))
            .with_dataset(pets(2))
            .body(|ctx| {
                async move {
                    ctx.expect_count(TABLE, 2).await?;
                    ctx.insert(TABLE, [("name", "extra")]).await
                }
                .boxed()
            })
    };

    let report = Runner::new(store())
        .case(entry_checked(1))
        .case(entry_checked(2))
        .run()
        .await;

    assert!(report.success(), "{}", report.summary());
}

#[tokio::test]
async fn failed_case_does_not_halt_the_run() {
    let report = Runner::new(store())
        .case(TestCase::new(1, "wrong count").body(|ctx| {
            async move { ctx.expect_count(TABLE, 7).await }.boxed()
        }))
        .case(leaky_case(2, 0))
        .run()
        .await;

    assert!(!report.success());
    match &report.cases()[0].outcome {
        Outcome::Failed(Error::Assertion {
            expected, actual, ..
        }) => assert_eq!((*expected, *actual), (7, 0)),
        other => panic!("expected an assertion failure, got {other:?}"),
    }
    assert!(report.cases()[1].outcome.is_passed());
}

#[tokio::test]
async fn setup_failure_errors_the_case_and_skips_the_body() {
    let ghost = DataSet::parse("ghost", "example.ghost:\n  - name: boo\n").unwrap();
    let runner = Runner::new(store());
    let handle = runner.store();

    let report = runner
        .case(
            TestCase::new(1, "bad setup").with_dataset(ghost).body(|ctx| {
                async move { ctx.insert(TABLE, [("name", "never inserted")]).await }.boxed()
            }),
        )
        .case(leaky_case(2, 0))
        .run()
        .await;

    match &report.cases()[0].outcome {
        Outcome::Errored(Error::Query { table, .. }) => assert_eq!(table, "example.ghost"),
        other => panic!("expected a query error, got {other:?}"),
    }
    assert!(report.cases()[1].outcome.is_passed());
    // only case 2's insert made it in
    assert_eq!(handle.lock().await.count_rows(TABLE).await.unwrap(), 1);
}

#[tokio::test]
async fn cleanup_failure_does_not_overturn_a_pass() {
    let runner = Runner::new(store());
    let handle = runner.store();
    let sabotage = handle.clone();

    let report = runner
        .case(
            TestCase::new(1, "cleanup sabotaged")
                .with_dataset(pets(1))
                .body(move |ctx| {
                    async move {
                        ctx.expect_count(TABLE, 1).await?;
                        sabotage.lock().await.fail_truncates(true);
                        Ok(())
                    }
                    .boxed()
                }),
        )
        // the failed cleanup left the seeded row behind
        .case(leaky_case(2, 1))
        .run()
        .await;

    assert!(report.success(), "{}", report.summary());
}

#[tokio::test]
async fn query_error_in_the_body_errors_the_case() {
    let mut sabotaged = store();
    sabotaged.fail_inserts(true);

    let report = Runner::new(sabotaged)
        .case(TestCase::new(1, "insert rejected").body(|ctx| {
            async move { ctx.insert(TABLE, [("name", "nope")]).await }.boxed()
        }))
        .run()
        .await;

    assert!(!report.success());
    assert!(matches!(
        report.cases()[0].outcome,
        Outcome::Errored(Error::Query { .. })
    ));
}

#[tokio::test]
async fn export_is_written_regardless_of_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("output.yml");

    let report = Runner::new(store())
        .case(
            TestCase::new(1, "failing case still exports")
                .with_dataset(pets(1))
                .export_to(&output, &[TABLE])
                .body(|ctx| {
                    async move {
                        ctx.insert(TABLE, [("name", "body pet")]).await?;
                        ctx.expect_count(TABLE, 99).await
                    }
                    .boxed()
                }),
        )
        .run()
        .await;

    assert!(!report.success());
    // seeded row + body insert, as of the moment the body finished
    let artifact = DataSet::load(&output).unwrap();
    assert_eq!(artifact.rows(TABLE).map(<[_]>::len), Some(2));
}

#[tokio::test]
async fn duplicate_positions_run_in_insertion_order() {
    let report = Runner::new(store())
        .case(leaky_case(1, 0))
        .case(leaky_case(1, 1))
        .run()
        .await;

    assert!(report.success(), "{}", report.summary());
}
