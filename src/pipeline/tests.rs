//! Unit tests for pipeline change accounting.

use rstest::rstest;
use thiserror::Error;

use super::*;

#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{0}")]
struct StepFailed(&'static str);

type Step = Operation<StepFailed>;

#[derive(Debug, Eq, PartialEq)]
struct Observed {
    failed: bool,
    steps: u32,
    all_steps: u32,
    updates: u32,
    all_updates: u32,
    pipeline_changed: bool,
    previous_changed: bool,
}

async fn run(operations: Vec<Step>) -> Observed {
    let pipeline = Pipeline::new(ExecScope::background(), operations);
    let outcome = pipeline.run().await;
    let ctx = pipeline.context();
    Observed {
        failed: outcome.is_err(),
        steps: ctx.step_ctr(false),
        all_steps: ctx.step_ctr(true),
        updates: ctx.update_ctr(false),
        all_updates: ctx.update_ctr(true),
        pipeline_changed: ctx.pipeline_has_changes(),
        previous_changed: ctx.previous_has_changes(),
    }
}

fn single_unchanged() -> Vec<Step> {
    vec![dummy_operation(false, None)]
}

fn mixed_flat() -> Vec<Step> {
    vec![
        dummy_operation(true, None),
        dummy_operation(true, None),
        dummy_operation(false, None),
        dummy_operation(false, None),
        dummy_operation(true, None),
    ]
}

fn failing_fourth() -> Vec<Step> {
    vec![
        dummy_operation(true, None),
        dummy_operation(true, None),
        dummy_operation(false, None),
        dummy_operation(false, Some(StepFailed("boom"))),
        dummy_operation(true, None),
    ]
}

fn nested_composition() -> Vec<Step> {
    vec![
        dummy_operation(false, None),
        dummy_operation(false, None),
        nested(vec![dummy_operation(false, None), dummy_operation(true, None)]),
        dummy_operation(false, None),
    ]
}

#[rstest]
#[case::single_unchanged(single_unchanged, Observed {
    failed: false, steps: 1, all_steps: 1, updates: 0, all_updates: 0,
    pipeline_changed: false, previous_changed: false,
})]
#[case::mixed_flat(mixed_flat, Observed {
    failed: false, steps: 5, all_steps: 5, updates: 3, all_updates: 3,
    pipeline_changed: true, previous_changed: true,
})]
#[case::failing_fourth(failing_fourth, Observed {
    failed: true, steps: 4, all_steps: 4, updates: 2, all_updates: 2,
    pipeline_changed: true, previous_changed: false,
})]
#[case::nested_composition(nested_composition, Observed {
    failed: false, steps: 4, all_steps: 6, updates: 1, all_updates: 2,
    pipeline_changed: true, previous_changed: false,
})]
#[tokio::test]
async fn pipeline_counts_steps_and_updates(
    #[case] operations: fn() -> Vec<Step>,
    #[case] expected: Observed,
) {
    assert_eq!(run(operations()).await, expected);
}

#[rstest]
#[tokio::test]
async fn empty_pipeline_reports_nothing() {
    let observed = run(Vec::new()).await;
    assert_eq!(
        observed,
        Observed {
            failed: false,
            steps: 0,
            all_steps: 0,
            updates: 0,
            all_updates: 0,
            pipeline_changed: false,
            previous_changed: false,
        }
    );
}

#[rstest]
#[tokio::test]
async fn forced_change_does_not_count_a_step() {
    let observed = run(vec![force_change()]).await;
    assert!(observed.pipeline_changed);
    assert!(observed.previous_changed);
    assert_eq!(observed.steps, 0);
    assert_eq!(observed.updates, 0);
}

#[rstest]
#[case(true, true)]
#[case(false, false)]
#[tokio::test]
async fn conditional_force_follows_condition(#[case] condition: bool, #[case] changed: bool) {
    let observed = run(vec![force_change_if(condition)]).await;
    assert_eq!(observed.pipeline_changed, changed);
    assert_eq!(observed.steps, 0);
}

#[rstest]
#[tokio::test]
async fn update_if_any_carries_earlier_change_forward() {
    let observed = run(vec![
        dummy_operation(true, None),
        dummy_operation(false, None),
        force_update_if_any(),
    ])
    .await;
    assert!(observed.previous_changed);
    assert_eq!(observed.steps, 2);
}

#[rstest]
#[tokio::test]
async fn update_if_any_is_silent_without_changes() {
    let observed = run(vec![dummy_operation(false, None), force_update_if_any()]).await;
    assert!(!observed.previous_changed);
    assert!(!observed.pipeline_changed);
}

#[rstest]
#[tokio::test]
async fn nested_failure_still_reports_inner_changes() {
    let pipeline = Pipeline::new(
        ExecScope::background(),
        vec![nested(vec![
            dummy_operation(true, None),
            dummy_operation(false, Some(StepFailed("inner"))),
        ])],
    );

    let err = pipeline.run().await.expect_err("inner failure should surface");

    assert_eq!(err, StepFailed("inner"));
    assert_eq!(pipeline.context().step_ctr(false), 1);
    assert_eq!(pipeline.context().update_ctr(false), 1);
}

#[rstest]
#[tokio::test]
async fn operations_observe_the_previous_result() {
    let seen = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let observer = std::sync::Arc::clone(&seen);
    let pipeline = Pipeline::new(
        ExecScope::background(),
        vec![
            dummy_operation(true, None),
            operation(move |ctx| {
                let flag = std::sync::Arc::clone(&observer);
                Box::pin(async move {
                    flag.store(
                        ctx.previous_has_changes(),
                        std::sync::atomic::Ordering::SeqCst,
                    );
                    ctx.set_result(false);
                    Ok::<(), StepFailed>(())
                })
            }),
        ],
    );

    pipeline
        .run()
        .await
        .unwrap_or_else(|err| panic!("pipeline should succeed: {err}"));

    assert!(seen.load(std::sync::atomic::Ordering::SeqCst));
}

fn silent_operation() -> Step {
    operation(|_ctx| Box::pin(async { Ok::<(), StepFailed>(()) }))
}

#[rstest]
#[tokio::test]
#[should_panic(expected = "succeeded without calling Context::set_result")]
async fn operation_that_never_reports_is_rejected() {
    let pipeline = Pipeline::new(
        ExecScope::background(),
        vec![dummy_operation(true, None), silent_operation()],
    );

    pipeline.run().await.ok();
}

#[rstest]
#[tokio::test]
async fn control_flow_operations_count_as_reported() {
    let observed = run(vec![
        force_change_if(false),
        dummy_operation(false, None),
        force_update_if_any(),
        force_change(),
    ])
    .await;

    assert!(!observed.failed);
    assert_eq!(observed.steps, 1);
    assert!(observed.pipeline_changed);
}
