//! Round-level scenarios: one workflow replayed against growing histories.
#![allow(clippy::unwrap_used)]

mod common;

use common::{HistoryBuilder, activity_ids, child_ids, round, timer_ids};
use replayflow::{
    ActivityProxy, Call, Decision, ExecutionOptions, FnWorkflow, Interrupt, RoundOutcome, Workflow, WorkflowConfig,
    WorkflowContext, WorkflowProxy,
};
use serde_json::{Value, json};

fn config() -> WorkflowConfig {
    WorkflowConfig::named("Flow", "1")
}

fn start() -> HistoryBuilder {
    HistoryBuilder::started("Flow", "1", Some("null"))
}

// ============================================================================
// Scenario A: constant result
// ============================================================================

fn constant(_ctx: &mut WorkflowContext<'_>, _input: Value) -> Result<Value, Interrupt> {
    Ok(json!(42))
}

#[test]
fn constant_workflow_completes_in_one_round() {
    let (outcome, decisions) = round(&FnWorkflow(constant), &config(), start().build());
    assert_eq!(outcome, RoundOutcome::Completed { result: "42".into() });
    assert_eq!(decisions, vec![Decision::CompleteWorkflowExecution { result: "42".into() }]);
}

// ============================================================================
// Scenario B: retry window
// ============================================================================

fn fetch_with_retry(ctx: &mut WorkflowContext<'_>, _input: Value) -> Result<Value, Interrupt> {
    let fetch = ActivityProxy::new("fetch", "1").with_retry(2);
    let value: String = ctx.call(&fetch, &()).value()?;
    Ok(json!({ "value": value, "position": ctx.position() }))
}

#[test]
fn timed_out_attempt_is_retried_on_the_next_id() {
    let wf = FnWorkflow(fetch_with_retry);

    let (outcome, decisions) = round(&wf, &config(), start().build());
    assert_eq!(outcome, RoundOutcome::Suspended { scheduled: 1 });
    assert_eq!(activity_ids(&decisions), vec!["0"]);

    let history = start().schedule_activity(0).time_out_activity(0);
    let (_, decisions) = round(&wf, &config(), history.build());
    assert_eq!(activity_ids(&decisions), vec!["1"]);

    let history = start()
        .schedule_activity(0)
        .time_out_activity(0)
        .schedule_activity(1)
        .complete_activity(1, "\"X\"");
    let (outcome, _) = round(&wf, &config(), history.build());
    let RoundOutcome::Completed { result } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    let result: Value = serde_json::from_str(&result).unwrap();
    assert_eq!(result, json!({ "value": "X", "position": 3 }));
}

fn fetch_retry_once(ctx: &mut WorkflowContext<'_>, _input: Value) -> Result<Value, Interrupt> {
    let fetch = ActivityProxy::new("fetch", "1").with_retry(1);
    ctx.call(&fetch, &()).value()
}

#[test]
fn exhausted_window_fails_the_call() {
    let history = start()
        .schedule_activity(0)
        .time_out_activity(0)
        .schedule_activity(1)
        .time_out_activity(1);
    let (outcome, decisions) = round(&FnWorkflow(fetch_retry_once), &config(), history.build());
    assert_eq!(outcome, RoundOutcome::Failed { reason: "timed out".into() });
    assert_eq!(decisions.len(), 1);
}

// ============================================================================
// Scenario C: delayed call
// ============================================================================

fn delayed(ctx: &mut WorkflowContext<'_>, _input: Value) -> Result<Value, Interrupt> {
    let later = ActivityProxy::new("later", "1").with_delay(10);
    ctx.call(&later, &()).value()
}

#[test]
fn delay_starts_a_timer_before_the_first_attempt() {
    let wf = FnWorkflow(delayed);

    let (outcome, decisions) = round(&wf, &config(), start().build());
    assert_eq!(outcome, RoundOutcome::Suspended { scheduled: 1 });
    assert_eq!(
        decisions,
        vec![Decision::StartTimer {
            timer_id: "0:t".into(),
            start_to_fire_timeout: 10
        }]
    );

    let (outcome, decisions) = round(&wf, &config(), start().start_timer(0).build());
    assert_eq!(outcome, RoundOutcome::Suspended { scheduled: 0 });
    assert!(decisions.is_empty());

    let (_, decisions) = round(&wf, &config(), start().start_timer(0).fire_timer(0).build());
    assert_eq!(activity_ids(&decisions), vec!["1"]);
    assert!(timer_ids(&decisions).is_empty());
}

// ============================================================================
// Scenario D: continue as new
// ============================================================================

fn restarting(ctx: &mut WorkflowContext<'_>, _input: Value) -> Result<Value, Interrupt> {
    let _: Call<Value> = ctx.call(&ActivityProxy::new("pending", "1"), &());
    Err(ctx.restart(&json!({ "n": 2 })))
}

#[test]
fn restart_replaces_accumulated_schedules() {
    let (outcome, decisions) = round(&FnWorkflow(restarting), &config(), start().build());
    assert_eq!(
        outcome,
        RoundOutcome::Restarted {
            input: r#"{"n":2}"#.into()
        }
    );
    assert_eq!(
        decisions,
        vec![Decision::ContinueAsNewWorkflowExecution {
            input: r#"{"n":2}"#.into(),
            tag_list: vec!["tag".into()],
            task_list: Some("main".into()),
            task_start_to_close_timeout: Some(600),
            execution_start_to_close_timeout: Some(3600),
            child_policy: None,
        }]
    );
}

fn scoped_restart(ctx: &mut WorkflowContext<'_>, _input: Value) -> Result<Value, Interrupt> {
    let overrides = ExecutionOptions {
        task_list: Some("other".into()),
        tags: Some(vec!["scoped".into()]),
        ..ExecutionOptions::default()
    };
    Err(ctx.options(overrides, |ctx| ctx.restart(&1)))
}

#[test]
fn scoped_options_apply_to_restart() {
    let (_, decisions) = round(&FnWorkflow(scoped_restart), &config(), start().build());
    match &decisions[..] {
        [
            Decision::ContinueAsNewWorkflowExecution {
                tag_list,
                task_list,
                task_start_to_close_timeout,
                ..
            },
        ] => {
            assert_eq!(tag_list, &vec!["scoped".to_string()]);
            assert_eq!(task_list.as_deref(), Some("other"));
            assert_eq!(*task_start_to_close_timeout, Some(600));
        }
        other => panic!("unexpected {other:?}"),
    }
}

// ============================================================================
// Rate limit and terminal exclusivity
// ============================================================================

struct FanOut(u64);

impl Workflow for FanOut {
    fn run(&self, ctx: &mut WorkflowContext<'_>, _input: Value) -> Result<Value, Interrupt> {
        let proxy = ActivityProxy::new("part", "1");
        let calls: Vec<Call<u64>> = (0..self.0).map(|i| ctx.call(&proxy, &i)).collect();
        let mut sum = 0;
        for call in calls {
            sum += call.value()?;
        }
        Ok(json!(sum))
    }
}

#[test]
fn rate_limit_defers_overflow_to_the_next_round() {
    let config = config().with_rate_limit(Some(5));
    let (outcome, decisions) = round(&FanOut(8), &config, start().build());
    assert_eq!(outcome, RoundOutcome::Suspended { scheduled: 5 });
    assert_eq!(activity_ids(&decisions), vec!["0", "1", "2", "3", "4"]);

    let mut history = start();
    for id in 0..5 {
        history = history.schedule_activity(id);
    }
    for id in 0..5 {
        history = history.complete_activity(id, &id.to_string());
    }
    let (_, decisions) = round(&FanOut(8), &config, history.build());
    assert_eq!(activity_ids(&decisions), vec!["5", "6", "7"]);
}

fn fail_after_schedules(ctx: &mut WorkflowContext<'_>, _input: Value) -> Result<Value, Interrupt> {
    let proxy = ActivityProxy::new("part", "1");
    for i in 0..3 {
        let _: Call<Value> = ctx.call(&proxy, &i);
    }
    Err(Interrupt::Fail("boom".into()))
}

#[test]
fn failure_discards_pending_schedules() {
    let (outcome, decisions) = round(&FnWorkflow(fail_after_schedules), &config(), start().build());
    assert_eq!(outcome, RoundOutcome::Failed { reason: "boom".into() });
    assert_eq!(decisions, vec![Decision::FailWorkflowExecution { reason: "boom".into() }]);
}

// ============================================================================
// Outstanding work and failures
// ============================================================================

fn fire_and_forget(ctx: &mut WorkflowContext<'_>, _input: Value) -> Result<Value, Interrupt> {
    let _: Call<Value> = ctx.call(&ActivityProxy::new("notify", "1"), &());
    Ok(json!("done"))
}

#[test]
fn final_value_waits_for_outstanding_calls() {
    let wf = FnWorkflow(fire_and_forget);
    let (outcome, _) = round(&wf, &config(), start().build());
    assert_eq!(outcome, RoundOutcome::Suspended { scheduled: 1 });

    let (outcome, decisions) = round(&wf, &config(), start().schedule_activity(0).build());
    assert_eq!(outcome, RoundOutcome::Suspended { scheduled: 0 });
    assert!(decisions.is_empty());

    let history = start().schedule_activity(0).complete_activity(0, "null");
    let (outcome, _) = round(&wf, &config(), history.build());
    assert_eq!(
        outcome,
        RoundOutcome::Completed {
            result: "\"done\"".into()
        }
    );
}

#[test]
fn failed_activity_fails_the_workflow() {
    let history = start().schedule_activity(0).fail_activity(0, "nope");
    let (outcome, _) = round(&FnWorkflow(fetch_with_retry), &config(), history.build());
    assert_eq!(outcome, RoundOutcome::Failed { reason: "nope".into() });
}

fn child_plus_one(ctx: &mut WorkflowContext<'_>, _input: Value) -> Result<Value, Interrupt> {
    let child = WorkflowProxy::new("Child", "1").with_workflow_duration(60);
    let n: i64 = ctx.call(&child, &json!({ "seed": 1 })).value()?;
    Ok(json!(n + 1))
}

#[test]
fn sub_workflow_ids_embed_the_call_id() {
    let wf = FnWorkflow(child_plus_one);
    let (_, decisions) = round(&wf, &config(), start().build());
    match &decisions[..] {
        [Decision::StartChildWorkflowExecution { workflow_id, input, .. }] => {
            assert!(workflow_id.ends_with("-0"));
            assert_eq!(workflow_id.len(), 36 + 2);
            assert_eq!(input, r#"{"seed":1}"#);
        }
        other => panic!("unexpected {other:?}"),
    }

    let history = start().initiate_child(0).complete_child(0, "6");
    let (outcome, _) = round(&wf, &config(), history.build());
    assert_eq!(outcome, RoundOutcome::Completed { result: "7".into() });
}

fn first_to_finish(ctx: &mut WorkflowContext<'_>, _input: Value) -> Result<Value, Interrupt> {
    let proxy = ActivityProxy::new("race", "1");
    let a: Call<String> = ctx.call(&proxy, &"a");
    let b: Call<String> = ctx.call(&proxy, &"b");
    let order = ctx.finish_order(&[&a, &b]);
    let Some(&winner) = order.first() else {
        return Err(Interrupt::Suspend);
    };
    let winner = if winner == 0 { a } else { b };
    winner.value().map(Value::String)
}

#[test]
fn finish_order_picks_the_earliest_arrival() {
    let history = start()
        .schedule_activity(0)
        .schedule_activity(1)
        .complete_activity(1, "\"b\"");
    let (outcome, _) = round(&FnWorkflow(first_to_finish), &config(), history.build());
    // call 0 is still running, so the value waits
    assert_eq!(outcome, RoundOutcome::Suspended { scheduled: 0 });

    let history = start()
        .schedule_activity(0)
        .schedule_activity(1)
        .complete_activity(1, "\"b\"")
        .complete_activity(0, "\"a\"");
    let (outcome, _) = round(&FnWorkflow(first_to_finish), &config(), history.build());
    assert_eq!(outcome, RoundOutcome::Completed { result: "\"b\"".into() });
}

#[test]
fn undecodable_input_fails_the_round() {
    let history = HistoryBuilder::started("Flow", "1", Some("{not json"));
    let (outcome, decisions) = round(&FnWorkflow(constant), &config(), history.build());
    assert!(matches!(outcome, RoundOutcome::Failed { ref reason } if reason.starts_with("decode:")));
    assert!(matches!(decisions[..], [Decision::FailWorkflowExecution { .. }]));
}

#[test]
fn corrupt_history_fails_the_round() {
    let mut events = start().build();
    events.push(replayflow::Event::new(
        2,
        replayflow::EventKind::ActivityTaskCompleted {
            scheduled_event_id: 99,
            result: None,
        },
    ));
    let (outcome, _) = round(&FnWorkflow(constant), &config(), events);
    assert!(matches!(outcome, RoundOutcome::Failed { ref reason } if reason.starts_with("history:")));
}

// ============================================================================
// Sub-workflow retries and rejected schedules
// ============================================================================

fn child_with_retry(ctx: &mut WorkflowContext<'_>, _input: Value) -> Result<Value, Interrupt> {
    let child = WorkflowProxy::new("Child", "1").with_retry(2);
    ctx.call(&child, &()).value()
}

#[test]
fn timed_out_or_canceled_child_is_retried_on_the_next_id() {
    let wf = FnWorkflow(child_with_retry);

    let history = start().initiate_child(0).time_out_child(0);
    let (outcome, decisions) = round(&wf, &config(), history.build());
    assert_eq!(outcome, RoundOutcome::Suspended { scheduled: 1 });
    assert_eq!(child_ids(&decisions), vec!["1"]);

    let history = start()
        .initiate_child(0)
        .time_out_child(0)
        .initiate_child(1)
        .cancel_child(1);
    let (_, decisions) = round(&wf, &config(), history.build());
    assert_eq!(child_ids(&decisions), vec!["2"]);

    let history = start()
        .initiate_child(0)
        .time_out_child(0)
        .initiate_child(1)
        .cancel_child(1)
        .initiate_child(2)
        .terminate_child(2);
    let (outcome, _) = round(&wf, &config(), history.build());
    assert_eq!(outcome, RoundOutcome::Failed { reason: "timed out".into() });
}

#[test]
fn failed_child_is_not_retried() {
    let history = start().initiate_child(0).fail_child(0, "child broke");
    let (outcome, decisions) = round(&FnWorkflow(child_with_retry), &config(), history.build());
    assert_eq!(outcome, RoundOutcome::Failed { reason: "child broke".into() });
    assert!(child_ids(&decisions).is_empty());
}

#[test]
fn rejected_child_start_fails_instead_of_waiting() {
    let history = start()
        .initiate_child(0)
        .fail_child_start(0, "WORKFLOW_TYPE_DOES_NOT_EXIST");
    let (outcome, _) = round(&FnWorkflow(child_plus_one), &config(), history.build());
    assert_eq!(
        outcome,
        RoundOutcome::Failed {
            reason: "WORKFLOW_TYPE_DOES_NOT_EXIST".into()
        }
    );
}

#[test]
fn rejected_activity_schedule_fails_instead_of_waiting() {
    let history = start()
        .schedule_activity(0)
        .fail_activity_schedule(0, "ACTIVITY_TYPE_DEPRECATED");
    let (outcome, _) = round(&FnWorkflow(fetch_with_retry), &config(), history.build());
    assert_eq!(
        outcome,
        RoundOutcome::Failed {
            reason: "ACTIVITY_TYPE_DEPRECATED".into()
        }
    );
}

// ============================================================================
// Configured dependencies
// ============================================================================

fn resize_dependency(ctx: &mut WorkflowContext<'_>, input: Value) -> Result<Value, Interrupt> {
    let resize = ctx.dependency("resize")?;
    let out: String = ctx.call(resize, &input).value()?;
    Ok(json!(out))
}

#[test]
fn configured_dependency_is_called_through_the_context() {
    let config = config().conf("resize", ActivityProxy::new("ImageResize", "2").with_retry(1));
    let wf = FnWorkflow(resize_dependency);

    let (_, decisions) = round(&wf, &config, start().build());
    match &decisions[..] {
        [Decision::ScheduleActivityTask {
            activity_id,
            activity_type,
            ..
        }] => {
            assert_eq!(activity_id, "0");
            assert_eq!(activity_type.name, "ImageResize");
            assert_eq!(activity_type.version, "2");
        }
        other => panic!("unexpected {other:?}"),
    }

    let history = start().schedule_activity(0).time_out_activity(0);
    let (_, decisions) = round(&wf, &config, history.build());
    assert_eq!(activity_ids(&decisions), vec!["1"]);

    let history = start()
        .schedule_activity(0)
        .time_out_activity(0)
        .schedule_activity(1)
        .complete_activity(1, "\"small.png\"");
    let (outcome, _) = round(&wf, &config, history.build());
    assert_eq!(
        outcome,
        RoundOutcome::Completed {
            result: "\"small.png\"".into()
        }
    );
}

#[test]
fn missing_dependency_fails_the_workflow() {
    let (outcome, decisions) = round(&FnWorkflow(resize_dependency), &config(), start().build());
    assert_eq!(
        outcome,
        RoundOutcome::Failed {
            reason: "unknown dependency: resize".into()
        }
    );
    assert!(matches!(decisions[..], [Decision::FailWorkflowExecution { .. }]));
}
