//! Compound (streaming join) plans resolved through the engine.

mod common;

use std::collections::BTreeSet;

use common::{run, sorted};
use pullflow_core::config::EngineConfig;
use pullflow_core::id::StepId;
use pullflow_core::plan::Plan;
use pullflow_exec::{Engine, ExecError};
use pullflow_reactive::{merge_fn, spawn_fn, Builder, MergeFn, ReactiveError, SpawnFn};

/// A row of `column=value` facts.
type Facts = BTreeSet<String>;

fn facts(items: &[&str]) -> Facts {
    items.iter().map(|s| s.to_string()).collect()
}

fn lookup<'a>(row: &'a Facts, column: &str) -> Option<&'a str> {
    let prefix = format!("{column}=");
    row.iter().find_map(|f| f.strip_prefix(prefix.as_str()))
}

/// people -> the cities they lived in -> the languages spoken there
fn directory() -> SpawnFn<Facts> {
    spawn_fn(|b: &mut Builder<'_, Facts>, step: &StepId, seed: &Facts| {
        let rows: Vec<Facts> = match step.as_str() {
            "person" => vec![facts(&["person=ann"]), facts(&["person=bob"])],
            "city" => match lookup(seed, "person") {
                Some("ann") => vec![facts(&["city=oslo"]), facts(&["city=lima"])],
                Some("bob") => vec![facts(&["city=rome"])],
                _ => Vec::new(),
            },
            "lang" => match lookup(seed, "city") {
                Some("lima") => vec![facts(&["lang=es"])],
                Some("rome") => vec![facts(&["lang=it"]), facts(&["lang=la"])],
                _ => Vec::new(),
            },
            other => {
                return Err(ReactiveError::Spawn {
                    step: StepId::new(other),
                    reason: "no such relation".into(),
                })
            }
        };
        Ok(b.source(rows))
    })
}

fn union() -> MergeFn<Facts> {
    merge_fn(|acc: &Facts, row: &Facts| Ok(acc.union(row).cloned().collect()))
}

fn engine(cfg: EngineConfig) -> Engine<Facts> {
    Engine::new(cfg).unwrap()
}

#[test]
fn test_two_step_join() {
    let mut engine = engine(EngineConfig::default());
    let plan = Plan::new(["person", "city"]).unwrap();
    let res = engine
        .resolve(&plan, Facts::new(), directory(), union())
        .unwrap();

    assert_eq!(
        sorted(&res.answers),
        vec![
            facts(&["city=lima", "person=ann"]),
            facts(&["city=oslo", "person=ann"]),
            facts(&["city=rome", "person=bob"]),
        ]
    );
    assert!(res.report.terminated);
    assert_eq!(res.report.ledger.forks, 2);
}

#[test]
fn test_three_step_join_skips_dead_ends() {
    let mut engine = engine(EngineConfig::default());
    let plan = Plan::new(["person", "city", "lang"]).unwrap();
    let res = engine
        .resolve(&plan, facts(&["query=1"]), directory(), union())
        .unwrap();

    // oslo has no language rows, so ann only reaches lima
    assert_eq!(
        sorted(&res.answers),
        vec![
            facts(&["city=lima", "lang=es", "person=ann", "query=1"]),
            facts(&["city=rome", "lang=it", "person=bob", "query=1"]),
            facts(&["city=rome", "lang=la", "person=bob", "query=1"]),
        ]
    );
    assert!(res.report.terminated);
    let ledger = res.report.ledger;
    assert_eq!(ledger.answers, 0);
    assert_eq!(ledger.frontiers, 0);
    // two people, then three cities
    assert_eq!(ledger.forks, 5);
}

#[test]
fn test_failing_later_step_reports_collaborator() {
    let mut engine = engine(EngineConfig::default());
    let plan = Plan::new(["person", "missing"]).unwrap();
    let err = engine
        .resolve(&plan, Facts::new(), directory(), union())
        .unwrap_err();
    match err {
        ExecError::Collaborator { source, .. } => {
            assert!(matches!(source, ReactiveError::Spawn { step, .. } if step.as_str() == "missing"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_failing_merge_reports_collaborator() {
    let mut engine = engine(EngineConfig::default());
    let plan = Plan::new(["person"]).unwrap();
    let refuse = merge_fn(|_: &Facts, row: &Facts| {
        Err(ReactiveError::Merge(format!("cannot merge {row:?}")))
    });
    let err = engine
        .resolve(&plan, Facts::new(), directory(), refuse)
        .unwrap_err();
    assert!(matches!(
        err,
        ExecError::Collaborator {
            source: ReactiveError::Merge(_),
            ..
        }
    ));
}

#[test]
fn test_unknown_leading_step_fails_to_wire() {
    let mut engine = engine(EngineConfig::default());
    let plan = Plan::new(["missing", "person"]).unwrap();
    let err = engine
        .resolve(&plan, Facts::new(), directory(), union())
        .unwrap_err();
    assert!(matches!(err, ExecError::Build(ReactiveError::Spawn { .. })));
    // the half-built context is gone again
    assert!(engine.scheduler().context_ids().next().is_none());
}

#[test]
fn test_answer_limit_cuts_the_join_short() {
    let mut engine = engine(EngineConfig {
        answer_limit: Some(2),
        ..EngineConfig::default()
    });
    let plan = Plan::new(["person", "city", "lang"]).unwrap();
    let res = engine
        .resolve(&plan, Facts::new(), directory(), union())
        .unwrap();
    assert_eq!(res.answers.len(), 2);
    assert_eq!(res.report.answers, 2);
}

#[test]
fn test_repeated_resolves_get_fresh_executions() {
    let mut engine = engine(EngineConfig::default());
    let plan = Plan::new(["person", "city"]).unwrap();
    let first = engine
        .resolve(&plan, Facts::new(), directory(), union())
        .unwrap();
    let second = engine
        .resolve(&plan, Facts::new(), directory(), union())
        .unwrap();

    assert_ne!(first.report.execution, second.report.execution);
    assert_eq!(sorted(&first.answers), sorted(&second.answers));
    assert_eq!(first.report.plan_hash, second.report.plan_hash);
    assert_eq!(engine.scheduler().monitor().executions().count(), 0);
}

#[test]
fn test_report_serializes_to_json() {
    let mut engine = engine(EngineConfig::default());
    let plan = Plan::new(["person", "city"]).unwrap();
    let res = engine
        .resolve(&plan, Facts::new(), directory(), union())
        .unwrap();

    let json = serde_json::to_value(&res.report).unwrap();
    assert_eq!(json["answers"], 3);
    assert_eq!(json["terminated"], true);
    assert_eq!(json["ledger"]["forks"], 2);
    assert!(json["plan_hash"].is_array());

    let back: pullflow_core::report::ExecutionReport = serde_json::from_value(json).unwrap();
    assert_eq!(back.execution, res.report.execution);
    assert_eq!(back.ledger, res.report.ledger);
}

/// step `a` yields 1, `b` yields 10 and 20, `c` yields 1000
fn digits() -> SpawnFn<i64> {
    spawn_fn(|b: &mut Builder<'_, i64>, step: &StepId, _seed: &i64| {
        let rows = match step.as_str() {
            "a" => vec![1],
            "b" => vec![10, 20],
            "c" => vec![1000],
            other => {
                return Err(ReactiveError::Spawn {
                    step: StepId::new(other),
                    reason: "no such relation".into(),
                })
            }
        };
        Ok(b.source(rows))
    })
}

#[test]
fn test_three_step_sum_adds_every_row_once() {
    let mut engine: Engine<i64> = Engine::new(EngineConfig::default()).unwrap();
    let plan = Plan::new(["a", "b", "c"]).unwrap();
    let add = merge_fn(|acc: &i64, row: &i64| Ok(acc + row));
    let res = engine.resolve(&plan, 100, digits(), add).unwrap();

    assert_eq!(sorted(&res.answers), vec![1111, 1121]);
    assert!(res.report.terminated);
    assert_eq!(res.report.ledger.answers, 0);
}

#[test]
fn test_find_first_over_a_join_terminates() {
    let plan = Plan::new(["person", "city", "lang"]).unwrap();
    let res = run(2, |cx, e| {
        let join = cx[0]
            .builder(e)
            .compound(&plan, Facts::new(), directory(), union())
            .unwrap();
        let first = cx[1].builder(e).find_first(join);
        cx[0].builder(e).sink(first, None).1
    });

    assert_eq!(res.answers.len(), 1);
    assert!(lookup(&res.answers[0], "lang").is_some());
    assert!(res.report.terminated);
    let ledger = res.report.ledger;
    assert_eq!(ledger.answers, 0);
    assert_eq!(ledger.frontiers, 0);
}
