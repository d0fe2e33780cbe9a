//! End-to-end runs over file-backed value stores.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{counting_add, counting_mul};
use uberjob::stores::{JsonFileStore, PathSource, TouchFileStore};
use uberjob::{run, CallArgs, Plan, Registry, RunOptions, Sym, SymFn, Value};

fn options() -> RunOptions {
    RunOptions::default().with_max_workers(4)
}

#[test]
fn a_pipeline_of_json_stores_persists_and_replays_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let adds = Arc::new(AtomicUsize::new(0));
    let muls = Arc::new(AtomicUsize::new(0));
    let add = counting_add(adds.clone());
    let mul = counting_mul(muls.clone());

    let mut plan = Plan::new();
    let mut registry = Registry::new();
    let x = plan.call(&add, CallArgs::new().arg(1).arg(2)).expect("x");
    let y = plan.call(&add, CallArgs::new().arg(3).arg(4)).expect("y");
    let z = plan.call(&mul, CallArgs::new().arg(x).arg(y)).expect("z");
    registry
        .add(x, Arc::new(JsonFileStore::new(dir.path().join("x.json"))))
        .expect("add x");
    registry
        .add(y, Arc::new(JsonFileStore::new(dir.path().join("y.json"))))
        .expect("add y");
    registry
        .add(z, Arc::new(JsonFileStore::new(dir.path().join("z.json"))))
        .expect("add z");

    let result = run(&plan, Some(&registry), Some(Sym::from(z)), &options()).expect("first run");
    assert_eq!(result, Some(Value::Int(21)));

    let on_disk: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("z.json")).expect("read z.json"),
    )
    .expect("parse z.json");
    assert_eq!(on_disk, serde_json::json!(21));

    // Everything is fresh on disk: the replay runs no user calls.
    adds.store(0, Ordering::SeqCst);
    muls.store(0, Ordering::SeqCst);
    let replayed = run(&plan, Some(&registry), Some(Sym::from(z)), &options()).expect("replay");
    assert_eq!(replayed, Some(Value::Int(21)));
    assert_eq!(adds.load(Ordering::SeqCst), 0);
    assert_eq!(muls.load(Ordering::SeqCst), 0);

    // Deleting x's file rebuilds x and z but reuses y.
    std::fs::remove_file(dir.path().join("x.json")).expect("delete x.json");
    let rebuilt = run(&plan, Some(&registry), Some(Sym::from(z)), &options()).expect("rebuild");
    assert_eq!(rebuilt, Some(Value::Int(21)));
    assert_eq!(adds.load(Ordering::SeqCst), 1, "only x reran");
    assert_eq!(muls.load(Ordering::SeqCst), 1, "z reran from stored y");
}

#[test]
fn json_serialization_effects_are_visible_to_consumers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pair = SymFn::nullary("pair", || {
        Ok(Value::Tuple(vec![Value::Int(1), Value::Int(2)]))
    });
    let identity = SymFn::unary("identity", "value", Ok);

    let mut plan = Plan::new();
    let mut registry = Registry::new();
    let stored = plan.call(&pair, ()).expect("call");
    let consumer = plan.call(&identity, CallArgs::new().arg(stored)).expect("call");
    registry
        .add(stored, Arc::new(JsonFileStore::new(dir.path().join("pair.json"))))
        .expect("add");

    let result = run(&plan, Some(&registry), Some(Sym::from(consumer)), &options()).expect("run");
    // JSON has no tuples; the consumer sees the round-tripped list.
    assert_eq!(result, Some(Value::List(vec![Value::Int(1), Value::Int(2)])));
}

#[test]
fn path_sources_feed_file_reading_calls() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input_path = dir.path().join("input.txt");
    std::fs::write(&input_path, "41").expect("write input");

    let read_number = SymFn::unary("read_number", "path", |value| {
        let path = value
            .as_path()
            .ok_or_else(|| anyhow::anyhow!("expected a path"))?;
        let text = std::fs::read_to_string(path)?;
        Ok(Value::Int(text.trim().parse::<i64>()?))
    });

    let mut plan = Plan::new();
    let mut registry = Registry::new();
    let source = registry.source(&mut plan, Arc::new(PathSource::new(&input_path)));
    let parsed = plan.call(&read_number, CallArgs::new().arg(source)).expect("call");
    let bumped = plan
        .call(
            &counting_add(Arc::new(AtomicUsize::new(0))),
            CallArgs::new().arg(parsed).arg(1),
        )
        .expect("call");

    let result = run(&plan, Some(&registry), Some(Sym::from(bumped)), &options()).expect("run");
    assert_eq!(result, Some(Value::Int(42)));
}

#[test]
fn touch_files_record_side_effects() {
    let dir = tempfile::tempdir().expect("tempdir");
    let marker = dir.path().join("done.touch");
    let side_effects = Arc::new(AtomicUsize::new(0));
    let side_effect = {
        let side_effects = side_effects.clone();
        SymFn::nullary("side_effect", move || {
            side_effects.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        })
    };

    let mut plan = Plan::new();
    let mut registry = Registry::new();
    let effect = plan.call(&side_effect, ()).expect("call");
    registry
        .add(effect, Arc::new(TouchFileStore::new(&marker)))
        .expect("add");

    run(&plan, Some(&registry), None, &options()).expect("first run");
    assert!(marker.exists());
    assert_eq!(side_effects.load(Ordering::SeqCst), 1);

    run(&plan, Some(&registry), None, &options()).expect("second run");
    assert_eq!(side_effects.load(Ordering::SeqCst), 1, "the touch file is fresh");
}
