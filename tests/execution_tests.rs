//! End-to-end execution through a real interpreter
//!
//! Every test here skips when python3 is not available.

mod common;

use std::collections::BTreeMap;

use pydsl::assembler::MAX_LITERAL_DEPTH;
use pydsl::{
    AssemblyError, EngineConfig, ExecutionEngine, InvocationRequest, InvocationResult,
    PyDslError, TransportValue,
};

const ARITHMETIC: &str = "def add(a, b):\n    return a + b";
const IDENTITY: &str = "def identity(value):\n    return value";

fn value(result: InvocationResult) -> TransportValue {
    match result {
        InvocationResult::Value(value) => value,
        InvocationResult::Fault(fault) => panic!("expected a value, got {}", fault),
    }
}

fn fault_category(result: &InvocationResult) -> &str {
    &result.fault().expect("expected a fault").category
}

fn nested_list(depth: usize) -> TransportValue {
    (0..depth).fold(TransportValue::Integer(0), |inner, _| {
        TransportValue::List(vec![inner])
    })
}

#[tokio::test]
async fn test_add_returns_sum() {
    let Some(engine) = common::start_engine(1).await else {
        return;
    };
    let snapshot = common::fragments(&[ARITHMETIC]);

    let result = engine
        .execute(&snapshot, &InvocationRequest::new("add").arg(2i64).arg(3i64))
        .await
        .unwrap();
    assert_eq!(value(result), TransportValue::Integer(5));

    engine.shutdown().await;
}

#[tokio::test]
async fn test_missing_argument_is_type_error() {
    let Some(engine) = common::start_engine(1).await else {
        return;
    };
    let snapshot = common::fragments(&[ARITHMETIC]);

    let result = engine
        .execute(&snapshot, &InvocationRequest::new("add").arg(2i64))
        .await
        .unwrap();
    let fault = result.fault().unwrap();
    assert_eq!(fault.entry_point, "add");
    assert_eq!(fault.category, "TypeError");
    assert!(fault.message.contains("missing 1 required positional argument"));

    engine.shutdown().await;
}

#[tokio::test]
async fn test_undefined_entry_point_is_name_error() {
    let Some(engine) = common::start_engine(1).await else {
        return;
    };
    let snapshot = common::fragments(&[ARITHMETIC]);

    let result = engine
        .execute(&snapshot, &InvocationRequest::new("subtract"))
        .await
        .unwrap();
    assert_eq!(fault_category(&result), "NameError");
    assert!(result.fault().unwrap().message.contains("subtract"));

    engine.shutdown().await;
}

#[tokio::test]
async fn test_identity_round_trip() {
    let Some(engine) = common::start_engine(2).await else {
        return;
    };
    let snapshot = common::fragments(&[IDENTITY]);

    let mut nested = BTreeMap::new();
    nested.insert("list".to_string(), TransportValue::from(vec![1i64, 2, 3]));
    nested.insert("empty".to_string(), TransportValue::Map(BTreeMap::new()));
    nested.insert("none".to_string(), TransportValue::Null);
    nested.insert("with \"quotes\"".to_string(), TransportValue::from(0.25f64));

    let samples = vec![
        TransportValue::Null,
        TransportValue::Bool(true),
        TransportValue::Bool(false),
        TransportValue::Integer(0),
        TransportValue::Integer(-42),
        TransportValue::Integer(i64::MAX),
        TransportValue::Integer(i64::MIN),
        TransportValue::Float(2.0),
        TransportValue::Float(-1.5),
        TransportValue::Float(0.1),
        TransportValue::Float(1e300),
        TransportValue::String(String::new()),
        TransportValue::from("line one\nline two\ttabbed \"quoted\" \\ back"),
        TransportValue::from("nul\u{0} bell\u{7} del\u{7f}"),
        TransportValue::from("héllo wörld 🦀"),
        TransportValue::List(vec![]),
        TransportValue::List(vec![
            TransportValue::Null,
            TransportValue::from("x"),
            TransportValue::List(vec![TransportValue::Bool(true)]),
        ]),
        TransportValue::Map(nested),
    ];

    for sample in samples {
        let result = engine
            .execute(&snapshot, &InvocationRequest::new("identity").arg(sample.clone()))
            .await
            .unwrap();
        assert_eq!(value(result), sample);
    }

    engine.shutdown().await;
}

#[tokio::test]
async fn test_module_state_does_not_leak_between_invocations() {
    let Some(engine) = common::start_engine(1).await else {
        return;
    };
    let snapshot = common::fragments(&[
        "counter = 0",
        "def bump():\n    global counter\n    counter += 1\n    return counter",
    ]);

    for _ in 0..3 {
        let result = engine
            .execute(&snapshot, &InvocationRequest::new("bump"))
            .await
            .unwrap();
        assert_eq!(value(result), TransportValue::Integer(1));
    }

    engine.shutdown().await;
}

#[tokio::test]
async fn test_fragments_see_each_other_and_imports() {
    let Some(engine) = common::start_engine(1).await else {
        return;
    };
    let snapshot = common::fragments(&[
        "import math",
        "def double(x):\n    return 2 * x",
        "def hypot_doubled(a, b):\n    return double(math.hypot(a, b))",
    ]);

    let result = engine
        .execute(
            &snapshot,
            &InvocationRequest::new("hypot_doubled").arg(3i64).arg(4i64),
        )
        .await
        .unwrap();
    assert_eq!(value(result), TransportValue::Float(10.0));

    engine.shutdown().await;
}

#[tokio::test]
async fn test_keyword_arguments() {
    let Some(engine) = common::start_engine(1).await else {
        return;
    };
    let snapshot = common::fragments(&[
        "def greet(name, greeting='hello'):\n    return greeting + ', ' + name",
    ]);

    let request = InvocationRequest::new("greet")
        .kwarg("name", "world")
        .kwarg("greeting", "hi");
    let result = engine.execute(&snapshot, &request).await.unwrap();
    assert_eq!(value(result), TransportValue::from("hi, world"));

    let request = InvocationRequest::new("greet").kwarg("nme", "typo");
    let result = engine.execute(&snapshot, &request).await.unwrap();
    assert_eq!(fault_category(&result), "TypeError");

    engine.shutdown().await;
}

#[tokio::test]
async fn test_raised_exception_keeps_type_and_message() {
    let Some(engine) = common::start_engine(1).await else {
        return;
    };
    let snapshot = common::fragments(&[
        "class QuotaExceeded(Exception):\n    pass",
        "def charge(amount):\n    raise QuotaExceeded('limit is 10, asked for %d' % amount)",
    ]);

    let result = engine
        .execute(&snapshot, &InvocationRequest::new("charge").arg(11i64))
        .await
        .unwrap();
    let fault = result.fault().unwrap();
    assert_eq!(fault.category, "QuotaExceeded");
    assert_eq!(fault.message, "limit is 10, asked for 11");
    assert!(!fault.message.contains("Traceback"));

    engine.shutdown().await;
}

#[tokio::test]
async fn test_syntax_error_in_fragments() {
    let Some(engine) = common::start_engine(1).await else {
        return;
    };
    let snapshot = common::fragments(&["def broken(:\n    return 1"]);

    let result = engine
        .execute(&snapshot, &InvocationRequest::new("broken"))
        .await
        .unwrap();
    assert_eq!(fault_category(&result), "SyntaxError");

    engine.shutdown().await;
}

#[tokio::test]
async fn test_system_exit_does_not_kill_worker() {
    let Some(engine) = common::start_engine(1).await else {
        return;
    };
    let snapshot = common::fragments(&[
        "import sys\ndef leave():\n    sys.exit(3)",
        ARITHMETIC,
    ]);

    let result = engine
        .execute(&snapshot, &InvocationRequest::new("leave"))
        .await
        .unwrap();
    assert_eq!(fault_category(&result), "SystemExit");

    let result = engine
        .execute(&snapshot, &InvocationRequest::new("add").arg(1i64).arg(1i64))
        .await
        .unwrap();
    assert_eq!(value(result), TransportValue::Integer(2));
    assert_eq!(engine.stats().crashed, 0);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_unserializable_result_is_a_fault() {
    let Some(engine) = common::start_engine(1).await else {
        return;
    };
    let snapshot = common::fragments(&[
        "def make_set():\n    return {1, 2}",
        "def make_nan():\n    return float('nan')",
        "def make_deep():\n    v = 0\n    for _ in range(150):\n        v = [v]\n    return v",
    ]);

    let result = engine
        .execute(&snapshot, &InvocationRequest::new("make_set"))
        .await
        .unwrap();
    assert_eq!(fault_category(&result), "TypeError");

    let result = engine
        .execute(&snapshot, &InvocationRequest::new("make_nan"))
        .await
        .unwrap();
    assert_eq!(fault_category(&result), "ValueError");

    let result = engine
        .execute(&snapshot, &InvocationRequest::new("make_deep"))
        .await
        .unwrap();
    assert_eq!(fault_category(&result), "ValueError");
    assert_eq!(engine.stats().crashed, 0);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_print_does_not_corrupt_reply() {
    let Some(engine) = common::start_engine(1).await else {
        return;
    };
    let snapshot = common::fragments(&[
        "def chatty():\n    print('{\"status\": \"ok\", \"value\": 666}')\n    return 'quiet'",
    ]);

    let result = engine
        .execute(&snapshot, &InvocationRequest::new("chatty"))
        .await
        .unwrap();
    assert_eq!(value(result), TransportValue::from("quiet"));

    engine.shutdown().await;
}

#[tokio::test]
async fn test_integers_beyond_i64_are_overflow_faults() {
    let Some(engine) = common::start_engine(1).await else {
        return;
    };
    let snapshot = common::fragments(&[
        "def big():\n    return 2 ** 63",
        "def nested_big():\n    return {'ok': [1, -(2 ** 63) - 1]}",
        "def edges():\n    return [-(2 ** 63), 2 ** 63 - 1]",
    ]);

    for entry_point in ["big", "nested_big"] {
        let result = engine
            .execute(&snapshot, &InvocationRequest::new(entry_point))
            .await
            .unwrap();
        assert_eq!(fault_category(&result), "OverflowError", "{}", entry_point);
    }

    let result = engine
        .execute(&snapshot, &InvocationRequest::new("edges"))
        .await
        .unwrap();
    assert_eq!(
        value(result),
        TransportValue::List(vec![
            TransportValue::Integer(i64::MIN),
            TransportValue::Integer(i64::MAX)
        ])
    );
    assert_eq!(engine.stats().crashed, 0);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_injected_modules_do_not_leak_between_invocations() {
    let Some(engine) = common::start_engine(1).await else {
        return;
    };
    let snapshot = common::fragments(&[
        "import sys, types",
        "def bump():\n    state = sys.modules.setdefault('userstate', types.ModuleType('userstate'))\n    state.n = getattr(state, 'n', 0) + 1\n    return state.n",
        "def imported():\n    return 'userstate' in sys.modules",
    ]);

    for _ in 0..3 {
        let result = engine
            .execute(&snapshot, &InvocationRequest::new("bump"))
            .await
            .unwrap();
        assert_eq!(value(result), TransportValue::Integer(1));
    }

    let result = engine
        .execute(&snapshot, &InvocationRequest::new("imported"))
        .await
        .unwrap();
    assert_eq!(value(result), TransportValue::Bool(false));

    engine.shutdown().await;
}

#[tokio::test]
async fn test_deepest_accepted_argument_compiles() {
    let Some(python) = common::python() else {
        return;
    };
    let config = EngineConfig {
        interpreter: python,
        pool_size: 1,
        max_literal_depth: MAX_LITERAL_DEPTH,
        shutdown_grace_ms: 500,
        ..EngineConfig::default()
    };
    config.validate().unwrap();
    let engine = ExecutionEngine::start(&config).await.unwrap();
    let snapshot = common::fragments(&[
        "def depth(value):\n    levels = 0\n    while isinstance(value, list):\n        value = value[0]\n        levels += 1\n    return levels",
    ]);

    let deepest = nested_list(MAX_LITERAL_DEPTH - 1);
    let result = engine
        .execute(&snapshot, &InvocationRequest::new("depth").arg(deepest.clone()))
        .await
        .unwrap();
    assert_eq!(value(result), TransportValue::Integer(MAX_LITERAL_DEPTH as i64 - 1));

    let result = engine
        .execute(&snapshot, &InvocationRequest::new("depth").kwarg("value", deepest))
        .await
        .unwrap();
    assert_eq!(value(result), TransportValue::Integer(MAX_LITERAL_DEPTH as i64 - 1));

    let err = engine
        .execute(
            &snapshot,
            &InvocationRequest::new("depth").arg(nested_list(MAX_LITERAL_DEPTH)),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PyDslError::Assembly(AssemblyError::NestingTooDeep { .. })
    ));
    assert_eq!(engine.stats().dispatched, 2);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_worker_exit_is_infrastructure_fault() {
    let Some(engine) = common::start_engine(1).await else {
        return;
    };
    let snapshot = common::fragments(&[
        "import os\ndef die():\n    os._exit(7)",
        ARITHMETIC,
    ]);

    let result = engine
        .execute(&snapshot, &InvocationRequest::new("die"))
        .await
        .unwrap();
    let fault = result.fault().unwrap();
    assert_eq!(fault.category, "infrastructure");
    assert!(fault.message.contains("status 7"), "{}", fault.message);

    let result = engine
        .execute(&snapshot, &InvocationRequest::new("add").arg(2i64).arg(3i64))
        .await
        .unwrap();
    assert_eq!(value(result), TransportValue::Integer(5));

    let stats = engine.stats();
    assert_eq!(stats.crashed, 1);
    assert_eq!(stats.replaced, 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_killed_worker_is_infrastructure_fault() {
    let Some(engine) = common::start_engine(1).await else {
        return;
    };
    let snapshot = common::fragments(&[
        "import os, signal\ndef vanish():\n    os.kill(os.getpid(), signal.SIGKILL)",
    ]);

    let result = engine
        .execute(&snapshot, &InvocationRequest::new("vanish"))
        .await
        .unwrap();
    let fault = result.fault().unwrap();
    assert_eq!(fault.category, "infrastructure");
    assert!(fault.message.contains("signal 9"), "{}", fault.message);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_unrepresentable_argument_never_dispatched() {
    let Some(engine) = common::start_engine(1).await else {
        return;
    };
    let snapshot = common::fragments(&[IDENTITY]);

    let request = InvocationRequest::new("identity").kwarg(
        "value",
        TransportValue::from(vec![TransportValue::Float(f64::NAN)]),
    );
    let err = engine.execute(&snapshot, &request).await.unwrap_err();
    match err {
        PyDslError::Assembly(e) => assert!(e.to_string().contains("kwargs[\"value\"][0]")),
        other => panic!("unexpected error: {}", other),
    }

    let err = engine
        .execute(&snapshot, &InvocationRequest::new("import"))
        .await
        .unwrap_err();
    assert!(matches!(err, PyDslError::Assembly(_)));

    assert_eq!(engine.stats().dispatched, 0);

    engine.shutdown().await;
}
