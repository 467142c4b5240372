use leakbound_core::prelude::*;
use leakbound_core::registry::{GraphRegistry, SnapshotRegistry};
use std::rc::Rc;

fn config(width: usize) -> AnalysisConfig {
    AnalysisConfig::default().with_bit_width(width)
}

fn leakage(program: &Program, config: AnalysisConfig) -> u64 {
    let mut ctx = analyze::<BasicSec>(program, config).unwrap();
    ctx.leakage_at(BasicSec::Low, Algo::EdmondsKarp).unwrap().max_flow
}

#[test]
fn test_dump_lists_bindings_and_channels() {
    let program = Program::new(vec![
        Stmt::input_bits("h", "h", "0b0u"),
        Stmt::local("a", Expr::binary(BinOp::And, Expr::var("h"), Expr::lit(1))),
        Stmt::channel("l", "out"),
        Stmt::append("out", Expr::lit(3)),
        Stmt::output("l", "o", Expr::var("a")),
    ]);
    let ctx = analyze::<BasicSec>(&program, config(4)).unwrap();
    insta::assert_snapshot!(ctx.dump(), @r###"
    h => 0b0u
    a => 0b0u
    o => 0b0u
    out => [0b011]
    "###);
}

#[test]
fn test_program_and_config_from_json() {
    let program = Program::from_json(
        r#"{
            "functions": [
                {"name": "id", "params": ["a"], "body": [{"return": {"value": {"var": "a"}}}]}
            ],
            "body": [
                {"input": {"sec": "h", "name": "h", "bits": "0buu"}},
                {"output": {"sec": "l", "name": "o",
                    "value": {"call": {"function": "id", "args": [{"var": "h"}]}}}}
            ]
        }"#,
    )
    .unwrap();
    let config = AnalysisConfig::from_json(r#"{"bit_width": 4, "handler": "summary", "algo": "dinic"}"#).unwrap();
    assert_eq!(config.algo, Algo::Dinic);

    let mut ctx = analyze::<BasicSec>(&program, config).unwrap();
    assert_eq!(ctx.leakage_at(BasicSec::Low, Algo::Dinic).unwrap().max_flow, 2);
}

#[test]
fn test_handlers_agree_on_non_recursive_calls() {
    let program = Program::new(vec![
        Stmt::input_bits("h", "h", "0buuu"),
        Stmt::output(
            "l",
            "o",
            Expr::call("mask", vec![Expr::var("h"), Expr::lit(1)]),
        ),
    ])
    .with_function(Function::new(
        "mask",
        &["x", "m"],
        vec![Stmt::ret(Expr::binary(BinOp::And, Expr::var("x"), Expr::var("m")))],
    ));

    // the inlining handlers see the constant mask
    assert_eq!(leakage(&program, config(4).with_handler("call_string")), 1);
    assert_eq!(leakage(&program, config(4).with_handler("summary")), 1);
    // basic only knows which arguments flow in
    assert_eq!(leakage(&program, config(4).with_handler("basic")), 3);
}

#[test]
fn test_bad_handler_config_is_rejected() {
    let program = Program::new(vec![Stmt::input("h", "h")]);
    assert!(matches!(
        analyze::<BasicSec>(&program, config(4).with_handler("inline")),
        Err(FlowError::UnknownHandler(_))
    ));
    assert!(matches!(
        analyze::<BasicSec>(&program, config(4).with_handler("handler=call_string;depth=3")),
        Err(FlowError::InvalidHandlerConfig { .. })
    ));
}

#[test]
fn test_endless_loop_is_cut_off() {
    let program = Program::new(vec![
        Stmt::input("h", "h"),
        Stmt::local("i", Expr::lit(0)),
        Stmt::while_loop(
            Expr::lit(1),
            vec![Stmt::assign("i", Expr::binary(BinOp::Add, Expr::var("i"), Expr::lit(1)))],
        ),
        Stmt::output("l", "o", Expr::var("i")),
    ]);
    let mut config = config(4);
    config.max_loop_iterations = 3;
    assert_eq!(leakage(&program, config), 0);
}

#[test]
fn test_loop_not_entered_leaks_nothing() {
    let program = Program::new(vec![
        Stmt::input("h", "h"),
        Stmt::local("i", Expr::lit(0)),
        Stmt::while_loop(Expr::lit(0), vec![Stmt::assign("i", Expr::var("h"))]),
        Stmt::output("l", "o", Expr::var("i")),
    ]);
    assert_eq!(leakage(&program, config(4)), 0);
}

#[test]
fn test_stream_input_reads_are_fresh_secrets() {
    let program = Program::new(vec![
        Stmt::input_bits("h", "input", "0bu"),
        Stmt::channel("l", "out"),
        Stmt::append("out", Expr::var("input")),
        Stmt::append("out", Expr::var("input")),
    ]);
    // first bit at declaration, one more per read
    let ctx = analyze::<BasicSec>(&program, config(4)).unwrap();
    assert_eq!(ctx.input_bits().get(BasicSec::High).count(), 3);
    assert_eq!(leakage(&program, config(4)), 2);
}

#[test]
fn test_snapshot_registry_records_each_level() {
    let program = Program::new(vec![
        Stmt::input_bits("h", "h", "0bu"),
        Stmt::output("l", "o", Expr::var("h")),
    ]);
    let config = config(4);
    let handler: Rc<dyn MethodInvocationHandler> = Rc::from(parse_handler_config(&config.handler).unwrap());
    let ctx = Context::<BasicSec>::new(config).with_registry(Box::new(SnapshotRegistry::new(true)));
    let mut ctx = Interpreter::with_context(&program, ctx, handler).run().unwrap();
    ctx.compute_leakage(Algo::EdmondsKarp).unwrap();

    let low = ctx.registry().snapshot("l").unwrap();
    assert_eq!((low.sources.len(), low.sinks.len(), low.edges.len()), (1, 1, 1));
    let high = ctx.registry().snapshot("h").unwrap();
    assert!(high.sources.is_empty());
}

fn early_return() -> Function {
    Function::new(
        "f",
        &["a"],
        vec![
            Stmt::if_else(
                Expr::binary(BinOp::Eq, Expr::var("a"), Expr::lit(0)),
                vec![Stmt::ret(Expr::lit(1))],
                vec![],
            ),
            Stmt::ret(Expr::lit(0)),
        ],
    )
}

#[test]
fn test_early_return_leaks_its_condition() {
    let program = Program::new(vec![
        Stmt::input_bits("h", "h", "0buu"),
        Stmt::output("l", "o", Expr::call("f", vec![Expr::var("h")])),
    ])
    .with_function(early_return());

    assert_eq!(leakage(&program, config(4).with_handler("call_string")), 1);
    assert_eq!(leakage(&program, config(4).with_handler("summary")), 2);
    assert_eq!(leakage(&program, config(4).with_handler("basic")), 2);
}

#[test]
fn test_append_in_one_arm_leaks_condition() {
    let program = Program::new(vec![
        Stmt::input_bits("h", "h", "0buu"),
        Stmt::channel("l", "out"),
        Stmt::if_else(
            Expr::binary(BinOp::Eq, Expr::var("h"), Expr::lit(0)),
            vec![Stmt::append("out", Expr::lit(1))],
            vec![],
        ),
    ]);
    assert_eq!(leakage(&program, config(4)), 1);
}

#[test]
fn test_append_in_loop_leaks_condition() {
    let program = Program::new(vec![
        Stmt::input_bits("h", "h", "0buu"),
        Stmt::channel("l", "out"),
        Stmt::while_loop(
            Expr::binary(BinOp::Eq, Expr::var("h"), Expr::lit(0)),
            vec![Stmt::append("out", Expr::lit(1)), Stmt::assign("h", Expr::lit(1))],
        ),
    ]);
    assert_eq!(leakage(&program, config(4)), 1);
}

#[test]
fn test_callee_channel_writes_reach_every_handler() {
    let writer = Function::new(
        "g",
        &["a"],
        vec![Stmt::append("out", Expr::var("a")), Stmt::ret(Expr::lit(0))],
    );
    let relay = Function::new(
        "f",
        &["a"],
        vec![
            Stmt::Expr {
                value: Expr::call("g", vec![Expr::var("a")]),
            },
            Stmt::ret(Expr::lit(0)),
        ],
    );
    let program = |callee: &str| {
        Program::new(vec![
            Stmt::input_bits("h", "h", "0buu"),
            Stmt::channel("l", "out"),
            Stmt::Expr {
                value: Expr::call(callee, vec![Expr::var("h")]),
            },
        ])
        .with_function(writer.clone())
        .with_function(relay.clone())
    };

    for handler in ["basic", "call_string", "summary"] {
        assert_eq!(leakage(&program("g"), config(4).with_handler(handler)), 2, "{handler}");
    }
    // the write happens one call further down
    assert_eq!(leakage(&program("f"), config(4).with_handler("basic")), 2);
    assert_eq!(leakage(&program("f"), config(4).with_handler("handler=call_string;maxrec=1")), 2);
}

#[test]
fn test_outputs_declared_after_a_query_are_classified() {
    let mut ctx = Context::<BasicSec>::new(config(4));
    let h = ctx.declare_input(BasicSec::High, "h", Some("0bu")).unwrap();
    ctx.declare_output(BasicSec::Low, "o1", h).unwrap();
    assert_eq!(ctx.leakage_at(BasicSec::Low, Algo::EdmondsKarp).unwrap().max_flow, 1);

    let h2 = ctx.declare_input(BasicSec::High, "h2", Some("0buuu")).unwrap();
    ctx.declare_output(BasicSec::Low, "o2", h2).unwrap();
    assert_eq!(ctx.leakage_at(BasicSec::Low, Algo::EdmondsKarp).unwrap().max_flow, 4);
}

#[test]
fn test_multiplication_by_constants() {
    let times = |k: i64| {
        Program::new(vec![
            Stmt::input_bits("h", "h", "0buu"),
            Stmt::output("l", "o", Expr::binary(BinOp::Mul, Expr::var("h"), Expr::lit(k))),
        ])
    };
    assert_eq!(leakage(&times(0), config(4)), 0);
    assert_eq!(leakage(&times(3), config(4)), 2);
}
