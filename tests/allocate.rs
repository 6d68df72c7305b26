//! End-to-end runs from L2 text to L1 text.

use l2c::backend::analysis::{analyze, AnalysisError, KillPolicy};
use l2c::backend::arch::{x64, Register};
use l2c::backend::ir::{Node, Program, Variable};
use l2c::backend::regalloc::{allocate_function, allocate_program, AllocError, AllocatorConfig};
use l2c::frontend::{parse_program, FrontendError};

const FIB: &str = "
// iterative fibonacci, printed
(:main
  (:main 0 0
    (rdi <- 21)
    (call :fib 1)
    (rdi <- rax)
    (rdi <<= 1)
    (rdi ++)
    (call print 1)
    (return void))

  (:fib 1 0
    (%n <- rdi)
    (%a <- 0)
    (%b <- 1)
    :loop
    (cjump %n <= 0 :done)
    (%t <- %a)
    (%t += %b)
    (%a <- %b)
    (%b <- %t)
    (%n --)
    (goto :loop)
    :done
    (rax <- %a)
    (return)))
";

fn l1(src: &str, config: &AllocatorConfig) -> Program {
    let program = parse_program(src).unwrap();
    allocate_program(&program, config).unwrap()
}

#[test]
fn fibonacci_compiles_without_variables() {
    for policy in [KillPolicy::Conservative, KillPolicy::Optimistic] {
        let config = AllocatorConfig {
            kill_policy: policy,
            ..AllocatorConfig::default()
        };
        let program = l1(FIB, &config);

        assert_eq!(program.entry, ":main");
        assert_eq!(program.functions.len(), 2);
        for f in program.functions.iter() {
            assert!(f.variables().is_empty(), "{}", f);
        }

        // L1 is still readable by the same front end
        let text = program.to_string();
        assert!(!text.contains("void"));
        assert_eq!(parse_program(&text).unwrap(), program);
    }
}

#[test]
fn call_with_seven_arguments() {
    let program = parse_program(
        "(:f 0 0
            (rdi <- 1) (rsi <- 2) (rdx <- 3) (rcx <- 4) (r8 <- 5) (r9 <- 6)
            ((mem rsp -16) <- 7)
            (call :g 7)
            (return))",
    )
    .unwrap();
    let f = &program.functions[0];
    let analysis = analyze(f, KillPolicy::Conservative).unwrap();

    let call = f.instructions.len() - 2;
    let gens: Vec<Register> = analysis.gen_kill[call]
        .gens
        .iter()
        .filter_map(Node::register)
        .collect();
    let mut arguments = x64::ARGUMENTS.to_vec();
    arguments.sort_by_key(|r| r.name());
    assert_eq!(gens, arguments);

    let kills = &analysis.gen_kill[call].kills;
    assert_eq!(kills.len(), x64::CALLER_SAVED.len());
    assert!(kills.contains(&Node::Register(x64::RETURN)));
}

#[test]
fn join_label_collects_both_paths() {
    let program = parse_program(
        "(:f 1 0
            (%a <- 1)
            (%b <- 2)
            (cjump rdi = 0 :left)
            (%c <- %b)
            (goto :join)
            :left
            (%c <- %a)
            :join
            (%c += %a)
            (rax <- %c)
            (return))",
    )
    .unwrap();
    let f = &program.functions[0];
    let analysis = analyze(f, KillPolicy::Conservative).unwrap();

    let join = f.find_label(":join").unwrap();
    let live = &analysis.liveness.live_in[join];
    assert!(live.contains(&Node::Variable(Variable::new("%a"))));
    assert!(live.contains(&Node::Variable(Variable::new("%c"))));

    // the label's IN reaches both the jump and the fall-through into it
    let goto = join - 3;
    assert_eq!(&analysis.liveness.live_out[goto], live);
    assert_eq!(&analysis.liveness.live_out[join - 1], live);
}

#[test]
fn heavy_pressure_spills_to_the_stack() {
    let mut body = String::new();
    for i in 0..20 {
        body.push_str(&format!("(%v{} <- rdi)\n(%v{} += {})\n", i, i, i));
    }
    for i in 0..20 {
        body.push_str(&format!("(rax += %v{})\n", i));
    }
    let src = format!("(:f 1 2 (rax <- 0) {} (return))", body);

    let program = parse_program(&src).unwrap();
    let allocation = allocate_function(&program.functions[0], &AllocatorConfig::default()).unwrap();

    assert!(allocation.spills > 0);
    assert_eq!(allocation.function.locals, 2 + allocation.spills as i64);
    assert!(allocation.coloring.is_complete());

    let l1 = allocation.to_l1();
    assert!(l1.variables().is_empty());
    assert!(l1.to_string().contains("(mem rsp 16)"));
}

#[test]
fn malformed_input_is_reported() {
    assert!(matches!(
        parse_program("(:f 0 0 (return)"),
        Err(FrontendError::Syntax(_))
    ));
    assert!(matches!(
        parse_program("(:f 0 0 (%x <- ))"),
        Err(FrontendError::Lowering(_))
    ));

    let program = parse_program("(:f 0 0 (cjump %x < 1 :gone) (return))").unwrap();
    match allocate_program(&program, &AllocatorConfig::default()) {
        Err(AllocError::Analysis(AnalysisError::LabelNotFound { function, label })) => {
            assert_eq!(function, ":f");
            assert_eq!(label, ":gone");
        }
        other => panic!("unexpected {:?}", other),
    }

    let err = allocate_program(
        &parse_program("(:f 0 0 (return))").unwrap(),
        &AllocatorConfig {
            spill_prefix: "S".to_owned(),
            ..AllocatorConfig::default()
        },
    )
    .unwrap_err();
    assert!(matches!(err, AllocError::InvalidPrefix(_)));
}
