use decaf::sema::SemanticError;
use decaf::{DecafError, RuntimeErrorKind, Vm, VmConfig, compile_source, decode, disassemble, encode, run};
use pretty_assertions::assert_eq;

// ============================================================
// Helpers
// ============================================================

fn run_ok(source: &str) -> Vec<String> {
    let program = compile_source(source).expect("compilation should succeed");
    run(&program, false).expect("execution should succeed")
}

// ============================================================
// Scenarios
// ============================================================

#[test]
fn arithmetic_precedence() {
    assert_eq!(run_ok("fn main() { print 2 + 3 * 4; return 0; }"), vec!["14"]);
}

#[test]
fn globals_and_loops() {
    let source =
        "var g = 10; fn main() { var i = 0; while (i - 3) { g = g + i; i = i + 1; } print g; return g; }";
    assert_eq!(run_ok(source), vec!["13"]);
}

#[test]
fn division_by_zero_is_a_runtime_error() {
    let program =
        compile_source("fn main() { var a = 1; print a / (a - 1); return 0; }").unwrap();

    let mut vm = Vm::new(&program);
    let err = vm.run().unwrap_err();

    assert_eq!(err.kind, RuntimeErrorKind::DivisionByZero);
    assert!(vm.output().is_empty());
    assert!(err.to_string().starts_with("runtime error: division by zero"));
}

#[test]
fn assigning_a_let_binding_is_rejected() {
    let err = compile_source("let x = 1; fn main() { x = 2; return 0; }").unwrap_err();
    assert!(matches!(
        err,
        DecafError::Semantic(SemanticError::ImmutableAssignment { ref name, .. }) if name == "x"
    ));
}

#[test]
fn output_before_a_fault_is_kept() {
    let program = compile_source(
        "fn main() { print 1; print 2; var z = 0; print 3 / z; print 4; return 0; }",
    )
    .unwrap();

    let mut vm = Vm::new(&program);
    assert!(vm.run().is_err());
    assert_eq!(vm.output(), &["1".to_string(), "2".to_string()]);
}

#[test]
fn library_run_reports_output_before_a_fault() {
    let program = compile_source("fn main() { print 8; var z = 0; print 1 / z; return 0; }").unwrap();

    let err = run(&program, false).unwrap_err();
    assert_eq!(err.kind, RuntimeErrorKind::DivisionByZero);
    assert_eq!(err.output, vec!["8"]);
}

#[test]
fn corrupted_frame_sizes_are_rejected_on_load() {
    let mut program = compile_source("fn main() { return 0; }").unwrap();
    program.functions[0].num_locals = usize::MAX;

    let err = decode(&encode(&program).unwrap()).unwrap_err();
    assert!(err.to_string().contains("impossible frame"));

    let err = run(&program, false).unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::InvalidFrame { .. }));
}

#[test]
fn assignment_yields_its_value() {
    assert_eq!(
        run_ok("fn main() { var x = 0; var y = 0; print (x = y = 5); print x + y; return 0; }"),
        vec!["5", "10"]
    );
}

// ============================================================
// Front end and resolution failures
// ============================================================

#[test]
fn each_phase_reports_its_own_error() {
    assert!(matches!(compile_source("fn main() { return 0 @ }"), Err(DecafError::Lexer(_))));
    assert!(matches!(compile_source("fn main() { return 0 }"), Err(DecafError::Parser(_))));
    assert!(matches!(compile_source("fn f() { return 0; }"), Err(DecafError::Compile(_))));
    assert!(matches!(
        compile_source("fn f(a) { return a; } fn main() { return f(); }"),
        Err(DecafError::Semantic(SemanticError::ArityMismatch { .. }))
    ));
    assert!(matches!(
        compile_source("fn main() { if (1) return 1; }"),
        Err(DecafError::Semantic(SemanticError::MissingReturn { .. }))
    ));
}

#[test]
fn terminal_if_else_counts_as_returning() {
    assert_eq!(
        run_ok("fn pick(c) { if (c) return 1; else return 2; } fn main() { print pick(0); return 0; }"),
        vec!["2"]
    );
}

// ============================================================
// Artifacts and determinism
// ============================================================

#[test]
fn artifact_round_trip_runs_the_same() {
    let source = r#"
        var total = 0;
        fn add(a, b) { return a + b; }
        fn main() {
            var i = 5;
            while (i) { total = add(total, i); i = i - 1; }
            print total;
            print -7 / 2;
            return 0;
        }
    "#;
    let program = compile_source(source).unwrap();
    let decoded = decode(&encode(&program).unwrap()).unwrap();

    assert_eq!(disassemble(&decoded), disassemble(&program));
    assert_eq!(run(&decoded, false).unwrap(), vec!["15", "-4"]);
}

#[test]
fn compilation_and_execution_are_deterministic() {
    let source = "var g = 3; fn sq(n) { return n * n; } fn main() { print sq(g); return 0; }";

    let first = compile_source(source).unwrap();
    let second = compile_source(source).unwrap();
    assert_eq!(disassemble(&first), disassemble(&second));
    assert_eq!(encode(&first).unwrap(), encode(&second).unwrap());
    assert_eq!(run(&first, false).unwrap(), run(&second, true).unwrap());
}

#[test]
fn listing_names_functions_in_declaration_order() {
    let program = compile_source("fn helper() { return 1; } fn main() { return helper(); }").unwrap();
    let listing = disassemble(&program);

    let headers: Vec<&str> = listing.lines().filter(|l| l.starts_with("==")).collect();
    assert_eq!(headers, vec!["== fn 0 helper ==", "== fn 1 main ==", "== fn 2 <entry> =="]);
    assert!(listing.contains("CALL           0 helper argc=0"));
}

#[test]
fn verified_runs_match_unverified_runs() {
    let program = compile_source(
        "fn f(n) { if (n) { let m = n - 1; return f(m) + n; } else return 0; } fn main() { print f(10); return 0; }",
    )
    .unwrap();
    let config = VmConfig {
        verify: true,
        max_steps: Some(10_000),
        ..Default::default()
    };
    assert_eq!(decaf::run_with_config(&program, config).unwrap(), vec!["55"]);
}
