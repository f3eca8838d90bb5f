use pretty_assertions::assert_eq;
use treelox::{Config, Lox, LoxError};

fn fail(source: &str) -> (LoxError, String) {
    let mut lox = Lox::with_output(Vec::new());
    let err = lox.run(source).expect_err("program should fail");
    (err, String::from_utf8(lox.into_output()).unwrap())
}

fn runtime_error(source: &str) -> String {
    match fail(source).0 {
        LoxError::Runtime(err) => err.to_string(),
        other => panic!("expected a runtime error, got {:?}", other),
    }
}

#[test]
fn scan_errors_are_batched() {
    let (err, output) = fail("print 1;\nvar x = $2;\nprint 2 ^+ 3;\n\"open");
    assert_eq!(
        err.diagnostics(),
        vec![
            "[line 2] Error: Unexpected character '$'.",
            "[line 3] Error: Unexpected character '^'.",
            "[line 4] Error: Unterminated string.",
        ]
    );
    assert_eq!(err.exit_code(), 65);
    assert_eq!(output, "");
}

#[test]
fn parse_errors_are_batched() {
    let (err, output) = fail("print 1;\nvar = 2;\nprint (3;\nprint 4;\n1 = 2;");
    assert!(matches!(err, LoxError::Syntax { .. }));
    assert_eq!(
        err.diagnostics(),
        vec![
            "[line 2] Error at '=': Expect variable name.",
            "[line 3] Error at ';': Expect ')' after expression.",
            "[line 5] Error at '=': Invalid assignment target.",
        ]
    );
    assert_eq!(output, "");
}

#[test]
fn scan_errors_do_not_hide_parse_errors() {
    let (err, output) = fail("var a = @;\nvar = 1;\nprint (2;");
    assert_eq!(
        err.diagnostics(),
        vec![
            "[line 1] Error: Unexpected character '@'.",
            "[line 1] Error at ';': Expect expression.",
            "[line 2] Error at '=': Expect variable name.",
            "[line 3] Error at ';': Expect ')' after expression.",
        ]
    );
    assert_eq!(err.exit_code(), 65);
    assert_eq!(output, "");
}

#[test]
fn parse_error_at_end() {
    let (err, _) = fail("print 1");
    assert_eq!(
        err.diagnostics(),
        vec!["[line 1] Error at end: Expect ';' after value."]
    );
}

#[test]
fn resolve_errors_are_batched() {
    let source = r#"
        return 1;
        class A < A {}
        fun f() { var a = 1; var a = 2; }
        class B { init() { return 3; } }
        print this;
        print super.x;
        class C { m() { super.m(); } }
        { var l = l; }
    "#;
    let (err, output) = fail(source);
    assert!(matches!(err, LoxError::Resolve(_)));
    assert_eq!(
        err.diagnostics(),
        vec![
            "[line 2] Error at 'return': Can't return from top-level code.",
            "[line 3] Error at 'A': A class can't inherit from itself.",
            "[line 4] Error at 'a': Already a variable with this name in this scope.",
            "[line 5] Error at 'return': Can't return a value from an initializer.",
            "[line 6] Error at 'this': Can't use 'this' outside of a class.",
            "[line 7] Error at 'super': Can't use 'super' outside of a class.",
            "[line 8] Error at 'super': Can't use 'super' in a class with no superclass.",
            "[line 9] Error at 'l': Can't read local variable in its own initializer.",
        ]
    );
    assert_eq!(err.exit_code(), 65);
    assert_eq!(output, "");
}

#[test]
fn runtime_error_stops_the_program() {
    let (err, output) = fail("print 1;\nprint 2 - \"x\";\nprint 3;");
    assert_eq!(err.to_string(), "[line 2] Error: Operands must be numbers.");
    assert_eq!(err.exit_code(), 70);
    assert_eq!(output, "1\n");
}

#[test]
fn runtime_error_messages() {
    assert_eq!(
        runtime_error("print nope;"),
        "[line 1] Error: Undefined variable 'nope'."
    );
    assert_eq!(
        runtime_error("nope = 1;"),
        "[line 1] Error: Undefined variable 'nope'."
    );
    assert_eq!(
        runtime_error("print true + 1;"),
        "[line 1] Error: Operands must be two numbers or two strings."
    );
    assert_eq!(
        runtime_error("print -nil;"),
        "[line 1] Error: Operand must be a number."
    );
    assert_eq!(runtime_error("print 5 / 0;"), "[line 1] Error: Division by zero.");
    assert_eq!(runtime_error("print 5 % 0;"), "[line 1] Error: Modulus by zero.");
    assert_eq!(
        runtime_error("nil();"),
        "[line 1] Error: Can only call functions and classes."
    );
    assert_eq!(
        runtime_error("fun f(a, b) {}\nf(1);"),
        "[line 2] Error: Expected 2 arguments but got 1."
    );
    assert_eq!(
        runtime_error("clock(1);"),
        "[line 1] Error: Expected 0 arguments but got 1."
    );
    assert_eq!(
        runtime_error("var x = 1; print x.y;"),
        "[line 1] Error: Only instances have properties."
    );
    assert_eq!(
        runtime_error("var x = 1; x.y = 2;"),
        "[line 1] Error: Only instances have fields."
    );
    assert_eq!(
        runtime_error("class A {} print A().missing;"),
        "[line 1] Error: Undefined property 'missing'."
    );
    assert_eq!(
        runtime_error("var NotClass = 1; class B < NotClass {}"),
        "[line 1] Error: Superclass must be a class."
    );
    assert_eq!(
        runtime_error("class A {} class B < A { m() { return super.x; } } B().m();"),
        "[line 1] Error: Undefined property 'x'."
    );
}

#[test]
fn error_inside_function_reports_its_line() {
    let source = "fun f() {\n  return 1 + nil;\n}\nf();";
    assert_eq!(
        runtime_error(source),
        "[line 2] Error: Operands must be two numbers or two strings."
    );
}

#[test]
fn stack_overflow() {
    let source = "fun f(n) { return f(n + 1); }\nf(0);";
    assert_eq!(runtime_error(source), "[line 1] Error: Stack overflow.");
}

#[test]
fn call_depth_is_configurable() {
    let source = "fun down(n) { if (n == 0) return 0; return down(n - 1); } print down(50);";
    let mut shallow = Lox::with_config(Vec::new(), Config::default().max_call_depth(10));
    let err = shallow.run(source).unwrap_err();
    assert_eq!(err.to_string(), "[line 1] Error: Stack overflow.");

    let mut deep = Lox::with_config(Vec::new(), Config::default().max_call_depth(100));
    deep.run(source).unwrap();
    assert_eq!(deep.output(), b"0\n");
}

#[test]
fn deep_but_bounded_recursion_succeeds() {
    let source = "fun count(n) { if (n == 0) return 0; return 1 + count(n - 1); } print count(1000);";
    let mut lox = Lox::with_output(Vec::new());
    lox.run(source).unwrap();
    assert_eq!(lox.output(), b"1000\n");
}

#[test]
fn repl_recovers_after_runtime_error() {
    let mut lox = Lox::with_output(Vec::new());
    lox.run_line("var total = 10;").unwrap();
    let err = lox.run_line("total = total + nil;").unwrap_err();
    assert_eq!(err.exit_code(), 70);
    lox.run_line("print total;").unwrap();
    assert!(lox.run_line("fun f() { f(); } f();").is_err());
    lox.run_line("print total + 1;").unwrap();
    assert_eq!(lox.output(), b"10\n11\n");
}

#[test]
fn static_error_in_repl_line_keeps_state() {
    let mut lox = Lox::with_output(Vec::new());
    lox.run_line("var a = \"kept\";").unwrap();
    assert!(lox.run_line("var b = ;").is_err());
    lox.run_line("print a;").unwrap();
    assert!(lox.get_global("b").is_none());
    assert_eq!(lox.output(), b"kept\n");
}
