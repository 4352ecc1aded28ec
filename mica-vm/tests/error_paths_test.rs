// mica-vm - Error path tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

mod common;

use common::run;

fn error_of(source: &str) -> String {
    run(source).unwrap_err().to_string()
}

#[test]
fn test_not_callable() {
    assert!(error_of("var z = 4; z();").contains("Trying to call a non-function value"));
    assert!(error_of("'abc'();").contains("Trying to call a non-function value"));
    // An undefined name reads as null, which is not callable either.
    assert!(error_of("missing();").contains("Trying to call a non-function value"));
}

#[test]
fn test_object_without_call_field() {
    assert!(error_of("var o = {}; o();").contains("Trying to call a non-function value"));
}

#[test]
fn test_call_field_cycle_is_bounded() {
    // An object whose call field is itself must not hang.
    assert!(
        error_of("var o = {}; o.call = o; o();").contains("Trying to call a non-function value")
    );
}

#[test]
fn test_constant_write() {
    let message = error_of("const k = 1; k = 2;");
    assert!(message.contains("Trying to write to constant 'k'"));

    // Creating a constant over an existing name fails the same way.
    let message = error_of("var v = 1; const v = 2;");
    assert!(message.contains("Trying to write to constant 'v'"));
}

#[test]
fn test_invalid_array_index() {
    assert!(error_of("var a = [1]; a[{}];").contains("Invalid array index"));
    assert!(error_of("var a = [1]; a[-1] = 5;").contains("Invalid array index"));
}

#[test]
fn test_frozen_writes() {
    assert!(error_of("var f = freeze({a: 1}); f.a = 2;").contains("frozen"));
    assert!(error_of("var f = deepFreeze([1]); f[0] = 2;").contains("frozen"));
}

#[test]
fn test_runtime_errors_carry_positions() {
    let err = run("var z = 1;\nz();").unwrap_err();
    assert!(err.is_runtime());
    assert!(err.vm_position().is_some(), "runtime errors carry a VM position");
}

#[test]
fn test_constant_pool_overflow() {
    // An array literal of distinct numbers floods the constant pool past
    // the 16-bit PUSHC range.
    let mut src = String::from("var a = [");
    for i in 0..8300 {
        if i > 0 {
            src.push(',');
        }
        src.push_str(&format!("{}.5", i));
    }
    src.push_str("];");

    let message = run(&src).unwrap_err().to_string();
    assert!(message.contains("Too many constants"), "got: {}", message);
}

#[test]
fn test_too_many_call_arguments() {
    let mut src = String::from("function f() { return 0; } f(");
    for i in 0..1040 {
        if i > 0 {
            src.push(',');
        }
        src.push('1');
    }
    src.push_str(");");

    let message = run(&src).unwrap_err().to_string();
    assert!(message.contains("Too many arguments"), "got: {}", message);
}

#[test]
fn test_large_call_arity_works_through_16_bit_encoding() {
    // 20 arguments needs the 16-bit CALL form; NUM_PARAMS-free check via
    // reading a high parameter back.
    let mut src = String::from("function pick(");
    for i in 0..20 {
        if i > 0 {
            src.push(',');
        }
        src.push_str(&format!("p{}", i));
    }
    src.push_str(") { return p19; } pick(");
    for i in 0..20 {
        if i > 0 {
            src.push(',');
        }
        src.push_str(&format!("{}", i));
    }
    src.push_str(");");

    let value = run(&src).unwrap();
    assert_eq!(value.to_double(), 19.0);
}

#[test]
fn test_semantic_errors_surface() {
    assert!(error_of("var this = 1;").contains("Invalid variable name"));
    assert!(error_of("var o = {a: 1, a: 2};").contains("Duplicated key"));
    assert!(error_of("class B extends Nope {}").contains("not defined"));
}

#[test]
fn test_parse_errors_surface() {
    assert!(error_of("var = 3;").contains("Parse error"));
    assert!(error_of("function f( {").contains("Parse error"));
    assert!(error_of("1 +").contains("Parse error"));
}

#[test]
fn test_not_iterable() {
    assert!(error_of("for (x in 42) x;").contains("Not an iterable value"));
}
