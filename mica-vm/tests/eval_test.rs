// mica-vm - End-to-end evaluation tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

mod common;

use common::{run, run_str};

#[test]
fn test_literals() {
    assert_eq!(run_str("42"), "42");
    assert_eq!(run_str("3.5"), "3.5");
    assert_eq!(run_str("true"), "true");
    assert_eq!(run_str("null"), "null");
    assert_eq!(run_str("'hi'"), "hi");
}

#[test]
fn test_arithmetic_precedence() {
    // var a = 1 + 2 * 3; a == 7
    assert_eq!(run_str("var a = 1 + 2 * 3; a"), "7");
    assert_eq!(run_str("(1 + 2) * 3"), "9");
    assert_eq!(run_str("2 ** 3 ** 2"), "512");
    assert_eq!(run_str("10 % 4"), "2");
    assert_eq!(run_str("-3 + 1"), "-2");
    assert_eq!(run_str("7 / 2"), "3.5");
}

#[test]
fn test_string_concatenation() {
    assert_eq!(run_str("'a' + 'b'"), "ab");
    assert_eq!(run_str("'' + 5"), "5");
    assert_eq!(run_str("1 + '2'"), "12");
}

#[test]
fn test_for_loop_builds_string() {
    assert_eq!(
        run_str("var s = ''; for (var i = 0; i < 3; i = i + 1) s = s + i; s"),
        "012"
    );
}

#[test]
fn test_while_loop() {
    assert_eq!(run_str("var n = 0; while (n < 5) n = n + 1; n"), "5");
}

#[test]
fn test_function_call() {
    assert_eq!(run_str("function f(x, y) { return x + y; } f(2, 3)"), "5");
    assert_eq!(run_str("function f() { return 9; } f()"), "9");
    // No explicit return yields null.
    assert_eq!(run_str("function f() { 1; } f()"), "null");
}

#[test]
fn test_object_literal_access() {
    assert_eq!(run_str("var o = {a: 1, b: 2}; o.a + o['b']"), "3");
    assert_eq!(run_str("var o = {}; o.x"), "null");
}

#[test]
fn test_class_parameter_inheritance() {
    assert_eq!(
        run_str("class A(x) { } class B(y) extends A { } var b = B(7); b.x"),
        "7"
    );
    assert_eq!(
        run_str("class A(x) { } class B(y) extends A { } var b = B(7, 8); b.y"),
        "8"
    );
}

#[test]
fn test_class_members_and_methods() {
    let src = "
        class Point(x, y) {
            var tag = 'pt';
            function norm2() { return this.x * this.x + this.y * this.y; }
        }
        var p = Point(3, 4);
        p.norm2()
    ";
    assert_eq!(run_str(src), "25");

    let src = "
        class Point(x, y) { var tag = 'pt'; }
        Point(1, 2).tag
    ";
    assert_eq!(run_str(src), "pt");
}

#[test]
fn test_class_explicit_base_arguments() {
    let src = "
        class A(x) { }
        class B(k) extends A(k * 10) { }
        B(4).x
    ";
    assert_eq!(run_str(src), "40");
}

#[test]
fn test_closure_writes_through_env() {
    assert_eq!(
        run_str("var n = 0; function inc() { n = n + 1; } inc(); inc(); n"),
        "2"
    );
}

#[test]
fn test_closures_capture_the_environment() {
    // The environment is a value: a nested function resolves free names
    // through the module globals, not the enclosing call's locals.
    assert_eq!(
        run_str(
            "var a = 1;
             var mk = function () { return function (b) { return a + b; }; };
             mk()(2)"
        ),
        "3"
    );
}

#[test]
fn test_const_write_raises() {
    let err = run("const k = 1; k = 2;").unwrap_err();
    assert!(err.to_string().contains("Trying to write to constant"));
}

#[test]
fn test_conditional_expression() {
    assert_eq!(run_str("true ? 1 : 2"), "1");
    assert_eq!(run_str("false ? 1 : 2"), "2");
    assert_eq!(run_str("var x = 0 ? 'a' : 1 ? 'b' : 'c'; x"), "b");
    // Both arms at matching depth inside a larger expression.
    assert_eq!(run_str("10 + (false ? 1 : 2)"), "12");
}

#[test]
fn test_if_statement() {
    assert_eq!(
        run_str("var r = 0; if (1 < 2) r = 'then'; else r = 'else'; r"),
        "then"
    );
    assert_eq!(run_str("var r = 0; if (1 > 2) r = 9; r"), "0");
}

#[test]
fn test_short_circuit() {
    // The deciding operand is the expression value.
    assert_eq!(run_str("0 || 'x'"), "x");
    assert_eq!(run_str("1 || 'x'"), "1");
    assert_eq!(run_str("0 && 'x'"), "0");
    assert_eq!(run_str("1 && 'x'"), "x");
    // The right side must not run when short-circuited.
    assert_eq!(run_str("1 || missingFn()"), "1");
    assert_eq!(run_str("0 && missingFn()"), "0");
}

#[test]
fn test_for_in() {
    assert_eq!(
        run_str("var sum = 0; for (x in [1, 2, 3, 4]) sum = sum + x; sum"),
        "10"
    );
    // Empty sequence: zero iterations, statement yields null.
    assert_eq!(run_str("var c = 0; for (x in []) c = c + 1; c"), "0");
    assert_eq!(run_str("for (x in []) 1;"), "null");
    assert_eq!(
        run_str("var s = ''; for (c in 'abc') s = c + s; s"),
        "cba"
    );
}

#[test]
fn test_arrays() {
    assert_eq!(run_str("[1, 2, 3].length"), "3");
    assert_eq!(run_str("var a = [1, 2]; a.push(3); a[2]"), "3");
    assert_eq!(run_str("var a = [1, 2]; a.pop()"), "2");
    assert_eq!(run_str("var a = []; a[2] = 7; a.length"), "3");
    assert_eq!(run_str("var a = [1, 2, 3]; a.length = 1; a[1]"), "null");
    assert_eq!(run_str("[10, 20].indexOf(20)"), "1");
    assert_eq!(run_str("[1, 2, 3].join('-')"), "1-2-3");
    assert_eq!(run_str("[1, 2, 3, 4].slice(1, 3).join(',')"), "2,3");
    assert_eq!(run_str("[-1][-1]"), "null");
}

#[test]
fn test_strings() {
    assert_eq!(run_str("'hello'.length"), "5");
    assert_eq!(run_str("'hello'.charAt(1)"), "e");
    assert_eq!(run_str("'hello'.indexOf('ll')"), "2");
    assert_eq!(run_str("'hello'.substring(1, 3)"), "el");
    assert_eq!(run_str("'a,b'.split(',').length"), "2");
    assert_eq!(run_str("'abc'[1]"), "b");
}

#[test]
fn test_equality() {
    assert_eq!(run_str("1 == '1'"), "true");
    assert_eq!(run_str("1 === '1'"), "false");
    assert_eq!(run_str("null == null"), "true");
    assert_eq!(run_str("null == 0"), "false");
    assert_eq!(run_str("'b' > 'a'"), "true");
    assert_eq!(run_str("var o = {}; o == o"), "true");
    assert_eq!(run_str("({}) == ({})"), "false");
}

#[test]
fn test_compound_assignment() {
    assert_eq!(run_str("var x = 10; x += 5; x"), "15");
    assert_eq!(run_str("var x = 10; x -= 3; x *= 2; x"), "14");
    assert_eq!(run_str("var o = {n: 1}; o.n += 41; o.n"), "42");
    assert_eq!(run_str("var a = [5]; a[0] += 1; a[0]"), "6");
    // Parameters are writable through their index.
    assert_eq!(run_str("function f(x) { x += 1; return x; } f(4)"), "5");
}

#[test]
fn test_increment_operators() {
    assert_eq!(run_str("var x = 5; x++; x"), "6");
    assert_eq!(run_str("var x = 5; x++"), "5");
    assert_eq!(run_str("var x = 5; ++x"), "6");
    assert_eq!(run_str("var x = 5; x--; x"), "4");
    assert_eq!(run_str("var x = 5; --x"), "4");
}

#[test]
fn test_missing_parameters_read_null() {
    // Out-of-range parameter reads are null - never the closure's
    // environment slot.
    assert_eq!(run_str("function f(x, y) { return y; } f(7)"), "null");
    assert_eq!(
        run_str("class A(x, y) { } var a = A(1); '' + a.y"),
        "null"
    );
}

#[test]
fn test_method_call_receives_this() {
    assert_eq!(
        run_str("var o = {v: 41, get: function () { return this.v + 1; }}; o.get()"),
        "42"
    );
}

#[test]
fn test_call_field_dispatch() {
    let src = "
        var adder = {
            base: 100,
            call: function (n) { return this.base + n; }
        };
        adder(23)
    ";
    assert_eq!(run_str(src), "123");
}

#[test]
fn test_implicit_global_creation() {
    // Assignment to an unresolved identifier creates an environment field.
    assert_eq!(run_str("fresh = 9; fresh"), "9");
}

#[test]
fn test_object_const_property() {
    let err = run("var o = {const k: 1}; o.k = 2;").unwrap_err();
    assert!(err.to_string().contains("Trying to write to constant"));
}

#[test]
fn test_deep_freeze() {
    assert_eq!(
        run_str("var d = {inner: {v: 1}}; var f = deepFreeze(d); d.inner.v = 2; f.inner.v"),
        "1"
    );
    let err = run("var f = deepFreeze({v: 1}); f.v = 2;").unwrap_err();
    assert!(err.to_string().contains("frozen"));
}

#[test]
fn test_builtin_classes_and_math() {
    assert_eq!(run_str("typeOf([])"), "Array");
    assert_eq!(run_str("typeOf('')"), "String");
    assert_eq!(run_str("typeOf(Object())"), "Object");
    assert_eq!(run_str("Math.floor(2.7)"), "2");
    assert_eq!(run_str("Math.max(1, 5, 3)"), "5");
    assert_eq!(run_str("Math.pow(2, 8)"), "256");
}

#[test]
fn test_nested_blocks_and_locals() {
    let src = "
        function f() {
            var a = 1;
            {
                var b = 2;
                a = a + b;
            }
            return a;
        }
        f()
    ";
    assert_eq!(run_str(src), "3");
}

#[test]
fn test_return_from_nested_block() {
    let src = "
        function f(x) {
            var acc = 10;
            if (x) {
                return acc + 1;
            }
            return acc;
        }
        f(true) + f(false)
    ";
    assert_eq!(run_str(src), "21");
}

#[test]
fn test_empty_script() {
    assert_eq!(run_str(""), "null");
}

#[test]
fn test_constant_pool_spills_to_16_bit() {
    // More than 63 distinct constants forces 16-bit PUSHC encodings.
    let mut src = String::from("var s = 0;\n");
    for i in 0..80 {
        src.push_str(&format!("s = s + {}.5;\n", i));
    }
    src.push_str("s");
    let expected: f64 = (0..80).map(|i| i as f64 + 0.5).sum();
    assert_eq!(run_str(&src), mica_core::number_to_string(expected));
}

#[test]
fn test_recursion() {
    let src = "
        function fact(n) {
            if (n < 2) return 1;
            return n * fact(n - 1);
        }
        fact(6)
    ";
    assert_eq!(run_str(src), "720");
}

#[test]
fn test_fibonacci() {
    let src = "
        function fib(n) {
            if (n < 2) return n;
            return fib(n - 1) + fib(n - 2);
        }
        fib(12)
    ";
    assert_eq!(run_str(src), "144");
}
