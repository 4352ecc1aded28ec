// mica-core - Operator natives
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The natives that binary and unary operators lower to.
//!
//! `@add` concatenates when either operand is a string; the ordering
//! operators compare two strings lexicographically and anything else
//! numerically; the bitwise family works on 32-bit integer conversions.

use crate::error::Result;
use crate::native::NativeContext;
use crate::value::MicaVal;

use super::add_native_fn;

/// Register the operator natives on `globals`.
pub fn register(globals: &MicaVal) -> Result<()> {
    add_native_fn(globals, "@add", &["a", "b"], add, true)?;
    add_native_fn(globals, "@sub", &["a", "b"], sub, true)?;
    add_native_fn(globals, "@multiply", &["a", "b"], multiply, true)?;
    add_native_fn(globals, "@divide", &["a", "b"], divide, true)?;
    add_native_fn(globals, "@modulus", &["a", "b"], modulus, true)?;
    add_native_fn(globals, "@power", &["a", "b"], power, true)?;
    add_native_fn(globals, "@binAnd", &["a", "b"], bin_and, true)?;
    add_native_fn(globals, "@binOr", &["a", "b"], bin_or, true)?;
    add_native_fn(globals, "@binXor", &["a", "b"], bin_xor, true)?;
    add_native_fn(globals, "@lshift", &["a", "b"], lshift, true)?;
    add_native_fn(globals, "@rshift", &["a", "b"], rshift, true)?;
    add_native_fn(globals, "@rshiftu", &["a", "b"], rshiftu, true)?;
    add_native_fn(globals, "@less", &["a", "b"], less, true)?;
    add_native_fn(globals, "@greater", &["a", "b"], greater, true)?;
    add_native_fn(globals, "@lequal", &["a", "b"], lequal, true)?;
    add_native_fn(globals, "@gequal", &["a", "b"], gequal, true)?;
    add_native_fn(globals, "@areEqual", &["a", "b"], are_equal, true)?;
    add_native_fn(globals, "@notEqual", &["a", "b"], not_equal, true)?;
    add_native_fn(globals, "@areTypeEqual", &["a", "b"], are_type_equal, true)?;
    add_native_fn(globals, "@notTypeEqual", &["a", "b"], not_type_equal, true)?;
    add_native_fn(globals, "@negate", &["a"], negate, true)?;
    add_native_fn(globals, "@binNot", &["a"], bin_not, true)?;
    add_native_fn(globals, "@logicNot", &["a"], logic_not, true)?;
    add_native_fn(globals, "@inc", &["a"], inc, true)?;
    add_native_fn(globals, "@dec", &["a"], dec, true)?;
    Ok(())
}

fn is_string(v: &MicaVal) -> bool {
    matches!(v, MicaVal::String(_))
}

fn add(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let a = ctx.get_param(0);
    let b = ctx.get_param(1);
    if is_string(&a) || is_string(&b) {
        let mut s = a.to_display_string();
        s.push_str(&b.to_display_string());
        Ok(MicaVal::string(s))
    } else {
        Ok(MicaVal::Number(a.to_double() + b.to_double()))
    }
}

fn sub(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    Ok(MicaVal::Number(
        ctx.get_param(0).to_double() - ctx.get_param(1).to_double(),
    ))
}

fn multiply(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    Ok(MicaVal::Number(
        ctx.get_param(0).to_double() * ctx.get_param(1).to_double(),
    ))
}

fn divide(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    Ok(MicaVal::Number(
        ctx.get_param(0).to_double() / ctx.get_param(1).to_double(),
    ))
}

fn modulus(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    Ok(MicaVal::Number(
        ctx.get_param(0).to_double() % ctx.get_param(1).to_double(),
    ))
}

fn power(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    Ok(MicaVal::Number(
        ctx.get_param(0).to_double().powf(ctx.get_param(1).to_double()),
    ))
}

fn bin_and(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    Ok(MicaVal::Number(
        (ctx.get_param(0).to_int32() & ctx.get_param(1).to_int32()) as f64,
    ))
}

fn bin_or(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    Ok(MicaVal::Number(
        (ctx.get_param(0).to_int32() | ctx.get_param(1).to_int32()) as f64,
    ))
}

fn bin_xor(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    Ok(MicaVal::Number(
        (ctx.get_param(0).to_int32() ^ ctx.get_param(1).to_int32()) as f64,
    ))
}

fn lshift(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let a = ctx.get_param(0).to_int32();
    let b = ctx.get_param(1).to_int32() & 31;
    Ok(MicaVal::Number((a << b) as f64))
}

fn rshift(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let a = ctx.get_param(0).to_int32();
    let b = ctx.get_param(1).to_int32() & 31;
    Ok(MicaVal::Number((a >> b) as f64))
}

fn rshiftu(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let a = ctx.get_param(0).to_int32() as u32;
    let b = ctx.get_param(1).to_int32() & 31;
    Ok(MicaVal::Number((a >> b) as f64))
}

fn compare_op(
    ctx: &mut dyn NativeContext,
    string_op: fn(&str, &str) -> bool,
    num_op: fn(f64, f64) -> bool,
) -> Result<MicaVal> {
    let a = ctx.get_param(0);
    let b = ctx.get_param(1);
    let result = match (&a, &b) {
        (MicaVal::String(x), MicaVal::String(y)) => string_op(x, y),
        _ => num_op(a.to_double(), b.to_double()),
    };
    Ok(MicaVal::Bool(result))
}

fn less(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    compare_op(ctx, |a, b| a < b, |a, b| a < b)
}

fn greater(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    compare_op(ctx, |a, b| a > b, |a, b| a > b)
}

fn lequal(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    compare_op(ctx, |a, b| a <= b, |a, b| a <= b)
}

fn gequal(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    compare_op(ctx, |a, b| a >= b, |a, b| a >= b)
}

fn are_equal(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let a = ctx.get_param(0);
    let b = ctx.get_param(1);
    Ok(MicaVal::Bool(a.loose_equals(&b)))
}

fn not_equal(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let a = ctx.get_param(0);
    let b = ctx.get_param(1);
    Ok(MicaVal::Bool(!a.loose_equals(&b)))
}

fn are_type_equal(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let a = ctx.get_param(0);
    let b = ctx.get_param(1);
    Ok(MicaVal::Bool(a.strict_equals(&b)))
}

fn not_type_equal(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let a = ctx.get_param(0);
    let b = ctx.get_param(1);
    Ok(MicaVal::Bool(!a.strict_equals(&b)))
}

fn negate(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    Ok(MicaVal::Number(-ctx.get_param(0).to_double()))
}

fn bin_not(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    Ok(MicaVal::Number(!ctx.get_param(0).to_int32() as f64))
}

fn logic_not(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    Ok(MicaVal::Bool(!ctx.get_param(0).to_bool()))
}

fn inc(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    Ok(MicaVal::Number(ctx.get_param(0).to_double() + 1.0))
}

fn dec(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    Ok(MicaVal::Number(ctx.get_param(0).to_double() - 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestCtx {
        params: Vec<MicaVal>,
    }

    impl NativeContext for TestCtx {
        fn get_param(&self, index: usize) -> MicaVal {
            self.params.get(index).cloned().unwrap_or(MicaVal::Null)
        }
        fn num_params(&self) -> usize {
            self.params.len()
        }
        fn get_this(&self) -> MicaVal {
            MicaVal::Null
        }
        fn module_path(&self) -> &str {
            ""
        }
        fn push(&mut self, _value: MicaVal) {}
        fn pop(&mut self) -> Result<MicaVal> {
            Ok(MicaVal::Null)
        }
        fn set_trace_enabled(&mut self, _enabled: bool) {}
    }

    fn run2(f: crate::native::NativeFn, a: MicaVal, b: MicaVal) -> MicaVal {
        let mut ctx = TestCtx { params: vec![a, b] };
        f(&mut ctx).unwrap()
    }

    #[test]
    fn test_add_concatenates_strings() {
        let r = run2(add, MicaVal::string("ab"), MicaVal::Number(1.0));
        assert_eq!(r.to_display_string(), "ab1");
        let r = run2(add, MicaVal::Number(2.0), MicaVal::Number(3.0));
        assert_eq!(r.to_double(), 5.0);
    }

    #[test]
    fn test_string_comparison_is_lexicographic() {
        let r = run2(less, MicaVal::string("abc"), MicaVal::string("abd"));
        assert!(r.to_bool());
        let r = run2(less, MicaVal::string("10"), MicaVal::string("9"));
        assert!(r.to_bool());
        // Mixed operands compare numerically.
        let r = run2(less, MicaVal::string("10"), MicaVal::Number(9.0));
        assert!(!r.to_bool());
    }

    #[test]
    fn test_bitwise() {
        let r = run2(lshift, MicaVal::Number(1.0), MicaVal::Number(4.0));
        assert_eq!(r.to_double(), 16.0);
        let r = run2(rshiftu, MicaVal::Number(-1.0), MicaVal::Number(28.0));
        assert_eq!(r.to_double(), 15.0);
    }

    #[test]
    fn test_equality_natives() {
        let r = run2(are_equal, MicaVal::Number(1.0), MicaVal::string("1"));
        assert!(r.to_bool());
        let r = run2(are_type_equal, MicaVal::Number(1.0), MicaVal::string("1"));
        assert!(!r.to_bool());
        let r = run2(not_type_equal, MicaVal::Null, MicaVal::Null);
        assert!(!r.to_bool());
    }
}
