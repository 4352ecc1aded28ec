// mica-core - Math natives
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The global `Math` object.

use crate::error::Result;
use crate::native::NativeContext;
use crate::value::MicaVal;

use super::add_native_fn;

/// Build the `Math` object and register it on `globals`.
pub fn register(globals: &MicaVal) -> Result<()> {
    let math = MicaVal::object();
    add_native_fn(&math, "floor", &["x"], floor, true)?;
    add_native_fn(&math, "ceil", &["x"], ceil, true)?;
    add_native_fn(&math, "abs", &["x"], abs, true)?;
    add_native_fn(&math, "sqrt", &["x"], sqrt, true)?;
    add_native_fn(&math, "pow", &["x", "y"], pow, true)?;
    add_native_fn(&math, "min", &["a", "b"], min, true)?;
    add_native_fn(&math, "max", &["a", "b"], max, true)?;
    globals.write_field("Math", math, true)?;
    Ok(())
}

fn floor(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    Ok(MicaVal::Number(ctx.get_param(0).to_double().floor()))
}

fn ceil(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    Ok(MicaVal::Number(ctx.get_param(0).to_double().ceil()))
}

fn abs(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    Ok(MicaVal::Number(ctx.get_param(0).to_double().abs()))
}

fn sqrt(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    Ok(MicaVal::Number(ctx.get_param(0).to_double().sqrt()))
}

fn pow(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    Ok(MicaVal::Number(
        ctx.get_param(0).to_double().powf(ctx.get_param(1).to_double()),
    ))
}

/// `Math.min(...)` over every argument; no arguments yield `Infinity`.
fn min(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let mut best = f64::INFINITY;
    for i in 0..ctx.num_params() {
        let v = ctx.get_param(i).to_double();
        if v.is_nan() {
            return Ok(MicaVal::Number(f64::NAN));
        }
        best = best.min(v);
    }
    Ok(MicaVal::Number(best))
}

/// `Math.max(...)` over every argument; no arguments yield `-Infinity`.
fn max(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let mut best = f64::NEG_INFINITY;
    for i in 0..ctx.num_params() {
        let v = ctx.get_param(i).to_double();
        if v.is_nan() {
            return Ok(MicaVal::Number(f64::NAN));
        }
        best = best.max(v);
    }
    Ok(MicaVal::Number(best))
}
