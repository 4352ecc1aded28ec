// mica-core - Array class members
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Native members of the global `Array` class. All of them operate on the
//! `this` value delivered through the pending-`this` register.

use std::rc::Rc;

use crate::error::{Error, Result};
use crate::native::NativeContext;
use crate::value::{ArrayCell, Field, FieldMap, MicaVal};

/// Member table of the `Array` class.
pub fn members() -> FieldMap {
    let mut map = FieldMap::new();
    member(&mut map, "push", &["value"], push);
    member(&mut map, "pop", &[], pop);
    member(&mut map, "indexOf", &["value"], index_of);
    member(&mut map, "join", &["separator"], join);
    member(&mut map, "slice", &["start", "end"], slice);
    map
}

fn member(map: &mut FieldMap, name: &str, params: &[&str], f: crate::native::NativeFn) {
    let params: Vec<Rc<str>> = params.iter().map(|p| Rc::from(*p)).collect();
    map.insert(Rc::from(name), Field::new(MicaVal::native(name, params, f), true));
}

fn this_array(ctx: &dyn NativeContext, method: &str) -> Result<Rc<ArrayCell>> {
    match ctx.get_this() {
        MicaVal::Array(cell) => Ok(cell),
        other => Err(Error::runtime(format!(
            "Array.{} called on a {}",
            method,
            other.type_of()
        ))),
    }
}

/// `array.push(value, ...)` - append, returning the new length.
fn push(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let cell = this_array(ctx, "push")?;
    let mut len = cell.len();
    for i in 0..ctx.num_params() {
        len = cell.push(ctx.get_param(i))?;
    }
    Ok(MicaVal::Number(len as f64))
}

/// `array.pop()` - remove and return the last element.
fn pop(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let cell = this_array(ctx, "pop")?;
    cell.pop()
}

/// `array.indexOf(value)` - first strictly-equal element, or -1.
fn index_of(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let cell = this_array(ctx, "indexOf")?;
    let needle = ctx.get_param(0);
    for (i, item) in cell.to_vec().iter().enumerate() {
        if item.strict_equals(&needle) {
            return Ok(MicaVal::Number(i as f64));
        }
    }
    Ok(MicaVal::Number(-1.0))
}

/// `array.join(separator)` - stringify and join, "," by default.
fn join(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let cell = this_array(ctx, "join")?;
    let sep = match ctx.get_param(0) {
        MicaVal::Null => ",".to_string(),
        other => other.to_display_string(),
    };
    let parts: Vec<String> = cell.to_vec().iter().map(|v| v.to_display_string()).collect();
    Ok(MicaVal::string(parts.join(&sep)))
}

/// `array.slice(start, end)` - copy of a sub-range; negative indices count
/// from the end, a null end means "to the end".
fn slice(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let cell = this_array(ctx, "slice")?;
    let len = cell.len() as f64;

    let resolve = |v: &MicaVal, default: f64| -> f64 {
        if v.is_null() {
            default
        } else {
            let i = v.to_double();
            if i < 0.0 {
                (len + i).max(0.0)
            } else {
                i.min(len)
            }
        }
    };
    let start = resolve(&ctx.get_param(0), 0.0) as usize;
    let end = resolve(&ctx.get_param(1), len) as usize;

    let items = cell.to_vec();
    let out = if start < end {
        items[start..end].to_vec()
    } else {
        Vec::new()
    };
    Ok(MicaVal::array(out))
}
