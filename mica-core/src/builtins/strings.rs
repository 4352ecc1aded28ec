// mica-core - String class members
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Native members of the global `String` class. Indices are in
//! characters, consistent with the computed `length` field.

use std::rc::Rc;

use crate::error::{Error, Result};
use crate::native::NativeContext;
use crate::value::{Field, FieldMap, MicaVal};

/// Member table of the `String` class.
pub fn members() -> FieldMap {
    let mut map = FieldMap::new();
    member(&mut map, "charAt", &["index"], char_at);
    member(&mut map, "indexOf", &["needle"], index_of);
    member(&mut map, "substring", &["start", "end"], substring);
    member(&mut map, "split", &["separator"], split);
    map
}

fn member(map: &mut FieldMap, name: &str, params: &[&str], f: crate::native::NativeFn) {
    let params: Vec<Rc<str>> = params.iter().map(|p| Rc::from(*p)).collect();
    map.insert(Rc::from(name), Field::new(MicaVal::native(name, params, f), true));
}

fn this_string(ctx: &dyn NativeContext, method: &str) -> Result<Rc<str>> {
    match ctx.get_this() {
        MicaVal::String(s) => Ok(s),
        other => Err(Error::runtime(format!(
            "String.{} called on a {}",
            method,
            other.type_of()
        ))),
    }
}

/// `string.charAt(index)` - one-character string, empty when out of range.
fn char_at(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let s = this_string(ctx, "charAt")?;
    let index = ctx.get_param(0);
    if !index.is_integer() || index.to_double() < 0.0 {
        return Ok(MicaVal::string(""));
    }
    match s.chars().nth(index.to_double() as usize) {
        Some(c) => Ok(MicaVal::string(c.to_string())),
        None => Ok(MicaVal::string("")),
    }
}

/// `string.indexOf(needle)` - character index of the first match, or -1.
fn index_of(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let s = this_string(ctx, "indexOf")?;
    let needle = ctx.get_param(0).to_display_string();
    match s.find(&needle) {
        Some(byte_pos) => {
            let char_pos = s[..byte_pos].chars().count();
            Ok(MicaVal::Number(char_pos as f64))
        }
        None => Ok(MicaVal::Number(-1.0)),
    }
}

/// `string.substring(start, end)` - character range, clamped and swapped
/// when reversed; a null end means "to the end".
fn substring(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let s = this_string(ctx, "substring")?;
    let len = s.chars().count() as f64;

    let resolve = |v: &MicaVal, default: f64| -> usize {
        if v.is_null() {
            default as usize
        } else {
            v.to_double().max(0.0).min(len) as usize
        }
    };
    let mut start = resolve(&ctx.get_param(0), 0.0);
    let mut end = resolve(&ctx.get_param(1), len);
    if start > end {
        std::mem::swap(&mut start, &mut end);
    }
    let out: String = s.chars().skip(start).take(end - start).collect();
    Ok(MicaVal::string(out))
}

/// `string.split(separator)` - array of pieces; an empty separator splits
/// into characters, a null separator yields the whole string.
fn split(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let s = this_string(ctx, "split")?;
    let sep = ctx.get_param(0);
    if sep.is_null() {
        return Ok(MicaVal::array(vec![MicaVal::String(s)]));
    }
    let sep = sep.to_display_string();
    let parts: Vec<MicaVal> = if sep.is_empty() {
        s.chars().map(|c| MicaVal::string(c.to_string())).collect()
    } else {
        s.split(&sep as &str).map(MicaVal::string).collect()
    };
    Ok(MicaVal::array(parts))
}
