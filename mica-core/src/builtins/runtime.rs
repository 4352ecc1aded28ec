// mica-core - Runtime helper natives
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Natives the codegen lowers language constructs to: closure creation,
//! array literals, class wiring, sequence iteration, exports, freezing.

use crate::error::{Error, Result};
use crate::native::NativeContext;
use crate::value::{deep_freeze, freeze, MicaVal};

use super::add_native_fn;

/// Hidden environment field recording exported symbol names.
pub const EXPORTS_FIELD: &str = "@exports";

/// Register the runtime helpers on `globals`.
pub fn register(globals: &MicaVal) -> Result<()> {
    add_native_fn(globals, "@makeClosure", &["env", "fn"], make_closure, true)?;
    add_native_fn(globals, "@newArray", &["size"], new_array, true)?;
    add_native_fn(globals, "@setObjClass", &["obj", "class"], set_obj_class, true)?;
    add_native_fn(globals, "@setClassEnv", &["env", "class"], set_class_env, true)?;
    add_native_fn(globals, "@iterator", &["sequence"], iterator, true)?;
    add_native_fn(globals, "@exportSymbol", &["name", "env"], export_symbol, true)?;
    add_native_fn(globals, "freeze", &["value"], freeze_native, true)?;
    add_native_fn(globals, "deepFreeze", &["value"], deep_freeze_native, true)?;
    add_native_fn(globals, "typeOf", &["value"], type_of_native, true)?;
    Ok(())
}

/// `@makeClosure(env, fn)` - bind the current environment to a function.
fn make_closure(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let env = ctx.get_param(0);
    match ctx.get_param(1) {
        MicaVal::Function(f) => Ok(MicaVal::closure(f, env)),
        other => Err(Error::runtime(format!(
            "@makeClosure expects a function, got {}",
            other.type_of()
        ))),
    }
}

/// `@newArray(size)` - allocate an array of `size` nulls.
fn new_array(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let size = ctx.get_param(0);
    let n = if size.is_integer() && size.to_double() >= 0.0 {
        size.to_double() as usize
    } else {
        0
    };
    Ok(MicaVal::array(vec![MicaVal::Null; n]))
}

/// `@setObjClass(obj, class)` - rewrite an object's class, yield the object.
fn set_obj_class(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let obj = ctx.get_param(0);
    let class = ctx.get_param(1);
    match (&obj, &class) {
        (MicaVal::Object(cell), MicaVal::Class(cls)) => {
            cell.set_class(std::rc::Rc::clone(cls));
            Ok(obj.clone())
        }
        _ => Err(Error::runtime(format!(
            "@setObjClass expects (Object, Class), got ({}, {})",
            obj.type_of(),
            class.type_of()
        ))),
    }
}

/// `@setClassEnv(env, class)` - build the constructor environment.
///
/// The constructor environment is an object whose index 0 is the class
/// (read by the synthetic constructor through `getEnv; PUSHC 0;
/// RD_INDEX`) and whose outer link is the defining environment, so free
/// names inside the constructor still resolve.
fn set_class_env(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let env = ctx.get_param(0);
    let class = ctx.get_param(1);
    match &class {
        MicaVal::Class(cls) => {
            let ctor_env = MicaVal::object();
            ctor_env.write_field("0", class.clone(), true)?;
            if let MicaVal::Object(cell) = &ctor_env {
                cell.set_outer(env);
            }
            cls.set_env(ctor_env);
            Ok(class.clone())
        }
        other => Err(Error::runtime(format!(
            "@setClassEnv expects a class, got {}",
            other.type_of()
        ))),
    }
}

/// `@exportSymbol(name, env)` - record `name` as exported from `env`.
fn export_symbol(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let name = ctx.get_param(0);
    let env = ctx.get_param(1);
    let exports = env.read_field(EXPORTS_FIELD)?;
    let exports = match exports {
        MicaVal::Array(_) => exports,
        _ => {
            let arr = MicaVal::array(Vec::new());
            env.write_field(EXPORTS_FIELD, arr.clone(), false)?;
            arr
        }
    };
    if let MicaVal::Array(cell) = &exports {
        cell.push(MicaVal::string(name.to_display_string()))?;
    }
    Ok(MicaVal::Null)
}

/// `freeze(value)` - shallow-freeze in place.
fn freeze_native(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    Ok(freeze(&ctx.get_param(0)))
}

/// `deepFreeze(value)` - deep-frozen acyclic copy.
fn deep_freeze_native(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    deep_freeze(&ctx.get_param(0))
}

/// `typeOf(value)` - the value's type name.
fn type_of_native(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    Ok(MicaVal::string(ctx.get_param(0).type_of()))
}

// ============================================================================
// Iterators
// ============================================================================

/// `@iterator(sequence)` - first iterator of a sequence, `null` if empty.
///
/// Arrays iterate their elements, strings their characters. Iterators are
/// plain objects with `head`/`tail` members invoked through the
/// pending-`this` register, carrying their state in hidden fields.
fn iterator(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let seq = ctx.get_param(0);
    match &seq {
        MicaVal::Null => Ok(MicaVal::Null),
        MicaVal::Array(cell) => {
            if cell.is_empty() {
                Ok(MicaVal::Null)
            } else {
                make_iterator(seq.clone(), 0)
            }
        }
        MicaVal::String(s) => {
            if s.is_empty() {
                Ok(MicaVal::Null)
            } else {
                make_iterator(seq.clone(), 0)
            }
        }
        other => Err(Error::runtime(format!(
            "Not an iterable value: {}",
            other.type_of()
        ))),
    }
}

fn seq_len(seq: &MicaVal) -> usize {
    match seq {
        MicaVal::Array(cell) => cell.len(),
        MicaVal::String(s) => s.chars().count(),
        _ => 0,
    }
}

fn make_iterator(seq: MicaVal, index: usize) -> Result<MicaVal> {
    let iter = MicaVal::object();
    iter.write_field("@seq", seq, false)?;
    iter.write_field("@index", MicaVal::Number(index as f64), false)?;
    add_native_fn(&iter, "head", &[], iter_head, true)?;
    add_native_fn(&iter, "tail", &[], iter_tail, true)?;
    Ok(iter)
}

/// `iterator.head()` - the element at the iterator's position.
fn iter_head(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let this = ctx.get_this();
    let seq = this.read_field("@seq")?;
    let index = this.read_field("@index")?;
    seq.get_at(&index)
}

/// `iterator.tail()` - the next iterator, or `null` at the end.
fn iter_tail(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let this = ctx.get_this();
    let seq = this.read_field("@seq")?;
    let index = this.read_field("@index")?.to_double() as usize;
    if index + 1 >= seq_len(&seq) {
        Ok(MicaVal::Null)
    } else {
        make_iterator(seq, index + 1)
    }
}
