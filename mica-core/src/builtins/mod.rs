// mica-core - Built-in natives
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Built-in native functions and core classes.
//!
//! Codegen lowers every operator and several language constructs to calls
//! of `@`-prefixed natives resolved through the environment, so a usable
//! globals object must carry this registry. `register_builtins` installs:
//!
//! - the operator natives (`@add`, `@less`, ...),
//! - the runtime helpers (`@makeClosure`, `@newArray`, `@setObjClass`,
//!   `@setClassEnv`, `@iterator`, `@exportSymbol`, `freeze`, `deepFreeze`,
//!   `typeOf`),
//! - the core classes `Object`, `Array`, `String` and the `Math` object.
//!
//! `@`-prefixed names cannot be written as identifiers in source code, so
//! scripts can call the operators only through the operators themselves.

pub mod arrays;
pub mod classes;
pub mod math;
pub mod operators;
pub mod runtime;
pub mod strings;

use std::rc::Rc;

use crate::error::Result;
use crate::native::NativeFn;
use crate::value::MicaVal;

/// Register a native function as a field of `target`.
pub fn add_native_fn(
    target: &MicaVal,
    name: &str,
    params: &[&str],
    f: NativeFn,
    is_const: bool,
) -> Result<MicaVal> {
    let params: Vec<Rc<str>> = params.iter().map(|p| Rc::from(*p)).collect();
    let function = MicaVal::native(name, params, f);
    target.write_field(name, function.clone(), is_const)?;
    Ok(function)
}

/// Install every built-in into a globals object.
pub fn register_builtins(globals: &MicaVal) -> Result<()> {
    operators::register(globals)?;
    runtime::register(globals)?;
    classes::register(globals)?;
    math::register(globals)?;
    Ok(())
}
