// mica-core - Values, bytecode model, errors and builtins for the Mica scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! # mica-core
//!
//! The bottom layer of the Mica scripting engine: the tagged
//! reference-counted value model, the bytecode containers (routines and
//! blocks), the error types shared by every stage, the native-function
//! contract, and the built-in natives the codegen lowers to.

pub mod builtins;
pub mod bytecode;
pub mod error;
pub mod json;
pub mod native;
pub mod position;
pub mod value;

pub use bytecode::{Block, Routine, VmPosition, NO_BLOCK};
pub use error::{Error, Result};
pub use json::value_to_json;
pub use native::{NativeContext, NativeFn};
pub use position::ScriptPosition;
pub use value::{
    deep_freeze, freeze, number_to_string, string_to_number, ArrayCell, ClassData, ClosureData,
    Field, FieldMap, FnCode, FunctionData, MicaVal, Mutability, ObjectCell,
};
