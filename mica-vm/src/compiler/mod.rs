// mica-vm - Bytecode compiler
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Codegen: AST to routines.

pub mod codegen;
pub mod scope;

pub use codegen::Compiler;
