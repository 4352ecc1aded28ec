// mica-parser - Lexer, parser and semantic checker for the Mica scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! # mica-parser
//!
//! Front end of the Mica scripting engine: tokeniser, recursive-descent
//! parser producing [`ast::AstNode`] trees, and the pre-codegen semantic
//! checker.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod semantic;

pub use ast::{
    AssignOp, AstKind, AstNode, BinaryOp, ExtendsClause, ObjectProperty, PostfixOp, PrefixOp,
};
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::Parser;
pub use semantic::semantic_check;
