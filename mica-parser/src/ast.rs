// mica-parser - Abstract syntax tree
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! AST node types produced by the parser.
//!
//! Every node carries the position of its first token. Literals hold
//! ready-made values, so octal/hex handling is settled by the lexer and
//! never revisited. The actor-subsystem kinds are reserved: the parser
//! never produces them and codegen rejects them.

use serde_json::{json, Value};

use mica_core::{value_to_json, MicaVal, ScriptPosition};

/// An AST node: a kind plus the source position of its first token.
#[derive(Debug, Clone)]
pub struct AstNode {
    pub kind: AstKind,
    pub pos: ScriptPosition,
}

impl AstNode {
    pub fn new(kind: AstKind, pos: ScriptPosition) -> Self {
        Self { kind, pos }
    }

    /// The declared name of this node, when it has one (variables,
    /// functions, classes); used by the semantic checker and `export`.
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            AstKind::Var { name, .. } => Some(name),
            AstKind::Function { name, .. } if !name.is_empty() => Some(name),
            AstKind::Class { name, .. } => Some(name),
            AstKind::Identifier(name) => Some(name),
            _ => None,
        }
    }
}

/// One property of an object literal.
#[derive(Debug, Clone)]
pub struct ObjectProperty {
    pub name: String,
    pub value: AstNode,
    pub is_const: bool,
    pub pos: ScriptPosition,
}

/// The `extends` clause of a class declaration.
#[derive(Debug, Clone)]
pub struct ExtendsClause {
    pub parent: String,
    /// Explicit base-constructor arguments. `None` means the parent's
    /// parameters are inherited.
    pub args: Option<Vec<AstNode>>,
    pub pos: ScriptPosition,
}

/// Compound-assignment operator (`Assign` is plain `=`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Lshift,
    Rshift,
    RshiftU,
}

/// Binary operators. `LogicalAnd`/`LogicalOr` short-circuit; everything
/// else lowers to an operator native.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Power,
    BitAnd,
    BitOr,
    BitXor,
    Lshift,
    Rshift,
    RshiftU,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    LogicalAnd,
    LogicalOr,
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    Neg,
    Plus,
    Not,
    BitNot,
    Inc,
    Dec,
}

/// Postfix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostfixOp {
    Inc,
    Dec,
}

/// AST node kinds.
#[derive(Debug, Clone)]
pub enum AstKind {
    /// Whole script: a list of top-level statements.
    Script(Vec<AstNode>),
    /// `{ ... }` statement block.
    Block(Vec<AstNode>),
    /// `var`/`const` declaration.
    Var {
        name: String,
        init: Option<Box<AstNode>>,
        is_const: bool,
    },
    /// `if` statement, or `?:` when `conditional` is set: both arms of a
    /// conditional expression leave a value on the stack.
    If {
        condition: Box<AstNode>,
        then_branch: Box<AstNode>,
        else_branch: Option<Box<AstNode>>,
        conditional: bool,
    },
    /// `for (init; condition; step) body`; `while` drops init and step.
    For {
        init: Option<Box<AstNode>>,
        condition: Option<Box<AstNode>>,
        step: Option<Box<AstNode>>,
        body: Box<AstNode>,
    },
    /// `for (name in sequence) body`.
    ForEach {
        var_name: String,
        sequence: Box<AstNode>,
        body: Box<AstNode>,
    },
    /// `return [expr];`
    Return(Option<Box<AstNode>>),
    /// Function declaration or expression (empty name = anonymous).
    Function {
        name: String,
        params: Vec<String>,
        body: Box<AstNode>,
    },
    /// Assignment, possibly compound.
    Assignment {
        op: AssignOp,
        target: Box<AstNode>,
        value: Box<AstNode>,
    },
    /// Binary operation.
    Binary {
        op: BinaryOp,
        left: Box<AstNode>,
        right: Box<AstNode>,
    },
    /// Prefix operation.
    Prefix {
        op: PrefixOp,
        operand: Box<AstNode>,
    },
    /// Postfix operation.
    Postfix {
        op: PostfixOp,
        operand: Box<AstNode>,
    },
    /// Function call.
    Call {
        callee: Box<AstNode>,
        args: Vec<AstNode>,
    },
    /// Literal value.
    Literal(MicaVal),
    /// Identifier reference.
    Identifier(String),
    /// `[a, b, ...]`
    ArrayLiteral(Vec<AstNode>),
    /// `{ key: value, const key: value, ... }`
    ObjectLiteral(Vec<ObjectProperty>),
    /// `object.field`
    Member {
        object: Box<AstNode>,
        field: String,
    },
    /// `object[index]`
    Index {
        object: Box<AstNode>,
        index: Box<AstNode>,
    },
    /// Class declaration.
    Class {
        name: String,
        params: Vec<String>,
        extends: Option<ExtendsClause>,
        members: Vec<AstNode>,
    },
    /// `export <declaration>`
    Export(Box<AstNode>),
    /// `import <path>;`
    Import(Box<AstNode>),

    // Reserved for the actor subsystem. The parser never produces these
    // and codegen rejects them.
    Actor {
        name: String,
    },
    Connect,
    InputEndpoint,
    OutputEndpoint,
}

// ============================================================================
// JSON dump
// ============================================================================

impl AstNode {
    /// Render the node as JSON for the harness artifact.
    pub fn to_json(&self) -> Value {
        let mut v = self.kind.to_json();
        if let Value::Object(map) = &mut v {
            map.insert("pos".into(), json!([self.pos.line, self.pos.column]));
        }
        v
    }
}

fn nodes_json(nodes: &[AstNode]) -> Value {
    Value::Array(nodes.iter().map(|n| n.to_json()).collect())
}

fn opt_json(node: &Option<Box<AstNode>>) -> Value {
    match node {
        Some(n) => n.to_json(),
        None => Value::Null,
    }
}

impl AstKind {
    fn to_json(&self) -> Value {
        match self {
            AstKind::Script(stmts) => json!({"type": "Script", "body": nodes_json(stmts)}),
            AstKind::Block(stmts) => json!({"type": "Block", "body": nodes_json(stmts)}),
            AstKind::Var {
                name,
                init,
                is_const,
            } => json!({
                "type": if *is_const { "Const" } else { "Var" },
                "name": name,
                "init": opt_json(init),
            }),
            AstKind::If {
                condition,
                then_branch,
                else_branch,
                conditional,
            } => json!({
                "type": if *conditional { "Conditional" } else { "If" },
                "condition": condition.to_json(),
                "then": then_branch.to_json(),
                "else": opt_json(else_branch),
            }),
            AstKind::For {
                init,
                condition,
                step,
                body,
            } => json!({
                "type": "For",
                "init": opt_json(init),
                "condition": opt_json(condition),
                "step": opt_json(step),
                "body": body.to_json(),
            }),
            AstKind::ForEach {
                var_name,
                sequence,
                body,
            } => json!({
                "type": "ForEach",
                "var": var_name,
                "sequence": sequence.to_json(),
                "body": body.to_json(),
            }),
            AstKind::Return(expr) => json!({"type": "Return", "value": opt_json(expr)}),
            AstKind::Function { name, params, body } => json!({
                "type": "Function",
                "name": name,
                "params": params,
                "body": body.to_json(),
            }),
            AstKind::Assignment { op, target, value } => json!({
                "type": "Assignment",
                "op": format!("{:?}", op),
                "target": target.to_json(),
                "value": value.to_json(),
            }),
            AstKind::Binary { op, left, right } => json!({
                "type": "Binary",
                "op": format!("{:?}", op),
                "left": left.to_json(),
                "right": right.to_json(),
            }),
            AstKind::Prefix { op, operand } => json!({
                "type": "Prefix",
                "op": format!("{:?}", op),
                "operand": operand.to_json(),
            }),
            AstKind::Postfix { op, operand } => json!({
                "type": "Postfix",
                "op": format!("{:?}", op),
                "operand": operand.to_json(),
            }),
            AstKind::Call { callee, args } => json!({
                "type": "Call",
                "callee": callee.to_json(),
                "args": nodes_json(args),
            }),
            AstKind::Literal(value) => json!({
                "type": "Literal",
                "value": value_to_json(value),
            }),
            AstKind::Identifier(name) => json!({"type": "Identifier", "name": name}),
            AstKind::ArrayLiteral(items) => json!({
                "type": "ArrayLiteral",
                "items": nodes_json(items),
            }),
            AstKind::ObjectLiteral(props) => json!({
                "type": "ObjectLiteral",
                "properties": props.iter().map(|p| json!({
                    "name": p.name,
                    "const": p.is_const,
                    "value": p.value.to_json(),
                })).collect::<Vec<_>>(),
            }),
            AstKind::Member { object, field } => json!({
                "type": "Member",
                "object": object.to_json(),
                "field": field,
            }),
            AstKind::Index { object, index } => json!({
                "type": "Index",
                "object": object.to_json(),
                "index": index.to_json(),
            }),
            AstKind::Class {
                name,
                params,
                extends,
                members,
            } => json!({
                "type": "Class",
                "name": name,
                "params": params,
                "extends": extends.as_ref().map(|e| json!({
                    "parent": e.parent,
                    "args": e.args.as_ref().map(|a| nodes_json(a)),
                })),
                "members": nodes_json(members),
            }),
            AstKind::Export(child) => json!({"type": "Export", "value": child.to_json()}),
            AstKind::Import(path) => json!({"type": "Import", "path": path.to_json()}),
            AstKind::Actor { name } => json!({"type": "Actor", "name": name}),
            AstKind::Connect => json!({"type": "Connect"}),
            AstKind::InputEndpoint => json!({"type": "InputEndpoint"}),
            AstKind::OutputEndpoint => json!({"type": "OutputEndpoint"}),
        }
    }
}
