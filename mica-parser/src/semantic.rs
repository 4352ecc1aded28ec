// mica-parser - Semantic checker
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Pre-codegen semantic analysis.
//!
//! Rejects, on the first finding: reserved names (`this`, `arguments`,
//! `eval`) used as declaration names, parameters or write targets;
//! duplicate object-literal keys; duplicate class names; undefined base
//! classes; `export` outside the top level; `import` outside the top
//! level or after a non-import statement.

use std::collections::HashSet;

use mica_core::{Error, Result, ScriptPosition};

use crate::ast::{AstKind, AstNode, PrefixOp};

const RESERVED: [&str; 3] = ["this", "arguments", "eval"];

#[derive(Clone)]
struct SemState {
    classes: HashSet<String>,
}

/// Run the semantic checker over a parsed script.
pub fn semantic_check(script: &AstNode) -> Result<()> {
    let statements = match &script.kind {
        AstKind::Script(statements) => statements,
        _ => {
            return Err(Error::semantic(
                "Semantic analysis expects a script node",
                script.pos,
            ));
        }
    };

    let mut state = SemState {
        classes: HashSet::new(),
    };

    let mut seen_non_import = false;
    for statement in statements {
        match &statement.kind {
            AstKind::Import(_) => {
                if seen_non_import {
                    return Err(Error::semantic(
                        "Import statements must come before any other statements",
                        statement.pos,
                    ));
                }
            }
            _ => seen_non_import = true,
        }
        check(statement, &mut state, true)?;
    }
    Ok(())
}

fn check(node: &AstNode, state: &mut SemState, top_level: bool) -> Result<()> {
    match &node.kind {
        AstKind::Script(statements) | AstKind::Block(statements) => {
            for statement in statements {
                check(statement, state, false)?;
            }
        }
        AstKind::Var { name, init, .. } => {
            check_reserved(name, node.pos, "Invalid variable name")?;
            if let Some(init) = init {
                check(init, state, false)?;
            }
        }
        AstKind::If {
            condition,
            then_branch,
            else_branch,
            ..
        } => {
            check(condition, state, false)?;
            check(then_branch, state, false)?;
            if let Some(else_branch) = else_branch {
                check(else_branch, state, false)?;
            }
        }
        AstKind::For {
            init,
            condition,
            step,
            body,
        } => {
            for child in [init, condition, step].into_iter().flatten() {
                check(child, state, false)?;
            }
            check(body, state, false)?;
        }
        AstKind::ForEach {
            var_name,
            sequence,
            body,
        } => {
            check_reserved(var_name, node.pos, "Invalid variable name")?;
            check(sequence, state, false)?;
            check(body, state, false)?;
        }
        AstKind::Return(value) => {
            if let Some(value) = value {
                check(value, state, false)?;
            }
        }
        AstKind::Function { name, params, body } => {
            if !name.is_empty() {
                check_reserved(name, node.pos, "Invalid function name")?;
            }
            for param in params {
                check_reserved(param, node.pos, "Invalid parameter name")?;
            }
            // Function bodies see a copy of the class set; classes they
            // define stay local.
            let mut fn_state = state.clone();
            check(body, &mut fn_state, false)?;
        }
        AstKind::Assignment { target, value, .. } => {
            check_write_target(target)?;
            check(target, state, false)?;
            check(value, state, false)?;
        }
        AstKind::Binary { left, right, .. } => {
            check(left, state, false)?;
            check(right, state, false)?;
        }
        AstKind::Prefix { op, operand } => {
            if matches!(op, PrefixOp::Inc | PrefixOp::Dec) {
                check_write_target(operand)?;
            }
            check(operand, state, false)?;
        }
        AstKind::Postfix { operand, .. } => {
            check_write_target(operand)?;
            check(operand, state, false)?;
        }
        AstKind::Call { callee, args } => {
            check(callee, state, false)?;
            for arg in args {
                check(arg, state, false)?;
            }
        }
        AstKind::ObjectLiteral(properties) => {
            let mut used: HashSet<&str> = HashSet::new();
            for property in properties {
                if !used.insert(&property.name) {
                    return Err(Error::semantic(
                        format!("Duplicated key in object: {}", property.name),
                        property.pos,
                    ));
                }
                check(&property.value, state, false)?;
            }
        }
        AstKind::ArrayLiteral(items) => {
            for item in items {
                check(item, state, false)?;
            }
        }
        AstKind::Member { object, .. } => check(object, state, false)?,
        AstKind::Index { object, index } => {
            check(object, state, false)?;
            check(index, state, false)?;
        }
        AstKind::Class {
            name,
            params,
            extends,
            members,
        } => {
            check_reserved(name, node.pos, "Invalid class name")?;
            if state.classes.contains(name) {
                return Err(Error::semantic(
                    format!("'{}' class already defined. Use another name", name),
                    node.pos,
                ));
            }
            for param in params {
                check_reserved(param, node.pos, "Invalid parameter name")?;
            }
            if let Some(extends) = extends {
                if !state.classes.contains(&extends.parent) {
                    return Err(Error::semantic(
                        format!("Base class '{}' not defined", extends.parent),
                        extends.pos,
                    ));
                }
                if let Some(args) = &extends.args {
                    for arg in args {
                        check(arg, state, false)?;
                    }
                }
            }
            state.classes.insert(name.clone());

            let mut class_state = state.clone();
            for member in members {
                check(member, &mut class_state, false)?;
            }
        }
        AstKind::Export(child) => {
            if !top_level {
                return Err(Error::semantic("Exported symbols must be globals", node.pos));
            }
            if child.name().is_none() {
                return Err(Error::semantic("Cannot export an unnamed symbol", child.pos));
            }
            check(child, state, true)?;
        }
        AstKind::Import(path) => {
            if !top_level {
                return Err(Error::semantic(
                    "Import statements must be top-level elements",
                    node.pos,
                ));
            }
            check(path, state, false)?;
        }
        AstKind::Literal(_)
        | AstKind::Identifier(_)
        | AstKind::Actor { .. }
        | AstKind::Connect
        | AstKind::InputEndpoint
        | AstKind::OutputEndpoint => {}
    }
    Ok(())
}

fn check_reserved(name: &str, pos: ScriptPosition, message: &str) -> Result<()> {
    if RESERVED.contains(&name) {
        return Err(Error::semantic(format!("{}: {}", message, name), pos));
    }
    Ok(())
}

/// Reserved names cannot be written through any lvalue shape.
fn check_write_target(target: &AstNode) -> Result<()> {
    if let AstKind::Identifier(name) = &target.kind {
        if RESERVED.contains(&name.as_str()) {
            return Err(Error::semantic(
                format!("Cannot write to: {}", name),
                target.pos,
            ));
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn check_source(source: &str) -> Result<()> {
        let ast = Parser::parse_script(source)?;
        semantic_check(&ast)
    }

    #[test]
    fn test_reserved_names() {
        assert!(check_source("var this = 1;").is_err());
        assert!(check_source("eval = 1;").is_err());
        assert!(check_source("function f(arguments) {}").is_err());
        assert!(check_source("arguments++;").is_err());
        assert!(check_source("var ok = 1;").is_ok());
        // Reading `this` is fine; writing is not.
        assert!(check_source("var x = this;").is_ok());
        assert!(check_source("this = 1;").is_err());
    }

    #[test]
    fn test_duplicate_object_keys() {
        assert!(check_source("var o = {a: 1, a: 2};").is_err());
        assert!(check_source("var o = {a: 1, b: 2};").is_ok());
    }

    #[test]
    fn test_class_rules() {
        assert!(check_source("class A {} class A {}").is_err());
        assert!(check_source("class B extends Missing {}").is_err());
        assert!(check_source("class A {} class B extends A {}").is_ok());
    }

    #[test]
    fn test_export_import_placement() {
        assert!(check_source("export function f() {}").is_ok());
        assert!(check_source("function g() { export var x = 1; }").is_err());
        assert!(check_source("export 1 + 2;").is_err());

        assert!(check_source("import 'm.mica'; var x = 1;").is_ok());
        assert!(check_source("var x = 1; import 'm.mica';").is_err());
        assert!(check_source("function g() { import 'm.mica'; }").is_err());
    }
}
