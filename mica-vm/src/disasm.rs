// mica-vm - Disassembler
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Routine disassembly, rendered as JSON for the harness artifacts.
//!
//! Function and class constants carry their own routines; the full dump
//! includes every routine reachable from the root so a test artifact
//! shows the whole compilation.

use std::collections::HashSet;
use std::rc::Rc;

use serde_json::{json, Value};

use mica_core::{FnCode, MicaVal, Result, Routine};

use crate::opcode::{self, constant_repr};

/// Disassemble a single routine.
pub fn disassemble(routine: &Routine) -> Result<Value> {
    let mut blocks = Vec::new();
    for block in &routine.blocks {
        let mut lines = Vec::new();
        let mut offset = 0;
        while offset < block.code.len() {
            let (op, next) = opcode::decode(&block.code, offset)?;
            lines.push(json!(op.format(&routine.constants)));
            offset = next;
        }
        blocks.push(json!({
            "code": lines,
            "next": [block.next[0], block.next[1]],
        }));
    }

    let constants: Vec<Value> = routine
        .constants
        .iter()
        .map(|c| json!(constant_repr(c)))
        .collect();

    Ok(json!({
        "id": routine.id,
        "constants": constants,
        "blocks": blocks,
    }))
}

/// Disassemble a routine and every routine reachable through its
/// constant pool (nested functions, class constructors and methods).
pub fn disassemble_all(root: &Rc<Routine>) -> Result<Value> {
    let mut seen: HashSet<u32> = HashSet::new();
    let mut routines = Vec::new();
    disassemble_into(root, &mut seen, &mut routines)?;
    Ok(Value::Array(routines))
}

fn disassemble_into(
    routine: &Rc<Routine>,
    seen: &mut HashSet<u32>,
    out: &mut Vec<Value>,
) -> Result<()> {
    if !seen.insert(routine.id) {
        return Ok(());
    }
    out.push(disassemble(routine)?);

    for constant in &routine.constants {
        for nested in nested_routines(constant) {
            disassemble_into(&nested, seen, out)?;
        }
    }
    Ok(())
}

/// Routines reachable from one constant value.
pub fn nested_routines(value: &MicaVal) -> Vec<Rc<Routine>> {
    match value {
        MicaVal::Function(f) => match &f.code {
            FnCode::Routine(routine) => vec![Rc::clone(routine)],
            FnCode::Native(_) => Vec::new(),
        },
        MicaVal::Class(c) => {
            let mut routines = Vec::new();
            if let FnCode::Routine(routine) = &c.constructor.code {
                routines.push(Rc::clone(routine));
            }
            for name in c.members.keys() {
                if let Some(member) = c.find_member(name) {
                    routines.extend(nested_routines(&member));
                }
            }
            routines
        }
        _ => Vec::new(),
    }
}
