// mica-vm - Stack-depth checker
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Static verification of a routine's stack discipline.
//!
//! Simulates execution over the block graph using the one true delta
//! table ([`crate::opcode::Op::stack_effect`]) and checks, for every
//! block reachable from block 0:
//!
//! - the depth never drops below the routine's locals region,
//! - a conditional block end has a value to pop,
//! - all paths into a block agree on its entry depth,
//! - terminal blocks leave exactly one value.
//!
//! `CP` offsets may legally reach below the locals region (that is how
//! the environment is read), so only net-depth underflow is flagged.

use std::collections::HashMap;

use mica_core::Routine;

use crate::opcode;

/// A stack-discipline violation found in a routine.
#[derive(Debug, Clone)]
pub struct StackCheckError {
    pub routine: u32,
    pub block: usize,
    pub message: String,
}

impl std::fmt::Display for StackCheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Stack check failed in routine {}, block {}: {}",
            self.routine, self.block, self.message
        )
    }
}

impl std::error::Error for StackCheckError {}

/// Verify a routine's stack discipline along every reachable path.
pub fn check_routine(routine: &Routine) -> Result<(), StackCheckError> {
    let fail = |block: usize, message: String| StackCheckError {
        routine: routine.id,
        block,
        message,
    };

    let mut entry_depth: HashMap<usize, i32> = HashMap::new();
    let mut worklist = vec![(0usize, 0i32)];

    while let Some((block_idx, depth_in)) = worklist.pop() {
        match entry_depth.get(&block_idx) {
            Some(&known) => {
                if known != depth_in {
                    return Err(fail(
                        block_idx,
                        format!("inconsistent entry depth: {} vs {}", known, depth_in),
                    ));
                }
                continue;
            }
            None => {
                entry_depth.insert(block_idx, depth_in);
            }
        }

        let block = routine
            .blocks
            .get(block_idx)
            .ok_or_else(|| fail(block_idx, "block index out of bounds".to_string()))?;

        let mut depth = depth_in;
        let mut offset = 0;
        while offset < block.code.len() {
            let (op, next) = opcode::decode(&block.code, offset)
                .map_err(|e| fail(block_idx, e.to_string()))?;
            offset = next;
            depth += op.stack_effect();
            if depth < 0 {
                return Err(fail(
                    block_idx,
                    format!("stack underflow after {}", op.format(&routine.constants)),
                ));
            }
        }

        if block.is_terminal() {
            if depth != 1 {
                return Err(fail(
                    block_idx,
                    format!("terminal block leaves {} values, expected 1", depth),
                ));
            }
            continue;
        }

        let exit_depth = if block.is_conditional() {
            if depth < 1 {
                return Err(fail(
                    block_idx,
                    "conditional block end with no value to pop".to_string(),
                ));
            }
            depth - 1
        } else {
            depth
        };

        for &successor in &block.next {
            if successor >= 0 {
                worklist.push((successor as usize, exit_depth));
            } else if block.is_conditional() && exit_depth != 1 {
                // A conditional edge straight out of the routine must
                // still leave the single result value.
                return Err(fail(
                    block_idx,
                    format!("terminal edge leaves {} values, expected 1", exit_depth),
                ));
            }
        }
    }

    Ok(())
}

/// Check a routine and every routine reachable through its constants.
pub fn check_routine_tree(routine: &std::rc::Rc<Routine>) -> Result<(), StackCheckError> {
    let mut seen = std::collections::HashSet::new();
    let mut stack = vec![std::rc::Rc::clone(routine)];
    while let Some(current) = stack.pop() {
        if !seen.insert(current.id) {
            continue;
        }
        check_routine(&current)?;
        for constant in &current.constants {
            stack.extend(crate::disasm::nested_routines(constant));
        }
    }
    Ok(())
}
