// mica-vm - Code to source position map
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Maps `(routine, block, instruction)` positions to source positions.
//!
//! Populated during codegen, consumed by runtime error reporting and the
//! trace logger.

use std::collections::HashMap;

use mica_core::{ScriptPosition, VmPosition};

/// Code→source position map for a compilation.
#[derive(Debug, Default)]
pub struct CodeMap {
    map: HashMap<VmPosition, ScriptPosition>,
}

impl CodeMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the source position of an emitted instruction.
    pub fn add(&mut self, vm_pos: VmPosition, source: ScriptPosition) {
        self.map.insert(vm_pos, source);
    }

    /// Source position of a VM position, if recorded.
    pub fn get(&self, vm_pos: &VmPosition) -> Option<ScriptPosition> {
        self.map.get(vm_pos).copied()
    }

    /// Number of recorded instructions.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let mut map = CodeMap::new();
        let vm_pos = VmPosition::new(0, 1, 2);
        map.add(vm_pos, ScriptPosition::new(10, 4));
        assert_eq!(map.get(&vm_pos), Some(ScriptPosition::new(10, 4)));
        assert_eq!(map.get(&VmPosition::new(0, 1, 3)), None);
    }
}
