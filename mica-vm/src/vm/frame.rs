// mica-vm - Call frames
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Call frames for the VM.

use std::rc::Rc;

use mica_core::{MicaVal, Routine};

/// Per-invocation metadata: the routine (and through it the constant
/// pool), where this call's parameters start on the operand stack, how
/// many there are, and the call's `this` value. Native calls carry no
/// routine.
#[derive(Debug)]
pub struct CallFrame {
    pub routine: Option<Rc<Routine>>,
    /// Index of the first parameter on the operand stack.
    pub params_start: usize,
    /// Parameter count. A closure's environment value sits above the
    /// parameters but is not one of them.
    pub n_params: usize,
    /// The `this` value of this call.
    pub this: MicaVal,
}

impl CallFrame {
    /// Create a new call frame.
    pub fn new(
        routine: Option<Rc<Routine>>,
        params_start: usize,
        n_params: usize,
        this: MicaVal,
    ) -> Self {
        Self {
            routine,
            params_start,
            n_params,
            this,
        }
    }
}
