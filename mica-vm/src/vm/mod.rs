// mica-vm - Virtual machine
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The Mica virtual machine.
//!
//! Executes routines one block at a time: the inner loop decodes and
//! dispatches instruction bytes, the outer loop follows successor
//! indices until a terminal block. Leaving a block whose successors
//! differ pops one value and branches on its truthiness; equal
//! successors consume nothing.
//!
//! Calls resolve polymorphically: objects redirect through their `call`
//! field (becoming `this`), classes run their constructor with `this`
//! bound to the class, closures deliver their captured environment as an
//! implicit trailing argument. A pending-`this` register, set by
//! `WR_THISP` and cleared by every call, supplies the `this` value.

pub mod frame;
pub mod stack;

use std::rc::Rc;

use mica_core::{
    Error, FnCode, FunctionData, MicaVal, NativeContext, Result, Routine, VmPosition,
};

use crate::opcode::{self, Op};

pub use frame::CallFrame;
pub use stack::ValueStack;

/// Hook receiving one formatted line per executed instruction.
pub type TraceHook = Box<dyn FnMut(&str)>;

/// How many `call`-field redirections a single call may take.
const MAX_CALL_REDIRECTS: usize = 64;

/// The Mica virtual machine.
pub struct Vm {
    stack: ValueStack,
    frames: Vec<CallFrame>,
    /// One-shot `this` for the next call, set by `WR_THISP`.
    pending_this: Option<MicaVal>,
    /// The running script's globals; the environment of calls that carry
    /// no captured environment of their own.
    globals: MicaVal,
    module_path: String,
    trace_hook: Option<TraceHook>,
    trace_enabled: bool,
}

impl Vm {
    /// Create a new VM.
    pub fn new() -> Self {
        Self {
            stack: ValueStack::new(),
            frames: Vec::new(),
            pending_this: None,
            globals: MicaVal::Null,
            module_path: String::new(),
            trace_hook: None,
            trace_enabled: false,
        }
    }

    /// Set the module path reported to natives and module imports.
    pub fn set_module_path(&mut self, path: impl Into<String>) {
        self.module_path = path.into();
    }

    /// Install the per-instruction trace hook. Tracing stays dormant
    /// until a script calls `enableTraceLog()`.
    pub fn set_trace_hook(&mut self, hook: TraceHook) {
        self.trace_hook = Some(hook);
    }

    /// Execute a script routine against an environment (globals) object.
    ///
    /// The environment rides just below the routine's locals region,
    /// exactly where a closure call would put it; the script's result
    /// value is returned.
    pub fn run_script(&mut self, routine: &Rc<Routine>, globals: MicaVal) -> Result<MicaVal> {
        self.globals = globals.clone();
        let base = self.stack.len();
        self.stack.push(globals);
        self.frames
            .push(CallFrame::new(Some(Rc::clone(routine)), base, 0, MicaVal::Null));

        let result = self.exec_routine(routine);

        self.frames.pop();
        self.stack.truncate(base);
        result
    }

    // ========================================================================
    // Execution loops
    // ========================================================================

    /// Run a routine's block graph to completion; the routine's final
    /// value is popped and returned.
    fn exec_routine(&mut self, routine: &Rc<Routine>) -> Result<MicaVal> {
        let mut next: i32 = 0;
        while next >= 0 {
            next = self.exec_block(routine, next as usize)?;
        }
        self.stack.pop()
    }

    /// Execute one block; returns the next block index (-1 terminates).
    fn exec_block(&mut self, routine: &Rc<Routine>, block_idx: usize) -> Result<i32> {
        let block = routine.blocks.get(block_idx).ok_or_else(|| {
            Error::runtime(format!("Block index {} out of bounds", block_idx))
        })?;

        let mut offset = 0;
        while offset < block.code.len() {
            let instr_offset = offset;
            let position = VmPosition::new(routine.id, block_idx as u32, instr_offset as u32);

            let (op, next_offset) = opcode::decode(&block.code, offset)
                .map_err(|e| e.with_vm_position(position))?;
            offset = next_offset;

            if self.trace_enabled && self.trace_hook.is_some() {
                self.trace(&op, routine);
            }

            self.exec_op(op, routine)
                .map_err(|e| e.with_vm_position(position))?;
        }

        if block.next[0] == block.next[1] {
            Ok(block.next[0])
        } else {
            let condition = self.stack.pop().map_err(|e| {
                e.with_vm_position(VmPosition::new(
                    routine.id,
                    block_idx as u32,
                    block.code.len() as u32,
                ))
            })?;
            Ok(block.next[if condition.to_bool() { 1 } else { 0 }])
        }
    }

    fn exec_op(&mut self, op: Op, routine: &Rc<Routine>) -> Result<()> {
        match op {
            Op::Call(n) => self.exec_call(n),
            Op::Cp(offset) => {
                let value = self
                    .stack
                    .peek(offset)
                    .map_err(|_| Error::runtime("Stack underflow in CP operation"))?;
                self.stack.push(value);
                Ok(())
            }
            Op::Wr(offset) => {
                let value = self.stack.peek(0)?;
                if offset + 2 > self.stack.len() {
                    return Err(Error::runtime("Stack underflow in WR operation"));
                }
                let index = self.stack.len() - 1 - (offset + 1);
                self.stack.set(index, value)
            }
            Op::Swap => {
                let a = self.stack.pop()?;
                let b = self.stack.pop()?;
                self.stack.push(a);
                self.stack.push(b);
                Ok(())
            }
            Op::Pop => {
                self.stack.pop()?;
                Ok(())
            }
            Op::RdField => {
                let name = self.stack.pop()?;
                let object = self.stack.pop()?;
                let value = object.read_field(&name.to_display_string())?;
                self.stack.push(value);
                Ok(())
            }
            Op::WrField => self.write_field_op(false),
            Op::NewConstField => self.write_field_op(true),
            Op::RdIndex => {
                let key = self.stack.pop()?;
                let container = self.stack.pop()?;
                let value = container.get_at(&key)?;
                self.stack.push(value);
                Ok(())
            }
            Op::WrIndex => {
                let value = self.stack.pop()?;
                let key = self.stack.pop()?;
                let container = self.stack.pop()?;
                let value = container.set_at(&key, value)?;
                self.stack.push(value);
                Ok(())
            }
            Op::RdParam => {
                let index = self.stack.pop()?;
                let value = self.param_at(&index).unwrap_or(MicaVal::Null);
                self.stack.push(value);
                Ok(())
            }
            Op::WrParam => {
                let value = self.stack.pop()?;
                let index = self.stack.pop()?;
                let frame = self.frame();
                let (start, count) = (frame.params_start, frame.n_params);
                if index.is_integer()
                    && index.to_double() >= 0.0
                    && (index.to_double() as usize) < count
                {
                    let slot = start + index.to_double() as usize;
                    self.stack.set(slot, value.clone())?;
                    self.stack.push(value);
                } else {
                    self.stack.push(MicaVal::Null);
                }
                Ok(())
            }
            Op::NumParams => {
                let count = self.frame().n_params;
                self.stack.push(MicaVal::Number(count as f64));
                Ok(())
            }
            Op::PushThis => {
                let this = self.frame().this.clone();
                self.stack.push(this);
                Ok(())
            }
            Op::WrThisp => {
                let top = self.stack.peek(0)?;
                self.pending_this = Some(top);
                Ok(())
            }
            Op::PushC(index) => {
                let value = routine.constants.get(index).cloned().ok_or_else(|| {
                    Error::runtime(format!("Constant index {} out of bounds", index))
                })?;
                self.stack.push(value);
                Ok(())
            }
            Op::Nop => Ok(()),
        }
    }

    fn write_field_op(&mut self, is_const: bool) -> Result<()> {
        let value = self.stack.pop()?;
        let name = self.stack.pop()?;
        let object = self.stack.pop()?;
        let value = object.write_field(&name.to_display_string(), value, is_const)?;
        self.stack.push(value);
        Ok(())
    }

    fn param_at(&self, index: &MicaVal) -> Option<MicaVal> {
        if !index.is_integer() || index.to_double() < 0.0 {
            return None;
        }
        let i = index.to_double() as usize;
        let frame = self.frames.last()?;
        if i >= frame.n_params {
            return None;
        }
        self.stack.get(frame.params_start + i).ok()
    }

    fn frame(&self) -> &CallFrame {
        self.frames.last().expect("the VM always has an active frame")
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Execute a call with `n_args` argument slots below the callee.
    fn exec_call(&mut self, n_args: usize) -> Result<()> {
        if self.stack.len() < n_args + 1 {
            return Err(Error::runtime("Stack underflow executing function call"));
        }

        let mut callee = self.stack.pop()?;
        let mut this = self.pending_this.take().unwrap_or(MicaVal::Null);

        // Resolve the callee to a function, following `call` fields. The
        // callee's environment value is delivered between the arguments
        // and its locals region - where `getEnv` reads, but outside the
        // `RD_PARAM` range. Closures and classes bring their own; plain
        // functions (class methods included) fall back to the globals.
        let mut environment = self.globals.clone();
        let mut redirects = 0;
        let function: Rc<FunctionData> = loop {
            match callee {
                MicaVal::Function(f) => break f,
                MicaVal::Closure(c) => {
                    environment = c.env.clone();
                    break Rc::clone(&c.function);
                }
                MicaVal::Class(c) => {
                    this = MicaVal::Class(Rc::clone(&c));
                    environment = c.env();
                    break Rc::clone(&c.constructor);
                }
                MicaVal::Object(_) => {
                    redirects += 1;
                    if redirects > MAX_CALL_REDIRECTS {
                        return Err(Error::runtime("Trying to call a non-function value"));
                    }
                    let target = callee.read_field("call")?;
                    if target.is_null() {
                        return Err(Error::runtime(format!(
                            "Trying to call a non-function value: {}",
                            callee.type_of()
                        )));
                    }
                    this = callee;
                    callee = target;
                }
                other => {
                    return Err(Error::runtime(format!(
                        "Trying to call a non-function value: {}",
                        other.type_of()
                    )));
                }
            }
        };

        let params_start = self.stack.len() - n_args;
        self.stack.push(environment);
        self.frames.push(CallFrame::new(
            match &function.code {
                FnCode::Routine(routine) => Some(Rc::clone(routine)),
                FnCode::Native(_) => None,
            },
            params_start,
            n_args,
            this,
        ));

        let result = match &function.code {
            FnCode::Native(native) => native(self),
            FnCode::Routine(routine) => {
                let routine = Rc::clone(routine);
                self.exec_routine(&routine)
            }
        };

        self.frames.pop();
        let result = result?;

        // Drop the arguments; the call's value replaces them.
        self.stack.truncate(params_start);
        self.stack.push(result);
        Ok(())
    }

    // ========================================================================
    // Tracing
    // ========================================================================

    fn trace(&mut self, op: &Op, routine: &Rc<Routine>) {
        let instruction = op.format(&routine.constants);
        let line = if self.stack.is_empty() {
            format!("{:<24}\t[Empty stack]", instruction)
        } else {
            let top = self.stack.peek(0).unwrap_or(MicaVal::Null);
            let repr = opcode::constant_repr(&top);
            format!("{:<24}\t[{}]", instruction, repr)
        };

        // The hook is taken for the call so it may inspect the VM-free
        // line without aliasing self.
        if let Some(mut hook) = self.trace_hook.take() {
            hook(&line);
            self.trace_hook = Some(hook);
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Native-function context
// ============================================================================

impl NativeContext for Vm {
    fn get_param(&self, index: usize) -> MicaVal {
        let Some(frame) = self.frames.last() else {
            return MicaVal::Null;
        };
        if index >= frame.n_params {
            return MicaVal::Null;
        }
        self.stack
            .get(frame.params_start + index)
            .unwrap_or(MicaVal::Null)
    }

    fn num_params(&self) -> usize {
        self.frames.last().map(|f| f.n_params).unwrap_or(0)
    }

    fn get_this(&self) -> MicaVal {
        self.frames
            .last()
            .map(|f| f.this.clone())
            .unwrap_or(MicaVal::Null)
    }

    fn module_path(&self) -> &str {
        &self.module_path
    }

    fn push(&mut self, value: MicaVal) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<MicaVal> {
        self.stack.pop()
    }

    fn set_trace_enabled(&mut self, enabled: bool) {
        self.trace_enabled = enabled;
    }
}
