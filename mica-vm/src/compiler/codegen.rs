// mica-vm - Bytecode generation
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Code generation: AST to routine.
//!
//! The compiler walks the AST keeping a compile-time stack-depth counter
//! exactly in sync with the instructions it emits: every emission helper
//! applies the instruction's delta from [`crate::opcode::Op::stack_effect`],
//! and ending a block with differing successors accounts for the
//! condition value the VM pops there. Locals are operand-stack slots: a
//! name declared in a block scope lives at the stack index it had at
//! declaration time for the rest of the scope.
//!
//! The environment value sits just below the routine's locals region
//! (it is the implicit trailing argument of every closure call), so
//! reading it is `CP(depth)` - a copy of the deepest reachable element.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use mica_core::builtins::classes;
use mica_core::{
    Block, ClassData, Error, Field, FieldMap, FunctionData, MicaVal, Result, Routine,
    ScriptPosition, VmPosition, NO_BLOCK,
};
use mica_parser::{AssignOp, AstKind, AstNode, BinaryOp, ExtendsClause, PostfixOp, PrefixOp};

use crate::codemap::CodeMap;
use crate::opcode::{
    self, OC16_CALL, OC16_CP, OC16_CP_MAX, OC16_PUSHC, OC16_WR, OC16_WR_MAX, OC_CALL, OC_CALL_MAX,
    OC_CP, OC_CP_MAX, OC_EXT_FLAG, OC_NEW_CONST_FIELD, OC_POP, OC_PUSHC, OC_PUSH_THIS,
    OC_RD_FIELD, OC_RD_INDEX, OC_RD_PARAM, OC_WR, OC_WR_FIELD, OC_WR_INDEX, OC_WR_MAX,
    OC_WR_PARAM, OC_WR_THISP, MAX_CALL_ARGS, MAX_CONSTANTS,
};

use super::scope::Scope;

/// Constant dedup key: only primitives deduplicate; function and class
/// constants are always appended.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstKey {
    Null,
    Bool(bool),
    Num(u64),
    Str(Rc<str>),
}

impl ConstKey {
    fn of(value: &MicaVal) -> Option<ConstKey> {
        match value {
            MicaVal::Null => Some(ConstKey::Null),
            MicaVal::Bool(b) => Some(ConstKey::Bool(*b)),
            MicaVal::Number(n) => Some(ConstKey::Num(n.to_bits())),
            MicaVal::String(s) => Some(ConstKey::Str(Rc::clone(s))),
            _ => None,
        }
    }
}

/// Per-routine codegen state.
struct FnCtx {
    routine: Routine,
    stack_size: i32,
    scopes: Vec<Scope>,
    const_map: HashMap<ConstKey, usize>,
    /// Classes defined in this routine, visible as base classes.
    symbols: HashMap<String, MicaVal>,
    cur_pos: ScriptPosition,
}

impl FnCtx {
    fn new(id: u32, pos: ScriptPosition) -> Self {
        Self {
            routine: Routine::new(id),
            stack_size: 0,
            scopes: Vec::new(),
            const_map: HashMap::new(),
            symbols: HashMap::new(),
            cur_pos: pos,
        }
    }

    fn declare(&mut self, name: &str) {
        let pos = self.stack_size;
        self.scopes
            .last_mut()
            .expect("codegen scope stack is never empty")
            .declare(name, pos);
    }

    /// Whether `name` resolves to a local or parameter. The walk stops at
    /// the first non-block scope (the function boundary).
    fn is_declared(&self, name: &str) -> bool {
        for scope in self.scopes.iter().rev() {
            if scope.is_declared(name) {
                return true;
            }
            if !scope.is_block {
                return false;
            }
        }
        false
    }

    fn is_param(&self, name: &str) -> bool {
        for scope in self.scopes.iter().rev() {
            if scope.is_declared(name) {
                return scope.is_params;
            }
        }
        false
    }

    /// Stack offset (from the top) of a declared local.
    fn local_offset(&self, name: &str) -> Option<i32> {
        for scope in self.scopes.iter().rev() {
            if let Some(pos) = scope.position(name) {
                return Some(self.stack_size - (pos + 1));
            }
        }
        None
    }

    /// Parameter index of a declared parameter.
    fn param_index(&self, name: &str) -> Option<i32> {
        for scope in self.scopes.iter().rev() {
            if let Some(pos) = scope.position(name) {
                if !scope.is_params {
                    return None;
                }
                return Some(pos);
            }
        }
        None
    }

    fn cur_block_id(&self) -> i32 {
        self.routine.blocks.len() as i32 - 1
    }
}

/// The bytecode compiler. One instance compiles one script and all the
/// functions it contains; routine ids and the code map span them all.
pub struct Compiler {
    /// Code→source positions, populated for every emitted instruction.
    pub code_map: CodeMap,
    next_routine_id: u32,
}

impl Compiler {
    /// Create a compiler.
    pub fn new() -> Self {
        Self {
            code_map: CodeMap::new(),
            next_routine_id: 0,
        }
    }

    /// Compile a parsed script into its routine.
    ///
    /// The resulting routine expects a single argument - the environment
    /// (globals) object - and leaves exactly one value, the script
    /// result.
    pub fn compile_script(&mut self, script: &AstNode) -> Result<Rc<Routine>> {
        let statements = match &script.kind {
            AstKind::Script(statements) => statements,
            _ => {
                return Err(Error::codegen("Codegen expects a script node", script.pos));
            }
        };

        let mut ctx = FnCtx::new(self.alloc_routine_id(), script.pos);
        ctx.scopes.push(Scope::new(false, false));

        if statements.is_empty() {
            self.push_null(&mut ctx)?;
        }
        for (i, statement) in statements.iter().enumerate() {
            if i > 0 {
                // Remove the previous statement's result.
                self.emit8(&mut ctx, OC_POP);
            }
            self.codegen(&mut ctx, statement)?;
        }

        log::debug!(
            "compiled script: routine {} with {} blocks, {} constants",
            ctx.routine.id,
            ctx.routine.blocks.len(),
            ctx.routine.constants.len()
        );
        Ok(Rc::new(ctx.routine))
    }

    fn alloc_routine_id(&mut self) -> u32 {
        let id = self.next_routine_id;
        self.next_routine_id += 1;
        id
    }

    // ========================================================================
    // Node dispatch
    // ========================================================================

    fn codegen(&mut self, ctx: &mut FnCtx, node: &AstNode) -> Result<()> {
        let old_pos = ctx.cur_pos;
        ctx.cur_pos = node.pos;
        let result = self.codegen_inner(ctx, node);
        ctx.cur_pos = old_pos;
        result
    }

    fn codegen_inner(&mut self, ctx: &mut FnCtx, node: &AstNode) -> Result<()> {
        match &node.kind {
            AstKind::Script(_) => Err(Error::codegen("Unexpected nested script node", node.pos)),
            AstKind::Block(statements) => self.block_codegen(ctx, statements),
            AstKind::Var {
                name,
                init,
                is_const,
            } => self.var_codegen(ctx, name, init.as_deref(), *is_const),
            AstKind::If {
                condition,
                then_branch,
                else_branch,
                conditional,
            } => self.if_codegen(
                ctx,
                condition,
                then_branch,
                else_branch.as_deref(),
                *conditional,
            ),
            AstKind::For {
                init,
                condition,
                step,
                body,
            } => self.for_codegen(ctx, init.as_deref(), condition.as_deref(), step.as_deref(), body),
            AstKind::ForEach {
                var_name,
                sequence,
                body,
            } => self.for_each_codegen(ctx, node, var_name, sequence, body),
            AstKind::Return(value) => self.return_codegen(ctx, value.as_deref()),
            AstKind::Function { name, params, body } => {
                self.function_codegen(ctx, name, params, body)
            }
            AstKind::Assignment { op, target, value } => {
                self.assignment_codegen(ctx, node, *op, target, value)
            }
            AstKind::Binary { op, left, right } => {
                self.binary_codegen(ctx, node, *op, left, right)
            }
            AstKind::Prefix { op, operand } => self.prefix_codegen(ctx, node, *op, operand),
            AstKind::Postfix { op, operand } => self.postfix_codegen(ctx, node, *op, operand),
            AstKind::Call { callee, args } => self.fncall_codegen(ctx, node, callee, args),
            AstKind::Literal(value) => self.push_constant(ctx, value.clone()),
            AstKind::Identifier(name) => self.var_read(ctx, name),
            AstKind::ArrayLiteral(items) => self.array_codegen(ctx, node, items),
            AstKind::ObjectLiteral(properties) => self.object_codegen(ctx, node, properties),
            AstKind::Member { object, field } => {
                self.codegen(ctx, object)?;
                self.push_constant(ctx, MicaVal::string(field))?;
                self.emit8(ctx, OC_RD_FIELD);
                Ok(())
            }
            AstKind::Index { object, index } => {
                self.codegen(ctx, object)?;
                self.codegen(ctx, index)?;
                self.emit8(ctx, OC_RD_INDEX);
                Ok(())
            }
            AstKind::Class {
                name,
                params,
                extends,
                members,
            } => self.class_codegen(ctx, node, name, params, extends.as_ref(), members),
            AstKind::Export(child) => self.export_codegen(ctx, node, child),
            AstKind::Import(path) => self.import_codegen(ctx, node, path),
            AstKind::Actor { .. }
            | AstKind::Connect
            | AstKind::InputEndpoint
            | AstKind::OutputEndpoint => Err(Error::codegen(
                "Actors code generation disabled",
                node.pos,
            )),
        }
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn block_codegen(&mut self, ctx: &mut FnCtx, statements: &[AstNode]) -> Result<()> {
        ctx.scopes.push(Scope::new(true, false));
        let initial = ctx.stack_size;

        for statement in statements {
            self.codegen(ctx, statement)?;
            // Discard the statement result; declared locals stay below it.
            self.emit8(ctx, OC_POP);
        }

        self.clear_locals(ctx, initial);
        ctx.scopes.pop();

        // Non-expression statements leave a null on the stack.
        self.push_null(ctx)
    }

    fn var_codegen(
        &mut self,
        ctx: &mut FnCtx,
        name: &str,
        init: Option<&AstNode>,
        is_const: bool,
    ) -> Result<()> {
        let is_local = ctx
            .scopes
            .last()
            .map(|s| s.is_block)
            .unwrap_or(false);

        if is_local {
            // The initial value becomes the local's stack slot.
            ctx.declare(name);
            match init {
                Some(init) => self.codegen(ctx, init)?,
                None => self.push_null(ctx)?,
            }
        } else {
            // Globals (and function-root declarations) are environment
            // fields.
            self.get_env(ctx)?;
            self.push_constant(ctx, MicaVal::string(name))?;
            match init {
                Some(init) => self.codegen(ctx, init)?,
                None => self.push_null(ctx)?,
            }
            let write_inst = if is_const { OC_NEW_CONST_FIELD } else { OC_WR_FIELD };
            self.emit8(ctx, write_inst);
            self.emit8(ctx, OC_POP);
        }
        self.push_null(ctx)
    }

    /// `if` statements and conditional expressions share this routine;
    /// conditional expressions carry each arm's value through the join,
    /// statements pop it and leave a null.
    fn if_codegen(
        &mut self,
        ctx: &mut FnCtx,
        condition: &AstNode,
        then_branch: &AstNode,
        else_branch: Option<&AstNode>,
        conditional: bool,
    ) -> Result<()> {
        let condition_block = ctx.cur_block_id() + 1;
        self.end_block(ctx, condition_block, condition_block);
        self.codegen(ctx, condition)?;

        let then_start = ctx.cur_block_id() + 1;
        self.end_block(ctx, then_start, NO_BLOCK);
        let post_condition = ctx.stack_size;

        self.codegen(ctx, then_branch)?;
        if !conditional {
            self.emit8(ctx, OC_POP);
        }
        let then_final = ctx.cur_block_id();
        let mut next_block = then_final + 1;
        let else_block = next_block;
        self.end_block(ctx, next_block, next_block);
        let post_then = ctx.stack_size;

        if let Some(else_branch) = else_branch {
            ctx.stack_size = post_condition;
            self.codegen(ctx, else_branch)?;
            if !conditional {
                self.emit8(ctx, OC_POP);
            }
            next_block = ctx.cur_block_id() + 1;
            self.end_block(ctx, next_block, next_block);

            // Route the then-arm past the else code.
            self.set_true_jump(ctx, then_final, next_block);
            self.set_false_jump(ctx, then_final, next_block);
        }
        debug_assert_eq!(ctx.stack_size, post_then, "if arms disagree on stack depth");

        self.set_false_jump(ctx, then_start - 1, else_block);

        if !conditional {
            self.push_null(ctx)?;
        }
        Ok(())
    }

    fn for_codegen(
        &mut self,
        ctx: &mut FnCtx,
        init: Option<&AstNode>,
        condition: Option<&AstNode>,
        step: Option<&AstNode>,
        body: &AstNode,
    ) -> Result<()> {
        // The loop owns a scope, so `for (var i = ...)` is loop-local.
        ctx.scopes.push(Scope::new(true, false));
        let initial = ctx.stack_size;

        if let Some(init) = init {
            self.codegen(ctx, init)?;
            self.emit8(ctx, OC_POP);
        }

        let condition_block = ctx.cur_block_id() + 1;
        self.end_block(ctx, condition_block, condition_block);
        match condition {
            Some(condition) => self.codegen(ctx, condition)?,
            // No condition reads as "always true".
            None => self.push_constant(ctx, MicaVal::Bool(true))?,
        }
        let body_begin = ctx.cur_block_id() + 1;
        self.end_block(ctx, body_begin, NO_BLOCK);

        self.codegen(ctx, body)?;
        self.emit8(ctx, OC_POP);
        if let Some(step) = step {
            self.codegen(ctx, step)?;
            self.emit8(ctx, OC_POP);
        }
        self.end_block(ctx, condition_block, condition_block);

        let after = ctx.cur_block_id();
        self.set_false_jump(ctx, body_begin - 1, after);

        self.clear_locals(ctx, initial);
        ctx.scopes.pop();
        self.push_null(ctx)
    }

    /// `for (x in seq)` lowers to `@iterator` plus `head`/`tail` calls:
    /// the iterator value stays on the stack across the loop and is null
    /// when the loop ends, which is also the statement's value.
    fn for_each_codegen(
        &mut self,
        ctx: &mut FnCtx,
        node: &AstNode,
        var_name: &str,
        sequence: &AstNode,
        body: &AstNode,
    ) -> Result<()> {
        let pos = node.pos;

        self.codegen(ctx, sequence)?;
        self.call_codegen(ctx, "@iterator", 1, pos)?;

        let condition_block = ctx.cur_block_id() + 1;
        self.end_block(ctx, condition_block, condition_block);

        // while (iter !== null)
        self.copy_instruction(ctx, 0)?;
        self.push_null(ctx)?;
        self.call_codegen(ctx, "@notTypeEqual", 2, pos)?;
        let body_begin = ctx.cur_block_id() + 1;
        self.end_block(ctx, body_begin, NO_BLOCK);

        // x = iter.head()
        ctx.scopes.push(Scope::new(true, false));
        ctx.declare(var_name);
        self.copy_instruction(ctx, 0)?;
        self.emit8(ctx, OC_WR_THISP);
        self.push_constant(ctx, MicaVal::string("head"))?;
        self.emit8(ctx, OC_RD_FIELD);
        self.call_instruction(ctx, 0, pos)?;

        self.codegen(ctx, body)?;
        self.emit8(ctx, OC_POP);
        self.emit8(ctx, OC_POP);
        ctx.scopes.pop();

        // iter = iter.tail()
        self.emit8(ctx, OC_WR_THISP);
        self.push_constant(ctx, MicaVal::string("tail"))?;
        self.emit8(ctx, OC_RD_FIELD);
        self.call_instruction(ctx, 0, pos)?;

        self.end_block(ctx, condition_block, condition_block);

        let after = ctx.cur_block_id();
        self.set_false_jump(ctx, body_begin - 1, after);

        // The spent iterator (null) remains as the statement value.
        Ok(())
    }

    fn return_codegen(&mut self, ctx: &mut FnCtx, value: Option<&AstNode>) -> Result<()> {
        let entry_depth = ctx.stack_size;
        match value {
            Some(value) => self.codegen(ctx, value)?,
            None => self.push_null(ctx)?,
        }

        // Move the result into the routine's deepest slot and drop the
        // locals above it.
        if ctx.stack_size > 1 {
            let result_offset = (ctx.stack_size - 2) as usize;
            self.write_instruction(ctx, result_offset)?;
            while ctx.stack_size > 1 {
                self.emit8(ctx, OC_POP);
            }
        }
        debug_assert_eq!(ctx.stack_size, 1);

        self.end_block(ctx, NO_BLOCK, NO_BLOCK);

        // The block after a return is unreachable, but enclosing
        // statements keep accounting against it. Pretend the statement
        // left its one value so join paths that bypass the return stay
        // aligned.
        ctx.stack_size = entry_depth + 1;
        Ok(())
    }

    fn function_codegen(
        &mut self,
        ctx: &mut FnCtx,
        name: &str,
        params: &[String],
        body: &AstNode,
    ) -> Result<()> {
        let function = self.create_function(name, params, body)?;

        if name.is_empty() {
            return self.closure_codegen(ctx, function);
        }

        let is_local = ctx.scopes.last().map(|s| s.is_block).unwrap_or(false);
        if is_local {
            // The closure value is the local's slot; a copy is the
            // expression result.
            ctx.declare(name);
            self.closure_codegen(ctx, function)?;
            self.copy_instruction(ctx, 0)
        } else {
            self.get_env(ctx)?;
            self.push_constant(ctx, MicaVal::string(name))?;
            self.closure_codegen(ctx, function)?;
            self.emit8(ctx, OC_NEW_CONST_FIELD);
            Ok(())
        }
    }

    /// A closure is a function plus the current environment.
    fn closure_codegen(&mut self, ctx: &mut FnCtx, function: MicaVal) -> Result<()> {
        let pos = ctx.cur_pos;
        self.get_env(ctx)?;
        self.push_constant(ctx, function)?;
        self.call_codegen(ctx, "@makeClosure", 2, pos)
    }

    /// Compile a function body into its own routine.
    fn create_function(
        &mut self,
        name: &str,
        params: &[String],
        body: &AstNode,
    ) -> Result<MicaVal> {
        let mut fn_ctx = self.init_function_state(params, body.pos);
        self.codegen(&mut fn_ctx, body)?;

        let param_names: Vec<Rc<str>> = params.iter().map(|p| Rc::from(p.as_str())).collect();
        Ok(MicaVal::function(name, param_names, Rc::new(fn_ctx.routine)))
    }

    fn init_function_state(&mut self, params: &[String], pos: ScriptPosition) -> FnCtx {
        let mut ctx = FnCtx::new(self.alloc_routine_id(), pos);
        let mut scope = Scope::new(false, true);
        for (i, param) in params.iter().enumerate() {
            scope.declare(param, i as i32);
        }
        ctx.scopes.push(scope);
        ctx
    }

    // ========================================================================
    // Assignments
    // ========================================================================

    fn assignment_codegen(
        &mut self,
        ctx: &mut FnCtx,
        node: &AstNode,
        op: AssignOp,
        target: &AstNode,
        value: &AstNode,
    ) -> Result<()> {
        match &target.kind {
            AstKind::Identifier(name) => self.var_write(ctx, node, op, name, target, value),
            AstKind::Member { object, field } => {
                self.codegen(ctx, object)?;
                self.push_constant(ctx, MicaVal::string(field))?;
                if let Some(native) = assign_native(op) {
                    self.copy_instruction(ctx, 1)?;
                    self.copy_instruction(ctx, 1)?;
                    self.emit8(ctx, OC_RD_FIELD);
                    self.codegen(ctx, value)?;
                    self.call_codegen(ctx, native, 2, node.pos)?;
                } else {
                    self.codegen(ctx, value)?;
                }
                self.emit8(ctx, OC_WR_FIELD);
                Ok(())
            }
            AstKind::Index { object, index } => {
                self.codegen(ctx, object)?;
                self.codegen(ctx, index)?;
                if let Some(native) = assign_native(op) {
                    self.copy_instruction(ctx, 1)?;
                    self.copy_instruction(ctx, 1)?;
                    self.emit8(ctx, OC_RD_INDEX);
                    self.codegen(ctx, value)?;
                    self.call_codegen(ctx, native, 2, node.pos)?;
                } else {
                    self.codegen(ctx, value)?;
                }
                self.emit8(ctx, OC_WR_INDEX);
                Ok(())
            }
            _ => Err(Error::codegen("Unexpected lvalue in assignment", target.pos)),
        }
    }

    fn var_write(
        &mut self,
        ctx: &mut FnCtx,
        node: &AstNode,
        op: AssignOp,
        name: &str,
        target: &AstNode,
        value: &AstNode,
    ) -> Result<()> {
        if ctx.is_declared(name) {
            let is_param = ctx.is_param(name);
            if is_param {
                let index = ctx.param_index(name).ok_or_else(|| {
                    Error::codegen(format!("Parameter '{}' not found", name), node.pos)
                })?;
                self.push_constant(ctx, MicaVal::Number(index as f64))?;
            }

            if let Some(native) = assign_native(op) {
                self.codegen(ctx, target)?;
                self.codegen(ctx, value)?;
                self.call_codegen(ctx, native, 2, node.pos)?;
            } else {
                self.codegen(ctx, value)?;
            }

            if is_param {
                self.emit8(ctx, OC_WR_PARAM);
                Ok(())
            } else {
                let offset = ctx.local_offset(name).ok_or_else(|| {
                    Error::codegen(format!("Local '{}' not found", name), node.pos)
                })?;
                self.write_instruction(ctx, (offset - 1) as usize)
            }
        } else {
            // Environment-resident name (global, closure capture); an
            // unresolved name creates a field on the environment.
            self.get_env(ctx)?;
            self.push_constant(ctx, MicaVal::string(name))?;
            if let Some(native) = assign_native(op) {
                self.copy_instruction(ctx, 1)?;
                self.copy_instruction(ctx, 1)?;
                self.emit8(ctx, OC_RD_FIELD);
                self.codegen(ctx, value)?;
                self.call_codegen(ctx, native, 2, node.pos)?;
            } else {
                self.codegen(ctx, value)?;
            }
            self.emit8(ctx, OC_WR_FIELD);
            Ok(())
        }
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn var_read(&mut self, ctx: &mut FnCtx, name: &str) -> Result<()> {
        if name == "this" {
            self.emit8(ctx, OC_PUSH_THIS);
            return Ok(());
        }
        if ctx.is_declared(name) {
            if ctx.is_param(name) {
                let index = ctx.param_index(name).ok_or_else(|| {
                    Error::codegen(format!("Parameter '{}' not found", name), ctx.cur_pos)
                })?;
                self.push_constant(ctx, MicaVal::Number(index as f64))?;
                self.emit8(ctx, OC_RD_PARAM);
            } else {
                let offset = ctx.local_offset(name).ok_or_else(|| {
                    Error::codegen(format!("Local '{}' not found", name), ctx.cur_pos)
                })?;
                self.copy_instruction(ctx, offset as usize)?;
            }
            Ok(())
        } else {
            self.get_env(ctx)?;
            self.push_constant(ctx, MicaVal::string(name))?;
            self.emit8(ctx, OC_RD_FIELD);
            Ok(())
        }
    }

    fn binary_codegen(
        &mut self,
        ctx: &mut FnCtx,
        node: &AstNode,
        op: BinaryOp,
        left: &AstNode,
        right: &AstNode,
    ) -> Result<()> {
        if matches!(op, BinaryOp::LogicalAnd | BinaryOp::LogicalOr) {
            return self.logical_codegen(ctx, op, left, right);
        }
        self.codegen(ctx, left)?;
        self.codegen(ctx, right)?;
        self.call_codegen(ctx, binary_native(op), 2, node.pos)
    }

    /// Short-circuit `&&`/`||`: branch on a copy of the left value; the
    /// right-hand block discards it and evaluates the right operand.
    fn logical_codegen(
        &mut self,
        ctx: &mut FnCtx,
        op: BinaryOp,
        left: &AstNode,
        right: &AstNode,
    ) -> Result<()> {
        self.codegen(ctx, left)?;
        self.copy_instruction(ctx, 0)?;
        let first_block = ctx.cur_block_id();
        self.end_block(ctx, first_block + 1, NO_BLOCK);

        self.emit8(ctx, OC_POP);
        self.codegen(ctx, right)?;
        let second_block = ctx.cur_block_id();
        self.end_block(ctx, second_block + 1, second_block + 1);

        if op == BinaryOp::LogicalOr {
            self.set_true_jump(ctx, first_block, second_block + 1);
            self.set_false_jump(ctx, first_block, first_block + 1);
        } else {
            self.set_true_jump(ctx, first_block, first_block + 1);
            self.set_false_jump(ctx, first_block, second_block + 1);
        }
        Ok(())
    }

    fn prefix_codegen(
        &mut self,
        ctx: &mut FnCtx,
        node: &AstNode,
        op: PrefixOp,
        operand: &AstNode,
    ) -> Result<()> {
        match op {
            // ++x / --x are x += 1 / x -= 1.
            PrefixOp::Inc | PrefixOp::Dec => {
                let assign = desugar_step(node, op == PrefixOp::Inc, operand);
                self.codegen(ctx, &assign)
            }
            // Unary plus does nothing.
            PrefixOp::Plus => self.codegen(ctx, operand),
            PrefixOp::Neg => {
                self.codegen(ctx, operand)?;
                self.call_codegen(ctx, "@negate", 1, node.pos)
            }
            PrefixOp::BitNot => {
                self.codegen(ctx, operand)?;
                self.call_codegen(ctx, "@binNot", 1, node.pos)
            }
            PrefixOp::Not => {
                self.codegen(ctx, operand)?;
                self.call_codegen(ctx, "@logicNot", 1, node.pos)
            }
        }
    }

    /// `x++` runs the prefix increment, then undoes it on the expression
    /// value to recover the previous one.
    fn postfix_codegen(
        &mut self,
        ctx: &mut FnCtx,
        node: &AstNode,
        op: PostfixOp,
        operand: &AstNode,
    ) -> Result<()> {
        let assign = desugar_step(node, op == PostfixOp::Inc, operand);
        self.codegen(ctx, &assign)?;
        let recover = match op {
            PostfixOp::Inc => "@dec",
            PostfixOp::Dec => "@inc",
        };
        self.call_codegen(ctx, recover, 1, node.pos)
    }

    fn fncall_codegen(
        &mut self,
        ctx: &mut FnCtx,
        node: &AstNode,
        callee: &AstNode,
        args: &[AstNode],
    ) -> Result<()> {
        // A member-access callee receives the object as `this`.
        if let AstKind::Member { object, field } = &callee.kind {
            for arg in args {
                self.codegen(ctx, arg)?;
            }
            self.codegen(ctx, object)?;
            self.emit8(ctx, OC_WR_THISP);
            self.push_constant(ctx, MicaVal::string(field))?;
            self.emit8(ctx, OC_RD_FIELD);
            return self.call_instruction(ctx, args.len(), node.pos);
        }

        for arg in args {
            self.codegen(ctx, arg)?;
        }
        self.codegen(ctx, callee)?;
        self.call_instruction(ctx, args.len(), node.pos)
    }

    /// Array literals allocate through `@newArray` and append each
    /// element with the array's own `push` method.
    fn array_codegen(&mut self, ctx: &mut FnCtx, node: &AstNode, items: &[AstNode]) -> Result<()> {
        self.push_constant(ctx, MicaVal::Number(0.0))?;
        self.call_codegen(ctx, "@newArray", 1, node.pos)?;
        self.copy_instruction(ctx, 0)?;
        self.push_constant(ctx, MicaVal::string("push"))?;
        self.emit8(ctx, OC_RD_FIELD);

        for item in items {
            self.codegen(ctx, item)?;
            self.copy_instruction(ctx, 1)?;
            self.copy_instruction(ctx, 3)?;
            self.emit8(ctx, OC_WR_THISP);
            self.emit8(ctx, OC_POP);
            self.call_instruction(ctx, 1, item.pos)?;
            self.emit8(ctx, OC_POP);
        }

        self.emit8(ctx, OC_POP);
        Ok(())
    }

    fn object_codegen(
        &mut self,
        ctx: &mut FnCtx,
        node: &AstNode,
        properties: &[mica_parser::ObjectProperty],
    ) -> Result<()> {
        self.call_codegen(ctx, "Object", 0, node.pos)?;

        for property in properties {
            self.copy_instruction(ctx, 0)?;
            self.push_constant(ctx, MicaVal::string(&property.name))?;
            self.codegen(ctx, &property.value)?;
            let write_inst = if property.is_const {
                OC_NEW_CONST_FIELD
            } else {
                OC_WR_FIELD
            };
            self.emit8(ctx, write_inst);
            self.emit8(ctx, OC_POP);
        }
        // The object reference remains on top.
        Ok(())
    }

    // ========================================================================
    // Classes
    // ========================================================================

    fn class_codegen(
        &mut self,
        ctx: &mut FnCtx,
        node: &AstNode,
        name: &str,
        params: &[String],
        extends: Option<&ExtendsClause>,
        members: &[AstNode],
    ) -> Result<()> {
        let parent = self.parent_class(ctx, node, extends)?;
        let ctor_params = constructor_params(params, extends, &parent);
        let constructor =
            self.class_constructor_codegen(node, name, &parent, &ctor_params, extends, members)?;

        let mut member_map = FieldMap::new();
        for member in members {
            if let AstKind::Function {
                name: fn_name,
                params: fn_params,
                body,
            } = &member.kind
            {
                if member_map.contains_key(fn_name.as_str()) {
                    return Err(Error::codegen(
                        format!("Duplicate member '{}' in class '{}'", fn_name, name),
                        member.pos,
                    ));
                }
                let function = self.create_function(fn_name, fn_params, body)?;
                member_map.insert(Rc::from(fn_name.as_str()), Field::new(function, true));
            }
        }

        let class_val = MicaVal::Class(Rc::new(ClassData::new(
            name,
            Some(parent),
            member_map,
            constructor,
        )));
        ctx.symbols.insert(name.to_string(), class_val.clone());

        // Register the class on the environment, then bind its
        // constructor environment.
        self.get_env(ctx)?;
        self.copy_instruction(ctx, 0)?;
        self.push_constant(ctx, MicaVal::string(name))?;
        self.push_constant(ctx, class_val)?;
        self.emit8(ctx, OC_NEW_CONST_FIELD);
        self.call_codegen(ctx, "@setClassEnv", 2, node.pos)
    }

    /// Synthesise the class constructor: call the base constructor, set
    /// the class of the new object, initialise declared members, then
    /// write any constructor parameter not already assigned as a field.
    fn class_constructor_codegen(
        &mut self,
        node: &AstNode,
        _name: &str,
        parent: &Rc<ClassData>,
        ctor_params: &[String],
        extends: Option<&ExtendsClause>,
        members: &[AstNode],
    ) -> Result<Rc<FunctionData>> {
        let pos = node.pos;
        let mut ctx = self.init_function_state(ctor_params, pos);
        ctx.cur_pos = pos;

        self.base_constructor_call(&mut ctx, parent, extends, pos)?;

        // The constructor environment's index 0 is the class itself.
        self.get_env(&mut ctx)?;
        self.push_constant(&mut ctx, MicaVal::Number(0.0))?;
        self.emit8(&mut ctx, OC_RD_INDEX);
        self.call_codegen(&mut ctx, "@setObjClass", 2, pos)?;

        let mut assigned: HashSet<&str> = HashSet::new();
        for member in members {
            if let AstKind::Var {
                name: var_name,
                init,
                is_const,
            } = &member.kind
            {
                self.copy_instruction(&mut ctx, 0)?;
                self.push_constant(&mut ctx, MicaVal::string(var_name))?;
                match init {
                    Some(init) => self.codegen(&mut ctx, init)?,
                    None => self.push_null(&mut ctx)?,
                }
                let write_inst = if *is_const { OC_NEW_CONST_FIELD } else { OC_WR_FIELD };
                self.emit8(&mut ctx, write_inst);
                self.emit8(&mut ctx, OC_POP);
                assigned.insert(var_name);
            }
        }

        // Parameters become fields unless a member already claimed the
        // name.
        for param in ctor_params {
            if assigned.contains(param.as_str()) {
                continue;
            }
            self.copy_instruction(&mut ctx, 0)?;
            self.push_constant(&mut ctx, MicaVal::string(param))?;
            self.var_read(&mut ctx, param)?;
            self.emit8(&mut ctx, OC_WR_FIELD);
            self.emit8(&mut ctx, OC_POP);
        }
        debug_assert_eq!(ctx.stack_size, 1, "constructor must leave the new object");

        let param_names: Vec<Rc<str>> = ctor_params.iter().map(|p| Rc::from(p.as_str())).collect();
        match MicaVal::function("", param_names, Rc::new(ctx.routine)) {
            MicaVal::Function(data) => Ok(data),
            _ => unreachable!(),
        }
    }

    /// Call the base-class constructor with either the explicit
    /// `extends(...)` arguments or the parent's own parameters.
    fn base_constructor_call(
        &mut self,
        ctx: &mut FnCtx,
        parent: &Rc<ClassData>,
        extends: Option<&ExtendsClause>,
        pos: ScriptPosition,
    ) -> Result<()> {
        let n_args = match extends.and_then(|e| e.args.as_ref()) {
            Some(args) => {
                for arg in args {
                    self.codegen(ctx, arg)?;
                }
                args.len()
            }
            None => {
                let parent_params: Vec<String> =
                    parent.params().iter().map(|p| p.to_string()).collect();
                for param in &parent_params {
                    self.var_read(ctx, param)?;
                }
                parent_params.len()
            }
        };
        let parent_name = parent.name.clone();
        self.call_codegen(ctx, &parent_name, n_args, pos)
    }

    fn parent_class(
        &self,
        ctx: &FnCtx,
        node: &AstNode,
        extends: Option<&ExtendsClause>,
    ) -> Result<Rc<ClassData>> {
        let Some(extends) = extends else {
            return Ok(classes::object_class());
        };
        match ctx.symbols.get(&extends.parent) {
            Some(MicaVal::Class(class)) => Ok(Rc::clone(class)),
            Some(_) => Err(Error::codegen(
                format!("'{}' is not a class", extends.parent),
                extends.pos,
            )),
            None => Err(Error::codegen(
                format!("Parent class '{}' does not exist", extends.parent),
                node.pos,
            )),
        }
    }

    // ========================================================================
    // Modules
    // ========================================================================

    fn export_codegen(&mut self, ctx: &mut FnCtx, node: &AstNode, child: &AstNode) -> Result<()> {
        let name = child
            .name()
            .ok_or_else(|| Error::codegen("Cannot export an unnamed symbol", child.pos))?
            .to_string();

        self.codegen(ctx, child)?;
        self.push_constant(ctx, MicaVal::string(&name))?;
        self.get_env(ctx)?;
        self.call_codegen(ctx, "@exportSymbol", 2, node.pos)?;
        self.emit8(ctx, OC_POP);
        Ok(())
    }

    fn import_codegen(&mut self, ctx: &mut FnCtx, node: &AstNode, path: &AstNode) -> Result<()> {
        self.codegen(ctx, path)?;
        self.get_env(ctx)?;
        self.call_codegen(ctx, "@importModule", 2, node.pos)
    }

    // ========================================================================
    // Emission helpers
    // ========================================================================

    fn emit8(&mut self, ctx: &mut FnCtx, op: u8) {
        debug_assert!(op & OC_EXT_FLAG == 0);
        let block_idx = ctx.routine.blocks.len() - 1;
        let block = ctx
            .routine
            .blocks
            .last_mut()
            .expect("routines always have a current block");
        let offset = block.code.len();
        block.code.push(op);

        self.code_map.add(
            VmPosition::new(ctx.routine.id, block_idx as u32, offset as u32),
            ctx.cur_pos,
        );
        if let Ok(decoded) = opcode::decode8(op) {
            ctx.stack_size += decoded.stack_effect();
        } else {
            debug_assert!(false, "emitted invalid 8-bit opcode {:02X}", op);
        }
    }

    fn emit16(&mut self, ctx: &mut FnCtx, payload: u16) {
        debug_assert!(payload < 0x8000);
        let block_idx = ctx.routine.blocks.len() - 1;
        let block = ctx
            .routine
            .blocks
            .last_mut()
            .expect("routines always have a current block");
        let offset = block.code.len();
        block.code.push(OC_EXT_FLAG | (payload >> 8) as u8);
        block.code.push((payload & 0xFF) as u8);

        self.code_map.add(
            VmPosition::new(ctx.routine.id, block_idx as u32, offset as u32),
            ctx.cur_pos,
        );
        if let Ok(decoded) = opcode::decode16(payload) {
            ctx.stack_size += decoded.stack_effect();
        } else {
            debug_assert!(false, "emitted invalid 16-bit payload {:04X}", payload);
        }
    }

    /// Push a constant, interning primitives in the routine's pool.
    fn push_constant(&mut self, ctx: &mut FnCtx, value: MicaVal) -> Result<()> {
        let id = match ConstKey::of(&value) {
            Some(key) => match ctx.const_map.get(&key) {
                Some(&id) => id,
                None => {
                    let id = ctx.routine.constants.len();
                    ctx.const_map.insert(key, id);
                    ctx.routine.constants.push(value);
                    id
                }
            },
            None => {
                let id = ctx.routine.constants.len();
                ctx.routine.constants.push(value);
                id
            }
        };

        if id < 64 {
            self.emit8(ctx, OC_PUSHC + id as u8);
            Ok(())
        } else {
            let id16 = id - 64;
            if id >= MAX_CONSTANTS {
                return Err(Error::codegen(
                    format!("Too many constants. Maximum is {} per function", MAX_CONSTANTS),
                    ctx.cur_pos,
                ));
            }
            self.emit16(ctx, OC16_PUSHC + id16 as u16);
            Ok(())
        }
    }

    fn push_null(&mut self, ctx: &mut FnCtx) -> Result<()> {
        self.push_constant(ctx, MicaVal::Null)
    }

    /// Reading the environment copies the element just below the
    /// routine's locals region.
    fn get_env(&mut self, ctx: &mut FnCtx) -> Result<()> {
        let offset = ctx.stack_size as usize;
        self.copy_instruction(ctx, offset)
    }

    fn copy_instruction(&mut self, ctx: &mut FnCtx, offset: usize) -> Result<()> {
        if offset <= (OC_CP_MAX - OC_CP) as usize {
            self.emit8(ctx, OC_CP + offset as u8);
            Ok(())
        } else {
            let extended = offset - ((OC_CP_MAX - OC_CP) as usize + 1);
            if extended > (OC16_CP_MAX - OC16_CP) as usize {
                return Err(Error::codegen(
                    "Cannot generate copy instruction: too many locals. Try to simplify the function",
                    ctx.cur_pos,
                ));
            }
            self.emit16(ctx, OC16_CP + extended as u16);
            Ok(())
        }
    }

    fn write_instruction(&mut self, ctx: &mut FnCtx, offset: usize) -> Result<()> {
        if offset <= (OC_WR_MAX - OC_WR) as usize {
            self.emit8(ctx, OC_WR + offset as u8);
            Ok(())
        } else {
            let extended = offset - ((OC_WR_MAX - OC_WR) as usize + 1);
            if extended > (OC16_WR_MAX - OC16_WR) as usize {
                return Err(Error::codegen(
                    "Cannot generate write instruction: too many locals. Try to simplify the function",
                    ctx.cur_pos,
                ));
            }
            self.emit16(ctx, OC16_WR + extended as u16);
            Ok(())
        }
    }

    /// Resolve `name` and call it with `n_args` already on the stack.
    fn call_codegen(
        &mut self,
        ctx: &mut FnCtx,
        name: &str,
        n_args: usize,
        pos: ScriptPosition,
    ) -> Result<()> {
        let old_pos = ctx.cur_pos;
        ctx.cur_pos = pos;
        self.var_read(ctx, name)?;
        let result = self.call_instruction(ctx, n_args, pos);
        ctx.cur_pos = old_pos;
        result
    }

    fn call_instruction(&mut self, ctx: &mut FnCtx, n_args: usize, pos: ScriptPosition) -> Result<()> {
        let old_pos = ctx.cur_pos;
        ctx.cur_pos = pos;
        if n_args <= OC_CALL_MAX as usize {
            self.emit8(ctx, OC_CALL + n_args as u8);
        } else {
            if n_args > MAX_CALL_ARGS {
                ctx.cur_pos = old_pos;
                return Err(Error::codegen(
                    format!("Too many arguments in function call: {}", n_args),
                    pos,
                ));
            }
            self.emit16(ctx, OC16_CALL + (n_args - (OC_CALL_MAX as usize + 1)) as u16);
        }
        ctx.cur_pos = old_pos;
        Ok(())
    }

    /// End the current block and start a new one. A block whose
    /// successors differ consumes its condition value at runtime, so the
    /// depth counter drops by one.
    fn end_block(&mut self, ctx: &mut FnCtx, true_jump: i32, false_jump: i32) {
        let block = ctx
            .routine
            .blocks
            .last_mut()
            .expect("routines always have a current block");
        block.next[1] = true_jump;
        block.next[0] = false_jump;

        if true_jump != false_jump {
            ctx.stack_size -= 1;
        }
        ctx.routine.blocks.push(Block::new());
    }

    fn set_true_jump(&mut self, ctx: &mut FnCtx, block_id: i32, destination: i32) {
        ctx.routine.blocks[block_id as usize].next[1] = destination;
    }

    fn set_false_jump(&mut self, ctx: &mut FnCtx, block_id: i32, destination: i32) {
        ctx.routine.blocks[block_id as usize].next[0] = destination;
    }

    /// Pop the locals a scope declared. After a `return` the counter is
    /// already below the target (the code is unreachable); nothing is
    /// emitted then.
    fn clear_locals(&mut self, ctx: &mut FnCtx, target: i32) {
        while ctx.stack_size > target {
            self.emit8(ctx, OC_POP);
        }
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Operator lowering tables
// ============================================================================

fn binary_native(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "@add",
        BinaryOp::Sub => "@sub",
        BinaryOp::Mul => "@multiply",
        BinaryOp::Div => "@divide",
        BinaryOp::Mod => "@modulus",
        BinaryOp::Power => "@power",
        BinaryOp::BitAnd => "@binAnd",
        BinaryOp::BitOr => "@binOr",
        BinaryOp::BitXor => "@binXor",
        BinaryOp::Lshift => "@lshift",
        BinaryOp::Rshift => "@rshift",
        BinaryOp::RshiftU => "@rshiftu",
        BinaryOp::Less => "@less",
        BinaryOp::Greater => "@greater",
        BinaryOp::LessEq => "@lequal",
        BinaryOp::GreaterEq => "@gequal",
        BinaryOp::Equal => "@areEqual",
        BinaryOp::NotEqual => "@notEqual",
        BinaryOp::StrictEqual => "@areTypeEqual",
        BinaryOp::StrictNotEqual => "@notTypeEqual",
        BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
            unreachable!("logical operators have their own codegen")
        }
    }
}

/// Compound-assignment operator natives. `None` for plain `=`.
fn assign_native(op: AssignOp) -> Option<&'static str> {
    Some(match op {
        AssignOp::Assign => return None,
        AssignOp::Add => "@add",
        AssignOp::Sub => "@sub",
        AssignOp::Mul => "@multiply",
        AssignOp::Div => "@divide",
        AssignOp::Mod => "@modulus",
        AssignOp::BitAnd => "@binAnd",
        AssignOp::BitOr => "@binOr",
        AssignOp::BitXor => "@binXor",
        AssignOp::Lshift => "@lshift",
        AssignOp::Rshift => "@rshift",
        AssignOp::RshiftU => "@rshiftu",
    })
}

/// Build the `x += 1` / `x -= 1` node the increment operators lower to.
fn desugar_step(node: &AstNode, increment: bool, operand: &AstNode) -> AstNode {
    AstNode::new(
        AstKind::Assignment {
            op: if increment { AssignOp::Add } else { AssignOp::Sub },
            target: Box::new(operand.clone()),
            value: Box::new(AstNode::new(
                AstKind::Literal(MicaVal::Number(1.0)),
                node.pos,
            )),
        },
        node.pos,
    )
}

/// Constructor parameter list: without an explicit `extends` argument
/// list the parent's parameters are prepended to the class's own.
fn constructor_params(
    params: &[String],
    extends: Option<&ExtendsClause>,
    parent: &Rc<ClassData>,
) -> Vec<String> {
    match extends {
        None => params.to_vec(),
        Some(e) if e.args.is_some() => params.to_vec(),
        Some(_) => {
            let mut all: Vec<String> = parent.params().iter().map(|p| p.to_string()).collect();
            all.extend(params.iter().cloned());
            all
        }
    }
}
