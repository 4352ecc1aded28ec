// mica-vm - Shared test helpers
// Copyright (c) 2025 Tom Waddington. MIT licensed.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::rc::Rc;

use mica_core::builtins::register_builtins;
use mica_core::{MicaVal, Result, Routine};
use mica_parser::{semantic_check, Parser};
use mica_vm::{check_routine_tree, Compiler, Vm};

/// Compile a source string; every produced routine must pass the stack
/// checker.
pub fn compile(source: &str) -> Result<Rc<Routine>> {
    let ast = Parser::parse_script(source)?;
    semantic_check(&ast)?;
    let mut compiler = Compiler::new();
    let routine = compiler.compile_script(&ast)?;
    check_routine_tree(&routine).expect("compiled code must pass the stack checker");
    Ok(routine)
}

/// Compile and execute a source string against fresh builtin globals.
pub fn run(source: &str) -> Result<MicaVal> {
    let routine = compile(source)?;
    let globals = MicaVal::object();
    register_builtins(&globals)?;
    let mut vm = Vm::new();
    vm.run_script(&routine, globals)
}

/// Run and render the result the way a script would see it.
pub fn run_str(source: &str) -> String {
    match run(source) {
        Ok(value) => value.to_display_string(),
        Err(e) => format!("Error: {}", e),
    }
}
