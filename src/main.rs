// mica - Test harness for the Mica scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Runs the script test suite.
//!
//! With no arguments every `tests/test###.mica` file runs in sequence
//! (stopping at the first missing number); with one argument only that
//! test runs. A test passes when its global `result` is truthy at the
//! end, or when it set `result = "exception"` and the script then threw.
//!
//! Each test leaves artifacts under `tests/results/<name>/`: the AST and
//! disassembly as JSON, the globals after execution, and - when the
//! script calls `enableTraceLog()` - a per-instruction trace log.

use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use mica_core::{value_to_json, Error, MicaVal, NativeContext, Result};
use mica_embed::{add_native, default_globals, evaluate};
use mica_parser::{semantic_check, Parser};
use mica_vm::{disassemble_all, Compiler, Vm};

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();

    let tests_dir = PathBuf::from("tests");
    let results_dir = tests_dir.join("results");

    println!("Mica test runner");
    println!("USAGE:");
    println!("   mica test001.mica      : run just one test");
    println!("   mica                   : run all tests");

    if args.len() == 2 {
        println!("Running test: {}", args[1]);
        let path = resolve_test_path(&tests_dir, &args[1]);
        let pass = run_test(&path, &results_dir);
        process::exit(if pass { 0 } else { 1 });
    }

    println!("Running all tests!");
    let mut count = 0;
    let mut passed = 0;
    let mut test_num = 1;
    while test_num < 1000 {
        let name = format!("test{:03}.mica", test_num);
        let path = tests_dir.join(&name);
        if !path.exists() {
            break;
        }
        if run_test(&path, &results_dir) {
            passed += 1;
        }
        count += 1;
        test_num += 1;
    }

    println!("Done. {} tests, {} pass, {} fail", count, passed, count - passed);
    process::exit(if passed == count { 0 } else { 1 });
}

fn resolve_test_path(tests_dir: &Path, arg: &str) -> PathBuf {
    let direct = PathBuf::from(arg);
    if direct.exists() {
        direct
    } else {
        tests_dir.join(arg)
    }
}

/// Run a single test script, writing its artifacts. Returns pass/fail.
fn run_test(path: &Path, results_dir: &Path) -> bool {
    print!("TEST {} ", path.display());

    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            println!("Cannot read file: {}", e);
            return false;
        }
    };

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("test")
        .to_string();
    let test_dir = results_dir.join(&name);
    let _ = fs::create_dir_all(&test_dir);

    let globals = match test_globals() {
        Ok(globals) => globals,
        Err(e) => {
            println!("FAIL\n  setup error: {}", e);
            return false;
        }
    };

    let outcome = execute(path, &source, &globals, &test_dir, &name);

    let pass = match outcome {
        Ok(()) => {
            let result = globals.read_field("result").unwrap_or(MicaVal::Null);
            if result.to_display_string() == "exception" {
                println!("No exception thrown");
                false
            } else {
                result.to_bool()
            }
        }
        Err(e) => {
            let result = globals.read_field("result").unwrap_or(MicaVal::Null);
            if result.to_display_string() == "exception" {
                true
            } else {
                println!("ERROR: {}", e);
                false
            }
        }
    };

    // Globals snapshot, whatever the outcome.
    write_json(
        &test_dir.join(format!("{}.globals.json", name)),
        &value_to_json(&globals),
    );

    println!("{}", if pass { "PASS" } else { "FAIL" });
    pass
}

/// The staged pipeline of `evaluate`, unrolled so each stage's artifact
/// can be written.
fn execute(
    path: &Path,
    source: &str,
    globals: &MicaVal,
    test_dir: &Path,
    name: &str,
) -> Result<()> {
    let ast = Parser::parse_script(source)?;
    write_json(&test_dir.join(format!("{}.ast.json", name)), &ast.to_json());

    semantic_check(&ast)?;

    let mut compiler = Compiler::new();
    let routine = compiler.compile_script(&ast)?;
    if let Ok(disasm) = disassemble_all(&routine) {
        write_json(&test_dir.join(format!("{}.asm.json", name)), &disasm);
    }

    let mut vm = Vm::new();
    vm.set_module_path(path.display().to_string());

    let trace_path = test_dir.join(format!("{}.trace.log", name));
    if let Ok(mut trace_file) = fs::File::create(&trace_path) {
        vm.set_trace_hook(Box::new(move |line| {
            let _ = writeln!(trace_file, "{}", line);
        }));
    }

    match vm.run_script(&routine, globals.clone()) {
        Ok(_) => Ok(()),
        Err(e) => {
            // Resolve the error position through the code map.
            let source_pos = e.vm_position().and_then(|pos| compiler.code_map.get(&pos));
            match source_pos {
                Some(pos) => Err(e.with_source_position(pos)),
                None => Err(e),
            }
        }
    }
}

/// Default globals plus the harness natives and the `result` slot.
fn test_globals() -> Result<MicaVal> {
    let globals = default_globals()?;
    globals.write_field("result", MicaVal::Number(0.0), false)?;
    add_native("function assert(value, text)", assert_native, &globals, false)?;
    add_native("function printLn(text)", print_ln, &globals, false)?;
    add_native("function expectError(code)", expect_error, &globals, false)?;
    add_native("function enableTraceLog(enable)", enable_trace_log, &globals, false)?;
    Ok(globals)
}

fn write_json(path: &Path, value: &serde_json::Value) {
    let text = serde_json::to_string_pretty(value).unwrap_or_default();
    if let Err(e) = fs::write(path, text) {
        log::warn!("cannot write artifact {}: {}", path.display(), e);
    }
}

// ============================================================================
// Harness natives
// ============================================================================

/// `assert(value, text)` - raise a runtime error when `value` is falsy.
fn assert_native(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let value = ctx.get_param(0);
    if !value.to_bool() {
        let text = ctx.get_param(1).to_display_string();
        return Err(Error::runtime(format!("Assertion failed: {}", text)));
    }
    Ok(MicaVal::Null)
}

/// `printLn(text)` - write a line to standard output.
fn print_ln(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    println!("{}", ctx.get_param(0).to_display_string());
    Ok(MicaVal::Null)
}

/// `expectError(code)` - evaluate `code` in a fresh environment and
/// return true when it throws; raise when it does not.
fn expect_error(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let code = ctx.get_param(0).to_display_string();
    let globals = default_globals()?;
    match evaluate(&code, &globals, ctx.module_path()) {
        Err(_) => Ok(MicaVal::Bool(true)),
        Ok(_) => Err(Error::runtime(format!("No exception thrown: {}", code))),
    }
}

/// `enableTraceLog(enable)` - toggle the per-instruction trace log.
fn enable_trace_log(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let enable = ctx.get_param(0);
    let on = enable.is_null() || enable.to_bool();
    ctx.set_trace_enabled(on);
    Ok(MicaVal::Null)
}
