// mica-embed - Engine implementation
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The `Engine` struct - main entry point for embedding Mica.
//!
//! Also home of the free [`evaluate`] pipeline (parse → semantic check →
//! codegen → VM) and the `@importModule` native, which needs both file
//! I/O and recursive evaluation and therefore lives above the core
//! crates.

use std::path::{Path, PathBuf};

use mica_core::builtins::{add_native_fn, register_builtins, runtime::EXPORTS_FIELD};
use mica_core::{Error, MicaVal, NativeContext, NativeFn, Result};
use mica_parser::{semantic_check, Lexer, Parser, TokenKind};
use mica_vm::{Compiler, Vm};

/// Create a globals object carrying every built-in, including module
/// import support.
pub fn default_globals() -> Result<MicaVal> {
    let globals = MicaVal::object();
    register_builtins(&globals)?;
    add_native_fn(&globals, "@importModule", &["path", "env"], import_module, true)?;
    Ok(globals)
}

/// Evaluate a source string against a globals object.
///
/// Runs the full pipeline and maps runtime error positions back to the
/// source through the compilation's code map.
pub fn evaluate(source: &str, globals: &MicaVal, module_path: &str) -> Result<MicaVal> {
    let ast = Parser::parse_script(source)?;
    semantic_check(&ast)?;

    let mut compiler = Compiler::new();
    let routine = compiler.compile_script(&ast)?;

    let mut vm = Vm::new();
    vm.set_module_path(module_path);
    match vm.run_script(&routine, globals.clone()) {
        Ok(value) => Ok(value),
        Err(e) => {
            let source_pos = e
                .vm_position()
                .and_then(|pos| compiler.code_map.get(&pos));
            match source_pos {
                Some(pos) => Err(e.with_source_position(pos)),
                None => Err(e),
            }
        }
    }
}

/// The Mica scripting engine.
///
/// `Engine` owns a globals object and provides a high-level interface
/// for evaluating Mica code and registering Rust natives.
///
/// `Engine` is not thread-safe: values are `Rc`-based. Use one engine
/// per thread.
///
/// # Example
///
/// ```rust
/// use mica_embed::Engine;
///
/// let engine = Engine::new().unwrap();
/// let result = engine.eval("1 + 2 * 3").unwrap();
/// assert_eq!(result.to_double(), 7.0);
/// ```
pub struct Engine {
    globals: MicaVal,
}

impl Engine {
    /// Create a new engine with the default globals.
    pub fn new() -> Result<Self> {
        Ok(Engine {
            globals: default_globals()?,
        })
    }

    /// Create an engine around an existing globals object.
    pub fn with_globals(globals: MicaVal) -> Self {
        Engine { globals }
    }

    /// The engine's globals object.
    pub fn globals(&self) -> &MicaVal {
        &self.globals
    }

    /// Evaluate a string of Mica code; returns the script result.
    pub fn eval(&self, source: &str) -> Result<MicaVal> {
        evaluate(source, &self.globals, "")
    }

    /// Evaluate a file of Mica code.
    pub fn eval_file(&self, path: impl AsRef<Path>) -> Result<MicaVal> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| Error::io("Reading script", Some(path.display().to_string()), e))?;
        evaluate(&source, &self.globals, &path.display().to_string())
    }

    /// Register a native function from a declaration header such as
    /// `"function assert(value, text)"`. Dotted names (`"function
    /// console.log(text)"`) lazily create the intermediate objects.
    pub fn add_native(&self, header: &str, f: NativeFn, is_const: bool) -> Result<MicaVal> {
        add_native(header, f, &self.globals, is_const)
    }
}

/// Register a native on a scope object, parsing the header with the
/// engine's own lexer to extract the name and parameter list.
pub fn add_native(header: &str, f: NativeFn, scope: &MicaVal, is_const: bool) -> Result<MicaVal> {
    let tokens = Lexer::new(header).tokenize()?;
    let mut parser = HeaderParser::new(header, tokens);
    parser.expect_function()?;
    let mut name = parser.expect_identifier()?;

    // Dotted names walk (and create) intermediate objects.
    let mut target = scope.clone();
    while parser.eat_dot() {
        let child = target.read_field(&name)?;
        let child = match child {
            MicaVal::Object(_) => child,
            _ => {
                let object = MicaVal::object();
                target.write_field(&name, object.clone(), false)?;
                object
            }
        };
        target = child;
        name = parser.expect_identifier()?;
    }

    let params = parser.parse_params()?;
    let param_refs: Vec<&str> = params.iter().map(|p| p.as_str()).collect();
    let function = add_native_fn(&target, &name, &param_refs, f, is_const)?;
    Ok(function)
}

/// Minimal cursor over a native-declaration header's tokens.
struct HeaderParser {
    header: String,
    tokens: Vec<mica_parser::Token>,
    index: usize,
}

impl HeaderParser {
    fn new(header: &str, tokens: Vec<mica_parser::Token>) -> Self {
        Self {
            header: header.to_string(),
            tokens,
            index: 0,
        }
    }

    fn peek(&self) -> &TokenKind {
        self.tokens
            .get(self.index)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn error(&self, expected: &str) -> Error {
        Error::runtime(format!(
            "Invalid native function header '{}': expected {}",
            self.header, expected
        ))
    }

    fn expect_function(&mut self) -> Result<()> {
        if *self.peek() != TokenKind::Function {
            return Err(self.error("'function'"));
        }
        self.index += 1;
        Ok(())
    }

    fn expect_identifier(&mut self) -> Result<String> {
        match self.peek().clone() {
            TokenKind::Identifier(name) => {
                self.index += 1;
                Ok(name)
            }
            _ => Err(self.error("an identifier")),
        }
    }

    fn eat_dot(&mut self) -> bool {
        if *self.peek() == TokenKind::Dot {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn parse_params(&mut self) -> Result<Vec<String>> {
        if *self.peek() != TokenKind::LParen {
            return Err(self.error("'('"));
        }
        self.index += 1;
        let mut params = Vec::new();
        loop {
            match self.peek().clone() {
                TokenKind::RParen => {
                    self.index += 1;
                    return Ok(params);
                }
                TokenKind::Identifier(name) => {
                    self.index += 1;
                    params.push(name);
                    if *self.peek() == TokenKind::Comma {
                        self.index += 1;
                    }
                }
                _ => return Err(self.error("a parameter name or ')'")),
            }
        }
    }
}

// ============================================================================
// Module import
// ============================================================================

/// `@importModule(path, env)` - evaluate a module file and copy its
/// exported symbols into the importing environment.
///
/// The path resolves against the importing module's directory. The
/// module runs with fresh default globals; `@exportSymbol` marks which
/// of its fields are copied.
fn import_module(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    let path_value = ctx.get_param(0);
    let env = ctx.get_param(1);
    let path = path_value.to_display_string();

    let resolved = resolve_module_path(ctx.module_path(), &path);
    let source = std::fs::read_to_string(&resolved).map_err(|e| {
        Error::io("Importing module", Some(resolved.display().to_string()), e)
    })?;

    log::debug!("importing module {}", resolved.display());
    let module_globals = default_globals()?;
    evaluate(&source, &module_globals, &resolved.display().to_string())?;

    let exports = module_globals.read_field(EXPORTS_FIELD)?;
    if let MicaVal::Array(names) = &exports {
        for name in names.to_vec() {
            let name = name.to_display_string();
            let value = module_globals.read_field(&name)?;
            env.write_field(&name, value, false)?;
        }
    }
    Ok(MicaVal::Null)
}

fn resolve_module_path(importer: &str, path: &str) -> PathBuf {
    let requested = Path::new(path);
    if requested.is_absolute() {
        return requested.to_path_buf();
    }
    match Path::new(importer).parent() {
        Some(dir) if !importer.is_empty() => dir.join(requested),
        _ => requested.to_path_buf(),
    }
}
