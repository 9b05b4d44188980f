//! Quill command-line front end.
//!
//! Runs a script, a `-c` command string, or stdin; `-b` compiles a
//! script into a persisted bytecode module instead. Program failures are
//! rendered through [`diagnostics`] with source positions and, for
//! runtime errors, the open call sites.

mod args;
mod diagnostics;

use args::{CliArgs, ExecutionMode};
use diagnostics::SourceMap;
use quill_core::QuillError;
use quill_vm::value::cell;
use quill_vm::{Executor, HostHooks, Value};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

fn main() -> ExitCode {
    let raw: Vec<String> = std::env::args().skip(1).collect();
    let parsed = match args::parse_args(&raw) {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("quill: {err}");
            eprintln!("{}", args::help_text());
            return ExitCode::from(2);
        }
    };

    init_logging(parsed.verbose);

    match parsed.mode.clone() {
        ExecutionMode::PrintVersion => {
            println!("{}", args::version_string());
            ExitCode::SUCCESS
        }
        ExecutionMode::PrintHelp => {
            println!("{}", args::help_text());
            ExitCode::SUCCESS
        }
        ExecutionMode::Command(source) => run(&source, "<command>", &parsed, true),
        ExecutionMode::Script(path) if is_bytecode_path(&path) => run_bytecode(&path, &parsed),
        ExecutionMode::Script(path) => match std::fs::read_to_string(&path) {
            Ok(source) => run(&source, &path.display().to_string(), &parsed, false),
            Err(err) => {
                eprintln!("quill: cannot read {}: {err}", path.display());
                ExitCode::FAILURE
            }
        },
        ExecutionMode::Stdin => {
            let mut source = String::new();
            if let Err(err) = std::io::stdin().read_to_string(&mut source) {
                eprintln!("quill: cannot read stdin: {err}");
                return ExitCode::FAILURE;
            }
            run(&source, "<stdin>", &parsed, false)
        }
        ExecutionMode::Compile(path) => compile_to_file(&path, parsed.output.as_deref()),
    }
}

/// Route log output to stderr; `QUILL_LOG` overrides the `-v` level.
fn init_logging(verbose: u32) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_env("QUILL_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Compile and execute one program end to end.
fn run(source: &str, filename: &str, parsed: &CliArgs, echo_value: bool) -> ExitCode {
    let map = SourceMap::new(source, filename);
    let table = match quill_compiler::compile(source) {
        Ok(table) => table,
        Err(err) => {
            eprintln!("{}", render_error(&map, &err, &[], 0));
            return ExitCode::FAILURE;
        }
    };
    let bindings = vec![("args".to_string(), args_tuple(&parsed.script_args))];
    let mut executor = Executor::new(HostHooks::default());
    match executor.execute(Rc::new(table.link()), bindings) {
        Ok(outcome) => {
            if echo_value && outcome.value != Value::None {
                println!("{}", outcome.value);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!(
                "{}",
                render_error(&map, &err, &executor.call_trace(), executor.last_debug_offset())
            );
            ExitCode::FAILURE
        }
    }
}

fn is_bytecode_path(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.ends_with(".qbc.json") || name.ends_with(".qbc")
}

/// Execute a persisted bytecode module. No source is available, so
/// failures are reported with raw byte offsets.
fn run_bytecode(path: &Path, parsed: &CliArgs) -> ExitCode {
    let json = match std::fs::read_to_string(path) {
        Ok(json) => json,
        Err(err) => {
            eprintln!("quill: cannot read {}: {err}", path.display());
            return ExitCode::FAILURE;
        }
    };
    let table = match quill_compiler::FunctionTable::import_json(&json) {
        Ok(table) => table,
        Err(err) => {
            eprintln!("quill: {err}");
            return ExitCode::FAILURE;
        }
    };
    let bindings = vec![("args".to_string(), args_tuple(&parsed.script_args))];
    let mut executor = Executor::new(HostHooks::default());
    match executor.execute(Rc::new(table.link()), bindings) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            let trace: Vec<String> = executor
                .call_trace()
                .iter()
                .map(|offset| format!("offset {offset}"))
                .collect();
            if trace.is_empty() {
                eprintln!("{err}");
            } else {
                eprintln!("Traceback: {} -> offset {}\n{err}", trace.join(" -> "), executor.last_debug_offset());
            }
            ExitCode::FAILURE
        }
    }
}

/// Compile a script to a persisted bytecode module.
fn compile_to_file(path: &Path, output: Option<&Path>) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("quill: cannot read {}: {err}", path.display());
            return ExitCode::FAILURE;
        }
    };
    let map = SourceMap::new(&source, &path.display().to_string());
    let json = match quill_compiler::compile(&source).and_then(|t| t.export_json()) {
        Ok(json) => json,
        Err(err) => {
            eprintln!("{}", render_error(&map, &err, &[], 0));
            return ExitCode::FAILURE;
        }
    };
    let target: PathBuf = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| path.with_extension("qbc.json"));
    if let Err(err) = std::fs::write(&target, json) {
        eprintln!("quill: cannot write {}: {err}", target.display());
        return ExitCode::FAILURE;
    }
    tracing::info!(target = %target.display(), "module written");
    ExitCode::SUCCESS
}

fn render_error(map: &SourceMap, err: &QuillError, trace: &[u32], fault: u32) -> String {
    match err {
        QuillError::LexError { span, .. } | QuillError::SyntaxError { span, .. } => {
            diagnostics::render_structural(map, *span, err)
        }
        QuillError::CompileError { span: Some(span), .. } => {
            diagnostics::render_structural(map, *span, err)
        }
        QuillError::RuntimeError { .. } => diagnostics::render_runtime(map, trace, fault, err),
        _ => err.to_string(),
    }
}

/// The program's `args` tuple.
fn args_tuple(script_args: &[String]) -> Value {
    Value::Tuple(
        script_args
            .iter()
            .map(|a| cell(Value::Str(a.clone())))
            .collect(),
    )
}
