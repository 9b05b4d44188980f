//! Hand-rolled command-line argument parser.
//!
//! Options are parsed left-to-right until a mode is fixed; everything
//! after the script path (or `-c` command) belongs to the program and is
//! exposed to it as the `args` tuple.

use std::path::PathBuf;

/// What the front end should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Run a script file: `quill script.ql [args...]`.
    Script(PathBuf),
    /// Run a command string: `quill -c "print(1)"`.
    Command(String),
    /// Read the program from stdin: `quill -`.
    Stdin,
    /// Compile a script to a bytecode module: `quill -b script.ql`.
    Compile(PathBuf),
    /// Print version and exit: `-V` / `--version`.
    PrintVersion,
    /// Print help and exit: `-h` / `--help`.
    PrintHelp,
}

/// Complete set of parsed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub mode: ExecutionMode,
    /// Arguments handed to the program as its `args` tuple.
    pub script_args: Vec<String>,
    /// `-o <path>`: output path for `-b`.
    pub output: Option<PathBuf>,
    /// `-v` occurrences; raises the log verbosity.
    pub verbose: u32,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Stdin,
            script_args: Vec::new(),
            output: None,
            verbose: 0,
        }
    }
}

/// Error during argument parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgError {
    /// A flag that requires a value was given none.
    MissingValue(&'static str),
    /// Unrecognized flag.
    UnknownFlag(String),
}

impl std::fmt::Display for ArgError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingValue(flag) => write!(f, "argument expected for the {flag} option"),
            Self::UnknownFlag(flag) => write!(f, "unknown option: {flag}"),
        }
    }
}

impl std::error::Error for ArgError {}

/// Parse the arguments after the program name.
pub fn parse_args(args: &[String]) -> Result<CliArgs, ArgError> {
    let mut result = CliArgs::default();
    let mut i = 0;

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "-V" | "--version" => {
                result.mode = ExecutionMode::PrintVersion;
                return Ok(result);
            }
            "-h" | "--help" => {
                result.mode = ExecutionMode::PrintHelp;
                return Ok(result);
            }
            "-v" => {
                result.verbose = result.verbose.saturating_add(1);
                i += 1;
            }
            "-c" => {
                i += 1;
                let Some(command) = args.get(i) else {
                    return Err(ArgError::MissingValue("-c"));
                };
                result.mode = ExecutionMode::Command(command.clone());
                result.script_args = args[i + 1..].to_vec();
                return Ok(result);
            }
            "-b" => {
                i += 1;
                let Some(path) = args.get(i) else {
                    return Err(ArgError::MissingValue("-b"));
                };
                result.mode = ExecutionMode::Compile(PathBuf::from(path));
                i += 1;
            }
            "-o" => {
                i += 1;
                let Some(path) = args.get(i) else {
                    return Err(ArgError::MissingValue("-o"));
                };
                result.output = Some(PathBuf::from(path));
                i += 1;
            }
            "-" => {
                result.mode = ExecutionMode::Stdin;
                result.script_args = args[i + 1..].to_vec();
                return Ok(result);
            }
            other if other.starts_with('-') => {
                return Err(ArgError::UnknownFlag(other.to_string()));
            }
            script => {
                result.mode = ExecutionMode::Script(PathBuf::from(script));
                result.script_args = args[i + 1..].to_vec();
                return Ok(result);
            }
        }
    }

    Ok(result)
}

/// Banner printed by `-V`.
#[must_use]
pub fn version_string() -> String {
    format!("quill {}", quill_core::VERSION)
}

/// Text printed by `-h`.
#[must_use]
pub fn help_text() -> String {
    format!(
        r#"usage: quill [option] ... [-c cmd | -b file | file | -] [arg] ...

-c cmd : run the program passed in as a string (terminates option list)
-b file: compile file to a bytecode module (.qbc.json next to it, or -o)
-o path: output path for -b
-v     : increase log verbosity (repeatable)
-V     : print the version number and exit (also --version)
-h     : print this help message and exit (also --help)
file   : run the program read from a script file
-      : run the program read from stdin (default)
arg ...: arguments exposed to the program as the `args` tuple

quill {}"#,
        quill_core::VERSION
    )
}
