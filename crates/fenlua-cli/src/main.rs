//! `fenlua [options] [script [args]]` — a `lua`-alike host driver: load a
//! string or file, run it against a fresh [`LuaState`], and either exit or
//! drop into a line-buffered REPL. Mirrors the teacher's own interpreter
//! binary's option set and control flow, reduced to the libraries this
//! build actually installs (no `package`/`require`, no `warn`).

use std::env;
use std::fs;
use std::io::{self, BufRead, Read, Write};

use fenlua::value::Value;
use fenlua::vm::state::LuaState;
use fenlua::vm::LuaError;

const VERSION: &str = "fenlua 0.1.0";
const COPYRIGHT: &str = "Copyright (C) 2026 fenlua contributors";

/// Exit codes (spec §6): 0 success, 1 runtime error, 2 syntax error,
/// 3 host-level error (bad arguments, file I/O). Distinct from
/// `LuaError::exit_code()`, which numbers the four §7 error *classes*
/// (errrun/errsyntax/errmem/errerr) for in-VM bookkeeping rather than for
/// a host process's exit status.
const EXIT_SUCCESS: i32 = 0;
const EXIT_RUNTIME_ERROR: i32 = 1;
const EXIT_SYNTAX_ERROR: i32 = 2;
const EXIT_HOST_ERROR: i32 = 3;

fn print_usage() {
    eprintln!("usage: fenlua [options] [script [args]]");
    eprintln!("Available options are:");
    eprintln!("  -e stat   execute string 'stat'");
    eprintln!("  -i        enter interactive mode after executing 'script'");
    eprintln!("  -l mod    load library 'mod' into global 'mod' (unsupported in this build)");
    eprintln!("  -v        show version information");
    eprintln!("  -E        ignore environment variables (no-op: no env-driven config exists)");
    eprintln!("  -W        turn warnings on (no-op: no 'warn' builtin in this build)");
    eprintln!("  --        stop handling options");
    eprintln!("  -         stop handling options and execute stdin");
}

fn print_version() {
    println!("{}", VERSION);
    println!("{}", COPYRIGHT);
}

#[derive(Default)]
struct Options {
    execute_strings: Vec<String>,
    interactive: bool,
    script_file: Option<String>,
    script_args: Vec<String>,
    require_modules: Vec<String>,
    show_version: bool,
    read_stdin: bool,
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = env::args().collect();
    let mut opts = Options::default();
    let mut i = 1;
    let mut stop_options = false;

    while i < args.len() {
        let arg = &args[i];

        if !stop_options && arg.starts_with('-') && arg != "-" {
            match arg.as_str() {
                "-e" => {
                    i += 1;
                    if i >= args.len() {
                        return Err("'-e' needs argument".to_string());
                    }
                    opts.execute_strings.push(args[i].clone());
                }
                "-i" => opts.interactive = true,
                "-l" => {
                    i += 1;
                    if i >= args.len() {
                        return Err("'-l' needs argument".to_string());
                    }
                    opts.require_modules.push(args[i].clone());
                }
                "-v" => opts.show_version = true,
                "-E" | "-W" => {}
                "--" => stop_options = true,
                other => return Err(format!("unrecognized option '{}'", other)),
            }
        } else if arg == "-" {
            opts.read_stdin = true;
            stop_options = true;
        } else {
            opts.script_file = Some(arg.clone());
            i += 1;
            while i < args.len() {
                opts.script_args.push(args[i].clone());
                i += 1;
            }
            break;
        }
        i += 1;
    }

    Ok(opts)
}

fn setup_arg_table(state: &mut LuaState, script_name: Option<&str>, args: &[String]) {
    let table = fenlua::value::TableRef::with_capacity(args.len(), 1);
    if let Some(name) = script_name {
        table.borrow_mut().raw_set(Value::Number(0.0), Value::String(state.intern(name)));
    }
    for (i, a) in args.iter().enumerate() {
        table
            .borrow_mut()
            .raw_set(Value::Number((i + 1) as f64), Value::String(state.intern(a)));
    }
    let key = Value::String(state.intern("arg"));
    state.globals().borrow_mut().raw_set(key, Value::Table(table));
}

fn print_lua_error(context: &str, err: &LuaError) {
    eprintln!("fenlua: {}{}", context, err.display_message());
}

fn execute_source(state: &mut LuaState, source: &str, chunk_name: &str) -> Result<Vec<Value>, (i32, String)> {
    match fenlua::compiler::compile_chunk(state, source, chunk_name) {
        Ok(closure) => state
            .call(Value::Function(closure), Vec::new())
            .map_err(|e| (EXIT_RUNTIME_ERROR, format!("{}\n{}", e.display_message(), state.traceback()))),
        Err(e) => Err((EXIT_SYNTAX_ERROR, e.to_string())),
    }
}

fn execute_file(state: &mut LuaState, filename: &str) -> Result<(), i32> {
    let source = match fs::read_to_string(filename) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("fenlua: cannot open {}: {}", filename, e);
            return Err(EXIT_HOST_ERROR);
        }
    };
    let chunk_name = format!("@{}", filename);
    execute_source(state, &source, &chunk_name).map(|_| ()).map_err(|(code, msg)| {
        eprintln!("fenlua: {}", msg);
        code
    })
}

fn execute_stdin(state: &mut LuaState) -> Result<(), i32> {
    let mut source = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut source) {
        eprintln!("fenlua: error reading stdin: {}", e);
        return Err(EXIT_HOST_ERROR);
    }
    execute_source(state, &source, "=stdin").map(|_| ()).map_err(|(code, msg)| {
        eprintln!("fenlua: {}", msg);
        code
    })
}

fn run_repl(state: &mut LuaState) {
    println!("{}", VERSION);
    println!("{}", COPYRIGHT);
    println!("Type 'exit' or Ctrl+D to quit\n");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut pending = String::new();

    loop {
        print!("{}", if pending.is_empty() { "> " } else { ">> " });
        let _ = io::stdout().flush();

        let line = match lines.next() {
            Some(Ok(line)) => line,
            _ => break,
        };
        let trimmed = line.trim();
        if pending.is_empty() && (trimmed == "exit" || trimmed == "quit") {
            break;
        }
        if !pending.is_empty() {
            pending.push('\n');
        }
        pending.push_str(&line);

        // Try it as an expression first, so `1 + 1` prints `2` the way a
        // REPL user expects, falling back to a plain statement.
        let as_expr = format!("return {}", pending);
        let source = if fenlua::compiler::compile_chunk(state, &as_expr, "=stdin").is_ok() {
            as_expr
        } else {
            pending.clone()
        };

        match fenlua::compiler::compile_chunk(state, &source, "=stdin") {
            Ok(closure) => {
                match state.call(Value::Function(closure), Vec::new()) {
                    Ok(results) => {
                        if let Some(first) = results.into_iter().next() {
                            if !first.is_nil() {
                                println!("{}", fenlua::vm::tostring::raw_tostring(&first));
                            }
                        }
                    }
                    Err(e) => print_lua_error("", &e),
                }
                pending.clear();
            }
            Err(e) => {
                let message = e.to_string();
                if message.contains("<eof>") || message.contains("expected") {
                    continue; // likely an unfinished multi-line chunk
                }
                eprintln!("fenlua: {}", message);
                pending.clear();
            }
        }
    }
}

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let opts = match parse_args() {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("fenlua: {}", e);
            print_usage();
            return EXIT_HOST_ERROR;
        }
    };

    if opts.show_version {
        print_version();
        if opts.execute_strings.is_empty() && opts.script_file.is_none() && !opts.read_stdin {
            return EXIT_SUCCESS;
        }
    }

    let mut state = LuaState::new();
    fenlua::stdlib::open_libs(&mut state);

    for module in &opts.require_modules {
        eprintln!(
            "fenlua: '-l {}' requires the 'require' function, which this build does not provide",
            module
        );
        return EXIT_HOST_ERROR;
    }

    setup_arg_table(&mut state, opts.script_file.as_deref(), &opts.script_args);

    for code in &opts.execute_strings {
        if let Err((exit_code, msg)) = execute_source(&mut state, code, "=(command line)") {
            eprintln!("fenlua: {}", msg);
            return exit_code;
        }
    }

    if let Some(filename) = &opts.script_file {
        if let Err(code) = execute_file(&mut state, filename) {
            return code;
        }
    } else if opts.read_stdin {
        if let Err(code) = execute_stdin(&mut state) {
            return code;
        }
    }

    if opts.interactive
        || (opts.execute_strings.is_empty() && opts.script_file.is_none() && !opts.read_stdin)
    {
        run_repl(&mut state);
    }

    EXIT_SUCCESS
}
