extern crate log;
extern crate simplelog;

use std::fs::File;
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Instant;

use clap::ArgMatches;
use log::debug;

use typegen::compiler::abi::{self, Abi};
use typegen::compiler::diagnostics::Logger;
use typegen::compiler::emit::generate;
use typegen::compiler::ir::TopLevel;
use typegen::compiler::layout;
use typegen::compiler::resolve::resolve;
use typegen::compiler::{CompilerDisplay, CompilerError, SourceMap};
use typegen::diagnostics::{write_source_map, ConsoleWriter, JsonWriter};
use typegen::project::{load_sources, parse_sources, FrontError, GraphFile};
use typegen::*;

fn main() -> Result<(), i32> {
    let config = configure_cli().get_matches();

    if let Some(level) = get_log_level(&config) {
        configure_logging(level).expect("Failed to configure logger.")
    }

    let abi_name = config.value_of("abi").expect("Expected an ABI name");
    let abi = match abi::lookup(abi_name) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("{}", e);
            return Err(ERR_USAGE);
        }
    };

    let mut source_map = SourceMap::new();

    let (string_table, top) = match config.value_of("load-graph") {
        Some(path) => {
            let load_time = Instant::now();
            let loaded = load_graph(path, abi.name())?;
            debug!("Load graph: {}", load_time.elapsed().as_secs_f32());
            loaded
        }
        None => compile(&config, &mut source_map, abi.as_ref())?,
    };

    if let Some(path) = config.value_of("dump-graph") {
        let dump_time = Instant::now();
        dump_graph(path, abi.name(), &string_table, top)?;
        debug!("Dump graph: {}", dump_time.elapsed().as_secs_f32());
        return write_deps(&config, &source_map);
    }

    let traceback = config.is_present("traceback");
    let public_only = config.is_present("public");

    let emit_time = Instant::now();
    let code = match config.value_of("template") {
        Some(hook) => {
            let gf = GraphFile::new(abi.name(), &string_table, top);
            run_template(hook, &gf, public_only)?
        }
        None => match generate(&top, abi.as_ref(), &string_table, public_only) {
            Ok(code) => code,
            Err(e) => {
                report(&e, &source_map, &string_table, traceback);
                return Err(ERR_EMIT_ERROR);
            }
        },
    };
    debug!("Emit: {}", emit_time.elapsed().as_secs_f32());

    let code = match config.value_of("formatter") {
        Some(formatter) => match run_external(formatter, &[], &code) {
            Ok(formatted) => formatted,
            Err(msg) => {
                eprintln!("Error formatting output: {}", msg);
                return Err(ERR_FORMATTER_ERROR);
            }
        },
        None => code,
    };

    match config.value_of("output") {
        Some(path) => {
            if let Err(e) = std::fs::write(path, &code) {
                eprintln!("{}: {}", path, e);
                return Err(ERR_IO_ERROR);
            }
        }
        None => print!("{}", code),
    }

    write_deps(&config, &source_map)
}

/// Runs the front end over the input files and takes the resulting graph
/// through resolution and layout.
fn compile(
    config: &ArgMatches,
    source_map: &mut SourceMap,
    abi: &dyn Abi,
) -> Result<(StringTable, TopLevel), i32> {
    let string_table = StringTable::new();
    let traceback = config.is_present("traceback");

    let inputs: Vec<&str> = config
        .values_of("input")
        .expect("Expected input files")
        .collect();
    if let Err(e) = load_sources(&inputs, source_map) {
        eprintln!("{}", e);
        return Err(ERR_IO_ERROR);
    }
    let source_map = &*source_map;

    let front_time = Instant::now();
    let mut top = {
        // Setup tracing system
        let mut tracer = Logger::new();

        // Setup trace console writer
        let console_writer = ConsoleWriter::new(source_map, &string_table);
        if enable_tracing(config) {
            tracer.add_writer(&console_writer);
        }

        // Setup JSON trace writer
        let json_writer = match json_trace_file(config) {
            Some(path) => {
                let trace_file = match File::create(path) {
                    Ok(f) => f,
                    Err(e) => {
                        eprintln!("{}: {}", path, e);
                        return Err(ERR_IO_ERROR);
                    }
                };

                let map_path = format!("{}.map", path);
                match File::create(&map_path) {
                    Ok(map_file) => {
                        if let Err(e) = write_source_map(map_file, source_map) {
                            eprintln!("{}: {}", map_path, e);
                        }
                    }
                    Err(e) => eprintln!("{}: {}", map_path, e),
                }

                Some(JsonWriter::new(trace_file, source_map, &string_table))
            }
            None => None,
        };
        if let Some(w) = &json_writer {
            tracer.add_writer(w);
        }

        match parse_sources(source_map, &string_table, &tracer) {
            Ok(top) => top,
            Err(e) => {
                print_errs(&e.render(source_map, &string_table));
                if traceback {
                    eprintln!("{:?}", e);
                }
                return Err(match e {
                    FrontError::Lexer(_) => ERR_LEXER_ERROR,
                    FrontError::Parser(_) => ERR_PARSER_ERROR,
                    FrontError::Build(_) => ERR_BUILD_ERROR,
                });
            }
        }
    };
    debug!("Front end: {}", front_time.elapsed().as_secs_f32());

    let resolve_time = Instant::now();
    if let Err(e) = resolve(&mut top, &string_table) {
        report(&e, source_map, &string_table, traceback);
        return Err(ERR_RESOLVE_ERROR);
    }
    debug!("Resolve: {}", resolve_time.elapsed().as_secs_f32());

    let layout_time = Instant::now();
    if let Err(e) = layout::update(&mut top, abi, &string_table) {
        report(&e, source_map, &string_table, traceback);
        return Err(ERR_LAYOUT_ERROR);
    }
    debug!("Layout: {}", layout_time.elapsed().as_secs_f32());

    Ok((string_table, top))
}

/// Loads a previously dumped graph, which is already resolved and laid out.
fn load_graph(path: &str, abi_name: &str) -> Result<(StringTable, TopLevel), i32> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("{}: {}", path, e);
            return Err(ERR_IO_ERROR);
        }
    };

    let gf = match GraphFile::read(&mut file) {
        Ok(gf) => gf,
        Err(e) => {
            eprintln!("{}: {}", path, e);
            return Err(ERR_GRAPH_ERROR);
        }
    };

    if gf.abi() != abi_name {
        eprintln!(
            "{}: graph was laid out for ABI {}, not {}",
            path,
            gf.abi(),
            abi_name
        );
        return Err(ERR_USAGE);
    }

    Ok(gf.restore())
}

fn dump_graph(path: &str, abi_name: &str, strings: &StringTable, top: TopLevel) -> Result<(), i32> {
    let gf = GraphFile::new(abi_name, strings, top);
    let mut file = match File::create(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("{}: {}", path, e);
            return Err(ERR_IO_ERROR);
        }
    };
    gf.write(&mut file).map_err(|e| {
        eprintln!("{}: {}", path, e);
        ERR_GRAPH_ERROR
    })
}

/// Hands the serialized graph to an external rendering hook on stdin and
/// takes its stdout as the output text.
fn run_template(hook: &str, gf: &GraphFile, public_only: bool) -> Result<String, i32> {
    let graph = match serde_yaml::to_string(gf) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("{}", e);
            return Err(ERR_GRAPH_ERROR);
        }
    };

    let args: &[&str] = if public_only { &["--public"] } else { &[] };
    run_external(hook, args, &graph).map_err(|msg| {
        eprintln!("Error rendering template: {}", msg);
        ERR_EMIT_ERROR
    })
}

/// Runs a command with `input` on its stdin and returns its stdout.
fn run_external(cmd: &str, args: &[&str], input: &str) -> Result<String, String> {
    let mut child = Command::new(cmd)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|e| format!("{}: {}", cmd, e))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(input.as_bytes())
            .map_err(|e| format!("{}: {}", cmd, e))?;
    }

    let out = child
        .wait_with_output()
        .map_err(|e| format!("{}: {}", cmd, e))?;
    let text = String::from_utf8_lossy(&out.stdout).into_owned();
    if out.status.success() {
        Ok(text)
    } else {
        Err(format!("{} exited with {}", cmd, out.status))
    }
}

/// Writes a Makefile rule naming every input which influenced the output.
fn write_deps(config: &ArgMatches, sm: &SourceMap) -> Result<(), i32> {
    let path = match config.value_of("deps") {
        Some(p) => p,
        None => return Ok(()),
    };

    let mut deps: Vec<String> = sm.paths().map(|p| p.display().to_string()).collect();
    if let Some(t) = config.value_of("template") {
        deps.push(t.into());
    }
    if let Some(g) = config.value_of("load-graph") {
        deps.push(g.into());
    }
    deps.sort();
    deps.dedup();

    let out_name = config
        .value_of("dump-graph")
        .or_else(|| config.value_of("output"))
        .unwrap_or("-");

    let rule = format!("{} : {}\n", out_name, deps.join(" "));
    std::fs::write(path, rule).map_err(|e| {
        eprintln!("{}: {}", path, e);
        ERR_IO_ERROR
    })
}

fn report<IE: CompilerDisplay + std::fmt::Debug>(
    e: &CompilerError<IE>,
    sm: &SourceMap,
    st: &StringTable,
    traceback: bool,
) {
    let msg = e
        .format(sm, st)
        .unwrap_or_else(|d| format!("failed to render diagnostic: {}", d));
    eprintln!("{}", msg);
    if traceback {
        eprintln!("{:?}", e);
    }
}
