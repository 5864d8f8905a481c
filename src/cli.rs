use std::str::FromStr;

use clap::{App, Arg, ArgMatches};
use log::LevelFilter;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use crate::compiler::abi::ABI_NAMES;

// Exit codes for each stage of the pipeline
pub const ERR_USAGE: i32 = 1;
pub const ERR_LEXER_ERROR: i32 = 2;
pub const ERR_PARSER_ERROR: i32 = 3;
pub const ERR_BUILD_ERROR: i32 = 4;
pub const ERR_RESOLVE_ERROR: i32 = 5;
pub const ERR_LAYOUT_ERROR: i32 = 6;
pub const ERR_EMIT_ERROR: i32 = 7;
pub const ERR_GRAPH_ERROR: i32 = 8;
pub const ERR_IO_ERROR: i32 = 9;
pub const ERR_FORMATTER_ERROR: i32 = 10;

/// Prints each rendered diagnostic to stderr, leaving stdout free for the
/// generated code.
pub fn print_errs(errs: &[String]) {
    for e in errs {
        eprintln!("{}", e);
    }
}

pub fn configure_cli() -> clap::App<'static, 'static> {
    App::new("typegen")
        .version("0.3.0")
        .about("Compiles type definition DSL files into C type declarations laid out for a target ABI")
        .arg(
            Arg::with_name("abi")
                .short("a")
                .long("abi")
                .takes_value(true)
                .required(true)
                .possible_values(ABI_NAMES)
                .help("The target machine compiler ABI name"),
        )
        .arg(
            Arg::with_name("input")
                .multiple(true)
                .conflicts_with("load-graph")
                .required_unless("load-graph")
                .help("Input type DSL files to process"),
        )
        .arg(
            Arg::with_name("load-graph")
                .short("p")
                .long("load-graph")
                .takes_value(true)
                .help("Load a resolved type graph instead of compiling inputs"),
        )
        .arg(
            Arg::with_name("dump-graph")
                .short("P")
                .long("dump-graph")
                .takes_value(true)
                .conflicts_with("output")
                .help("Write the resolved type graph to a file instead of emitting C"),
        )
        .arg(
            Arg::with_name("template")
                .short("t")
                .long("template")
                .takes_value(true)
                .help("External hook command which renders the resolved graph instead of the built in C emitter"),
        )
        .arg(
            Arg::with_name("public")
                .long("public")
                .help("Include only public API types"),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .help("Output file (default stdout)"),
        )
        .arg(
            Arg::with_name("formatter")
                .short("f")
                .long("formatter")
                .takes_value(true)
                .help("Pipe the generated code through this formatter before writing it"),
        )
        .arg(
            Arg::with_name("deps")
                .short("d")
                .long("deps")
                .takes_value(true)
                .help("Write implicit dependencies to a Makefile"),
        )
        .arg(
            Arg::with_name("traceback")
                .long("traceback")
                .help("Print the full error detail if an error occurs"),
        )
        .arg(
            Arg::with_name("log")
                .long("log")
                .takes_value(true)
                .possible_values(&["error", "warn", "info", "debug", "trace"])
                .help("Write internal logging at the given verbosity to stderr"),
        )
        .arg(
            Arg::with_name("trace")
                .long("trace")
                .help("Print a trace of every compiler event to the console"),
        )
        .arg(
            Arg::with_name("trace-json")
                .long("trace-json")
                .takes_value(true)
                .help("Write a JSON trace of compiler events to the given file"),
        )
}

pub fn get_log_level(args: &ArgMatches) -> Option<LevelFilter> {
    args.value_of("log")
        .and_then(|l| LevelFilter::from_str(l).ok())
}

pub fn configure_logging(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
}

pub fn enable_tracing(args: &ArgMatches) -> bool {
    args.is_present("trace")
}

pub fn json_trace_file<'a>(args: &'a ArgMatches) -> Option<&'a str> {
    args.value_of("trace-json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inputs_and_load_graph_are_exclusive() {
        let res = configure_cli().get_matches_from_safe(vec![
            "typegen",
            "-a",
            "aarch64",
            "--load-graph",
            "g.yaml",
            "in.tc",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn one_of_inputs_or_load_graph_is_required() {
        let res = configure_cli().get_matches_from_safe(vec!["typegen", "-a", "aarch64"]);
        assert!(res.is_err());
    }

    #[test]
    fn dump_graph_excludes_output() {
        let res = configure_cli().get_matches_from_safe(vec![
            "typegen",
            "-a",
            "aarch64",
            "in.tc",
            "-P",
            "g.yaml",
            "-o",
            "out.h",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn abi_names_are_validated() {
        let res = configure_cli().get_matches_from_safe(vec!["typegen", "-a", "pdp11", "in.tc"]);
        assert!(res.is_err());

        let res = configure_cli().get_matches_from_safe(vec!["typegen", "-a", "aarch64", "in.tc"]);
        assert!(res.is_ok());
    }

    #[test]
    fn log_level_parses() {
        let args = configure_cli()
            .get_matches_from_safe(vec!["typegen", "-a", "aarch64", "in.tc", "--log", "debug"])
            .unwrap();
        assert_eq!(get_log_level(&args), Some(LevelFilter::Debug));
    }
}
