use hostlib_core::{Diagnostic, HostConfig, RunReport};
use hostlib_wasm::{RunOutcome, RunRequest};
use std::collections::BTreeMap;
use std::env;
use std::process;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "HOSTLIB_LOG";

const HELP: &str = "\
hostlib: host runtime for compiled WebAssembly programs

Usage:
  hostlib <command> [options]

Commands:
  run <module.wasm|module.wat> [--entry <name>] [--type <declared>] [--stdin <file>] [--file <name>=<path>]... [--config <file>] [--json] [--report <file>]
  inspect <module.wasm|module.wat> [--export <name>] [--json]

Options:
  -h, --help     Show this help message
  --version      Show version information

Logging is controlled by the HOSTLIB_LOG environment variable (default: warn).
";

const RUN_HELP: &str = "\
Usage:
  hostlib run <module.wasm|module.wat> [options]

Options:
  --entry        Export to call (default: main, or the config's entry)
  --type         Declared result type; text types render string results
  --stdin        Read program input from file
  --file         Make a file visible to the program as <name> (repeatable)
  --config       Load runtime configuration from a JSON file
  --json         Emit a JSON report instead of program output
  --report       Also write the JSON report to a file
  -h, --help     Show this help message
";

const INSPECT_HELP: &str = "\
Usage:
  hostlib inspect <module.wasm|module.wat> [--export <name>] [--json]

Options:
  --export       Print the return type of a single export
  --json         Emit the decoded module metadata as JSON
  -h, --help     Show this help message
";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Run {
        path: String,
        entry: Option<String>,
        declared_type: Option<String>,
        stdin: Option<String>,
        files: Vec<(String, String)>,
        config: Option<String>,
        json: bool,
        report: Option<String>,
    },
    Inspect {
        path: String,
        export: Option<String>,
        json: bool,
    },
}

fn main() {
    init_logging();
    let args: Vec<String> = env::args().skip(1).collect();

    if args.is_empty() || matches!(args[0].as_str(), "-h" | "--help") {
        print!("{HELP}");
        return;
    }

    if args[0] == "--version" {
        println!("{} {}", hostlib_core::TOOL_NAME, env!("CARGO_PKG_VERSION"));
        return;
    }

    if args[0] == "run" && contains_help_flag(&args[1..]) {
        print!("{RUN_HELP}");
        return;
    }
    if args[0] == "inspect" && contains_help_flag(&args[1..]) {
        print!("{INSPECT_HELP}");
        return;
    }

    let command = match parse_command(&args) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("error: {message}");
            eprintln!();
            eprintln!("{HELP}");
            process::exit(2);
        }
    };

    match execute(command) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(message) => {
            eprintln!("error: {message}");
            process::exit(2);
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn contains_help_flag(args: &[String]) -> bool {
    args.iter().any(|arg| matches!(arg.as_str(), "-h" | "--help"))
}

fn parse_command(args: &[String]) -> Result<Command, String> {
    match args[0].as_str() {
        "run" => parse_run(&args[1..]),
        "inspect" => parse_inspect(&args[1..]),
        other => Err(format!("unknown command '{other}'")),
    }
}

fn parse_run(args: &[String]) -> Result<Command, String> {
    let parsed = parse_path_and_flags(args, ParseConfig::run())?;
    let path = parsed
        .path
        .ok_or_else(|| "missing module path for run".to_string())?;
    Ok(Command::Run {
        path,
        entry: parsed.entry,
        declared_type: parsed.declared_type,
        stdin: parsed.stdin,
        files: parsed.files,
        config: parsed.config,
        json: parsed.json,
        report: parsed.report,
    })
}

fn parse_inspect(args: &[String]) -> Result<Command, String> {
    let parsed = parse_path_and_flags(args, ParseConfig::inspect())?;
    let path = parsed
        .path
        .ok_or_else(|| "missing module path for inspect".to_string())?;
    Ok(Command::Inspect {
        path,
        export: parsed.export,
        json: parsed.json,
    })
}

#[derive(Clone, Copy, Default)]
struct ParseConfig {
    allow_json: bool,
    allow_entry: bool,
    allow_type: bool,
    allow_stdin: bool,
    allow_file: bool,
    allow_config: bool,
    allow_report: bool,
    allow_export: bool,
}

impl ParseConfig {
    fn run() -> Self {
        Self {
            allow_json: true,
            allow_entry: true,
            allow_type: true,
            allow_stdin: true,
            allow_file: true,
            allow_config: true,
            allow_report: true,
            allow_export: false,
        }
    }

    fn inspect() -> Self {
        Self {
            allow_json: true,
            allow_export: true,
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct ParsedArgs {
    path: Option<String>,
    json: bool,
    entry: Option<String>,
    declared_type: Option<String>,
    stdin: Option<String>,
    files: Vec<(String, String)>,
    config: Option<String>,
    report: Option<String>,
    export: Option<String>,
}

fn flag_value<'a>(
    iter: &mut impl Iterator<Item = &'a String>,
    flag: &str,
    allowed: bool,
) -> Result<String, String> {
    if !allowed {
        return Err(format!("unexpected {flag}"));
    }
    iter.next()
        .map(|value| value.to_string())
        .ok_or_else(|| format!("missing value for {flag}"))
}

fn parse_path_and_flags(args: &[String], config: ParseConfig) -> Result<ParsedArgs, String> {
    let mut parsed = ParsedArgs::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--json" => {
                if !config.allow_json {
                    return Err("unexpected --json".to_string());
                }
                parsed.json = true;
            }
            "--entry" => parsed.entry = Some(flag_value(&mut iter, arg, config.allow_entry)?),
            "--type" => {
                parsed.declared_type = Some(flag_value(&mut iter, arg, config.allow_type)?)
            }
            "--stdin" => parsed.stdin = Some(flag_value(&mut iter, arg, config.allow_stdin)?),
            "--file" => {
                let value = flag_value(&mut iter, arg, config.allow_file)?;
                parsed.files.push(parse_file_mapping(&value)?);
            }
            "--config" => parsed.config = Some(flag_value(&mut iter, arg, config.allow_config)?),
            "--report" => parsed.report = Some(flag_value(&mut iter, arg, config.allow_report)?),
            "--export" => parsed.export = Some(flag_value(&mut iter, arg, config.allow_export)?),
            flag if flag.starts_with('-') => {
                return Err(format!("unknown option '{flag}'"));
            }
            value => {
                if parsed.path.is_some() {
                    return Err("multiple paths provided".to_string());
                }
                parsed.path = Some(value.to_string());
            }
        }
    }

    Ok(parsed)
}

fn parse_file_mapping(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), path.to_string()))
        }
        _ => Err(format!(
            "invalid --file value '{value}' (expected <name>=<path>)"
        )),
    }
}

/// `Ok(false)` means the command ran but the program or module failed.
fn execute(command: Command) -> Result<bool, String> {
    match command {
        Command::Run {
            path,
            entry,
            declared_type,
            stdin,
            files,
            config,
            json,
            report,
        } => {
            let request = build_request(entry, declared_type, stdin, files, config)?;
            let run_report = run_report(&path, &request);
            let report_json = hostlib_core::to_json(&run_report);
            if let Some(report_path) = report.as_deref() {
                std::fs::write(report_path, &report_json).map_err(|err| {
                    format!("unable to write --report file '{report_path}': {err}")
                })?;
            }
            if json {
                println!("{report_json}");
            } else {
                print_run(&run_report);
            }
            Ok(run_report.ok)
        }
        Command::Inspect { path, export, json } => {
            let bytes = match load_module(&path) {
                Ok(bytes) => bytes,
                Err(diagnostic) => {
                    print_diagnostic(&diagnostic);
                    return Ok(false);
                }
            };
            let report = hostlib_core::inspect_report(&path, &bytes);
            if json {
                println!("{}", hostlib_core::to_json(&report));
                return Ok(report.ok);
            }
            if !report.ok {
                report.diagnostics.iter().for_each(print_diagnostic);
                return Ok(false);
            }
            match export {
                Some(name) => {
                    let return_type = report
                        .module
                        .as_ref()
                        .map(|module| module.return_type(&name))
                        .unwrap_or(hostlib_core::ReturnType::Unknown);
                    println!("{return_type}");
                }
                None => {
                    for export in &report.exports {
                        println!("{}: {}", export.name, export.return_type);
                    }
                }
            }
            Ok(true)
        }
    }
}

fn build_request(
    entry: Option<String>,
    declared_type: Option<String>,
    stdin: Option<String>,
    files: Vec<(String, String)>,
    config: Option<String>,
) -> Result<RunRequest, String> {
    let config = match config {
        Some(path) => HostConfig::load(std::path::Path::new(&path)).map_err(|err| err.to_string())?,
        None => HostConfig::default(),
    };
    let input = match stdin {
        Some(path) => read_text("--stdin", &path)?,
        None => String::new(),
    };
    let mut contents = BTreeMap::new();
    for (name, path) in files {
        let text = read_text("--file", &path)?;
        contents.insert(name, text);
    }
    Ok(RunRequest {
        entry,
        input,
        files: contents,
        declared_type,
        config,
    })
}

fn read_text(flag: &str, path: &str) -> Result<String, String> {
    hostlib_core::load_text(path)
        .map_err(|diagnostic| format!("{flag} '{path}': {}", diagnostic.message))
}

fn load_module(path: &str) -> Result<Vec<u8>, Diagnostic> {
    let bytes = hostlib_core::load_file(path)?;
    debug!(path, len = bytes.len(), "loaded module");
    Ok(bytes)
}

fn run_report(path: &str, request: &RunRequest) -> RunReport {
    let bytes = match load_module(path) {
        Ok(bytes) => bytes,
        Err(diagnostic) => return RunReport::failure(None, vec![diagnostic]),
    };
    match hostlib_wasm::execute(&bytes, request) {
        Ok(RunOutcome {
            result,
            return_type,
            stdout,
            files,
            ..
        }) => RunReport::success(result, return_type, stdout, files),
        Err(err) => {
            let diagnostic = err.to_diagnostic(path);
            RunReport::failure(Some(err.stdout), vec![diagnostic])
        }
    }
}

fn print_run(report: &RunReport) {
    if let Some(stdout) = report.stdout.as_deref() {
        print!("{stdout}");
        if !stdout.is_empty() && !stdout.ends_with('\n') && report.ok {
            println!();
        }
    }
    if let Some(result) = report.result.as_deref().filter(|result| !result.is_empty()) {
        println!("{result}");
    }
    report.diagnostics.iter().for_each(print_diagnostic);
}

fn print_diagnostic(diagnostic: &Diagnostic) {
    eprintln!(
        "{}[{}]: {} ({})",
        diagnostic.severity, diagnostic.code, diagnostic.message, diagnostic.file
    );
    for note in &diagnostic.notes {
        eprintln!("  note: {note}");
    }
    if let Some(help) = diagnostic.help.as_deref() {
        eprintln!("  help: {help}");
    }
}
