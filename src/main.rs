//! Purpose: `rtdebug` CLI entry point: populate, inspect, and describe the runtime debug header.
//! Role: Binary crate root; parses args, runs one command, emits JSON on stdout.
//! Invariants: Errors are emitted as JSON on stderr; exit code comes from `api::to_exit_code`.
//! Invariants: Only `describe` populates this process's exported header, and only once.
use std::error::Error as StdError;
use std::io::{self, Read};
use std::path::Path;

use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

use rtdebug::api::{
    Capacities, Error, ErrorKind, HEADER_SYMBOL, LocalMemory, Reader, executable_path,
    header_layout, populate_with, row_layouts, to_exit_code,
};
use rtdebug::sample::register_sample;

const LOG_ENV: &str = "RTDEBUG_LOG";

#[derive(Parser, Debug)]
#[command(
    name = "rtdebug",
    version,
    about = "Build and inspect the self-describing runtime debug header"
)]
struct Cli {
    #[arg(
        long,
        global = true,
        default_value = "warn",
        help = "Log filter for stderr diagnostics (overridden by RTDEBUG_LOG)"
    )]
    log_level: String,
    #[arg(long, global = true, help = "Pretty-print JSON output")]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Populate this process's header from the sample runtime layout and print it.
    Describe(DescribeArgs),
    /// Decode the header of another process (Linux).
    Read(ReadArgs),
    /// Print the byte layout of the header and every row record for this target.
    Layout,
    /// Print the resolved path of this executable.
    ExePath,
}

#[derive(Args, Debug)]
struct DescribeArgs {
    #[arg(long, help = "JSON object overriding table capacities, e.g. '{\"fields\": 64}'")]
    capacities: Option<String>,
    #[arg(long, help = "Keep running until stdin closes so other tools can attach")]
    hold: bool,
}

#[derive(Args, Debug)]
struct ReadArgs {
    #[arg(long, help = "Target process id")]
    pid: u32,
    #[arg(long, help = "Header address in the target (hex with 0x, or decimal)")]
    address: String,
    #[arg(long, default_value_t = std::mem::size_of::<usize>(), help = "Target pointer width in bytes")]
    pointer_width: usize,
}

fn main() {
    let exit_code = match run() {
        Ok(()) => 0,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<(), Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if !err.use_stderr() => {
            err.print().map_err(|io_err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to write help")
                    .with_source(io_err)
            })?;
            return Ok(());
        }
        Err(err) => {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(clap_error_summary(&err))
                .with_hint(clap_error_hint(&err)));
        }
    };
    init_tracing(&cli.log_level);

    match cli.command {
        Command::Describe(args) => describe(args, cli.pretty),
        Command::Read(args) => read(args, cli.pretty),
        Command::Layout => {
            let mut records = vec![header_layout()];
            records.extend(row_layouts());
            emit_json(
                json!({
                    "pointer_width": std::mem::size_of::<usize>(),
                    "records": records,
                }),
                cli.pretty,
            );
            Ok(())
        }
        Command::ExePath => {
            let path = executable_path()?;
            emit_json(json!({ "path": path_text(&path)? }), cli.pretty);
            Ok(())
        }
    }
}

fn describe(args: DescribeArgs, pretty: bool) -> Result<(), Error> {
    let capacities = match args.capacities.as_deref() {
        Some(raw) => serde_json::from_str::<Capacities>(raw).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid --capacities")
                .with_hint("Pass a JSON object with any of: globals, types, fields, bases, defines.")
                .with_source(err)
        })?,
        None => Capacities::default(),
    };
    let header = populate_with(capacities, register_sample)?;
    let address = header.address() as u64;

    // The header lives in this process, so every pointer in it is readable.
    let memory = unsafe { LocalMemory::new() };
    let snapshot = Reader::new(&memory).read_header(address)?.ok_or_else(|| {
        Error::new(ErrorKind::Internal).with_message("header not populated after publish")
    })?;
    emit_json(
        json!({
            "symbol": HEADER_SYMBOL,
            "pid": std::process::id(),
            "header_address": format!("{address:#x}"),
            "header": snapshot,
        }),
        pretty,
    );

    if args.hold {
        let mut sink = Vec::new();
        io::stdin().read_to_end(&mut sink).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to wait on stdin")
                .with_source(err)
        })?;
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn read(args: ReadArgs, pretty: bool) -> Result<(), Error> {
    use rtdebug::api::reader::ProcMemory;

    let address = parse_address(&args.address)?;
    let memory = ProcMemory::open(args.pid)?;
    let reader = Reader::new(&memory).with_pointer_width(args.pointer_width)?;
    match reader.read_header(address)? {
        Some(snapshot) => emit_json(json!({ "pid": args.pid, "header": snapshot }), pretty),
        None => emit_json(
            json!({ "pid": args.pid, "address": address, "populated": false }),
            pretty,
        ),
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn read(_args: ReadArgs, _pretty: bool) -> Result<(), Error> {
    Err(Error::new(ErrorKind::Usage)
        .with_message("reading another process is only supported on Linux"))
}

/// JSON strings are UTF-8, so a path that is not is an error rather than a lossy rendering.
fn path_text(path: &Path) -> Result<&str, Error> {
    path.to_str().ok_or_else(|| {
        Error::new(ErrorKind::PathResolution)
            .with_message(format!("executable path {} is not valid UTF-8", path.display()))
            .with_hint("Use the C entry point rtdebug_executable_path for the raw bytes.")
    })
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_address(raw: &str) -> Result<u64, Error> {
    let trimmed = raw.trim();
    let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse::<u64>(),
    };
    parsed.map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid address {raw:?}"))
            .with_hint("Use hex with a 0x prefix (0x7f00dead0000) or decimal.")
            .with_source(err)
    })
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    match rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
    {
        Some(usage) => format!("Usage: {}", usage.trim()),
        None => "Try `rtdebug --help`.".to_string(),
    }
}

fn init_tracing(default_filter: &str) {
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn emit_json(value: Value, pretty: bool) {
    let json = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert(
        "message".to_string(),
        json!(err.message().map(str::to_string).unwrap_or_else(|| err.to_string())),
    );
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(table) = err.table() {
        inner.insert("table".to_string(), json!(table.name()));
    }
    if let Some(address) = err.address() {
        inner.insert("address".to_string(), json!(format!("{address:#x}")));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

#[cfg(test)]
mod tests {
    use super::{error_json, parse_address, path_text};
    use rtdebug::api::{Error, ErrorKind, TableKind};

    #[test]
    fn addresses_accept_hex_and_decimal() {
        assert_eq!(parse_address("0x10").unwrap(), 16);
        assert_eq!(parse_address("0XfF").unwrap(), 255);
        assert_eq!(parse_address(" 42 ").unwrap(), 42);
        assert_eq!(parse_address("zz").unwrap_err().kind(), ErrorKind::Usage);
    }

    #[test]
    fn error_json_carries_table_and_hint() {
        let err = Error::new(ErrorKind::CapacityExceeded)
            .with_message("table holds at most 1 rows")
            .with_table(TableKind::Field)
            .with_hint("raise it");
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], "CapacityExceeded");
        assert_eq!(value["error"]["table"], "Field");
        assert_eq!(value["error"]["hint"], "raise it");
    }

    #[test]
    fn utf8_paths_render_verbatim() {
        let path = std::path::Path::new("/opt/rt/bin/host");
        assert_eq!(path_text(path).unwrap(), "/opt/rt/bin/host");
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_paths_are_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let path = std::path::Path::new(OsStr::from_bytes(b"/tmp/\xffexe"));
        let err = path_text(path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PathResolution);
    }
}
