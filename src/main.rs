//! Purpose: `prez-pkglog-plugin` inspection tool that drives the plugin through its exported C symbols.
//! Role: Binary crate root; lets packagers and tests check metadata and lifecycle without dnf5.
//! Invariants: stdout carries one JSON object per successful command.
//! Invariants: stderr carries only the plugin's own diagnostics, plus a JSON error on failure.
//! Invariants: Process exit code is derived from `to_exit_code`.
use std::ffi::CStr;
use std::io;

use clap::{Parser, Subcommand};
use serde_json::{Value, json};

use prez_pkglog::abi::{
    dnf5_context, dnf5_plugin_delete_instance, dnf5_plugin_get_api_version,
    dnf5_plugin_get_name, dnf5_plugin_get_version, dnf5_plugin_new_instance,
};
use prez_pkglog::core::error::{Error, ErrorKind, to_exit_code};
use prez_pkglog::core::metadata::{ApplicationVersion, PluginApiVersion, Revision};

const STAND_IN_APP_VERSION: ApplicationVersion = ApplicationVersion {
    major: 5,
    minor: 0,
    micro: 0,
};

#[derive(Parser)]
#[command(
    name = "prez-pkglog-plugin",
    version = Revision::active().version_str(),
    about = "Inspect and exercise the prez_pkglog dnf5 plugin",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print plugin metadata as JSON.
    Info {
        #[arg(long, value_name = "MAJOR.MINOR", help = "Host plugin API version to check against")]
        host_api: Option<String>,
    },
    /// Run new -> init -> finish -> delete through the exported symbols.
    Lifecycle {
        #[arg(long, default_value_t = 1)]
        cycles: u32,
    },
}

// Opaque token handed to the plugin in place of a dnf5 context.
struct StandInContext {
    _token: u8,
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
            let message = err.to_string();
            let summary = message.lines().next().unwrap_or("invalid arguments");
            return Err(Error::new(ErrorKind::Usage)
                .with_message(summary.trim_start_matches("error: ").to_string()));
        }
    };

    let value = match cli.command {
        Command::Info { host_api } => {
            let host_api = host_api
                .map(|raw| raw.parse::<PluginApiVersion>())
                .transpose()?;
            info_json(host_api)?
        }
        Command::Lifecycle { cycles } => {
            run_lifecycle(cycles)?;
            json!({ "cycles": cycles })
        }
    };
    emit_json(&value)
}

fn info_json(host_api: Option<PluginApiVersion>) -> Result<Value, Error> {
    let name = unsafe { CStr::from_ptr(dnf5_plugin_get_name()) }
        .to_str()
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("plugin name is not valid UTF-8")
                .with_source(err)
        })?;
    let api_version = dnf5_plugin_get_api_version();
    let mut value = json!({
        "name": name,
        "version": dnf5_plugin_get_version(),
        "api_version": api_version,
        "revision": Revision::active(),
    });
    if let Some(host) = host_api {
        value["compatible"] = json!(api_version.is_compatible_with(host));
    }
    Ok(value)
}

fn run_lifecycle(cycles: u32) -> Result<(), Error> {
    let mut context = StandInContext { _token: 0 };
    let context_ptr = (&mut context as *mut StandInContext).cast::<dnf5_context>();
    for cycle in 1..=cycles {
        let instance = dnf5_plugin_new_instance(STAND_IN_APP_VERSION, context_ptr);
        if instance.is_null() {
            return Err(Error::new(ErrorKind::Instantiation)
                .with_message(format!("plugin factory returned null on cycle {cycle}")));
        }
        let vtable = unsafe { (*instance).vtable };
        (vtable.init)(instance);
        (vtable.finish)(instance);
        dnf5_plugin_delete_instance(instance);
    }
    Ok(())
}

fn emit_json(value: &Value) -> Result<(), Error> {
    use std::io::Write;
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode output")
            .with_source(err)
    })?;
    writeln!(stdout).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to write output")
            .with_source(err)
    })
}

fn error_json(err: &Error) -> Value {
    let mut inner = serde_json::Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(err.message().unwrap_or("")));
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(line) = err.line() {
        inner.insert("line".to_string(), json!(line));
    }
    json!({ "error": Value::Object(inner) })
}

fn emit_error(err: &Error) {
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}
