//! Installer entry point.
//!
//! A built installer starts here: the stub locates the container appended
//! to its own executable and runs the installation. Switches follow the
//! NSIS convention (`/S`, `/D=dir`), which is why argument parsing is done
//! by hand instead of a derive-based parser.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use inspa_stub::progress::{InstallPhase, ProgressEvent, ProgressSink};
use inspa_stub::{InstallRequest, Installer, RuntimeError};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default, PartialEq)]
struct StubArgs {
    silent: bool,
    target: Option<PathBuf>,
    log_level: Option<String>,
}

/// Parse NSIS-style installer switches.
fn parse_args<I: Iterator<Item = String>>(args: I) -> StubArgs {
    let mut parsed = StubArgs::default();
    let mut args = args.peekable();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "/S" | "/s" | "--silent" => parsed.silent = true,
            "--dir" | "-d" => {
                parsed.target = args.next().map(PathBuf::from);
            }
            "--log-level" => {
                parsed.log_level = args.next();
            }
            other => {
                if let Some(dir) = other.strip_prefix("/D=") {
                    parsed.target = Some(PathBuf::from(dir));
                }
            }
        }
    }
    parsed
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(format!("inspa_stub={level},inspa_pack={level}")),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("inspa_stub=warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let args = parse_args(env::args().skip(1));
    init_logging(args.log_level.as_deref());

    let exe_path = match env::current_exe() {
        Ok(path) => path,
        Err(e) => {
            eprintln!("error: failed to get executable path: {e}");
            return ExitCode::from(3);
        }
    };

    let installer = match Installer::open(&exe_path) {
        Ok(installer) => installer,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("This executable does not look like a valid installer.");
            return ExitCode::from(e.exit_code());
        }
    };

    let request = InstallRequest {
        silent: args.silent,
        target_override: args.target,
    };

    let result = if args.silent {
        installer.run(&request, &mut ProgressSink::disabled())
    } else {
        run_with_console_progress(installer, request)
    };

    match result {
        Ok(summary) => {
            if !args.silent {
                println!("Installed into {}", summary.install_dir.display());
                if let Some(log) = &summary.log_path {
                    println!("Log: {}", log.display());
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

/// Console front-end: the worker installs, this thread drains the progress
/// queue. A GUI replaces only this function, never the worker.
fn run_with_console_progress(
    installer: Installer,
    request: InstallRequest,
) -> Result<inspa_stub::InstallSummary, RuntimeError> {
    let (mut sink, rx) = ProgressSink::channel();

    let product = installer.header().product.name.clone();
    let version = installer.header().product.version.clone();
    println!("{product} {version} Setup");

    let worker = thread::spawn(move || {
        let result = installer.run(&request, &mut sink);
        if let Err(e) = &result {
            sink.send(ProgressEvent::Failed {
                message: e.to_string(),
            });
        }
        result
    });

    let mut last_percent = u64::MAX;
    for event in rx {
        match event {
            ProgressEvent::PhaseChanged { phase } => {
                if phase != InstallPhase::Done {
                    println!("> {phase}...");
                }
            }
            ProgressEvent::BytesProgressed {
                bytes_done,
                bytes_total,
                ..
            } => {
                if bytes_total > 0 {
                    let percent = bytes_done * 100 / bytes_total;
                    if percent / 10 != last_percent {
                        last_percent = percent / 10;
                        println!("  {percent}%");
                    }
                }
            }
            ProgressEvent::LogLine { line } => println!("  | {line}"),
            ProgressEvent::Completed => println!("Done."),
            ProgressEvent::Failed { message } => eprintln!("Failed: {message}"),
            _ => {}
        }
    }

    worker.join().unwrap_or(Err(RuntimeError::Cancelled))
}
