use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::api::execute;
use crate::command::cli;
use crate::error::Error;
use crate::planner::{parse_cli_args, EntryPoint};
use crate::process::NpmRunner;


pub async fn run(entry: EntryPoint) -> ExitCode {
    let mut command = cli(entry);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("-h" | "--help") => {
            let _ = command.print_help();
            return ExitCode::SUCCESS;
        }
        Some("-v" | "--version") => {
            println!("v{}", env!("CARGO_PKG_VERSION"));
            return ExitCode::SUCCESS;
        }
        _ => {}
    }

    init_tracing();

    let parsed = match parse_cli_args(&args, entry) {
        Ok(parsed) => parsed,
        Err(err) => return report(&err, false),
    };
    let silent = parsed.options.silent;

    tokio::spawn(cancel_on_signal(parsed.options.cancel.clone()));

    let runner = NpmRunner::new(&parsed.options);
    match execute(&parsed.groups, &parsed.options, &runner).await {
        Ok(results) => {
            tracing::debug!(tasks = results.len(), "Run completed");
            ExitCode::SUCCESS
        }
        Err(err) => report(&err, silent),
    }
}


fn report(err: &Error, silent: bool) -> ExitCode {
    if !silent {
        eprintln!("ERROR: {err}");
    }
    ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(1))
}


fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "runall=warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}


/// Trips `cancel` on the first SIGINT or SIGTERM.
async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Received shutdown signal, stopping tasks");
    cancel.cancel();
}


#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use nix::sys::signal::{raise, Signal};
    use std::time::Duration;
    use tokio::signal::unix::{signal, SignalKind};

    #[tokio::test]
    async fn sigterm_trips_the_cancel_token() {
        // Installs the handler so the raise below cannot kill the test binary.
        let _guard = signal(SignalKind::terminate()).unwrap();

        let cancel = CancellationToken::new();
        tokio::spawn(cancel_on_signal(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!cancel.is_cancelled());

        raise(Signal::SIGTERM).unwrap();
        tokio::time::timeout(Duration::from_secs(1), cancel.cancelled())
            .await
            .unwrap();
    }
}
