use std::{process::ExitCode, sync::Arc, time::Duration};

use anyhow::Context;
use ssh_manager::{
    logging, wait_for_signal, App, ExecLauncher, Exit, InputReader, PingProber, Registry,
    SettingsStore, Terminal,
};
use tracing::{error, info};

fn main() -> ExitCode {
    logging::init();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to start the async runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run());
    runtime.shutdown_timeout(Duration::from_millis(200));

    match result {
        Ok(exit) => ExitCode::from(exit.code()),
        Err(e) => {
            error!(error = ?e, "fatal error");
            eprintln!("ssh_manager: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<Exit> {
    let path = SettingsStore::default_path()?;
    let store = SettingsStore::open(&path).await;
    let prober = Arc::new(PingProber::new(store.probe_timeout()));
    let input = InputReader::stdin().context("failed to start the input reader")?;

    let mut app = App::new(
        Registry::builtin(),
        store,
        prober,
        ExecLauncher,
        input,
        Terminal::stdout(),
    );

    let exit = tokio::select! {
        result = app.run() => result?,
        signal = wait_for_signal() => {
            let signal = signal.context("failed to listen for signals")?;
            info!(%signal, "shutting down");
            Exit::Interrupted(signal)
        }
    };

    app.shutdown().await;
    Ok(exit)
}
