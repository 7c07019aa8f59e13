use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing::{error, info, warn};

use replisync::cli::Args;
use replisync::logging;
use replisync::sync::{CancelFlag, Supervisor};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Args::parse().validate()?;
    logging::init(&settings.log_path)?;

    info!("*** new synchronization process ***");

    let cancel = CancelFlag::new();
    let reader_flag = cancel.clone();
    tokio::task::spawn_blocking(move || read_stop_commands(reader_flag));

    let supervisor = Supervisor::new(
        &settings.source_root,
        &settings.replica_root,
        &settings.log_path,
        settings.interval,
        cancel,
    );

    tokio::select! {
        result = supervisor.run() => {
            if let Err(e) = result {
                error!("synchronization stopped: {}", e);
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\n{}: forced termination of synchronization (Ctrl+C).", "Warning".red());
            warn!("synchronization interrupted by Ctrl+C");
        }
    }

    Ok(())
}

/// Block on operator input until the exact stop token arrives.
fn read_stop_commands(cancel: CancelFlag) {
    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        println!("Write '{}' to terminate synchronization:", "stop".green());
        line.clear();
        match stdin.read_line(&mut line) {
            // stdin closed (piped input, detached terminal): leave the flag
            // to Ctrl+C or a fatal condition.
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }

        if line.trim().eq_ignore_ascii_case("stop") {
            cancel.cancel();
            println!(
                "{}",
                "*** Synchronization terminated ***\nStopping and exiting program...".green()
            );
            return;
        }
        println!("{}", "Invalid input: only 'stop' is accepted.".red());
    }
}
