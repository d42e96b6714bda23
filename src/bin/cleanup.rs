use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use student_progress_analytics::store::{FileSessionStore, SessionStore, StoreError};
use student_progress_analytics::telemetry;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Removes session folders that have not been touched for a while.
#[derive(Parser)]
#[command(name = "progress-cleanup")]
struct Cli {
    /// Remove session folders older than this many days
    #[arg(long, default_value_t = 7)]
    days: u64,
    /// Folder holding one sub-folder per session
    #[arg(long, default_value = "uploads")]
    folder: PathBuf,
}

#[derive(Debug, PartialEq, Eq)]
enum Cleanup {
    Removed(usize),
    NothingToClean,
    Failed,
}

impl Cleanup {
    fn exit_code(&self) -> ExitCode {
        match self {
            Cleanup::Removed(_) | Cleanup::NothingToClean => ExitCode::SUCCESS,
            Cleanup::Failed => ExitCode::FAILURE,
        }
    }
}

fn max_age(days: u64) -> Option<Duration> {
    days.checked_mul(SECONDS_PER_DAY).map(Duration::from_secs)
}

/// A folder that does not exist has nothing to clean; any other error while
/// reading it is a failure.
fn classify(result: Result<usize, StoreError>) -> Result<Cleanup, StoreError> {
    match result {
        Ok(removed) => Ok(Cleanup::Removed(removed)),
        Err(StoreError::Io(err)) if err.kind() == ErrorKind::NotFound => Ok(Cleanup::NothingToClean),
        Err(err) => Err(err),
    }
}

async fn run(store: &FileSessionStore, days: u64) -> Cleanup {
    let Some(max_age) = max_age(days) else {
        error!(days, "--days is too large");
        return Cleanup::Failed;
    };

    match classify(store.evict_older_than(max_age).await) {
        Ok(Cleanup::Removed(removed)) => {
            info!(removed, folder = %store.root().display(), "cleanup finished");
            println!("Removed {removed} session folders older than {days} days.");
            Cleanup::Removed(removed)
        }
        Ok(outcome) => {
            warn!(folder = %store.root().display(), "folder does not exist, nothing to clean");
            outcome
        }
        Err(err) => {
            error!(folder = %store.root().display(), error = %err, "cleanup failed");
            Cleanup::Failed
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init();
    let cli = Cli::parse();

    let store = FileSessionStore::new(&cli.folder);
    run(&store, cli.days).await.exit_code()
}
