use clap::Parser;
use miette::{IntoDiagnostic, Result};
use parking_lot::Mutex;
use status_poller::application::poller::{AsyncStatusPoller, PollOptions};
use status_poller::domain::classifiers::StatusProfile;
use status_poller::domain::config::{ErrorPolicy, PollConfig};
use status_poller::domain::session::{PollState, ResourceKey};
use status_poller::infrastructure::json_file::JsonFileStatusSource;
use status_poller::interfaces::csv::transition_writer::{TransitionRecord, TransitionWriter};
use status_poller::logging::{LoggingMode, init_logging};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding one `<resource-key>.json` status document per resource
    root: PathBuf,

    /// Resource to poll (order code, account id, session id)
    resource_key: String,

    /// Status vocabulary and default timing
    #[arg(long, default_value_t = StatusProfile::Payment)]
    profile: StatusProfile,

    /// JSON field holding the status string
    #[arg(long, default_value = "status")]
    field: String,

    /// JSON poll configuration; fields it sets override the profile defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Delay between checks in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Maximum number of checks before timing out
    #[arg(long)]
    max_attempts: Option<u32>,

    /// What to do when a check fails: retry, ignore or stop
    #[arg(long)]
    on_error: Option<ErrorPolicy>,

    /// Log to stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn poll_config(&self) -> Result<PollConfig> {
        let mut config = self.profile.config();
        if let Some(path) = &self.config {
            let json = std::fs::read_to_string(path).into_diagnostic()?;
            config = config.merge_json(&json).into_diagnostic()?;
        }
        if let Some(interval_ms) = self.interval_ms {
            config.interval_ms = interval_ms;
        }
        if let Some(max_attempts) = self.max_attempts {
            config.max_attempts = max_attempts;
        }
        if let Some(policy) = self.on_error {
            config.error_policy = policy;
        }
        config.validate().into_diagnostic()?;
        Ok(config)
    }
}

fn exit_code(state: PollState) -> ExitCode {
    match state {
        PollState::Succeeded => ExitCode::SUCCESS,
        PollState::Failed => ExitCode::from(2),
        PollState::TimedOut => ExitCode::from(3),
        PollState::Cancelled => ExitCode::from(4),
        PollState::Idle | PollState::Running => ExitCode::FAILURE,
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(LoggingMode::from_verbosity(cli.verbose)).into_diagnostic()?;

    let config = cli.poll_config()?;
    let key = ResourceKey::new(cli.resource_key.clone()).into_diagnostic()?;

    let writer = Arc::new(Mutex::new(TransitionWriter::new(io::stdout())));
    let field = cli.field.clone();
    let options = PollOptions::new(
        JsonFileStatusSource::new(&cli.root),
        cli.profile.classifier(cli.field.clone()),
        config,
    )
    .into_diagnostic()?
    .on_transition(move |session| {
        let record = TransitionRecord::from_json_session(session, &field);
        if let Err(e) = writer.lock().write(&record) {
            tracing::error!(error = %e, "failed to write transition");
        }
    });

    let poller = AsyncStatusPoller::new().into_diagnostic()?;
    let handle = poller.start(key, options);

    let session = tokio::select! {
        session = handle.finished() => session,
        _ = tokio::signal::ctrl_c() => {
            handle.cancel();
            handle.snapshot()
        }
    };
    poller.shutdown().await;

    if let Some(error) = &session.last_error
        && session.state != PollState::Succeeded
    {
        eprintln!("Last check error: {}", error);
    }

    Ok(exit_code(session.state))
}
