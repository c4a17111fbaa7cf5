//! mutfactor: validate and submit MUT emission factor drafts.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mutfactor::api::{self, FactorApi};
use mutfactor::config::{Config, LogFormat, LoggingConfig};
use mutfactor::editor::{ConsoleNotifier, EditorSession, SubmissionController, SubmissionOutcome};
use mutfactor::error::DraftError;
use mutfactor::model::FactorForm;

#[derive(Parser)]
#[command(name = "mutfactor")]
#[command(about = "Edit MUT emission factors across reporting scopes", version)]
struct Cli {
    /// TOML settings file
    #[arg(short, long, env = "MUT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a draft and run the duplicate precheck without writing
    Check {
        /// Draft file (JSON form)
        draft: PathBuf,

        /// Id of the record being edited (needs the remote backend)
        #[arg(long, conflicts_with = "offline")]
        edit: Option<i64>,

        /// Use the in-memory backend
        #[arg(long)]
        offline: bool,
    },
    /// Validate, confirm and write a draft
    Submit {
        /// Draft file (JSON form)
        draft: PathBuf,

        /// Id of the record being edited (needs the remote backend)
        #[arg(long, conflicts_with = "offline")]
        edit: Option<i64>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,

        /// Use the in-memory backend
        #[arg(long)]
        offline: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    init_logging(&config.logging);

    match cli.command {
        Command::Check {
            draft,
            edit,
            offline,
        } => {
            let api = api::connect_from_config(&config.api, offline)?;
            let session = open_session(api.as_ref(), &draft, edit, &config).await?;
            let mut controller = SubmissionController::new(session, config.editor);
            let outcome = controller.prepare(api.as_ref(), &ConsoleNotifier).await;
            if let SubmissionOutcome::ReadyToConfirm { summary } = &outcome {
                println!("{summary}");
                println!("No problems found.");
                return Ok(ExitCode::SUCCESS);
            }
            Ok(exit_code(&outcome))
        }
        Command::Submit {
            draft,
            edit,
            yes,
            offline,
        } => {
            let api = api::connect_from_config(&config.api, offline)?;
            let session = open_session(api.as_ref(), &draft, edit, &config).await?;
            let mut controller = SubmissionController::new(session, config.editor);
            let outcome = run_submit(&mut controller, api.as_ref(), yes).await?;
            if let Some(record) = outcome.record() {
                println!("{}", serde_json::to_string_pretty(record)?);
            }
            Ok(exit_code(&outcome))
        }
    }
}

fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn load_draft(path: &Path) -> Result<FactorForm, DraftError> {
    let raw = std::fs::read_to_string(path).map_err(|source| DraftError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|e| DraftError::Invalid {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Open a create session, or an edit session on `edit` moved to the draft's
/// scope, then apply the draft.
async fn open_session(
    api: &dyn FactorApi,
    draft_path: &Path,
    edit: Option<i64>,
    config: &Config,
) -> anyhow::Result<EditorSession> {
    let draft = load_draft(draft_path)?;
    let session = match edit {
        None => EditorSession::open_create(draft.change_type(), draft.scope),
        Some(id) => {
            let record = api
                .get(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("factor record {id} does not exist"))?;
            if record.change_type() != draft.change_type() {
                return Err(DraftError::ChangeTypeMismatch {
                    id,
                    draft: draft.change_type().label(),
                    record: record.change_type().label(),
                }
                .into());
            }
            let mut session = EditorSession::open_edit(record);
            session
                .switch_scope_with_prefetch(api, draft.scope, config.editor.search_page_size)
                .await;
            session
        }
    };
    session
        .with_form(draft)
        .map_err(|errors| anyhow::anyhow!("draft rejected: {errors}"))
}

async fn run_submit(
    controller: &mut SubmissionController,
    api: &dyn FactorApi,
    yes: bool,
) -> anyhow::Result<SubmissionOutcome> {
    let notifier = ConsoleNotifier;
    let mut outcome = controller.prepare(api, &notifier).await;
    loop {
        let question = match &outcome {
            SubmissionOutcome::ReadyToConfirm { summary } => format!("{summary} Proceed?"),
            SubmissionOutcome::AwaitingReconfirmation { .. } => {
                "Create a new record in the selected scope?".to_string()
            }
            _ => return Ok(outcome),
        };
        if !yes && !ask(&question)? {
            println!("Cancelled.");
            controller.session().close();
            return Ok(SubmissionOutcome::Discarded);
        }
        outcome = controller.confirm(api, &notifier).await;
    }
}

fn ask(question: &str) -> std::io::Result<bool> {
    print!("{question} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes" | "s" | "sim"
    ))
}

fn exit_code(outcome: &SubmissionOutcome) -> ExitCode {
    match outcome {
        SubmissionOutcome::Saved(_) | SubmissionOutcome::Recovered(_) => ExitCode::SUCCESS,
        SubmissionOutcome::Invalid(_) | SubmissionOutcome::Blocked(_) => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    }
}
