use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use clinical_capture::api::{FormBackend, FormsApi, SupabaseStore};
use clinical_capture::config::Config;
use clinical_capture::flow::{CaseContext, Direction, FormFlow};
use clinical_capture::logging;
use clinical_capture::rest;
use clinical_capture::store::{Answers, LocalStore, PendingForm};
use clinical_capture::submission::{SubmissionQueue, SubmissionReport};

#[derive(Parser)]
#[command(name = "capture")]
#[command(about = "Offline form capture for clinical screening")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the effective configuration to .capture/config.toml
    Init {
        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
    },

    /// List cached forms
    Pending {
        /// Only forms of this case
        #[arg(long)]
        case: Option<String>,

        /// Only forms not yet submitted
        #[arg(short, long)]
        unsynced: bool,
    },

    /// Save answers for a form
    Save {
        #[arg(long)]
        case: String,

        /// Template title (e.g., "Medical History")
        #[arg(short, long)]
        template: String,

        /// Answers as a JSON object
        #[arg(short, long)]
        answers: String,

        #[arg(long)]
        volunteer: Option<String>,

        #[arg(long)]
        study: Option<String>,

        /// Print the route of the next form after saving
        #[arg(long, conflicts_with = "previous", requires = "project")]
        next: bool,

        /// Print the route of the previous form after saving
        #[arg(long, requires = "project")]
        previous: bool,

        /// Project id used in routes
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Show the cached answers for a form
    Show {
        #[arg(long)]
        case: String,

        #[arg(short, long)]
        template: String,
    },

    /// Manage the form session of a case
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Resolve previous/next navigation for a location
    Step {
        /// Current location, e.g. /employee/project/p1/dashboard/screening/ecg?case=c-1
        location: String,
    },

    /// Submit the cached forms of a case
    Submit {
        #[arg(long)]
        case: Option<String>,

        #[arg(long)]
        volunteer: Option<String>,

        #[arg(long)]
        study: Option<String>,

        /// Read the identifiers from a location's query string instead
        #[arg(long, conflicts_with_all = ["case", "volunteer", "study"])]
        location: Option<String>,

        /// Send the case's completed session in one request and clear it locally
        #[arg(long, requires = "case", conflicts_with_all = ["volunteer", "study", "location"])]
        session: bool,
    },

    /// Ask the API whether a case was already submitted
    Status {
        #[arg(long)]
        case: String,
    },

    /// Submit every unsynced form in the store
    Sync,

    /// Check connectivity to the configured backends
    Ping,

    /// Start the local REST API server
    Api {
        /// Port to listen on (default: 7010)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Show session progress
    Show {
        #[arg(long)]
        case: String,
    },

    /// Start (or restart) a session
    Start {
        #[arg(long)]
        case: String,

        #[arg(long)]
        volunteer: String,

        #[arg(long)]
        study: String,
    },

    /// Mark a form complete
    Complete {
        #[arg(long)]
        case: String,

        #[arg(short, long)]
        template: String,

        /// Answers as a JSON object
        #[arg(short, long, default_value = "{}")]
        answers: String,
    },

    /// Move the session to a step index
    Goto {
        #[arg(long)]
        case: String,

        step: usize,
    },

    /// Move to the following form
    Next {
        #[arg(long)]
        case: String,
    },

    /// Move to the preceding form
    Previous {
        #[arg(long)]
        case: String,
    },

    /// Jump to a form by title
    GotoForm {
        #[arg(long)]
        case: String,

        #[arg(short, long)]
        template: String,
    },

    /// Remove the session, its pages and its cached forms
    Clear {
        #[arg(long)]
        case: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (needed for logging setup)
    let config = Config::load(cli.config.as_deref())?;

    let is_server_mode = matches!(cli.command, Commands::Api { .. });
    let logging_handle = logging::init_logging(&config, is_server_mode, cli.debug)?;

    match cli.command {
        Commands::Init { force } => {
            cmd_init(&config, force)?;
        }
        Commands::Pending { case, unsynced } => {
            cmd_pending(&config, case, unsynced)?;
        }
        Commands::Save {
            case,
            template,
            answers,
            volunteer,
            study,
            next,
            previous,
            project,
        } => {
            let direction = match (next, previous) {
                (true, _) => Some(Direction::Next),
                (_, true) => Some(Direction::Previous),
                _ => None,
            };
            let context = CaseContext {
                case_id: Some(case),
                volunteer_id: volunteer,
                study_number: study,
            };
            cmd_save(&config, context, &template, &answers, direction, project)?;
        }
        Commands::Show { case, template } => {
            cmd_show(&config, &case, &template)?;
        }
        Commands::Session { action } => {
            cmd_session(&config, action)?;
        }
        Commands::Step { location } => {
            cmd_step(&config, &location);
        }
        Commands::Submit {
            case,
            volunteer,
            study,
            location,
            session,
        } => {
            if session {
                let case = case.context("--session needs --case")?;
                cmd_submit_session(&config, &case).await?;
                return Ok(());
            }
            let context = match location {
                Some(location) => CaseContext::from_query(location.split_once('?').map_or("", |(_, q)| q)),
                None => CaseContext {
                    case_id: case,
                    volunteer_id: volunteer,
                    study_number: study,
                },
            };
            cmd_submit(&config, &context).await?;
        }
        Commands::Status { case } => {
            cmd_status(&config, &case).await?;
        }
        Commands::Sync => {
            cmd_sync(&config).await?;
        }
        Commands::Ping => {
            cmd_ping(&config).await?;
        }
        Commands::Api { port } => {
            cmd_api(config, port).await?;
            if let Some(log_path) = logging_handle.log_file_path {
                logging::report_log_file(&log_path);
            }
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<LocalStore> {
    let path = config.store_path();
    LocalStore::open(&path).with_context(|| format!("Failed to open store at {}", path.display()))
}

fn parse_answers(raw: &str) -> Result<Answers> {
    match serde_json::from_str(raw).context("Answers must be valid JSON")? {
        serde_json::Value::Object(map) => Ok(map),
        _ => bail!("Answers must be a JSON object"),
    }
}

fn print_form_row(form: &PendingForm) {
    println!(
        "{:>4}  {:<8} {:<24} {:<12} {:<12} {}",
        form.id,
        if form.synced { "synced" } else { "pending" },
        form.template_id,
        form.case_id,
        form.volunteer_id.as_deref().unwrap_or("-"),
        form.last_modified.format("%Y-%m-%d %H:%M"),
    );
}

fn print_report(report: &SubmissionReport) {
    for item in &report.items {
        match &item.backend {
            Some(backend) => println!("  ✓ {} → {}", item.template_id, backend),
            None => {
                println!("  ✗ {}", item.template_id);
                for error in &item.errors {
                    println!("      {}", error);
                }
            }
        }
    }
    if report.skipped > 0 {
        println!("  ({} already submitted)", report.skipped);
    }
    println!("{}", report.message());
}

fn cmd_init(config: &Config, force: bool) -> Result<()> {
    let path = Config::project_config_path();
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    config.save()?;
    std::fs::create_dir_all(config.state_path())
        .with_context(|| format!("Failed to create {}", config.state_path().display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn cmd_pending(config: &Config, case: Option<String>, unsynced: bool) -> Result<()> {
    let store = open_store(config)?;
    let forms: Vec<PendingForm> = match &case {
        Some(case_id) => store.pending_forms_for_case(case_id, None),
        None => store.all_pending_forms(),
    }
    .into_iter()
    .filter(|f| !unsynced || !f.synced)
    .collect();

    if forms.is_empty() {
        println!("No cached forms");
        return Ok(());
    }

    println!("Cached forms ({})", forms.len());
    println!("{}", "─".repeat(80));
    for form in &forms {
        print_form_row(form);
    }
    Ok(())
}

fn cmd_save(
    config: &Config,
    context: CaseContext,
    template: &str,
    raw_answers: &str,
    direction: Option<Direction>,
    project: Option<String>,
) -> Result<()> {
    let answers = parse_answers(raw_answers)?;
    let mut store = open_store(config)?;

    match (direction, project) {
        (Some(direction), Some(project)) => {
            let flow = FormFlow::from_config(&config.flow);
            let (form, route) =
                flow.save_and_navigate(&mut store, &project, &context, template, answers, direction)?;
            println!("Saved {} (#{})", form.template_id, form.id);
            match route {
                Some(route) => println!("{}", route),
                None => println!("No form in that direction"),
            }
        }
        _ => {
            let case_id = context.require_case()?;
            let form = store.save_answers(
                template,
                case_id,
                answers,
                context.volunteer_id.clone(),
                context.study_number.clone(),
            )?;
            println!("Saved {} (#{})", form.template_id, form.id);
        }
    }
    Ok(())
}

fn cmd_show(config: &Config, case: &str, template: &str) -> Result<()> {
    let store = open_store(config)?;
    match store.load_answers(template, case) {
        Some(answers) => println!("{}", serde_json::to_string_pretty(answers)?),
        None => println!("No answers saved for '{}' in case '{}'", template, case),
    }
    Ok(())
}

fn cmd_session(config: &Config, action: SessionAction) -> Result<()> {
    let mut store = open_store(config)?;

    let session = match action {
        SessionAction::Show { case } => match store.session(&case) {
            Some(session) => session.clone(),
            None => {
                println!("No session for case '{}'", case);
                return Ok(());
            }
        },
        SessionAction::Start {
            case,
            volunteer,
            study,
        } => store.start_session(&case, &volunteer, &study, config.flow.form_sequence.clone())?,
        SessionAction::Complete {
            case,
            template,
            answers,
        } => store.complete_form(&case, &template, parse_answers(&answers)?)?,
        SessionAction::Goto { case, step } => store.set_current_step(&case, step)?,
        SessionAction::Next { case } => match store.go_to_next(&case)? {
            Some(session) => session,
            None => {
                println!("Already on the last form");
                return Ok(());
            }
        },
        SessionAction::Previous { case } => match store.go_to_previous(&case)? {
            Some(session) => session,
            None => {
                println!("Already on the first form");
                return Ok(());
            }
        },
        SessionAction::GotoForm { case, template } => store.go_to_form(&case, &template)?,
        SessionAction::Clear { case } => {
            let summary = store.clear_session(&case)?;
            println!(
                "Cleared case '{}': {} session, {} pages, {} cached forms",
                case, summary.sessions, summary.pages, summary.pending_forms
            );
            return Ok(());
        }
    };

    let nav = &session.navigation_state;
    println!(
        "Case {} (volunteer {}, study {})",
        session.case_id, session.volunteer_id, session.study_number
    );
    println!("{}", "─".repeat(60));
    for (i, template) in nav.form_sequence.iter().enumerate() {
        let mark = if session.completed_forms.contains(template) {
            "✓"
        } else if i == nav.current_step {
            "▶"
        } else {
            " "
        };
        println!("  {} {}", mark, template);
    }
    println!(
        "{}/{} forms completed",
        session.completed_forms.len(),
        nav.total_steps
    );
    for (template, errors) in &session.validation_errors {
        println!("  ! {}: {}", template, errors.join("; "));
    }
    Ok(())
}

fn cmd_step(config: &Config, location: &str) {
    let stepper = FormFlow::from_config(&config.flow).stepper();
    let position = stepper.locate(location);

    if position.index.is_none() {
        println!("Location does not match any form");
        return;
    }

    println!("{}", stepper.format_progress(&position));
    println!("{}% complete", stepper.percentage_complete(&position));
    if let Some(previous) = &position.previous_path {
        println!("previous: {}", previous);
    }
    match &position.next_path {
        Some(next) => println!("next:     {}", next),
        None => println!("last form"),
    }
}

async fn cmd_submit(config: &Config, context: &CaseContext) -> Result<()> {
    let queue = SubmissionQueue::from_config(config)?;
    let mut store = open_store(config)?;

    let report = queue.submit_case(&mut store, context).await?;
    print_report(&report);
    Ok(())
}

async fn cmd_submit_session(config: &Config, case: &str) -> Result<()> {
    let queue = SubmissionQueue::from_config(config)?;
    let mut store = open_store(config)?;

    let receipt = queue.submit_session(&mut store, case).await?;
    if receipt.success {
        println!(
            "Session submitted{}",
            receipt
                .submission_id
                .map(|id| format!(" ({})", id))
                .unwrap_or_default()
        );
        println!("Local records for case '{}' cleared", case);
    } else {
        println!("Submission refused: {}", receipt.message);
        for (field, errors) in receipt.errors.unwrap_or_default() {
            println!("  ! {}: {}", field, errors.join("; "));
        }
        println!("Local records kept for another attempt");
    }
    Ok(())
}

async fn cmd_status(config: &Config, case: &str) -> Result<()> {
    let queue = SubmissionQueue::from_config(config)?;
    let status = queue.submission_status(case).await?;

    if !status.submitted {
        println!("Case '{}' has not been submitted", case);
        return Ok(());
    }
    println!("Case '{}' submitted", case);
    if let Some(id) = &status.submission_id {
        println!("  id:     {}", id);
    }
    if let Some(at) = &status.submitted_at {
        println!("  at:     {}", at);
    }
    if let Some(state) = &status.status {
        println!("  status: {}", state);
    }
    Ok(())
}

async fn cmd_sync(config: &Config) -> Result<()> {
    let queue = SubmissionQueue::from_config(config)?;
    let mut store = open_store(config)?;

    let report = queue.sync_pending(&mut store).await;
    print_report(&report);
    Ok(())
}

async fn cmd_ping(config: &Config) -> Result<()> {
    let mut backends: Vec<Box<dyn FormBackend>> = vec![Box::new(FormsApi::from_config(config)?)];
    if let Some(store) = SupabaseStore::from_config(config)? {
        backends.push(Box::new(store));
    }

    for backend in &backends {
        if !backend.is_configured() {
            println!("  - {} not configured", backend.name());
            continue;
        }
        match backend.test_connection().await {
            Ok(true) => println!("  ✓ {}", backend.name()),
            Ok(false) => println!("  ✗ {} unreachable", backend.name()),
            Err(e) if e.is_auth_error() => {
                println!("  ✗ {}", e);
                println!("      check the credentials configured for {}", e.provider_name());
            }
            Err(e) => println!("  ✗ {}", e),
        }
    }
    Ok(())
}

async fn cmd_api(config: Config, port: Option<u16>) -> Result<()> {
    let port = port.unwrap_or(config.rest_api.port);

    println!("Starting REST API server...");
    println!("  Port: {}", port);
    println!("  Endpoints:");
    println!("    GET    /api/v1/health                            Health check");
    println!("    GET    /api/v1/status                            Store status");
    println!("    GET    /api/v1/pending                           Cached forms");
    println!("    GET    /api/v1/cases/:case_id/forms/:template    Load answers");
    println!("    PUT    /api/v1/cases/:case_id/forms/:template    Save answers");
    println!("    *      /api/v1/cases/:case_id/session            Session");
    println!("    POST   /api/v1/cases/:case_id/session/navigate   Move session");
    println!("    POST   /api/v1/cases/:case_id/session/submit     Submit session");
    println!("    POST   /api/v1/cases/:case_id/submit             Submit case");
    println!("    GET    /api/v1/cases/:case_id/submission-status  Remote status");
    println!("    POST   /api/v1/sync                              Sync all");
    println!("    POST   /api/v1/stepper/resolve                   Stepper");
    println!();

    let state = rest::ApiState::from_config(config)?;
    rest::serve(state, port).await?;

    Ok(())
}
