//! fixguard - attempt governance for automated test-fix loops.
//!
//! Decides per invocation whether a test run or a new test file may proceed,
//! based on what the current session has already tried.

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

mod hooks;

use crate::hooks::{HookClassifier, HookPayload};
use fixguard::config::GuardConfig;
use fixguard::context::DirectoryContextSource;
use fixguard::emit::{DecisionEmitter, OutputFormat};
use fixguard::gate::{ActionKind, ActionRequest, GateEvaluator};
use fixguard::session::{Acknowledgement, FileSessionStore, SessionKey, SessionStore};
use fixguard::GuardError;

#[derive(Parser)]
#[command(name = "fixguard")]
#[command(version)]
#[command(about = "Attempt governance for automated test-fix loops", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Diagnostic output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Session state directory (relative paths are anchored at the project)
    #[arg(long, global = true, env = "FIXGUARD_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Directory holding per-feature context material
    #[arg(long, global = true, env = "FIXGUARD_CONTEXT_DIR")]
    context_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Identifies one (session, feature) record.
#[derive(Args)]
struct KeyArgs {
    /// Feature the action concerns
    #[arg(long)]
    feature: String,

    /// Session id (see `fixguard session new`)
    #[arg(long)]
    session: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a guarded action; exits 2 when it is blocked
    Check {
        /// Action being attempted
        #[arg(value_enum)]
        action: ActionKind,

        #[command(flatten)]
        key: KeyArgs,

        /// External research into the repeated failure was done
        #[arg(long)]
        external_research_done: bool,

        /// A deep analysis of all attempts so far was done
        #[arg(long)]
        deep_analysis_ack: bool,

        /// The feature's test was marked skipped/known-failing
        #[arg(long)]
        mark_skipped: bool,
    },

    /// Record a classified test failure
    RecordFailure {
        #[command(flatten)]
        key: KeyArgs,

        /// Failure category reported by the classifier
        #[arg(long)]
        category: String,
    },

    /// Record an acknowledgement for the current attempt
    Ack {
        #[arg(value_enum)]
        kind: Acknowledgement,

        #[command(flatten)]
        key: KeyArgs,
    },

    /// Inspect or tear down session state
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Evaluate a PreToolUse hook payload read from stdin
    Hook {
        /// Session id to use when the payload carries none
        #[arg(long)]
        session: Option<String>,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Print the record for one feature as JSON
    Show {
        #[command(flatten)]
        key: KeyArgs,
    },

    /// List features recorded in a session
    List {
        #[arg(long)]
        session: String,
    },

    /// Remove every record of a session
    Clear {
        #[arg(long)]
        session: String,
    },

    /// Print a fresh session id
    New,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show configuration and state paths
    Paths,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Usage errors must not collide with the BLOCK exit code.
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let filter = if cli.verbose {
        "fixguard=debug"
    } else {
        "fixguard=warn"
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);
    match cli.format {
        OutputFormat::Json => subscriber.json().init(),
        OutputFormat::Text => subscriber.init(),
    }

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            let code = e
                .downcast_ref::<GuardError>()
                .map_or(1, GuardError::exit_code);
            std::process::exit(code);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let project_path = cli.project.canonicalize().unwrap_or(cli.project.clone());

    if !project_path.exists() {
        anyhow::bail!(
            "Project directory does not exist: {}",
            project_path.display()
        );
    }

    let mut config = GuardConfig::load(&project_path)?;
    if let Some(dir) = cli.state_dir {
        config.state_dir = Some(dir);
    }
    if let Some(dir) = cli.context_dir {
        config.context_dir = Some(dir);
    }
    debug!(project = %project_path.display(), "configuration loaded");

    let emitter = DecisionEmitter::new(cli.format);

    match cli.command {
        Commands::Check {
            action,
            key,
            external_research_done,
            deep_analysis_ack,
            mark_skipped,
        } => {
            let request = ActionRequest::new(action, key.session, key.feature)?
                .with_external_research(external_research_done)
                .with_deep_analysis_ack(deep_analysis_ack)
                .with_mark_skipped(mark_skipped);

            let decision = evaluator(&project_path, &config).evaluate(&request);
            Ok(emitter.emit(&decision, &mut io::stderr())?)
        }

        Commands::RecordFailure { key, category } => {
            let session = evaluator(&project_path, &config).record_failure(
                &key.session,
                &key.feature,
                &category,
            )?;

            match cli.format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({
                        "sessionId": session.metadata.session_id,
                        "feature": session.metadata.feature,
                        "attemptCount": session.attempt_count(),
                        "maxAttempts": session.max_attempts(),
                        "remainingAttempts": session.remaining_attempts(),
                    })
                ),
                OutputFormat::Text => println!(
                    "{} attempt {} of {} for '{}' ({} remaining)",
                    "Recorded:".green().bold(),
                    session.attempt_count(),
                    session.max_attempts(),
                    session.metadata.feature,
                    session.remaining_attempts()
                ),
            }
            Ok(0)
        }

        Commands::Ack { kind, key } => {
            let session =
                evaluator(&project_path, &config).acknowledge(&key.session, &key.feature, kind)?;
            println!(
                "{} {} for '{}' at attempt {}",
                "Acknowledged:".green().bold(),
                kind,
                session.metadata.feature,
                session.attempt_count()
            );
            Ok(0)
        }

        Commands::Session { action } => {
            let store = store(&project_path, &config);

            match action {
                SessionAction::Show { key } => {
                    let key = SessionKey::new(key.session, key.feature)?;
                    match store.peek(&key)? {
                        Some(session) => {
                            println!("{}", serde_json::to_string_pretty(&session)?);
                            Ok(0)
                        }
                        None => {
                            eprintln!("{} no record for {}", "Info:".blue(), key);
                            Ok(1)
                        }
                    }
                }

                SessionAction::List { session } => {
                    let features = store.features(&session)?;
                    match cli.format {
                        OutputFormat::Json => println!("{}", serde_json::to_string(&features)?),
                        OutputFormat::Text => {
                            for feature in &features {
                                println!("{feature}");
                            }
                        }
                    }
                    Ok(0)
                }

                SessionAction::Clear { session } => {
                    let removed = store.clear(&session)?;
                    println!(
                        "{} removed {} record(s) for session {}",
                        "OK".green().bold(),
                        removed,
                        session
                    );
                    Ok(0)
                }

                SessionAction::New => {
                    println!("{}", uuid::Uuid::new_v4());
                    Ok(0)
                }
            }
        }

        Commands::Hook { session } => {
            let mut input = String::new();
            io::stdin().read_to_string(&mut input)?;

            let payload = match HookPayload::parse(&input) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("ignoring hook payload: {e:#}");
                    return Ok(0);
                }
            };

            let classifier = HookClassifier::from_config(&config)?;
            let Some(request) = classifier.classify(&payload, &project_path, session.as_deref())
            else {
                debug!("hook payload is not a guarded action");
                return Ok(0);
            };

            debug!(action = %request.action, key = %request.key, "hook payload classified");
            let decision = evaluator(&project_path, &config).evaluate(&request);
            Ok(emitter.emit(&decision, &mut io::stderr())?)
        }

        Commands::Config { action } => {
            match action {
                ConfigAction::Show { json } => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&config)?);
                    } else {
                        println!("\n{} Guard Configuration", "Config:".cyan().bold());
                        println!("{}", "─".repeat(40));
                        println!("   Max attempts: {}", config.max_attempts);
                        println!(
                            "   Deep-analysis threshold: {}",
                            config.deep_analysis_threshold
                        );
                        println!(
                            "   Repeated-category threshold: {}",
                            config.repeated_category_threshold
                        );
                        println!(
                            "   Default feature: {}",
                            config.default_feature.as_deref().unwrap_or("(none)")
                        );
                        println!("   Test commands: {}", config.hook.test_commands.len());
                        println!("   Test file globs: {}", config.hook.test_file_globs.len());
                    }
                }

                ConfigAction::Paths => {
                    println!("\n{} Configuration Paths", "Config:".cyan().bold());
                    println!("{}", "─".repeat(40));
                    println!(
                        "   Config: {}",
                        GuardConfig::config_path(&project_path).display()
                    );
                    println!(
                        "   State: {}",
                        config.state_dir(&project_path).display()
                    );
                    println!(
                        "   Context: {}",
                        config.context_dir(&project_path).display()
                    );
                }
            }
            Ok(0)
        }
    }
}

fn store(project: &Path, config: &GuardConfig) -> FileSessionStore {
    FileSessionStore::new(config.state_dir(project), config.max_attempts)
}

fn evaluator(
    project: &Path,
    config: &GuardConfig,
) -> GateEvaluator<FileSessionStore, DirectoryContextSource> {
    GateEvaluator::standard(
        store(project, config),
        DirectoryContextSource::new(config.context_dir(project)),
        config,
    )
}
