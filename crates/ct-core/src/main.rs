//! Chronotherapy Policy Core - administration-time decision engine
//!
//! The main entry point for ct-core, handling:
//! - Closed-loop simulation over a synthetic circadian cohort
//! - Single recommendations from a checkpoint and a patient profile
//! - Checkpoint inspection
//! - Configuration validation, display, and JSON Schema output

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use ct_common::{format_error_human, Error, OutputFormat, StructuredError, SCHEMA_VERSION};
use ct_config::{load_config, LoadedConfig};
use ct_core::exit_codes::ExitCode;
use ct_core::log_event;
use ct_core::logging::{
    config::ENV_LOG_LEVEL, event_names, init_logging, LogConfig, LogContext, LogFormat, LogLevel,
    Stage,
};
use ct_core::schema::{
    available_schemas, format_schema, generate_all_schemas, generate_schema, SchemaFormat,
};
use ct_core::simulate::{run_simulation, CircadianEnvironment, SimulationConfig, SimulationReport};
use ct_core::{ContextEncoder, Decision, PatientProfile, PolicyEngine, PolicyState};

/// Chronotherapy Policy Core - safety-filtered administration-time bandit
#[derive(Parser)]
#[command(name = "ct-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to policy.json
    #[arg(long, global = true, env = "CHRONO_POLICY")]
    policy: Option<PathBuf>,

    /// Path to actions.json
    #[arg(long, global = true, env = "CHRONO_ACTIONS")]
    actions: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Log format on stderr
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the policy closed-loop against a synthetic patient cohort
    Simulate(SimulateArgs),

    /// Recommend an administration time for one patient
    Recommend(RecommendArgs),

    /// Checkpoint inspection
    State(StateArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Print version information
    Version,
}

// ============================================================================
// Command argument structs
// ============================================================================

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Number of synthetic patients
    #[arg(long, default_value_t = 1000)]
    rounds: u64,

    /// Cohort and outcome seed (the policy seed comes from policy.json)
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Treat every round as clinician opt-in (wider exploration cap)
    #[arg(long)]
    opt_in: bool,

    /// Keep one trajectory point every N resolved rounds
    #[arg(long, default_value_t = 100)]
    trajectory_stride: u64,

    /// Start from this checkpoint
    #[arg(long)]
    state_in: Option<PathBuf>,

    /// Write the final checkpoint here
    #[arg(long)]
    checkpoint_out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RecommendArgs {
    /// Patient profile JSON (see `config schema PatientProfile`)
    #[arg(long)]
    profile: PathBuf,

    /// Override the profile's drug
    #[arg(long)]
    drug: Option<String>,

    /// Clinician opted in to the wider exploration cap
    #[arg(long)]
    opt_in: bool,

    /// Checkpoint to restore before selecting
    #[arg(long)]
    state: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct StateArgs {
    #[command(subcommand)]
    command: StateCommands,
}

#[derive(Subcommand, Debug)]
enum StateCommands {
    /// Summarize a checkpoint and check it against the current configuration
    Inspect {
        /// Checkpoint path
        path: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the resolved configuration
    Show,
    /// Validate policy.json and actions.json
    Validate,
    /// Print JSON Schema for configuration and output types
    Schema {
        /// Type name (see --list)
        name: Option<String>,

        /// List available types
        #[arg(long)]
        list: bool,

        /// Print every schema
        #[arg(long)]
        all: bool,

        /// Single-line JSON
        #[arg(long)]
        compact: bool,
    },
}

// ============================================================================
// Main entry point
// ============================================================================

fn main() {
    let cli = Cli::parse();

    let env_level_set =
        std::env::var_os("RUST_LOG").is_some() || std::env::var_os(ENV_LOG_LEVEL).is_some();
    let cli_level = (cli.global.verbose > 0 || cli.global.quiet || !env_level_set)
        .then(|| LogLevel::from_verbosity(cli.global.verbose, cli.global.quiet));
    init_logging(&LogConfig::from_env(cli_level, cli.global.log_format));

    let exit_code = match &cli.command {
        Commands::Simulate(args) => run_simulate(&cli.global, args),
        Commands::Recommend(args) => run_recommend(&cli.global, args),
        Commands::State(args) => match &args.command {
            StateCommands::Inspect { path } => run_state_inspect(&cli.global, path),
        },
        Commands::Config(args) => run_config(&cli.global, args),
        Commands::Version => {
            print_version(&cli.global);
            ExitCode::Clean
        }
    };

    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// Shared helpers
// ============================================================================

fn load(global: &GlobalOpts) -> Result<LoadedConfig, Error> {
    let ctx = LogContext::for_current_run();
    match load_config(global.policy.as_deref(), global.actions.as_deref()) {
        Ok(config) => {
            log_event!(
                ctx,
                DEBUG,
                event_names::CONFIG_LOADED,
                Stage::Init,
                "configuration loaded",
                epoch = config.snapshot.epoch.as_str(),
                policy_source = config.snapshot.policy_source.as_str(),
                actions_source = config.snapshot.actions_source.as_str()
            );
            Ok(config)
        }
        Err(e) => {
            log_event!(
                ctx,
                WARN,
                event_names::CONFIG_ERROR,
                Stage::Init,
                format!("configuration failed: {}", e)
            );
            Err(e.into())
        }
    }
}

fn encoder_for(config: &LoadedConfig) -> Result<ContextEncoder, Error> {
    let encoder = ContextEncoder::new(config.actions.drug_names());
    if encoder.dimension() != config.policy.context_dimension {
        return Err(Error::InvalidPolicy(format!(
            "context_dimension is {} but {} drugs encode to {} features",
            config.policy.context_dimension,
            config.actions.drugs.len(),
            encoder.dimension()
        )));
    }
    Ok(encoder)
}

fn engine_for(config: &LoadedConfig, state: Option<&Path>) -> Result<PolicyEngine, Error> {
    let mut engine = PolicyEngine::new(config.policy.clone(), &config.actions)?;
    if let Some(path) = state {
        engine.load_policy_state(PolicyState::from_file(path)?)?;
    }
    Ok(engine)
}

fn print_json<T: serde::Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(s) => {
            println!("{}", s);
            ExitCode::Clean
        }
        Err(e) => {
            eprintln!("failed to serialize output: {}", e);
            ExitCode::InternalError
        }
    }
}

/// Report an error on stderr in the requested format.
fn output_error(global: &GlobalOpts, err: &Error) -> ExitCode {
    match global.format {
        OutputFormat::Json | OutputFormat::Jsonl => {
            eprintln!("{}", StructuredError::from(err).to_json_pretty());
        }
        OutputFormat::Summary => eprintln!("error {}: {}", err.code(), err),
        OutputFormat::Md => {
            let color = !global.no_color && std::io::stderr().is_terminal();
            eprintln!("{}", format_error_human(err, color));
        }
    }
    ExitCode::from(err)
}

// ============================================================================
// simulate
// ============================================================================

fn run_simulate(global: &GlobalOpts, args: &SimulateArgs) -> ExitCode {
    match simulate(global, args) {
        Ok((report, engine)) => output_simulation(global, &report, &engine),
        Err(e) => output_error(global, &e),
    }
}

fn simulate(global: &GlobalOpts, args: &SimulateArgs) -> Result<(SimulationReport, PolicyEngine), Error> {
    let config = load(global)?;
    let encoder = encoder_for(&config)?;
    let mut engine = engine_for(&config, args.state_in.as_deref())?;
    let env = CircadianEnvironment::new(config.actions.drug_names())?;
    let sim = SimulationConfig {
        rounds: args.rounds,
        seed: args.seed,
        clinician_opt_in: args.opt_in,
        trajectory_stride: args.trajectory_stride,
    };
    let report = run_simulation(&mut engine, &encoder, &env, &sim)?;
    if let Some(path) = &args.checkpoint_out {
        engine.get_policy_state()?.write_file(path)?;
    }
    Ok((report, engine))
}

fn output_simulation(global: &GlobalOpts, report: &SimulationReport, engine: &PolicyEngine) -> ExitCode {
    let s = &report.summary;
    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "report": report,
        })),
        OutputFormat::Jsonl => {
            for record in engine.records() {
                match serde_json::to_string(record) {
                    Ok(line) => println!("{}", line),
                    Err(e) => {
                        eprintln!("failed to serialize round record: {}", e);
                        return ExitCode::InternalError;
                    }
                }
            }
            ExitCode::Clean
        }
        OutputFormat::Summary => {
            println!(
                "{} rounds: {} decided, {} fallback, mean reward {:.4}, regret {:.3}, overrides {:.1}%",
                report.rounds_requested,
                report.decisions,
                report.fallbacks,
                s.mean_reward,
                s.cumulative_regret.unwrap_or(0.0),
                s.override_rate * 100.0
            );
            ExitCode::Clean
        }
        OutputFormat::Md => {
            println!("# ct-core simulate");
            println!();
            println!("Strategy: {}", report.strategy);
            println!("Epoch: {}", report.epoch);
            println!();
            println!("| metric | value |");
            println!("|---|---|");
            println!("| rounds | {} |", report.rounds_requested);
            println!("| decisions | {} |", report.decisions);
            println!("| fallbacks | {} |", report.fallbacks);
            println!("| cumulative reward | {:.4} |", s.cumulative_reward);
            println!("| mean reward | {:.4} |", s.mean_reward);
            if let Some(r) = s.cumulative_regret {
                println!("| cumulative regret | {:.4} |", r);
            }
            if let Some(r) = s.cumulative_pseudo_regret {
                println!("| pseudo regret | {:.4} |", r);
            }
            println!("| override rate | {:.1}% |", s.override_rate * 100.0);
            println!();
            println!("## Arms");
            println!();
            println!("| arm | window | rounds |");
            println!("|---|---|---|");
            for (arm, count) in engine.action_space().arms().iter().zip(&s.arm_counts) {
                println!("| {} | {} | {} |", arm.id, arm.label(), count);
            }
            ExitCode::Clean
        }
    }
}

// ============================================================================
// recommend
// ============================================================================

fn run_recommend(global: &GlobalOpts, args: &RecommendArgs) -> ExitCode {
    match recommend(global, args) {
        Ok(decision) => output_decision(global, &decision),
        Err(e) => output_error(global, &e),
    }
}

fn recommend(global: &GlobalOpts, args: &RecommendArgs) -> Result<Decision, Error> {
    let config = load(global)?;
    let encoder = encoder_for(&config)?;
    let content = std::fs::read_to_string(&args.profile)?;
    let mut profile: PatientProfile = serde_json::from_str(&content)?;
    if let Some(drug) = &args.drug {
        profile.drug = drug.clone();
    }
    let context = encoder.encode(&profile)?;
    let mut engine = engine_for(&config, args.state.as_deref())?;
    engine.select_action(&context, &profile.drug, args.opt_in)
}

fn output_decision(global: &GlobalOpts, d: &Decision) -> ExitCode {
    match global.format {
        OutputFormat::Json | OutputFormat::Jsonl => print_json(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "decision": d,
        })),
        OutputFormat::Summary => {
            println!(
                "arm {} at {:05.2}h (predicted {:.3}, confidence {:.3}{})",
                d.arm,
                d.administration_hour,
                d.predicted_reward,
                d.confidence,
                if d.was_override { ", standard of care" } else { "" }
            );
            ExitCode::Clean
        }
        OutputFormat::Md => {
            println!("# Recommendation");
            println!();
            println!("Arm: {} (start {:.2}h, width {:.2}h)", d.arm, d.start_hour, d.width_hours);
            println!("Administer at: {:.2}h", d.administration_hour);
            println!("Predicted reward: {:.4}", d.predicted_reward);
            println!("Confidence: {:.4}", d.confidence);
            if d.needs_review {
                println!();
                println!("**Standard-of-care fallback; flagged for clinician review.**");
            }
            println!();
            println!("| arm | score | estimate | confidence |");
            println!("|---|---|---|---|");
            for s in &d.scores {
                println!(
                    "| {} | {:.4} | {:.4} | {:.4} |",
                    s.arm, s.score, s.estimate, s.confidence
                );
            }
            for ex in &d.eligible.excluded {
                let reasons: Vec<String> = ex.reasons.iter().map(|r| r.to_string()).collect();
                println!("- arm {} excluded: {}", ex.arm, reasons.join("; "));
            }
            ExitCode::Clean
        }
    }
}

// ============================================================================
// state inspect
// ============================================================================

fn run_state_inspect(global: &GlobalOpts, path: &Path) -> ExitCode {
    let state = match PolicyState::from_file(path) {
        Ok(s) => s,
        Err(e) => return output_error(global, &e),
    };

    // A checkpoint can be inspected without a configuration.
    let check = load(global).and_then(|config| {
        let mut engine = PolicyEngine::new(config.policy, &config.actions)?;
        engine.load_policy_state(state.clone())
    });
    let compatible = check.as_ref().err().map(|e| e.to_string());

    let arms: Vec<serde_json::Value> = state
        .arms
        .iter()
        .enumerate()
        .map(|(i, a)| {
            serde_json::json!({
                "arm": i,
                "kind": a.strategy(),
                "n_updates": a.n_updates(),
            })
        })
        .collect();

    match global.format {
        OutputFormat::Json | OutputFormat::Jsonl => print_json(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "path": path.display().to_string(),
            "state_schema_version": state.schema_version,
            "epoch": state.epoch,
            "strategy": state.strategy,
            "dimension": state.dimension,
            "n_arms": state.n_arms,
            "rounds_issued": state.rounds_issued,
            "total_updates": state.total_updates(),
            "saved_at": state.saved_at.to_rfc3339(),
            "compatible": check.is_ok(),
            "incompatibility": compatible,
            "arms": arms,
        })),
        OutputFormat::Summary => {
            println!(
                "{}: {} d={} arms={} rounds={} updates={} compatible={}",
                path.display(),
                state.strategy,
                state.dimension,
                state.n_arms,
                state.rounds_issued,
                state.total_updates(),
                check.is_ok()
            );
            ExitCode::Clean
        }
        OutputFormat::Md => {
            println!("# Checkpoint {}", path.display());
            println!();
            println!("Strategy: {}", state.strategy);
            println!("Epoch: {}", state.epoch);
            println!("Shape: {} arms x d={}", state.n_arms, state.dimension);
            println!("Rounds issued: {}", state.rounds_issued);
            println!("Saved at: {}", state.saved_at.to_rfc3339());
            match &compatible {
                None => println!("Compatible with current configuration: yes"),
                Some(reason) => println!("Compatible with current configuration: no ({})", reason),
            }
            println!();
            println!("| arm | updates |");
            println!("|---|---|");
            for (i, a) in state.arms.iter().enumerate() {
                println!("| {} | {} |", i, a.n_updates());
            }
            ExitCode::Clean
        }
    }
}

// ============================================================================
// config
// ============================================================================

fn run_config(global: &GlobalOpts, args: &ConfigArgs) -> ExitCode {
    match &args.command {
        ConfigCommands::Show => match load(global) {
            Ok(config) => output_config(global, &config, false),
            Err(e) => output_error(global, &e),
        },
        ConfigCommands::Validate => match load(global) {
            Ok(config) => match encoder_for(&config) {
                Ok(_) => output_config(global, &config, true),
                Err(e) => output_error(global, &e),
            },
            Err(e) => output_error(global, &e),
        },
        ConfigCommands::Schema {
            name,
            list,
            all,
            compact,
        } => run_config_schema(name.as_deref(), *list, *all, *compact),
    }
}

fn output_config(global: &GlobalOpts, config: &LoadedConfig, validate_only: bool) -> ExitCode {
    let snap = &config.snapshot;
    match global.format {
        OutputFormat::Json | OutputFormat::Jsonl => {
            if validate_only {
                print_json(&serde_json::json!({
                    "schema_version": SCHEMA_VERSION,
                    "status": "valid",
                    "snapshot": snap,
                }))
            } else {
                print_json(&serde_json::json!({
                    "schema_version": SCHEMA_VERSION,
                    "snapshot": snap,
                    "policy": config.policy,
                    "actions": config.actions,
                }))
            }
        }
        OutputFormat::Summary => {
            println!(
                "config {}: policy={} actions={} epoch={}",
                if validate_only { "valid" } else { "loaded" },
                snap.policy_path.as_deref().unwrap_or("-"),
                snap.actions_path.as_deref().unwrap_or("-"),
                &snap.epoch[..snap.epoch.len().min(12)]
            );
            ExitCode::Clean
        }
        OutputFormat::Md => {
            println!("# ct-core config {}", if validate_only { "validate" } else { "show" });
            println!();
            println!(
                "Policy: {} ({})",
                snap.policy_path.as_deref().unwrap_or("-"),
                snap.policy_source
            );
            println!(
                "Actions: {} ({})",
                snap.actions_path.as_deref().unwrap_or("-"),
                snap.actions_source
            );
            println!("Epoch: {}", snap.epoch);
            println!();
            println!("Strategy: {}", snap.summary.strategy);
            println!("Confidence threshold: {}", snap.summary.confidence_threshold);
            println!(
                "Exploration cap: {}h (opt-in {}h)",
                snap.summary.exploration_cap_hours, snap.summary.opt_in_cap_hours
            );
            println!("Learning scope: {}", snap.summary.learning_scope);
            println!(
                "Bins: {} x {}h; drugs: {}",
                snap.summary.n_bins,
                snap.summary.bin_width_hours,
                snap.summary.drugs.join(", ")
            );
            ExitCode::Clean
        }
    }
}

fn run_config_schema(name: Option<&str>, list: bool, all: bool, compact: bool) -> ExitCode {
    let format = if compact {
        SchemaFormat::JsonCompact
    } else {
        SchemaFormat::Json
    };

    if list {
        for (name, desc) in available_schemas() {
            println!("{:<20} {}", name, desc);
        }
        return ExitCode::Clean;
    }
    if all {
        return print_json(&generate_all_schemas());
    }

    let Some(name) = name else {
        eprintln!("specify a type name, --list, or --all");
        return ExitCode::ArgsError;
    };
    match generate_schema(name) {
        Some(schema) => match format_schema(&schema, format) {
            Ok(s) => {
                println!("{}", s);
                ExitCode::Clean
            }
            Err(e) => {
                eprintln!("failed to serialize schema: {}", e);
                ExitCode::InternalError
            }
        },
        None => {
            eprintln!("unknown schema type '{}'; see --list", name);
            ExitCode::ArgsError
        }
    }
}

fn print_version(global: &GlobalOpts) {
    match global.format {
        OutputFormat::Json | OutputFormat::Jsonl => {
            print_json(&serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "ct_core_version": env!("CARGO_PKG_VERSION"),
                "rust_version": env!("CARGO_PKG_RUST_VERSION"),
            }));
        }
        _ => {
            println!("ct-core {}", env!("CARGO_PKG_VERSION"));
            println!("schema version: {}", SCHEMA_VERSION);
        }
    }
}
