// crates/divine-guard-cli/src/main.rs
// ============================================================================
// Module: Divine Guard CLI
// Description: Command-line entry point for the Divine Guard control plane.
// Purpose: Serve snapshots, validate config, compile offline, manage rules.
// Dependencies: clap, divine-guard-cli, divine-guard-config, divine-guard-core,
//               divine-guard-server, tokio
// ============================================================================

//! ## Overview
//! The `divine-guard` binary wraps the control plane for operators. `serve`
//! runs the HTTP surface; `snapshot compile` runs the compiler against a rule
//! file with no persistent store; `rules import` and `rules list` operate on
//! the configured store directly.
//!
//! Security posture: rule files and config paths are untrusted inputs; reads
//! are size-bounded and rule batches are validated before any write.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use divine_guard_cli::MAX_INPUT_BYTES;
use divine_guard_cli::ReadLimitError;
use divine_guard_cli::compile_offline;
use divine_guard_cli::import_rules;
use divine_guard_cli::parse_rule_file;
use divine_guard_cli::read_bytes_with_limit;
use divine_guard_config::DivineGuardConfig;
use divine_guard_config::RuleStoreType;
use divine_guard_config::config_toml_example;
use divine_guard_core::RequestContext;
use divine_guard_core::RuleQuery;
use divine_guard_core::RuleUpsert;
use divine_guard_core::Scope;
use divine_guard_core::Timestamp;
use divine_guard_core::hashing::canonical_json_bytes;
use divine_guard_server::DivineGuardServer;
use divine_guard_server::auth::normalize_actor;
use divine_guard_server::build_control_plane;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Actor recorded by `rules import` when none is given.
const DEFAULT_IMPORT_ACTOR: &str = "cli";

// ============================================================================
// SECTION: CLI Definitions
// ============================================================================

/// Divine Guard command-line interface.
#[derive(Parser, Debug)]
#[command(name = "divine-guard", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print the CLI version and exit.
    #[arg(long = "version", action = ArgAction::SetTrue)]
    show_version: bool,
    /// Selected subcommand.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP control-plane server.
    Serve(ServeCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Snapshot utilities.
    Snapshot {
        /// Selected snapshot subcommand.
        #[command(subcommand)]
        command: SnapshotCommand,
    },
    /// Rule store utilities.
    Rules {
        /// Selected rules subcommand.
        #[command(subcommand)]
        command: RulesCommand,
    },
}

/// Arguments for `serve`.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Optional config file path (defaults to divine-guard.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a config file.
    Validate(ConfigValidateCommand),
    /// Print a canonical example config.
    Example,
}

/// Arguments for `config validate`.
#[derive(Args, Debug)]
struct ConfigValidateCommand {
    /// Optional config file path (defaults to divine-guard.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Snapshot subcommands.
#[derive(Subcommand, Debug)]
enum SnapshotCommand {
    /// Compile a snapshot from a rule file without a running server.
    Compile(SnapshotCompileCommand),
}

/// Arguments for `snapshot compile`.
#[derive(Args, Debug)]
struct SnapshotCompileCommand {
    /// JSON array of rule upsert payloads.
    #[arg(long, value_name = "FILE")]
    rules: PathBuf,
    /// Client app version to compile for.
    #[arg(long, value_name = "VERSION")]
    app_version: Option<String>,
    /// Feature key to compile for.
    #[arg(long, value_name = "KEY")]
    feature_key: Option<String>,
    /// Network state to compile for.
    #[arg(long, value_name = "STATE")]
    network_state: Option<String>,
    /// Optional config file for safe-mode values and snapshot limits.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Rules subcommands.
#[derive(Subcommand, Debug)]
enum RulesCommand {
    /// Upsert every rule in a file into the configured store.
    Import(RulesImportCommand),
    /// List stored rules.
    List(RulesListCommand),
}

/// Arguments for `rules import`.
#[derive(Args, Debug)]
struct RulesImportCommand {
    /// JSON array of rule upsert payloads.
    #[arg(long, value_name = "FILE")]
    input: PathBuf,
    /// Optional config file path (defaults to divine-guard.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Actor recorded on each upsert.
    #[arg(long, value_name = "ACTOR")]
    actor: Option<String>,
}

/// Arguments for `rules list`.
#[derive(Args, Debug)]
struct RulesListCommand {
    /// Restrict the listing to one scope.
    #[arg(long, value_name = "SCOPE")]
    scope: Option<String>,
    /// Optional config file path (defaults to divine-guard.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper carrying a user-facing message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();

    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&format!("divine-guard {version}"))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    match command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Config {
            command,
        } => command_config(&command),
        Commands::Snapshot {
            command,
        } => command_snapshot(&command),
        Commands::Rules {
            command,
        } => command_rules(&command),
    }
}

/// Prints top-level help.
fn show_help() -> CliResult<()> {
    let mut command = Cli::command();
    command.print_help().map_err(|err| CliError::new(output_error("stdout", &err)))?;
    write_stdout_line("").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(())
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = DivineGuardConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    let server = tokio::task::spawn_blocking(move || DivineGuardServer::from_config(&config))
        .await
        .map_err(|err| CliError::new(format!("server init failed: init join failed: {err}")))?
        .map_err(|err| CliError::new(format!("server init failed: {err}")))?;
    write_stderr_line(&format!("divine-guard: listening on {}", server.addr()))
        .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    server.serve().await.map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Dispatches config subcommands.
fn command_config(command: &ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate(command) => command_config_validate(command),
        ConfigCommand::Example => command_config_example(),
    }
}

/// Executes the config validation command.
fn command_config_validate(command: &ConfigValidateCommand) -> CliResult<ExitCode> {
    let _config = DivineGuardConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    write_stdout_line("config ok").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Prints the canonical example config.
fn command_config_example() -> CliResult<ExitCode> {
    write_stdout_bytes(config_toml_example().as_bytes())
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Snapshot Commands
// ============================================================================

/// Dispatches snapshot subcommands.
fn command_snapshot(command: &SnapshotCommand) -> CliResult<ExitCode> {
    match command {
        SnapshotCommand::Compile(command) => command_snapshot_compile(command),
    }
}

/// Compiles a snapshot from a rule file and prints it as canonical JSON.
fn command_snapshot_compile(command: &SnapshotCompileCommand) -> CliResult<ExitCode> {
    let config = match &command.config {
        Some(path) => DivineGuardConfig::load(Some(path))
            .map_err(|err| CliError::new(format!("failed to load config: {err}")))?,
        None => DivineGuardConfig::default(),
    };
    let rules = read_rule_file(&command.rules)?;
    let context = RequestContext::new(
        command.app_version.as_deref(),
        command.feature_key.as_deref(),
        command.network_state.as_deref(),
    );
    let snapshot = compile_offline(&config, &rules, &context, now())
        .map_err(|err| CliError::new(format!("snapshot compile failed: {err}")))?;
    write_canonical_json(&snapshot)?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Rules Commands
// ============================================================================

/// Summary line for one imported rule.
#[derive(Debug, Serialize)]
struct ImportedRule {
    /// Rule key.
    rule_key: String,
    /// Create or update.
    action: &'static str,
    /// Revision assigned by the store.
    revision: u64,
}

/// Output of `rules import`.
#[derive(Debug, Serialize)]
struct ImportSummary {
    /// Number of payloads applied.
    imported: usize,
    /// Per-rule outcomes in file order.
    rules: Vec<ImportedRule>,
}

/// Dispatches rules subcommands.
fn command_rules(command: &RulesCommand) -> CliResult<ExitCode> {
    match command {
        RulesCommand::Import(command) => command_rules_import(command),
        RulesCommand::List(command) => command_rules_list(command),
    }
}

/// Imports a rule file into the configured store.
fn command_rules_import(command: &RulesImportCommand) -> CliResult<ExitCode> {
    let config = DivineGuardConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    if config.rule_store.store_type == RuleStoreType::Memory {
        return Err(CliError::new(
            "rules import requires a sqlite rule_store; memory stores do not persist".to_string(),
        ));
    }
    let actor = normalize_actor(command.actor.as_deref())
        .map_err(|err| CliError::new(format!("invalid --actor: {err}")))?
        .unwrap_or_else(|| DEFAULT_IMPORT_ACTOR.to_string());
    let rules = read_rule_file(&command.input)?;
    let plane = build_control_plane(&config)
        .map_err(|err| CliError::new(format!("failed to open rule store: {err}")))?;
    let outcomes = import_rules(&plane, &rules, Some(&actor), now())
        .map_err(|err| CliError::new(format!("rules import failed: {err}")))?;
    let summary = ImportSummary {
        imported: outcomes.len(),
        rules: outcomes
            .iter()
            .map(|outcome| ImportedRule {
                rule_key: outcome.rule.rule_key().to_string(),
                action: outcome.action.as_str(),
                revision: outcome.rule.revision,
            })
            .collect(),
    };
    write_canonical_json(&summary)?;
    Ok(ExitCode::SUCCESS)
}

/// Lists stored rules in admin listing order.
fn command_rules_list(command: &RulesListCommand) -> CliResult<ExitCode> {
    let scope = command
        .scope
        .as_deref()
        .map(Scope::from_str)
        .transpose()
        .map_err(|err| CliError::new(format!("invalid --scope: {err}")))?;
    let config = DivineGuardConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    let plane = build_control_plane(&config)
        .map_err(|err| CliError::new(format!("failed to open rule store: {err}")))?;
    let query = RuleQuery {
        scope,
        enabled_only: false,
    };
    let rules =
        plane.list(&query).map_err(|err| CliError::new(format!("rules list failed: {err}")))?;
    write_canonical_json(&rules)?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Input Helpers
// ============================================================================

/// Reads and parses a bounded rule file.
fn read_rule_file(path: &Path) -> CliResult<Vec<RuleUpsert>> {
    let bytes = read_bytes_with_limit(path, MAX_INPUT_BYTES).map_err(|err| match err {
        ReadLimitError::Io(err) => {
            CliError::new(format!("failed to read rule file {}: {err}", path.display()))
        }
        ReadLimitError::TooLarge {
            size,
            limit,
        } => CliError::new(format!(
            "rule file {} is too large ({size} bytes, limit {limit})",
            path.display()
        )),
    })?;
    parse_rule_file(&bytes)
        .map_err(|err| CliError::new(format!("failed to parse {}: {err}", path.display())))
}

/// Current wall-clock instant.
fn now() -> Timestamp {
    Timestamp::new(OffsetDateTime::now_utc())
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes raw bytes to stdout without adding a newline.
fn write_stdout_bytes(bytes: &[u8]) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(bytes)
}

/// Writes a value as canonical JSON followed by a newline.
fn write_canonical_json<T: Serialize>(value: &T) -> CliResult<()> {
    let mut bytes = canonical_json_bytes(value)
        .map_err(|err| CliError::new(format!("failed to encode output: {err}")))?;
    bytes.push(b'\n');
    write_stdout_bytes(&bytes).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
