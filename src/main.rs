//! ics CLI entrypoint.
//!
//! This is the main entrypoint for the ics command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use ics_baremetal::cli::{Cli, Commands, ImportCommands, OutputFormatter, StateCommands};
use ics_baremetal::config::{
    Manifest, ManifestParser, ManifestValidator, ProviderSettings, find_manifest_file,
};
use ics_baremetal::error::{ConfigError, IcsError, PlanError, Result};
use ics_baremetal::ics::IcsClient;
use ics_baremetal::planner::{DeploymentPlan, DiffEngine, PlanExecutor, Refresher};
use ics_baremetal::provision::{
    CancelSignal, CatalogResolver, PollPolicy, cancel_pair, relay_interrupts,
};
use ics_baremetal::state::{LocalStateStore, StateStore};

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` wins over `--verbose` when set.
fn init_logging(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let manifest_path = cli.manifest.as_deref();
    let token = cli.api_token.as_deref();

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate { warnings } => cmd_validate(manifest_path, warnings, &formatter),
        Commands::Inventory {
            location,
            instance_type,
            available,
        } => {
            cmd_inventory(
                token,
                location.as_deref(),
                instance_type.as_deref(),
                available,
                &formatter,
            )
            .await
        }
        Commands::Os {
            instance_type,
            location,
        } => cmd_os(token, &instance_type, &location, &formatter).await,
        Commands::Plan => cmd_plan(manifest_path, &formatter).await,
        Commands::Apply {
            yes,
            allow_replace,
            continue_on_error,
        } => {
            cmd_apply(
                manifest_path,
                token,
                yes,
                allow_replace,
                continue_on_error,
                &formatter,
            )
            .await
        }
        Commands::Refresh => cmd_refresh(manifest_path, token, &formatter).await,
        Commands::Import { command } => cmd_import(manifest_path, token, command, &formatter).await,
        Commands::Destroy { yes } => cmd_destroy(manifest_path, token, yes, &formatter).await,
        Commands::State { command } => cmd_state(manifest_path, command, &formatter).await,
    }
}

/// Initialize a new project.
fn cmd_init(path: &Path, force: bool) -> Result<()> {
    info!("Initializing ics project in: {}", path.display());

    let manifest_path = path.join("ics.resources.yaml");
    let env_path = path.join(".env.example");
    let gitignore_path = path.join(".gitignore");

    if !force && manifest_path.exists() {
        eprintln!("Manifest already exists: {}", manifest_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    std::fs::write(&manifest_path, include_str!("../templates/ics.resources.yaml"))?;
    eprintln!("Created: {}", manifest_path.display());

    std::fs::write(&env_path, include_str!("../templates/.env.example"))?;
    eprintln!("Created: {}", env_path.display());

    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        let missing: Vec<&str> = [".env", ".ics/"]
            .into_iter()
            .filter(|entry| !existing.lines().any(|l| l.trim() == *entry))
            .collect();
        if !missing.is_empty() {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&gitignore_path)?;
            writeln!(file, "\n# ics")?;
            for entry in missing {
                writeln!(file, "{entry}")?;
            }
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, ".env\n.ics/\n")?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nProject initialized.");
    eprintln!("Next steps:");
    eprintln!("  1. Copy .env.example to .env and set ICS_API_TOKEN");
    eprintln!("  2. Edit ics.resources.yaml");
    eprintln!("  3. Run 'ics inventory --available' to see what can be ordered");
    eprintln!("  4. Run 'ics plan', then 'ics apply'");

    Ok(())
}

/// Validate the manifest.
fn cmd_validate(
    manifest_path: Option<&Path>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let path = resolve_manifest_path(manifest_path)?;
    info!("Validating manifest: {}", path.display());

    let manifest = ManifestParser::new().load_file(&path)?;
    let result = ManifestValidator::new().check(&manifest);

    emit(&formatter.format_validation(&result, show_warnings))?;

    if result.is_valid() {
        Ok(())
    } else {
        Err(ConfigError::validation_general(format!(
            "{} error(s) in {}",
            result.errors.len(),
            path.display()
        ))
        .into())
    }
}

/// List inventory.
async fn cmd_inventory(
    token: Option<&str>,
    location: Option<&str>,
    instance_type: Option<&str>,
    available: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (client, _) = connect(Path::new("."), token)?;
    let items = CatalogResolver::new(&client)
        .inventory(location, instance_type, available)
        .await?;

    emit(&formatter.format_inventory(&items))
}

/// List operating systems for a type at a location.
async fn cmd_os(
    token: Option<&str>,
    instance_type: &str,
    location: &str,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (client, _) = connect(Path::new("."), token)?;
    let resolver = CatalogResolver::new(&client);

    let sku = resolver.resolve(instance_type, location).await?;
    let systems = resolver
        .operating_systems(&sku.sku_product_name, &sku.location_code)
        .await?;

    emit(&formatter.format_operating_systems(&systems))
}

/// Show the plan.
async fn cmd_plan(manifest_path: Option<&Path>, formatter: &OutputFormatter) -> Result<()> {
    let project = Project::load(manifest_path)?;
    let state = project.store.load_or_default().await?;

    let plan = DeploymentPlan::from_diff(&DiffEngine::new().compute(&project.manifest, &state));
    emit(&formatter.format_plan(&plan))
}

/// Apply the manifest.
async fn cmd_apply(
    manifest_path: Option<&Path>,
    token: Option<&str>,
    auto_approve: bool,
    allow_replace: bool,
    continue_on_error: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let project = Project::load(manifest_path)?;
    let (client, settings) = connect(&project.dir, token)?;

    let lock = project.store.acquire_lock("").await?;
    let outcome = apply_locked(
        &project,
        &client,
        &settings,
        &lock.lock_id,
        auto_approve,
        allow_replace,
        continue_on_error,
        formatter,
    )
    .await;
    project.store.release_lock(&lock.lock_id).await?;
    outcome
}

async fn apply_locked(
    project: &Project,
    client: &IcsClient,
    settings: &ProviderSettings,
    lock_id: &str,
    auto_approve: bool,
    allow_replace: bool,
    continue_on_error: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let mut state = project.store.load_or_default().await?;
    let plan = DeploymentPlan::from_diff(&DiffEngine::new().compute(&project.manifest, &state));

    emit(&formatter.format_plan(&plan))?;
    if plan.is_empty() {
        return Ok(());
    }
    plan.check_replacements(allow_replace)?;

    if plan.has_destructive_actions() {
        warn!("This plan cancels or deletes existing resources");
    }

    if !auto_approve && !confirm("Do you want to apply this plan? [y/N]: ", "y")? {
        eprintln!("Apply cancelled.");
        return Ok(());
    }

    let (handle, mut cancel) = cancel_pair();
    let interrupt = tokio::spawn(async move {
        if relay_interrupts(handle, || async { tokio::signal::ctrl_c().await.is_ok() }).await {
            std::process::exit(130);
        }
    });

    let result = PlanExecutor::new(client, &project.store, PollPolicy::from_settings(settings))
        .with_allow_replace(allow_replace)
        .with_continue_on_error(continue_on_error)
        .with_lock(lock_id)
        .execute(&plan, &project.manifest, &mut state, &mut cancel)
        .await;
    interrupt.abort();
    let result = result?;

    emit(&formatter.format_execution(&result))?;

    if result.cancelled {
        Err(PlanError::Interrupted {
            remaining: result.skipped,
        }
        .into())
    } else if result.failed > 0 {
        Err(PlanError::ExecutionFailed {
            failed: result.failed,
        }
        .into())
    } else {
        Ok(())
    }
}

/// Re-read tracked resources.
async fn cmd_refresh(
    manifest_path: Option<&Path>,
    token: Option<&str>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let project = Project::load(manifest_path)?;
    let (client, _) = connect(&project.dir, token)?;

    let lock = project.store.acquire_lock("").await?;
    let outcome = refresh_locked(&project, &client, formatter).await;
    project.store.release_lock(&lock.lock_id).await?;
    outcome
}

async fn refresh_locked(
    project: &Project,
    client: &IcsClient,
    formatter: &OutputFormatter,
) -> Result<()> {
    let mut state = project.store.load_or_default().await?;
    let report = Refresher::new(client).refresh(&mut state).await?;
    project.store.save(&state).await?;

    emit(&formatter.format_refresh(&report))?;

    if report.has_drift() {
        Err(PlanError::Drift {
            count: report.drifted.len(),
        }
        .into())
    } else {
        Ok(())
    }
}

/// Adopt existing resources.
async fn cmd_import(
    manifest_path: Option<&Path>,
    token: Option<&str>,
    command: ImportCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let project = match &command {
        ImportCommands::Server { .. } => Project::load(manifest_path)?,
        // Keys can be adopted before a manifest exists.
        ImportCommands::SshKey { .. } => match Project::load(manifest_path) {
            Ok(project) => project,
            Err(IcsError::Config(ConfigError::FileNotFound { .. })) => {
                debug!("No manifest found, importing into the current directory");
                Project::bare(Path::new("."))
            }
            Err(e) => return Err(e),
        },
    };
    let (client, _) = connect(&project.dir, token)?;

    let lock = project.store.acquire_lock("").await?;
    let outcome = import_locked(&project, &client, &command, formatter).await;
    project.store.release_lock(&lock.lock_id).await?;
    outcome
}

async fn import_locked(
    project: &Project,
    client: &IcsClient,
    command: &ImportCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let refresher = Refresher::new(client);
    let mut state = project.store.load_or_default().await?;

    let message = match command {
        ImportCommands::Server { service_id, name } => {
            let tracked = refresher
                .import_server(&project.manifest, &mut state, service_id, name)
                .await?;
            format!("Imported server {} as server/{name}", tracked.server.id)
        }
        ImportCommands::SshKey { label } => {
            let tracked = refresher
                .import_ssh_key(&project.manifest, &mut state, label)
                .await?;
            format!("Imported SSH key {} as ssh_key/{label}", tracked.key.id)
        }
    };

    project.store.save(&state).await?;
    emit(&formatter.format_message("success", &message))
}

/// Delete everything in state.
async fn cmd_destroy(
    manifest_path: Option<&Path>,
    token: Option<&str>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let project = Project::load(manifest_path)?;
    let (client, settings) = connect(&project.dir, token)?;

    let lock = project.store.acquire_lock("").await?;
    let outcome = destroy_locked(
        &project,
        &client,
        &settings,
        &lock.lock_id,
        auto_approve,
        formatter,
    )
    .await;
    project.store.release_lock(&lock.lock_id).await?;
    outcome
}

async fn destroy_locked(
    project: &Project,
    client: &IcsClient,
    settings: &ProviderSettings,
    lock_id: &str,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let mut state = project.store.load_or_default().await?;
    let empty = Manifest::default();
    let plan = DeploymentPlan::from_diff(&DiffEngine::new().compute(&empty, &state));

    if plan.is_empty() {
        return emit(&formatter.format_message("success", "Nothing to destroy."));
    }

    emit(&formatter.format_plan(&plan))?;

    if !auto_approve
        && !confirm(
            "\nThis cancels every tracked server and deletes every tracked key. Type 'destroy' to confirm: ",
            "destroy",
        )?
    {
        eprintln!("Destruction cancelled.");
        return Ok(());
    }

    let result = PlanExecutor::new(client, &project.store, PollPolicy::from_settings(settings))
        .with_continue_on_error(true)
        .with_lock(lock_id)
        .execute(&plan, &empty, &mut state, &mut CancelSignal::never())
        .await?;

    emit(&formatter.format_execution(&result))?;

    if result.failed > 0 {
        Err(PlanError::ExecutionFailed {
            failed: result.failed,
        }
        .into())
    } else {
        Ok(())
    }
}

/// State management commands.
async fn cmd_state(
    manifest_path: Option<&Path>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let dir = resolve_manifest_path(manifest_path)
        .ok()
        .as_deref()
        .and_then(Path::parent)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let store = LocalStateStore::in_project(&dir);
    debug!(
        "Using {} state at {}",
        store.backend_type(),
        store.state_path().display()
    );

    match command {
        StateCommands::Show => {
            match store.load().await? {
                Some(state) => emit(&formatter.format_state(&state))?,
                None => emit(&formatter.format_message("info", "No state found."))?,
            }
            if let Some(lock) = store.get_lock_info().await? {
                let status = if lock.is_expired() {
                    format!("Stale lock held by {} (expired)", lock.holder)
                } else {
                    format!(
                        "Locked by {} (expires in {}s)",
                        lock.holder,
                        lock.remaining_secs()
                    )
                };
                emit(&formatter.format_message("warning", &status))?;
            }
            Ok(())
        }
        StateCommands::Unlock { force } => {
            if !force {
                return Err(IcsError::internal(
                    "refusing to remove the state lock without --force",
                ));
            }
            match store.force_unlock().await? {
                Some(lock) => emit(&formatter.format_message(
                    "success",
                    &format!("Removed lock held by {} since {}", lock.holder, lock.acquired_at),
                )),
                None => emit(&formatter.format_message("info", "State is not locked.")),
            }
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// A manifest together with the state that lives next to it.
struct Project {
    dir: PathBuf,
    manifest: Manifest,
    store: LocalStateStore,
}

impl Project {
    /// Loads and validates the manifest, and opens its state directory.
    fn load(manifest_path: Option<&Path>) -> Result<Self> {
        let path = resolve_manifest_path(manifest_path)?;
        debug!("Loading manifest from: {}", path.display());

        let manifest = ManifestParser::new().load_file(&path)?;
        let validation = ManifestValidator::new().validate(&manifest)?;
        for warning in &validation.warnings {
            warn!("{warning}");
        }

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let store = LocalStateStore::in_project(&dir);

        Ok(Self {
            dir,
            manifest,
            store,
        })
    }

    /// A project with no manifest.
    fn bare(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            manifest: Manifest::default(),
            store: LocalStateStore::in_project(dir),
        }
    }
}

/// Resolves the manifest file path.
fn resolve_manifest_path(manifest_path: Option<&Path>) -> Result<PathBuf> {
    manifest_path.map_or_else(|| find_manifest_file("."), |path| Ok(path.to_path_buf()))
}

/// Loads `.env` from `dir` and builds an API client.
fn connect(dir: &Path, token: Option<&str>) -> Result<(IcsClient, ProviderSettings)> {
    ProviderSettings::load_dotenv(dir)?;
    let settings = ProviderSettings::resolve(token)?;
    let client = IcsClient::from_settings(&settings)?;
    Ok((client, settings))
}

/// Asks for confirmation on stderr.
fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case(expected))
}

/// Writes command output to stdout.
fn emit(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    if !output.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}
