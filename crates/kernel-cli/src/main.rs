use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use contracts::{ActionContext, ActionPayload, ResourceAmounts, ResourceKind};
use kernel_api::{EngineSettings, FiefdomEngine, SqliteGameStore};
use kernel_core::lint::{has_errors, lint_registry};
use kernel_core::ConfigRegistry;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "kernel-cli", about = "Fiefdom construction and economy engine")]
struct Cli {
    /// SQLite database file
    #[arg(long, env = "FIEFDOM_SQLITE_PATH", default_value = "fiefdoms.sqlite")]
    db: PathBuf,

    /// Directory holding the game config JSON files
    #[arg(long, env = "FIEFDOM_CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,

    /// Worker threads for batch catch-up planning
    #[arg(long, env = "FIEFDOM_CATCH_UP_THREADS", default_value_t = 4)]
    threads: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database and apply migrations
    Init,
    /// Found a new fiefdom, e.g. `found 7 Ravenest 12 -3 gold=500 wood=50`
    Found {
        owner: i64,
        name: String,
        #[arg(allow_negative_numbers = true)]
        x: i64,
        #[arg(allow_negative_numbers = true)]
        y: i64,
        /// Starting stock as `kind=amount`
        resources: Vec<String>,
    },
    /// Appoint an official from a template
    Appoint {
        fiefdom: i64,
        role: String,
        template: String,
        name: String,
        #[arg(long, default_value_t = 1)]
        level: u32,
    },
    /// Recruit a hero from a template
    Recruit {
        fiefdom: i64,
        template: String,
        #[arg(long, default_value_t = 1)]
        level: u32,
    },
    /// Station a combatant from a template
    Station {
        fiefdom: i64,
        template: String,
        #[arg(long, default_value_t = 1)]
        level: u32,
    },
    /// Submit a player action with a JSON payload
    Act {
        kind: String,
        character: i64,
        payload: String,
        #[arg(long)]
        fiefdom: Option<i64>,
        /// Validate and preview without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Catch every fiefdom (or one) up from `since` to now
    Advance {
        since: i64,
        #[arg(long)]
        fiefdom: Option<i64>,
    },
    /// Print a fiefdom snapshot after catching it up
    Show { fiefdom: i64 },
    /// List the fiefdoms an owner holds
    List { owner: i64 },
    /// Lint a config directory (defaults to `--config-dir`)
    CheckConfig { dir: Option<PathBuf> },
}

fn init_tracing() -> Result<(), String> {
    let mut filter = EnvFilter::from_default_env();
    for directive in ["kernel_api=info", "kernel_core=info", "kernel_cli=info"] {
        filter = filter.add_directive(
            directive
                .parse()
                .map_err(|err| format!("invalid log directive {directive}: {err}"))?,
        );
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn parse_resources(raw: &[String]) -> Result<ResourceAmounts, String> {
    let mut amounts = ResourceAmounts::new();
    for entry in raw {
        let (kind, amount) = entry
            .split_once('=')
            .ok_or_else(|| format!("expected kind=amount, got {entry}"))?;
        let kind = ResourceKind::parse(kind).ok_or_else(|| format!("unknown resource: {kind}"))?;
        let amount = amount
            .parse::<i64>()
            .map_err(|_| format!("invalid amount for {kind}: {amount}"))?;
        *amounts.entry(kind).or_default() += amount;
    }
    Ok(amounts)
}

fn load_config(dir: &Path) -> Result<Arc<ConfigRegistry>, String> {
    ConfigRegistry::load_dir(dir)
        .map(Arc::new)
        .map_err(|err| format!("failed to load config from {}: {err}", dir.display()))
}

fn open_engine(cli: &Cli) -> Result<FiefdomEngine, String> {
    let settings = EngineSettings {
        catch_up_worker_threads: cli.threads,
        ..EngineSettings::default()
    };
    FiefdomEngine::open(&cli.db, load_config(&cli.config_dir)?, settings)
        .map_err(|err| format!("failed to open {}: {err}", cli.db.display()))
}

fn print_json(value: &impl serde::Serialize) -> Result<(), String> {
    let rendered = serde_json::to_string_pretty(value).map_err(|err| err.to_string())?;
    println!("{rendered}");
    Ok(())
}

fn run(cli: Cli) -> Result<ExitCode, String> {
    match &cli.command {
        Command::Init => {
            SqliteGameStore::open(&cli.db)
                .map_err(|err| format!("failed to initialize {}: {err}", cli.db.display()))?;
            info!(db = %cli.db.display(), "database ready");
        }
        Command::Found {
            owner,
            name,
            x,
            y,
            resources,
        } => {
            let resources = parse_resources(resources)?;
            let mut engine = open_engine(&cli)?;
            let fiefdom_id = engine
                .found_fiefdom(*owner, name, *x, *y, resources)
                .map_err(|err| err.to_string())?;
            println!("fiefdom_id={fiefdom_id}");
        }
        Command::Appoint {
            fiefdom,
            role,
            template,
            name,
            level,
        } => {
            let mut engine = open_engine(&cli)?;
            let id = engine
                .appoint_official(*fiefdom, role, template, name, *level)
                .map_err(|err| err.to_string())?;
            println!("official_id={id}");
        }
        Command::Recruit {
            fiefdom,
            template,
            level,
        } => {
            let mut engine = open_engine(&cli)?;
            let id = engine
                .recruit_hero(*fiefdom, template, *level)
                .map_err(|err| err.to_string())?;
            println!("hero_id={id}");
        }
        Command::Station {
            fiefdom,
            template,
            level,
        } => {
            let mut engine = open_engine(&cli)?;
            let id = engine
                .station_combatant(*fiefdom, template, *level)
                .map_err(|err| err.to_string())?;
            println!("combatant_id={id}");
        }
        Command::Act {
            kind,
            character,
            payload,
            fiefdom,
            dry_run,
        } => {
            let payload: ActionPayload =
                serde_json::from_str(payload).map_err(|err| format!("invalid payload: {err}"))?;
            let mut ctx = ActionContext::new(*character);
            if let Some(fiefdom_id) = fiefdom {
                ctx = ctx.with_fiefdom(*fiefdom_id);
            }
            let mut engine = open_engine(&cli)?;
            let result = if *dry_run {
                engine.validate_action(kind, &ctx, &payload)
            } else {
                engine.submit_action(kind, &ctx, &payload)
            };
            print_json(&result)?;
            if !result.is_ok() {
                return Ok(ExitCode::from(1));
            }
        }
        Command::Advance { since, fiefdom } => {
            let mut engine = open_engine(&cli)?;
            let update = engine
                .advance_state(*since, *fiefdom)
                .map_err(|err| err.to_string())?;
            print_json(&update)?;
        }
        Command::Show { fiefdom } => {
            let mut engine = open_engine(&cli)?;
            let snapshot = engine.get_fiefdom(*fiefdom).map_err(|err| err.to_string())?;
            print_json(&snapshot)?;
        }
        Command::List { owner } => {
            let engine = open_engine(&cli)?;
            let fiefdoms = engine
                .list_fiefdoms_for_owner(*owner)
                .map_err(|err| err.to_string())?;
            print_json(&fiefdoms)?;
        }
        Command::CheckConfig { dir } => {
            let config = load_config(dir.as_deref().unwrap_or(cli.config_dir.as_path()))?;
            let issues = lint_registry(&config);
            for issue in &issues {
                println!("{issue}");
            }
            if has_errors(&issues) {
                return Ok(ExitCode::from(1));
            }
            println!("config ok: {} issue(s)", issues.len());
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    if let Err(err) = init_tracing() {
        eprintln!("error: {err}");
        return ExitCode::from(2);
    }
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}
