use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{fmt, EnvFilter};

use georules::errors::AppError;
use georules::rules::params::{
    self, DeleteParams, DeleteRule, PostParams, PostRule, RulesRequest, RulesResponse,
};
use georules::rules::{KdlFileBackend, RuleManager};
use georules::settings;

#[derive(Parser, Debug)]
#[command(
    name = "georules",
    version,
    about = "Manage workspace/layer access rules"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print all rules as JSON
    List,
    /// Create a rule or append roles to it, e.g. "workspace=geo&method=w&role=ADMIN"
    Post { query: String },
    /// Remove roles from a rule, or the whole rule, e.g. "workspace=geo&method=w&missing=true"
    Delete { query: String },
}

fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::debug!(?settings, "Loaded configuration");

    let manager =
        RuleManager::new(KdlFileBackend::new(&settings.rules.path)).map_err(AppError::from)?;

    let request = match cli.command {
        Command::List => RulesRequest::List,
        Command::Post { query } => {
            let raw = PostParams::from_query(&query).map_err(AppError::from)?;
            RulesRequest::Post(PostRule::try_from(raw).map_err(AppError::from)?)
        }
        Command::Delete { query } => {
            let raw = DeleteParams::from_query(&query).map_err(AppError::from)?;
            RulesRequest::Delete(DeleteRule::try_from(raw).map_err(AppError::from)?)
        }
    };

    match params::handle(&manager, request).map_err(AppError::from)? {
        RulesResponse::Rules(rules) => {
            let json = serde_json::to_string_pretty(&rules).map_err(AppError::from)?;
            println!("{json}");
        }
        RulesResponse::Message(message) => println!("{message}"),
    }
    Ok(())
}
