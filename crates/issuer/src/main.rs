//! Zonecert - command line entry point
//!
//! Validates configuration and inspects DNS provider resolution. Issuance
//! itself is driven through the library by a host that supplies an ACME
//! client.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use zonecert_config::Config;
use zonecert_issuer::{dns::select_providers, zones_for_provider, ProviderRegistry};

/// Zonecert - ACME DNS-01 certificate issuance
#[derive(Parser, Debug)]
#[command(name = "zonecert")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long = "config", env = "ZONECERT_CONFIG", global = true)]
    config: Option<String>,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration file and exit
    Check,
    /// Show which DNS providers serve each domain
    Resolve {
        /// Domains to resolve
        #[arg(required = true)]
        domains: Vec<String>,
    },
    /// List the zones visible to a DNS provider account
    Zones {
        /// Provider id
        provider: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let config_path = cli
        .config
        .context("No configuration file given (use --config or ZONECERT_CONFIG)")?;
    info!("Loading configuration from: {}", config_path);
    let config = Config::load(&config_path).context("Failed to load configuration file")?;

    match cli.command {
        Commands::Check => check_config(&config, &config_path),
        Commands::Resolve { domains } => resolve_domains(&config, &domains),
        Commands::Zones { provider } => list_zones(&config, &provider),
    }
}

/// Validate configuration and print the findings
fn check_config(config: &Config, config_path: &str) -> Result<()> {
    let result = config.validate();

    for warning in &result.warnings {
        println!("warning: {}", warning);
    }
    for error in &result.errors {
        println!("error: {}", error);
    }

    if !result.is_valid() {
        anyhow::bail!(
            "configuration file {} has {} error(s)",
            config_path,
            result.errors.len()
        );
    }

    let registry = ProviderRegistry::from_plugins(&config.plugins)
        .context("Failed to initialize DNS provider plugins")?;
    info!("  - {} plugin(s): {}", registry.len(), registry.types().join(", "));
    info!("  - {} DNS provider(s)", config.dns_providers.len());
    println!("zonecert: configuration file {} test is successful", config_path);
    Ok(())
}

fn resolve_domains(config: &Config, domains: &[String]) -> Result<()> {
    let providers = config.provider_handles();

    for domain in domains {
        let selected = select_providers(domain, &providers);
        if selected.is_empty() {
            println!("{}: no DNS provider", domain);
            continue;
        }
        let ids: Vec<&str> = selected.iter().map(|p| p.id.as_str()).collect();
        println!("{}: {}", domain, ids.join(", "));
    }
    Ok(())
}

fn list_zones(config: &Config, provider_id: &str) -> Result<()> {
    let provider = config
        .provider(provider_id)
        .with_context(|| format!("DNS provider '{}' is not configured", provider_id))?;
    let registry =
        ProviderRegistry::from_plugins(&config.plugins).context("Failed to initialize DNS plugins")?;

    let runtime = tokio::runtime::Runtime::new()?;
    let zones = runtime.block_on(zones_for_provider(&registry, provider))?;
    debug!(provider = %provider_id, zones = zones.len(), "Fetched zones");

    for zone in zones {
        println!("{}", zone);
    }
    Ok(())
}
