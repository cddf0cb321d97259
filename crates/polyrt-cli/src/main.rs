//! polyrt CLI: inspect backend resolution on this machine.

use clap::{Parser, Subcommand};
use polyrt_backend::cpu::missing_features;
use polyrt_backend::{HostCpu, ResolveError};
use polyrt_core::config::RuntimeConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "polyrt")]
#[command(about = "polyrt: backend variant resolution diagnostics", long_about = None)]
struct Cli {
    /// Log resolution steps (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the backend and print its build info
    Info {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show host CPU features and what each native variant is missing
    Cpu,

    /// Print the allocator configuration string applied before backend load
    AllocConf,

    /// Print the runtime configuration read from the environment
    Config,

    /// Show the effective candidate order and the resolution outcome
    Resolve,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Info { json } => info(json),
        Commands::Cpu => cpu(),
        Commands::AllocConf => alloc_conf(),
        Commands::Config => config(),
        Commands::Resolve => resolve(),
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("polyrt=debug,polyrt_backend=debug,polyrt_ext=debug,polyrt_plugin=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

fn info(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let info = polyrt::build_info()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }
    println!("polyrt {}", info.version);
    println!("  Variant:  {}", info.variant.as_deref().unwrap_or("-"));
    println!("  Target:   {}", info.target);
    println!("  Features: {}", info.features.join(", "));
    println!("  Index:    {}", polyrt::get_index_type()?);
    Ok(())
}

fn cpu() -> Result<(), Box<dyn std::error::Error>> {
    let config = RuntimeConfig::from_env()?;
    println!("Detected: {}", HostCpu::detected().join(", "));
    println!();
    for candidate in polyrt::default_candidates(&config) {
        let missing = missing_features(&HostCpu, candidate.required_cpu_features());
        if missing.is_empty() {
            println!("  {:<8} ok", candidate.id());
        } else {
            println!("  {:<8} missing {}", candidate.id(), missing.join(", "));
        }
    }
    Ok(())
}

fn alloc_conf() -> Result<(), Box<dyn std::error::Error>> {
    let config = RuntimeConfig::from_env()?;
    println!("{}", config.allocator.conf_string());
    Ok(())
}

fn config() -> Result<(), Box<dyn std::error::Error>> {
    let config = RuntimeConfig::from_env()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn resolve() -> Result<(), Box<dyn std::error::Error>> {
    let config = RuntimeConfig::from_env()?;
    let resolver = polyrt::default_resolver(&config);

    let order = resolver.effective_order()?;
    println!("Candidate order:");
    for (i, candidate) in order.iter().enumerate() {
        println!("  {}. {} ({})", i + 1, candidate.id(), candidate.loader().describe());
    }
    println!();

    match resolver.resolve() {
        Ok(handle) => {
            println!("✓ Installed '{}' (version {})", handle.variant(), handle.version());
            Ok(())
        }
        Err(e @ ResolveError::NoCompatibleBackend { .. }) => {
            println!("✗ No compatible backend");
            for (id, reason) in e.skipped() {
                println!("  {:<8} {}", id, reason);
            }
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}
