//! chaosengine - main entry point.

use chaosengine::cli::{Cli, Commands};
use chaosengine::config::EngineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Run { dev } => {
            let mut config = load_config(&cli.config, dev)?;
            if let Some(level) = cli.log_level {
                config.observability.log_level = level;
            }
            if let Some(addr) = cli.admin_addr {
                config.admin.bind_addr = addr;
            }
            if cli.json_logs {
                config.observability.json_logs = true;
            }

            chaosengine::observability::init(&config.observability)?;
            chaosengine::run(config).await?;
        }

        Commands::CheckConfig => {
            let config = load_config(&cli.config, false)?;
            config.validate()?;
            println!("Configuration OK");
            println!("  platforms: {}", config.platforms.len());
            for platform in &config.platforms {
                println!(
                    "    {} (probability {}, {} instances)",
                    platform.name, platform.destruction_probability, platform.instances
                );
            }
            println!(
                "  cycle interval: {:?}, finalization after: {:?}, self-healing every: {:?}",
                config.experiments.cycle_interval,
                config.experiments.time_before_finalization,
                config.experiments.minimum_self_healing_interval
            );
            println!("  calendar suppression: {}", config.calendar.enabled);
        }

        Commands::Version => {
            println!("chaosengine {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn load_config(path: &Option<std::path::PathBuf>, dev: bool) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::from_file(path)?),
        None if dev => Ok(EngineConfig::development()),
        None => Ok(EngineConfig::default()),
    }
}
