use clap::Parser;
use wick_engine::cli::{Cli, Commands};
use wick_engine::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
        eprintln!("Using default configuration");
        toml::from_str(include_str!("../config.toml.example")).expect("Invalid default config")
    });

    // Initialize telemetry
    wick_engine::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!("Starting wick engine");
            args.execute(config).await?;
        }
        Commands::Status => {
            let path = config.storage.output_dir.join("engine_status.json");
            match std::fs::read_to_string(&path) {
                Ok(raw) => println!("{}", raw),
                Err(e) => println!("No status snapshot at {} ({})", path.display(), e),
            }
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  Feed: {} {:?}", config.feed.ws_url, config.feed.symbols);
            println!(
                "  Bars: {}s | capture ratio {} | alert ratio {}",
                config.engine.bar_interval_secs,
                config.engine.capture_ratio,
                config.engine.alert_ratio
            );
            println!(
                "  Storage: {} (rotate at {} MB)",
                config.storage.output_dir.display(),
                config.storage.file_rotation_mb
            );
            println!(
                "  Alerts: {}",
                config
                    .alert
                    .as_ref()
                    .map(|a| format!("webhook set, cooldown {}s", a.cooldown_secs))
                    .unwrap_or_else(|| "disabled".to_string())
            );
        }
    }

    Ok(())
}
