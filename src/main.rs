use anyhow::Result;
use clap::Parser;
use gmail_triage::cli::{self, Cli, Commands};
use gmail_triage::config::Config;
use gmail_triage::error::TriageError;
use gmail_triage::poller::Poller;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Exit with proper code on error
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        eprintln!("\nFor help, run: gmail-triage --help");
        process::exit(1);
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_triage=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gmail_triage=info,warn"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run() -> Result<()> {
    // Install default crypto provider for rustls
    // On non-Windows platforms, use aws-lc-rs; on Windows, use ring (no NASM/CMake required)
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    match &cli.command {
        Commands::Start { interval_ms } => {
            let config = Config::load(&cli.config).await?;
            let interval_ms = interval_ms.unwrap_or(config.poll.interval_ms);
            if interval_ms < 100 {
                return Err(TriageError::ConfigError(format!(
                    "--interval-ms must be at least 100, got {}",
                    interval_ms
                ))
                .into());
            }

            let orchestrator = Arc::new(cli::build_orchestrator(&cli, &config).await?);
            let poller = Poller::new(orchestrator, Duration::from_millis(interval_ms))
                .allow_overlap(config.poll.allow_overlap)
                .spawn();

            tokio::signal::ctrl_c().await?;
            tracing::info!("Interrupt received, stopping");
            poller.shutdown().await;

            Ok(())
        }

        Commands::Once => {
            let config = Config::load(&cli.config).await?;
            let orchestrator = cli::build_orchestrator(&cli, &config).await?;

            let report = orchestrator.run_cycle().await;
            print!("{}", cli::format_report(&report));

            Ok(())
        }

        Commands::Auth { force } => {
            tracing::info!("Authenticating with Gmail API...");

            if let Some(parent) = cli.token_cache.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            if *force && cli.token_cache.exists() {
                tokio::fs::remove_file(&cli.token_cache).await?;
                tracing::info!("Removed existing token cache");
            }

            // Triggers the OAuth flow if no usable token is cached
            let (hub, _) =
                gmail_triage::auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache)
                    .await?;

            println!("Successfully authenticated with Gmail API");
            println!("Token cached at: {:?}", cli.token_cache);

            // Scope must be given explicitly to avoid triggering another OAuth flow
            let (_, profile) = hub
                .users()
                .get_profile("me")
                .add_scope(gmail_triage::auth::MODIFY_SCOPE)
                .doit()
                .await
                .map_err(TriageError::from)?;
            println!(
                "Connected to account: {}",
                profile.email_address.unwrap_or_default()
            );

            Ok(())
        }

        Commands::InitConfig { output, force } => {
            if output.exists() && !force {
                return Err(TriageError::ConfigError(format!(
                    "Configuration file already exists at {:?}. Use --force to overwrite.",
                    output
                ))
                .into());
            }

            Config::create_example(output).await?;

            println!("Created example configuration file at: {:?}", output);
            println!("\nKey settings to review:");
            println!("  - poll.interval_ms: How often to check for unread mail");
            println!("  - poll.batch_size: Maximum messages handled per cycle");
            println!("  - classification.mode: 'gemini' or 'keywords'");
            println!("  - replies.*: Reply text sent for each category");

            Ok(())
        }
    }
}
