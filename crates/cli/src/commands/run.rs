//! `run` command implementation.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use contracts::{RefreshSettings, RelayBlueprint};
use scheduler::{shutdown_channel, ShutdownTrigger};

use crate::cli::{RunArgs, RunMode};
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    apply_overrides(&mut blueprint, args);
    config_loader::ConfigLoader::validate(&blueprint)
        .context("Configuration invalid after command-line overrides")?;

    info!(
        mode = args.mode.as_str(),
        identities = blueprint.identities.len(),
        sources = blueprint.sources.len(),
        destinations = blueprint.destinations.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint, args.mode);
        return Ok(());
    }

    let post = match args.mode {
        RunMode::Once => args
            .post
            .clone()
            .or_else(|| blueprint.refresh.as_ref().map(|r| r.post.clone())),
        _ => None,
    };

    let pipeline = Pipeline::new(PipelineConfig {
        blueprint,
        mode: args.mode,
        post,
        seed: args.seed,
        buffer_size: args.buffer_size,
        metrics_port: (args.metrics_port != 0).then_some(args.metrics_port),
    });

    let (trigger, signal) = shutdown_channel();
    let trigger = Arc::new(trigger);
    tokio::spawn(watch_os_signals(Arc::clone(&trigger)));
    if args.timeout > 0 {
        tokio::spawn(trigger_after(
            Arc::clone(&trigger),
            Duration::from_secs(args.timeout),
        ));
    }

    info!("Starting {} mode...", args.mode.as_str());
    let stats = pipeline
        .run(signal)
        .await
        .context("Pipeline execution failed")?;
    stats.print_summary();

    info!("Relay finished");
    Ok(())
}

/// Command-line values win over the file
fn apply_overrides(blueprint: &mut RelayBlueprint, args: &RunArgs) {
    if let Some(tick_secs) = args.tick_secs {
        info!(tick_secs, "Overriding batch tick period from CLI");
        blueprint.batch.tick_secs = tick_secs;
    }
    if let Some(pacing_ms) = args.pacing_ms {
        info!(pacing_ms, "Overriding dispatch pacing from CLI");
        blueprint.dispatch.pacing_ms = pacing_ms;
        if let Some(refresh) = blueprint.refresh.as_mut() {
            refresh.pacing_ms = pacing_ms;
        }
    }
    if args.mode == RunMode::Refresh {
        if let Some(post) = &args.post {
            info!(post = %post, "Overriding refresh post from CLI");
            match blueprint.refresh.as_mut() {
                Some(refresh) => refresh.post = post.clone(),
                None => blueprint.refresh = Some(RefreshSettings::for_post(post.clone())),
            }
        }
    }
}

/// Trigger shutdown on Ctrl+C or SIGTERM
async fn watch_os_signals(trigger: Arc<ShutdownTrigger>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    warn!("Received shutdown signal, finishing in-flight sends...");
    trigger.trigger();
}

async fn trigger_after(trigger: Arc<ShutdownTrigger>, timeout: Duration) {
    tokio::time::sleep(timeout).await;
    info!(timeout_secs = timeout.as_secs(), "Run timeout reached");
    trigger.trigger();
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &RelayBlueprint, mode: RunMode) {
    println!("\n=== Configuration Summary ===\n");
    println!("Mode: {}", mode.as_str());
    println!(
        "Dispatch: pacing {} ms, join before send: {}, cooldown: {:?}",
        blueprint.dispatch.pacing_ms, blueprint.dispatch.join_before_send, blueprint.dispatch.cooldown
    );

    println!("\nIdentities ({}):", blueprint.identities.len());
    for identity in &blueprint.identities {
        println!("  - {}", identity.handle);
    }

    println!("\nSources ({}):", blueprint.sources.len());
    for source in &blueprint.sources {
        println!("  - {} ({} seeded items)", source.feed, source.items.len());
    }

    println!("\nDestinations ({}):", blueprint.destinations.len());
    for destination in &blueprint.destinations {
        println!(
            "  - {} every {} min, batch {}, {:?}",
            destination.link, destination.interval_minutes, destination.batch_size, destination.send_mode
        );
    }

    if let Some(refresh) = &blueprint.refresh {
        println!("\nRefresh:");
        println!("  Post: {}", refresh.post);
        println!("  Interval: {} min", refresh.interval_minutes);
    }

    println!();
}
