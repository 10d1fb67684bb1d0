//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::RelayBlueprint;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    dispatch: DispatchInfo,
    modes: ModesInfo,
    identity_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    identities: Vec<String>,
    sources: Vec<SourceInfo>,
    destination_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    destinations: Vec<DestinationInfo>,
}

#[derive(Serialize)]
struct DispatchInfo {
    pacing_ms: u64,
    join_before_send: bool,
    cooldown: String,
    fixed_cooldown_secs: u64,
}

#[derive(Serialize)]
struct ModesInfo {
    relay_rate_limit: String,
    recent_capacity: usize,
    max_concurrent_events: usize,
    batch_tick_secs: u64,
    batch_fetch_limit: usize,
    batch_require_marker: bool,
    batch_rate_limit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_post: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_interval_minutes: Option<u64>,
}

#[derive(Serialize)]
struct SourceInfo {
    feed: String,
    seeded_items: usize,
}

#[derive(Serialize)]
struct DestinationInfo {
    link: String,
    interval_minutes: u32,
    batch_size: u32,
    send_mode: String,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn build_config_info(blueprint: &RelayBlueprint, args: &InfoArgs) -> ConfigInfo {
    let identities = if args.identities {
        blueprint
            .identities
            .iter()
            .map(|i| i.handle.clone())
            .collect()
    } else {
        Vec::new()
    };

    let destinations = if args.destinations {
        blueprint
            .destinations
            .iter()
            .map(|d| DestinationInfo {
                link: d.link.clone(),
                interval_minutes: d.interval_minutes,
                batch_size: d.batch_size,
                send_mode: format!("{:?}", d.send_mode),
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        dispatch: DispatchInfo {
            pacing_ms: blueprint.dispatch.pacing_ms,
            join_before_send: blueprint.dispatch.join_before_send,
            cooldown: format!("{:?}", blueprint.dispatch.cooldown),
            fixed_cooldown_secs: blueprint.dispatch.fixed_cooldown_secs,
        },
        modes: ModesInfo {
            relay_rate_limit: format!("{:?}", blueprint.relay.rate_limit),
            recent_capacity: blueprint.relay.recent_capacity,
            max_concurrent_events: blueprint.relay.max_concurrent_events,
            batch_tick_secs: blueprint.batch.tick_secs,
            batch_fetch_limit: blueprint.batch.fetch_limit,
            batch_require_marker: blueprint.batch.require_marker,
            batch_rate_limit: format!("{:?}", blueprint.batch.rate_limit),
            refresh_post: blueprint.refresh.as_ref().map(|r| r.post.clone()),
            refresh_interval_minutes: blueprint.refresh.as_ref().map(|r| r.interval_minutes),
        },
        identity_count: blueprint.identities.len(),
        identities,
        sources: blueprint
            .sources
            .iter()
            .map(|s| SourceInfo {
                feed: s.feed.to_string(),
                seeded_items: s.items.len(),
            })
            .collect(),
        destination_count: blueprint.destinations.len(),
        destinations,
    }
}

fn print_config_info(blueprint: &RelayBlueprint, args: &InfoArgs) {
    println!("=== Relay Configuration ===\n");

    let dispatch = &blueprint.dispatch;
    println!("Dispatch");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Pacing: {} ms", dispatch.pacing_ms);
    println!("   ├─ Join before send: {}", dispatch.join_before_send);
    println!(
        "   └─ Cooldown: {:?} (fixed {}s)",
        dispatch.cooldown, dispatch.fixed_cooldown_secs
    );

    println!("\nModes");
    println!(
        "   ├─ Relay: recent {} / concurrency {} / {:?}",
        blueprint.relay.recent_capacity, blueprint.relay.max_concurrent_events, blueprint.relay.rate_limit
    );
    println!(
        "   ├─ Batch: every {}s, fetch {}, marker required: {}, {:?}",
        blueprint.batch.tick_secs,
        blueprint.batch.fetch_limit,
        blueprint.batch.require_marker,
        blueprint.batch.rate_limit
    );
    match &blueprint.refresh {
        Some(refresh) => println!(
            "   └─ Refresh: {} every {} min, {:?}",
            refresh.post, refresh.interval_minutes, refresh.rate_limit
        ),
        None => println!("   └─ Refresh: (not configured)"),
    }

    println!("\nIdentities ({})", blueprint.identities.len());
    if args.identities {
        print_tree(blueprint.identities.iter().map(|i| i.handle.clone()));
    }

    println!("\nSources ({})", blueprint.sources.len());
    print_tree(
        blueprint
            .sources
            .iter()
            .map(|s| format!("{} ({} seeded items)", s.feed, s.items.len())),
    );

    println!("\nDestinations ({})", blueprint.destinations.len());
    if args.destinations {
        print_tree(blueprint.destinations.iter().map(|d| {
            format!(
                "{} every {} min, batch {}, {:?}",
                d.link, d.interval_minutes, d.batch_size, d.send_mode
            )
        }));
    }

    println!();
}

fn print_tree(lines: impl ExactSizeIterator<Item = String>) {
    let total = lines.len();
    for (i, line) in lines.enumerate() {
        let prefix = if i + 1 == total { "└─" } else { "├─" };
        println!("   {} {}", prefix, line);
    }
}
