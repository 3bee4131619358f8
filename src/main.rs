//! # Segue - Playback Continuity Engine
//!
//! Decides what plays next from listening history and content embeddings,
//! and keeps track of what is loaded and playing.
//!
//! ## Usage
//!
//! ```bash
//! # What would play after items 12 and 40?
//! segue suggest --catalog library.db --history 12,40
//!
//! # Auto-advance through three tracks on a simulated device
//! segue simulate --catalog library.json --tracks 3
//!
//! # Inspect the persisted history
//! segue history show
//! ```

use anyhow::{bail, Result};
use clap::{CommandFactory, Parser};
use log::{debug, info};
use segue::catalog::{Catalog, ItemId};
use segue::cli::{self, HistoryAction};
use segue::completion;
use segue::config::{PlayerConfig, RuntimeConfig};
use segue::db;
use segue::device::{DeviceEvent, DeviceEventKind};
use segue::error::Notice;
use segue::history::HistoryRing;
use segue::player::{Action, Notification, Player};
use segue::selector::Selector;
use segue::session::{self, LogSink, Session};
use segue::simulator::SimulatedDevice;
use segue::store::{Snapshot, SnapshotStore, SqliteStore, SNAPSHOT_KEY};
use std::path::Path;

/// Main entry point for Segue.
///
/// # Logging
///
/// Initializes environment logger which can be controlled via `RUST_LOG`:
/// - `RUST_LOG=debug segue simulate -c lib.db` - Enable debug logging
/// - `RUST_LOG=segue::selector=trace segue suggest -c lib.db` - Per-candidate scores
fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();

    let mut runtime = RuntimeConfig::new()?;
    if let Some(path) = args.state_db {
        runtime.state_db_path = path;
    }
    debug!("Runtime configuration: {runtime:?}");

    match args.command {
        cli::Command::Suggest {
            catalog,
            history,
            anchor,
            count,
            seed,
        } => {
            suggest(&runtime, &catalog, history, anchor, count, seed)?;
        }
        cli::Command::Simulate {
            catalog,
            tracks,
            time_scale,
            seed,
            fresh,
        } => {
            simulate(&runtime, &catalog, tracks, time_scale, seed, fresh)?;
        }
        cli::Command::History { action } => history(&runtime, action)?,
        cli::Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(completion::shell_to_completion_shell(shell), &mut cmd);
        }
        cli::Command::CompleteItems { catalog } => {
            // completion must stay silent on errors
            if let Ok(catalog) = db::open_catalog(&catalog, &runtime.player.storage_root) {
                completion::print_item_completions(&catalog);
            }
        }
    }

    Ok(())
}

fn player_config(runtime: &RuntimeConfig, seed: Option<u64>) -> PlayerConfig {
    PlayerConfig {
        seed: seed.or(runtime.player.seed),
        ..runtime.player.clone()
    }
}

/// Print the best next items for a history.
fn suggest(
    runtime: &RuntimeConfig,
    catalog_path: &Path,
    history: Option<Vec<i64>>,
    anchor: Option<i64>,
    count: usize,
    seed: Option<u64>,
) -> Result<()> {
    let catalog = db::open_catalog(catalog_path, &runtime.player.storage_root)?;
    let config = player_config(runtime, seed);

    // without explicit ids, continue from the persisted session
    let (raw_history, raw_anchor) = match history {
        Some(ids) => (ids, anchor),
        None => {
            let store = SqliteStore::open(&runtime.state_db_path)?;
            let snapshot = Snapshot::load(&store)?.unwrap_or_default();
            let mut ids = snapshot.history;
            ids.extend(snapshot.current);
            (ids, anchor.or(snapshot.current))
        }
    };

    let ring = HistoryRing::from_ids(
        raw_history
            .into_iter()
            .filter_map(ItemId::from_raw)
            .filter(|&id| catalog.contains(id)),
        config.history_size,
    );
    let anchor = raw_anchor.and_then(ItemId::from_raw);

    let mut selector = match config.seed {
        Some(seed) => Selector::seeded(seed, config.policy),
        None => Selector::from_entropy(config.policy),
    };
    let ranked = selector.rank(
        catalog.items(),
        |id| catalog.is_playable(id),
        &ring,
        &catalog,
        anchor,
        count,
    );

    if ranked.is_empty() {
        bail!("No playable items in {}", catalog_path.display());
    }

    println!("Next up (history of {} items):", ring.len());
    for (rank, scored) in ranked.iter().enumerate() {
        let track = catalog.track_info(scored.id);
        println!(
            "{:>3}. {:<8} {:>7.3}  {} - {}",
            rank + 1,
            scored.id.to_string(),
            scored.score,
            track.title,
            track.artist
        );
    }

    Ok(())
}

/// Run a session on the simulated device until `tracks` items have ended.
fn simulate(
    runtime: &RuntimeConfig,
    catalog_path: &Path,
    tracks: usize,
    time_scale: f64,
    seed: Option<u64>,
    fresh: bool,
) -> Result<()> {
    if tracks == 0 {
        bail!("Nothing to simulate: --tracks must be at least 1");
    }

    let catalog: Catalog = db::open_catalog(catalog_path, &runtime.player.storage_root)?;
    let mut store = SqliteStore::open(&runtime.state_db_path)?;
    let config = player_config(runtime, seed);

    let (handle, inbox) = session::mailbox();
    let device = SimulatedDevice::new(handle.clone())
        .with_time_scale(time_scale)
        .with_lengths_from(&catalog);
    let mut session = Session::new(Player::new(&config), catalog, device, inbox).with_sink(Box::new(LogSink));

    if !fresh {
        if let Some(snapshot) = Snapshot::load(&store)? {
            info!("Resuming from saved snapshot");
            session.restore(&snapshot);
        }
    }
    handle.send(Action::TogglePlayback);

    let mut finished = 0;
    while let Some((action, report)) = session.next_dispatch() {
        for notification in &report.notifications {
            if let Notification::TrackChanged(track) = notification {
                println!("> {} - {} ({})", track.title, track.artist, track.id);
            }
        }

        if report.notice == Some(Notice::NoCandidate) {
            println!("Nothing left to play");
            break;
        }

        let ended = matches!(
            action,
            Action::Device(DeviceEvent {
                kind: DeviceEventKind::Ended,
                ..
            })
        );
        if ended && report.notice.is_none() {
            finished += 1;
            if finished >= tracks {
                break;
            }
        }
    }

    let snapshot = session.snapshot();
    snapshot.save(&mut store)?;
    println!(
        "Played {finished} track(s); {} item(s) in history",
        snapshot.history.len()
    );

    Ok(())
}

/// Show or clear the persisted snapshot.
fn history(runtime: &RuntimeConfig, action: HistoryAction) -> Result<()> {
    let mut store = SqliteStore::open(&runtime.state_db_path)?;

    match action {
        HistoryAction::Show => {
            let Some(snapshot) = Snapshot::load(&store)? else {
                println!("No saved session");
                return Ok(());
            };
            match snapshot.current {
                Some(current) => println!("Current: #{current} at {:.1}s", snapshot.position),
                None => println!("Current: none"),
            }
            println!("History ({} items, newest first):", snapshot.history.len());
            for id in snapshot.history.iter().rev() {
                println!("  #{id}");
            }
        }
        HistoryAction::Clear => {
            store.remove(SNAPSHOT_KEY)?;
            println!("Cleared saved session");
        }
    }

    Ok(())
}
