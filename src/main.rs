//! Guild War - command line entry point
//!
//! `simulate` plays a seeded two-guild war from declaration to archive on a
//! manual clock and prints a JSON summary. `check-config` validates a config
//! file.

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use guild_war::archive::{FileArchiveStore, JsonlJournal};
use guild_war::core::clock::{Clock, ManualClock, SystemClock};
use guild_war::core::config::WarConfig;
use guild_war::core::error::Result;
use guild_war::core::types::{Actor, GuildId, MemberId, TerritoryId};
use guild_war::directory::{
    ChannelSettlement, GuildDirectory, InMemoryDirectory, SettlementEvent, SettlementSink,
    WebhookSettlement,
};
use guild_war::war::manager::chacha_rng_factory;
use guild_war::war::WarManager;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tokio::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(name = "guild-war")]
#[command(about = "Guild territory warfare engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a complete seeded war and print a JSON summary
    Simulate {
        /// TOML config; defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Random seed for deterministic runs
        #[arg(long)]
        seed: Option<u64>,

        /// Registered members per guild
        #[arg(long, default_value_t = 12)]
        members: usize,

        /// Actions attempted during the active phase
        #[arg(long, default_value_t = 300)]
        actions: u32,

        /// Where archives and the event journal are written
        #[arg(long)]
        archive_dir: Option<PathBuf>,

        /// POST settlement events to this URL instead of counting them locally
        #[arg(long)]
        settlement_webhook: Option<String>,
    },

    /// Load and validate a config file
    CheckConfig {
        path: PathBuf,
    },
}

#[derive(Serialize)]
struct SimulationSummary {
    war_id: String,
    seed: u64,
    winner: Option<GuildId>,
    scores: std::collections::BTreeMap<GuildId, u64>,
    accepted_actions: u32,
    rejected_actions: std::collections::BTreeMap<String, u32>,
    settlement_events: usize,
    archive_path: PathBuf,
    statistics: guild_war::war::WarStatistics,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("guild_war=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::CheckConfig { path } => {
            let config = WarConfig::load(&path)?;
            println!(
                "{} is valid: {} territories, {}s war, {}s cooldown",
                path.display(),
                config.map.territory_count(),
                config.timing.war_duration_secs,
                config.timing.cooldown_secs
            );
            Ok(())
        }
        Command::Simulate {
            config,
            seed,
            members,
            actions,
            archive_dir,
            settlement_webhook,
        } => {
            let mut config = match config {
                Some(path) => WarConfig::load(path)?,
                None => WarConfig::default(),
            };
            let seed = seed.or(config.seed).unwrap_or_else(rand::random);
            config.seed = Some(seed);
            let archive_dir = archive_dir.unwrap_or_else(|| PathBuf::from(&config.archive.directory));

            // Webhook settlement posts from tasks on this runtime
            let rt = Runtime::new()?;
            let summary = {
                let _enter = rt.enter();
                simulate(config, members, actions, archive_dir, settlement_webhook)?
            };
            rt.shutdown_timeout(Duration::from_secs(2));

            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}

/// Forces the simulator commits, from the minimum up to six times it
fn attack_force_range(min: u32) -> RangeInclusive<u32> {
    min..=min.saturating_mul(6)
}

fn simulate(
    config: WarConfig,
    members: usize,
    actions: u32,
    archive_dir: PathBuf,
    settlement_webhook: Option<String>,
) -> Result<SimulationSummary> {
    let seed = config.seed.unwrap_or_default();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let red_guild = GuildId(1);
    let blue_guild = GuildId(2);

    let directory = Arc::new(InMemoryDirectory::new());
    let guild_level = config.registry.min_guild_level.max(1);
    let roster_size = members.max(config.registry.min_active_members);
    let member_level = config.registry.min_member_level;
    directory.seed_guild(red_guild, "Crimson Pact", guild_level, roster_size, member_level);
    directory.seed_guild(blue_guild, "Azure Watch", guild_level, roster_size, member_level);

    let (channel, mut settled) = ChannelSettlement::channel();
    let settlement: Arc<dyn SettlementSink> = match settlement_webhook {
        Some(url) => Arc::new(WebhookSettlement::new(url)?),
        None => Arc::new(channel),
    };

    let clock = Arc::new(ManualClock::new(SystemClock.now_ms()));
    let archives = Arc::new(FileArchiveStore::new(&archive_dir)?);
    let journal = Arc::new(JsonlJournal::new(archive_dir.join("journal"))?);
    let timing = config.timing.clone();
    let manager = WarManager::builder(config.clone(), directory.clone(), directory.clone())
        .clock(clock.clone())
        .journal(journal)
        .archive_store(archives)
        .settlement(settlement)
        .rng_factory(chacha_rng_factory(Some(seed)))
        .build()?;

    tracing::info!(seed, "simulation starting");

    let red_leader = Actor::new(MemberId(red_guild.0 * 1000 + 1), red_guild);
    let blue_leader = Actor::new(MemberId(blue_guild.0 * 1000 + 1), blue_guild);
    let war = manager.declare(red_leader, blue_guild)?;

    let mut fighters = Vec::new();
    for leader in [red_leader, blue_leader] {
        let roster = directory.guild(leader.guild_id)?.roster;
        for member_id in roster.into_iter().take(members.min(config.registry.max_participants)) {
            manager.register(war.id, leader, member_id)?;
            fighters.push(Actor::new(member_id, leader.guild_id));
        }
    }

    clock.set(war.prep_ends_at);
    manager.tick(clock.now_ms());
    let snapshot = manager.snapshot(war.id)?;
    let (start, end) = match (snapshot.war.start_time, snapshot.war.end_time) {
        (Some(start), Some(end)) => (start, end),
        _ => {
            return Err(guild_war::WarError::InvalidStateTransition(
                "war did not become active".into(),
            ))
        }
    };
    let territory_count = snapshot.territories.len() as u32;
    let step = (end - start) / (actions as u64 + 1);

    let mut accepted = 0;
    let mut rejected = std::collections::BTreeMap::new();
    for _ in 0..actions {
        clock.advance(step);
        // Pays holding income as the simulated war progresses
        manager.tick(clock.now_ms());
        let Some(&actor) = fighters.choose(&mut rng) else {
            break;
        };
        let territory = TerritoryId(rng.gen_range(0..territory_count.max(1)));
        let roll: f64 = rng.gen();
        let result = if roll < 0.6 {
            let force = rng.gen_range(attack_force_range(config.combat.min_attack_force));
            manager.attack(war.id, actor, territory, force).map(|_| ())
        } else if roll < 0.85 {
            manager
                .reinforce(war.id, actor, territory, rng.gen_range(10..=120))
                .map(|_| ())
        } else if roll < 0.97 {
            let victims: Vec<&Actor> = fighters.iter().filter(|f| f.guild_id != actor.guild_id).collect();
            match victims.choose(&mut rng) {
                Some(victim) => manager.report_kill(war.id, actor, victim.member_id).map(|_| ()),
                None => Ok(()),
            }
        } else {
            manager
                .report_boss_defeat(war.id, actor, "Ashen Wyrm")
                .map(|_| ())
        };
        match result {
            Ok(()) => accepted += 1,
            Err(e) => *rejected.entry(e.code().to_string()).or_insert(0) += 1,
        }
    }

    clock.set(end);
    let report = manager.tick(clock.now_ms());
    tracing::info!(concluded = report.concluded.len(), archived = report.archived.len(), "war ended");
    if timing.auto_archive_after_secs.is_none() {
        manager.archive(war.id)?;
    } else if let Some(delay) = timing.auto_archive_after_ms() {
        clock.advance(delay);
        manager.tick(clock.now_ms());
    }

    let final_state = manager.snapshot(war.id)?;
    let mut settlement_events = 0;
    while let Ok(event) = settled.try_recv() {
        if let SettlementEvent::WarResult { winner, .. } = &event {
            tracing::info!(winner = ?winner, "war result settled");
        }
        settlement_events += 1;
    }

    Ok(SimulationSummary {
        war_id: war.id.to_string(),
        seed,
        winner: final_state.war.winner,
        scores: final_state.war.scores,
        accepted_actions: accepted,
        rejected_actions: rejected,
        settlement_events,
        archive_path: archive_dir.join(format!("{}.json", war.id)),
        statistics: final_state.war.statistics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attack_force_range_saturates() {
        assert_eq!(attack_force_range(50), 50..=300);
        assert_eq!(attack_force_range(u32::MAX / 2), u32::MAX / 2..=u32::MAX);
        assert_eq!(attack_force_range(u32::MAX), u32::MAX..=u32::MAX);
    }
}
