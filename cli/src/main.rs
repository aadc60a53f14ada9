//! Roundtable consensus scenario runner
//!
//! Generates a seeded agent pool, then runs a number of deliberation
//! scenarios against it, printing a finalization summary per scenario.
//! Exits zero only when every scenario finalizes cleanly.

use anyhow::{Context, Result};
use clap::Parser;
use roundtable_consensus_core_rs::automaton::{AgentPool, PoolAgent};
use roundtable_consensus_core_rs::engine::snapshot::StateSnapshot;
use roundtable_consensus_core_rs::sink::{EventSink, LogEntry, MemorySink};
use roundtable_consensus_core_rs::{
    GlobalConfig, Issue, Roundtable, RngManager, RunConfig, SignalHandler,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, info};

/// Round table consensus simulation.
#[derive(Debug, Parser)]
#[command(name = "roundtable", version, about)]
struct Args {
    /// Number of simulation scenarios to run
    #[arg(long, default_value_t = 2)]
    max_scenarios: usize,

    /// Seed for agent pool generation
    #[arg(long, default_value_t = 1113)]
    pool_seed: u64,

    /// Seed for per-scenario run configuration
    #[arg(long, default_value_t = 1719)]
    run_seed: u64,

    /// Number of agents selected for each scenario
    #[arg(long, default_value_t = 5)]
    num_agents: usize,

    /// Custom simulation id (default: random UUID)
    #[arg(long)]
    sim_id: Option<String>,

    /// Increase verbosity (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode: only the final summary
    #[arg(short, long)]
    quiet: bool,

    /// Write the structured event stream as JSON lines to this file
    #[arg(long)]
    events_out: Option<PathBuf>,
}

/// Event sink that appends every entry as one JSON line.
///
/// Snapshots are deliberately not persisted here; they are bulky and the
/// event stream plus seeds is enough to reproduce any run.
struct JsonlSink {
    writer: BufWriter<File>,
}

impl JsonlSink {
    fn create(path: &PathBuf) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("cannot create event file {}", path.display()))?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl EventSink for JsonlSink {
    fn emit(&mut self, entry: LogEntry) {
        if let Ok(line) = serde_json::to_string(&entry) {
            let _ = writeln!(self.writer, "{}", line);
        }
    }

    fn save_snapshot(&mut self, _snapshot: StateSnapshot) {}
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .init();

    let sim_id = args
        .sim_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    info!(
        sim_id = %sim_id,
        pool_seed = args.pool_seed,
        run_seed = args.run_seed,
        max_scenarios = args.max_scenarios,
        num_agents = args.num_agents,
        "starting round table consensus simulation"
    );

    // Pool is 3-5x larger than the selection so the seeded draw matters.
    let mut pool_rng = RngManager::new(args.pool_seed);
    let min_pool = (args.num_agents * 3).max(6);
    let max_pool = (args.num_agents * 5).min(49).max(min_pool + 1);
    let pool_size = pool_rng.range(min_pool as i64, max_pool as i64) as usize;
    let pool = AgentPool::generate(args.pool_seed, pool_size);
    info!(pool_size, "generated agent pool");

    let mut jsonl = match &args.events_out {
        Some(path) => Some(JsonlSink::create(path)?),
        None => None,
    };

    for scenario in 0..args.max_scenarios {
        let scenario_seed = args.run_seed + scenario as u64;
        if !args.quiet {
            println!(
                "Running scenario {}/{} (seed {})",
                scenario + 1,
                args.max_scenarios,
                scenario_seed
            );
        }

        let mut scenario_rng = RngManager::new(scenario_seed);
        let revision_cycles = scenario_rng.range(1, 4) as usize;
        let staking_rounds = scenario_rng.range(5, 8) as usize;
        let global = GlobalConfig::standard(revision_cycles, staking_rounds);

        let selected = pool.select(args.num_agents, scenario_seed);
        let issue_id = format!("Issue_{}", scenario_seed);
        let issue = Issue::new(
            &issue_id,
            "Decide how the group allocates its shared capacity next cycle.",
            "Recurring deliberation over a single contested resource.",
        );

        let run = RunConfig {
            seed: scenario_seed,
            issue_id: issue_id.clone(),
            agent_ids: selected.iter().map(|a| a.agent_id.clone()).collect(),
            initial_balances: selected
                .iter()
                .map(|a| (a.agent_id.clone(), a.initial_balance))
                .collect(),
        };

        debug!(?revision_cycles, ?staking_rounds, "scenario config");
        match &mut jsonl {
            Some(sink) => run_scenario(&global, run, issue, &selected, sink, args.quiet)?,
            None => {
                let mut sink = MemorySink::new();
                run_scenario(&global, run, issue, &selected, &mut sink, args.quiet)?;
            }
        }
    }

    println!("=== Simulation Summary ===");
    println!("Simulation ID: {}", sim_id);
    println!("Agent Pool: {} agents", pool_size);
    println!("Scenarios Completed: {}", args.max_scenarios);
    println!("Agents per Scenario: {}", args.num_agents);
    println!(
        "Seeds Used: Pool={}, Run={}",
        args.pool_seed, args.run_seed
    );
    Ok(())
}

/// Run one scenario to completion and print its finalization report.
fn run_scenario<S: EventSink>(
    global: &GlobalConfig,
    run: RunConfig,
    issue: Issue,
    selected: &[PoolAgent],
    sink: &mut S,
    quiet: bool,
) -> Result<()> {
    let issue_id = run.issue_id.clone();
    let agents: Vec<Box<dyn SignalHandler>> = selected
        .iter()
        .map(|a| Box::new(a.to_actor()) as Box<dyn SignalHandler>)
        .collect();

    let mut engine = Roundtable::new(global.clone(), run, issue, agents, ForwardSink(sink))
        .with_context(|| format!("configuring engine for {}", issue_id))?;
    let summary = engine
        .run()
        .with_context(|| format!("running consensus for {}", issue_id))?;

    if !quiet {
        print_finalization(&engine, &summary.issue_id);
        println!("  Completed in {} ticks across {} phases", summary.total_ticks, summary.phases_executed.len());
    }
    Ok(())
}

/// Borrowing adapter so one sink can serve several engine runs.
struct ForwardSink<'a, S: EventSink>(&'a mut S);

impl<'a, S: EventSink> EventSink for ForwardSink<'a, S> {
    fn emit(&mut self, entry: LogEntry) {
        self.0.emit(entry);
    }

    fn save_snapshot(&mut self, snapshot: StateSnapshot) {
        self.0.save_snapshot(snapshot);
    }
}

/// Human-readable ranking of every weighted proposal.
fn print_finalization<S: EventSink>(engine: &Roundtable<S>, issue_id: &str) {
    println!("=== Consensus Finalization - {} ===", issue_id);
    let Some(outcome) = engine.finalization() else {
        println!("  No finalization recorded");
        return;
    };

    if outcome.rankings.is_empty() {
        println!("  No proposals received any conviction stakes");
        return;
    }

    for (rank, (proposal_id, weight)) in outcome.rankings.iter().enumerate() {
        let marker = if Some(*proposal_id) == outcome.winner_proposal_id {
            "WINNER"
        } else {
            "      "
        };
        let label = describe_proposal(engine, *proposal_id);
        println!(
            "  #{} {} {:<28} effective: {:>8.2} CP  raw: {:>6} CP  contributors: {}",
            rank + 1,
            marker,
            label,
            weight.effective,
            weight.raw,
            weight.contributor_count
        );
    }
    println!("  Consensus reached at tick {}", outcome.tick);
}

fn describe_proposal<S: EventSink>(engine: &Roundtable<S>, proposal_id: u64) -> String {
    if proposal_id == 0 {
        return "#0 (system, no action)".to_string();
    }
    engine
        .state()
        .current_issue
        .as_ref()
        .and_then(|issue| issue.proposal(proposal_id))
        .map(|p| format!("#{} ({}, rev{})", proposal_id, p.author, p.revision_number))
        .unwrap_or_else(|| format!("#{}", proposal_id))
}
