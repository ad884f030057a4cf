mod board;
mod deadlocks;
mod grid;
mod hungarian;
mod levels;
mod mcts;
mod reverse;
mod reward;
mod solver;
mod vanilla;
mod zobrist;

use clap::{Parser, ValueEnum};
use log::info;
use solver::{Mode, Outcome, SolveOpts};
use std::time::Instant;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EngineMode {
    /// Transposition-rewiring search
    Schoko,
    /// Plain UCT baseline
    Vanilla,
}

impl From<EngineMode> for Mode {
    fn from(mode: EngineMode) -> Self {
        match mode {
            EngineMode::Schoko => Mode::Schoko,
            EngineMode::Vanilla => Mode::Vanilla,
        }
    }
}

#[derive(Parser)]
#[command(name = "pushover")]
#[command(about = "A Monte-Carlo Sokoban solver", long_about = None)]
struct Args {
    /// Level number to solve (level_<id>.txt), or start of a range
    #[arg(value_name = "LEVEL")]
    level_id: usize,

    /// Folder containing the level files
    #[arg(value_name = "FOLDER")]
    folder: String,

    /// Optional end of level range (inclusive) for suite runs
    #[arg(value_name = "LEVEL_END")]
    level_end: Option<usize>,

    /// Number of search iterations per level
    #[arg(short = 'n', long, default_value = "100000")]
    iterations: usize,

    /// Maximum number of pushes before a line is cut off
    #[arg(long, default_value = "1000")]
    max_steps: usize,

    /// Verbosity (0 = outcome only, up to 3 = per-push board dumps)
    #[arg(short, long, default_value = "0")]
    verbose: u8,

    /// Search engine to run
    #[arg(long, value_enum, default_value = "schoko")]
    mode: EngineMode,

    /// Seed for reproducible tie-breaking
    #[arg(long)]
    seed: Option<u64>,
}

fn main() {
    let args = Args::parse();

    let filter = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    pretty_env_logger::formatted_builder()
        .filter_level(filter)
        .init();

    if args.level_id == 0 {
        eprintln!("Error: level numbers must be at least 1");
        std::process::exit(1);
    }
    let level_end = args.level_end.unwrap_or(args.level_id);
    if level_end < args.level_id {
        eprintln!("Error: level end must be >= level start");
        std::process::exit(1);
    }
    let suite = args.level_end.is_some();

    if suite {
        match levels::count_levels(&args.folder) {
            Ok(count) if level_end > count => {
                eprintln!(
                    "Error: level {} not found (folder contains {} levels)",
                    level_end, count
                );
                std::process::exit(1);
            }
            Ok(_) => {}
            Err(err) => {
                eprintln!("Error reading level folder: {}", err);
                std::process::exit(1);
            }
        }
    }

    let opts = SolveOpts {
        iterations: args.iterations,
        max_steps: args.max_steps,
        mode: args.mode.into(),
        seed: args.seed,
    };

    let mut solved = 0;
    for level_id in args.level_id..=level_end {
        let start = Instant::now();
        match solver::solve(level_id, &args.folder, &opts) {
            Ok(outcome) => {
                info!(
                    "level {} finished in {} ms",
                    level_id,
                    start.elapsed().as_millis()
                );
                if outcome == Outcome::Win {
                    solved += 1;
                }
                if suite {
                    println!("Level {}: {}.", level_id, outcome);
                } else {
                    println!("{}", outcome);
                }
            }
            Err(err) => {
                eprintln!("Error solving level {}: {}", level_id, err);
                std::process::exit(1);
            }
        }
    }

    if suite {
        info!(
            "solved {} out of {} levels",
            solved,
            level_end - args.level_id + 1
        );
    }
}
