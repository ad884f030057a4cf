use crate::board::Board;
use crate::deadlocks::{self, MaskError};
use crate::grid::Tile;
use crate::levels::{self, LevelError};
use crate::mcts::Mcts;
use crate::reward::RewardKind;
use crate::vanilla::VanillaMcts;
use log::{debug, info, trace};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::fmt;
use std::rc::Rc;

/// Final verdict of a solve: WIN when every box ends on a goal, LOSS for
/// everything else (deadlocked, exhausted, or unsolvable).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Loss,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Win => write!(f, "WIN"),
            Outcome::Loss => write!(f, "LOSS"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Transposition-rewiring engine.
    Schoko,
    /// Plain UCT baseline.
    Vanilla,
}

pub struct SolveOpts {
    pub iterations: usize,
    pub max_steps: usize,
    pub mode: Mode,
    pub seed: Option<u64>,
}

#[derive(Debug)]
pub enum SolveError {
    Level(LevelError),
    Mask(MaskError),
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveError::Level(err) => err.fmt(f),
            SolveError::Mask(err) => err.fmt(f),
        }
    }
}

impl From<LevelError> for SolveError {
    fn from(err: LevelError) -> Self {
        SolveError::Level(err)
    }
}

impl From<MaskError> for SolveError {
    fn from(err: MaskError) -> Self {
        SolveError::Mask(err)
    }
}

/// Load a level, make sure its live-square mask exists on disk, run the
/// search, and replay the returned pushes to classify the outcome.
pub fn solve(level_id: usize, folder: &str, opts: &SolveOpts) -> Result<Outcome, SolveError> {
    let grid = levels::load_grid(folder, level_id)?;
    let mask = Rc::new(deadlocks::ensure(folder, level_id, &grid)?);
    let board = Board::from_grid(grid, opts.max_steps, mask);
    debug!("level {}:\n{}", level_id, board);

    let rng = match opts.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };

    let moves = match opts.mode {
        Mode::Schoko => Mcts::new(board.clone(), rng).run(opts.iterations),
        Mode::Vanilla => VanillaMcts::new(board.clone(), rng).run(opts.iterations),
    };

    let Some(moves) = moves else {
        return Ok(Outcome::Loss);
    };
    info!("level {}: search returned {} pushes", level_id, moves.len());

    let mut board = board;
    for push in moves {
        board = board.push(push);
        trace!("{}:\n{}", push, board);
        let reward = board.reward();
        if reward.kind != RewardKind::Step {
            return Ok(classify(&board, reward.kind));
        }
    }
    // An empty line means the root was already terminal
    let kind = board.reward().kind;
    Ok(classify(&board, kind))
}

fn classify(board: &Board, kind: RewardKind) -> Outcome {
    if kind == RewardKind::Win {
        assert!(
            board.grid().find(|t| t == Tile::Box).is_empty(),
            "win reported with a box off its goal"
        );
        Outcome::Win
    } else {
        Outcome::Loss
    }
}
