use crate::board::Board;
use crate::grid::{ALL_DIRECTIONS, Direction, Grid, Position, Tile};
use crate::reverse::ReverseBoard;
use crate::zobrist::Zobrist;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::{fmt, fs, io};

/// Level-wide mask of live squares: a square is live when a box placed there,
/// alone on the board, can still be brought onto some goal. Shared read-only
/// by every board of the level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlockMask {
    width: usize,
    height: usize,
    live: Vec<u8>,
}

impl DeadlockMask {
    fn new(width: usize, height: usize) -> DeadlockMask {
        DeadlockMask {
            width,
            height,
            live: vec![0; width * height],
        }
    }

    pub fn is_live(&self, pos: Position) -> bool {
        self.live[pos.y() * self.width + pos.x()] != 0
    }

    fn mark(&mut self, pos: Position) {
        self.live[pos.y() * self.width + pos.x()] = 1;
    }

    /// A persisted mask is only usable for a grid of the same shape.
    pub fn matches(&self, grid: &Grid) -> bool {
        self.width == grid.width()
            && self.height == grid.height()
            && self.live.len() == self.width * self.height
    }
}

#[derive(Debug)]
pub enum MaskError {
    Io(io::Error),
    Format(serde_json::Error),
}

impl fmt::Display for MaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaskError::Io(err) => write!(f, "IO error: {}", err),
            MaskError::Format(err) => write!(f, "Invalid mask file: {}", err),
        }
    }
}

impl From<io::Error> for MaskError {
    fn from(err: io::Error) -> Self {
        MaskError::Io(err)
    }
}

impl From<serde_json::Error> for MaskError {
    fn from(err: serde_json::Error) -> Self {
        MaskError::Format(err)
    }
}

pub fn mask_path(folder: &str, level_id: usize) -> PathBuf {
    Path::new("deadlock_detection")
        .join(folder)
        .join(format!("level_{}.json", level_id))
}

pub fn save(mask: &DeadlockMask, path: &Path) -> Result<(), MaskError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string(mask)?)?;
    Ok(())
}

pub fn load(path: &Path) -> Result<DeadlockMask, MaskError> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

/// Load the cached mask for a level, recomputing and persisting it when the
/// file is missing, unreadable, or stale for the grid's shape.
pub fn ensure(folder: &str, level_id: usize, grid: &Grid) -> Result<DeadlockMask, MaskError> {
    let path = mask_path(folder, level_id);
    if let Ok(mask) = load(&path) {
        if mask.matches(grid) {
            return Ok(mask);
        }
    }
    info!("computing live squares for level {} in {}", level_id, folder);
    let mask = compute_live_squares(grid);
    save(&mask, &path)?;
    Ok(mask)
}

/// Walls kept, every other square reduced to bare floor.
fn cleared(grid: &Grid) -> Grid {
    let mut out = Grid::filled(grid.width(), grid.height(), Tile::Floor);
    for pos in grid.find(|t| t == Tile::Wall) {
        out.set(pos, Tile::Wall);
    }
    out
}

/// Reverse-simulate from every goal: place a lone box on the goal with the
/// pusher on each adjacent side in turn, then breadth-first search over pull
/// moves, marking every square the box ever occupies. The union over all
/// goals and sides is the live-square mask.
pub fn compute_live_squares(grid: &Grid) -> DeadlockMask {
    let cleared = cleared(grid);
    let goals = grid.find(Tile::is_goal);
    let zobrist = Rc::new(Zobrist::new(grid.width(), grid.height()));

    let mut mask = DeadlockMask::new(grid.width(), grid.height());
    let mut seen: HashSet<u64> = HashSet::new();

    for &goal in &goals {
        // A goal is a place a box can rest even if no pull ever leaves it
        mask.mark(goal);

        for direction in ALL_DIRECTIONS {
            let Some(player) = cleared.step(goal, direction) else {
                continue;
            };
            if cleared.get(player) == Tile::Wall {
                continue;
            }

            let mut start = cleared.clone();
            start.set(goal, Tile::Box);
            start.set(player, Tile::Player);
            let board = ReverseBoard::new(start, player, zobrist.clone());
            if !seen.insert(board.hash()) {
                continue;
            }

            let mut queue = VecDeque::from([board]);
            while let Some(board) = queue.pop_front() {
                for &pos in board.boxes() {
                    mask.mark(pos);
                }
                for pull in board.legal_pulls() {
                    let next = board.pull(pull);
                    if seen.insert(next.hash()) {
                        queue.push_back(next);
                    }
                }
            }
        }
    }

    mask
}

/// Runtime structural checks. Sound with respect to the push-only move
/// model: a position flagged here can never reach a win.
pub fn check_deadlock(board: &Board) -> bool {
    if board.legal_pushes().is_empty() {
        return true;
    }
    if masked_deadlock(board) {
        return true;
    }
    if wall_deadlock(board.grid()) {
        return true;
    }
    frozen_deadlock(board)
}

/// A box parked on a square the precomputation never reached can never
/// score. Boxes already on goals are on live squares by construction.
fn masked_deadlock(board: &Board) -> bool {
    board
        .boxes()
        .iter()
        .any(|&pos| board.grid().get(pos) == Tile::Box && !board.deadlocks().is_live(pos))
}

/// From each grid edge, the first row or column holding any non-wall square
/// is a strip boxes can never leave once pushed against it. More plain
/// boxes than open goals in that strip means one of them is stranded.
fn wall_deadlock(grid: &Grid) -> bool {
    let row_overloaded =
        |y: usize| strip_overloaded((0..grid.width()).map(|x| grid.get(Position(x as u8, y as u8))));
    let col_overloaded = |x: usize| {
        strip_overloaded((0..grid.height()).map(|y| grid.get(Position(x as u8, y as u8))))
    };

    for y in 0..grid.height() {
        match row_overloaded(y) {
            Some(overloaded) => {
                if overloaded {
                    return true;
                }
                break;
            }
            None => continue,
        }
    }
    for y in (0..grid.height()).rev() {
        match row_overloaded(y) {
            Some(overloaded) => {
                if overloaded {
                    return true;
                }
                break;
            }
            None => continue,
        }
    }
    for x in 0..grid.width() {
        match col_overloaded(x) {
            Some(overloaded) => {
                if overloaded {
                    return true;
                }
                break;
            }
            None => continue,
        }
    }
    for x in (0..grid.width()).rev() {
        match col_overloaded(x) {
            Some(overloaded) => {
                if overloaded {
                    return true;
                }
                break;
            }
            None => continue,
        }
    }
    false
}

/// None when the strip is all wall; otherwise whether plain boxes outnumber
/// open goals (box-on-goal squares cancel out of both counts).
fn strip_overloaded(tiles: impl Iterator<Item = Tile>) -> Option<bool> {
    let mut any_open = false;
    let mut boxes = 0usize;
    let mut goals = 0usize;
    for tile in tiles {
        if tile != Tile::Wall {
            any_open = true;
        }
        match tile {
            Tile::Box => boxes += 1,
            Tile::Goal | Tile::PlayerOnGoal => goals += 1,
            _ => {}
        }
    }
    any_open.then_some(boxes > goals)
}

/// Pairwise freeze analysis. A box is locked along an axis when either
/// neighbour is a wall, both neighbours are dead squares, or a neighbouring
/// box is locked along the perpendicular axis. Starting from everything
/// locked and relaxing to a fixed point keeps mutually supporting clusters
/// (for instance a 2x2 block) locked. Any box locked on both axes and not
/// on a goal is stuck forever.
fn frozen_deadlock(board: &Board) -> bool {
    let grid = board.grid();
    let boxes = board.boxes();
    let box_index = |pos: Position| boxes.binary_search(&pos).ok();

    let mut v_locked = vec![true; boxes.len()];
    let mut h_locked = vec![true; boxes.len()];

    let axis_locked = |pos: Position, dirs: [Direction; 2], perp_locked: &[bool]| -> bool {
        let tile = |d: Direction| grid.step(pos, d).map(|p| grid.get(p));
        let wall = |d: Direction| tile(d).is_none_or(|t| t == Tile::Wall);
        let dead = |d: Direction| {
            grid.step(pos, d)
                .is_none_or(|p| !board.deadlocks().is_live(p))
        };
        let locked_box = |d: Direction| {
            grid.step(pos, d)
                .and_then(|p| box_index(p))
                .is_some_and(|i| perp_locked[i])
        };
        let [a, b] = dirs;
        wall(a)
            || wall(b)
            || (dead(a) && dead(b))
            || locked_box(a)
            || locked_box(b)
    };

    loop {
        let mut changed = false;
        for (i, &pos) in boxes.iter().enumerate() {
            let v = axis_locked(pos, [Direction::Up, Direction::Down], &h_locked);
            let h = axis_locked(pos, [Direction::Left, Direction::Right], &v_locked);
            if v != v_locked[i] {
                v_locked[i] = v;
                changed = true;
            }
            if h != h_locked[i] {
                h_locked[i] = h;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    boxes
        .iter()
        .enumerate()
        .any(|(i, &pos)| v_locked[i] && h_locked[i] && !grid.get(pos).is_goal())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reward::RewardKind;

    fn parse_board(text: &str) -> Board {
        Board::from_text(text.trim_matches('\n'), 1000).unwrap()
    }

    #[test]
    fn test_every_goal_is_live() {
        let board = parse_board(
            r#"
####
# .#
#  ###
#*@  #
#  $ #
#  ###
####
"#,
        );
        for goal in board.grid().find(Tile::is_goal) {
            assert!(board.deadlocks().is_live(goal), "goal {} not live", goal);
        }
    }

    #[test]
    fn test_corner_is_dead() {
        let board = parse_board(
            r#"
#####
#   #
# $.#
#@  #
#####
"#,
        );
        // A box in the top-left corner can never be pulled back out
        assert!(!board.deadlocks().is_live(Position(1, 1)));
        assert!(board.deadlocks().is_live(Position(2, 2)));
    }

    #[test]
    fn test_mask_round_trip() {
        let grid = Board::parse("#####\n#@$.#\n#####").unwrap();
        let mask = compute_live_squares(&grid);

        let dir = std::env::temp_dir().join("pushover-mask-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("level_1.json");
        save(&mask, &path).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(mask, loaded);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_ensure_regenerates_stale_mask() {
        let grid = Board::parse("#####\n#@$.#\n#####").unwrap();
        let other = Board::parse("######\n#@$ .#\n######").unwrap();
        let mask = compute_live_squares(&grid);
        assert!(mask.matches(&grid));
        assert!(!mask.matches(&other));
    }

    #[test]
    fn test_wall_deadlock_detection() {
        // Box against the top wall with no goal in that row
        let board = parse_board("#####\n#$@ #\n# . #\n#####");
        assert!(wall_deadlock(board.grid()));

        // Goal in the same strip keeps it balanced
        let board = parse_board("#####\n# $.#\n# @ #\n#####");
        assert!(!wall_deadlock(board.grid()));
    }

    #[test]
    fn test_frozen_block_cluster() {
        // A 2x2 block of boxes in open space: no wall touches any of them,
        // yet every push lands on another box, so the four lock each other.
        let board = parse_board(
            r#"
########
#      #
# $$ ..#
# $$ ..#
#@     #
########
"#,
        );
        assert!(frozen_deadlock(&board));
    }

    #[test]
    fn test_open_boxes_are_not_frozen() {
        let board = parse_board(
            r#"
######
#    #
# $$ #
# .. #
# @  #
######
"#,
        );
        assert!(!frozen_deadlock(&board));
    }

    #[test]
    fn test_no_pushes_is_loss() {
        // Box wedged in the corner before the pusher can reach any side
        let board = parse_board("####\n#@$#\n##.#\n####");
        assert!(board.legal_pushes().is_empty());
        assert_eq!(board.reward().kind, RewardKind::Loss);
    }
}
