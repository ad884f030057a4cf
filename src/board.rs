use crate::deadlocks::{self, DeadlockMask};
use crate::grid::{ALL_DIRECTIONS, Direction, Grid, MAX_SIZE, Position, Tile, flood_fill};
use crate::hungarian::min_cost_matching;
use crate::reward::{Reward, RewardKind};
use crate::zobrist::Zobrist;
use std::fmt;
use std::rc::Rc;

pub const MAX_BOXES: usize = 64;

/// A push: the square the pusher stands on and the direction of the shove.
/// The box sits one step ahead of the pusher, its destination two steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Push {
    pub player: Position,
    pub direction: Direction,
}

impl fmt::Display for Push {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Push {} {}", self.player, self.direction)
    }
}

/// Immutable Sokoban position. Boards are never mutated after construction
/// (the search relies on stable node state); `push` returns a fresh board
/// with the move applied.
///
/// Two boards with the same box layout and the same pusher-reachable zone
/// carry the same hash and are the same state as far as the search goes.
#[derive(Debug, Clone)]
pub struct Board {
    grid: Grid,
    player: Position,
    interior: Vec<Position>,
    boxes: Vec<Position>,
    /// Goal squares of the level; static, shared by every derived board.
    goals: Rc<Vec<Position>>,
    hash: u64,
    steps: usize,
    max_steps: usize,
    deadlocks: Rc<DeadlockMask>,
    zobrist: Rc<Zobrist>,
}

impl Board {
    /// Parse a Sokoban level from text format.
    ///
    /// Characters:
    /// - `#` = Wall
    /// - ` ` = Floor (empty space)
    /// - `.` = Goal (target location for boxes)
    /// - `$` = Box
    /// - `@` = Player
    /// - `*` = Box on goal
    /// - `+` = Player on goal
    ///
    /// Lines may differ in length; the grid is as wide as the longest line
    /// and short lines are padded with walls. Runs of floor at the left of a
    /// row before the first wall are ragged-input artefacts and become walls.
    pub fn parse(text: &str) -> Result<Grid, String> {
        let lines: Vec<&str> = text.lines().collect();

        if lines.is_empty() {
            return Err("Empty level".to_string());
        }

        let height = lines.len();
        let width = lines.iter().map(|line| line.len()).max().unwrap_or(0);

        if width == 0 {
            return Err("Empty level".to_string());
        }
        if width > MAX_SIZE {
            return Err(format!(
                "Level width {} exceeds maximum size {}",
                width, MAX_SIZE
            ));
        }
        if height > MAX_SIZE {
            return Err(format!(
                "Level height {} exceeds maximum size {}",
                height, MAX_SIZE
            ));
        }

        let mut grid = Grid::filled(width, height, Tile::Wall);
        for (y, line) in lines.iter().enumerate() {
            for (x, ch) in line.chars().enumerate() {
                let tile = Tile::from_char(ch).ok_or_else(|| {
                    format!("Invalid character '{}' at position ({}, {})", ch, x, y)
                })?;
                grid.set(Position(x as u8, y as u8), tile);
            }
        }

        // Leading floor on a row lies outside the walls
        for y in 0..height {
            for x in 0..width {
                let pos = Position(x as u8, y as u8);
                if grid.get(pos) == Tile::Floor {
                    grid.set(pos, Tile::Wall);
                } else {
                    break;
                }
            }
        }

        let players = grid.find(Tile::is_player).len();
        if players == 0 {
            return Err("No player found in level".to_string());
        }
        if players > 1 {
            return Err("Multiple players found".to_string());
        }

        let boxes = grid.find(Tile::is_box).len();
        let goals = grid.find(Tile::is_goal).len();
        if boxes != goals {
            return Err(format!(
                "Goal count ({}) does not match box count ({})",
                goals, boxes
            ));
        }
        if boxes > MAX_BOXES {
            return Err(format!(
                "Box count {} exceeds maximum {}",
                boxes, MAX_BOXES
            ));
        }

        Ok(grid)
    }

    /// Build the root board for a parsed level grid.
    pub fn from_grid(grid: Grid, max_steps: usize, deadlocks: Rc<DeadlockMask>) -> Board {
        let player = grid.find(Tile::is_player)[0];
        let goals = Rc::new(grid.find(Tile::is_goal));
        let zobrist = Rc::new(Zobrist::new(grid.width(), grid.height()));
        Board::derive(grid, player, 0, max_steps, goals, deadlocks, zobrist)
    }

    /// Parse a level and compute its live-square mask in memory.
    pub fn from_text(text: &str, max_steps: usize) -> Result<Board, String> {
        let grid = Board::parse(text)?;
        let mask = Rc::new(deadlocks::compute_live_squares(&grid));
        Ok(Board::from_grid(grid, max_steps, mask))
    }

    fn derive(
        grid: Grid,
        player: Position,
        steps: usize,
        max_steps: usize,
        goals: Rc<Vec<Position>>,
        deadlocks: Rc<DeadlockMask>,
        zobrist: Rc<Zobrist>,
    ) -> Board {
        let interior = flood_fill(&grid, player, |t| !t.blocks_player());
        let boxes = grid.find(Tile::is_box);
        let hash = zobrist.hash_state(&interior, &boxes);
        Board {
            grid,
            player,
            interior,
            boxes,
            goals,
            hash,
            steps,
            max_steps,
            deadlocks,
            zobrist,
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    #[allow(dead_code)]
    pub fn player(&self) -> Position {
        self.player
    }

    pub fn boxes(&self) -> &[Position] {
        &self.boxes
    }

    #[allow(dead_code)]
    pub fn interior(&self) -> &[Position] {
        &self.interior
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    #[allow(dead_code)]
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn deadlocks(&self) -> &DeadlockMask {
        &self.deadlocks
    }

    pub fn is_interior(&self, pos: Position) -> bool {
        self.interior.binary_search(&pos).is_ok()
    }

    /// The search rewrites a node's depth when a shorter path to it is found.
    pub(crate) fn set_steps(&mut self, steps: usize) {
        self.steps = steps;
    }

    /// Every legal push in this position: the pusher square must be
    /// reachable and the square behind the box free.
    pub fn legal_pushes(&self) -> Vec<Push> {
        let mut pushes = Vec::new();
        for &box_pos in &self.boxes {
            for direction in ALL_DIRECTIONS {
                let Some(standing) = self.grid.step(box_pos, direction.reverse()) else {
                    continue;
                };
                let Some(dest) = self.grid.step(box_pos, direction) else {
                    continue;
                };
                if self.is_interior(standing) && !self.grid.get(dest).is_box()
                    && self.grid.get(dest) != Tile::Wall
                {
                    pushes.push(Push {
                        player: standing,
                        direction,
                    });
                }
            }
        }
        pushes
    }

    /// Apply a push, returning the successor board. The push must come from
    /// `legal_pushes`; anything else is an internal error.
    pub fn push(&self, push: Push) -> Board {
        debug_assert!(
            self.legal_pushes().contains(&push),
            "illegal push {} in\n{}",
            push,
            self
        );

        let box_pos = self
            .grid
            .step(push.player, push.direction)
            .expect("pushed box out of bounds");
        let dest = self
            .grid
            .step(box_pos, push.direction)
            .expect("push destination out of bounds");

        let mut grid = self.grid.clone();

        // Vacate the pusher square
        let player_tile = grid.get(self.player);
        assert!(
            player_tile.is_player(),
            "pusher square {} desynchronised",
            self.player
        );
        let vacated = if player_tile == Tile::PlayerOnGoal {
            Tile::Goal
        } else {
            Tile::Floor
        };
        grid.set(self.player, vacated);

        // Box slides onto the destination
        let dest_tile = grid.get(dest);
        assert!(
            dest_tile != Tile::Wall && !dest_tile.is_box(),
            "cannot push box to {}: destination blocked",
            dest
        );
        let occupied = if dest_tile.is_goal() {
            Tile::BoxOnGoal
        } else {
            Tile::Box
        };
        grid.set(dest, occupied);

        // Pusher takes the box's old square
        let box_tile = grid.get(box_pos);
        assert!(box_tile.is_box(), "no box at {}", box_pos);
        let entered = if box_tile == Tile::BoxOnGoal {
            Tile::PlayerOnGoal
        } else {
            Tile::Player
        };
        grid.set(box_pos, entered);

        let next = Board::derive(
            grid,
            box_pos,
            self.steps + 1,
            self.max_steps,
            self.goals.clone(),
            self.deadlocks.clone(),
            self.zobrist.clone(),
        );
        debug_assert_eq!(next.boxes.len(), self.boxes.len());
        debug_assert_eq!(
            next.grid.find(Tile::is_goal).len(),
            self.grid.find(Tile::is_goal).len()
        );
        debug_assert_eq!(next.grid.find(Tile::is_player).len(), 1);
        next
    }

    /// Static evaluation: the negated minimum-cost matching between the
    /// unplaced boxes and the open goals, tagged WIN when every box sits on
    /// a goal and LOSS when the position is dead or over the push budget.
    /// Both matching sides come from the tracked box and goal lists, not a
    /// grid scan.
    pub fn reward(&self) -> Reward {
        let unplaced: Vec<Position> = self
            .boxes
            .iter()
            .copied()
            .filter(|&pos| self.grid.get(pos) == Tile::Box)
            .collect();
        let open_goals: Vec<Position> = self
            .goals
            .iter()
            .copied()
            .filter(|&pos| matches!(self.grid.get(pos), Tile::Goal | Tile::PlayerOnGoal))
            .collect();
        let value = -(min_cost_matching(&unplaced, &open_goals) as i32);

        let kind = if unplaced.is_empty() {
            RewardKind::Win
        } else if deadlocks::check_deadlock(self) || self.steps > self.max_steps {
            RewardKind::Loss
        } else {
            RewardKind::Step
        };
        Reward::new(value, kind)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.grid.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn parse_board(text: &str) -> Board {
        Board::from_text(text.trim_matches('\n'), 1000).unwrap()
    }

    fn push_at(board: &Board, x: u8, y: u8, direction: Direction) -> Push {
        let push = Push {
            player: Position(x, y),
            direction,
        };
        assert!(
            board.legal_pushes().contains(&push),
            "push {} not legal in\n{}",
            push,
            board
        );
        push
    }

    #[test]
    fn test_parse_basic_level() {
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
        assert_eq!(board.grid().width(), 6);
        assert_eq!(board.grid().height(), 7);
        assert_eq!(board.player(), Position(2, 3));
        assert_eq!(board.boxes(), &[Position(1, 3), Position(3, 4)]);
    }

    #[test]
    fn test_parse_no_player() {
        assert!(Board::parse("####\n#  #\n####").is_err());
    }

    #[test]
    fn test_parse_multiple_players() {
        assert!(Board::parse("####\n#@@#\n####").is_err());
    }

    #[test]
    fn test_parse_bad_glyph() {
        assert!(Board::parse("####\n#@x#\n####").is_err());
    }

    #[test]
    fn test_parse_count_mismatch() {
        assert!(Board::parse("#####\n#@$ #\n#####").is_err());
        assert!(Board::parse("#####\n#@..#\n# $ #\n#####").is_err());
    }

    #[test]
    fn test_parse_normalises_ragged_input() {
        let grid = Board::parse("  ###\n### @#\n#.$  #\n######").unwrap();
        // Leading floor runs become wall
        assert_eq!(grid.get(Position(0, 0)), Tile::Wall);
        assert_eq!(grid.get(Position(1, 0)), Tile::Wall);
        // Short first line is padded with wall on the right
        assert_eq!(grid.get(Position(5, 0)), Tile::Wall);
    }

    #[test]
    fn test_display_round_trip() {
        let text = "####\n# .#\n#  ###\n#*@  #\n#  $ #\n#  ###\n####";
        let board = parse_board(text);
        assert_eq!(board.to_string().trim_end(), text);
    }

    #[test]
    fn test_push_onto_goal_wins() {
        let board = parse_board("#####\n#@$.#\n#####");
        let next = board.push(push_at(&board, 1, 1, Direction::Right));

        assert_eq!(next.grid().get(Position(3, 1)), Tile::BoxOnGoal);
        assert_eq!(next.grid().get(Position(2, 1)), Tile::Player);
        assert_eq!(next.grid().get(Position(1, 1)), Tile::Floor);
        assert_eq!(next.player(), Position(2, 1));
        assert_eq!(next.steps(), 1);
        assert_eq!(next.reward().kind, RewardKind::Win);
    }

    #[test]
    fn test_push_all_directions() {
        let board = parse_board("#####\n# . #\n# $ #\n# @ #\n#####");
        let up = board.push(push_at(&board, 2, 3, Direction::Up));
        assert_eq!(up.grid().get(Position(2, 1)), Tile::BoxOnGoal);
        assert_eq!(up.player(), Position(2, 2));

        let board = parse_board("#####\n# @ #\n# $ #\n# . #\n#####");
        let down = board.push(push_at(&board, 2, 1, Direction::Down));
        assert_eq!(down.grid().get(Position(2, 3)), Tile::BoxOnGoal);

        let board = parse_board("#####\n#.$@#\n#####");
        let left = board.push(push_at(&board, 3, 1, Direction::Left));
        assert_eq!(left.grid().get(Position(1, 1)), Tile::BoxOnGoal);

        let board = parse_board("#####\n#@$.#\n#####");
        let right = board.push(push_at(&board, 1, 1, Direction::Right));
        assert_eq!(right.grid().get(Position(3, 1)), Tile::BoxOnGoal);
    }

    #[test]
    fn test_push_goal_transitions() {
        // Off a goal onto floor
        let board = parse_board("######\n#@*  #\n#   .#\n# $  #\n######");
        let next = board.push(push_at(&board, 1, 1, Direction::Right));
        assert_eq!(next.grid().get(Position(2, 1)), Tile::PlayerOnGoal);
        assert_eq!(next.grid().get(Position(3, 1)), Tile::Box);
    }

    #[test]
    fn test_push_conserves_counts() {
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
        let boxes = board.boxes().len();
        let goals = board.grid().find(Tile::is_goal).len();
        for push in board.legal_pushes() {
            let next = board.push(push);
            assert_eq!(next.boxes().len(), boxes);
            assert_eq!(next.grid().find(Tile::is_goal).len(), goals);
            assert_eq!(next.grid().find(Tile::is_player).len(), 1);
        }
    }

    #[test]
    fn test_legal_pushes() {
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
        let actual: HashSet<Push> = board.legal_pushes().into_iter().collect();
        let expected = HashSet::from([
            // Box on goal at (1, 3) can go up or down
            Push {
                player: Position(1, 4),
                direction: Direction::Up,
            },
            Push {
                player: Position(1, 2),
                direction: Direction::Down,
            },
            // Box at (3, 4) can go left or right
            Push {
                player: Position(4, 4),
                direction: Direction::Left,
            },
            Push {
                player: Position(2, 4),
                direction: Direction::Right,
            },
        ]);
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_hash_collapses_pusher_zone() {
        // Same box layout, two pusher squares in the same reachable zone
        let a = parse_board("########\n#@  $ .#\n########");
        let b = parse_board("########\n# @ $ .#\n########");
        assert_eq!(a.hash(), b.hash());

        // Pusher on the far side of the box is a different zone
        let c = parse_board("########\n#   $@.#\n########");
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn test_hash_depends_on_boxes() {
        let a = parse_board("########\n#@ $  .#\n########");
        let pushed = a.push(push_at(&a, 2, 1, Direction::Right));
        assert_ne!(a.hash(), pushed.hash());
    }

    #[test]
    fn test_step_budget_exhaustion_is_loss() {
        let board = Board::from_text("########\n#@$  . #\n########", 0).unwrap();
        let next = board.push(push_at(&board, 1, 1, Direction::Right));
        assert_eq!(next.reward().kind, RewardKind::Loss);
    }

    #[test]
    fn test_reward_value_is_negated_matching() {
        let board = parse_board("########\n#@$  . #\n########");
        // Box at (2, 1), goal at (5, 1): matching of 3
        assert_eq!(board.reward().value, -3);
        assert_eq!(board.reward().kind, RewardKind::Step);
    }
}
