use crate::grid::{ALL_DIRECTIONS, Direction, Grid, Position, Tile, flood_fill};
use crate::zobrist::Zobrist;
use std::rc::Rc;

/// A pull: the pusher stands on `player`, the box sits one step behind it
/// (against the direction), and the pull drags the box onto the pusher's
/// square while the pusher steps onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pull {
    pub player: Position,
    pub direction: Direction,
}

/// Reverse Sokoban position used by the live-square precomputation. Pull
/// legality is not the mirror image of push legality (a pull needs room for
/// the pusher beyond the box's destination), so this is a separate type from
/// the forward board, sharing only the grid substrate.
#[derive(Debug, Clone)]
pub struct ReverseBoard {
    grid: Grid,
    player: Position,
    interior: Vec<Position>,
    boxes: Vec<Position>,
    hash: u64,
    zobrist: Rc<Zobrist>,
}

impl ReverseBoard {
    /// The grid must already hold the player and box tiles.
    pub fn new(grid: Grid, player: Position, zobrist: Rc<Zobrist>) -> ReverseBoard {
        debug_assert!(grid.get(player).is_player());
        let interior = flood_fill(&grid, player, |t| !t.blocks_player());
        let boxes = grid.find(Tile::is_box);
        let hash = zobrist.hash_state(&interior, &boxes);
        ReverseBoard {
            grid,
            player,
            interior,
            boxes,
            hash,
            zobrist,
        }
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn boxes(&self) -> &[Position] {
        &self.boxes
    }

    fn is_interior(&self, pos: Position) -> bool {
        self.interior.binary_search(&pos).is_ok()
    }

    /// Every legal pull: the pusher square adjacent to a box must be
    /// reachable and the square the pusher retreats to free.
    pub fn legal_pulls(&self) -> Vec<Pull> {
        let mut pulls = Vec::new();
        for &box_pos in &self.boxes {
            for direction in ALL_DIRECTIONS {
                let Some(standing) = self.grid.step(box_pos, direction) else {
                    continue;
                };
                let Some(retreat) = self.grid.step(standing, direction) else {
                    continue;
                };
                if self.is_interior(standing) && !self.grid.get(retreat).blocks_player() {
                    pulls.push(Pull {
                        player: standing,
                        direction,
                    });
                }
            }
        }
        pulls
    }

    /// Apply a pull, returning the successor position.
    pub fn pull(&self, pull: Pull) -> ReverseBoard {
        let box_pos = self
            .grid
            .step(pull.player, pull.direction.reverse())
            .expect("pulled box out of bounds");
        let retreat = self
            .grid
            .step(pull.player, pull.direction)
            .expect("pull retreat out of bounds");

        let mut grid = self.grid.clone();

        // Vacate the pusher square
        let player_tile = grid.get(self.player);
        assert!(player_tile.is_player(), "pusher square desynchronised");
        let vacated = if player_tile == Tile::PlayerOnGoal {
            Tile::Goal
        } else {
            Tile::Floor
        };
        grid.set(self.player, vacated);

        // Box follows onto the pull square
        let pull_tile = grid.get(pull.player);
        assert!(
            pull_tile != Tile::Wall && !pull_tile.is_box(),
            "cannot pull box to {}: square blocked",
            pull.player
        );
        let occupied = if pull_tile.is_goal() {
            Tile::BoxOnGoal
        } else {
            Tile::Box
        };
        grid.set(pull.player, occupied);

        // Clear the box's old square
        let box_tile = grid.get(box_pos);
        assert!(box_tile.is_box(), "no box at {}", box_pos);
        let cleared = if box_tile == Tile::BoxOnGoal {
            Tile::Goal
        } else {
            Tile::Floor
        };
        grid.set(box_pos, cleared);

        // Pusher retreats one square
        let retreat_tile = grid.get(retreat);
        assert!(!retreat_tile.blocks_player(), "pusher retreat blocked");
        let entered = if retreat_tile.is_goal() {
            Tile::PlayerOnGoal
        } else {
            Tile::Player
        };
        grid.set(retreat, entered);

        ReverseBoard::new(grid, retreat, self.zobrist.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reverse_board(text: &str) -> ReverseBoard {
        let grid = crate::board::Board::parse(text.trim_matches('\n')).unwrap();
        let player = grid.find(Tile::is_player)[0];
        let zobrist = Rc::new(Zobrist::new(grid.width(), grid.height()));
        ReverseBoard::new(grid, player, zobrist)
    }

    #[test]
    fn test_legal_pulls() {
        // Pusher right of the box: the only pull drags the box right
        let board = reverse_board("######\n#$@ .#\n######");
        let pulls = board.legal_pulls();
        assert_eq!(
            pulls,
            vec![Pull {
                player: Position(2, 1),
                direction: Direction::Right,
            }]
        );
    }

    #[test]
    fn test_pull_moves_box_and_pusher() {
        let board = reverse_board("######\n#$@ .#\n######");
        let next = board.pull(Pull {
            player: Position(2, 1),
            direction: Direction::Right,
        });
        assert_eq!(next.boxes(), &[Position(2, 1)]);
        assert_eq!(next.grid.get(Position(1, 1)), Tile::Floor);
        assert_eq!(next.grid.get(Position(2, 1)), Tile::Box);
        assert_eq!(next.grid.get(Position(3, 1)), Tile::Player);
    }

    #[test]
    fn test_pull_needs_room_to_retreat() {
        // Pusher against the wall: no square to step back onto
        let board = reverse_board("#####\n#$@.#\n#####");
        let pulls = board.legal_pulls();
        assert_eq!(
            pulls,
            vec![Pull {
                player: Position(2, 1),
                direction: Direction::Right,
            }]
        );

        let next = board.pull(pulls[0]);
        assert!(next.legal_pulls().is_empty());
    }
}
