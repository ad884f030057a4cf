use crate::board::{Board, Push};
use crate::reward::{Reward, RewardKind};
use log::trace;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

/// Exploration constants for the baseline engine.
const C_UCT: f64 = 32.0;
const D_VAR: f64 = 8.0;

type NodeId = usize;

struct Node {
    board: Board,
    parent: Option<NodeId>,
    children: BTreeMap<Push, NodeId>,
    via: Option<Push>,
    n: u64,
    q: f64,
    /// Running sum of squared rollout values, for the variance bonus.
    sum_squares: f64,
    reward: Reward,
    max_value: Reward,
}

/// Plain UCT baseline: no transposition table, cycles broken per iteration
/// by the hash trail of the selection path, exploration boosted by a
/// variance bonus.
pub struct VanillaMcts {
    arena: Vec<Option<Node>>,
    root: NodeId,
    rng: ChaCha8Rng,
}

impl VanillaMcts {
    pub fn new(board: Board, rng: ChaCha8Rng) -> VanillaMcts {
        let reward = board.reward();
        let root = Node {
            board,
            parent: None,
            children: BTreeMap::new(),
            via: None,
            n: 0,
            q: 0.0,
            sum_squares: (reward.value as f64) * (reward.value as f64),
            reward,
            max_value: reward,
        };
        VanillaMcts {
            arena: vec![Some(root)],
            root: 0,
            rng,
        }
    }

    fn node(&self, id: NodeId) -> &Node {
        self.arena[id].as_ref().expect("access to removed node")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.arena[id].as_mut().expect("access to removed node")
    }

    fn alive(&self, id: NodeId) -> bool {
        self.arena[id].is_some()
    }

    pub fn run(&mut self, iterations: usize) -> Option<Vec<Push>> {
        for i in 0..iterations {
            trace!("simulation {}", i + 1);
            let mut trail = vec![self.node(self.root).board.hash()];

            let leaf = self.select_leaf(&mut trail);
            if self.node(leaf).n == 0 {
                let reward = self.node(leaf).reward;
                self.update(leaf, reward);
            } else {
                self.expand(leaf, &trail);
                if self.alive(leaf) && !self.node(leaf).children.is_empty() {
                    let children: Vec<NodeId> =
                        self.node(leaf).children.values().copied().collect();
                    let pick = children[self.rng.gen_range(0..children.len())];
                    let reward = self.node(pick).reward;
                    self.update(pick, reward);
                }
            }

            if self.node(self.root).max_value.kind == RewardKind::Win {
                break;
            }
        }

        if self.node(self.root).max_value.kind != RewardKind::Win {
            return None;
        }
        Some(self.extract())
    }

    fn select_leaf(&mut self, trail: &mut Vec<u64>) -> NodeId {
        let mut id = self.root;
        while !self.node(id).children.is_empty() && self.node(id).reward.kind == RewardKind::Step {
            id = self.select_child(id);
            trail.push(self.node(id).board.hash());
        }
        id
    }

    fn select_child(&mut self, id: NodeId) -> NodeId {
        let children: Vec<NodeId> = self.node(id).children.values().copied().collect();

        let unvisited: Vec<NodeId> = children
            .iter()
            .copied()
            .filter(|&c| self.node(c).n == 0)
            .collect();
        if !unvisited.is_empty() {
            return unvisited[self.rng.gen_range(0..unvisited.len())];
        }

        let parent_n = self.node(id).n as f64;
        let score = |node: &Node| {
            let n = node.n as f64;
            let exploration = C_UCT * (2.0 * parent_n.ln() / n).sqrt();
            let variance = (node.sum_squares / n - node.q * node.q + D_VAR).max(0.0).sqrt();
            node.q + exploration + variance
        };

        let best = children
            .iter()
            .map(|&c| score(self.node(c)))
            .fold(f64::NEG_INFINITY, f64::max);
        let best_children: Vec<NodeId> = children
            .into_iter()
            .filter(|&c| score(self.node(c)) == best)
            .collect();
        best_children[self.rng.gen_range(0..best_children.len())]
    }

    fn update(&mut self, start: NodeId, reward: Reward) {
        let value = reward.value as f64;
        let mut id = Some(start);
        while let Some(i) = id {
            let node = self.node_mut(i);
            node.q = (node.q * node.n as f64 + value) / (node.n as f64 + 1.0);
            node.n += 1;
            node.sum_squares += value * value;
            if reward > node.max_value {
                node.max_value = reward;
            }
            id = node.parent;
        }
    }

    /// Add one child per legal push, skipping states already seen on the
    /// way down (those would loop), then sweep out loss children.
    fn expand(&mut self, v: NodeId, trail: &[u64]) {
        let pushes = self.node(v).board.legal_pushes();
        let mut seen = trail.to_vec();

        let successors: Vec<(Push, Board)> = {
            let board = &self.node(v).board;
            pushes.iter().map(|&m| (m, board.push(m))).collect()
        };

        for (m, child_board) in successors {
            let hash = child_board.hash();
            if seen.contains(&hash) {
                continue;
            }
            seen.push(hash);

            let reward = child_board.reward();
            let id = self.arena.len();
            self.arena.push(Some(Node {
                board: child_board,
                parent: Some(v),
                children: BTreeMap::new(),
                via: Some(m),
                n: 0,
                q: 0.0,
                sum_squares: (reward.value as f64) * (reward.value as f64),
                reward,
                max_value: reward,
            }));
            self.node_mut(v).children.insert(m, id);
        }

        for m in &pushes {
            if !self.alive(v) {
                break;
            }
            let Some(&child) = self.node(v).children.get(m) else {
                continue;
            };
            if self.node(child).reward.kind == RewardKind::Loss {
                self.remove(child);
            }
        }
    }

    /// Detach a childless node; parents left childless go with it. The
    /// root is never detached -- a childless root just gets re-expanded.
    fn remove(&mut self, id: NodeId) {
        debug_assert!(self.node(id).children.is_empty());
        if id == self.root {
            return;
        }
        let parent = self.node(id).parent;
        let via = self.node(id).via;
        self.arena[id] = None;

        if let (Some(p), Some(m)) = (parent, via) {
            self.node_mut(p).children.remove(&m);
            if self.node(p).children.is_empty() && self.node(p).reward.kind != RewardKind::Win {
                self.remove(p);
            }
        }
    }

    fn extract(&mut self) -> Vec<Push> {
        let mut moves = Vec::new();
        let mut id = self.root;
        while !self.node(id).children.is_empty() {
            let children: Vec<(Push, NodeId)> = self
                .node(id)
                .children
                .iter()
                .map(|(&m, &c)| (m, c))
                .collect();
            let best = children
                .iter()
                .map(|&(_, c)| self.node(c).max_value)
                .max()
                .expect("non-empty children");
            let best_children: Vec<(Push, NodeId)> = children
                .into_iter()
                .filter(|&(_, c)| self.node(c).max_value == best)
                .collect();
            let (m, c) = best_children[self.rng.gen_range(0..best_children.len())];
            moves.push(m);
            id = c;
        }
        moves
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Direction, Position};
    use rand::SeedableRng;

    fn new_vanilla(text: &str) -> VanillaMcts {
        let board = Board::from_text(text.trim_matches('\n'), 1000).unwrap();
        VanillaMcts::new(board, ChaCha8Rng::seed_from_u64(11))
    }

    #[test]
    fn test_trivial_win() {
        let mut mcts = new_vanilla("###\n#@$.");
        let moves = mcts.run(100).expect("one push wins this level");
        assert_eq!(
            moves,
            vec![Push {
                player: Position(1, 1),
                direction: Direction::Right,
            }]
        );
    }

    #[test]
    fn test_loss_children_are_pruned() {
        // The only push corners the box; the loss child is swept each time
        // and no win is ever reported
        let mut mcts = new_vanilla("######\n#.@$ #\n######");
        assert_eq!(mcts.run(50), None);
    }

    #[test]
    fn test_solves_corridor() {
        let mut mcts = new_vanilla("#######\n#@$  .#\n#######");
        let moves = mcts.run(2000).expect("corridor level is solvable");
        let mut board = Board::from_text("#######\n#@$  .#\n#######", 1000).unwrap();
        for m in &moves {
            board = board.push(*m);
        }
        assert_eq!(board.reward().kind, RewardKind::Win);
    }
}
