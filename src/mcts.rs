use crate::board::{Board, Push};
use crate::reward::{Reward, RewardKind};
use log::trace;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Constant balancing exploration and exploitation.
const C_UCT: f64 = 8.0;

type NodeId = usize;

/// Tree node wrapping one board state. Parents are non-owning ids into the
/// slab; the child map owns the edges. Children are kept in an ordered map
/// so iteration, and with it seeded tie-breaking, is deterministic.
struct Node {
    board: Board,
    parent: Option<NodeId>,
    children: BTreeMap<Push, NodeId>,
    /// The push that led here; absent at the root.
    via: Option<Push>,
    depth: usize,
    /// Number of rollouts that passed through the node.
    n: u64,
    /// Mean value over those rollouts.
    q: f64,
    /// Static reward of the node's own board.
    reward: Reward,
    /// Best reward ever backed up through this subtree.
    max_value: Reward,
}

/// Best-first search over push-states with transposition-aware rewiring.
/// One live node per canonical state hash; states proven dead are
/// blacklisted in `del_nodes` and never re-entered.
pub struct Mcts {
    arena: Vec<Option<Node>>,
    nodes: HashMap<u64, NodeId>,
    del_nodes: HashSet<u64>,
    root: NodeId,
    root_hash: u64,
    c: f64,
    rng: ChaCha8Rng,
}

impl Mcts {
    pub fn new(board: Board, rng: ChaCha8Rng) -> Mcts {
        let reward = board.reward();
        let root_hash = board.hash();
        let root = Node {
            board,
            parent: None,
            children: BTreeMap::new(),
            via: None,
            depth: 0,
            n: 0,
            q: 0.0,
            reward,
            max_value: reward,
        };
        Mcts {
            arena: vec![Some(root)],
            nodes: HashMap::from([(root_hash, 0)]),
            del_nodes: HashSet::new(),
            root: 0,
            root_hash,
            c: C_UCT,
            rng,
        }
    }

    fn node(&self, id: NodeId) -> &Node {
        self.arena[id].as_ref().expect("access to retired node")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.arena[id].as_mut().expect("access to retired node")
    }

    fn alive(&self, id: NodeId) -> bool {
        self.arena[id].is_some()
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        self.arena.push(Some(node));
        self.arena.len() - 1
    }

    /// Run up to `iterations` simulations. Returns the winning push
    /// sequence, or None when no win was found or the root was retired.
    pub fn run(&mut self, iterations: usize) -> Option<Vec<Push>> {
        for i in 0..iterations {
            if self.del_nodes.contains(&self.root_hash) {
                // Retiring the root proves the level unsolvable from here
                return None;
            }
            trace!(
                "simulation {}: {} nodes, {} retired",
                i + 1,
                self.nodes.len(),
                self.del_nodes.len()
            );

            let leaf = self.select_leaf();
            if self.node(leaf).n == 0 {
                let reward = self.node(leaf).reward;
                self.update(leaf, reward);
            } else {
                self.expand(leaf);
                // Expansion may have retired the node when every child
                // turned out dead
                if self.alive(leaf) && !self.node(leaf).children.is_empty() {
                    let children: Vec<NodeId> = self.node(leaf).children.values().copied().collect();
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

    /// Descend from the root while the node is expanded and non-terminal.
    fn select_leaf(&mut self) -> NodeId {
        let mut id = self.root;
        while !self.node(id).children.is_empty() && self.node(id).reward.kind == RewardKind::Step {
            id = self.select_child(id);
        }
        id
    }

    /// Unvisited children first (uniformly at random); otherwise the child
    /// with the highest UCT score, ties broken at random.
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
        let c_uct = self.c;
        let score = |node: &Node| node.q + c_uct * (2.0 * parent_n.ln() / node.n as f64).sqrt();

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

    /// Back the reward up the ancestor chain.
    fn update(&mut self, start: NodeId, reward: Reward) {
        let value = reward.value as f64;
        let mut id = Some(start);
        while let Some(i) = id {
            let node = self.node_mut(i);
            node.q = (node.q * node.n as f64 + value) / (node.n as f64 + 1.0);
            node.n += 1;
            if reward > node.max_value {
                node.max_value = reward;
            }
            id = node.parent;
        }
    }

    /// Create or rewire one child per legal push, then sweep out children
    /// that are losses or meanwhile-retired states, then retire the node
    /// itself if nothing survived. The sweep must not be folded into the
    /// insertion loop: an insertion-time rewire can cascade removals that
    /// the sweep has to observe.
    fn expand(&mut self, v: NodeId) {
        let pushes = self.node(v).board.legal_pushes();
        let v_depth = self.node(v).depth;

        let successors: Vec<(Push, Board)> = {
            let board = &self.node(v).board;
            pushes.iter().map(|&m| (m, board.push(m))).collect()
        };

        for (m, child_board) in successors {
            let hash = child_board.hash();
            if self.del_nodes.contains(&hash) {
                continue;
            }
            match self.nodes.get(&hash).copied() {
                None => {
                    let reward = child_board.reward();
                    let id = self.alloc(Node {
                        board: child_board,
                        parent: Some(v),
                        children: BTreeMap::new(),
                        via: Some(m),
                        depth: v_depth + 1,
                        n: 0,
                        q: 0.0,
                        reward,
                        max_value: reward,
                    });
                    self.nodes.insert(hash, id);
                    self.node_mut(v).children.insert(m, id);
                }
                Some(existing) => {
                    // Known state: adopt it only when this path is strictly
                    // shorter, never add a second edge
                    if v_depth + 1 < self.node(existing).depth {
                        self.rewire(v, m, existing);
                    }
                }
            }
        }

        for m in &pushes {
            if !self.alive(v) {
                break;
            }
            let Some(&child) = self.node(v).children.get(m) else {
                continue;
            };
            if self.node(child).reward.kind == RewardKind::Loss
                || self.del_nodes.contains(&self.node(child).board.hash())
            {
                self.remove(child);
            }
        }

        if self.alive(v)
            && self.node(v).children.is_empty()
            && self.node(v).max_value.kind != RewardKind::Win
            && !self.del_nodes.contains(&self.node(v).board.hash())
        {
            self.remove(v);
        }
    }

    /// Move `u` under the strictly shallower parent `v`, conserving its
    /// aggregate visit statistics along both parent chains.
    fn rewire(&mut self, v: NodeId, m: Push, u: NodeId) {
        let (n_u, q_u) = {
            let u_ref = self.node(u);
            (u_ref.n, u_ref.q)
        };
        let old_parent = self.node(u).parent.expect("rewired node has no parent");
        let old_move = self.node(u).via.expect("rewired node has no incoming push");

        // Attach to the new parent before unhooking the old chain so the
        // removal cascade below can never reach v
        self.node_mut(v).children.insert(m, u);
        self.node_mut(old_parent).children.remove(&old_move);
        self.downgrade(old_parent, n_u, q_u);
        if self.alive(old_parent)
            && self.node(old_parent).children.is_empty()
            && self.node(old_parent).max_value.kind != RewardKind::Win
        {
            self.remove(old_parent);
        }

        let new_depth = self.node(v).depth + 1;
        {
            let u_mut = self.node_mut(u);
            u_mut.parent = Some(v);
            u_mut.via = Some(m);
        }
        self.update_depth(u, new_depth);
        self.upgrade(v, n_u, q_u);
    }

    /// Rewrite the depth of a subtree; each board's step count tracks it.
    fn update_depth(&mut self, id: NodeId, depth: usize) {
        {
            let node = self.node_mut(id);
            node.depth = depth;
            node.board.set_steps(depth);
        }
        let children: Vec<NodeId> = self.node(id).children.values().copied().collect();
        for child in children {
            self.update_depth(child, depth + 1);
        }
    }

    /// Subtract a moved subtree's aggregate statistics along the old parent
    /// chain and refresh the max values from what remains.
    fn downgrade(&mut self, start: NodeId, n: u64, q: f64) {
        let mut id = Some(start);
        while let Some(i) = id {
            {
                let node = self.node_mut(i);
                debug_assert!(node.n >= n, "downgrade underflow");
                node.n -= n;
                node.q = if node.n == 0 {
                    0.0
                } else {
                    (node.q * (node.n + n) as f64 - q * n as f64) / node.n as f64
                };
            }
            self.refresh_max_value(i);
            id = self.node(i).parent;
        }
    }

    /// Symmetric of `downgrade` along the new parent chain.
    fn upgrade(&mut self, start: NodeId, n: u64, q: f64) {
        let mut id = Some(start);
        while let Some(i) = id {
            {
                let node = self.node_mut(i);
                node.n += n;
                node.q = if node.n == 0 {
                    0.0
                } else {
                    (node.q * (node.n - n) as f64 + q * n as f64) / node.n as f64
                };
            }
            self.refresh_max_value(i);
            id = self.node(i).parent;
        }
    }

    fn refresh_max_value(&mut self, id: NodeId) {
        let mut best = self.node(id).reward;
        for &child in self.node(id).children.values() {
            let child_max = self.node(child).max_value;
            if child_max > best {
                best = child_max;
            }
        }
        self.node_mut(id).max_value = best;
    }

    /// Permanently retire a node: blacklist its hash, free it, and cascade
    /// to any parent left childless (or already blacklisted) by the
    /// detachment. A retired root stays in place as the unsolvability
    /// signal.
    fn remove(&mut self, id: NodeId) {
        let hash = self.node(id).board.hash();
        self.del_nodes.insert(hash);
        if id == self.root {
            return;
        }
        self.nodes.remove(&hash);
        debug_assert!(self.node(id).children.is_empty());

        let parent = self.node(id).parent;
        let via = self.node(id).via;
        self.arena[id] = None;

        if let (Some(p), Some(m)) = (parent, via) {
            self.node_mut(p).children.remove(&m);
            let p_hash = self.node(p).board.hash();
            let orphaned = self.node(p).children.is_empty()
                && self.node(p).max_value.kind != RewardKind::Win;
            if orphaned || self.del_nodes.contains(&p_hash) {
                self.remove(p);
            }
        }
    }

    /// Walk the retained tree along maximal `max_value` children; the walk
    /// must end on a winning board.
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
        assert_eq!(
            self.node(id).reward.kind,
            RewardKind::Win,
            "extracted line must end in a win"
        );
        moves
    }
}
