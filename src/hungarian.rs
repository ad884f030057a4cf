use arrayvec::ArrayVec;

use crate::board::MAX_BOXES;
use crate::grid::Position;

fn manhattan(a: Position, b: Position) -> u16 {
    let dx = (a.0 as i16 - b.0 as i16).unsigned_abs();
    let dy = (a.1 as i16 - b.1 as i16).unsigned_abs();
    dx + dy
}

fn filled<T: Copy>(n: usize, value: T) -> ArrayVec<T, MAX_BOXES> {
    (0..n).map(|_| value).collect()
}

/// Minimum-cost perfect matching between boxes and goals on the Manhattan
/// distance. Walls and other boxes are ignored; reachability is the deadlock
/// oracle's job.
///
/// Kuhn-Munkres over reduced costs: one box at a time, grow an alternating
/// tree of tight edges until it reaches a free goal, then flip the
/// augmenting path. Potentials keep every reduced cost non-negative with
/// matched edges tight, so each tree costs O(n^2) and the whole matching
/// O(n^3).
pub fn min_cost_matching(boxes: &[Position], goals: &[Position]) -> u16 {
    assert_eq!(
        boxes.len(),
        goals.len(),
        "matching requires equally many boxes and goals"
    );
    let n = boxes.len();
    if n == 0 {
        return 0;
    }

    let cost = |b: usize, g: usize| manhattan(boxes[b], goals[g]) as i32;

    // owner[g] is the box currently assigned to goal g
    let mut owner: ArrayVec<Option<usize>, MAX_BOXES> = filled(n, None);
    let mut box_pot: ArrayVec<i32, MAX_BOXES> = filled(n, 0);
    let mut goal_pot: ArrayVec<i32, MAX_BOXES> = filled(n, 0);

    for fresh in 0..n {
        // For every goal outside the tree: the cheapest reduced edge from
        // any tree box (slack), and the tree goal whose owner offered it
        let mut slack: ArrayVec<i32, MAX_BOXES> = filled(n, i32::MAX);
        let mut reached_via: ArrayVec<Option<usize>, MAX_BOXES> = filled(n, None);
        let mut in_tree: ArrayVec<bool, MAX_BOXES> = filled(n, false);

        let mut frontier = fresh;
        let mut frontier_goal = None;
        let free_goal = loop {
            for g in 0..n {
                if in_tree[g] {
                    continue;
                }
                let reduced = cost(frontier, g) - box_pot[frontier] - goal_pot[g];
                if reduced < slack[g] {
                    slack[g] = reduced;
                    reached_via[g] = frontier_goal;
                }
            }

            let tightest = (0..n)
                .filter(|&g| !in_tree[g])
                .min_by_key(|&g| slack[g])
                .expect("a free goal always remains");
            let delta = slack[tightest];

            // Shift potentials so the tightest edge joins the tree at
            // reduced cost zero while tree edges stay tight
            box_pot[fresh] += delta;
            for g in 0..n {
                if in_tree[g] {
                    box_pot[owner[g].expect("tree goals are matched")] += delta;
                    goal_pot[g] -= delta;
                } else {
                    slack[g] -= delta;
                }
            }

            in_tree[tightest] = true;
            match owner[tightest] {
                Some(next) => {
                    frontier = next;
                    frontier_goal = Some(tightest);
                }
                None => break tightest,
            }
        };

        // Flip the alternating path back to the fresh box
        let mut g = free_goal;
        while let Some(previous) = reached_via[g] {
            owner[g] = owner[previous];
            g = previous;
        }
        owner[g] = Some(fresh);
    }

    let total: i32 = (0..n)
        .map(|g| cost(owner[g].expect("matching is perfect"), g))
        .sum();
    total as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_matching() {
        assert_eq!(min_cost_matching(&[], &[]), 0);
    }

    #[test]
    fn test_single_pair() {
        let boxes = [Position(2, 1)];
        let goals = [Position(5, 3)];
        assert_eq!(min_cost_matching(&boxes, &goals), 5);
    }

    #[test]
    fn test_assignment_is_optimal() {
        // Greedily pairing each box with its nearest goal costs 1 + 4; the
        // optimal assignment crosses over for 2 + 1.
        let boxes = [Position(2, 0), Position(4, 0)];
        let goals = [Position(3, 0), Position(0, 0)];
        assert_eq!(min_cost_matching(&boxes, &goals), 3);
    }

    #[test]
    fn test_three_way_assignment() {
        // Each box pairs with the goal one square to its right
        let boxes = [Position(1, 0), Position(3, 0), Position(5, 0)];
        let goals = [Position(2, 0), Position(4, 0), Position(6, 0)];
        assert_eq!(min_cost_matching(&boxes, &goals), 3);
    }

    #[test]
    fn test_zero_iff_boxes_on_goals() {
        let on_goals = [Position(1, 1), Position(4, 2)];
        assert_eq!(min_cost_matching(&on_goals, &on_goals), 0);

        let boxes = [Position(1, 1), Position(4, 2)];
        let goals = [Position(1, 1), Position(4, 3)];
        assert!(min_cost_matching(&boxes, &goals) > 0);
    }
}
