use std::cmp::Ordering;
use std::fmt;

/// Terminal classification of a position. The derived order ranks
/// `Loss < Step < Win`, which is the tie-break order for equal values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RewardKind {
    Loss,
    Step,
    Win,
}

impl fmt::Display for RewardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewardKind::Loss => write!(f, "LOSS"),
            RewardKind::Step => write!(f, "STEP"),
            RewardKind::Win => write!(f, "WIN"),
        }
    }
}

/// Static evaluation of a board: the negated minimum-cost box-to-goal
/// matching, tagged with the terminal classification. Zero is the optimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reward {
    pub value: i32,
    pub kind: RewardKind,
}

impl Reward {
    pub fn new(value: i32, kind: RewardKind) -> Reward {
        Reward { value, kind }
    }
}

impl Ord for Reward {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.value, self.kind).cmp(&(other.value, other.kind))
    }
}

impl PartialOrd for Reward {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_dominates() {
        let better = Reward::new(-2, RewardKind::Loss);
        let worse = Reward::new(-5, RewardKind::Step);
        assert!(better > worse);
    }

    #[test]
    fn test_kind_breaks_ties() {
        let win = Reward::new(0, RewardKind::Win);
        let step = Reward::new(0, RewardKind::Step);
        let loss = Reward::new(0, RewardKind::Loss);
        assert!(win > step);
        assert!(step > loss);
    }
}
