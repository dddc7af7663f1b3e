//! Round Rules
//!
//! The fixed three-choice rule set and the pure round resolver.
//! Nothing here touches the network.

use std::fmt;
use std::str::FromStr;

// =============================================================================
// MOVES
// =============================================================================

/// A move a player can submit for one round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Move {
    /// Beats scissors.
    Rock,
    /// Beats rock.
    Paper,
    /// Beats paper.
    Scissors,
}

impl Move {
    /// Every valid move, in canonical cycle order.
    pub const ALL: [Move; 3] = [Move::Rock, Move::Paper, Move::Scissors];

    /// Wire literal for this move.
    pub const fn as_str(self) -> &'static str {
        match self {
            Move::Rock => "ROCK",
            Move::Paper => "PAPER",
            Move::Scissors => "SCISSORS",
        }
    }

    /// The move this one defeats.
    pub const fn beats(self) -> Move {
        match self {
            Move::Rock => Move::Scissors,
            Move::Paper => Move::Rock,
            Move::Scissors => Move::Paper,
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a move literal outside the rule set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown move `{0}`")]
pub struct InvalidMove(pub String);

impl FromStr for Move {
    type Err = InvalidMove;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ROCK" => Ok(Move::Rock),
            "PAPER" => Ok(Move::Paper),
            "SCISSORS" => Ok(Move::Scissors),
            other => Err(InvalidMove(other.to_string())),
        }
    }
}

// =============================================================================
// OUTCOMES
// =============================================================================

/// Result of a round from one player's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// This player won the round.
    Win,
    /// This player lost the round.
    Lose,
    /// Both players chose the same move.
    Draw,
}

impl Outcome {
    /// Single-letter wire code (`W`, `L`, `D`).
    pub const fn code(self) -> char {
        match self {
            Outcome::Win => 'W',
            Outcome::Lose => 'L',
            Outcome::Draw => 'D',
        }
    }

    /// Parse a wire code.
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'W' => Some(Outcome::Win),
            'L' => Some(Outcome::Lose),
            'D' => Some(Outcome::Draw),
            _ => None,
        }
    }

    /// The same round seen from the opponent's side.
    pub const fn opposite(self) -> Outcome {
        match self {
            Outcome::Win => Outcome::Lose,
            Outcome::Lose => Outcome::Win,
            Outcome::Draw => Outcome::Draw,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Win => "win",
            Outcome::Lose => "lose",
            Outcome::Draw => "draw",
        })
    }
}

// =============================================================================
// RESOLVER
// =============================================================================

/// Resolve a round from `a`'s perspective.
pub fn resolve(a: Move, b: Move) -> Outcome {
    if a == b {
        Outcome::Draw
    } else if a.beats() == b {
        Outcome::Win
    } else {
        Outcome::Lose
    }
}

/// Resolve a round for both players at once.
pub fn resolve_pair(a: Move, b: Move) -> (Outcome, Outcome) {
    let first = resolve(a, b);
    (first, first.opposite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_move() -> impl Strategy<Value = Move> {
        prop::sample::select(Move::ALL.to_vec())
    }

    #[test]
    fn test_canonical_cycle() {
        assert_eq!(resolve(Move::Rock, Move::Scissors), Outcome::Win);
        assert_eq!(resolve(Move::Scissors, Move::Paper), Outcome::Win);
        assert_eq!(resolve(Move::Paper, Move::Rock), Outcome::Win);
        assert_eq!(resolve(Move::Rock, Move::Paper), Outcome::Lose);
        assert_eq!(resolve(Move::Scissors, Move::Rock), Outcome::Lose);
        assert_eq!(resolve(Move::Paper, Move::Scissors), Outcome::Lose);
    }

    #[test]
    fn test_same_move_draws() {
        for mv in Move::ALL {
            assert_eq!(resolve(mv, mv), Outcome::Draw);
        }
    }

    #[test]
    fn test_move_literals() {
        for mv in Move::ALL {
            assert_eq!(mv.as_str().parse::<Move>(), Ok(mv));
        }
        assert!("rock".parse::<Move>().is_err());
        assert!("LIZARD".parse::<Move>().is_err());
        assert!("".parse::<Move>().is_err());
    }

    #[test]
    fn test_outcome_codes() {
        for outcome in [Outcome::Win, Outcome::Lose, Outcome::Draw] {
            assert_eq!(Outcome::from_code(outcome.code()), Some(outcome));
        }
        assert_eq!(Outcome::from_code('F'), None);
    }

    proptest! {
        #[test]
        fn prop_resolve_is_antisymmetric(a in any_move(), b in any_move()) {
            let forward = resolve(a, b);
            let backward = resolve(b, a);
            prop_assert_eq!(backward, forward.opposite());
        }

        #[test]
        fn prop_resolve_pair_matches_resolve(a in any_move(), b in any_move()) {
            let (first, second) = resolve_pair(a, b);
            prop_assert_eq!(first, resolve(a, b));
            prop_assert_eq!(second, resolve(b, a));
        }
    }
}
