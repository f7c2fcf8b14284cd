use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Wire encoding of the "unknown / unsure" vote.
pub const UNKNOWN_SCORE: i32 = -1;
/// Wire encoding of the "break / pass" vote.
pub const BREAK_SCORE: i32 = -2;

/// A single player's estimate for a story.
///
/// The sentinel cases are distinct variants rather than overloaded integers,
/// so no aggregation or display path ever has to compare magic numbers. `0`
/// always means a literal zero-point estimate; the "½" display token
/// normalizes to `Estimate(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum Vote {
    /// A numeric point estimate, non-negative by construction.
    Estimate(u32),
    /// The "?" card: the player cannot estimate this story.
    Unknown,
    /// The "☕" card: the player is sitting this round out.
    Break,
}

impl Vote {
    /// Normalizes a free-form display token into a vote.
    ///
    /// Unparseable tokens degrade to `Unknown` with a warning instead of
    /// being rejected; every deck variant funnels through this one mapping.
    pub fn parse(token: &str) -> Vote {
        match token.trim() {
            "" | "?" => Vote::Unknown,
            "☕" => Vote::Break,
            "½" => Vote::Estimate(0),
            trimmed => match trimmed.parse::<i64>() {
                Ok(n) if n >= 0 && n <= u32::MAX as i64 => Vote::Estimate(n as u32),
                Ok(n) => Vote::from(n as i32),
                Err(_) => {
                    warn!(token = %trimmed, "invalid vote token, recording as unknown");
                    Vote::Unknown
                }
            },
        }
    }

    /// The numeric value when this vote counts toward aggregates.
    pub fn estimate(&self) -> Option<u32> {
        match self {
            Vote::Estimate(points) => Some(*points),
            Vote::Unknown | Vote::Break => None,
        }
    }

    pub fn is_estimate(&self) -> bool {
        matches!(self, Vote::Estimate(_))
    }
}

impl From<i32> for Vote {
    fn from(score: i32) -> Self {
        match score {
            BREAK_SCORE => Vote::Break,
            n if n >= 0 => Vote::Estimate(n as u32),
            // -1 and any unexpected negative sentinel
            _ => Vote::Unknown,
        }
    }
}

impl From<Vote> for i32 {
    fn from(vote: Vote) -> Self {
        match vote {
            Vote::Estimate(points) => points as i32,
            Vote::Unknown => UNKNOWN_SCORE,
            Vote::Break => BREAK_SCORE,
        }
    }
}

impl std::fmt::Display for Vote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Vote::Estimate(points) => write!(f, "{}", points),
            Vote::Unknown => write!(f, "?"),
            Vote::Break => write!(f, "☕"),
        }
    }
}

// The statistics below are the single implementation shared by the story card
// and the derived voting session, so both views always agree on which votes
// are eligible (estimates only, sentinels excluded).

pub fn average_score<'a, I>(votes: I) -> f64
where
    I: IntoIterator<Item = &'a Vote>,
{
    let eligible: Vec<u32> = votes.into_iter().filter_map(Vote::estimate).collect();
    if eligible.is_empty() {
        return 0.0;
    }
    eligible.iter().map(|&points| points as f64).sum::<f64>() / eligible.len() as f64
}

pub fn min_score<'a, I>(votes: I) -> u32
where
    I: IntoIterator<Item = &'a Vote>,
{
    votes
        .into_iter()
        .filter_map(Vote::estimate)
        .min()
        .unwrap_or(0)
}

pub fn max_score<'a, I>(votes: I) -> u32
where
    I: IntoIterator<Item = &'a Vote>,
{
    votes
        .into_iter()
        .filter_map(Vote::estimate)
        .max()
        .unwrap_or(0)
}

/// True iff at least one vote exists, every vote is a numeric estimate, and
/// all estimates agree. A player who is unsure or on a break has not agreed,
/// so any sentinel vote blocks consensus.
pub fn has_consensus<'a, I>(votes: I) -> bool
where
    I: IntoIterator<Item = &'a Vote>,
{
    let mut distinct: HashSet<u32> = HashSet::new();
    let mut any = false;
    for vote in votes {
        any = true;
        match vote.estimate() {
            Some(points) => {
                distinct.insert(points);
            }
            None => return false,
        }
    }
    any && distinct.len() == 1
}
