//! Rank tiers and leaderboards.
//!
//! A score maps to one of ten tiers in fixed bands of 100 points; everything at or
//! above the last band is the top tier, and anything below zero is the bottom one.

use crate::{
    entities::{UserProfile, user_profile},
    errors::Result,
};
use sea_orm::{QueryOrder, QuerySelect, prelude::*};
use serde::Serialize;

/// Width of one tier's score band.
pub const BAND_WIDTH: i64 = 100;

/// Tier names, lowest first.
pub const RANKS: [&str; 10] = [
    "Iron Intern",
    "Bronze Budgeter",
    "Silver Saver",
    "Gold Guardian",
    "Platinum Planner",
    "Emerald Earner",
    "Diamond Depositor",
    "Ruby Rainmaker",
    "Sapphire Stasher",
    "Crystal Cashlord",
];

/// Index into [`RANKS`] for a score, clamped at both ends.
#[must_use]
pub fn rank_index(score: i64) -> usize {
    let band = score.max(0) / BAND_WIDTH;
    usize::try_from(band).map_or(RANKS.len() - 1, |band| band.min(RANKS.len() - 1))
}

/// Tier name for a score.
#[must_use]
pub fn rank_of(score: i64) -> &'static str {
    RANKS[rank_index(score)]
}

/// Score at which the next tier starts, or `None` at the top tier.
#[must_use]
pub fn next_rank_threshold(score: i64) -> Option<i64> {
    let next = rank_index(score) + 1;
    if next >= RANKS.len() {
        return None;
    }
    i64::try_from(next).ok().map(|n| n * BAND_WIDTH)
}

/// Someone who can appear on a leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardMember {
    /// Stable user identifier
    pub user_id: String,
    /// Name to show
    pub name: String,
    /// Current score
    pub score: i64,
}

/// One ranked row of a leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    /// 1-based position
    pub position: usize,
    /// Stable user identifier
    pub user_id: String,
    /// Name to show
    pub name: String,
    /// Score at the time the board was built
    pub score: i64,
    /// Tier name for `score`
    pub rank: &'static str,
    /// Whether this row is the viewer
    pub is_current_user: bool,
}

/// Ranks `members` with the viewer merged in.
///
/// A member with the viewer's id is replaced by `current_user`, so the viewer's live
/// score always wins over a stale stored one. Rows are ordered by score, highest first,
/// then by name.
#[must_use]
pub fn build_leaderboard(
    members: Vec<LeaderboardMember>,
    current_user: &LeaderboardMember,
) -> Vec<LeaderboardEntry> {
    let mut combined: Vec<LeaderboardMember> = members
        .into_iter()
        .filter(|m| m.user_id != current_user.user_id)
        .collect();
    combined.push(current_user.clone());
    combined.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));

    combined
        .into_iter()
        .enumerate()
        .map(|(index, member)| LeaderboardEntry {
            position: index + 1,
            is_current_user: member.user_id == current_user.user_id,
            rank: rank_of(member.score),
            user_id: member.user_id,
            name: member.name,
            score: member.score,
        })
        .collect()
}

impl From<user_profile::Model> for LeaderboardMember {
    fn from(profile: user_profile::Model) -> Self {
        Self {
            user_id: profile.user_id,
            name: profile.display_name,
            score: profile.score,
        }
    }
}

/// Global leaderboard from stored profiles: the top `limit` users plus the viewer.
///
/// The viewer is always included even when outside the top `limit`.
pub async fn global_leaderboard(
    db: &DatabaseConnection,
    current_user_id: &str,
    limit: u64,
) -> Result<Vec<LeaderboardEntry>> {
    let top: Vec<LeaderboardMember> = UserProfile::find()
        .order_by_desc(user_profile::Column::Score)
        .order_by_asc(user_profile::Column::DisplayName)
        .limit(limit)
        .all(db)
        .await?
        .into_iter()
        .map(LeaderboardMember::from)
        .collect();

    let current = UserProfile::find_by_id(current_user_id.to_string())
        .one(db)
        .await?
        .map_or_else(
            || LeaderboardMember {
                user_id: current_user_id.to_string(),
                name: current_user_id.to_string(),
                score: 0,
            },
            LeaderboardMember::from,
        );

    Ok(build_leaderboard(top, &current))
}
