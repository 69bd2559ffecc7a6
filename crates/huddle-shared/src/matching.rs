//! Common-interest group matching.
//!
//! Given the users waiting for an anonymous chat, find groups of
//! [`MIN_GROUP_SIZE`]..=[`MAX_GROUP_SIZE`] users whose interest sets share at
//! least one element.
//!
//! The search is exhaustive: every combination of every allowed size is
//! tried, smallest groups first and lexicographically by input position
//! within a size. The cost grows combinatorially with the pool, so callers
//! must bound how many waiting users they pass in; [`candidates_for`]
//! picks such a bound around the user asking for a chat.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::constants::{MAX_GROUP_SIZE, MIN_GROUP_SIZE};
use crate::types::UserId;

/// A user waiting to be matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingUser {
    pub id: UserId,
    pub interests: BTreeSet<String>,
}

impl WaitingUser {
    pub fn new<I, S>(id: impl Into<UserId>, interests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            interests: interests.into_iter().map(Into::into).collect(),
        }
    }
}

/// A candidate group and the interests all of its members share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchGroup {
    pub members: Vec<UserId>,
    pub shared_interests: BTreeSet<String>,
}

/// Lazily enumerate matching groups in discovery order.
///
/// Users whose id already appeared earlier in `users` are skipped, so every
/// group has distinct members and no member list is produced twice.
pub fn groups(users: &[WaitingUser]) -> impl Iterator<Item = MatchGroup> + '_ {
    let mut seen = HashSet::new();
    let pool: Vec<&WaitingUser> = users.iter().filter(|u| seen.insert(&u.id)).collect();

    (MIN_GROUP_SIZE..=MAX_GROUP_SIZE).flat_map(move |size| {
        let pool = pool.clone();
        Combinations::new(pool.len(), size).filter_map(move |indices| {
            let shared = shared_interests(indices.iter().map(|&i| pool[i]));
            if shared.is_empty() {
                return None;
            }
            Some(MatchGroup {
                members: indices.iter().map(|&i| pool[i].id.clone()).collect(),
                shared_interests: shared,
            })
        })
    })
}

/// Every matching group, in discovery order.
pub fn find_groups(users: &[WaitingUser]) -> Vec<MatchGroup> {
    groups(users).collect()
}

/// The first group the search discovers, without enumerating the rest.
pub fn first_group(users: &[WaitingUser]) -> Option<MatchGroup> {
    groups(users).next()
}

/// The slice of `pool` worth searching when `requester` asks for a chat:
/// waiting users sharing at least one interest with them, oldest first,
/// followed by the requester. At most `max` users are returned.
///
/// Any group the requester can join is drawn from these users, so capping
/// the search this way never locks a newcomer out behind older users who
/// cannot be matched.
pub fn candidates_for(
    requester: &WaitingUser,
    pool: &[WaitingUser],
    max: usize,
) -> Vec<WaitingUser> {
    let mut window: Vec<WaitingUser> = pool
        .iter()
        .filter(|u| u.id != requester.id)
        .filter(|u| !u.interests.is_disjoint(&requester.interests))
        .take(max.saturating_sub(1))
        .cloned()
        .collect();
    window.push(requester.clone());
    window
}

fn shared_interests<'a>(mut members: impl Iterator<Item = &'a WaitingUser>) -> BTreeSet<String> {
    let Some(first) = members.next() else {
        return BTreeSet::new();
    };
    let mut shared = first.interests.clone();
    for member in members {
        shared.retain(|interest| member.interests.contains(interest));
        if shared.is_empty() {
            break;
        }
    }
    shared
}

/// Index combinations of `k` out of `n`, in lexicographic order.
struct Combinations {
    n: usize,
    indices: Vec<usize>,
    done: bool,
}

impl Combinations {
    fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            indices: (0..k).collect(),
            done: k == 0 || k > n,
        }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let current = self.indices.clone();

        // Advance the rightmost index that still has room to move.
        let k = self.indices.len();
        let mut i = k;
        loop {
            if i == 0 {
                self.done = true;
                break;
            }
            i -= 1;
            if self.indices[i] < self.n - k + i {
                self.indices[i] += 1;
                for j in i + 1..k {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
                break;
            }
        }

        Some(current)
    }
}
