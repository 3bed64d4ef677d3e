// THEORY:
// The `LocationDebouncer` is the temporal smoothing layer. Classification is noisy:
// a single frame can put a person in the wrong room. The debouncer only moves the
// confirmed location once a new candidate has won every vote for a full
// confirmation window, which models the time a person has to dwell somewhere before
// they are considered to be there.
//
// States:
// - `Idle`: nothing confirmed, nothing pending.
// - `Pending`: a candidate is waiting for its window to elapse. The previously
//   confirmed id (if any) is kept so it can be restored.
// - `Confirmed`: a stable location.
//
// Each non-empty batch casts one vote: the id occurring most often in the batch,
// ties going to the id encountered first. A vote for the pending candidate leaves
// its timer running, a vote for the confirmed id cancels the pending candidate, and
// any other vote restarts the timer for a new candidate. Empty batches change
// nothing.
//
// There is no timer thread. `poll` promotes an expired candidate and is called at
// the top of every `update`, and may be called between frames by a ticker. A
// candidate that was cancelled or replaced can never be promoted, because its state
// no longer exists.

use crate::core_modules::loi::Loi;
use std::time::{Duration, Instant};

/// A confirmed transition of the stable location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationChange {
    pub previous: Option<String>,
    pub current: String,
    pub at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DebounceState {
    Idle,
    Pending {
        confirmed: Option<String>,
        candidate: String,
        since: Instant,
    },
    Confirmed(String),
}

#[derive(Debug)]
pub struct LocationDebouncer {
    window: Duration,
    state: DebounceState,
}

impl LocationDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: DebounceState::Idle,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// The stable location, if one has been confirmed.
    pub fn current(&self) -> Option<&str> {
        match &self.state {
            DebounceState::Idle => None,
            DebounceState::Pending { confirmed, .. } => confirmed.as_deref(),
            DebounceState::Confirmed(id) => Some(id),
        }
    }

    /// The candidate waiting for confirmation.
    pub fn pending(&self) -> Option<&str> {
        match &self.state {
            DebounceState::Pending { candidate, .. } => Some(candidate),
            _ => None,
        }
    }

    /// Feeds one frame's classified locations.
    pub fn update(&mut self, lois: &[Loi], now: Instant) -> Option<LocationChange> {
        let change = self.poll(now);
        if let Some(vote) = majority_vote(lois.iter().map(Loi::id)) {
            self.vote(vote, now);
        }
        change
    }

    /// Promotes the pending candidate if its window has fully elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<LocationChange> {
        let DebounceState::Pending { since, .. } = &self.state else {
            return None;
        };
        if now.saturating_duration_since(*since) < self.window {
            return None;
        }
        let DebounceState::Pending {
            confirmed,
            candidate,
            ..
        } = std::mem::replace(&mut self.state, DebounceState::Idle)
        else {
            return None;
        };

        log::info!("location confirmed: {confirmed:?} -> '{candidate}'");
        self.state = DebounceState::Confirmed(candidate.clone());
        Some(LocationChange {
            previous: confirmed,
            current: candidate,
            at: now,
        })
    }

    fn vote(&mut self, vote: &str, now: Instant) {
        let next = match &self.state {
            DebounceState::Confirmed(id) if id == vote => return,
            DebounceState::Pending { candidate, .. } if candidate == vote => return,
            DebounceState::Pending {
                confirmed: Some(id),
                ..
            } if id == vote => {
                log::debug!("pending location cancelled, staying in '{id}'");
                DebounceState::Confirmed(id.clone())
            }
            state => {
                let confirmed = match state {
                    DebounceState::Idle => None,
                    DebounceState::Pending { confirmed, .. } => confirmed.clone(),
                    DebounceState::Confirmed(id) => Some(id.clone()),
                };
                log::debug!("location candidate '{vote}', confirming in {:?}", self.window);
                DebounceState::Pending {
                    confirmed,
                    candidate: vote.to_string(),
                    since: now,
                }
            }
        };
        self.state = next;
    }
}

/// The most frequent id; ties go to the id seen first.
pub fn majority_vote<'a>(ids: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    let mut counts: Vec<(&'a str, usize)> = Vec::new();
    for id in ids {
        match counts.iter_mut().find(|(seen, _)| *seen == id) {
            Some((_, count)) => *count += 1,
            None => counts.push((id, 1)),
        }
    }
    let mut best: Option<(&'a str, usize)> = None;
    for (id, count) in counts {
        if best.is_none_or(|(_, top)| count > top) {
            best = Some((id, count));
        }
    }
    best.map(|(id, _)| id)
}
