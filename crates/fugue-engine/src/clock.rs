//! Game time: a monotonic minute counter with a fixed epoch.
//!
//! "Time passing" in the simulation is purely a counter moving forward --
//! nothing blocks or sleeps. The [`Clock`] is the sole authority for "now"
//! and refuses to move backward; everything that cares about time (event
//! triggers, turn costs, delivery lead times) is expressed as a [`GameTime`]
//! or a [`GameDuration`] in whole minutes.

use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};

use crate::QueueError;

// ---------------------------------------------------------------------------
// GameTime
// ---------------------------------------------------------------------------

/// An instant of game time: minutes since the fixed epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct GameTime(u64);

impl GameTime {
    /// The start of the session's timeline.
    pub const EPOCH: GameTime = GameTime(0);

    /// Minutes elapsed since the epoch.
    pub const fn minutes_since_epoch(self) -> u64 {
        self.0
    }
}

impl Add<GameDuration> for GameTime {
    type Output = GameTime;

    fn add(self, rhs: GameDuration) -> GameTime {
        GameTime(self.0 + rhs.0)
    }
}

impl fmt::Display for GameTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let day = self.0 / (24 * 60);
        let rem = self.0 % (24 * 60);
        write!(f, "day {} {:02}:{:02}", day, rem / 60, rem % 60)
    }
}

// ---------------------------------------------------------------------------
// GameDuration
// ---------------------------------------------------------------------------

/// A span of game time in whole minutes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct GameDuration(u64);

impl GameDuration {
    pub const ZERO: GameDuration = GameDuration(0);

    pub const fn minutes(n: u64) -> Self {
        Self(n)
    }

    pub const fn hours(n: u64) -> Self {
        Self(n * 60)
    }

    pub const fn days(n: u64) -> Self {
        Self(n * 24 * 60)
    }

    pub const fn as_minutes(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// The monotonically advancing game clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clock {
    now: GameTime,
}

impl Clock {
    /// A clock starting at the given instant.
    pub fn starting_at(start: GameTime) -> Self {
        Self { now: start }
    }

    /// The current instant.
    pub fn now(&self) -> GameTime {
        self.now
    }

    /// Move forward to `to`. Advancing to the current instant is a no-op;
    /// moving backward is rejected.
    pub fn advance_to(&mut self, to: GameTime) -> Result<(), QueueError> {
        if to < self.now {
            return Err(QueueError::MovedBackward {
                target: to,
                now: self.now,
            });
        }
        self.now = to;
        Ok(())
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::starting_at(GameTime::EPOCH)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
