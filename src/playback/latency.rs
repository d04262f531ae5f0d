use crate::playback::clock::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AttemptId(Uuid);

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt-{}", self.0)
    }
}

/// One "play" press and, eventually, the instant it was honoured.
#[derive(Debug, Clone)]
pub struct PlaybackAttempt {
    id: AttemptId,
    intent_at: Instant,
    confirmed_at: Option<Instant>,
    confirmed_wall: Option<DateTime<Utc>>,
}

impl PlaybackAttempt {
    pub fn id(&self) -> AttemptId {
        self.id
    }

    pub fn intent_at(&self) -> Instant {
        self.intent_at
    }

    pub fn confirmed_at(&self) -> Option<Instant> {
        self.confirmed_at
    }

    pub fn confirmed_wall(&self) -> Option<DateTime<Utc>> {
        self.confirmed_wall
    }

    pub fn latency(&self) -> Option<Duration> {
        self.confirmed_at.map(|at| at - self.intent_at)
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencySnapshot {
    pub elapsed_ms: u64,
    pub confirmed: bool,
}

/// Startup latency per attempt: live while waiting, frozen once confirmed.
pub struct LatencyRecorder<C: Clock = SystemClock> {
    clock: C,
    attempts: HashMap<AttemptId, PlaybackAttempt>,
}

impl LatencyRecorder<SystemClock> {
    pub fn system() -> Self {
        Self::new(SystemClock)
    }
}

impl<C: Clock> LatencyRecorder<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            attempts: HashMap::new(),
        }
    }

    /// Records a play intent at the current instant.
    pub fn begin(&mut self) -> AttemptId {
        let id = AttemptId(Uuid::new_v4());
        self.attempts.insert(
            id,
            PlaybackAttempt {
                id,
                intent_at: self.clock.now(),
                confirmed_at: None,
                confirmed_wall: None,
            },
        );
        log::debug!("{}: play intent recorded", id);
        id
    }

    /// Freezes the attempt's latency at the current instant. Later calls
    /// return the already frozen value. `None` for unknown attempts.
    pub fn confirm(&mut self, id: AttemptId) -> Option<Duration> {
        let now = self.clock.now();
        let attempt = self.attempts.get_mut(&id)?;
        if attempt.confirmed_at.is_none() {
            attempt.confirmed_at = Some(now);
            attempt.confirmed_wall = Some(self.clock.utc_now());
            log::info!(
                "{}: playback confirmed after {} ms",
                id,
                (now - attempt.intent_at).as_millis()
            );
        }
        attempt.latency()
    }

    /// Time since intent, or the frozen latency once confirmed.
    pub fn live_elapsed(&self, id: AttemptId) -> Option<Duration> {
        let attempt = self.attempts.get(&id)?;
        Some(
            attempt
                .latency()
                .unwrap_or_else(|| self.clock.now() - attempt.intent_at),
        )
    }

    pub fn snapshot(&self, id: AttemptId) -> Option<LatencySnapshot> {
        let elapsed = self.live_elapsed(id)?;
        Some(LatencySnapshot {
            elapsed_ms: elapsed.as_millis() as u64,
            confirmed: self.attempts.get(&id).is_some_and(PlaybackAttempt::is_confirmed),
        })
    }

    pub fn attempt(&self, id: AttemptId) -> Option<&PlaybackAttempt> {
        self.attempts.get(&id)
    }

    pub fn discard(&mut self, id: AttemptId) -> Option<PlaybackAttempt> {
        self.attempts.remove(&id)
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}
