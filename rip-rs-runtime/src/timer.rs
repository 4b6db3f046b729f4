use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

/// Source of the current time for the router. Tests drive a manual clock instead of
/// sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Default, Clone, Copy, Debug)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Handle to one scheduled timer. Cancelling or replacing it makes the old deadline
/// never fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

/// A deadline ordered set of timers, each carrying the key of the thing it belongs to.
/// Owners keep the returned token and cancel it when the timer is superseded.
#[derive(Debug)]
pub struct TimerQueue<K> {
    next_id: u64,
    deadlines: BTreeMap<(Instant, u64), K>,
    scheduled: HashMap<u64, Instant>,
}

impl<K> Default for TimerQueue<K> {
    fn default() -> Self {
        TimerQueue::new()
    }
}

impl<K> TimerQueue<K> {
    pub fn new() -> Self {
        TimerQueue {
            next_id: 0,
            deadlines: BTreeMap::new(),
            scheduled: HashMap::new(),
        }
    }

    pub fn schedule(&mut self, at: Instant, key: K) -> TimerToken {
        let id = self.next_id;
        self.next_id += 1;
        self.deadlines.insert((at, id), key);
        self.scheduled.insert(id, at);
        TimerToken(id)
    }

    /// Returns false if the timer already fired or was cancelled.
    pub fn cancel(&mut self, token: TimerToken) -> bool {
        match self.scheduled.remove(&token.0) {
            Some(at) => self.deadlines.remove(&(at, token.0)).is_some(),
            None => false,
        }
    }

    pub fn is_scheduled(&self, token: TimerToken) -> bool {
        self.scheduled.contains_key(&token.0)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.keys().next().map(|(at, _)| *at)
    }

    /// Removes and returns every timer due at or before `now`, earliest first.
    pub fn pop_due(&mut self, now: Instant) -> Vec<(TimerToken, K)> {
        let mut due = vec![];
        while let Some(&(at, id)) = self.deadlines.keys().next() {
            if at > now {
                break;
            }
            if let Some(key) = self.deadlines.remove(&(at, id)) {
                self.scheduled.remove(&id);
                due.push((TimerToken(id), key));
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.scheduled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scheduled.is_empty()
    }
}
