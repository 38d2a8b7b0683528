//! In-memory store implementation.
//!
//! One mutex-guarded keyspace holding every entry, with per-key expiration
//! deadlines evicted lazily on access. Because all access goes through the
//! single lock, `atomic` steps are indivisible to every reader by
//! construction.

use std::collections::{BTreeSet, VecDeque};
use std::time::{Duration, Instant};

use ahash::AHashMap;
use parking_lot::Mutex;

use super::{Keyspace, StatStore, StoreError};

/// One stored value.
#[derive(Debug, Clone)]
enum Entry {
    Text(String),
    List(VecDeque<String>),
    Index(BTreeSet<String>),
}

/// The keyspace state behind the lock.
struct State {
    data: AHashMap<String, Entry>,
    expirations: AHashMap<String, Instant>,
    /// Test hook: artificial clock advancement applied to `now`.
    clock_skew: Duration,
}

impl State {
    fn new() -> Self {
        State {
            data: AHashMap::new(),
            expirations: AHashMap::new(),
            clock_skew: Duration::ZERO,
        }
    }

    fn now(&self) -> Instant {
        Instant::now() + self.clock_skew
    }

    fn is_expired(&self, key: &str) -> bool {
        match self.expirations.get(key) {
            Some(deadline) => *deadline <= self.now(),
            None => false,
        }
    }

    /// Drop an expired key the moment any access touches it.
    fn evict_if_expired(&mut self, key: &str) {
        if self.is_expired(key) {
            self.data.remove(key);
            self.expirations.remove(key);
        }
    }

    fn get_text(&mut self, key: &str) -> Option<String> {
        self.evict_if_expired(key);
        match self.data.get(key) {
            Some(Entry::Text(s)) => Some(s.clone()),
            _ => None,
        }
    }
}

impl Keyspace for State {
    fn get(&mut self, key: &str) -> Option<String> {
        self.get_text(key)
    }

    fn set(&mut self, key: &str, value: String) {
        self.evict_if_expired(key);
        self.data.insert(key.to_string(), Entry::Text(value));
    }

    fn incr(&mut self, key: &str) -> i64 {
        let current = self
            .get_text(key)
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + 1;
        self.data.insert(key.to_string(), Entry::Text(next.to_string()));
        next
    }

    fn incr_by_float(&mut self, key: &str, delta: f64) -> f64 {
        let current = self
            .get_text(key)
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.0);
        // No finiteness check: observation validation is the caller's job.
        let next = current + delta;
        self.data
            .insert(key.to_string(), Entry::Text(format!("{next}")));
        next
    }

    fn lpush(&mut self, key: &str, entry: String) {
        self.evict_if_expired(key);
        match self.data.get_mut(key) {
            Some(Entry::List(list)) => list.push_front(entry),
            _ => {
                let mut list = VecDeque::new();
                list.push_front(entry);
                self.data.insert(key.to_string(), Entry::List(list));
            }
        }
    }

    fn ltrim(&mut self, key: &str, len: usize) {
        if let Some(Entry::List(list)) = self.data.get_mut(key) {
            list.truncate(len);
            if list.is_empty() {
                self.data.remove(key);
                self.expirations.remove(key);
            }
        }
    }

    fn expire(&mut self, key: &str, ttl: Duration) {
        if self.data.contains_key(key) {
            let deadline = self.now() + ttl;
            self.expirations.insert(key.to_string(), deadline);
        }
    }

    fn index_add(&mut self, key: &str, member: &str) {
        self.evict_if_expired(key);
        match self.data.get_mut(key) {
            Some(Entry::Index(set)) => {
                set.insert(member.to_string());
            }
            _ => {
                let mut set = BTreeSet::new();
                set.insert(member.to_string());
                self.data.insert(key.to_string(), Entry::Index(set));
            }
        }
    }
}

/// Mutex-guarded in-memory `StatStore`.
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            state: Mutex::new(State::new()),
        }
    }

    /// Advance the store's clock without waiting, so tests can force keys
    /// past their expiration deadline.
    pub fn advance_clock(&self, by: Duration) {
        let mut state = self.state.lock();
        state.clock_skew += by;
    }

    /// Number of live (non-expired) keys. Diagnostic only.
    pub fn key_count(&self) -> usize {
        let mut state = self.state.lock();
        let keys: Vec<String> = state.data.keys().cloned().collect();
        keys.iter()
            .filter(|k| {
                state.evict_if_expired(k);
                state.data.contains_key(k.as_str())
            })
            .count()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StatStore for MemoryStore {
    fn atomic(&self, step: &mut dyn FnMut(&mut dyn Keyspace)) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        step(&mut *state);
        Ok(())
    }

    fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        let mut state = self.state.lock();
        Ok(keys.iter().map(|k| state.get_text(k)).collect())
    }

    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        state.evict_if_expired(key);
        let inserted = if state.data.contains_key(key) {
            false
        } else {
            state
                .data
                .insert(key.to_string(), Entry::Text(value.to_string()));
            true
        };
        state.expire(key, ttl);
        Ok(inserted)
    }

    fn list_range(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        let mut state = self.state.lock();
        state.evict_if_expired(key);
        match state.data.get(key) {
            Some(Entry::List(list)) => Ok(list.iter().take(limit).cloned().collect()),
            _ => Ok(Vec::new()),
        }
    }

    fn index_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if let Some(Entry::Index(set)) = state.data.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    fn index_scan(&self, key: &str, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut state = self.state.lock();
        state.evict_if_expired(key);
        match state.data.get(key) {
            Some(Entry::Index(set)) => Ok(set
                .iter()
                .filter(|m| glob_match(m.as_bytes(), pattern.as_bytes(), 0, 0))
                .cloned()
                .collect()),
            _ => Ok(Vec::new()),
        }
    }
}

/// Redis-style glob matching: `*`, `?` and `[...]` classes with `^` negation
/// and `a-z` ranges.
pub(crate) fn glob_match(key: &[u8], pattern: &[u8], k_idx: usize, p_idx: usize) -> bool {
    if p_idx >= pattern.len() {
        return k_idx >= key.len();
    }

    let p_char = pattern[p_idx];

    if p_char == b'*' {
        // Try matching zero or more characters
        for i in k_idx..=key.len() {
            if glob_match(key, pattern, i, p_idx + 1) {
                return true;
            }
        }
        false
    } else if p_char == b'?' {
        if k_idx >= key.len() {
            false
        } else {
            glob_match(key, pattern, k_idx + 1, p_idx + 1)
        }
    } else if p_char == b'[' {
        let mut bracket_end = p_idx + 1;
        while bracket_end < pattern.len() && pattern[bracket_end] != b']' {
            bracket_end += 1;
        }
        if bracket_end >= pattern.len() {
            return false;
        }

        let char_set = &pattern[p_idx + 1..bracket_end];
        let (negate, char_set) = if !char_set.is_empty() && char_set[0] == b'^' {
            (true, &char_set[1..])
        } else {
            (false, char_set)
        };

        if k_idx >= key.len() {
            return false;
        }

        let mut matched = false;
        let mut i = 0;
        while i < char_set.len() {
            if i + 2 < char_set.len() && char_set[i + 1] == b'-' {
                if (char_set[i]..=char_set[i + 2]).contains(&key[k_idx]) {
                    matched = true;
                }
                i += 3;
            } else {
                if char_set[i] == key[k_idx] {
                    matched = true;
                }
                i += 1;
            }
        }

        if negate {
            matched = !matched;
        }

        if matched {
            glob_match(key, pattern, k_idx + 1, bracket_end + 1)
        } else {
            false
        }
    } else if k_idx >= key.len() || key[k_idx] != p_char {
        false
    } else {
        glob_match(key, pattern, k_idx + 1, p_idx + 1)
    }
}
