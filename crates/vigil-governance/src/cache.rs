use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use vigil_config::CacheConfig;
use vigil_core::{Decision, Tier, VigilError};

use crate::clock::Clock;
use crate::locks::stripe_index;
use crate::normalize;
use crate::singleflight::Flight;

/// `normalize(agent_id) | normalize(action_type) | complexity | tier`.
///
/// The components are kept apart rather than joined into one string so an
/// agent id containing `|` cannot collide with another agent's entries.
/// Complexity is part of the key: the same action type at a higher
/// complexity must be gated again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    agent: String,
    action: String,
    complexity: u8,
    tier: Tier,
}

impl CacheKey {
    pub fn new(agent_id: &str, action_type: &str, complexity: u8, tier: Tier) -> Self {
        Self {
            agent: normalize(agent_id),
            action: normalize(action_type),
            complexity,
            tier,
        }
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn complexity(&self) -> u8 {
        self.complexity
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|c{}|{}", self.agent, self.action, self.complexity, self.tier.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: Decision,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    /// Global access order; breaks `last_accessed_at` ties.
    access_tick: u64,
}

impl CacheEntry {
    /// `now == expires_at` is already expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    fn integrity(&self, key: &CacheKey) -> vigil_core::Result<()> {
        if self.key != *key {
            return Err(VigilError::CacheCorruption(format!(
                "entry stored under {key} claims key {}",
                self.key
            )));
        }
        if self.expires_at < self.created_at {
            return Err(VigilError::CacheCorruption(format!(
                "entry {key} expires at {} before it was created at {}",
                self.expires_at, self.created_at
            )));
        }
        Ok(())
    }
}

/// How [`GovernanceCache::get_or_compute`] produced its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Served from a live entry.
    Hit,
    /// This caller ran the computation.
    Computed,
    /// Shared the result of another caller's in-flight computation.
    Coalesced,
    /// Waited for another caller, gave up, and computed for itself.
    Recomputed,
}

impl Lookup {
    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Hit | Self::Coalesced)
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub coalesced: u64,
    pub corrupt_discarded: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
    coalesced: AtomicU64,
    corrupt_discarded: AtomicU64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

#[derive(Default)]
struct Shard {
    entries: HashMap<CacheKey, CacheEntry>,
    /// access tick → key, oldest first.
    lru: BTreeMap<u64, CacheKey>,
    /// Bumped by every invalidation so in-flight results computed before it
    /// are not stored after it.
    epoch: u64,
}

impl Shard {
    /// Returns `true` when the key was not present before.
    fn insert(&mut self, entry: CacheEntry) -> bool {
        self.lru.insert(entry.access_tick, entry.key.clone());
        match self.entries.insert(entry.key.clone(), entry) {
            Some(old) => {
                self.lru.remove(&old.access_tick);
                false
            }
            None => true,
        }
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(&entry.access_tick);
        Some(entry)
    }

    fn touch(&mut self, key: &CacheKey, now: DateTime<Utc>, tick: u64) -> Option<Decision> {
        let entry = self.entries.get_mut(key)?;
        self.lru.remove(&entry.access_tick);
        entry.access_tick = tick;
        entry.last_accessed_at = now;
        self.lru.insert(tick, key.clone());
        Some(entry.value.clone())
    }

    fn pop_lru(&mut self) -> Option<CacheEntry> {
        let (_, key) = self.lru.pop_first()?;
        self.entries.remove(&key)
    }

    fn oldest_tick(&self) -> Option<u64> {
        self.lru.first_key_value().map(|(tick, _)| *tick)
    }
}

enum EntryState {
    Missing,
    Live,
    Expired,
    Corrupt(VigilError),
}

/// TTL + LRU cache of permission decisions.
///
/// Entries are sharded by normalized agent id, so everything one agent has
/// cached lives behind one shard lock and [`invalidate_agent`](Self::invalidate_agent)
/// touches a single shard. Capacity is global: any agent may use all of it,
/// and exceeding it evicts the least recently accessed entry of the whole
/// cache.
pub struct GovernanceCache {
    shards: Box<[Mutex<Shard>]>,
    capacity: usize,
    len: AtomicUsize,
    inflight: DashMap<CacheKey, Arc<Flight>>,
    inflight_wait: Duration,
    clock: Arc<dyn Clock>,
    tick: AtomicU64,
    counters: Counters,
}

impl GovernanceCache {
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let shards = config.shards.max(1);
        Self {
            shards: (0..shards).map(|_| Mutex::new(Shard::default())).collect(),
            capacity: config.capacity.max(1),
            len: AtomicUsize::new(0),
            inflight: DashMap::new(),
            inflight_wait: config.inflight_wait(),
            clock,
            tick: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, key: &CacheKey) -> Option<Decision> {
        let now = self.clock.now();
        let mut shard = self.shard(key.agent()).lock();
        let state = match shard.entries.get(key) {
            None => EntryState::Missing,
            Some(entry) => match entry.integrity(key) {
                Err(err) => EntryState::Corrupt(err),
                Ok(()) if entry.is_expired(now) => EntryState::Expired,
                Ok(()) => EntryState::Live,
            },
        };
        match state {
            EntryState::Live => {
                let hit = shard.touch(key, now, self.next_tick());
                bump(&self.counters.hits, 1);
                debug!(%key, "cache hit");
                hit
            }
            EntryState::Expired => {
                self.discard(&mut shard, key);
                bump(&self.counters.expirations, 1);
                bump(&self.counters.misses, 1);
                debug!(%key, "cache entry expired");
                None
            }
            EntryState::Corrupt(err) => {
                self.discard(&mut shard, key);
                bump(&self.counters.corrupt_discarded, 1);
                bump(&self.counters.misses, 1);
                warn!(error = %err, "discarding corrupt cache entry");
                None
            }
            EntryState::Missing => {
                bump(&self.counters.misses, 1);
                None
            }
        }
    }

    /// Read an entry without refreshing its LRU position or checking expiry.
    pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.shard(key.agent()).lock().entries.get(key).cloned()
    }

    pub fn put(&self, key: CacheKey, value: Decision, ttl: Duration) {
        {
            let mut shard = self.shard(key.agent()).lock();
            self.store(&mut shard, key, value, ttl);
        }
        self.enforce_capacity();
    }

    /// Remove every entry of the agent, whatever the action or tier.
    pub fn invalidate_agent(&self, agent_id: &str) -> usize {
        let agent = normalize(agent_id);
        let mut shard = self.shard(&agent).lock();
        shard.epoch += 1;
        let doomed: Vec<CacheKey> = shard
            .entries
            .keys()
            .filter(|key| key.agent == agent)
            .cloned()
            .collect();
        for key in &doomed {
            self.discard(&mut shard, key);
        }
        bump(&self.counters.invalidations, doomed.len() as u64);
        debug!(agent = %agent, removed = doomed.len(), "invalidated agent cache entries");
        doomed.len()
    }

    /// Evict the least recently accessed entry across all shards.
    pub fn evict(&self) -> Option<CacheKey> {
        let (_, victim) = self
            .shards
            .iter()
            .enumerate()
            .filter_map(|(i, shard)| shard.lock().oldest_tick().map(|tick| (tick, i)))
            .min()?;
        let entry = self.shards[victim].lock().pop_lru()?;
        self.len.fetch_sub(1, Ordering::Relaxed);
        bump(&self.counters.evictions, 1);
        debug!(key = %entry.key, "evicted least recently used entry");
        Some(entry.key)
    }

    /// Drop expired and corrupt entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut shard = shard.lock();
            let doomed: Vec<(CacheKey, Option<VigilError>)> = shard
                .entries
                .iter()
                .filter_map(|(key, entry)| match entry.integrity(key) {
                    Err(err) => Some((key.clone(), Some(err))),
                    Ok(()) if entry.is_expired(now) => Some((key.clone(), None)),
                    Ok(()) => None,
                })
                .collect();
            for (key, corruption) in doomed {
                self.discard(&mut shard, &key);
                match corruption {
                    Some(err) => {
                        bump(&self.counters.corrupt_discarded, 1);
                        warn!(error = %err, "discarding corrupt cache entry");
                    }
                    None => bump(&self.counters.expirations, 1),
                }
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        for shard in self.shards.iter() {
            let mut shard = shard.lock();
            shard.epoch += 1;
            self.len.fetch_sub(shard.entries.len(), Ordering::Relaxed);
            shard.entries.clear();
            shard.lru.clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CacheStats {
            entries: self.len(),
            hits: load(&self.counters.hits),
            misses: load(&self.counters.misses),
            expirations: load(&self.counters.expirations),
            evictions: load(&self.counters.evictions),
            invalidations: load(&self.counters.invalidations),
            coalesced: load(&self.counters.coalesced),
            corrupt_discarded: load(&self.counters.corrupt_discarded),
        }
    }

    /// Look the key up and, on a miss, compute it once no matter how many
    /// callers miss concurrently. The first caller runs `compute` and stores
    /// the result; the rest wait up to the configured in-flight wait and then
    /// compute for themselves.
    pub fn get_or_compute<F>(&self, key: CacheKey, ttl: Duration, compute: F) -> (Decision, Lookup)
    where
        F: FnOnce() -> Decision,
    {
        if let Some(decision) = self.get(&key) {
            return (decision, Lookup::Hit);
        }

        let (flight, leader) = match self.inflight.entry(key.clone()) {
            Entry::Occupied(e) => (Arc::clone(e.get()), false),
            Entry::Vacant(e) => {
                let flight = Arc::new(Flight::new());
                e.insert(Arc::clone(&flight));
                (flight, true)
            }
        };

        if !leader {
            bump(&self.counters.coalesced, 1);
            if let Some(decision) = flight.wait(self.inflight_wait) {
                return (decision, Lookup::Coalesced);
            }
            warn!(%key, "in-flight computation did not finish in time, recomputing");
            let epoch = self.epoch(key.agent());
            let decision = compute();
            self.store_if_epoch(key, decision.clone(), ttl, epoch);
            return (decision, Lookup::Recomputed);
        }

        let guard = FlightGuard {
            inflight: &self.inflight,
            key: &key,
            flight: &flight,
        };

        let epoch = match self.recheck(&key) {
            Ok(decision) => {
                flight.complete(decision.clone());
                drop(guard);
                return (decision, Lookup::Hit);
            }
            Err(epoch) => epoch,
        };

        let decision = compute();
        self.store_if_epoch(key.clone(), decision.clone(), ttl, epoch);
        flight.complete(decision.clone());
        drop(guard);
        (decision, Lookup::Computed)
    }

    /// A previous leader may have stored the value between our miss and
    /// taking the flight slot. Serves it as a hit, or returns the shard epoch
    /// to compute under.
    fn recheck(&self, key: &CacheKey) -> Result<Decision, u64> {
        let now = self.clock.now();
        let mut shard = self.shard(key.agent()).lock();
        let live = shard
            .entries
            .get(key)
            .is_some_and(|e| e.integrity(key).is_ok() && !e.is_expired(now));
        if !live {
            return Err(shard.epoch);
        }
        match shard.touch(key, now, self.next_tick()) {
            Some(decision) => {
                bump(&self.counters.hits, 1);
                debug!(%key, "cache hit after taking the flight slot");
                Ok(decision)
            }
            None => Err(shard.epoch),
        }
    }

    fn shard(&self, agent: &str) -> &Mutex<Shard> {
        &self.shards[stripe_index(agent, self.shards.len())]
    }

    fn epoch(&self, agent: &str) -> u64 {
        self.shard(agent).lock().epoch
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }

    fn store_if_epoch(&self, key: CacheKey, value: Decision, ttl: Duration, epoch: u64) {
        {
            let mut shard = self.shard(key.agent()).lock();
            if shard.epoch != epoch {
                debug!(%key, "agent invalidated during computation, not caching");
                return;
            }
            self.store(&mut shard, key, value, ttl);
        }
        self.enforce_capacity();
    }

    fn store(&self, shard: &mut Shard, key: CacheKey, value: Decision, ttl: Duration) {
        let now = self.clock.now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let added = shard.insert(CacheEntry {
            key,
            value,
            created_at: now,
            expires_at,
            last_accessed_at: now,
            access_tick: self.next_tick(),
        });
        if added {
            self.len.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn discard(&self, shard: &mut Shard, key: &CacheKey) {
        if shard.remove(key).is_some() {
            self.len.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Must be called without any shard lock held.
    fn enforce_capacity(&self) {
        while self.len() > self.capacity {
            if self.evict().is_none() {
                break;
            }
        }
    }
}

/// Clears the in-flight slot when the leader finishes or unwinds.
struct FlightGuard<'a> {
    inflight: &'a DashMap<CacheKey, Arc<Flight>>,
    key: &'a CacheKey,
    flight: &'a Arc<Flight>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.inflight
            .remove_if(self.key, |_, current| Arc::ptr_eq(current, self.flight));
        // No-op when the flight already completed.
        self.flight.abandon();
    }
}

/// Periodically purge expired entries. Keep the handle to abort the sweeper.
pub fn spawn_sweeper(cache: Arc<GovernanceCache>, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let removed = cache.purge_expired();
            if removed > 0 {
                debug!(removed, "swept expired cache entries");
            }
        }
    })
}
