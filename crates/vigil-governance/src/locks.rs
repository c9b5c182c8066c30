use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Striped per-agent ordering points.
///
/// Permission checks hold the read side while they consult and fill the
/// cache; tier changes hold the write side across "record tier, then
/// invalidate". Unrelated agents only contend when they share a stripe.
pub struct AgentLocks {
    stripes: Box<[RwLock<()>]>,
}

impl AgentLocks {
    pub fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| RwLock::new(())).collect(),
        }
    }

    /// `agent` must already be normalized.
    pub fn read(&self, agent: &str) -> RwLockReadGuard<'_, ()> {
        self.stripe(agent).read()
    }

    /// `agent` must already be normalized.
    pub fn write(&self, agent: &str) -> RwLockWriteGuard<'_, ()> {
        self.stripe(agent).write()
    }

    fn stripe(&self, agent: &str) -> &RwLock<()> {
        &self.stripes[stripe_index(agent, self.stripes.len())]
    }
}

pub(crate) fn stripe_index(agent: &str, stripes: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    agent.hash(&mut hasher);
    (hasher.finish() % stripes as u64) as usize
}
