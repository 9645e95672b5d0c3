use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Mutex, MutexGuard, PoisonError},
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::alarm::{AlarmId, ScheduledAlarm};

// https://stackoverflow.com/questions/79314434/rust-serde-serialization-to-from-vec-into-hashmap
pub trait GetId<T> {
    fn get_id(&self) -> &T;
}

/// id keyed map that serializes as a plain list of its values
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(from = "Vec<V>", into = "Vec<V>")]
pub struct Collection<K, V>
where
    K: Eq + Hash + Clone,
    V: GetId<K> + Clone,
{
    pub data: HashMap<K, V>,
}

impl<K, V> Default for Collection<K, V>
where
    K: Eq + Hash + Clone,
    V: GetId<K> + Clone,
{
    fn default() -> Self {
        Self {
            data: HashMap::default(),
        }
    }
}

impl<K, V> Collection<K, V>
where
    K: Eq + Hash + Clone,
    V: GetId<K> + Clone,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    pub fn insert(&mut self, item: V) -> Option<V> {
        let id = item.get_id().to_owned();
        self.data.insert(id, item)
    }

    pub fn remove(&mut self, id: &K) -> Option<V> {
        self.data.remove(id)
    }

    #[must_use]
    pub fn get(&self, id: &K) -> Option<&V> {
        self.data.get(id)
    }
}

impl<K, V> From<Vec<V>> for Collection<K, V>
where
    K: Eq + Hash + Clone,
    V: GetId<K> + Clone,
{
    fn from(value: Vec<V>) -> Self {
        let mut obj: Self = Self::new();
        value.into_iter().for_each(|v| {
            obj.insert(v);
        });
        obj
    }
}

impl<K, V> From<Collection<K, V>> for Vec<V>
where
    K: Eq + Hash + Clone,
    V: GetId<K> + Clone,
{
    fn from(val: Collection<K, V>) -> Self {
        Self::from_iter(val.data.into_values())
    }
}

/// bookkeeping of which alarm is armed for which identity
///
/// One global lock guards every entry, alarm counts are small. The registry does no I/O,
/// persisting it is the scheduler's job.
#[derive(Debug, Default)]
pub struct Registry {
    alarms: Mutex<Collection<AlarmId, ScheduledAlarm>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_alarms(alarms: Vec<ScheduledAlarm>) -> Self {
        Self {
            alarms: Mutex::new(Collection::from(alarms)),
        }
    }

    // entries stay consistent even if a holder panicked, every write is a single insert/remove
    fn lock(&self) -> MutexGuard<'_, Collection<AlarmId, ScheduledAlarm>> {
        self.alarms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// replaces the entry for the alarm's identity, returning the one it replaced
    pub fn upsert(&self, alarm: ScheduledAlarm) -> Option<ScheduledAlarm> {
        debug!("registry: upsert {} at {}", alarm.identity, alarm.fire_at);
        self.lock().insert(alarm)
    }

    /// removing an unknown identity is not an error
    pub fn remove(&self, identity: AlarmId) -> Option<ScheduledAlarm> {
        let removed = self.lock().remove(&identity);
        debug!(
            "registry: remove {identity} ({})",
            if removed.is_some() { "present" } else { "absent" }
        );
        removed
    }

    /// removes the entry only if it is still the one armed for `fire_at`
    pub fn remove_if_fire_at(&self, identity: AlarmId, fire_at: i64) -> bool {
        let mut alarms = self.lock();
        match alarms.get(&identity) {
            Some(entry) if entry.fire_at == fire_at => {
                alarms.remove(&identity);
                debug!("registry: cleared {identity} fired at {fire_at}");
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn lookup(&self, identity: AlarmId) -> Option<ScheduledAlarm> {
        self.lock().get(&identity).cloned()
    }

    /// every entry, soonest first
    #[must_use]
    pub fn snapshot(&self) -> Vec<ScheduledAlarm> {
        let mut alarms: Vec<_> = self.lock().data.values().cloned().collect();
        alarms.sort_by_key(|alarm| (alarm.fire_at, alarm.identity));
        alarms
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
