use bytes::Bytes;
use std::{
    collections::{HashMap, VecDeque},
    time::{Duration, SystemTime},
};

pub const DEFAULT_MAX_USERS: usize = 4;
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Latest screenshots, one per user, bounded by count and age.
///
/// Keys are kept in first-insertion order. Replacing an existing key's
/// screenshot leaves it where it is, so a user who keeps uploading can still
/// be the first evicted.
pub struct Store {
    data: HashMap<String, ScreenshotRecord>,
    order: VecDeque<String>,
    max_users: usize,
    ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct ScreenshotRecord {
    pub data: Bytes,
    pub timestamp: SystemTime,
}

impl Default for Store {
    fn default() -> Self {
        Store::new(DEFAULT_MAX_USERS, DEFAULT_TTL)
    }
}

impl Store {
    pub fn new(max_users: usize, ttl: Duration) -> Self {
        Store {
            data: HashMap::with_capacity(max_users + 1),
            order: VecDeque::with_capacity(max_users + 1),
            max_users,
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn put(&mut self, user_id: &str, data: Bytes) -> Option<String> {
        self.put_at(user_id, data, SystemTime::now())
    }

    /// Insert or replace `user_id`'s screenshot, returning the id evicted to
    /// stay within `max_users`, if any.
    pub fn put_at(&mut self, user_id: &str, data: Bytes, timestamp: SystemTime) -> Option<String> {
        let record = ScreenshotRecord { data, timestamp };
        if self.data.insert(user_id.to_string(), record).is_none() {
            self.order.push_back(user_id.to_string());
        }

        if self.data.len() > self.max_users {
            let evicted = self.order.pop_front()?;
            self.data.remove(&evicted);
            return Some(evicted);
        }
        None
    }

    /// Doesn't look at the TTL: an expired screenshot is still served until
    /// the next `list_live` prunes it.
    pub fn get(&self, user_id: &str) -> Option<Bytes> {
        self.data.get(user_id).map(|record| record.data.clone())
    }

    pub fn list_live(&mut self, now: SystemTime) -> Vec<String> {
        let ttl = self.ttl;
        let data = &mut self.data;
        self.order.retain(|user_id| {
            let expired = match data.get(user_id) {
                // Timestamps ahead of `now` (clock skew) count as fresh
                Some(record) => now
                    .duration_since(record.timestamp)
                    .map(|age| age > ttl)
                    .unwrap_or(false),
                None => true,
            };
            if expired {
                data.remove(user_id);
            }
            !expired
        });
        self.order.iter().cloned().collect()
    }
}
