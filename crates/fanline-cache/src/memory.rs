//! In-Process Cache Backend
//!
//! A mutex-guarded map with lazy TTL expiry. Expired entries are dropped
//! when touched, not by a background task, which keeps behaviour
//! deterministic under test.
//!
//! The whole map sits behind a single async mutex. That makes
//! [`MemoryCache::pipeline`] trivially atomic (one lock acquisition spans
//! the batch) at the cost of write concurrency, which is acceptable for a
//! cache whose contended path is a handful of in-memory map operations.

use crate::error::{CacheError, Result};
use crate::{CacheOp, CacheReply, KvCache};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
enum Value {
    Bytes(Bytes),
    List(Vec<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory [`KvCache`] implementation.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a live entry, dropping it if expired.
    fn live<'a>(map: &'a mut HashMap<String, Entry>, key: &str, now: Instant) -> Option<&'a Entry> {
        let expired = map.get(key).map(|e| e.is_expired(now)).unwrap_or(false);
        if expired {
            map.remove(key);
            return None;
        }
        map.get(key)
    }

    fn apply_set(map: &mut HashMap<String, Entry>, key: &str, value: Bytes, ttl: Duration) {
        map.insert(
            key.to_string(),
            Entry {
                value: Value::Bytes(value),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    fn apply_rpush(
        map: &mut HashMap<String, Entry>,
        key: &str,
        values: &[String],
        now: Instant,
    ) -> Result<u64> {
        let expired = map.get(key).map(|e| e.is_expired(now)).unwrap_or(false);
        if expired {
            map.remove(key);
        }
        match map.get_mut(key) {
            Some(entry) => match &mut entry.value {
                Value::List(list) => {
                    list.extend(values.iter().cloned());
                    Ok(list.len() as u64)
                }
                Value::Bytes(_) => Err(CacheError::WrongKind(key.to_string())),
            },
            None => {
                let list: Vec<String> = values.to_vec();
                let len = list.len() as u64;
                map.insert(
                    key.to_string(),
                    Entry {
                        value: Value::List(list),
                        // A bare RPUSH creates a key with no explicit TTL;
                        // callers follow up with an Expire in the same
                        // pipeline. Far-future placeholder until then.
                        expires_at: now + Duration::from_secs(365 * 24 * 3600),
                    },
                );
                Ok(len)
            }
        }
    }

    fn apply_expire(map: &mut HashMap<String, Entry>, key: &str, ttl: Duration, now: Instant) {
        if let Some(entry) = map.get_mut(key) {
            if !entry.is_expired(now) {
                entry.expires_at = now + ttl;
            }
        }
    }
}

#[async_trait]
impl KvCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let mut map = self.entries.lock().await;
        let now = Instant::now();
        match Self::live(&mut map, key, now) {
            Some(entry) => match &entry.value {
                Value::Bytes(b) => Ok(Some(b.clone())),
                Value::List(_) => Err(CacheError::WrongKind(key.to_string())),
            },
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        let mut map = self.entries.lock().await;
        Self::apply_set(&mut map, key, value, ttl);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut map = self.entries.lock().await;
        let now = Instant::now();
        Ok(Self::live(&mut map, key, now).is_some())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut map = self.entries.lock().await;
        map.remove(key);
        Ok(())
    }

    async fn rpush(&self, key: &str, values: &[String]) -> Result<u64> {
        let mut map = self.entries.lock().await;
        let now = Instant::now();
        Self::apply_rpush(&mut map, key, values, now)
    }

    async fn lrange(&self, key: &str, start: i64, end: i64) -> Result<Vec<String>> {
        let mut map = self.entries.lock().await;
        let now = Instant::now();
        let Some(entry) = Self::live(&mut map, key, now) else {
            return Ok(Vec::new());
        };
        let list = match &entry.value {
            Value::List(list) => list,
            Value::Bytes(_) => return Err(CacheError::WrongKind(key.to_string())),
        };

        let len = list.len() as i64;
        let mut from = if start < 0 { len + start } else { start };
        let mut to = if end < 0 { len + end } else { end };
        from = from.max(0);
        to = to.min(len - 1);
        if from > to || from >= len {
            return Ok(Vec::new());
        }
        Ok(list[from as usize..=to as usize].to_vec())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut map = self.entries.lock().await;
        let now = Instant::now();
        Self::apply_expire(&mut map, key, ttl, now);
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Bytes>>> {
        let mut map = self.entries.lock().await;
        let now = Instant::now();
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let value = match Self::live(&mut map, key, now) {
                Some(entry) => match &entry.value {
                    Value::Bytes(b) => Some(b.clone()),
                    Value::List(_) => None,
                },
                None => None,
            };
            out.push(value);
        }
        Ok(out)
    }

    async fn pipeline(&self, ops: Vec<CacheOp>) -> Result<Vec<CacheReply>> {
        let mut map = self.entries.lock().await;
        let now = Instant::now();
        let mut replies = Vec::with_capacity(ops.len());
        for op in ops {
            let reply = match op {
                CacheOp::Set { key, value, ttl } => {
                    Self::apply_set(&mut map, &key, value, ttl);
                    CacheReply::Ok
                }
                CacheOp::Del { key } => {
                    map.remove(&key);
                    CacheReply::Ok
                }
                CacheOp::RPush { key, values } => {
                    let len = Self::apply_rpush(&mut map, &key, &values, now)?;
                    CacheReply::Len(len)
                }
                CacheOp::Expire { key, ttl } => {
                    Self::apply_expire(&mut map, &key, ttl, now);
                    CacheReply::Ok
                }
            };
            replies.push(reply);
        }
        Ok(replies)
    }

    async fn flush_all(&self) -> Result<()> {
        self.entries.lock().await.clear();
        Ok(())
    }

    async fn info_memory(&self) -> Result<String> {
        let map = self.entries.lock().await;
        let mut bytes = 0usize;
        for (key, entry) in map.iter() {
            bytes += key.len();
            bytes += match &entry.value {
                Value::Bytes(b) => b.len(),
                Value::List(list) => list.iter().map(|s| s.len()).sum(),
            };
        }
        Ok(format!("used_memory:{}\nkeys:{}", bytes, map.len()))
    }
}
