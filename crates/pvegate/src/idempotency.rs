//! Process-local idempotency cache.
//!
//! Keys are scoped by endpoint path so the same client key never collides
//! across `/v1/actions/plan` and `/v1/actions/apply`. The critical section is
//! a plain map operation; no lock is held across I/O.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::http::StatusCode;

/// A completed response recorded under an idempotency key.
///
/// `payload_hash` is immutable for the life of the entry; a lookup with a
/// different hash is a conflict, never an overwrite.
#[derive(Debug, Clone)]
pub struct StoredResponse {
    pub payload_hash: String,
    pub status: StatusCode,
    pub content_type: String,
    pub body: Vec<u8>,
}

#[derive(Debug)]
struct Entry {
    response: StoredResponse,
    expires_at: Instant,
}

/// Outcome of consulting the store for `(scope, key, payload_hash)`.
#[derive(Debug)]
pub enum Lookup {
    /// No live entry; execution proceeds and the outcome should be stored.
    Miss,
    /// Same payload seen before; replay the recorded response byte-for-byte.
    Replay(StoredResponse),
    /// The key is bound to a different payload hash.
    Conflict,
}

/// Shared in-memory store; all mutation goes through one mutex.
#[derive(Debug, Default)]
pub struct IdempotencyStore {
    records: Mutex<HashMap<(String, String), Entry>>,
}

impl IdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consults the store. Expired entries are evicted and treated as
    /// misses. Replayed bodies are copies; callers never alias stored bytes.
    pub fn lookup(&self, scope: &str, key: &str, payload_hash: &str) -> Lookup {
        let now = Instant::now();
        let map_key = (scope.to_string(), key.to_string());
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match records.get(&map_key) {
            None => Lookup::Miss,
            Some(entry) if entry.expires_at <= now => {
                records.remove(&map_key);
                Lookup::Miss
            }
            Some(entry) if entry.response.payload_hash != payload_hash => Lookup::Conflict,
            Some(entry) => Lookup::Replay(entry.response.clone()),
        }
    }

    /// Records a completed response (success or error) under the key.
    /// Conflict responses are never stored by callers.
    pub fn store(&self, scope: &str, key: &str, response: StoredResponse, ttl: Duration) {
        let entry = Entry {
            response,
            expires_at: Instant::now() + ttl,
        };
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        records.insert((scope.to_string(), key.to_string()), entry);
    }
}
