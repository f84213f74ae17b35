use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::{DashMap, mapref::entry::Entry};
use uuid::Uuid;

use crate::error::{CheckoutError, CheckoutResult};

/// Client token scoped to the session that sent it.
///
/// Orders store the same triple (`user_id`, `session_id`, `idempotency_key`),
/// so a cache miss resolves against the same scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    pub customer_id: Uuid,
    pub session_id: String,
    pub token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyState {
    InFlight,
    Resolved(Uuid),
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    state: IdempotencyState,
    touched_at: Instant,
}

#[derive(Debug)]
pub enum Admission {
    /// First attempt with this token; the guard releases the token if dropped unresolved.
    Proceed(InFlightGuard),
    /// The token already produced this order.
    Replay(Uuid),
}

/// Keyed cache with TTL holding `absent -> in-flight -> resolved(order)` per token.
#[derive(Clone, Debug)]
pub struct IdempotencyStore {
    slots: Arc<DashMap<IdempotencyKey, Slot>>,
    ttl: Duration,
}

impl IdempotencyStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Atomically claim `key` for a new attempt, or report what it already holds.
    pub fn admit(&self, key: IdempotencyKey) -> CheckoutResult<Admission> {
        self.cleanup();
        let now = Instant::now();
        match self.slots.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let slot = *occupied.get();
                if now.duration_since(slot.touched_at) >= self.ttl {
                    occupied.insert(Slot {
                        state: IdempotencyState::InFlight,
                        touched_at: now,
                    });
                    return Ok(Admission::Proceed(self.guard(key)));
                }
                match slot.state {
                    IdempotencyState::Resolved(order_id) => Ok(Admission::Replay(order_id)),
                    IdempotencyState::InFlight => Err(CheckoutError::AlreadyProcessing),
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot {
                    state: IdempotencyState::InFlight,
                    touched_at: now,
                });
                Ok(Admission::Proceed(self.guard(key)))
            }
        }
    }

    pub fn state(&self, key: &IdempotencyKey) -> Option<IdempotencyState> {
        self.slots
            .get(key)
            .filter(|slot| slot.touched_at.elapsed() < self.ttl)
            .map(|slot| slot.state)
    }

    pub fn cleanup(&self) {
        let now = Instant::now();
        self.slots
            .retain(|_, slot| now.duration_since(slot.touched_at) < self.ttl);
    }

    fn guard(&self, key: IdempotencyKey) -> InFlightGuard {
        InFlightGuard {
            store: self.clone(),
            key,
            settled: false,
        }
    }
}

#[derive(Debug)]
pub struct InFlightGuard {
    store: IdempotencyStore,
    key: IdempotencyKey,
    settled: bool,
}

impl InFlightGuard {
    pub fn key(&self) -> &IdempotencyKey {
        &self.key
    }

    /// Terminal transition; later attempts with the same token replay `order_id`.
    pub fn resolve(mut self, order_id: Uuid) {
        self.store.slots.insert(
            self.key.clone(),
            Slot {
                state: IdempotencyState::Resolved(order_id),
                touched_at: Instant::now(),
            },
        );
        self.settled = true;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.store
                .slots
                .remove_if(&self.key, |_, slot| slot.state == IdempotencyState::InFlight);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(token: &str) -> IdempotencyKey {
        IdempotencyKey {
            customer_id: Uuid::nil(),
            session_id: "session-1".into(),
            token: token.into(),
        }
    }

    #[test]
    fn resolved_token_replays_order() {
        let store = IdempotencyStore::new(Duration::from_secs(60));
        let order_id = Uuid::new_v4();

        let Ok(Admission::Proceed(guard)) = store.admit(key("t1")) else {
            panic!("first attempt should proceed");
        };
        guard.resolve(order_id);

        assert!(matches!(store.admit(key("t1")), Ok(Admission::Replay(id)) if id == order_id));
        assert_eq!(store.state(&key("t1")), Some(IdempotencyState::Resolved(order_id)));
    }

    #[test]
    fn concurrent_attempt_is_rejected_while_in_flight() {
        let store = IdempotencyStore::new(Duration::from_secs(60));
        let first = store.admit(key("t2"));
        assert!(matches!(first, Ok(Admission::Proceed(_))));
        assert!(matches!(
            store.admit(key("t2")),
            Err(CheckoutError::AlreadyProcessing)
        ));
        drop(first);
    }

    #[test]
    fn failed_attempt_releases_token() {
        let store = IdempotencyStore::new(Duration::from_secs(60));
        {
            let _attempt = store.admit(key("t3"));
            assert_eq!(store.state(&key("t3")), Some(IdempotencyState::InFlight));
        }
        assert_eq!(store.state(&key("t3")), None);
        assert!(matches!(store.admit(key("t3")), Ok(Admission::Proceed(_))));
    }

    #[test]
    fn tokens_are_scoped_per_session() {
        let store = IdempotencyStore::new(Duration::from_secs(60));
        let Ok(Admission::Proceed(guard)) = store.admit(key("shared")) else {
            panic!("first attempt should proceed");
        };
        guard.resolve(Uuid::new_v4());

        let mut other_session = key("shared");
        other_session.session_id = "session-2".into();
        assert!(matches!(store.admit(other_session), Ok(Admission::Proceed(_))));
    }

    #[test]
    fn expired_entries_are_forgotten() {
        let store = IdempotencyStore::new(Duration::ZERO);
        let Ok(Admission::Proceed(guard)) = store.admit(key("t4")) else {
            panic!("first attempt should proceed");
        };
        guard.resolve(Uuid::new_v4());
        assert_eq!(store.state(&key("t4")), None);
        assert!(matches!(store.admit(key("t4")), Ok(Admission::Proceed(_))));
    }
}
