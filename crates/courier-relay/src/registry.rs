//! First-claim-wins identity registry.
//!
//! Claims are process-lifetime; there is no release. The registry sits
//! behind its own mutex rather than inside the hub so the HTTP
//! registration path never blocks routing.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::SystemTime,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The identifier was free and now belongs to the caller.
    Created,
    /// The identifier was already claimed.
    Conflict,
}

#[derive(Debug, Clone)]
pub struct RegistrationRecord {
    pub claimed_at: SystemTime,
}

#[derive(Debug, Default)]
pub struct IdentityRegistry {
    inner: Mutex<HashMap<String, RegistrationRecord>>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim `id`. The first caller wins; everyone after gets
    /// [`ClaimOutcome::Conflict`].
    pub fn claim(&self, id: &str) -> ClaimOutcome {
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        if inner.contains_key(id) {
            return ClaimOutcome::Conflict;
        }
        inner.insert(
            id.to_string(),
            RegistrationRecord {
                claimed_at: SystemTime::now(),
            },
        );
        ClaimOutcome::Created
    }

    pub fn is_claimed(&self, id: &str) -> bool {
        self.inner.lock().expect("registry mutex poisoned").contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn first_claim_wins() {
        let registry = IdentityRegistry::new();
        assert_eq!(registry.claim("alice"), ClaimOutcome::Created);
        assert_eq!(registry.claim("alice"), ClaimOutcome::Conflict);
        assert!(registry.is_claimed("alice"));
        assert!(!registry.is_claimed("bob"));
    }

    #[test]
    fn concurrent_claims_produce_exactly_one_winner() {
        let registry = Arc::new(IdentityRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.claim("contested"))
            })
            .collect();

        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| *o == ClaimOutcome::Created)
            .count();
        assert_eq!(created, 1);
    }
}
