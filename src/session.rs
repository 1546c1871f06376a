use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Session-scoped querying context. Navigating away from a wallet view calls
/// `invalidate()`; in-flight fetches are abandoned rather than force-killed,
/// so results carry a token that lets late deliveries be detected and
/// discarded instead of landing in another wallet's state.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    generation: Arc<AtomicU64>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a token bound to the current generation.
    pub fn token(&self) -> QueryToken {
        QueryToken {
            issued_at: self.generation.load(Ordering::Acquire),
            generation: Arc::clone(&self.generation),
        }
    }

    /// Expires every outstanding token.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

#[derive(Debug, Clone)]
pub struct QueryToken {
    issued_at: u64,
    generation: Arc<AtomicU64>,
}

impl QueryToken {
    pub fn is_current(&self) -> bool {
        self.generation.load(Ordering::Acquire) == self.issued_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalidation_expires_outstanding_tokens() {
        let session = SessionContext::new();
        let token = session.token();
        assert!(token.is_current());

        session.invalidate();
        assert!(!token.is_current());

        let fresh = session.token();
        assert!(fresh.is_current());
    }

    #[test]
    fn tokens_from_different_generations_are_independent() {
        let session = SessionContext::new();
        let stale = session.token();
        session.invalidate();
        let current = session.token();
        session.invalidate();

        assert!(!stale.is_current());
        assert!(!current.is_current());
    }
}
