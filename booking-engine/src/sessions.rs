//! Locally held payment-session metadata

use crate::{models::PaymentSession, EngineResult};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Lookup of payment-session metadata by booking
#[async_trait]
pub trait PaymentSessionStore: Send + Sync {
    async fn session_for_booking(&self, booking_id: &str) -> EngineResult<Option<PaymentSession>>;
}

/// Process-local session store; reset on restart
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, PaymentSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, session: PaymentSession) {
        self.sessions
            .write()
            .await
            .insert(session.booking_id.clone(), session);
    }
}

#[async_trait]
impl PaymentSessionStore for InMemorySessionStore {
    async fn session_for_booking(&self, booking_id: &str) -> EngineResult<Option<PaymentSession>> {
        Ok(self.sessions.read().await.get(booking_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_record_and_lookup() {
        let store = InMemorySessionStore::new();
        assert!(store.session_for_booking("BK-1").await.unwrap().is_none());

        store
            .record(PaymentSession {
                session_id: "sess-1".into(),
                booking_id: "BK-1".into(),
                provider: "wallet".into(),
                platform_fee: Some(42),
                created_at: Utc::now(),
            })
            .await;

        let session = store.session_for_booking("BK-1").await.unwrap().unwrap();
        assert_eq!(session.platform_fee, Some(42));
    }
}
