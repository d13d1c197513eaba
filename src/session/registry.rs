//! Tenant → session lookup.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{SessionHandle, SessionSettings, spawn};
use crate::model::TenantId;
use crate::notify::Notifier;
use crate::preferences::PreferenceStore;
use crate::radio::RadioSource;
use crate::resolver::Resolver;
use crate::transport::VoiceGateway;

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct SessionContext {
    pub resolver: Arc<dyn Resolver>,
    pub gateway: Arc<dyn VoiceGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub radio: Arc<dyn RadioSource>,
    pub settings: SessionSettings,
}

/// Lazily starts one session per tenant.
pub struct SessionRegistry {
    ctx: SessionContext,
    sessions: Mutex<HashMap<TenantId, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            ctx,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The tenant's session, started on first use. A session whose task
    /// has exited is replaced.
    pub fn get_or_create(&self, tenant: TenantId) -> SessionHandle {
        let mut sessions = self.sessions.lock();
        if let Some(handle) = sessions.get(&tenant)
            && !handle.is_closed()
        {
            return handle.clone();
        }

        let (handle, _task) = spawn(tenant, self.ctx.clone());
        tracing::debug!(target: "session", %tenant, "Created session");
        sessions.insert(tenant, handle.clone());
        handle
    }

    /// The tenant's session if one is running.
    pub fn get(&self, tenant: TenantId) -> Option<SessionHandle> {
        self.sessions
            .lock()
            .get(&tenant)
            .filter(|h| !h.is_closed())
            .cloned()
    }

    /// The radio source sessions refill from.
    pub fn radio(&self) -> Arc<dyn RadioSource> {
        self.ctx.radio.clone()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Stop every session.
    pub async fn shutdown_all(&self) {
        let handles: Vec<SessionHandle> = self.sessions.lock().drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mock_context;

    #[tokio::test]
    async fn test_get_or_create_reuses_sessions() {
        let registry = SessionRegistry::new(mock_context());
        assert!(registry.get(TenantId(1)).is_none());

        let first = registry.get_or_create(TenantId(1));
        let again = registry.get_or_create(TenantId(1));
        registry.get_or_create(TenantId(2));

        assert_eq!(first.tenant(), again.tenant());
        assert_eq!(registry.len(), 2);
        assert!(registry.get(TenantId(1)).is_some());
    }

    #[tokio::test]
    async fn test_closed_sessions_are_replaced() {
        let registry = SessionRegistry::new(mock_context());
        let handle = registry.get_or_create(TenantId(1));
        handle.shutdown().await;
        for _ in 0..50 {
            if handle.is_closed() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        assert!(handle.is_closed());

        let fresh = registry.get_or_create(TenantId(1));
        assert!(!fresh.is_closed());
        assert!(fresh.summary().await.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_all() {
        let registry = SessionRegistry::new(mock_context());
        registry.get_or_create(TenantId(1));
        registry.get_or_create(TenantId(2));
        registry.shutdown_all().await;
        assert!(registry.is_empty());
    }
}
