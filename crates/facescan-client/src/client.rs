use crate::auth::{AuthClient, AuthError};
use crate::cache::RequestCache;
use crate::session::SessionStore;
use crate::transport::Transport;
use std::sync::Arc;

/// Auth calls and the request cache sharing one transport and session.
pub struct FaceClient {
    pub auth: AuthClient,
    pub cache: RequestCache,
}

impl FaceClient {
    pub fn new(transport: Arc<dyn Transport>, session: Arc<dyn SessionStore>) -> Self {
        Self {
            auth: AuthClient::new(transport.clone(), session.clone()),
            cache: RequestCache::new(transport, session),
        }
    }

    /// Log out and drop every piece of cached client state.
    pub async fn logout(&self) -> Result<(), AuthError> {
        self.cache.clear();
        self.auth.logout().await
    }
}
