use std::sync::Arc;

use crate::config::AppConfig;
use crate::infra::audit::AuditSink;
use crate::security::config::SecurityConfig;
use crate::security::jwt::JwtManager;
use crate::session::{RotationEngine, SessionRegistry, TokenIssuer};
use crate::store::CredentialStore;

pub struct AppState {
    pub config: AppConfig,
    pub security: SecurityConfig,
    pub jwt: JwtManager,
    pub store: Arc<dyn CredentialStore>,
    pub audit: Arc<dyn AuditSink>,
    pub issuer: TokenIssuer,
    pub rotation: RotationEngine,
    pub registry: SessionRegistry,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        security: SecurityConfig,
        store: Arc<dyn CredentialStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Arc<Self> {
        let jwt = JwtManager::new(config.jwt_secret.clone(), config.access_ttl);
        let issuer = TokenIssuer::new(store.clone(), jwt.clone(), config.refresh_ttl);
        let rotation = RotationEngine::new(
            store.clone(),
            jwt.clone(),
            audit.clone(),
            config.refresh_ttl,
        );
        let registry = SessionRegistry::new(store.clone());
        Arc::new(AppState {
            config,
            security,
            jwt,
            store,
            audit,
            issuer,
            rotation,
            registry,
        })
    }
}
