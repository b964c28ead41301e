/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - policy: PolicyEngine, verifier: TokenVerifier, forwarder: Forwarder
 * - Clone 前提で持つ (内部は Arc で cheap)
 */
use std::sync::Arc;

use crate::services::auth::TokenVerifier;
use crate::services::policy::PolicyEngine;
use crate::services::proxy::Forwarder;

#[derive(Clone)]
pub struct AppState {
    pub policy: Arc<PolicyEngine>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub forwarder: Arc<Forwarder>,
}

impl AppState {
    pub fn new(
        policy: Arc<PolicyEngine>,
        verifier: Arc<dyn TokenVerifier>,
        forwarder: Arc<Forwarder>,
    ) -> Self {
        Self {
            policy,
            verifier,
            forwarder,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("policy", &self.policy)
            .field("forwarder", &self.forwarder)
            .finish_non_exhaustive()
    }
}
