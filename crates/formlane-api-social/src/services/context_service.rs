//! Ephemeral flow-context correlation.
//!
//! Redirect flows park their context in a TTL'd key/value store under a
//! random correlation token and reclaim it exactly once at callback time.
//! Widget flows get a second namespace keyed by the caller's session
//! identifier; entries there are cleared explicitly by the caller.

use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AuthFlowError, AuthFlowResult};
use crate::models::FlowContext;
use crate::ports::KeyValueStore;

/// Contexts not reclaimed within this window are gone; the user restarts.
const CONTEXT_TTL: Duration = Duration::from_secs(300);

/// 128 bits of correlation token entropy.
const TOKEN_BYTES: usize = 16;

const REDIRECT_NAMESPACE: &str = "authflow:state:";
const WIDGET_NAMESPACE: &str = "authflow:widget:";

/// Generate a random hex correlation token.
fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// TTL'd store for in-flight flow contexts.
#[derive(Clone)]
pub struct FlowContextStore {
    kv: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl FlowContextStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            ttl: CONTEXT_TTL,
        }
    }

    /// Store a context and return its correlation token.
    ///
    /// Token collisions are practically unreachable at 128 bits; the loop
    /// regenerates on one anyway rather than overwriting a live flow.
    pub async fn put(&self, context: &FlowContext) -> AuthFlowResult<String> {
        let value = serde_json::to_string(context)?;
        for _ in 0..3 {
            let token = generate_token();
            let key = format!("{REDIRECT_NAMESPACE}{token}");
            if self.kv.get(&key).await?.is_some() {
                continue;
            }
            self.kv.put(&key, value.clone(), self.ttl).await?;
            return Ok(token);
        }
        Err(AuthFlowError::Internal {
            message: "could not allocate a correlation token".to_string(),
        })
    }

    /// Reclaim a context by token, deleting it first so a replayed callback
    /// with the same token fails even if this flow later errors out.
    pub async fn take(&self, token: &str) -> AuthFlowResult<FlowContext> {
        let key = format!("{REDIRECT_NAMESPACE}{token}");
        let value = self
            .kv
            .get(&key)
            .await?
            .ok_or(AuthFlowError::ContextExpired)?;
        self.kv.delete(&key).await?;
        Ok(serde_json::from_str(&value)?)
    }

    /// Stash a context for a widget flow under the caller's session key.
    pub async fn put_for_session(
        &self,
        session_key: &str,
        context: &FlowContext,
    ) -> AuthFlowResult<()> {
        let key = format!("{WIDGET_NAMESPACE}{session_key}");
        self.kv
            .put(&key, serde_json::to_string(context)?, self.ttl)
            .await
    }

    /// Read a widget-flow context. Single-use by convention: callers clear
    /// it with [`FlowContextStore::clear_for_session`] once consumed.
    pub async fn get_for_session(
        &self,
        session_key: &str,
    ) -> AuthFlowResult<Option<FlowContext>> {
        let key = format!("{WIDGET_NAMESPACE}{session_key}");
        match self.kv.get(&key).await? {
            Some(value) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }

    /// Drop a widget-flow context.
    pub async fn clear_for_session(&self, session_key: &str) -> AuthFlowResult<()> {
        let key = format!("{WIDGET_NAMESPACE}{session_key}");
        self.kv.delete(&key).await
    }
}
