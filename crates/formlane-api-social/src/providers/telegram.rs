//! Telegram login widget driver.
//!
//! The widget posts a flat field map signed with HMAC-SHA256 under a key
//! derived from the bot token (SHA256 of it). Telegram supplies no email
//! address; identities from this driver are email-less by design.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use super::{async_trait, ProviderDriver, WidgetDriver};
use crate::error::{AuthFlowError, AuthFlowResult, ProviderKind};
use crate::models::{AuthIntent, RawProviderUser};

type HmacSha256 = Hmac<Sha256>;

/// Reject widget payloads older than a day.
const MAX_AUTH_AGE_SECS: i64 = 86_400;

/// Telegram login widget driver.
#[derive(Clone)]
pub struct TelegramDriver {
    bot_token: String,
}

impl TelegramDriver {
    #[must_use]
    pub fn new(bot_token: String) -> Self {
        Self { bot_token }
    }

    /// Build the `\n`-joined `key=value` check string over every field
    /// except `hash`, sorted by key, per the widget contract.
    fn data_check_string(payload: &serde_json::Value) -> AuthFlowResult<String> {
        let object = payload
            .as_object()
            .ok_or_else(|| AuthFlowError::MalformedToken {
                reason: "widget payload is not an object".to_string(),
            })?;

        let mut pairs: Vec<(String, String)> = object
            .iter()
            .filter(|(key, _)| key.as_str() != "hash")
            .map(|(key, value)| {
                let rendered = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), rendered)
            })
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    fn field_str<'a>(payload: &'a serde_json::Value, key: &str) -> Option<&'a str> {
        payload.get(key).and_then(|v| v.as_str())
    }

    fn field_i64(payload: &serde_json::Value, key: &str) -> Option<i64> {
        let value = payload.get(key)?;
        value
            .as_i64()
            .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
    }
}

impl ProviderDriver for TelegramDriver {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Telegram
    }

    fn scopes_for_intent(&self, _intent: AuthIntent) -> Vec<String> {
        // The widget grants nothing beyond the identity itself.
        vec![]
    }

    fn as_widget(&self) -> Option<&dyn WidgetDriver> {
        Some(self)
    }
}

#[async_trait]
impl WidgetDriver for TelegramDriver {
    async fn verify_payload(&self, payload: &serde_json::Value) -> AuthFlowResult<()> {
        let provided_hash =
            Self::field_str(payload, "hash").ok_or_else(|| AuthFlowError::MalformedToken {
                reason: "widget payload is missing 'hash'".to_string(),
            })?;
        let provided =
            hex::decode(provided_hash).map_err(|_| AuthFlowError::MalformedToken {
                reason: "'hash' is not valid hex".to_string(),
            })?;

        let check_string = Self::data_check_string(payload)?;

        let secret_key = Sha256::digest(self.bot_token.as_bytes());
        let mut mac = HmacSha256::new_from_slice(&secret_key)
            .map_err(|_| AuthFlowError::Internal {
                message: "HMAC key setup failed".to_string(),
            })?;
        mac.update(check_string.as_bytes());
        mac.verify_slice(&provided)
            .map_err(|_| AuthFlowError::InvalidSignature)?;

        // Authenticity established; now bound the payload's age.
        let auth_date = Self::field_i64(payload, "auth_date").ok_or_else(|| {
            AuthFlowError::MissingFields {
                fields: "auth_date".to_string(),
            }
        })?;
        let now = Utc::now().timestamp();
        if now - auth_date > MAX_AUTH_AGE_SECS {
            return Err(AuthFlowError::Expired);
        }

        Ok(())
    }

    async fn extract_identity(
        &self,
        payload: &serde_json::Value,
    ) -> AuthFlowResult<RawProviderUser> {
        self.verify_payload(payload).await?;

        let id = Self::field_i64(payload, "id").ok_or_else(|| AuthFlowError::MissingFields {
            fields: "id".to_string(),
        })?;

        let first_name = Self::field_str(payload, "first_name");
        let last_name = Self::field_str(payload, "last_name");
        let username = Self::field_str(payload, "username");

        let name = match (first_name, last_name) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(first), None) => Some(first.to_string()),
            (None, Some(last)) => Some(last.to_string()),
            (None, None) => username.map(ToString::to_string),
        };

        Ok(RawProviderUser {
            external_id: id.to_string(),
            name,
            email: None,
            email_verified: None,
            avatar_url: Self::field_str(payload, "photo_url").map(ToString::to_string),
            access_token: None,
            refresh_token: None,
            scopes: vec![],
        })
    }
}
