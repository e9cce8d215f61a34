//! Signed identity-token verification for OIDC providers and widget
//! credentials.
//!
//! Verification runs in a fixed order: structural checks, then claim checks,
//! then signature verification against the provider's published keys. No
//! claim is trusted for an authentication decision unless every stage,
//! including the signature, has passed.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use moka::sync::Cache;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{AuthFlowError, AuthFlowResult, ProviderKind};

/// Maximum JWKS response size (512 KB) to bound memory on hostile responses.
const MAX_JWKS_SIZE: usize = 512 * 1024;

/// Provider public keys are cached for an hour; rotation windows overlap far
/// longer than that.
const JWKS_CACHE_TTL_SECS: u64 = 3600;

/// One JWKS entry per configured provider endpoint.
const JWKS_CACHE_MAX_CAPACITY: u64 = 8;

/// HTTP timeout for JWKS fetches.
const JWKS_FETCH_TIMEOUT_SECS: u64 = 10;

/// Clock-skew allowance for `iat` (seconds).
const IAT_SKEW_SECS: i64 = 300;

/// Leeway handed to the signature-stage validation (seconds).
const LEEWAY_SECS: u64 = 60;

/// Token header. Only `alg` and `kid` matter; `alg` is checked against the
/// allow-list and never fed back into verification.
#[derive(Debug, Deserialize)]
struct TokenHeader {
    alg: String,
    #[serde(default)]
    kid: Option<String>,
}

/// Handles `aud` being either a single string or an array of strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StringOrArray {
    Single(String),
    Multiple(Vec<String>),
}

impl StringOrArray {
    /// Check if the audience contains a specific value.
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        match self {
            StringOrArray::Single(s) => s == value,
            StringOrArray::Multiple(v) => v.iter().any(|s| s == value),
        }
    }
}

/// Claims of a verified identity token.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifiedIdToken {
    pub sub: String,
    pub iss: String,
    pub aud: StringOrArray,
    pub exp: i64,
    pub iat: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// JWKS response structure (RFC 7517).
#[derive(Debug, Clone, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    #[serde(default)]
    kid: Option<String>,
    kty: String,
    #[serde(default)]
    alg: Option<String>,
    /// RSA modulus (base64url).
    #[serde(default)]
    n: Option<String>,
    /// RSA exponent (base64url).
    #[serde(default)]
    e: Option<String>,
}

/// Identity-token verifier with a bounded JWKS cache.
///
/// Constructed once at startup and shared by the drivers that need it.
#[derive(Clone)]
pub struct IdTokenVerifier {
    http_client: Client,
    jwks_cache: Cache<String, JwkSet>,
}

impl Default for IdTokenVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl IdTokenVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(JWKS_FETCH_TIMEOUT_SECS))
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .unwrap_or_else(|_| Client::new()),
            jwks_cache: Cache::builder()
                .max_capacity(JWKS_CACHE_MAX_CAPACITY)
                .time_to_live(Duration::from_secs(JWKS_CACHE_TTL_SECS))
                .build(),
        }
    }

    /// Verify a compact `header.payload.signature` token.
    ///
    /// Stages, in order:
    /// 1. structural: three dot-separated parts, base64url JSON header and
    ///    payload;
    /// 2. algorithm: RS256 only, from an allow-list, never echoed from the
    ///    header into verification;
    /// 3. claims: `exp` in the future, `iat` within skew, `aud` equals the
    ///    configured client id, `iss` in the provider allow-list, `sub`
    ///    present;
    /// 4. signature over `header.payload` with the key resolved by `kid`.
    ///
    /// Claims from stage 3 are only returned once stage 4 has passed.
    pub async fn verify(
        &self,
        token: &str,
        expected_audience: &str,
        allowed_issuers: &[&str],
        jwks_uri: &str,
        provider: ProviderKind,
    ) -> AuthFlowResult<VerifiedIdToken> {
        // Stage 1: structure.
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(AuthFlowError::MalformedToken {
                reason: format!("expected 3 segments, found {}", parts.len()),
            });
        }

        let header: TokenHeader = decode_segment(parts[0], "header")?;
        let claims: VerifiedIdToken = decode_segment(parts[1], "payload")?;

        // Stage 2: algorithm pinning.
        if header.alg != "RS256" {
            debug!(provider = %provider, "Rejected token with disallowed algorithm");
            return Err(AuthFlowError::AlgorithmNotAllowed);
        }

        // Stage 3: claims. These gate control flow but grant nothing on
        // their own; acceptance still requires the signature below.
        let now = Utc::now().timestamp();
        if claims.sub.is_empty() {
            return Err(AuthFlowError::MissingFields {
                fields: "sub".to_string(),
            });
        }
        if claims.exp <= now {
            return Err(AuthFlowError::Expired);
        }
        if claims.iat > now + IAT_SKEW_SECS {
            return Err(AuthFlowError::Expired);
        }
        if !claims.aud.contains(expected_audience) {
            return Err(AuthFlowError::BadAudience);
        }
        if !allowed_issuers.contains(&claims.iss.as_str()) {
            return Err(AuthFlowError::BadIssuer { provider });
        }

        // Stage 4: signature.
        let kid = header.kid.ok_or_else(|| AuthFlowError::MalformedToken {
            reason: "missing kid in header".to_string(),
        })?;
        let jwk = self.resolve_key(jwks_uri, &kid, provider).await?;
        let decoding_key = build_rsa_key(&jwk)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[expected_audience]);
        validation.set_issuer(allowed_issuers);
        validation.leeway = LEEWAY_SECS;

        let verified = decode::<VerifiedIdToken>(token, &decoding_key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthFlowError::Expired,
                _ => {
                    debug!(provider = %provider, "Token signature verification failed");
                    AuthFlowError::InvalidSignature
                }
            })?;

        Ok(verified.claims)
    }

    /// Resolve a JWK by kid, refreshing the cached set once if the kid is
    /// unknown (key rotation).
    async fn resolve_key(
        &self,
        jwks_uri: &str,
        kid: &str,
        provider: ProviderKind,
    ) -> AuthFlowResult<Jwk> {
        let jwks = match self.jwks_cache.get(jwks_uri) {
            Some(cached) => cached,
            None => {
                let fetched = self.fetch_jwks(jwks_uri, provider).await?;
                self.jwks_cache.insert(jwks_uri.to_string(), fetched.clone());
                fetched
            }
        };

        if let Some(key) = jwks.keys.iter().find(|k| k.kid.as_deref() == Some(kid)) {
            return Ok(key.clone());
        }

        info!(provider = %provider, "Signing key not in cached JWKS, refreshing");
        self.jwks_cache.invalidate(jwks_uri);
        let refreshed = self.fetch_jwks(jwks_uri, provider).await?;
        let key = refreshed
            .keys
            .iter()
            .find(|k| k.kid.as_deref() == Some(kid))
            .cloned()
            .ok_or(AuthFlowError::InvalidSignature)?;
        self.jwks_cache.insert(jwks_uri.to_string(), refreshed);
        Ok(key)
    }

    async fn fetch_jwks(&self, jwks_uri: &str, provider: ProviderKind) -> AuthFlowResult<JwkSet> {
        let response = self
            .http_client
            .get(jwks_uri)
            .send()
            .await
            .map_err(|_| AuthFlowError::ProviderUnavailable { provider })?;

        if !response.status().is_success() {
            return Err(AuthFlowError::ProviderUnavailable { provider });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|_| AuthFlowError::ProviderUnavailable { provider })?;

        if bytes.len() > MAX_JWKS_SIZE {
            return Err(AuthFlowError::ProviderUnavailable { provider });
        }

        serde_json::from_slice(&bytes).map_err(|_| AuthFlowError::ProviderUnavailable { provider })
    }
}

/// Decode one base64url token segment into JSON, tolerating missing padding.
fn decode_segment<T: serde::de::DeserializeOwned>(
    segment: &str,
    what: &str,
) -> AuthFlowResult<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|_| AuthFlowError::MalformedToken {
            reason: format!("{what} is not valid base64url"),
        })?;
    serde_json::from_slice(&bytes).map_err(|_| AuthFlowError::MalformedToken {
        reason: format!("{what} is not valid JSON"),
    })
}

/// Build an RSA decoding key from a JWK. Only RSA keys whose declared
/// algorithm (if any) is RS256 are accepted; the token header is never
/// consulted here.
fn build_rsa_key(jwk: &Jwk) -> AuthFlowResult<DecodingKey> {
    if jwk.kty != "RSA" {
        return Err(AuthFlowError::InvalidSignature);
    }
    if let Some(alg) = jwk.alg.as_deref() {
        if alg != "RS256" {
            return Err(AuthFlowError::InvalidSignature);
        }
    }
    let n = jwk.n.as_ref().ok_or(AuthFlowError::InvalidSignature)?;
    let e = jwk.e.as_ref().ok_or(AuthFlowError::InvalidSignature)?;
    DecodingKey::from_rsa_components(n, e).map_err(|_| AuthFlowError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CLIENT_ID: &str = "formlane-client-id";
    const ISSUERS: &[&str] = &["https://accounts.google.com", "accounts.google.com"];

    fn encode_segment(value: &serde_json::Value) -> String {
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
    }

    fn make_token(header: serde_json::Value, payload: serde_json::Value) -> String {
        format!(
            "{}.{}.{}",
            encode_segment(&header),
            encode_segment(&payload),
            URL_SAFE_NO_PAD.encode(b"not-a-real-signature")
        )
    }

    fn good_payload() -> serde_json::Value {
        let now = Utc::now().timestamp();
        json!({
            "sub": "1234567890",
            "iss": "https://accounts.google.com",
            "aud": CLIENT_ID,
            "exp": now + 3600,
            "iat": now - 10,
            "email": "person@example.com"
        })
    }

    async fn verify(token: &str, jwks_uri: &str) -> AuthFlowResult<VerifiedIdToken> {
        IdTokenVerifier::new()
            .verify(token, CLIENT_ID, ISSUERS, jwks_uri, ProviderKind::Google)
            .await
    }

    #[tokio::test]
    async fn test_two_segments_is_malformed() {
        let result = verify("onlyone.segment", "http://unused.invalid/jwks").await;
        assert!(matches!(result, Err(AuthFlowError::MalformedToken { .. })));
    }

    #[tokio::test]
    async fn test_garbage_payload_is_malformed() {
        let token = format!(
            "{}.!!!notbase64!!!.{}",
            encode_segment(&json!({"alg": "RS256", "kid": "k1"})),
            URL_SAFE_NO_PAD.encode(b"sig")
        );
        let result = verify(&token, "http://unused.invalid/jwks").await;
        assert!(matches!(result, Err(AuthFlowError::MalformedToken { .. })));
    }

    #[tokio::test]
    async fn test_algorithm_other_than_rs256_rejected() {
        // HS256 with a perfectly valid payload must still be refused.
        let token = make_token(json!({"alg": "HS256", "kid": "k1"}), good_payload());
        let result = verify(&token, "http://unused.invalid/jwks").await;
        assert!(matches!(result, Err(AuthFlowError::AlgorithmNotAllowed)));
    }

    #[tokio::test]
    async fn test_none_algorithm_rejected() {
        let token = make_token(json!({"alg": "none"}), good_payload());
        let result = verify(&token, "http://unused.invalid/jwks").await;
        assert!(matches!(result, Err(AuthFlowError::AlgorithmNotAllowed)));
    }

    #[tokio::test]
    async fn test_expired_token_rejected_before_key_fetch() {
        let mut payload = good_payload();
        payload["exp"] = json!(Utc::now().timestamp() - 60);
        // The unreachable JWKS URI proves expiry is caught before any fetch.
        let token = make_token(json!({"alg": "RS256", "kid": "k1"}), payload);
        let result = verify(&token, "http://unreachable.invalid/jwks").await;
        assert!(matches!(result, Err(AuthFlowError::Expired)));
    }

    #[tokio::test]
    async fn test_future_iat_rejected() {
        let mut payload = good_payload();
        payload["iat"] = json!(Utc::now().timestamp() + 3600);
        let token = make_token(json!({"alg": "RS256", "kid": "k1"}), payload);
        let result = verify(&token, "http://unreachable.invalid/jwks").await;
        assert!(matches!(result, Err(AuthFlowError::Expired)));
    }

    #[tokio::test]
    async fn test_wrong_audience_rejected() {
        let mut payload = good_payload();
        payload["aud"] = json!("some-other-client");
        let token = make_token(json!({"alg": "RS256", "kid": "k1"}), payload);
        let result = verify(&token, "http://unreachable.invalid/jwks").await;
        assert!(matches!(result, Err(AuthFlowError::BadAudience)));
    }

    #[tokio::test]
    async fn test_audience_array_accepted_for_claims_stage() {
        let mut payload = good_payload();
        payload["aud"] = json!([CLIENT_ID, "companion-client"]);
        payload["iss"] = json!("https://evil.example.com");
        let token = make_token(json!({"alg": "RS256", "kid": "k1"}), payload);
        // Issuer check runs after the audience check passed on the array.
        let result = verify(&token, "http://unreachable.invalid/jwks").await;
        assert!(matches!(result, Err(AuthFlowError::BadIssuer { .. })));
    }

    #[tokio::test]
    async fn test_unknown_issuer_rejected() {
        let mut payload = good_payload();
        payload["iss"] = json!("https://accounts.google.com.evil.example");
        let token = make_token(json!({"alg": "RS256", "kid": "k1"}), payload);
        let result = verify(&token, "http://unreachable.invalid/jwks").await;
        assert!(matches!(result, Err(AuthFlowError::BadIssuer { .. })));
    }

    #[tokio::test]
    async fn test_missing_sub_rejected() {
        let mut payload = good_payload();
        payload["sub"] = json!("");
        let token = make_token(json!({"alg": "RS256", "kid": "k1"}), payload);
        let result = verify(&token, "http://unreachable.invalid/jwks").await;
        assert!(matches!(result, Err(AuthFlowError::MissingFields { .. })));
    }

    #[tokio::test]
    async fn test_valid_claims_with_bad_signature_rejected() {
        // A syntactically valid 2048-bit-looking modulus that matches no
        // private key: claims all pass, the signature stage must not.
        let fake_modulus: String = std::iter::once('x')
            .chain(std::iter::repeat('A').take(341))
            .collect();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "keys": [{"kid": "k1", "kty": "RSA", "alg": "RS256", "n": fake_modulus, "e": "AQAB"}]
            })))
            .mount(&server)
            .await;

        let token = make_token(json!({"alg": "RS256", "kid": "k1"}), good_payload());
        let result = verify(&token, &format!("{}/jwks", server.uri())).await;
        assert!(matches!(result, Err(AuthFlowError::InvalidSignature)));
    }

    #[tokio::test]
    async fn test_unknown_kid_refreshes_then_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "keys": [{"kid": "other", "kty": "RSA", "alg": "RS256", "n": "AQAB", "e": "AQAB"}]
            })))
            .expect(2) // initial fetch plus the rotation refresh
            .mount(&server)
            .await;

        let token = make_token(json!({"alg": "RS256", "kid": "k1"}), good_payload());
        let result = verify(&token, &format!("{}/jwks", server.uri())).await;
        assert!(matches!(result, Err(AuthFlowError::InvalidSignature)));
    }

    #[tokio::test]
    async fn test_jwks_endpoint_down_is_provider_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let token = make_token(json!({"alg": "RS256", "kid": "k1"}), good_payload());
        let result = verify(&token, &format!("{}/jwks", server.uri())).await;
        assert!(matches!(
            result,
            Err(AuthFlowError::ProviderUnavailable { .. })
        ));
    }
}
