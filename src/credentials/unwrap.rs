//! HTTP client for the key unwrapping service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CredentialError, EncryptedCredential, KeyUnwrapper};
use crate::llm::provider::Credential;
use crate::observability::redact::RedactedString;

/// Environment variable holding the bearer token for the key service.
pub const UNWRAP_TOKEN_ENV: &str = "PLOTWISE_UNWRAP_TOKEN";

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UnwrapRequest<'a> {
    ciphertext: &'a str,
    iv: &'a str,
    auth_tag: &'a str,
}

#[derive(Deserialize)]
struct UnwrapResponse {
    plaintext: String,
}

/// Posts encrypted records to `{url}` and reads back the plaintext key.
pub struct HttpKeyUnwrapper {
    url: String,
    token: Option<RedactedString>,
    client: reqwest::Client,
}

impl HttpKeyUnwrapper {
    /// Create an unwrapper for the service at `url`.
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            url: url.into(),
            token: token.filter(|t| !t.is_empty()).map(RedactedString::new),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Create an unwrapper taking its token from [`UNWRAP_TOKEN_ENV`].
    pub fn from_env(url: impl Into<String>) -> Self {
        Self::new(url, std::env::var(UNWRAP_TOKEN_ENV).ok())
    }
}

impl std::fmt::Debug for HttpKeyUnwrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpKeyUnwrapper")
            .field("url", &self.url)
            .field("token", &self.token)
            .finish()
    }
}

#[async_trait]
impl KeyUnwrapper for HttpKeyUnwrapper {
    async fn unwrap_key(&self, record: &EncryptedCredential) -> Result<Credential, CredentialError> {
        record.validate()?;

        let mut request = self.client.post(&self.url).json(&UnwrapRequest {
            ciphertext: &record.ciphertext,
            iv: &record.iv,
            auth_tag: &record.auth_tag,
        });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose());
        }

        let response = request
            .send()
            .await
            .map_err(|e| CredentialError::Unwrap(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CredentialError::Unwrap(format!("HTTP {status}")));
        }

        let body: UnwrapResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::Unwrap(format!("bad response body: {e}")))?;
        if body.plaintext.is_empty() {
            return Err(CredentialError::Unwrap("empty plaintext".to_owned()));
        }
        debug!("credential unwrapped");
        Ok(Credential::new(body.plaintext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{AUTH_TAG_LEN, IV_LEN};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record() -> EncryptedCredential {
        EncryptedCredential::from_parts(b"opaque", &[1u8; IV_LEN], &[2u8; AUTH_TAG_LEN])
    }

    #[tokio::test]
    async fn posts_record_and_returns_plaintext() {
        let server = MockServer::start().await;
        let rec = record();
        Mock::given(method("POST"))
            .and(path("/unwrap"))
            .and(header("authorization", "Bearer svc-token"))
            .and(body_json(json!({
                "ciphertext": rec.ciphertext,
                "iv": rec.iv,
                "authTag": rec.auth_tag,
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"plaintext": "sk-ant-key"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let unwrapper =
            HttpKeyUnwrapper::new(format!("{}/unwrap", server.uri()), Some("svc-token".into()));
        let credential = unwrapper.unwrap_key(&rec).await.expect("unwrap");
        assert_eq!(credential.expose(), "sk-ant-key");
    }

    #[tokio::test]
    async fn non_success_status_is_unwrap_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let unwrapper = HttpKeyUnwrapper::new(server.uri(), None);
        let err = unwrapper.unwrap_key(&record()).await.expect_err("500");
        assert!(matches!(err, CredentialError::Unwrap(_)));
    }

    #[tokio::test]
    async fn malformed_record_never_leaves_the_process() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let bad = EncryptedCredential {
            ciphertext: String::new(),
            ..record()
        };
        let unwrapper = HttpKeyUnwrapper::new(server.uri(), None);
        assert!(matches!(
            unwrapper.unwrap_key(&bad).await,
            Err(CredentialError::Malformed(_))
        ));
    }

    #[test]
    fn debug_hides_token() {
        let unwrapper = HttpKeyUnwrapper::new("http://keys", Some("very-secret".into()));
        assert!(!format!("{unwrapper:?}").contains("very-secret"));
    }
}
