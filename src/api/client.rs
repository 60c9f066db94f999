use std::time::Duration;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use crate::config::BackendConfig;
use crate::id::PublicId;
use crate::logging;
use super::models::{AuthToken, AuthenticationRequest, NewReceipt, Receipt};
use super::{BackendError, ReceiptBackend};

const AUTHENTICATE: &str = "/authenticate";
const RECEIPT: &str = "/api/receipt-app/receipt";
const AUTO_INCREMENT: &str = "/api/receipt-app/receipt/receipt-details/auto-increment";

/// Value of the `Authorization` header for `token`.
///
/// The deployed backend expects the non-standard `Bearer: <token>` form.
pub fn authorization_header(token: &str, legacy_colon: bool) -> String {
    if legacy_colon {
        format!("Bearer: {}", token)
    } else {
        format!("Bearer {}", token)
    }
}

/// Blocking REST client holding the token obtained at start-up.
pub struct ApiClient {
    http: Client,
    base_url: String,
    auth: AuthToken,
    legacy_bearer_colon: bool,
}

impl ApiClient {
    /// Authenticates once; the token is reused for the life of the client.
    pub fn login(config: &BackendConfig) -> Result<Self, BackendError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let http = build_http(config.timeout()).map_err(|source| BackendError::Transport {
            endpoint: base_url.clone(),
            source,
        })?;

        let request = AuthenticationRequest {
            email: config.email.clone(),
            password: config.password.clone(),
        };

        let auth: AuthToken = {
            let _quiet = logging::quiet();
            let builder = http.post(format!("{}{}", base_url, AUTHENTICATE)).json(&request);
            read_json(AUTHENTICATE, builder)?
        };

        if auth.token.is_empty() {
            return Err(BackendError::InvalidResponse {
                endpoint: AUTHENTICATE.to_string(),
                message: "empty token".to_string(),
            });
        }

        Ok(Self {
            http,
            base_url,
            auth,
            legacy_bearer_colon: config.legacy_bearer_colon,
        })
    }

    pub fn token(&self) -> &AuthToken {
        &self.auth
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Adds the authorization and accept headers, sends, and decodes the body.
    fn complete<T: DeserializeOwned>(&self, endpoint: &str, request: RequestBuilder) -> Result<T, BackendError> {
        let request = request
            .header(AUTHORIZATION, authorization_header(&self.auth.token, self.legacy_bearer_colon))
            .header(ACCEPT, "application/json");
        read_json(endpoint, request)
    }
}

impl ReceiptBackend for ApiClient {
    fn next_auto_increment(&mut self) -> Result<u64, BackendError> {
        let request = self.http.get(self.url(AUTO_INCREMENT));
        self.complete(AUTO_INCREMENT, request)
    }

    fn insert_receipt(&mut self, public_id: &PublicId) -> Result<Receipt, BackendError> {
        let body = NewReceipt {
            file_public_id: public_id.to_string(),
        };
        let request = self.http.post(self.url(RECEIPT)).json(&body);
        self.complete(RECEIPT, request)
    }
}

fn build_http(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder().timeout(timeout).build()
}

fn read_json<T: DeserializeOwned>(endpoint: &str, request: RequestBuilder) -> Result<T, BackendError> {
    let response = request.send().map_err(|source| BackendError::Transport {
        endpoint: endpoint.to_string(),
        source,
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(BackendError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response.text().map_err(|source| BackendError::Transport {
        endpoint: endpoint.to_string(),
        source,
    })?;
    serde_json::from_str(&body).map_err(|err| BackendError::InvalidResponse {
        endpoint: endpoint.to_string(),
        message: err.to_string(),
    })
}
