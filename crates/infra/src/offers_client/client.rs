use std::sync::{Mutex, PoisonError};

use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use tracing::{debug, info, instrument};

use aggregator_core::{ExternalProductId, ProductId};
use aggregator_products::ExternalOffer;

use super::{OffersClientError, OffersProvider};
use crate::config::{OffersServiceConfig, Secret};

/// Upstream error bodies longer than this are cut before they reach errors and logs.
const MAX_ERROR_BODY: usize = 512;

/// Header carrying the access token. The upstream expects the token as the
/// value of a header literally named `Bearer`.
const TOKEN_HEADER: &str = "Bearer";

#[derive(Debug, Deserialize)]
struct AuthResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct RegistrationResponse {
    id: ExternalProductId,
}

/// Outcome of a single authorized attempt.
enum Attempt {
    Success(Response),
    Unauthorized,
}

/// HTTP client for the offers service.
///
/// One instance is shared by the scheduler and the request path. It owns one
/// connection pool for its whole lifetime; [`OffersClient::close`] releases it.
#[derive(Debug)]
pub struct OffersClient {
    base_url: String,
    refresh_token: Secret,
    http: Mutex<Option<reqwest::Client>>,
    /// Cached access token. Held across authentication so concurrent callers
    /// never race to re-authenticate.
    access_token: tokio::sync::Mutex<Option<String>>,
}

impl OffersClient {
    pub fn new(config: &OffersServiceConfig) -> Result<Self, OffersClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(OffersClientError::transport)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            refresh_token: config.refresh_token.clone(),
            http: Mutex::new(Some(http)),
            access_token: tokio::sync::Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Release the connection pool.
    ///
    /// Returns `true` the first time and `false` on every later call.
    pub fn close(&self) -> bool {
        let released = self
            .http
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        if released {
            info!("offers client closed");
        }
        released
    }

    pub fn is_closed(&self) -> bool {
        self.http
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn http(&self) -> Result<reqwest::Client, OffersClientError> {
        self.http
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(OffersClientError::Closed)
    }

    #[instrument(skip(self, description), fields(product_id = %product_id), err)]
    pub async fn register_product(
        &self,
        product_id: ProductId,
        name: &str,
        description: Option<&str>,
    ) -> Result<ExternalProductId, OffersClientError> {
        let body = json!({
            "id": product_id,
            "name": name,
            "description": description.unwrap_or(""),
        });

        let response = self
            .request_with_retry(Method::POST, "/api/v1/products/register", Some(&body))
            .await?;
        let registered: RegistrationResponse =
            response.json().await.map_err(OffersClientError::decode)?;

        info!(external_id = %registered.id, "product registered with offers service");
        Ok(registered.id)
    }

    #[instrument(skip(self), fields(external_id = %external_id), err)]
    pub async fn fetch_offers(
        &self,
        external_id: ExternalProductId,
    ) -> Result<Vec<ExternalOffer>, OffersClientError> {
        let path = format!("/api/v1/products/{external_id}/offers");
        let response = self.request_with_retry(Method::GET, &path, None).await?;
        let offers: Vec<ExternalOffer> = response.json().await.map_err(OffersClientError::decode)?;

        debug!(count = offers.len(), "fetched offers");
        Ok(offers)
    }

    /// Send an authorized request. A `401` triggers one re-authentication and
    /// exactly one retry; a second `401` is an authentication failure.
    async fn request_with_retry(
        &self,
        method: Method,
        path: &str,
        body: Option<&JsonValue>,
    ) -> Result<Response, OffersClientError> {
        let http = self.http()?;
        let url = format!("{}{}", self.base_url, path);

        let token = self.current_token(&http).await?;
        if let Attempt::Success(response) = self.attempt(&http, &method, &url, body, &token).await? {
            return Ok(response);
        }

        info!("access token rejected, re-authenticating");
        let token = self.replace_rejected_token(&http, &token).await?;
        match self.attempt(&http, &method, &url, body, &token).await? {
            Attempt::Success(response) => Ok(response),
            Attempt::Unauthorized => Err(OffersClientError::Authentication(
                "request rejected after re-authentication".to_string(),
            )),
        }
    }

    async fn attempt(
        &self,
        http: &reqwest::Client,
        method: &Method,
        url: &str,
        body: Option<&JsonValue>,
        token: &str,
    ) -> Result<Attempt, OffersClientError> {
        let mut request = http.request(method.clone(), url).header(TOKEN_HEADER, token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(OffersClientError::transport)?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Ok(Attempt::Unauthorized);
        }
        if !status.is_success() {
            return Err(OffersClientError::upstream(status, error_body(response).await));
        }
        Ok(Attempt::Success(response))
    }

    /// The cached token, authenticating first if there is none.
    async fn current_token(&self, http: &reqwest::Client) -> Result<String, OffersClientError> {
        let mut cached = self.access_token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let token = self.authenticate(http).await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Re-authenticate after `rejected` was refused, unless a concurrent caller
    /// already replaced it.
    async fn replace_rejected_token(
        &self,
        http: &reqwest::Client,
        rejected: &str,
    ) -> Result<String, OffersClientError> {
        let mut cached = self.access_token.lock().await;
        match cached.as_deref() {
            Some(token) if token != rejected => return Ok(token.to_string()),
            _ => {}
        }
        *cached = None;
        let token = self.authenticate(http).await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Exchange the refresh credential for an access token. Only a `401` or
    /// `403` from the auth endpoint means the credential itself was refused.
    async fn authenticate(&self, http: &reqwest::Client) -> Result<String, OffersClientError> {
        let url = format!("{}/api/v1/auth", self.base_url);
        let response = http
            .post(&url)
            .json(&json!({ "refresh_token": self.refresh_token.expose() }))
            .send()
            .await
            .map_err(OffersClientError::transport)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = error_body(response).await;
            return Err(OffersClientError::Authentication(format!(
                "refresh credential rejected ({status}): {body}"
            )));
        }
        if !status.is_success() {
            return Err(OffersClientError::upstream(status, error_body(response).await));
        }

        let auth: AuthResponse = response.json().await.map_err(OffersClientError::decode)?;

        info!("authenticated with offers service");
        Ok(auth.access_token)
    }
}

async fn error_body(response: Response) -> String {
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

#[async_trait::async_trait]
impl OffersProvider for OffersClient {
    async fn register_product(
        &self,
        product_id: ProductId,
        name: &str,
        description: Option<&str>,
    ) -> Result<ExternalProductId, OffersClientError> {
        OffersClient::register_product(self, product_id, name, description).await
    }

    async fn fetch_offers(
        &self,
        external_id: ExternalProductId,
    ) -> Result<Vec<ExternalOffer>, OffersClientError> {
        OffersClient::fetch_offers(self, external_id).await
    }

    async fn close(&self) {
        OffersClient::close(self);
    }
}
