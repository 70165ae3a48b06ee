//! ICS API client implementation.
//!
//! This module provides the HTTP client for the ICS REST API. Every call is
//! authenticated with the `X-Api-Token` header and every response body is
//! the `{statusCode, message, data}` envelope, which is unwrapped here so
//! callers only ever see typed payloads.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::ProviderSettings;
use crate::error::{ApiError, IcsError, Result};

use super::api::IcsApi;
use super::types::{
    AddonCatalog, CreateSshKeyRequest, CreatedSshKey, Envelope, FriendlyNameRequest,
    InventoryItem, OrderRequest, OrderResponse, Server, SshKey,
};

/// ICS API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.ingenuitycloudservices.com";

/// Default request timeout in seconds. Orders can take minutes to be accepted.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Header carrying the API token.
const API_TOKEN_HEADER: &str = "X-Api-Token";

/// Maximum number of attempts for idempotent reads.
const MAX_READ_ATTEMPTS: u32 = 3;

/// Delay between read retries in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

const INVENTORY_PATH: &str = "/rest-api/server-orders/inventory";
const ADDONS_PATH: &str = "/rest-api/server-orders/list-addons";
const ORDER_PATH: &str = "/rest-api/server-orders/order";
const SERVERS_PATH: &str = "/rest-api/servers";
const SSH_KEYS_PATH: &str = "/rest-api/ssh-keys";

/// ICS API client.
#[derive(Debug, Clone)]
pub struct IcsClient {
    /// HTTP client.
    client: Client,
    /// Base URL without trailing slash.
    base_url: String,
    /// API token.
    api_token: String,
}

impl IcsClient {
    /// Creates a client against the public API endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(api_token: &str) -> Result<Self> {
        Self::with_base_url(
            api_token,
            DEFAULT_BASE_URL,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    /// Creates a client from resolved provider settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self> {
        Self::with_base_url(
            &settings.api_token,
            &settings.base_url,
            settings.request_timeout,
        )
    }

    /// Creates a client with a custom base URL and timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_base_url(api_token: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        })
    }

    /// Returns the base URL this client talks to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Builds an authenticated request.
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{path}", self.base_url);
        trace!("{method} {url}");

        self.client
            .request(method, url)
            .header(header::ACCEPT, "application/json")
            .header(API_TOKEN_HEADER, &self.api_token)
    }

    /// Sends a request and maps transport and status failures.
    async fn send(&self, builder: RequestBuilder, endpoint: &str) -> Result<Response> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout {
                    endpoint: endpoint.to_string(),
                }
            } else {
                ApiError::network(format!("Request to {endpoint} failed: {e}"))
            }
        })?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or_default();
            let retry_after = if retry_after == 0 { 60 } else { retry_after };

            return Err(ApiError::RateLimited {
                retry_after_secs: retry_after,
            }
            .into());
        }

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ApiError::AuthenticationFailed {
                message: String::from("Invalid API token"),
            }
            .into());
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::request_failed(status.as_u16(), body).into());
        }

        Ok(response)
    }

    /// Reads the body and unwraps the envelope.
    async fn unwrap_envelope<T: DeserializeOwned>(
        response: Response,
        endpoint: &str,
    ) -> Result<Option<T>> {
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::network(format!("Failed to read response body: {e}")))?;

        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
            ApiError::invalid_response(format!("Failed to parse {endpoint} response: {e}"))
        })?;

        if let Some(code) = envelope.status_code
            && !(200..300).contains(&code)
        {
            return Err(ApiError::Envelope {
                status_code: code,
                message: envelope.message,
            }
            .into());
        }

        Ok(envelope.data)
    }

    /// Issues an idempotent GET, retrying transient failures.
    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<Option<T>> {
        let mut last_error = None;

        for attempt in 0..MAX_READ_ATTEMPTS {
            if attempt > 0 {
                debug!("Retry attempt {attempt} of {MAX_READ_ATTEMPTS} for {path}");
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt)))
                    .await;
            }

            let builder = self.request(Method::GET, path).query(query);
            let outcome = match self.send(builder, path).await {
                Ok(response) => Self::unwrap_envelope(response, path).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(data) => return Ok(data),
                Err(e) if e.is_retryable() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            IcsError::Api(ApiError::network(String::from("Max retries exceeded")))
        }))
    }

    /// Sends a JSON body once and returns the unwrapped payload.
    async fn send_json<T, B>(&self, method: Method, path: &str, body: &B) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        let builder = self
            .request(method, path)
            .header(header::CONTENT_TYPE, "application/json")
            .json(body);
        let response = self.send(builder, path).await?;
        Self::unwrap_envelope(response, path).await
    }

    /// Sends a request once and discards the payload.
    async fn send_without_payload(&self, builder: RequestBuilder, path: &str) -> Result<()> {
        self.send(builder, path).await?;
        Ok(())
    }
}

#[async_trait]
impl IcsApi for IcsClient {
    async fn list_inventory(&self) -> Result<Vec<InventoryItem>> {
        let items: Option<Vec<InventoryItem>> = self.get(INVENTORY_PATH, &[]).await?;
        let items = items.unwrap_or_default();
        debug!("Fetched {} inventory items", items.len());
        Ok(items)
    }

    async fn list_addons(
        &self,
        sku_product_name: &str,
        location_code: &str,
    ) -> Result<AddonCatalog> {
        let query = [
            ("sku_product_name", sku_product_name),
            ("location_code", location_code),
        ];
        let catalog: Option<AddonCatalog> = self.get(ADDONS_PATH, &query).await?;
        Ok(catalog.unwrap_or_default())
    }

    async fn order_server(&self, request: &OrderRequest) -> Result<OrderResponse> {
        let response: Option<OrderResponse> =
            self.send_json(Method::POST, ORDER_PATH, request).await?;
        response.ok_or_else(|| {
            ApiError::invalid_response("Order response carried no data").into()
        })
    }

    async fn list_servers(&self) -> Result<Vec<Server>> {
        let servers: Option<Vec<Server>> = self.get(SERVERS_PATH, &[]).await?;
        Ok(servers.unwrap_or_default())
    }

    async fn cancel_server(&self, server_id: &str) -> Result<()> {
        let path = format!("{SERVERS_PATH}/{server_id}/cancel");
        let builder = self.request(Method::DELETE, &path);
        self.send_without_payload(builder, &path).await
    }

    async fn update_friendly_name(&self, server_id: &str, friendly_name: &str) -> Result<()> {
        let path = format!("{SERVERS_PATH}/{server_id}/friendly-name");
        let body = FriendlyNameRequest {
            friendly_name: friendly_name.to_string(),
        };
        let builder = self
            .request(Method::PUT, &path)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body);
        self.send_without_payload(builder, &path).await
    }

    async fn create_ssh_key(&self, request: &CreateSshKeyRequest) -> Result<CreatedSshKey> {
        let created: Option<CreatedSshKey> =
            self.send_json(Method::POST, SSH_KEYS_PATH, request).await?;
        Ok(created.unwrap_or_default())
    }

    async fn list_ssh_keys(&self) -> Result<Vec<SshKey>> {
        let keys: Option<Vec<SshKey>> = self.get(SSH_KEYS_PATH, &[]).await?;
        Ok(keys.unwrap_or_default())
    }

    async fn delete_ssh_key(&self, key_id: u64) -> Result<()> {
        let path = format!("{SSH_KEYS_PATH}/{key_id}");
        let builder = self.request(Method::DELETE, &path);
        self.send_without_payload(builder, &path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> IcsClient {
        IcsClient::with_base_url("test-token", &server.uri(), Duration::from_secs(5))
            .expect("client")
    }

    fn envelope(data: &serde_json::Value) -> serde_json::Value {
        serde_json::json!({ "statusCode": 200, "message": "OK", "data": data })
    }

    #[tokio::test]
    async fn test_list_inventory_sends_token_and_unwraps_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(INVENTORY_PATH))
            .and(header("X-Api-Token", "test-token"))
            .and(header("Accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(&serde_json::json!([
                {"sku_id": 7, "sku_product_name": "c1.small", "location_code": "NYC1",
                 "auto_provision_quantity": 3, "price": "99.00", "price_hourly": "0.14"}
            ]))))
            .expect(1)
            .mount(&server)
            .await;

        let items = client_for(&server).list_inventory().await.expect("inventory");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].sku_product_name, "c1.small");
        assert!(items[0].is_orderable());
    }

    #[tokio::test]
    async fn test_list_addons_encodes_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ADDONS_PATH))
            .and(query_param("sku_product_name", "c1.small"))
            .and(query_param("location_code", "NYC 1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(&serde_json::json!({
                "operating_systems": {"name": "OS", "products": [
                    {"name": "Ubuntu 24.04", "product_code": "UBUNTU_24_04"}
                ]}
            }))))
            .expect(1)
            .mount(&server)
            .await;

        let catalog = client_for(&server)
            .list_addons("c1.small", "NYC 1")
            .await
            .expect("addons");
        assert_eq!(catalog.operating_systems.products[0].product_code, "UBUNTU_24_04");
        assert!(catalog.licenses.products.is_empty());
    }

    #[tokio::test]
    async fn test_order_server_posts_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ORDER_PATH))
            .and(body_json(serde_json::json!({
                "sku_product_name": "c1.small",
                "quantity": 1,
                "location_code": "NYC1",
                "operating_system_product_code": "UBUNTU_24_04",
                "hostname": "web-1",
                "bill_hourly": true,
                "ssh_key_ids": [11]
            })))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(envelope(&serde_json::json!({"order_service_ids": [500]}))),
            )
            .expect(1)
            .mount(&server)
            .await;

        let request = OrderRequest::new("c1.small", "NYC1", "UBUNTU_24_04")
            .with_hostname(Some("web-1"))
            .with_ssh_key_ids(vec![11]);
        let response = client_for(&server).order_server(&request).await.expect("order");
        assert_eq!(response.order_service_ids, vec![500]);
    }

    #[tokio::test]
    async fn test_http_failure_surfaces_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rest-api/servers/srv-1/cancel"))
            .respond_with(ResponseTemplate::new(400).set_body_string("monthly servers cannot be cancelled"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .cancel_server("srv-1")
            .await
            .expect_err("should fail");
        match err {
            IcsError::Api(ApiError::RequestFailed { status, body }) => {
                assert_eq!(status, 400);
                assert!(body.contains("monthly"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_envelope_failure_code_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SSH_KEYS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "statusCode": 500, "message": "backend unavailable", "data": null
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .list_ssh_keys()
            .await
            .expect_err("should fail");
        assert!(matches!(
            err,
            IcsError::Api(ApiError::Envelope { status_code: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_authentication_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SERVERS_PATH))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .list_servers()
            .await
            .expect_err("should fail");
        assert!(matches!(
            err,
            IcsError::Api(ApiError::AuthenticationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_friendly_name_puts_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/rest-api/servers/srv-1/friendly-name"))
            .and(body_json(serde_json::json!({"friendly_name": "web one"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(&serde_json::Value::Null)))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .update_friendly_name("srv-1", "web one")
            .await
            .expect("rename");
    }

    #[tokio::test]
    async fn test_ssh_key_create_and_delete() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SSH_KEYS_PATH))
            .and(body_json(serde_json::json!({"public_key": "ssh-ed25519 AAAA", "label": "ops"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(envelope(&serde_json::json!({"id": 42}))))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/rest-api/ssh-keys/42"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let created = client
            .create_ssh_key(&CreateSshKeyRequest {
                public_key: String::from("ssh-ed25519 AAAA"),
                label: String::from("ops"),
            })
            .await
            .expect("create");
        assert_eq!(created.id, 42);
        client.delete_ssh_key(42).await.expect("delete");
    }
}
