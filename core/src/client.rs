//! Blocking client for the Drip v2 REST API.
//!
//! # Design
//! Every operation is split the same way as a round-trip: a `build_*` method
//! produces an `HttpRequest`, a `Transport` executes it, and a `parse_*`
//! method decides whether the response counts as success. The high-level
//! methods (`record_event`, `tag_subscriber`, ...) just chain the three, so
//! request construction can be tested without a network and a different
//! transport can be swapped in.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::fields::CustomFields;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
use crate::types::{
    BatchesBody, Event, EventsBody, Subscriber, SubscribersBody, TagAssociation, TagsBody,
};

const ACCEPT: &str = "application/vnd.api+json";
const CONTENT_TYPE: &str = "application/json";

/// Client for one Drip account.
///
/// Holds no mutable state, so a single instance can be shared by reference
/// between threads issuing independent requests.
pub struct DripClient<T = UreqTransport> {
    account_id: String,
    base_url: String,
    authorization: String,
    transport: T,
}

impl DripClient<UreqTransport> {
    /// Client against the Drip production API with the default timeouts.
    ///
    /// Performs no network I/O.
    pub fn new(api_key: &str, account_id: &str) -> Result<Self, ApiError> {
        Self::with_config(api_key, account_id, ClientConfig::default())
    }

    pub fn with_config(api_key: &str, account_id: &str, config: ClientConfig) -> Result<Self, ApiError> {
        config.validate()?;
        let transport = UreqTransport::new(&config);
        Self::with_transport(api_key, account_id, &config.base_url, transport)
    }
}

impl<T: Transport> DripClient<T> {
    /// Client that sends every request through `transport`.
    pub fn with_transport(
        api_key: &str,
        account_id: &str,
        base_url: &str,
        transport: T,
    ) -> Result<Self, ApiError> {
        if api_key.trim().is_empty() {
            return Err(ApiError::Config("API key must not be empty".to_string()));
        }
        if account_id.trim().is_empty() {
            return Err(ApiError::Config("account id must not be empty".to_string()));
        }
        let config = ClientConfig::default().with_base_url(base_url);
        config.validate()?;
        let credentials = STANDARD.encode(format!("{api_key}:"));
        Ok(Self {
            account_id: account_id.to_string(),
            base_url: config.base_url,
            authorization: format!("Basic {credentials}"),
            transport,
        })
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Create a subscriber, or update the one that already has `email`.
    pub fn create_or_update_subscriber(&self, email: &str, custom_fields: &CustomFields) -> Result<(), ApiError> {
        let req = self.build_create_or_update_subscriber(email, custom_fields)?;
        self.parse_post(self.send(&req)?)
    }

    /// Send many subscribers in one batch.
    pub fn batch_update_subscribers(&self, subscribers: &[Subscriber]) -> Result<(), ApiError> {
        let req = self.build_batch_update_subscribers(subscribers)?;
        self.parse_post(self.send(&req)?)
    }

    /// Record a custom event named `action` for `email`.
    pub fn record_event(&self, email: &str, action: &str) -> Result<(), ApiError> {
        let req = self.build_record_event(email, action)?;
        self.parse_post(self.send(&req)?)
    }

    pub fn tag_subscriber(&self, email: &str, tag: &str) -> Result<(), ApiError> {
        let req = self.build_tag_subscriber(email, tag)?;
        self.parse_post(self.send(&req)?)
    }

    /// Remove `tag` from `email`. Only `204 No Content` counts as success.
    pub fn untag_subscriber(&self, email: &str, tag: &str) -> Result<(), ApiError> {
        let req = self.build_untag_subscriber(email, tag);
        self.parse_untag_subscriber(self.send(&req)?)
    }

    // -----------------------------------------------------------------------
    // Request builders
    // -----------------------------------------------------------------------

    pub fn build_create_or_update_subscriber(
        &self,
        email: &str,
        custom_fields: &CustomFields,
    ) -> Result<HttpRequest, ApiError> {
        let subscriber = Subscriber::new(email).with_custom_fields(custom_fields);
        let body = SubscribersBody {
            subscribers: std::slice::from_ref(&subscriber),
        };
        self.post("/subscribers", &body)
    }

    pub fn build_batch_update_subscribers(&self, subscribers: &[Subscriber]) -> Result<HttpRequest, ApiError> {
        let body = BatchesBody {
            batches: [SubscribersBody { subscribers }],
        };
        self.post("/subscribers/batches", &body)
    }

    pub fn build_record_event(&self, email: &str, action: &str) -> Result<HttpRequest, ApiError> {
        let body = EventsBody {
            events: [Event { email, action }],
        };
        self.post("/events", &body)
    }

    pub fn build_tag_subscriber(&self, email: &str, tag: &str) -> Result<HttpRequest, ApiError> {
        let body = TagsBody {
            tags: [TagAssociation { email, tag }],
        };
        self.post("/tags", &body)
    }

    pub fn build_untag_subscriber(&self, email: &str, tag: &str) -> HttpRequest {
        let path = format!(
            "/subscribers/{}/tags/{}",
            urlencoding::encode(email),
            urlencoding::encode(tag)
        );
        HttpRequest {
            method: HttpMethod::Delete,
            url: self.url(&path),
            headers: self.auth_headers(),
            body: None,
        }
    }

    // -----------------------------------------------------------------------
    // Response parsers
    // -----------------------------------------------------------------------

    /// Accepts any 2xx; used by every POST operation.
    pub fn parse_post(&self, response: HttpResponse) -> Result<(), ApiError> {
        if (200..300).contains(&response.status) {
            return Ok(());
        }
        Err(rejected(response))
    }

    pub fn parse_untag_subscriber(&self, response: HttpResponse) -> Result<(), ApiError> {
        if response.status == 204 {
            return Ok(());
        }
        Err(rejected(response))
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, self.account_id, path)
    }

    fn auth_headers(&self) -> Vec<(String, String)> {
        vec![
            ("authorization".to_string(), self.authorization.clone()),
            ("accept".to_string(), ACCEPT.to_string()),
        ]
    }

    fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(body)?;
        let mut headers = self.auth_headers();
        headers.push(("content-type".to_string(), CONTENT_TYPE.to_string()));
        Ok(HttpRequest {
            method: HttpMethod::Post,
            url: self.url(path),
            headers,
            body: Some(body),
        })
    }

    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        debug!(method = request.method.as_str(), url = %request.url, "sending Drip request");
        let response = self.transport.execute(request)?;
        debug!(status = response.status, "Drip responded");
        Ok(response)
    }
}

fn rejected(response: HttpResponse) -> ApiError {
    ApiError::Api {
        status: response.status,
        body: response.body,
    }
}

impl<T> fmt::Debug for DripClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DripClient")
            .field("account_id", &self.account_id)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
