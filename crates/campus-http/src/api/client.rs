//! API HTTP client implementation.

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, instrument, trace};

pub use reqwest::Method;

use campus_core::error::{InvalidInputError, ProtocolError, TransportError};
use campus_core::{AccessToken, ApiUrl, AuthError, Error, Result};

use crate::config::ClientConfig;

/// Map a reqwest failure onto the transport error family.
pub(crate) fn map_reqwest(err: reqwest::Error) -> Error {
    let transport = if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connection {
            message: err.to_string(),
        }
    } else if err.is_decode() || err.is_body() {
        TransportError::Decode {
            message: err.to_string(),
        }
    } else {
        TransportError::Http {
            message: err.to_string(),
        }
    };
    Error::Transport(transport)
}

/// A request to the API, kept in a form that can be sent more than once.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base, e.g. `courses/modules/`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Attach a JSON body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        let value = serde_json::to_value(body).map_err(|e| InvalidInputError::Body {
            message: e.to_string(),
        })?;
        self.body = Some(value);
        Ok(self)
    }
}

/// A fully read response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: u16,
    body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    pub fn text(&self) -> &str {
        &self.body
    }

    /// Decode the body as JSON regardless of status. An empty body decodes
    /// as `null`.
    pub fn json<R: DeserializeOwned>(&self) -> Result<R> {
        let text = if self.body.trim().is_empty() {
            "null"
        } else {
            self.body.as_str()
        };
        serde_json::from_str(text).map_err(|e| {
            TransportError::Decode {
                message: e.to_string(),
            }
            .into()
        })
    }

    /// The error this response represents.
    ///
    /// 401 maps to [`AuthError::Unauthorized`]; other statuses become a
    /// [`ProtocolError`] carrying the parsed body.
    pub fn error(&self) -> Error {
        if self.is_unauthorized() {
            return AuthError::Unauthorized.into();
        }
        let body = serde_json::from_str(&self.body).ok();
        ProtocolError::new(self.status, body).into()
    }

    /// Decode a successful response, or return its error.
    pub fn into_json<R: DeserializeOwned>(self) -> Result<R> {
        if self.is_success() {
            self.json()
        } else {
            Err(self.error())
        }
    }

    /// Discard a successful response body, or return its error.
    pub fn into_unit(self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self.error())
        }
    }
}

/// HTTP client for API requests.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    api: ApiUrl,
}

impl ApiClient {
    /// Create a new client from configuration.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.request_timeout)
            .build()
            .map_err(map_reqwest)?;

        Ok(Self {
            client,
            api: config.api_url.clone(),
        })
    }

    /// Returns the API base URL this client is configured for.
    pub fn api_url(&self) -> &ApiUrl {
        &self.api
    }

    /// Send a request once, with an optional bearer token.
    ///
    /// Any status is returned as a response; only failures to exchange the
    /// request at all are errors.
    #[instrument(skip(self, request, token), fields(api = %self.api, method = %request.method, path = %request.path))]
    pub async fn execute(
        &self,
        request: &ApiRequest,
        token: Option<&AccessToken>,
    ) -> Result<ApiResponse> {
        let url = self.api.endpoint(&request.path);
        debug!(authenticated = token.is_some(), "API request");
        trace!(query = ?request.query, "query parameters");

        let mut builder = self.client.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token.as_str());
        }

        let response = builder.send().await.map_err(map_reqwest)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest)?;
        trace!(status, "API response");

        Ok(ApiResponse::new(status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_core::error::ProtocolError;
    use serde_json::json;

    #[test]
    fn client_creation() {
        let api = ApiUrl::new("https://learn.example.com/api").unwrap();
        let client = ApiClient::new(&ClientConfig::new(api.clone())).unwrap();
        assert_eq!(client.api_url(), &api);
    }

    #[test]
    fn request_builder() {
        let request = ApiRequest::get("progress/lessons/")
            .query("module", "intro")
            .json(&json!({"a": 1}))
            .unwrap();
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.query, vec![("module".to_string(), "intro".to_string())]);
        assert_eq!(request.body, Some(json!({"a": 1})));
    }

    #[test]
    fn response_decoding() {
        let ok = ApiResponse::new(200, r#"{"value": 3}"#);
        let value: serde_json::Value = ok.into_json().unwrap();
        assert_eq!(value["value"], 3);

        let empty = ApiResponse::new(204, "");
        let value: serde_json::Value = empty.into_json().unwrap();
        assert!(value.is_null());
    }

    #[test]
    fn response_errors() {
        let unauthorized = ApiResponse::new(401, r#"{"detail": "nope"}"#);
        assert!(matches!(
            unauthorized.error(),
            Error::Auth(AuthError::Unauthorized)
        ));

        let invalid = ApiResponse::new(400, r#"{"email": ["Enter a valid email address."]}"#);
        match invalid.into_unit().unwrap_err() {
            Error::Protocol(ProtocolError { status, .. }) => assert_eq!(status, 400),
            other => panic!("unexpected error: {other:?}"),
        }

        let html = ApiResponse::new(502, "<html>Bad Gateway</html>");
        match html.error() {
            Error::Protocol(err) => {
                assert_eq!(err.status, 502);
                assert!(err.body.is_none());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
