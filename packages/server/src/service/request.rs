//! Request, handler-call and response types carried through the dispatch pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;

use apigate_core::{ApiError, Credential, RequestContext};
use axum::body::Body;
use axum::extract::{FromRequest, Query};
use axum::http::header::{ALLOW, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use bytes::Bytes;
use serde_json::Value;

/// Query and body parameters merged into one JSON object.
pub type ApiParams = serde_json::Map<String, Value>;

/// Values captured from `:name` segments of the matched path template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams(BTreeMap<String, String>);

impl RouteParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// The conventional `:id` parameter.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.get("id")
    }
}

/// An inbound API request after transport decoding.
///
/// The body is kept raw: the pipeline only parses it after the route match
/// and the media-type gate have passed.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Set when the transport could not read the body (e.g. over the limit).
    pub body_error: Option<String>,
    pub remote_ip: String,
    pub correlation_id: String,
}

impl ApiRequest {
    /// Builds a request with no body, mostly useful in tests.
    #[must_use]
    pub fn new(method: Method, uri: Uri, remote_ip: impl Into<String>) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            body_error: None,
            remote_ip: remote_ip.into(),
            correlation_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    /// Whether the request carries a body that needs a media-type check.
    #[must_use]
    pub fn has_body(&self) -> bool {
        matches!(self.method, Method::POST | Method::PUT | Method::PATCH) && !self.body.is_empty()
    }

    /// Parses query and body parameters. Body parameters win on key clashes.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::BadRequest` for unreadable bodies, malformed query
    /// strings, and JSON bodies that are not objects.
    pub async fn parse_params(&self) -> Result<ApiParams, ApiError> {
        if let Some(reason) = &self.body_error {
            return Err(ApiError::BadRequest(reason.clone()));
        }

        let mut params = ApiParams::new();
        let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(&self.uri)
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        for (key, value) in pairs {
            params.insert(key, Value::String(value));
        }

        if self.body.is_empty() {
            return Ok(params);
        }

        let essence = self
            .content_type()
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase());

        match essence.as_deref() {
            Some("application/json") => {
                let value: Value = serde_json::from_slice(&self.body)
                    .map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))?;
                let Value::Object(body) = value else {
                    return Err(ApiError::BadRequest("JSON body must be an object".to_string()));
                };
                params.extend(body);
            }
            Some("application/x-www-form-urlencoded") => {
                let request = Request::builder()
                    .method(Method::POST)
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(self.body.clone()))
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                let Form(pairs) = Form::<Vec<(String, String)>>::from_request(request, &())
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                for (key, value) in pairs {
                    params.insert(key, Value::String(value));
                }
            }
            // Multipart and raw bodies are left to the handler.
            _ => {}
        }

        Ok(params)
    }
}

/// Input handed to an endpoint handler.
#[derive(Debug, Clone)]
pub struct HandlerCall {
    /// `"<METHOD> <template>"`, identical to the context's caller id.
    pub route_key: Arc<str>,
    pub method: Method,
    pub credential: Arc<Credential>,
    pub context: RequestContext,
    pub params: ApiParams,
    pub route_params: RouteParams,
}

impl HandlerCall {
    /// A call with no query, body or route parameters.
    #[must_use]
    pub fn new(
        route_key: Arc<str>,
        method: Method,
        credential: Arc<Credential>,
        context: RequestContext,
    ) -> Self {
        Self {
            route_key,
            method,
            credential,
            context,
            params: ApiParams::new(),
            route_params: RouteParams::new(),
        }
    }
}

/// Response body variants a handler may produce.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Bytes { content_type: String, data: Bytes },
    Empty,
}

/// Successful handler output.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    pub status: StatusCode,
    pub body: ResponseBody,
}

impl HandlerResponse {
    #[must_use]
    pub fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body: ResponseBody::Json(body),
        }
    }

    #[must_use]
    pub fn created(body: Value) -> Self {
        Self {
            status: StatusCode::CREATED,
            body: ResponseBody::Json(body),
        }
    }

    #[must_use]
    pub fn no_content() -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            body: ResponseBody::Empty,
        }
    }

    #[must_use]
    pub fn bytes(content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::OK,
            body: ResponseBody::Bytes {
                content_type: content_type.into(),
                data: data.into(),
            },
        }
    }
}

/// Final pipeline output, converted to an HTTP response at the transport edge.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub allow: Vec<Method>,
    pub body: ResponseBody,
}

impl ApiResponse {
    #[must_use]
    pub fn from_error(error: &ApiError) -> Self {
        let allow = match error {
            ApiError::MethodNotAllowed { allowed, .. } => allowed.clone(),
            _ => Vec::new(),
        };
        Self {
            status: error.status(),
            allow,
            body: ResponseBody::Json(error.client_body()),
        }
    }

    /// 204 answer to an OPTIONS preflight.
    #[must_use]
    pub fn options(allow: Vec<Method>) -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            allow,
            body: ResponseBody::Empty,
        }
    }
}

impl From<HandlerResponse> for ApiResponse {
    fn from(response: HandlerResponse) -> Self {
        Self {
            status: response.status,
            allow: Vec::new(),
            body: response.body,
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let mut response = match self.body {
            ResponseBody::Json(value) => (self.status, Json(value)).into_response(),
            ResponseBody::Bytes { content_type, data } => {
                (self.status, [(CONTENT_TYPE, content_type)], data).into_response()
            }
            ResponseBody::Empty => self.status.into_response(),
        };

        if !self.allow.is_empty() {
            let allow = self
                .allow
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            if let Ok(value) = HeaderValue::from_str(&allow) {
                response.headers_mut().insert(ALLOW, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: Method, uri: &str, content_type: Option<&str>, body: &str) -> ApiRequest {
        let mut req = ApiRequest::new(method, uri.parse().unwrap(), "127.0.0.1");
        if let Some(ct) = content_type {
            req.headers
                .insert(CONTENT_TYPE, HeaderValue::from_str(ct).unwrap());
        }
        req.body = Bytes::from(body.to_string());
        req
    }

    #[tokio::test]
    async fn parses_query_and_json_body() {
        let req = request(
            Method::PUT,
            "/api/v4/groups/1?private_token=abc",
            Some("application/json"),
            r#"{"name": "Test", "visibility": "private"}"#,
        );
        let params = req.parse_params().await.unwrap();
        assert_eq!(params["private_token"], "abc");
        assert_eq!(params["name"], "Test");
        assert_eq!(params["visibility"], "private");
    }

    #[tokio::test]
    async fn parses_form_body() {
        let req = request(
            Method::POST,
            "/api/v4/groups",
            Some("application/x-www-form-urlencoded"),
            "name=Test+Group&path=test-group",
        );
        let params = req.parse_params().await.unwrap();
        assert_eq!(params["name"], "Test Group");
        assert_eq!(params["path"], "test-group");
    }

    #[tokio::test]
    async fn rejects_non_object_json() {
        let req = request(Method::POST, "/api/v4/groups", Some("application/json"), "[1, 2]");
        let err = req.parse_params().await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn body_error_becomes_bad_request() {
        let mut req = request(Method::POST, "/api/v4/groups", None, "");
        req.body_error = Some("request body too large".to_string());
        let err = req.parse_params().await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn options_response_carries_allow_header() {
        let response = ApiResponse::options(vec![Method::GET, Method::POST]).into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[ALLOW], "GET, POST");
    }
}
