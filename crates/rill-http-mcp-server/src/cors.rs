//! Minimal CORS layer: permissive defaults, preflight handling.

use hyper::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_EXPOSE_HEADERS,
};
use hyper::StatusCode;

use crate::body::{empty_response, HttpResponse};
use crate::SESSION_ID_HEADER;

/// CORS configuration.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allow_origin: String,
    pub allow_methods: String,
    pub allow_headers: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_methods: "GET, POST, DELETE, OPTIONS".to_string(),
            allow_headers: format!("Content-Type, Authorization, {SESSION_ID_HEADER}, Last-Event-Id"),
        }
    }
}

impl CorsConfig {
    /// Apply response headers.
    pub fn apply(&self, response: &mut HttpResponse) {
        let headers = response.headers_mut();
        if let Ok(value) = self.allow_origin.parse() {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        if let Ok(value) = SESSION_ID_HEADER.parse() {
            headers.insert(ACCESS_CONTROL_EXPOSE_HEADERS, value);
        }
    }

    /// Answer an OPTIONS preflight.
    pub fn preflight(&self) -> HttpResponse {
        let mut response = empty_response(StatusCode::NO_CONTENT);
        let headers = response.headers_mut();
        if let Ok(value) = self.allow_origin.parse() {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        if let Ok(value) = self.allow_methods.parse() {
            headers.insert(ACCESS_CONTROL_ALLOW_METHODS, value);
        }
        if let Ok(value) = self.allow_headers.parse() {
            headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preflight_headers() {
        let response = CorsConfig::default().preflight();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
        assert!(response
            .headers()
            .get(ACCESS_CONTROL_ALLOW_HEADERS)
            .unwrap()
            .to_str()
            .unwrap()
            .contains("Mcp-Session-Id"));
    }

    #[test]
    fn test_apply_exposes_session_header() {
        let mut response = empty_response(StatusCode::OK);
        CorsConfig::default().apply(&mut response);
        assert_eq!(
            response
                .headers()
                .get(ACCESS_CONTROL_EXPOSE_HEADERS)
                .unwrap(),
            "Mcp-Session-Id"
        );
    }
}
