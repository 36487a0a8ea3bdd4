//! The optional `fetch` capability.
//!
//! Only hosts on the allow-list can be reached; an empty list denies every
//! request, so enabling the capability without hosts is harmless.

use crate::error::RuntimeOpError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Hosts sandboxed code may reach through `fetch`
#[derive(Debug, Clone, Default)]
pub struct AllowedHosts {
    hosts: Arc<HashSet<String>>,
}

impl AllowedHosts {
    pub fn new(hosts: Option<Vec<String>>) -> Self {
        let host_set = hosts
            .unwrap_or_default()
            .into_iter()
            .map(|h| h.trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect::<HashSet<String>>();

        Self {
            hosts: Arc::new(host_set),
        }
    }

    /// Check if a host (`name` or `name:port`) is allowed for network access
    pub fn is_allowed(&self, host: &str) -> bool {
        if self.hosts.is_empty() {
            return false;
        }
        self.hosts.contains(&host.to_ascii_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Fetch request options
#[derive(Debug, Default, Deserialize)]
pub(crate) struct FetchOptions {
    pub method: Option<String>,
    pub headers: Option<serde_json::Value>,
    pub body: Option<String>,
}

/// Fetch response
#[derive(Debug, Serialize)]
pub(crate) struct FetchResponse {
    pub status: u16,
    pub headers: serde_json::Value,
    pub body: String,
}

/// Checks `url` against the allow-list and returns it parsed
pub(crate) fn authorize(url: &str, allowed_hosts: &AllowedHosts) -> Result<url::Url, RuntimeOpError> {
    let parsed_url =
        url::Url::parse(url).map_err(|e| RuntimeOpError::Fetch(format!("Invalid URL: {e}")))?;

    let host_str = parsed_url
        .host_str()
        .ok_or_else(|| RuntimeOpError::Fetch("URL has no host".to_string()))?;

    let host_with_port = if let Some(port) = parsed_url.port() {
        format!("{host_str}:{port}")
    } else {
        host_str.to_string()
    };

    // try both with and without port
    if !allowed_hosts.is_allowed(&host_with_port) && !allowed_hosts.is_allowed(host_str) {
        return Err(RuntimeOpError::HostNotAllowed(host_with_port));
    }

    Ok(parsed_url)
}

/// Perform a fetch request with host permissions
pub(crate) async fn fetch_with_permissions(
    url: String,
    options: Option<FetchOptions>,
    allowed_hosts: &AllowedHosts,
) -> Result<FetchResponse, RuntimeOpError> {
    let parsed_url = authorize(&url, allowed_hosts)?;
    let options = options.unwrap_or_default();

    let client = reqwest::Client::new();
    let method = options.method.as_deref().unwrap_or("GET").to_uppercase();
    debug!("sandbox fetch {method} {parsed_url}");

    let mut request = match method.as_str() {
        "GET" => client.get(parsed_url),
        "POST" => client.post(parsed_url),
        "PUT" => client.put(parsed_url),
        "DELETE" => client.delete(parsed_url),
        "PATCH" => client.patch(parsed_url),
        "HEAD" => client.head(parsed_url),
        _ => {
            return Err(RuntimeOpError::Fetch(format!(
                "Unsupported HTTP method: {method}"
            )));
        }
    };

    if let Some(headers_obj) = options.headers.as_ref().and_then(|h| h.as_object()) {
        for (key, value) in headers_obj {
            if let Some(value_str) = value.as_str() {
                request = request.header(key, value_str);
            }
        }
    }

    if let Some(body) = options.body {
        request = request.body(body);
    }

    let response = request
        .send()
        .await
        .map_err(|e| RuntimeOpError::Fetch(e.to_string()))?;

    let status = response.status().as_u16();

    let headers_map: serde_json::Map<String, serde_json::Value> = response
        .headers()
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                serde_json::Value::String(v.to_str().unwrap_or("").to_string()),
            )
        })
        .collect();

    let body = response
        .text()
        .await
        .map_err(|e| RuntimeOpError::Fetch(format!("Failed to read response body: {e}")))?;

    Ok(FetchResponse {
        status,
        headers: serde_json::Value::Object(headers_map),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_allow_list_denies_everything() {
        let hosts = AllowedHosts::new(None);
        assert!(hosts.is_empty());
        assert!(matches!(
            authorize("https://example.com/data", &hosts),
            Err(RuntimeOpError::HostNotAllowed(h)) if h == "example.com"
        ));
    }

    #[test]
    fn test_host_with_and_without_port() {
        let hosts = AllowedHosts::new(Some(vec![
            "API.example.com".into(),
            "localhost:3000".into(),
        ]));
        assert!(authorize("https://api.example.com/v1", &hosts).is_ok());
        assert!(authorize("https://api.example.com:8443/v1", &hosts).is_ok());
        assert!(authorize("http://localhost:3000/x", &hosts).is_ok());
        assert!(authorize("http://localhost:4000/x", &hosts).is_err());
    }

    #[test]
    fn test_invalid_url() {
        let hosts = AllowedHosts::new(Some(vec!["example.com".into()]));
        assert!(matches!(
            authorize("not a url", &hosts),
            Err(RuntimeOpError::Fetch(_))
        ));
    }
}
