//! `.rest` pseudo-files: a GET request description whose JSON answer
//! becomes the dataset.
//!
//! ```text
//! GET https://api.example.com/v1/articles
//! Authorization: Bearer abc123
//! Accept: application/json
//! ```

use serde_json::Value;
use std::time::Duration;

use crate::error::{ConfigError, LoadError, LoadResult};
use crate::loader::csv::{decode_content, detect_encoding};

/// A parsed request description.
#[derive(Debug, Clone, PartialEq)]
pub struct RestRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl RestRequest {
    /// Parse the description. Only `GET` is accepted.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut lines = text.lines();
        let request_line = lines
            .next()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| ConfigError::InvalidRequest("empty request description".into()))?;

        let mut parts = request_line.split_whitespace();
        let (Some(method), Some(url)) = (parts.next(), parts.next()) else {
            return Err(ConfigError::InvalidRequest(format!(
                "expected '<METHOD> <URL>', got '{}'",
                request_line
            )));
        };

        let method = method.to_ascii_uppercase();
        if method != "GET" {
            return Err(ConfigError::UnsupportedMethod(method));
        }

        let headers = lines
            .take_while(|l| !l.trim().is_empty())
            .filter_map(|l| l.split_once(": "))
            .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
            .collect();

        Ok(Self {
            method,
            url: url.to_string(),
            headers,
        })
    }

    /// Perform the request and parse a 2xx body as JSON.
    pub fn fetch(&self, timeout: Duration) -> LoadResult<Value> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LoadError::HttpError(e.to_string()))?;

        let mut request = client.get(&self.url);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .map_err(|e| LoadError::HttpError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::HttpStatus {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let body = response
            .text()
            .map_err(|e| LoadError::HttpError(e.to_string()))?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Decode, parse and execute a `.rest` upload.
pub fn load_rest(bytes: &[u8], timeout: Duration) -> LoadResult<Value> {
    let encoding = detect_encoding(bytes);
    let text = decode_content(bytes, &encoding).map_err(|e| LoadError::EncodingError(e.message))?;
    let request = RestRequest::parse(&text)?;
    request.fetch(timeout)
}
