use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::domain::parse_timestamp;
use crate::error::CatalogError;

/// Run metadata retrieved from a model run's resource URL.
#[derive(Debug, Clone)]
pub struct PublicationRecord {
    pub run_publication_time: DateTime<Utc>,
    pub raw_json: Value,
}

pub trait PublicationClient: Send + Sync {
    fn fetch(&self, resource_url: &str) -> Result<PublicationRecord, CatalogError>;
}

#[derive(Clone)]
pub struct PublicationHttpClient {
    client: Client,
}

impl PublicationHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, CatalogError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("hc-catalog/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CatalogError::RemoteFetch(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| CatalogError::RemoteFetch(err.to_string()))?;
        Ok(Self { client })
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, CatalogError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "publication metadata request failed".to_string());
        Err(CatalogError::RemoteStatus { status, message })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, CatalogError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tracing::warn!(status, attempt, "retrying publication metadata request");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tracing::warn!(error = %err, attempt, "retrying publication metadata request");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(CatalogError::RemoteFetch(err.to_string()));
                }
            }
        }
    }
}

impl PublicationClient for PublicationHttpClient {
    fn fetch(&self, resource_url: &str) -> Result<PublicationRecord, CatalogError> {
        tracing::debug!(url = resource_url, "fetching publication metadata");
        let response = self.send_with_retries(|| self.client.get(resource_url))?;
        let response = Self::handle_status(response)?;
        let raw_json: Value = response
            .json()
            .map_err(|err| CatalogError::RemoteFetch(format!("malformed JSON: {err}")))?;
        parse_publication(raw_json)
    }
}

/// Requires a string `runPublicationTime` holding an ISO-8601 timestamp.
pub fn parse_publication(raw_json: Value) -> Result<PublicationRecord, CatalogError> {
    let value = raw_json
        .get("runPublicationTime")
        .ok_or_else(|| CatalogError::PublicationMetadata("missing runPublicationTime".to_string()))?;
    let text = value.as_str().ok_or_else(|| {
        CatalogError::PublicationMetadata(format!("runPublicationTime is not a string: {value}"))
    })?;
    let run_publication_time = parse_timestamp(text).ok_or_else(|| {
        CatalogError::PublicationMetadata(format!("runPublicationTime is not ISO-8601: {text}"))
    })?;
    Ok(PublicationRecord {
        run_publication_time,
        raw_json,
    })
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_python_isoformat() {
        let record = parse_publication(json!({
            "runPublicationTime": "2022-04-01T17:02:11.512000",
            "runnumber": "Yihua_Zheng_040122_1"
        }))
        .unwrap();
        assert_eq!(
            crate::domain::iso_seconds(&record.run_publication_time),
            "2022-04-01T17:02:11Z"
        );
    }

    #[test]
    fn missing_key_is_an_error() {
        let err = parse_publication(json!({"runnumber": "x"})).unwrap_err();
        assert_matches!(err, CatalogError::PublicationMetadata(_));
    }

    #[test]
    fn non_string_key_is_an_error() {
        let err = parse_publication(json!({"runPublicationTime": 12})).unwrap_err();
        assert_matches!(err, CatalogError::PublicationMetadata(_));
    }
}
