//! The agent API client.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, ETAG, HeaderMap, IF_MATCH};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::AgentError;
use crate::models::{
    CommandRequest, CommandResponse, DirectoryProperties, ErrorPayload, FileProperties,
};

/// A value paired with the entity tag the agent returned alongside it.
#[derive(Debug, Clone)]
pub struct Tagged<T> {
    pub value: T,
    pub etag: String,
}

/// Outcome of a PUT or upload: whether the target was created, and the
/// fresh entity tag where the operation returns one.
#[derive(Debug, Clone)]
pub struct PutResult {
    pub created: bool,
    pub etag: String,
}

/// Async client for the agent REST API.
///
/// Cheap to clone-by-reference behind an `Arc`; every operation takes the
/// run's cancellation token and races the round-trip against it, so
/// cancellation surfaces as [`AgentError::Cancelled`] through the normal
/// error channel.
#[derive(Debug, Clone)]
pub struct AgentClient {
    http: reqwest::Client,
    base: Url,
}

impl AgentClient {
    /// Builds a client for an endpoint like `https://host:8080`. The API
    /// base path (`/api/v1`) is appended here.
    pub fn new(endpoint: &str) -> Result<Self, AgentError> {
        let invalid = || AgentError::InvalidEndpoint(endpoint.to_string());

        let mut base = Url::parse(endpoint).map_err(|_| invalid())?;
        if base.host_str().is_none() {
            return Err(invalid());
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let base = base.join("api/v1/").map_err(|_| invalid())?;

        Ok(Self {
            http: reqwest::Client::new(),
            base,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    // ── Files ───────────────────────────────────────────────────────────

    pub async fn get_file_properties(
        &self,
        cancel: &CancellationToken,
        path: &str,
    ) -> Result<Tagged<FileProperties>, AgentError> {
        self.get_properties(cancel, "files", path).await
    }

    pub async fn put_file(
        &self,
        cancel: &CancellationToken,
        path: &str,
        properties: &FileProperties,
        if_match: Option<&str>,
    ) -> Result<PutResult, AgentError> {
        self.put_properties(cancel, "files", path, properties, if_match)
            .await
    }

    pub async fn delete_file(
        &self,
        cancel: &CancellationToken,
        path: &str,
        if_match: Option<&str>,
    ) -> Result<(), AgentError> {
        self.delete_properties(cancel, "files", path, if_match).await
    }

    // ── Directories ─────────────────────────────────────────────────────

    pub async fn get_directory_properties(
        &self,
        cancel: &CancellationToken,
        path: &str,
    ) -> Result<Tagged<DirectoryProperties>, AgentError> {
        self.get_properties(cancel, "directories", path).await
    }

    pub async fn put_directory(
        &self,
        cancel: &CancellationToken,
        path: &str,
        properties: &DirectoryProperties,
        if_match: Option<&str>,
    ) -> Result<PutResult, AgentError> {
        self.put_properties(cancel, "directories", path, properties, if_match)
            .await
    }

    pub async fn delete_directory(
        &self,
        cancel: &CancellationToken,
        path: &str,
        if_match: Option<&str>,
    ) -> Result<(), AgentError> {
        self.delete_properties(cancel, "directories", path, if_match)
            .await
    }

    // ── Commands ────────────────────────────────────────────────────────

    /// Executes a command on the target host. The timeout bounds the whole
    /// round-trip; the wire contract carries no timeout field of its own.
    pub async fn execute_command(
        &self,
        cancel: &CancellationToken,
        request: &CommandRequest,
        timeout: Duration,
    ) -> Result<CommandResponse, AgentError> {
        log::debug!("POST command: {:?}", request.command);
        let req = self
            .http
            .post(self.endpoint("command")?)
            .json(request)
            .timeout(timeout);
        let resp = self.send(cancel, req).await?;

        if resp.status().is_success() {
            Ok(resp.json().await?)
        } else {
            Err(error_from_response(resp).await)
        }
    }

    // ── Content transfer ────────────────────────────────────────────────

    /// Downloads a path as a gzipped tar archive. `recursive` selects
    /// directory semantics; the agent rejects a mismatch with 409.
    pub async fn download(
        &self,
        cancel: &CancellationToken,
        path: &str,
        recursive: bool,
    ) -> Result<Bytes, AgentError> {
        log::debug!("GET download: {path:?} (recursive: {recursive})");
        let req = self.http.get(self.endpoint("download")?).query(&[
            ("path", path.to_string()),
            ("recursive", recursive.to_string()),
        ]);
        let resp = self.send(cancel, req).await?;

        match resp.status() {
            StatusCode::OK => Ok(resp.bytes().await?),
            StatusCode::NOT_FOUND => Err(AgentError::NotFound),
            _ => Err(error_from_response(resp).await),
        }
    }

    /// Uploads a gzipped tar archive to a path, returning whether the
    /// target was created.
    pub async fn upload(
        &self,
        cancel: &CancellationToken,
        path: &str,
        recursive: bool,
        content: Vec<u8>,
    ) -> Result<bool, AgentError> {
        log::debug!(
            "POST upload: {path:?} ({} bytes, recursive: {recursive})",
            content.len()
        );
        let req = self
            .http
            .post(self.endpoint("upload")?)
            .query(&[
                ("path", path.to_string()),
                ("recursive", recursive.to_string()),
            ])
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(content);
        let resp = self.send(cancel, req).await?;

        match resp.status() {
            StatusCode::CREATED => Ok(true),
            StatusCode::NO_CONTENT => Ok(false),
            _ => Err(error_from_response(resp).await),
        }
    }

    // ── Shared plumbing ─────────────────────────────────────────────────

    async fn get_properties<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        segment: &str,
        path: &str,
    ) -> Result<Tagged<T>, AgentError> {
        log::debug!("GET {segment}: {path:?}");
        let req = self
            .http
            .get(self.endpoint(segment)?)
            .query(&[("path", path)]);
        let resp = self.send(cancel, req).await?;

        match resp.status() {
            StatusCode::OK => {
                let etag = read_etag(resp.headers())?;
                let value = resp.json().await?;
                Ok(Tagged { value, etag })
            }
            StatusCode::NOT_FOUND => Err(AgentError::NotFound),
            _ => Err(error_from_response(resp).await),
        }
    }

    async fn put_properties<T: Serialize>(
        &self,
        cancel: &CancellationToken,
        segment: &str,
        path: &str,
        properties: &T,
        if_match: Option<&str>,
    ) -> Result<PutResult, AgentError> {
        log::debug!("PUT {segment}: {path:?}");
        let mut req = self
            .http
            .put(self.endpoint(segment)?)
            .query(&[("path", path)])
            .json(properties);
        if let Some(etag) = if_match {
            req = req.header(IF_MATCH, etag);
        }
        let resp = self.send(cancel, req).await?;

        match resp.status() {
            StatusCode::CREATED => Ok(PutResult {
                created: true,
                etag: read_etag(resp.headers())?,
            }),
            StatusCode::NO_CONTENT => Ok(PutResult {
                created: false,
                etag: read_etag(resp.headers())?,
            }),
            _ => Err(error_from_response(resp).await),
        }
    }

    async fn delete_properties(
        &self,
        cancel: &CancellationToken,
        segment: &str,
        path: &str,
        if_match: Option<&str>,
    ) -> Result<(), AgentError> {
        log::debug!("DELETE {segment}: {path:?}");
        let mut req = self
            .http
            .delete(self.endpoint(segment)?)
            .query(&[("path", path)]);
        if let Some(etag) = if_match {
            req = req.header(IF_MATCH, etag);
        }
        let resp = self.send(cancel, req).await?;

        if resp.status() == StatusCode::NO_CONTENT {
            Ok(())
        } else {
            Err(error_from_response(resp).await)
        }
    }

    fn endpoint(&self, segment: &str) -> Result<Url, AgentError> {
        self.base
            .join(segment)
            .map_err(|_| AgentError::InvalidEndpoint(self.base.to_string()))
    }

    async fn send(
        &self,
        cancel: &CancellationToken,
        req: RequestBuilder,
    ) -> Result<Response, AgentError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            resp = req.send() => Ok(resp?),
        }
    }
}

fn read_etag(headers: &HeaderMap) -> Result<String, AgentError> {
    headers
        .get(ETAG)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .ok_or(AgentError::MissingEtag)
}

/// Maps a failure response to an [`AgentError`], preferring the agent's
/// structured payload over the raw status.
async fn error_from_response(resp: Response) -> AgentError {
    let status = resp.status();
    let body = resp.bytes().await.unwrap_or_default();
    parse_error(status, &body)
}

fn parse_error(status: StatusCode, body: &[u8]) -> AgentError {
    if let Ok(payload) = serde_json::from_slice::<ErrorPayload>(body) {
        return AgentError::Api {
            code: payload.code,
            message: payload.message,
        };
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    let message = if text.is_empty() {
        status.canonical_reason().unwrap_or("unknown error").to_string()
    } else {
        text.to_string()
    };
    AgentError::Api {
        code: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn new_appends_api_base_path() {
        let client = AgentClient::new("http://localhost:8080").unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:8080/api/v1/");

        let client = AgentClient::new("https://agent.example.com/").unwrap();
        assert_eq!(
            client.base_url().as_str(),
            "https://agent.example.com/api/v1/"
        );

        assert_eq!(
            client.endpoint("files").unwrap().as_str(),
            "https://agent.example.com/api/v1/files"
        );
    }

    #[test]
    fn new_rejects_endpoints_without_host() {
        assert!(matches!(
            AgentClient::new("not a url"),
            Err(AgentError::InvalidEndpoint(_))
        ));
        // "localhost:8080" parses, but as a scheme with no host.
        assert!(matches!(
            AgentClient::new("localhost:8080"),
            Err(AgentError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn parse_error_prefers_structured_payload() {
        let err = parse_error(
            StatusCode::CONFLICT,
            br#"{"code":409,"message":"ETag mismatch"}"#,
        );
        assert!(matches!(
            err,
            AgentError::Api { code: 409, ref message } if message == "ETag mismatch"
        ));
    }

    #[test]
    fn parse_error_falls_back_to_status_and_body() {
        let err = parse_error(StatusCode::INTERNAL_SERVER_ERROR, b"disk on fire");
        assert!(matches!(
            err,
            AgentError::Api { code: 500, ref message } if message == "disk on fire"
        ));

        let err = parse_error(StatusCode::FORBIDDEN, b"");
        assert!(matches!(
            err,
            AgentError::Api { code: 403, ref message } if message == "Forbidden"
        ));
    }

    #[test]
    fn read_etag_requires_header() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            read_etag(&headers),
            Err(AgentError::MissingEtag)
        ));

        headers.insert(ETAG, HeaderValue::from_static("W/\"abc123\""));
        assert_eq!(read_etag(&headers).unwrap(), "W/\"abc123\"");
    }
}
