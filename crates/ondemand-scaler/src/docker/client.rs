//! Minimal Docker Engine API client.
//!
//! Opens one HTTP/1.1 connection per request, which keeps the client
//! stateless and safe to share across tasks.

use std::path::PathBuf;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST};
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::error::{ScalerError, ScalerResult};

/// Engine API version prefix for every request path.
const API_VERSION: &str = "v1.41";

/// Default daemon endpoint.
pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Endpoint {
    Unix(PathBuf),
    Tcp(String),
}

/// A raw Engine API response.
#[derive(Debug)]
pub struct DockerResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl DockerResponse {
    /// Decode a JSON body, attributing failures to `name`.
    pub fn json<T: for<'de> Deserialize<'de>>(&self, name: &str) -> ScalerResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| ScalerError::Decode {
            name: name.to_string(),
            message: e.to_string(),
        })
    }

    /// Turn a non-success response into the matching error.
    pub fn into_error(self, name: &str) -> ScalerError {
        if self.status == StatusCode::NOT_FOUND {
            return ScalerError::NotFound(name.to_string());
        }

        #[derive(Deserialize)]
        struct ErrorBody {
            message: String,
        }

        let message = serde_json::from_slice::<ErrorBody>(&self.body)
            .map(|b| b.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(&self.body).trim().to_string());

        ScalerError::Api {
            name: name.to_string(),
            status: self.status.as_u16(),
            message,
        }
    }
}

/// Stateless Docker Engine API client.
#[derive(Debug, Clone)]
pub struct DockerClient {
    endpoint: Endpoint,
}

impl DockerClient {
    /// Create a client for `host`.
    ///
    /// Accepts `unix:///path`, a bare socket path, `tcp://host:port` or
    /// `http://host:port`.
    pub fn new(host: &str) -> ScalerResult<Self> {
        let host = host.trim();
        let endpoint = if let Some(path) = host.strip_prefix("unix://") {
            Endpoint::Unix(PathBuf::from(path))
        } else if let Some(addr) = host
            .strip_prefix("tcp://")
            .or_else(|| host.strip_prefix("http://"))
        {
            Endpoint::Tcp(addr.trim_end_matches('/').to_string())
        } else if host.starts_with('/') {
            Endpoint::Unix(PathBuf::from(host))
        } else {
            return Err(ScalerError::Config(format!(
                "unsupported docker host {host:?}, expected unix:// or tcp://"
            )));
        };

        if matches!(&endpoint, Endpoint::Tcp(addr) if addr.is_empty()) {
            return Err(ScalerError::Config("docker host address is empty".into()));
        }
        Ok(Self { endpoint })
    }

    pub async fn get(&self, name: &str, path: &str) -> ScalerResult<DockerResponse> {
        self.request(name, Method::GET, path, None).await
    }

    pub async fn post(
        &self,
        name: &str,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> ScalerResult<DockerResponse> {
        self.request(name, Method::POST, path, body).await
    }

    async fn request(
        &self,
        name: &str,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> ScalerResult<DockerResponse> {
        let transport = |message: String| ScalerError::Transport {
            name: name.to_string(),
            message,
        };

        let payload = match body {
            Some(value) => Bytes::from(serde_json::to_vec(value).map_err(|e| transport(e.to_string()))?),
            None => Bytes::new(),
        };

        let host = match &self.endpoint {
            Endpoint::Unix(_) => "docker",
            Endpoint::Tcp(addr) => addr.as_str(),
        };

        let uri = format!("/{API_VERSION}{path}");
        let req = Request::builder()
            .method(method.clone())
            .uri(&uri)
            .header(HOST, host)
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(payload))
            .map_err(|e| transport(format!("request build: {e}")))?;

        let (status, body) = match &self.endpoint {
            Endpoint::Unix(path) => connect_unix(path, req).await,
            Endpoint::Tcp(addr) => {
                let stream = tokio::net::TcpStream::connect(addr.as_str())
                    .await
                    .map_err(|e| format!("cannot connect to {addr}: {e}"));
                match stream {
                    Ok(stream) => exchange(stream, req).await,
                    Err(e) => Err(e),
                }
            }
        }
        .map_err(transport)?;

        debug!(%name, %method, %uri, status = status.as_u16(), "docker api call");
        Ok(DockerResponse { status, body })
    }
}

#[cfg(unix)]
async fn connect_unix(
    path: &std::path::Path,
    req: Request<Full<Bytes>>,
) -> Result<(StatusCode, Bytes), String> {
    let stream = tokio::net::UnixStream::connect(path)
        .await
        .map_err(|e| format!("cannot connect to {}: {e}", path.display()))?;
    exchange(stream, req).await
}

#[cfg(not(unix))]
async fn connect_unix(
    path: &std::path::Path,
    _req: Request<Full<Bytes>>,
) -> Result<(StatusCode, Bytes), String> {
    Err(format!(
        "unix sockets are not supported on this platform ({}), use tcp://",
        path.display()
    ))
}

/// Send one request over a fresh HTTP/1.1 connection.
async fn exchange<S>(stream: S, req: Request<Full<Bytes>>) -> Result<(StatusCode, Bytes), String>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| format!("handshake: {e}"))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "docker connection closed");
        }
    });

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| format!("send: {e}"))?;
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .map_err(|e| format!("read body: {e}"))?
        .to_bytes();
    Ok((status, body))
}
