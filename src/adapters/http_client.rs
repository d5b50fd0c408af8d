use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use eyre::Result;
use hyper::{Request, Response, Version, header, header::HeaderValue};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls_native_certs::load_native_certs;
use tokio::time::timeout;

use crate::ports::http_client::{HttpClient, HttpClientError, HttpClientResult};

/// Default time allowed for a backend to produce response headers.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Outbound HTTP client used by proxying handlers (hyper + rustls).
///
/// The instance seeded into the root heap is shared by every route, so
/// connection pools survive route reloads.
#[derive(Clone)]
pub struct HyperHttpClient {
    client: Client<HttpsConnector<HttpConnector>, AxumBody>,
    request_timeout: Duration,
}

impl HyperHttpClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(request_timeout: Duration) -> Result<Self> {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();
        for cert in native_certs.certs {
            if root_cert_store.add(cert).is_err() {
                tracing::warn!("Failed to add native certificate to rustls RootCertStore");
            }
        }
        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "Some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }
        tracing::debug!("Loaded {} native root certificates", root_cert_store.len());

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();
        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new()).build::<_, AxumBody>(https_connector);
        Ok(Self {
            client,
            request_timeout,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Point the `Host` header at the backend named by the absolute URI.
    fn set_host_header(req: &mut Request<AxumBody>) -> HttpClientResult<()> {
        let host = req
            .uri()
            .host()
            .ok_or_else(|| HttpClientError::InvalidRequest(format!("URI has no host: {}", req.uri())))?;
        let value = match req.uri().port_u16() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let value = HeaderValue::from_str(&value)
            .map_err(|e| HttpClientError::InvalidRequest(e.to_string()))?;
        req.headers_mut().insert(header::HOST, value);
        Ok(())
    }
}

#[async_trait]
impl HttpClient for HyperHttpClient {
    async fn send_request(
        &self,
        mut req: Request<AxumBody>,
    ) -> HttpClientResult<Response<AxumBody>> {
        Self::set_host_header(&mut req)?;
        if !req.headers().contains_key(header::USER_AGENT) {
            req.headers_mut().insert(
                header::USER_AGENT,
                HeaderValue::from_static(concat!("switchyard/", env!("CARGO_PKG_VERSION"))),
            );
        }

        let (mut parts, body) = req.into_parts();
        parts.version = Version::HTTP_11;
        let method = parts.method.clone();
        let uri = parts.uri.clone();
        tracing::debug!(http.method = %method, http.uri = %uri, "Forwarding request");

        match timeout(self.request_timeout, self.client.request(Request::from_parts(parts, body))).await {
            Ok(Ok(response)) => {
                let (mut parts, body) = response.into_parts();
                // The downstream server re-frames the streamed body.
                parts.headers.remove(header::TRANSFER_ENCODING);
                tracing::debug!(http.status_code = parts.status.as_u16(), http.uri = %uri, "Backend responded");
                Ok(Response::from_parts(parts, AxumBody::new(body)))
            }
            Ok(Err(e)) => {
                tracing::warn!(http.method = %method, http.uri = %uri, error = %e, "Backend request failed");
                Err(HttpClientError::ConnectionError(format!(
                    "Request to {method} {uri} failed: {e}"
                )))
            }
            Err(_) => Err(HttpClientError::Timeout(self.request_timeout.as_secs())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_client_creation() {
        let client = HyperHttpClient::with_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(client.request_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_host_header_includes_explicit_port() {
        let mut req = Request::builder()
            .uri("http://backend.internal:8081/api")
            .header(header::HOST, "gateway.example.com")
            .body(AxumBody::empty())
            .unwrap();
        HyperHttpClient::set_host_header(&mut req).unwrap();
        assert_eq!(req.headers()[header::HOST], "backend.internal:8081");
    }

    #[tokio::test]
    async fn test_relative_uri_is_rejected() {
        let client = HyperHttpClient::new().unwrap();
        let req = Request::builder()
            .uri("/relative")
            .body(AxumBody::empty())
            .unwrap();
        let result = client.send_request(req).await;
        assert!(matches!(result, Err(HttpClientError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_connection_refused_is_reported() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HyperHttpClient::with_timeout(Duration::from_secs(5)).unwrap();
        let req = Request::builder()
            .uri(format!("http://{addr}/"))
            .body(AxumBody::empty())
            .unwrap();
        let result = client.send_request(req).await;
        assert!(matches!(result, Err(HttpClientError::ConnectionError(_))));
    }
}
