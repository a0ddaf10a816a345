//! Reachability probes.
//!
//! A [`Prober`] answers one question: did this URL respond in time with a
//! non-error status? Everything that goes wrong on the way (DNS, refused
//! connections, TLS, timeouts, malformed URLs) is an answer of `false`.

use std::future::Future;
use std::sync::Arc;

#[cfg(feature = "http-probe")]
pub use http::HttpProber;

/// Checks whether a single URL is reachable.
///
/// Implementations must be stateless with respect to individual checks and
/// must not leak connections between calls.
pub trait Prober: Send + Sync + 'static {
    /// Returns `true` if `url` answered with a status code below 400.
    fn check(&self, url: &str) -> impl Future<Output = bool> + Send;
}

impl<P: Prober> Prober for Arc<P> {
    fn check(&self, url: &str) -> impl Future<Output = bool> + Send {
        (**self).check(url)
    }
}

#[cfg(feature = "http-probe")]
mod http {
    use super::Prober;
    use crate::error::LinkCheckError;
    use crate::utils::normalize_url;
    use std::time::Duration;
    use tracing::debug;

    /// Prober backed by a shared `reqwest` client.
    ///
    /// The client keeps a connection pool, so one `HttpProber` should be
    /// shared by all workers rather than built per check.
    #[derive(Clone, Debug)]
    pub struct HttpProber {
        http_client: reqwest::Client,
        timeout: Duration,
    }

    impl HttpProber {
        /// Create a prober with the default 2 second timeout.
        pub fn new() -> Result<Self, LinkCheckError> {
            Self::with_timeout(Duration::from_secs(2))
        }

        /// Create a prober whose requests give up after `timeout`.
        pub fn with_timeout(timeout: Duration) -> Result<Self, LinkCheckError> {
            let http_client = reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(concat!("link-check/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| {
                    LinkCheckError::internal(format!("Failed to create HTTP client: {}", e))
                })?;

            Ok(Self {
                http_client,
                timeout,
            })
        }

        pub fn timeout(&self) -> Duration {
            self.timeout
        }

        /// Issue a GET request and return the response status code.
        ///
        /// The response body is never read; dropping the response hands the
        /// connection back to the pool.
        ///
        /// # Errors
        ///
        /// Returns `ProbeInconclusive` for any transport-level failure.
        pub async fn probe(&self, url: &str) -> Result<u16, LinkCheckError> {
            let target = normalize_url(url);
            let response = self.http_client.get(&target).send().await?;
            let status = response.status().as_u16();
            drop(response);
            Ok(status)
        }
    }

    impl Prober for HttpProber {
        async fn check(&self, url: &str) -> bool {
            match self.probe(url).await {
                Ok(status) => {
                    debug!(url, status, "probe answered");
                    status < 400
                }
                Err(e) => {
                    debug!(url, error = %e, "probe inconclusive");
                    false
                }
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        /// Serve a single canned HTTP response on an ephemeral port.
        async fn serve_once(status_line: &'static str) -> String {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                if let Ok((mut socket, _)) = listener.accept().await {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                        status_line
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                }
            });
            format!("http://{}/", addr)
        }

        #[tokio::test]
        async fn test_ok_response_is_reachable() {
            let url = serve_once("200 OK").await;
            let prober = HttpProber::new().unwrap();
            assert!(prober.check(&url).await);
        }

        #[tokio::test]
        async fn test_redirect_status_is_reachable() {
            let url = serve_once("304 Not Modified").await;
            let prober = HttpProber::new().unwrap();
            assert_eq!(prober.probe(&url).await.unwrap(), 304);
        }

        #[tokio::test]
        async fn test_client_error_is_unreachable() {
            let url = serve_once("404 Not Found").await;
            let prober = HttpProber::new().unwrap();
            assert!(!prober.check(&url).await);
        }

        #[tokio::test]
        async fn test_refused_connection_is_unreachable() {
            // Bind then drop to get a port nobody listens on.
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            drop(listener);

            let prober = HttpProber::with_timeout(Duration::from_millis(500)).unwrap();
            let url = format!("http://{}/", addr);
            assert!(matches!(
                prober.probe(&url).await,
                Err(LinkCheckError::ProbeInconclusive { .. })
            ));
            assert!(!prober.check(&url).await);
        }

        #[tokio::test]
        async fn test_malformed_url_is_unreachable() {
            let prober = HttpProber::new().unwrap();
            assert!(!prober.check("http://[::1").await);
            assert!(!prober.check("bad link").await);
            assert!(!prober.check("").await);
        }
    }
}
