use anyhow::Result;
use std::error::Error as StdError;
use std::time::Duration;
use url::Url;

use super::types::{ProbeOutcome, SuccessPolicy};

/// Prober trait for reachability checks of a single URL
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    /// Probe `url` once. Never fails, every failure mode is in the outcome.
    async fn probe(&self, url: &str) -> ProbeOutcome;
}

/// HTTP/HTTPS prober issuing one bounded GET per call
pub struct HttpProber {
    client: reqwest::Client,
    timeout: Duration,
    policy: SuccessPolicy,
}

impl HttpProber {
    pub fn new(timeout: Duration, policy: SuccessPolicy) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client, timeout, policy })
    }

    /// Single synchronous check for interactive use. Bypasses the tenant
    /// cache and the downtime ledger.
    pub async fn check_now(&self, url: &str) -> ProbeOutcome {
        self.probe(url).await
    }

    fn describe_error(&self, error: &reqwest::Error) -> String {
        if error.is_timeout() {
            return format!("request timed out after {}s", self.timeout.as_secs());
        }

        let root = root_cause(error);
        if error.is_connect() {
            format!("connection failed: {root}")
        } else {
            root
        }
    }
}

#[async_trait::async_trait]
impl Prober for HttpProber {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let target = match encode_target(url) {
            Ok(target) => target,
            Err(reason) => return ProbeOutcome::down(reason),
        };

        match self.client.get(target).send().await {
            Ok(response) => {
                let status = response.status();
                if self.policy.accepts(status.as_u16()) {
                    ProbeOutcome::up(status.as_u16())
                } else {
                    ProbeOutcome::rejected(
                        status.as_u16(),
                        format!("unexpected status code: {status}"),
                    )
                }
            }
            Err(e) => {
                tracing::debug!(url, error = %e, "Probe failed");
                ProbeOutcome::down(self.describe_error(&e))
            }
        }
    }
}

/// Parse user supplied input into a request URL.
///
/// Parsing percent-encodes spaces, quotes and non-ASCII characters in the
/// path and query so they cannot corrupt the request line.
pub fn encode_target(raw: &str) -> std::result::Result<Url, String> {
    let url = Url::parse(raw.trim()).map_err(|e| format!("invalid URL: {e}"))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported scheme: {other}")),
    }
}

fn root_cause(error: &(dyn StdError + 'static)) -> String {
    let mut current = error;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `status_line` to every connection on an ephemeral port
    async fn serve_status(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 2048];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 {status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{addr}")
    }

    /// Address that refuses connections
    async fn closed_port_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}/health")
    }

    #[tokio::test]
    async fn test_strict_accepts_only_200() {
        let ok = serve_status("200 OK").await;
        let no_content = serve_status("204 No Content").await;
        let prober = HttpProber::new(Duration::from_secs(5), SuccessPolicy::Strict).unwrap();

        let outcome = prober.probe(&ok).await;
        assert!(outcome.reachable);
        assert_eq!(outcome.status_code, Some(200));
        assert!(outcome.reason.is_empty());

        let outcome = prober.probe(&no_content).await;
        assert!(!outcome.reachable);
        assert_eq!(outcome.status_code, Some(204));
        assert!(outcome.reason.contains("204"));
    }

    #[tokio::test]
    async fn test_non_error_and_any_response_policies() {
        let not_found = serve_status("404 Not Found").await;
        let no_content = serve_status("204 No Content").await;

        let non_error = HttpProber::new(Duration::from_secs(5), SuccessPolicy::NonError).unwrap();
        assert!(non_error.probe(&no_content).await.reachable);
        assert!(!non_error.probe(&not_found).await.reachable);

        let any = HttpProber::new(Duration::from_secs(5), SuccessPolicy::AnyResponse).unwrap();
        let outcome = any.probe(&not_found).await;
        assert!(outcome.reachable);
        assert_eq!(outcome.status_code, Some(404));
    }

    #[tokio::test]
    async fn test_check_now_unreachable_reports_reason_within_timeout() {
        let url = closed_port_url().await;
        let timeout = Duration::from_secs(5);
        let prober = HttpProber::new(timeout, SuccessPolicy::NonError).unwrap();

        let started = Instant::now();
        let outcome = prober.check_now(&url).await;

        assert!(!outcome.reachable);
        assert!(!outcome.reason.is_empty());
        assert!(outcome.status_code.is_none());
        assert!(started.elapsed() <= timeout + Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_invalid_url_is_an_outcome() {
        let prober = HttpProber::new(Duration::from_secs(1), SuccessPolicy::Strict).unwrap();

        let outcome = prober.probe("not a url").await;
        assert!(!outcome.reachable);
        assert!(outcome.reason.starts_with("invalid URL"));

        let outcome = prober.probe("ftp://example.com").await;
        assert!(!outcome.reachable);
        assert!(outcome.reason.contains("ftp"));
    }

    #[test]
    fn test_encode_target_escapes_special_characters() {
        let url = encode_target("  http://example.com/a path/ü?q=a b\"c ").unwrap();
        let encoded = url.as_str();

        assert!(!encoded.contains(' '));
        assert!(!encoded.contains('"'));
        assert!(encoded.starts_with("http://example.com/a%20path/%C3%BC?q=a"));
    }
}
