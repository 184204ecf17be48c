use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use loadphase_http::{HttpClient, HttpRequest, HttpTransportErrorKind};
use tokio::time::Instant;
use tracing::debug;

use crate::config::Target;

/// Why an exchange produced no status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Connect,
    Transport,
}

impl From<HttpTransportErrorKind> for ErrorKind {
    fn from(kind: HttpTransportErrorKind) -> Self {
        match kind {
            HttpTransportErrorKind::Timeout => Self::Timeout,
            HttpTransportErrorKind::Connect => Self::Connect,
            _ => Self::Transport,
        }
    }
}

/// Raw result of one request: exactly one of `status` and `error` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exchange {
    pub status: Option<u16>,
    pub error: Option<ErrorKind>,
    /// Call start to completion or timeout, connection setup included.
    pub latency: Duration,
}

impl Exchange {
    #[must_use]
    pub fn status(status: u16, latency: Duration) -> Self {
        Self {
            status: Some(status),
            error: None,
            latency,
        }
    }

    #[must_use]
    pub fn error(kind: ErrorKind, latency: Duration) -> Self {
        Self {
            status: None,
            error: Some(kind),
            latency,
        }
    }
}

/// Issues one request for a request identity. Status interpretation is left to the classifier.
pub trait RequestExecutor: Send + Sync + 'static {
    fn execute(&self, identity: u64) -> impl Future<Output = Exchange> + Send;
}

/// `POST {target}?{param}={identity}` with an empty body.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: HttpClient,
    target: Target,
    timeout: Option<Duration>,
}

impl HttpExecutor {
    #[must_use]
    pub fn new(client: HttpClient, target: Target, timeout: Option<Duration>) -> Self {
        Self {
            client,
            target,
            timeout,
        }
    }
}

impl RequestExecutor for HttpExecutor {
    async fn execute(&self, identity: u64) -> Exchange {
        let req = HttpRequest::post(self.target.url_for(identity), Bytes::new())
            .with_headers(&self.target.headers)
            .with_timeout(self.timeout);

        let started = Instant::now();
        let res = self.client.request(req).await;
        let latency = started.elapsed();

        match res {
            Ok(res) => Exchange::status(res.status, latency),
            Err(err) => {
                let kind = ErrorKind::from(err.transport_error_kind());
                debug!(identity, error = %err, %kind, "request failed");
                Exchange::error(kind, latency)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_kinds_collapse_to_three_reasons() {
        assert_eq!(
            ErrorKind::from(HttpTransportErrorKind::Timeout),
            ErrorKind::Timeout
        );
        assert_eq!(
            ErrorKind::from(HttpTransportErrorKind::Connect),
            ErrorKind::Connect
        );
        assert_eq!(
            ErrorKind::from(HttpTransportErrorKind::BodyRead),
            ErrorKind::Transport
        );
        assert_eq!(
            ErrorKind::from(HttpTransportErrorKind::Request),
            ErrorKind::Transport
        );
    }
}
