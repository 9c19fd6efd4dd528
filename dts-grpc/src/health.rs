//! Liveness probes.

use std::time::Duration;

use tonic::transport::Endpoint;

/// Port the server binary listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 7859;
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Whether something accepts gRPC connections on `localhost:<port>`.
pub async fn is_server_running(port: u16) -> bool {
    probe(DEFAULT_HOST, port, DEFAULT_PROBE_TIMEOUT).await
}

/// Connect-and-disconnect probe against `host:port`.
///
/// Returns `false` for any connectivity failure, including an unparsable
/// host or a zero timeout; it never errors.
pub async fn probe(host: &str, port: u16, timeout: Duration) -> bool {
    let endpoint = match Endpoint::from_shared(format!("http://{host}:{port}")) {
        Ok(endpoint) => endpoint.connect_timeout(timeout),
        Err(err) => {
            tracing::debug!(host, port, error = %err, "probe endpoint rejected");
            return false;
        }
    };

    match tokio::time::timeout(timeout, endpoint.connect()).await {
        Ok(Ok(channel)) => {
            drop(channel);
            true
        }
        Ok(Err(err)) => {
            tracing::debug!(host, port, error = %err, "probe connect failed");
            false
        }
        Err(_) => {
            tracing::debug!(host, port, ?timeout, "probe timed out");
            false
        }
    }
}
