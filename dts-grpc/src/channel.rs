//! Channel and stub construction.

use std::time::Duration;

use tonic::metadata::{Ascii, MetadataValue};
use tonic::service::interceptor::InterceptedService;
use tonic::service::Interceptor;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::{Request, Status};

use crate::error::ChannelError;
use crate::health::{DEFAULT_HOST, DEFAULT_PORT};
use crate::proto::image_generation_service_client::ImageGenerationServiceClient;

/// Metadata key carrying the shared secret on every call.
pub const SHARED_SECRET_METADATA: &str = "shared-secret";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Stub type bound to a channel with the shared-secret interceptor.
pub type ImageGenerationClient =
    ImageGenerationServiceClient<InterceptedService<Channel, SecretInterceptor>>;

/// Where and how to reach the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub shared_secret: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            use_tls: true,
            shared_secret: None,
        }
    }
}

impl ConnectionConfig {
    /// Plaintext connection to `localhost:<port>`.
    pub fn local(port: u16) -> Self {
        Self {
            port,
            use_tls: false,
            ..Self::default()
        }
    }

    pub fn target(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

/// Attaches the shared secret as per-call metadata.
#[derive(Debug, Clone, Default)]
pub struct SecretInterceptor {
    secret: Option<MetadataValue<Ascii>>,
}

impl SecretInterceptor {
    pub fn new(secret: Option<&str>) -> Result<Self, ChannelError> {
        let secret = secret
            .filter(|s| !s.is_empty())
            .map(MetadataValue::<Ascii>::try_from)
            .transpose()?;
        Ok(Self { secret })
    }
}

impl Interceptor for SecretInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        if let Some(secret) = &self.secret {
            request
                .metadata_mut()
                .insert(SHARED_SECRET_METADATA, secret.clone());
        }
        Ok(request)
    }
}

/// Build a channel and a stub for `config` without performing any call.
///
/// The channel connects lazily on first use, so this never fails because the
/// server is down. Must be called from within a tokio runtime.
pub fn create_channel_and_stub(
    config: &ConnectionConfig,
) -> Result<(Channel, ImageGenerationClient), ChannelError> {
    let target = config.target();
    let mut endpoint =
        Endpoint::from_shared(target.clone()).map_err(|source| ChannelError::Endpoint {
            target: target.clone(),
            source,
        })?;
    endpoint = endpoint.connect_timeout(CONNECT_TIMEOUT);

    if config.use_tls {
        let tls = ClientTlsConfig::new()
            .with_native_roots()
            .domain_name(config.host.clone());
        endpoint = endpoint
            .tls_config(tls)
            .map_err(|source| ChannelError::Tls {
                target: target.clone(),
                source,
            })?;
    }

    let interceptor = SecretInterceptor::new(config.shared_secret.as_deref())?;
    let channel = endpoint.connect_lazy();
    tracing::debug!(endpoint = %target, tls = config.use_tls, "created lazy channel");

    let stub = ImageGenerationServiceClient::with_interceptor(channel.clone(), interceptor);
    Ok((channel, stub))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_scheme_follows_tls_flag() {
        let mut config = ConnectionConfig::default();
        assert_eq!(config.target(), "https://localhost:7859");
        config.use_tls = false;
        config.port = 7860;
        assert_eq!(config.target(), "http://localhost:7860");
        assert_eq!(ConnectionConfig::local(7860), config);
    }

    #[test]
    fn interceptor_attaches_secret_only_when_present() {
        let mut with_secret = SecretInterceptor::new(Some("s3cret")).expect("valid secret");
        let request = with_secret.call(Request::new(())).expect("intercept");
        assert_eq!(
            request
                .metadata()
                .get(SHARED_SECRET_METADATA)
                .and_then(|v| v.to_str().ok()),
            Some("s3cret")
        );

        let mut without = SecretInterceptor::new(Some("")).expect("empty secret");
        let request = without.call(Request::new(())).expect("intercept");
        assert!(request.metadata().get(SHARED_SECRET_METADATA).is_none());
    }

    #[test]
    fn secret_with_newline_is_rejected() {
        let err = SecretInterceptor::new(Some("bad\nsecret")).unwrap_err();
        assert!(matches!(err, ChannelError::InvalidSecret(_)));
    }

    #[tokio::test]
    async fn stub_is_built_without_a_server() {
        let config = ConnectionConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            use_tls: false,
            shared_secret: Some("token".to_string()),
        };
        assert!(create_channel_and_stub(&config).is_ok());
    }
}
