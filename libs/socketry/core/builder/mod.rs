pub mod states;

use crate::core::client::ClientSession;
use crate::core::config::{ClientConfig, ConfigError, ConfigResult};
use crate::handler::{ClientHandler, NoOpHandler};
use crate::reconnect::{FixedDelay, ReconnectionStrategy};
use crate::transport::Transport;
use states::*;
use std::sync::Arc;
use std::time::Duration;

/// Type-state builder for [`ClientSession`]
///
/// The target address and the transport are required; everything else has a
/// default. Without an explicit strategy the session waits the configured
/// reconnect delay before each attempt, up to `max_reconnects`.
///
/// ```ignore
/// let session = ClientSession::builder()
///     .target("ws://127.0.0.1:8080/")
///     .transport(WsTransport::default())
///     .handler(MyHandler)
///     .reconnect_delay(Duration::from_millis(200))
///     .max_reconnects(3)
///     .build()?;
/// session.connect().await?;
/// ```
pub struct ClientSessionBuilder<A, T>
where
    A: TargetState,
    T: TransportState,
{
    _state: TypeState<A, T>,
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    handler: Option<Arc<dyn ClientHandler>>,
    strategy: Option<Box<dyn ReconnectionStrategy>>,
}

impl ClientSessionBuilder<NoTarget, NoTransport> {
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            config: ClientConfig::default(),
            transport: None,
            handler: None,
            strategy: None,
        }
    }
}

impl Default for ClientSessionBuilder<NoTarget, NoTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientSession {
    /// Start building a session
    pub fn builder() -> ClientSessionBuilder<NoTarget, NoTransport> {
        ClientSessionBuilder::new()
    }
}

impl<A, T> ClientSessionBuilder<A, T>
where
    A: TargetState,
    T: TransportState,
{
    fn retag<A2: TargetState, T2: TransportState>(self) -> ClientSessionBuilder<A2, T2> {
        ClientSessionBuilder {
            _state: TypeState::new(),
            config: self.config,
            transport: self.transport,
            handler: self.handler,
            strategy: self.strategy,
        }
    }

    /// Address or URL to dial
    pub fn target(mut self, address: impl Into<String>) -> ClientSessionBuilder<HasTarget, T> {
        self.config.address = address.into();
        self.retag()
    }

    /// Replace the whole configuration, target included
    pub fn config(mut self, config: ClientConfig) -> ClientSessionBuilder<HasTarget, T> {
        self.config = config;
        self.retag()
    }

    pub fn transport(
        mut self,
        transport: impl Transport,
    ) -> ClientSessionBuilder<A, HasTransport> {
        self.transport = Some(Arc::new(transport));
        self.retag()
    }

    /// Share one transport between several sessions
    pub fn shared_transport(
        mut self,
        transport: Arc<dyn Transport>,
    ) -> ClientSessionBuilder<A, HasTransport> {
        self.transport = Some(transport);
        self.retag()
    }

    pub fn handler(mut self, handler: impl ClientHandler) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn shared_handler(mut self, handler: Arc<dyn ClientHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.strategy = Some(Box::new(strategy));
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_connect_timeout(timeout);
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_write_timeout(timeout);
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_read_timeout(timeout);
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config = self.config.with_reconnect_delay(delay);
        self
    }

    /// 0 = retry forever
    pub fn max_reconnects(mut self, max_reconnects: u32) -> Self {
        self.config = self.config.with_max_reconnects(max_reconnects);
        self
    }

    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.config = self.config.with_auto_reconnect(enabled);
        self
    }

    /// Ping every `interval`; the peer must answer within `pong_wait`
    pub fn heartbeat(mut self, interval: Duration, pong_wait: Duration) -> Self {
        self.config = self.config.with_heartbeat(interval, pong_wait);
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config = self.config.with_header(key, value);
        self
    }
}

// Build method - only available when all required fields are set
impl ClientSessionBuilder<HasTarget, HasTransport> {
    /// Validate the configuration and create a disconnected session
    pub fn build(self) -> ConfigResult<ClientSession> {
        self.config.validate()?;

        let strategy = self.strategy.unwrap_or_else(|| {
            Box::new(FixedDelay::from_config(
                self.config.reconnect_delay(),
                self.config.max_reconnects,
            ))
        });
        let handler = self.handler.unwrap_or_else(|| Arc::new(NoOpHandler));

        let transport = self.transport.ok_or_else(|| {
            ConfigError::ValidationError("transport must be set".to_string())
        })?;

        Ok(ClientSession::from_parts(
            self.config,
            transport,
            handler,
            strategy,
        ))
    }
}
