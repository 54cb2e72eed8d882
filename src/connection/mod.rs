//! Client facade
//!
//! [`NatNetClient`] ties the pieces together: connecting spawns the background
//! receiver, which opens the sockets and runs the handshake on its own thread; the
//! client then hands out subscriptions and forwards requests. Dropping the client (or
//! calling [`NatNetClient::disconnect`]) stops the receiver, joins its thread and
//! closes both sockets, so teardown happens on every exit path.


use futures::{Stream, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info};

use crate::config::ConnectionParams;
use crate::driver::{Driver, DriverCommand, DriverHandle, ReceiverStats, Session};
use crate::protocol::Response;
use crate::stream::{FrameReader, LatestFrames};
use crate::transport::Transport;
use crate::transports::UdpTransport;
use crate::types::{DataDescription, MoCapFrame, ProtocolVersion, ServerInfo};
use crate::{NatNetError, Result};

/// Connected NatNet client.
///
/// # Example
///
/// ```rust,no_run
/// use natnet::{ConnectionParams, NatNetClient};
/// use std::net::Ipv4Addr;
///
/// # fn main() -> natnet::Result<()> {
/// let params = ConnectionParams::unicast(Ipv4Addr::new(192, 168, 1, 10), Ipv4Addr::new(192, 168, 1, 20));
/// let client = NatNetClient::connect_blocking(params)?;
/// println!("Connected to {} (NatNet {})", client.server_info().application_name, client.protocol_version());
///
/// for frame in client.subscribe().take(100) {
///     if let Some(body) = frame.rigid_body(1) {
///         println!("{}: {:?}", frame.frame_number, body.position);
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct NatNetClient {
    params: ConnectionParams,
    server_info: Arc<ServerInfo>,
    version: ProtocolVersion,

    /// Template receiver; subscriptions are resubscribed from it
    frames: broadcast::Receiver<Arc<MoCapFrame>>,
    latest: watch::Receiver<Option<Arc<MoCapFrame>>>,
    definitions: watch::Receiver<Option<Arc<Vec<DataDescription>>>>,
    messages: broadcast::Receiver<Arc<str>>,
    commands: mpsc::Sender<DriverCommand>,
    stats: Arc<ReceiverStats>,

    driver: DriverHandle,
}

impl NatNetClient {
    /// Connect over UDP, waiting for the handshake to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The parameters fail [`ConnectionParams::validate`]
    /// - A socket cannot be bound or the multicast group cannot be joined
    /// - The server does not answer within the connect timeout
    /// - The server speaks a protocol version older than 2.0
    pub async fn connect(params: ConnectionParams) -> Result<Self> {
        let transport_params = params.clone();
        Self::connect_with(params, move || async move { UdpTransport::open(&transport_params).await })
            .await
    }

    /// Blocking version of [`connect`](Self::connect) for plain-thread callers.
    ///
    /// Parks the calling thread until the handshake ends. Inside an async runtime this
    /// stalls the worker for up to the connect timeout; prefer `connect().await` there.
    pub fn connect_blocking(params: ConnectionParams) -> Result<Self> {
        params.validate()?;
        info!(server = %params.server_address, mode = ?params.connection_type, "Connecting to NatNet server");

        let transport_params = params.clone();
        let pending = Driver::spawn(params.clone(), move || async move {
            UdpTransport::open(&transport_params).await
        })?;
        let (session, driver) = pending.wait_blocking()?;
        Ok(Self::from_session(params, session, driver))
    }

    /// Connect through a caller-supplied transport.
    ///
    /// `open` runs on the receiver thread, which is where the transport will live.
    pub async fn connect_with<T, F, Fut>(params: ConnectionParams, open: F) -> Result<Self>
    where
        T: Transport,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>>,
    {
        params.validate()?;
        info!(server = %params.server_address, mode = ?params.connection_type, "Connecting to NatNet server");

        let pending = Driver::spawn(params.clone(), open)?;
        let (session, driver) = pending.wait().await?;
        Ok(Self::from_session(params, session, driver))
    }

    fn from_session(params: ConnectionParams, session: Session, driver: DriverHandle) -> Self {
        info!(
            server = %session.server_info.application_name,
            version = %session.version,
            "Connected"
        );
        Self {
            params,
            server_info: session.server_info,
            version: session.version,
            frames: session.frames,
            latest: session.latest,
            definitions: session.definitions,
            messages: session.messages,
            commands: session.commands,
            stats: session.stats,
            driver,
        }
    }

    /// Queued subscription to every frame published from now on.
    pub fn subscribe(&self) -> FrameReader {
        FrameReader::new(self.frames.resubscribe())
    }

    /// Latest-only subscription.
    pub fn subscribe_latest(&self) -> LatestFrames {
        LatestFrames::new(self.latest.clone())
    }

    /// Most recently published frame, if any.
    pub fn latest_frame(&self) -> Option<Arc<MoCapFrame>> {
        self.latest.borrow().clone()
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Version the decoder uses for this session.
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.version
    }

    /// Model definitions received so far, either during the handshake or through
    /// [`request_model_definitions`](Self::request_model_definitions).
    pub fn model_definitions(&self) -> Option<Arc<Vec<DataDescription>>> {
        self.definitions.borrow().clone()
    }

    /// Send a text request (for example `"StartRecording"`) and wait for the reply.
    ///
    /// # Errors
    ///
    /// - [`NatNetError::Timeout`] if the server stays silent for the command timeout
    /// - [`NatNetError::Disconnected`] if the connection has stopped
    pub async fn send_command(&self, command: impl Into<String>) -> Result<Response> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(DriverCommand::Request { command: command.into(), reply })
            .await
            .map_err(|_| NatNetError::Disconnected)?;
        response.await.map_err(|_| NatNetError::Disconnected)?
    }

    /// Blocking version of [`send_command`](Self::send_command).
    ///
    /// Parks the calling thread for up to the command timeout.
    pub fn send_command_blocking(&self, command: impl Into<String>) -> Result<Response> {
        futures::executor::block_on(self.send_command(command))
    }

    /// Ask the server for its model definitions.
    pub async fn request_model_definitions(&self) -> Result<Arc<Vec<DataDescription>>> {
        let (reply, definitions) = oneshot::channel();
        self.commands
            .send(DriverCommand::ModelDefinitions { reply })
            .await
            .map_err(|_| NatNetError::Disconnected)?;
        definitions.await.map_err(|_| NatNetError::Disconnected)?
    }

    /// Text messages the server sends from now on.
    pub fn server_messages(&self) -> impl Stream<Item = Arc<str>> + Send + 'static {
        BroadcastStream::new(self.messages.resubscribe()).filter_map(|message| async move { message.ok() })
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    /// Whether the background receiver is still streaming.
    pub fn is_running(&self) -> bool {
        self.driver.is_running()
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Stop the receiver, join its thread and close the sockets.
    ///
    /// Every subscription ends once it has drained what was already queued. Calling
    /// this again is a no-op. It briefly blocks the calling thread while the receiver
    /// shuts down.
    pub fn disconnect(&mut self) {
        if self.driver.is_running() {
            info!("Disconnecting");
        }
        self.driver.stop();
    }
}

impl Drop for NatNetClient {
    fn drop(&mut self) {
        debug!("Dropping NatNet client");
        self.disconnect();
    }
}
