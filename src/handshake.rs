//! Handshake state machine
//!
//! The state machine is pure: it consumes datagrams and returns the messages that
//! must be sent next, leaving I/O and timing to [`perform`].
//!
//! ```text
//! ┌──────┐ Ping ┌──────────────────────┐ ServerInfo ┌──────────────────┐ ModelDef ┌───────────┐
//! │ Idle │─────>│ AwaitingPingResponse │───────────>│ AwaitingModelDef │─────────>│ Connected │
//! └──────┘      └──────────────────────┘            └──────────────────┘          └───────────┘
//!                  │ Response/MessageString            (only when requested)         ↑
//!                  ↓                                                                 │
//!               ┌────────────────────┐  ServerInfo                                   │
//!               │ AwaitingServerInfo │───────────────────────────────────────────────┘
//!               └────────────────────┘
//! ```
//!
//! Any non-terminal state moves to `Failed` on timeout, on a malformed ServerInfo or
//! ModelDef, or when the server's version is too old. There is exactly one attempt;
//! retrying is up to the caller.

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::ConnectionParams;
use crate::protocol::{self, Message, MessageId};
use crate::transport::Transport;
use crate::types::{DataDescription, ProtocolVersion, ServerInfo};
use crate::{NatNetError, Result};

/// Why a handshake ended in [`HandshakeState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeFailure {
    Timeout,
    MalformedResponse(String),
    UnsupportedVersion(ProtocolVersion),
    Transport(String),
}

impl fmt::Display for HandshakeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeFailure::Timeout => f.write_str("timed out"),
            HandshakeFailure::MalformedResponse(details) => write!(f, "malformed response: {details}"),
            HandshakeFailure::UnsupportedVersion(version) => write!(f, "server speaks NatNet {version}"),
            HandshakeFailure::Transport(details) => write!(f, "transport failed: {details}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    AwaitingPingResponse,
    AwaitingServerInfo,
    AwaitingModelDef,
    Connected,
    Failed(HandshakeFailure),
}

impl HandshakeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandshakeState::Connected | HandshakeState::Failed(_))
    }
}

/// Message the driver must send to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum HandshakeAction {
    Send(Message),
}

/// Everything a successful handshake learned.
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeOutcome {
    pub server_info: ServerInfo,
    /// Layout used to decode frames for the rest of the session.
    pub version: ProtocolVersion,
    pub model_definitions: Option<Vec<DataDescription>>,
}

/// Picks the decoding layout from what the server reported.
///
/// An override wins. Otherwise 0.0 means the server's native layout (the newest we
/// know), anything newer than we know is decoded as the newest layout, and anything
/// older than the oldest layout fails.
pub fn negotiate_version(
    reported: ProtocolVersion,
    version_override: Option<ProtocolVersion>,
) -> Result<ProtocolVersion> {
    if let Some(version) = version_override {
        if version != reported {
            info!(%reported, %version, "Using protocol version override");
        }
        return Ok(version);
    }
    if reported.is_unspecified() {
        debug!(version = %ProtocolVersion::LATEST, "Server reported 0.0, assuming its native layout");
        return Ok(ProtocolVersion::LATEST);
    }
    if reported > ProtocolVersion::LATEST {
        warn!(
            %reported,
            decoding_as = %ProtocolVersion::LATEST,
            "Server is newer than this client, decoding with the newest known layout"
        );
        return Ok(ProtocolVersion::LATEST);
    }
    if reported < ProtocolVersion::MINIMUM {
        return Err(NatNetError::unsupported_version(
            reported,
            format!("oldest supported server is NatNet {}", ProtocolVersion::MINIMUM),
        ));
    }
    Ok(reported)
}

/// Handshake state machine for one connection attempt.
#[derive(Debug, Clone)]
pub struct Handshake {
    state: HandshakeState,
    client_name: String,
    version_override: Option<ProtocolVersion>,
    request_model_definitions: bool,
    server_info: Option<ServerInfo>,
    version: Option<ProtocolVersion>,
    model_definitions: Option<Vec<DataDescription>>,
}

impl Handshake {
    pub fn new(params: &ConnectionParams) -> Self {
        Self {
            state: HandshakeState::Idle,
            client_name: params.client_name.clone(),
            version_override: params.version_override,
            request_model_definitions: params.request_model_definitions,
            server_info: None,
            version: None,
            model_definitions: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    /// Negotiated version, once the ServerInfo arrived.
    #[must_use]
    pub fn version(&self) -> Option<ProtocolVersion> {
        self.version
    }

    /// Idle → AwaitingPingResponse.
    pub fn start(&mut self) -> Result<Vec<HandshakeAction>> {
        if self.state != HandshakeState::Idle {
            return Err(NatNetError::connection_failed(format!(
                "handshake already started ({:?})",
                self.state
            )));
        }
        self.state = HandshakeState::AwaitingPingResponse;
        let announced = self.version_override.unwrap_or(ProtocolVersion::LATEST);
        Ok(vec![HandshakeAction::Send(Message::Ping {
            client_name: self.client_name.clone(),
            natnet_version: announced.to_bytes(),
        })])
    }

    /// Feeds one received datagram through the state machine.
    ///
    /// Datagrams that do not matter in the current state (frames streaming before the
    /// handshake finished, keep-alives, unknown ids) are ignored. An error means the
    /// machine is now in [`HandshakeState::Failed`].
    pub fn on_datagram(&mut self, datagram: &[u8]) -> Result<Vec<HandshakeAction>> {
        let Some(id) = protocol::peek_message_id(datagram).and_then(MessageId::from_u16) else {
            trace!(state = ?self.state, "Ignoring unknown datagram during handshake");
            return Ok(Vec::new());
        };

        match (&self.state, id) {
            (
                HandshakeState::AwaitingPingResponse | HandshakeState::AwaitingServerInfo,
                MessageId::ServerInfo,
            ) => self.on_server_info(datagram),
            (HandshakeState::AwaitingPingResponse, MessageId::Response | MessageId::MessageString) => {
                debug!(?id, "Server acknowledged the ping, waiting for server info");
                self.state = HandshakeState::AwaitingServerInfo;
                Ok(Vec::new())
            }
            (HandshakeState::AwaitingModelDef, MessageId::ModelDef) => self.on_model_def(datagram),
            (HandshakeState::AwaitingModelDef, MessageId::UnrecognizedRequest) => {
                warn!("Server does not answer model definition requests, continuing without them");
                self.model_definitions = Some(Vec::new());
                self.state = HandshakeState::Connected;
                Ok(Vec::new())
            }
            (state, id) => {
                trace!(?state, ?id, "Ignoring message during handshake");
                Ok(Vec::new())
            }
        }
    }

    fn on_server_info(&mut self, datagram: &[u8]) -> Result<Vec<HandshakeAction>> {
        let info = match protocol::decode(datagram, ProtocolVersion::LATEST) {
            Ok(Message::ServerInfo(info)) => info,
            Ok(other) => {
                let details = format!("expected server info, decoded {other:?}");
                return Err(self.fail(
                    HandshakeFailure::MalformedResponse(details.clone()),
                    NatNetError::malformed(details),
                ));
            }
            Err(e) => {
                return Err(self.fail(HandshakeFailure::MalformedResponse(e.to_string()), e));
            }
        };

        let reported = info.protocol_version();
        let version = match negotiate_version(reported, self.version_override) {
            Ok(version) => version,
            Err(e) => return Err(self.fail(HandshakeFailure::UnsupportedVersion(reported), e)),
        };

        info!(
            application = %info.application_name,
            server_version = ?info.server_version,
            natnet = %reported,
            decoding_as = %version,
            "Received server info"
        );
        self.server_info = Some(info);
        self.version = Some(version);

        if self.request_model_definitions {
            self.state = HandshakeState::AwaitingModelDef;
            Ok(vec![HandshakeAction::Send(Message::RequestModelDef)])
        } else {
            self.state = HandshakeState::Connected;
            Ok(Vec::new())
        }
    }

    fn on_model_def(&mut self, datagram: &[u8]) -> Result<Vec<HandshakeAction>> {
        let version = self.version.unwrap_or_default();
        match protocol::decode(datagram, version) {
            Ok(Message::ModelDef(descriptions)) => {
                info!(count = descriptions.len(), "Received model definitions");
                self.model_definitions = Some(descriptions);
                self.state = HandshakeState::Connected;
                Ok(Vec::new())
            }
            Ok(other) => {
                let details = format!("expected model definitions, decoded {other:?}");
                Err(self.fail(
                    HandshakeFailure::MalformedResponse(details.clone()),
                    NatNetError::malformed(details),
                ))
            }
            Err(e) => Err(self.fail(HandshakeFailure::MalformedResponse(e.to_string()), e)),
        }
    }

    /// Moves to `Failed(Timeout)` and returns the error to surface.
    pub fn on_timeout(&mut self, waited: Duration) -> NatNetError {
        self.fail(HandshakeFailure::Timeout, NatNetError::Timeout { duration: waited })
    }

    /// Moves to `Failed(Transport)` after a socket error.
    pub fn on_transport_error(&mut self, error: NatNetError) -> NatNetError {
        self.fail(HandshakeFailure::Transport(error.to_string()), error)
    }

    fn fail(&mut self, failure: HandshakeFailure, error: NatNetError) -> NatNetError {
        warn!(state = ?self.state, %failure, "Handshake failed");
        self.state = HandshakeState::Failed(failure);
        error
    }

    /// Takes the outcome once the machine reached [`HandshakeState::Connected`].
    pub fn take_outcome(&mut self) -> Option<HandshakeOutcome> {
        if self.state != HandshakeState::Connected {
            return None;
        }
        Some(HandshakeOutcome {
            server_info: self.server_info.take()?,
            version: self.version?,
            model_definitions: self.model_definitions.take(),
        })
    }
}

/// Runs one handshake over `transport`, bounded by the connect timeout.
pub async fn perform<T: Transport>(
    transport: &mut T,
    params: &ConnectionParams,
) -> Result<HandshakeOutcome> {
    let window = params.effective_connect_timeout();
    let deadline = Instant::now() + window;
    let mut handshake = Handshake::new(params);

    info!(server = %params.server_command_addr(), timeout = ?window, "Starting NatNet handshake");
    let actions = handshake.start()?;
    execute(transport, &mut handshake, actions).await?;

    loop {
        if let Some(outcome) = handshake.take_outcome() {
            return Ok(outcome);
        }

        let datagram = match tokio::time::timeout_at(deadline, transport.recv()).await {
            Ok(Ok(datagram)) => datagram,
            Ok(Err(e)) => return Err(handshake.on_transport_error(e)),
            Err(_) => return Err(handshake.on_timeout(window)),
        };

        let actions = handshake.on_datagram(&datagram.payload)?;
        execute(transport, &mut handshake, actions).await?;
    }
}

async fn execute<T: Transport>(
    transport: &mut T,
    handshake: &mut Handshake,
    actions: Vec<HandshakeAction>,
) -> Result<()> {
    for action in actions {
        match action {
            HandshakeAction::Send(message) => {
                let version = handshake.version().unwrap_or_default();
                let datagram = protocol::encode(&message, version)?;
                if let Err(e) = transport.send_command(&datagram).await {
                    return Err(handshake.on_transport_error(e));
                }
                debug!(message_id = message.message_id(), "Sent handshake message");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{encode_message, mock_transport, sample_descriptions, sample_server_info};
    use crate::transport::Channel;
    use crate::types::MoCapFrame;
    use std::net::Ipv4Addr;

    fn params() -> ConnectionParams {
        ConnectionParams::unicast(Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST)
    }

    fn server_info_datagram(natnet: ProtocolVersion) -> Vec<u8> {
        encode_message(&Message::ServerInfo(sample_server_info(natnet)), ProtocolVersion::LATEST)
    }

    #[test]
    fn start_sends_a_ping_announcing_our_version() {
        let mut handshake = Handshake::new(&params());
        let actions = handshake.start().expect("starts");
        assert_eq!(handshake.state(), &HandshakeState::AwaitingPingResponse);
        assert_eq!(
            actions,
            vec![HandshakeAction::Send(Message::Ping {
                client_name: "NatNetClient".to_string(),
                natnet_version: [4, 1, 0, 0],
            })]
        );
        assert!(handshake.start().is_err(), "second start is rejected");
    }

    #[test]
    fn server_info_completes_the_handshake() {
        let mut handshake = Handshake::new(&params());
        handshake.start().expect("starts");

        let actions =
            handshake.on_datagram(&server_info_datagram(ProtocolVersion::new(3, 1))).expect("accepted");
        assert!(actions.is_empty());
        assert_eq!(handshake.state(), &HandshakeState::Connected);

        let outcome = handshake.take_outcome().expect("connected");
        assert_eq!(outcome.version, ProtocolVersion::new(3, 1));
        assert_eq!(outcome.server_info.application_name, "Motive");
        assert_eq!(outcome.model_definitions, None);
    }

    #[test]
    fn acknowledgement_moves_to_awaiting_server_info() {
        let mut handshake = Handshake::new(&params());
        handshake.start().expect("starts");

        let ack = encode_message(&Message::MessageString("hello".to_string()), ProtocolVersion::LATEST);
        handshake.on_datagram(&ack).expect("accepted");
        assert_eq!(handshake.state(), &HandshakeState::AwaitingServerInfo);

        handshake.on_datagram(&server_info_datagram(ProtocolVersion::LATEST)).expect("accepted");
        assert_eq!(handshake.state(), &HandshakeState::Connected);
    }

    #[test]
    fn model_definitions_are_awaited_when_requested() {
        let version = ProtocolVersion::new(4, 0);
        let mut handshake = Handshake::new(&params().with_model_definitions(true));
        handshake.start().expect("starts");

        let actions = handshake.on_datagram(&server_info_datagram(version)).expect("accepted");
        assert_eq!(actions, vec![HandshakeAction::Send(Message::RequestModelDef)]);
        assert_eq!(handshake.state(), &HandshakeState::AwaitingModelDef);
        assert!(handshake.take_outcome().is_none());

        let defs = sample_descriptions(version);
        handshake
            .on_datagram(&encode_message(&Message::ModelDef(defs.clone()), version))
            .expect("accepted");
        let outcome = handshake.take_outcome().expect("connected");
        assert_eq!(outcome.model_definitions, Some(defs));
    }

    #[test]
    fn frames_during_the_handshake_are_ignored() {
        let mut handshake = Handshake::new(&params());
        handshake.start().expect("starts");

        let frame = encode_message(&Message::FrameOfData(MoCapFrame::empty(1)), ProtocolVersion::LATEST);
        assert!(handshake.on_datagram(&frame).expect("ignored").is_empty());
        assert!(handshake.on_datagram(&[0xFF]).expect("ignored").is_empty());
        assert_eq!(handshake.state(), &HandshakeState::AwaitingPingResponse);
    }

    #[test]
    fn malformed_server_info_fails() {
        let mut handshake = Handshake::new(&params());
        handshake.start().expect("starts");

        // ServerInfo id with a payload far too short for the application name
        let datagram = [1, 0, 4, 0, b'M', b'o', b't', 0];
        assert!(handshake.on_datagram(&datagram).is_err());
        assert!(matches!(handshake.state(), HandshakeState::Failed(HandshakeFailure::MalformedResponse(_))));
        assert!(handshake.take_outcome().is_none());
    }

    #[test]
    fn version_negotiation_rules() {
        let latest = ProtocolVersion::LATEST;
        assert_eq!(negotiate_version(ProtocolVersion::new(0, 0), None).expect("native"), latest);
        assert_eq!(negotiate_version(ProtocolVersion::new(5, 2), None).expect("clamped"), latest);
        assert_eq!(
            negotiate_version(ProtocolVersion::new(2, 9), None).expect("supported"),
            ProtocolVersion::new(2, 9)
        );
        assert!(matches!(
            negotiate_version(ProtocolVersion::new(1, 9), None),
            Err(NatNetError::UnsupportedVersion { .. })
        ));
        assert_eq!(
            negotiate_version(ProtocolVersion::new(1, 9), Some(ProtocolVersion::new(3, 0)))
                .expect("override wins"),
            ProtocolVersion::new(3, 0)
        );
    }

    #[test]
    fn ancient_server_fails_the_handshake() {
        let mut handshake = Handshake::new(&params());
        handshake.start().expect("starts");
        let result = handshake.on_datagram(&server_info_datagram(ProtocolVersion::new(1, 5)));
        assert!(matches!(result, Err(NatNetError::UnsupportedVersion { .. })));
        assert_eq!(
            handshake.state(),
            &HandshakeState::Failed(HandshakeFailure::UnsupportedVersion(ProtocolVersion::new(1, 5)))
        );
    }

    #[tokio::test]
    async fn silent_server_times_out_on_schedule() {
        let (mut transport, server) = mock_transport();
        let params = params().with_connect_timeout(Duration::from_millis(100));

        let started = std::time::Instant::now();
        let result = perform(&mut transport, &params).await;
        let elapsed = started.elapsed();

        assert!(matches!(result, Err(NatNetError::Timeout { .. })));
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(500), "took {elapsed:?}");
        drop(server);
    }

    #[tokio::test]
    async fn perform_against_a_scripted_server() {
        let (mut transport, mut server) = mock_transport();
        server.push(Channel::Command, server_info_datagram(ProtocolVersion::new(3, 0)));

        let outcome = perform(&mut transport, &params()).await.expect("connects");
        assert_eq!(outcome.version, ProtocolVersion::new(3, 0));

        let sent = server.try_recv_command().expect("ping was sent");
        assert!(matches!(sent, Message::Ping { .. }));
    }
}
