//! Driver owns the background receiver
//!
//! One OS thread per connection runs a current-thread tokio runtime. The thread opens
//! the transport, performs the handshake, reports the result through a oneshot, then
//! loops over the transport until it is cancelled, the server disconnects, or the data
//! socket fails. It is the only writer of socket state and the only producer of frames.
//!
//! Frames fan out through a `broadcast` channel (each subscriber has its own bounded
//! queue and loses its oldest frames when it falls behind) and a `watch` channel that
//! only holds the newest frame. The driver owns the only senders, so when the thread
//! exits every subscriber sees end-of-stream.

use std::collections::VecDeque;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::{ConnectionParams, ConnectionType};
use crate::handshake;
use crate::protocol::{self, Message, Response};
use crate::transport::{Datagram, Transport};
use crate::types::{DataDescription, MoCapFrame, ProtocolVersion, ServerInfo};
use crate::{NatNetError, Result};

const SEND_ATTEMPTS: usize = 3;
const COMMAND_QUEUE: usize = 16;
const MESSAGE_QUEUE: usize = 32;

/// Counters kept by the background receiver.
#[derive(Debug, Default)]
pub struct ReceiverStats {
    datagrams: AtomicU64,
    frames_published: AtomicU64,
    decode_errors: AtomicU64,
    timeline_resets: AtomicU64,
}

impl ReceiverStats {
    /// Datagrams received on either socket after the handshake.
    pub fn datagrams(&self) -> u64 {
        self.datagrams.load(Ordering::Relaxed)
    }

    pub fn frames_published(&self) -> u64 {
        self.frames_published.load(Ordering::Relaxed)
    }

    /// Datagrams dropped because they failed to decode.
    pub fn decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }

    /// Times a frame number went backwards, as when Motive loops a take.
    pub fn timeline_resets(&self) -> u64 {
        self.timeline_resets.load(Ordering::Relaxed)
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Frame number of the last published frame.
#[derive(Debug, Default)]
struct Watermark {
    last: Option<i32>,
}

impl Watermark {
    /// Moves the watermark to `frame_number`, returning the old one if the numbers went backwards.
    fn advance(&mut self, frame_number: i32) -> Option<i32> {
        let previous = self.last.replace(frame_number)?;
        (frame_number < previous).then_some(previous)
    }
}

/// Requests the connection forwards to the receiver thread.
#[derive(Debug)]
pub(crate) enum DriverCommand {
    Request { command: String, reply: oneshot::Sender<Result<Response>> },
    ModelDefinitions { reply: oneshot::Sender<Result<Arc<Vec<DataDescription>>>> },
}

/// Channels and metadata handed to the connection once the handshake succeeded.
pub(crate) struct Session {
    pub server_info: Arc<ServerInfo>,
    pub version: ProtocolVersion,
    /// Never read; subscribers are created from it with `resubscribe`.
    pub frames: broadcast::Receiver<Arc<MoCapFrame>>,
    pub latest: watch::Receiver<Option<Arc<MoCapFrame>>>,
    pub definitions: watch::Receiver<Option<Arc<Vec<DataDescription>>>>,
    pub messages: broadcast::Receiver<Arc<str>>,
    pub commands: mpsc::Sender<DriverCommand>,
    pub stats: Arc<ReceiverStats>,
}

/// Stop signal plus the receiver thread.
///
/// Dropping the handle cancels the receiver and joins its thread.
pub(crate) struct DriverHandle {
    cancel: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl DriverHandle {
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|thread| !thread.is_finished())
    }

    /// Cancels the receiver and waits for its thread. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Receiver thread panicked");
            } else {
                debug!("Receiver thread joined");
            }
        }
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Receiver thread that is still performing the handshake.
pub(crate) struct PendingConnection {
    ready: oneshot::Receiver<Result<Session>>,
    handle: DriverHandle,
}

impl PendingConnection {
    pub async fn wait(self) -> Result<(Session, DriverHandle)> {
        let PendingConnection { ready, handle } = self;
        let session = ready.await.map_err(|_| {
            NatNetError::connection_failed("receiver thread exited during the handshake")
        })??;
        Ok((session, handle))
    }

    /// Blocks the calling thread until the handshake finished.
    pub fn wait_blocking(self) -> Result<(Session, DriverHandle)> {
        let PendingConnection { ready, handle } = self;
        let session = futures::executor::block_on(ready).map_err(|_| {
            NatNetError::connection_failed("receiver thread exited during the handshake")
        })??;
        Ok((session, handle))
    }
}

/// Driver spawns and manages the background receiver
pub(crate) struct Driver;

impl Driver {
    /// Start the receiver thread.
    ///
    /// `open` runs on the receiver's own runtime, so transports that register with a
    /// reactor (such as tokio sockets) are created where they will be polled.
    pub fn spawn<T, F, Fut>(params: ConnectionParams, open: F) -> Result<PendingConnection>
    where
        T: Transport,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>>,
    {
        let cancel = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel();
        let thread_cancel = cancel.clone();

        let thread = std::thread::Builder::new()
            .name("natnet-receiver".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(NatNetError::io("starting the receiver runtime", e)));
                        return;
                    }
                };
                runtime.block_on(Self::receiver_task(params, open, ready_tx, thread_cancel));
            })
            .map_err(|e| NatNetError::io("spawning the receiver thread", e))?;

        Ok(PendingConnection { ready: ready_rx, handle: DriverHandle { cancel, thread: Some(thread) } })
    }

    async fn receiver_task<T, F, Fut>(
        params: ConnectionParams,
        open: F,
        ready: oneshot::Sender<Result<Session>>,
        cancel: CancellationToken,
    ) where
        T: Transport,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut transport = match open().await {
            Ok(transport) => transport,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Handshake cancelled");
                let _ = ready.send(Err(NatNetError::Disconnected));
                return;
            }
            outcome = handshake::perform(&mut transport, &params) => outcome,
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };

        let (frame_tx, frame_rx) = broadcast::channel(params.queue_capacity);
        let (latest_tx, latest_rx) = watch::channel(None);
        let (definitions_tx, definitions_rx) =
            watch::channel(outcome.model_definitions.map(Arc::new));
        let (message_tx, message_rx) = broadcast::channel(MESSAGE_QUEUE);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let stats = Arc::new(ReceiverStats::default());

        let session = Session {
            server_info: Arc::new(outcome.server_info),
            version: outcome.version,
            frames: frame_rx,
            latest: latest_rx,
            definitions: definitions_rx,
            messages: message_rx,
            commands: command_tx,
            stats: stats.clone(),
        };

        let mut receiver = Receiver {
            transport,
            version: outcome.version,
            command_timeout: params.effective_command_timeout(),
            unicast: params.connection_type == ConnectionType::Unicast,
            frame_tx,
            latest_tx,
            definitions_tx,
            message_tx,
            stats,
            watermark: Watermark::default(),
            pending_responses: VecDeque::new(),
            pending_definitions: VecDeque::new(),
        };

        if ready.send(Ok(session)).is_err() {
            debug!("Connection abandoned before the handshake finished");
            receiver.say_goodbye().await;
            return;
        }

        receiver.run(command_rx, params.effective_keep_alive(), cancel).await;
    }
}

struct PendingReply<T> {
    deadline: Instant,
    reply: oneshot::Sender<Result<T>>,
}

/// Receive-decode-publish loop state.
struct Receiver<T> {
    transport: T,
    version: ProtocolVersion,
    command_timeout: Duration,
    unicast: bool,
    frame_tx: broadcast::Sender<Arc<MoCapFrame>>,
    latest_tx: watch::Sender<Option<Arc<MoCapFrame>>>,
    definitions_tx: watch::Sender<Option<Arc<Vec<DataDescription>>>>,
    message_tx: broadcast::Sender<Arc<str>>,
    stats: Arc<ReceiverStats>,
    watermark: Watermark,
    pending_responses: VecDeque<PendingReply<Response>>,
    pending_definitions: VecDeque<PendingReply<Arc<Vec<DataDescription>>>>,
}

impl<T: Transport> Receiver<T> {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<DriverCommand>,
        keep_alive: Option<Duration>,
        cancel: CancellationToken,
    ) {
        info!(version = %self.version, "Receiver started");
        let mut keep_alive = keep_alive.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Receiver cancelled");
                    self.say_goodbye().await;
                    break;
                }
                Some(command) = commands.recv() => self.on_command(command).await,
                _ = tick(&mut keep_alive) => {
                    if let Err(e) = self.send(&Message::KeepAlive).await {
                        warn!(error = %e, "Keep-alive failed");
                    }
                }
                _ = sleep_until(deadline) => self.expire_pending(),
                result = self.transport.recv() => match result {
                    Ok(datagram) => {
                        if self.on_datagram(datagram).is_break() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Transport failed, ending the stream");
                        break;
                    }
                },
            }
        }

        info!(
            frames = self.stats.frames_published(),
            decode_errors = self.stats.decode_errors(),
            resets = self.stats.timeline_resets(),
            "Receiver stopped"
        );
    }

    fn on_datagram(&mut self, datagram: Datagram) -> ControlFlow<()> {
        ReceiverStats::bump(&self.stats.datagrams);

        let message = match protocol::decode(&datagram.payload, self.version) {
            Ok(message) => message,
            Err(e) => {
                ReceiverStats::bump(&self.stats.decode_errors);
                warn!(channel = ?datagram.channel, bytes = datagram.payload.len(), error = %e, "Dropping datagram");
                return ControlFlow::Continue(());
            }
        };

        match message {
            Message::FrameOfData(frame) => self.publish(frame),
            Message::ModelDef(descriptions) => {
                info!(count = descriptions.len(), "Received model definitions");
                let descriptions = Arc::new(descriptions);
                self.definitions_tx.send_replace(Some(descriptions.clone()));
                for pending in self.pending_definitions.drain(..) {
                    let _ = pending.reply.send(Ok(descriptions.clone()));
                }
            }
            Message::Response(response) => self.resolve_response(Ok(response)),
            Message::UnrecognizedRequest => {
                warn!("Server did not recognize a request");
                self.resolve_response(Err(NatNetError::connection_failed(
                    "server did not recognize the request",
                )));
            }
            Message::MessageString(text) => {
                info!(message = %text, "Server message");
                let _ = self.message_tx.send(Arc::from(text));
            }
            Message::Disconnect => {
                info!("Server ended the session");
                return ControlFlow::Break(());
            }
            Message::Unrecognized { message_id } => {
                debug!(message_id, "Skipping unrecognized message");
            }
            other => trace!(message_id = other.message_id(), "Ignoring message"),
        }
        ControlFlow::Continue(())
    }

    fn publish(&mut self, frame: MoCapFrame) {
        // Every decoded frame is delivered as received; going backwards is only noted
        if let Some(previous) = self.watermark.advance(frame.frame_number) {
            ReceiverStats::bump(&self.stats.timeline_resets);
            info!(previous, frame = frame.frame_number, "Frame numbers went backwards");
        }

        trace!(frame = frame.frame_number, "Publishing frame");
        let frame = Arc::new(frame);
        self.latest_tx.send_replace(Some(frame.clone()));
        // Fails only when nobody holds a receiver, which is fine
        let _ = self.frame_tx.send(frame);
        ReceiverStats::bump(&self.stats.frames_published);
    }

    fn resolve_response(&mut self, response: Result<Response>) {
        let mut response = Some(response);
        while let Some(pending) = self.pending_responses.pop_front() {
            if pending.reply.is_closed() {
                continue;
            }
            if let Some(response) = response.take() {
                let _ = pending.reply.send(response);
            }
            return;
        }
        debug!("Response without a pending request");
    }

    async fn on_command(&mut self, command: DriverCommand) {
        let deadline = Instant::now() + self.command_timeout;
        match command {
            DriverCommand::Request { command, reply } => {
                debug!(%command, "Sending request");
                match self.send(&Message::Request(command)).await {
                    Ok(()) => self.pending_responses.push_back(PendingReply { deadline, reply }),
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            DriverCommand::ModelDefinitions { reply } => {
                debug!("Requesting model definitions");
                match self.send(&Message::RequestModelDef).await {
                    Ok(()) => self.pending_definitions.push_back(PendingReply { deadline, reply }),
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
        }
    }

    /// Sends on the command socket, retrying transient failures.
    async fn send(&mut self, message: &Message) -> Result<()> {
        let datagram = protocol::encode(message, self.version)?;
        let mut last_error = NatNetError::Disconnected;
        for attempt in 1..=SEND_ATTEMPTS {
            match self.transport.send_command(&datagram).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(attempt, message_id = message.message_id(), error = %e, "Send failed");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    fn next_deadline(&self) -> Option<Instant> {
        let responses = self.pending_responses.front().map(|p| p.deadline);
        let definitions = self.pending_definitions.front().map(|p| p.deadline);
        match (responses, definitions) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn expire_pending(&mut self) {
        let now = Instant::now();
        let timeout = self.command_timeout;
        expire(&mut self.pending_responses, now, timeout);
        expire(&mut self.pending_definitions, now, timeout);
    }

    /// Tells a unicast server we are leaving. Best effort.
    async fn say_goodbye(&mut self) {
        if !self.unicast {
            return;
        }
        match protocol::encode(&Message::Disconnect, self.version) {
            Ok(datagram) => {
                if let Err(e) = self.transport.send_command(&datagram).await {
                    debug!(error = %e, "Disconnect message not sent");
                }
            }
            Err(e) => debug!(error = %e, "Disconnect message not encoded"),
        }
    }
}

fn expire<T>(queue: &mut VecDeque<PendingReply<T>>, now: Instant, timeout: Duration) {
    while queue.front().is_some_and(|pending| pending.deadline <= now) {
        if let Some(pending) = queue.pop_front() {
            debug!(?timeout, "Command timed out");
            let _ = pending.reply.send(Err(NatNetError::Timeout { duration: timeout }));
        }
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockServer, mock_transport, sample_descriptions, sample_server_info};
    use crate::transport::Channel;
    use std::net::Ipv4Addr;
    use tokio::sync::broadcast::error::RecvError;

    const VERSION: ProtocolVersion = ProtocolVersion::new(3, 1);

    fn params() -> ConnectionParams {
        ConnectionParams::multicast(Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST)
            .with_connect_timeout(Duration::from_secs(2))
    }

    fn connect(params: ConnectionParams) -> (Session, DriverHandle, MockServer) {
        let (transport, mut server) = mock_transport();
        server.send_message(Channel::Command, &Message::ServerInfo(sample_server_info(VERSION)), VERSION);
        let pending = Driver::spawn(params, move || async move { Ok(transport) }).expect("spawns");
        let (session, handle) = pending.wait_blocking().expect("handshake succeeds");
        (session, handle, server)
    }

    fn frame(number: i32) -> Message {
        Message::FrameOfData(MoCapFrame::empty(number))
    }

    #[test]
    fn watermark_reports_every_backward_step() {
        let mut watermark = Watermark::default();
        assert_eq!(watermark.advance(5000), None);
        assert_eq!(watermark.advance(5000), None);
        assert_eq!(watermark.advance(4999), Some(5000));
        assert_eq!(watermark.advance(3000), Some(4999));
        assert_eq!(watermark.advance(3001), None);
        assert_eq!(watermark.advance(i32::MIN), Some(3001));
    }

    #[test]
    fn frames_reach_subscribers_in_order() {
        let (session, handle, server) = connect(params());
        let mut frames = session.frames.resubscribe();

        for number in 1..=20 {
            server.send_message(Channel::Data, &frame(number), VERSION);
        }
        for expected in 1..=20 {
            let frame = frames.blocking_recv().expect("frame arrives");
            assert_eq!(frame.frame_number, expected);
        }
        assert_eq!(session.latest.borrow().as_ref().map(|f| f.frame_number), Some(20));
        assert_eq!(session.stats.frames_published(), 20);
        drop(handle);
    }

    #[test]
    fn bad_datagrams_are_counted_and_skipped() {
        let (session, _handle, server) = connect(params());
        let mut frames = session.frames.resubscribe();

        server.push(Channel::Data, vec![7, 0, 200, 0, 1, 2, 3]);
        server.push(Channel::Data, vec![0xFF]);
        server.send_message(Channel::Data, &frame(42), VERSION);

        assert_eq!(frames.blocking_recv().expect("frame arrives").frame_number, 42);
        assert_eq!(session.stats.decode_errors(), 2);
        assert_eq!(session.stats.datagrams(), 3);
    }

    #[test]
    fn out_of_order_frames_are_delivered_as_received() {
        let (session, _handle, server) = connect(params());
        let mut frames = session.frames.resubscribe();

        for number in [10, 11, 9, 12] {
            server.send_message(Channel::Data, &frame(number), VERSION);
        }
        let seen: Vec<i32> =
            (0..4).map(|_| frames.blocking_recv().expect("frame").frame_number).collect();
        assert_eq!(seen, vec![10, 11, 9, 12]);
        assert_eq!(session.stats.timeline_resets(), 1);
        assert_eq!(session.stats.frames_published(), 4);
    }

    #[test]
    fn short_looping_take_delivers_every_frame() {
        let mut params = params();
        params.queue_capacity = 1024;
        let (session, _handle, server) = connect(params);
        let mut frames = session.frames.resubscribe();

        for _ in 0..2 {
            for number in 0..300 {
                server.send_message(Channel::Data, &frame(number), VERSION);
            }
        }
        server.send_message(Channel::Data, &frame(-1), VERSION);

        let seen: Vec<i32> = std::iter::from_fn(|| frames.blocking_recv().ok())
            .map(|frame| frame.frame_number)
            .take_while(|&number| number != -1)
            .collect();
        let expected: Vec<i32> = (0..300).chain(0..300).collect();
        assert_eq!(seen, expected);
        assert_eq!(session.stats.frames_published(), 601);
        // the second pass and the trailing -1 both step backwards
        assert_eq!(session.stats.timeline_resets(), 2);
    }

    #[test]
    fn server_disconnect_ends_the_stream() {
        let (session, mut handle, server) = connect(params());
        let mut frames = session.frames.resubscribe();
        drop(session);

        server.send_message(Channel::Data, &frame(1), VERSION);
        server.send_message(Channel::Command, &Message::Disconnect, VERSION);

        assert_eq!(frames.blocking_recv().expect("frame").frame_number, 1);
        assert!(matches!(frames.blocking_recv(), Err(RecvError::Closed)));
        handle.stop();
        assert!(!handle.is_running());
    }

    #[test]
    fn stop_unblocks_waiting_subscribers() {
        let (session, mut handle, _server) = connect(params());
        let mut frames = session.frames.resubscribe();
        drop(session);

        let waiter = std::thread::spawn(move || frames.blocking_recv());
        std::thread::sleep(Duration::from_millis(50));
        let started = std::time::Instant::now();
        handle.stop();

        assert!(matches!(waiter.join().expect("waiter"), Err(RecvError::Closed)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn requests_resolve_with_the_next_response() {
        let (session, _handle, mut server) = connect(params());
        server.drain_commands();

        let (reply_tx, reply_rx) = oneshot::channel();
        session
            .commands
            .blocking_send(DriverCommand::Request { command: "StartRecording".to_string(), reply: reply_tx })
            .expect("driver running");

        let request = server.recv_command_timeout(Duration::from_secs(1)).expect("request sent");
        assert_eq!(request, Message::Request("StartRecording".to_string()));

        server.send_message(Channel::Command, &Message::Response(Response::Code(0)), VERSION);
        let response = reply_rx.blocking_recv().expect("reply").expect("response");
        assert_eq!(response, Response::Code(0));
    }

    #[test]
    fn unanswered_requests_time_out() {
        let mut params = params();
        params.command_timeout = Some(Duration::from_millis(50));
        let (session, _handle, _server) = connect(params);

        let (reply_tx, reply_rx) = oneshot::channel();
        session
            .commands
            .blocking_send(DriverCommand::Request { command: "Ping".to_string(), reply: reply_tx })
            .expect("driver running");
        assert!(matches!(
            reply_rx.blocking_recv().expect("reply"),
            Err(NatNetError::Timeout { .. })
        ));
    }

    #[test]
    fn model_definitions_update_the_watch() {
        let (session, _handle, mut server) = connect(params());
        server.drain_commands();

        let (reply_tx, reply_rx) = oneshot::channel();
        session
            .commands
            .blocking_send(DriverCommand::ModelDefinitions { reply: reply_tx })
            .expect("driver running");
        assert_eq!(
            server.recv_command_timeout(Duration::from_secs(1)),
            Some(Message::RequestModelDef)
        );

        let defs = sample_descriptions(VERSION);
        server.send_message(Channel::Command, &Message::ModelDef(defs.clone()), VERSION);
        let received = reply_rx.blocking_recv().expect("reply").expect("definitions");
        assert_eq!(*received, defs);
        assert_eq!(session.definitions.borrow().as_deref(), Some(&defs));
    }

    #[test]
    fn unicast_sessions_keep_alive_and_say_goodbye() {
        let mut params = ConnectionParams::unicast(Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST);
        params.keep_alive_interval = Some(Duration::from_millis(20));
        let (session, mut handle, mut server) = connect(params);
        server.drain_commands();

        assert_eq!(server.recv_command_timeout(Duration::from_secs(1)), Some(Message::KeepAlive));

        drop(session);
        handle.stop();
        let mut after_stop = Vec::new();
        while let Some(message) = server.try_recv_command() {
            after_stop.push(message);
        }
        assert_eq!(after_stop.last(), Some(&Message::Disconnect));
    }

    #[test]
    fn failed_handshake_reports_the_error() {
        let (transport, server) = mock_transport();
        let params = params().with_connect_timeout(Duration::from_millis(50));
        let pending = Driver::spawn(params, move || async move { Ok(transport) }).expect("spawns");

        assert!(matches!(pending.wait_blocking(), Err(NatNetError::Timeout { .. })));
        drop(server);
    }

    #[test]
    fn failing_transport_open_is_reported() {
        let pending = Driver::spawn(params(), || async {
            Err::<crate::test_utils::MockTransport, _>(NatNetError::io(
                "binding the data socket",
                std::io::Error::from(std::io::ErrorKind::AddrInUse),
            ))
        })
        .expect("spawns");
        assert!(matches!(pending.wait_blocking(), Err(NatNetError::Io { .. })));
    }
}
