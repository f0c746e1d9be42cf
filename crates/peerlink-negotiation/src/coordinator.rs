//! The negotiation coordinator: one task that owns every session.
//!
//! Each session carries a FIFO queue of engine operations. The coordinator
//! starts the head of the queue on a spawned task and does not start the
//! next one until the completion has come back through the mailbox. A
//! completion (or engine event) tagged with an epoch that no longer
//! matches a live session is dropped, which is how teardown cancels work
//! that is already running.

use std::collections::VecDeque;
use std::sync::Arc;

use peerlink_protocol::{
    Codec, IceCandidate, JsonCodec, SdpKind, SessionDescription,
    SignalingMessage,
};
use peerlink_session::{NegotiationState, Role, Session, SessionRegistry};
use peerlink_transport::{SessionId, TransportEvent};
use tokio::sync::{mpsc, oneshot};

use crate::{
    EngineError, EngineEvent, EngineEvents, EngineFactory, LogSink,
    MediaSink, MediaTrack, NegotiationConfig, NegotiationEngine,
    NegotiationError, Outbound, PeerConnectionState,
};

// ---------------------------------------------------------------------------
// Mailbox
// ---------------------------------------------------------------------------

/// Everything the coordinator reacts to.
pub(crate) enum Command {
    Transport(TransportEvent),
    Call {
        id: SessionId,
        reply: oneshot::Sender<Result<(), NegotiationError>>,
    },
    Engine {
        id: SessionId,
        epoch: u64,
        event: EngineEvent,
    },
    Completed {
        id: SessionId,
        epoch: u64,
        result: Result<OpOutcome, EngineError>,
    },
    Inspect {
        id: SessionId,
        reply: oneshot::Sender<Option<SessionInfo>>,
    },
    List {
        reply: oneshot::Sender<Vec<SessionId>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

// ---------------------------------------------------------------------------
// Engine operations
// ---------------------------------------------------------------------------

const ADD_CANDIDATE: &str = "addIceCandidate";

/// One queued call into a session's engine.
#[derive(Debug)]
enum EngineOp {
    CreateOffer,
    CreateAnswer,
    SetLocal(SessionDescription),
    SetRemote(SessionDescription),
    AddCandidate(IceCandidate),
}

impl EngineOp {
    fn name(&self) -> &'static str {
        match self {
            Self::CreateOffer => "createOffer",
            Self::CreateAnswer => "createAnswer",
            Self::SetLocal(_) => "setLocalDescription",
            Self::SetRemote(_) => "setRemoteDescription",
            Self::AddCandidate(_) => ADD_CANDIDATE,
        }
    }
}

/// What a successful [`EngineOp`] produced.
#[derive(Debug)]
pub(crate) enum OpOutcome {
    OfferCreated(SessionDescription),
    AnswerCreated(SessionDescription),
    LocalSet(SessionDescription),
    RemoteSet(SdpKind),
    CandidateAdded,
}

/// Per-session resources stored alongside the negotiation state.
struct Peer<E> {
    engine: Arc<E>,
    queue: VecDeque<EngineOp>,
    /// Name of the operation currently running, if any.
    in_flight: Option<&'static str>,
    connection: PeerConnectionState,
    tracks: Vec<MediaTrack>,
}

impl<E> Peer<E> {
    fn new(engine: E) -> Self {
        Self {
            engine: Arc::new(engine),
            queue: VecDeque::new(),
            in_flight: None,
            connection: PeerConnectionState::New,
            tracks: Vec::new(),
        }
    }
}

/// A snapshot of one session, for inspection and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub role: Role,
    pub state: NegotiationState,
    pub epoch: u64,
    pub pending_candidates: usize,
    pub remote_description_set: bool,
    /// Whether an engine operation is running right now.
    pub in_flight: bool,
    /// Engine operations waiting behind the running one.
    pub queued: usize,
    pub connection: PeerConnectionState,
    pub tracks: Vec<MediaTrack>,
}

fn snapshot<E>(session: &Session<Peer<E>>) -> SessionInfo {
    SessionInfo {
        id: session.id().clone(),
        role: session.role(),
        state: session.state(),
        epoch: session.epoch(),
        pending_candidates: session.pending_candidates().len(),
        remote_description_set: session.remote_description_set(),
        in_flight: session.peer.in_flight.is_some(),
        queued: session.peer.queue.len(),
        connection: session.peer.connection,
        tracks: session.peer.tracks.clone(),
    }
}

// ---------------------------------------------------------------------------
// CoordinatorHandle
// ---------------------------------------------------------------------------

/// Handle to a running coordinator. Cheap to clone.
///
/// The coordinator stops once every handle is dropped (or on
/// [`shutdown`](Self::shutdown)), closing every engine it still owns.
#[derive(Clone)]
pub struct CoordinatorHandle {
    sender: mpsc::Sender<Command>,
}

impl CoordinatorHandle {
    /// Feeds one transport event into the coordinator.
    ///
    /// Waits while the mailbox is full.
    pub async fn transport_event(
        &self,
        event: TransportEvent,
    ) -> Result<(), NegotiationError> {
        self.sender
            .send(Command::Transport(event))
            .await
            .map_err(|_| NegotiationError::Unavailable)
    }

    /// Starts an outgoing offer to session `id` (the Caller path).
    ///
    /// Returns once the offer is queued; the description itself goes out
    /// when the engine has produced and applied it.
    ///
    /// # Errors
    /// [`NegotiationError::Session`] if `id` is mid-negotiation, or
    /// [`NegotiationError::Engine`] if no engine could be built for it.
    pub async fn call(&self, id: SessionId) -> Result<(), NegotiationError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(Command::Call {
                id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| NegotiationError::Unavailable)?;
        reply_rx.await.map_err(|_| NegotiationError::Unavailable)?
    }

    /// Returns a snapshot of session `id`, or `None` if it does not exist.
    pub async fn session_info(
        &self,
        id: &SessionId,
    ) -> Result<Option<SessionInfo>, NegotiationError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(Command::Inspect {
                id: id.clone(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| NegotiationError::Unavailable)?;
        reply_rx.await.map_err(|_| NegotiationError::Unavailable)
    }

    /// Ids of all live sessions.
    pub async fn sessions(&self) -> Result<Vec<SessionId>, NegotiationError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(Command::List { reply: reply_tx })
            .await
            .map_err(|_| NegotiationError::Unavailable)?;
        reply_rx.await.map_err(|_| NegotiationError::Unavailable)
    }

    /// Closes every session and stops the coordinator.
    pub async fn shutdown(&self) -> Result<(), NegotiationError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(Command::Shutdown { reply: reply_tx })
            .await
            .map_err(|_| NegotiationError::Unavailable)?;
        reply_rx.await.map_err(|_| NegotiationError::Unavailable)
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Builder for the coordinator task.
///
/// ```rust,ignore
/// let handle = Coordinator::new(factory, signaling.handle())
///     .config(config.negotiation)
///     .call_on_open(true)
///     .spawn();
/// ```
pub struct Coordinator<F, O> {
    factory: F,
    outbound: O,
    config: NegotiationConfig,
    sink: Box<dyn MediaSink>,
    call_on_open: bool,
}

impl<F, O> Coordinator<F, O>
where
    F: EngineFactory,
    O: Outbound,
{
    pub fn new(factory: F, outbound: O) -> Self {
        Self {
            factory,
            outbound,
            config: NegotiationConfig::default(),
            sink: Box::new(LogSink),
            call_on_open: false,
        }
    }

    pub fn config(mut self, config: NegotiationConfig) -> Self {
        self.config = config;
        self
    }

    /// Routes remote tracks to `sink` instead of the log.
    pub fn media_sink(mut self, sink: impl MediaSink) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Makes the local side the Caller for every peer that connects.
    pub fn call_on_open(mut self, enabled: bool) -> Self {
        self.call_on_open = enabled;
        self
    }

    /// Spawns the coordinator task and returns a handle to it.
    pub fn spawn(self) -> CoordinatorHandle {
        let (tx, rx) = mpsc::channel(self.config.mailbox_capacity.max(1));
        let task = CoordinatorTask {
            registry: SessionRegistry::new(),
            factory: self.factory,
            outbound: self.outbound,
            codec: JsonCodec,
            config: self.config,
            sink: self.sink,
            call_on_open: self.call_on_open,
            mailbox: tx.downgrade(),
            receiver: rx,
        };
        tokio::spawn(task.run());
        CoordinatorHandle { sender: tx }
    }
}

/// The state owned by the coordinator task.
struct CoordinatorTask<F: EngineFactory, O> {
    registry: SessionRegistry<Peer<F::Engine>>,
    factory: F,
    outbound: O,
    codec: JsonCodec,
    config: NegotiationConfig,
    sink: Box<dyn MediaSink>,
    call_on_open: bool,
    /// Weak so that the coordinator's own copy never keeps it running.
    mailbox: mpsc::WeakSender<Command>,
    receiver: mpsc::Receiver<Command>,
}

impl<F, O> CoordinatorTask<F, O>
where
    F: EngineFactory,
    O: Outbound,
{
    async fn run(mut self) {
        tracing::info!("negotiation coordinator started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                Command::Transport(event) => self.handle_transport(event).await,
                Command::Call { id, reply } => {
                    let result = self.start_call(&id);
                    if let Err(e) = &result {
                        tracing::warn!(%id, error = %e, "call rejected");
                    }
                    let _ = reply.send(result);
                }
                Command::Engine { id, epoch, event } => {
                    self.handle_engine_event(id, epoch, event).await;
                }
                Command::Completed { id, epoch, result } => {
                    self.handle_completion(id, epoch, result).await;
                }
                Command::Inspect { id, reply } => {
                    let info = self.registry.get(&id).ok().map(snapshot);
                    let _ = reply.send(info);
                }
                Command::List { reply } => {
                    let _ = reply.send(self.registry.ids());
                }
                Command::Shutdown { reply } => {
                    tracing::info!("negotiation coordinator shutting down");
                    self.close_all().await;
                    let _ = reply.send(());
                    return;
                }
            }
        }

        self.close_all().await;
        tracing::info!("negotiation coordinator stopped");
    }

    // -- Transport events --

    async fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened(id) => {
                tracing::info!(%id, "peer connected");
                if self.call_on_open {
                    if let Err(e) = self.start_call(&id) {
                        tracing::warn!(%id, error = %e, "call on open failed");
                    }
                }
            }
            TransportEvent::Message(id, frame) => {
                if let Err(e) = self.handle_frame(&id, &frame) {
                    match e {
                        NegotiationError::Engine(_) => {
                            tracing::error!(%id, error = %e, "negotiation failed");
                        }
                        _ => tracing::warn!(%id, error = %e, "message discarded"),
                    }
                }
            }
            TransportEvent::Closed(id, code, reason) => {
                tracing::info!(%id, code, %reason, "peer disconnected");
                self.teardown(&id);
            }
            TransportEvent::Error(id, message) => {
                tracing::warn!(%id, %message, "signaling connection failed");
                self.teardown(&id);
            }
        }
    }

    /// Decodes one inbound frame and applies it to its session.
    fn handle_frame(
        &mut self,
        id: &SessionId,
        frame: &[u8],
    ) -> Result<(), NegotiationError> {
        let msg: SignalingMessage = self.codec.decode(frame)?;
        tracing::debug!(%id, kind = msg.label(), "signaling message");

        match msg {
            SignalingMessage::Description(desc) => match desc.kind {
                SdpKind::Offer => self.accept_offer(id, desc),
                SdpKind::Answer | SdpKind::Pranswer => {
                    self.accept_answer(id, desc)
                }
                SdpKind::Rollback => Err(NegotiationError::Unsupported(
                    "rollback (offer collisions are not resolved)".into(),
                )),
            },
            SignalingMessage::Candidate(candidate) => {
                self.accept_candidate(id, candidate)
            }
        }
    }

    /// Remote offer: Callee path, or renegotiation from `Stable`.
    fn accept_offer(
        &mut self,
        id: &SessionId,
        desc: SessionDescription,
    ) -> Result<(), NegotiationError> {
        let session = self.session_or_create(id, Role::Callee)?;
        let state = session.state();
        let ready = matches!(
            state,
            NegotiationState::New | NegotiationState::Stable
        ) && !session.remote_pending();
        if !ready {
            return Err(NegotiationError::UnexpectedDescription {
                id: id.clone(),
                kind: SdpKind::Offer,
                state,
            });
        }

        session.assign_role(Role::Callee);
        session.transition(NegotiationState::AnswerCreating)?;
        session.begin_remote_description();
        session.peer.queue.push_back(EngineOp::SetRemote(desc));
        self.pump(id);
        Ok(())
    }

    /// Remote answer or provisional answer to our offer.
    fn accept_answer(
        &mut self,
        id: &SessionId,
        desc: SessionDescription,
    ) -> Result<(), NegotiationError> {
        // An answer never creates a session.
        let session = self.registry.get_mut(id)?;
        let state = session.state();
        if state != NegotiationState::OfferPending || session.remote_pending() {
            return Err(NegotiationError::UnexpectedDescription {
                id: id.clone(),
                kind: desc.kind,
                state,
            });
        }

        session.begin_remote_description();
        session.peer.queue.push_back(EngineOp::SetRemote(desc));
        self.pump(id);
        Ok(())
    }

    fn accept_candidate(
        &mut self,
        id: &SessionId,
        candidate: IceCandidate,
    ) -> Result<(), NegotiationError> {
        if candidate.is_end_of_candidates() {
            tracing::debug!(%id, "end of remote candidates");
            return Ok(());
        }

        let session = self.session_or_create(id, Role::Callee)?;
        if session.remote_description_set() {
            session.peer.queue.push_back(EngineOp::AddCandidate(candidate));
            self.pump(id);
        } else {
            session.buffer_candidate(candidate);
            tracing::debug!(
                %id,
                buffered = session.pending_candidates().len(),
                "candidate buffered until remote description"
            );
        }
        Ok(())
    }

    /// Local call intent: Caller path, or renegotiation from `Stable`.
    fn start_call(&mut self, id: &SessionId) -> Result<(), NegotiationError> {
        let session = self.session_or_create(id, Role::Caller)?;
        session.assign_role(Role::Caller);
        session.transition(NegotiationState::OfferCreating)?;
        session.peer.queue.push_back(EngineOp::CreateOffer);
        self.pump(id);
        Ok(())
    }

    fn session_or_create(
        &mut self,
        id: &SessionId,
        role: Role,
    ) -> Result<&mut Session<Peer<F::Engine>>, NegotiationError> {
        let factory = &self.factory;
        let mailbox = &self.mailbox;
        self.registry.get_or_create(id, role, |epoch| {
            let events = EngineEvents::new(id.clone(), epoch, mailbox.clone());
            factory
                .create(id, role, events)
                .map(Peer::new)
                .map_err(NegotiationError::from)
        })
    }

    // -- Engine operations --

    /// Starts the next queued operation for `id` unless one is running.
    fn pump(&mut self, id: &SessionId) {
        let Ok(session) = self.registry.get_mut(id) else {
            return;
        };
        if session.peer.in_flight.is_some() {
            return;
        }
        let Some(op) = session.peer.queue.pop_front() else {
            return;
        };

        let name = op.name();
        session.peer.in_flight = Some(name);
        tracing::trace!(%id, op = name, "engine op started");

        let engine = Arc::clone(&session.peer.engine);
        let epoch = session.epoch();
        let id = id.clone();
        let mailbox = self.mailbox.clone();
        let offer = self.config.offer;
        let answer = self.config.answer;

        tokio::spawn(async move {
            let result = match op {
                EngineOp::CreateOffer => {
                    engine.create_offer(offer).await.map(OpOutcome::OfferCreated)
                }
                EngineOp::CreateAnswer => engine
                    .create_answer(answer)
                    .await
                    .map(OpOutcome::AnswerCreated),
                EngineOp::SetLocal(desc) => engine
                    .set_local_description(desc.clone())
                    .await
                    .map(|()| OpOutcome::LocalSet(desc)),
                EngineOp::SetRemote(desc) => {
                    let kind = desc.kind;
                    engine
                        .set_remote_description(desc)
                        .await
                        .map(|()| OpOutcome::RemoteSet(kind))
                }
                EngineOp::AddCandidate(candidate) => engine
                    .add_ice_candidate(candidate)
                    .await
                    .map(|()| OpOutcome::CandidateAdded),
            };
            if let Some(mailbox) = mailbox.upgrade() {
                let _ = mailbox
                    .send(Command::Completed { id, epoch, result })
                    .await;
            }
        });
    }

    async fn handle_completion(
        &mut self,
        id: SessionId,
        epoch: u64,
        result: Result<OpOutcome, EngineError>,
    ) {
        let Some(session) = live(&mut self.registry, &id, epoch) else {
            tracing::debug!(%id, epoch, "stale engine completion dropped");
            return;
        };
        let op = session.peer.in_flight.take().unwrap_or("unknown");

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) if op == ADD_CANDIDATE => {
                tracing::warn!(%id, error = %e, "remote candidate rejected, skipping");
                self.pump(&id);
                return;
            }
            Err(e) => {
                tracing::error!(%id, op, error = %e, "engine operation failed");
                self.teardown(&id);
                return;
            }
        };
        tracing::trace!(%id, op, "engine op finished");

        if let Err(e) = self.apply_outcome(&id, outcome).await {
            tracing::error!(%id, error = %e, "negotiation failed");
            self.teardown(&id);
            return;
        }
        self.pump(&id);
    }

    async fn apply_outcome(
        &mut self,
        id: &SessionId,
        outcome: OpOutcome,
    ) -> Result<(), NegotiationError> {
        let session = self.registry.get_mut(id)?;
        match outcome {
            OpOutcome::OfferCreated(desc) | OpOutcome::AnswerCreated(desc) => {
                session.peer.queue.push_front(EngineOp::SetLocal(desc));
            }
            OpOutcome::LocalSet(desc) => {
                let next = match desc.kind {
                    SdpKind::Offer => NegotiationState::OfferPending,
                    _ => NegotiationState::Stable,
                };
                session.transition(next)?;
                tracing::info!(%id, kind = %desc.kind, state = %next, "local description set");
                self.send(id, &SignalingMessage::Description(desc)).await;
            }
            OpOutcome::RemoteSet(kind) => {
                session.finish_remote_description();
                // Buffered candidates go first, in arrival order, then the
                // answer (for an offer). Both jump ahead of later arrivals.
                let flushed = session.take_pending_candidates();
                if kind == SdpKind::Offer {
                    session.peer.queue.push_front(EngineOp::CreateAnswer);
                }
                let count = flushed.len();
                for candidate in flushed.into_iter().rev() {
                    session.peer.queue.push_front(EngineOp::AddCandidate(candidate));
                }
                if count > 0 {
                    tracing::debug!(%id, count, "flushing buffered candidates");
                }
                if kind == SdpKind::Answer {
                    session.transition(NegotiationState::Stable)?;
                }
                tracing::info!(%id, %kind, state = %session.state(), "remote description set");
            }
            OpOutcome::CandidateAdded => {}
        }
        Ok(())
    }

    // -- Engine events --

    async fn handle_engine_event(
        &mut self,
        id: SessionId,
        epoch: u64,
        event: EngineEvent,
    ) {
        let Some(session) = live(&mut self.registry, &id, epoch) else {
            tracing::trace!(%id, epoch, "stale engine event dropped");
            return;
        };
        match event {
            EngineEvent::LocalCandidate(candidate) => {
                // Trickled immediately, whatever the negotiation state.
                self.send(&id, &SignalingMessage::Candidate(candidate)).await;
            }
            EngineEvent::Track(track) => {
                self.sink.on_track(&id, &track);
                session.peer.tracks.push(track);
            }
            EngineEvent::ConnectionState(state) => {
                tracing::info!(%id, connection = %state, "peer connection state");
                session.peer.connection = state;
            }
        }
    }

    // -- Helpers --

    async fn send(&self, id: &SessionId, msg: &SignalingMessage) {
        let frame = match self.codec.encode(msg) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(%id, error = %e, "failed to encode message");
                return;
            }
        };
        if let Err(e) = self.outbound.deliver(id, frame).await {
            tracing::warn!(%id, kind = msg.label(), error = %e, "signaling send failed");
        }
    }

    /// Removes the session and releases its engine. A no-op if the session
    /// is already gone.
    fn teardown(&mut self, id: &SessionId) {
        let Some(session) = self.registry.remove(id) else {
            tracing::debug!(%id, "teardown: no live session");
            return;
        };
        let engine = Arc::clone(&session.peer.engine);
        let id = id.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.close().await {
                tracing::warn!(%id, error = %e, "engine close failed");
            }
        });
    }

    async fn close_all(&mut self) {
        for session in self.registry.drain() {
            if let Err(e) = session.peer.engine.close().await {
                tracing::warn!(id = %session.id(), error = %e, "engine close failed");
            }
        }
    }
}

/// The session for `id`, but only if it is still the given epoch.
fn live<'a, P>(
    registry: &'a mut SessionRegistry<P>,
    id: &SessionId,
    epoch: u64,
) -> Option<&'a mut Session<P>> {
    registry
        .get_mut(id)
        .ok()
        .filter(|session| session.epoch() == epoch)
}
