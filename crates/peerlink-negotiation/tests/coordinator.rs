//! Integration tests for the negotiation coordinator using a mock engine.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use peerlink_negotiation::{
    AnswerOptions, Coordinator, CoordinatorHandle, EngineError, EngineEvents,
    EngineFactory, MediaKind, MediaSink, MediaTrack, NegotiationEngine,
    NegotiationError, OfferOptions, Outbound, PeerConnectionState,
};
use peerlink_protocol::{IceCandidate, SdpKind, SessionDescription, SignalingMessage};
use peerlink_session::{NegotiationState, Role, SessionError};
use peerlink_transport::{SessionId, TransportError, TransportEvent};
use tokio::sync::{mpsc, watch};

// =========================================================================
// Mock engine: records every call, can be slowed, gated or made to fail.
// =========================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    CreateOffer,
    CreateAnswer,
    SetLocal(SdpKind),
    SetRemote(SdpKind),
    AddCandidate(String),
}

struct Shared {
    calls: Mutex<Vec<(SessionId, Call)>>,
    created: AtomicUsize,
    closes: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
    fail_op: Mutex<Option<&'static str>>,
    events: Mutex<HashMap<SessionId, EngineEvents>>,
    gated: Mutex<HashSet<SessionId>>,
    gate: watch::Sender<bool>,
}

impl Shared {
    fn new(delay: Duration) -> Arc<Self> {
        let (gate, _) = watch::channel(false);
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            created: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay,
            fail_op: Mutex::new(None),
            events: Mutex::new(HashMap::new()),
            gated: Mutex::new(HashSet::new()),
            gate,
        })
    }

    fn calls_for(&self, id: &str) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(sid, _)| sid.as_str() == id)
            .map(|(_, call)| call.clone())
            .collect()
    }

    fn fail(&self, op: &'static str) {
        *self.fail_op.lock().unwrap() = Some(op);
    }

    fn hold(&self, id: &str) {
        self.gated.lock().unwrap().insert(SessionId::new(id));
    }

    fn release(&self) {
        self.gated.lock().unwrap().clear();
        self.gate.send_replace(true);
    }

    fn events_for(&self, id: &str) -> EngineEvents {
        self.events.lock().unwrap()[&SessionId::new(id)].clone()
    }
}

struct MockFactory {
    shared: Arc<Shared>,
}

impl EngineFactory for MockFactory {
    type Engine = MockEngine;

    fn create(
        &self,
        id: &SessionId,
        _role: Role,
        events: EngineEvents,
    ) -> Result<MockEngine, EngineError> {
        self.shared.created.fetch_add(1, Ordering::SeqCst);
        self.shared.events.lock().unwrap().insert(id.clone(), events);
        Ok(MockEngine {
            id: id.clone(),
            shared: Arc::clone(&self.shared),
        })
    }
}

struct MockEngine {
    id: SessionId,
    shared: Arc<Shared>,
}

impl MockEngine {
    /// Runs one engine call: tracks concurrency, waits on the gate, logs.
    async fn op(&self, name: &'static str, call: Call) -> Result<(), EngineError> {
        let now = self.shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let gated = self.shared.gated.lock().unwrap().contains(&self.id);
        if gated {
            let mut rx = self.shared.gate.subscribe();
            let _ = rx.wait_for(|open| *open).await;
        }
        tokio::time::sleep(self.shared.delay).await;

        self.shared.calls.lock().unwrap().push((self.id.clone(), call));
        self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);

        if *self.shared.fail_op.lock().unwrap() == Some(name) {
            return Err(EngineError::failed(name, "mock failure"));
        }
        Ok(())
    }
}

impl NegotiationEngine for MockEngine {
    async fn create_offer(
        &self,
        _options: OfferOptions,
    ) -> Result<SessionDescription, EngineError> {
        self.op("createOffer", Call::CreateOffer).await?;
        Ok(SessionDescription::offer(format!("v=0 offer from native to {}", self.id)))
    }

    async fn create_answer(
        &self,
        _options: AnswerOptions,
    ) -> Result<SessionDescription, EngineError> {
        self.op("createAnswer", Call::CreateAnswer).await?;
        Ok(SessionDescription::answer(format!("v=0 answer from native to {}", self.id)))
    }

    async fn set_local_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), EngineError> {
        self.op("setLocalDescription", Call::SetLocal(desc.kind)).await
    }

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), EngineError> {
        self.op("setRemoteDescription", Call::SetRemote(desc.kind)).await
    }

    async fn add_ice_candidate(
        &self,
        candidate: IceCandidate,
    ) -> Result<(), EngineError> {
        self.op("addIceCandidate", Call::AddCandidate(candidate.candidate))
            .await
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =========================================================================
// Mock outbound: forwards decoded messages to the test.
// =========================================================================

struct ChannelOutbound {
    tx: mpsc::UnboundedSender<(SessionId, SignalingMessage)>,
    gone: HashSet<SessionId>,
}

impl Outbound for ChannelOutbound {
    async fn deliver(
        &self,
        id: &SessionId,
        frame: Vec<u8>,
    ) -> Result<(), TransportError> {
        if self.gone.contains(id) {
            return Err(TransportError::UnknownSession(id.clone()));
        }
        let msg: SignalingMessage =
            serde_json::from_slice(&frame).expect("coordinator sends valid JSON");
        let _ = self.tx.send((id.clone(), msg));
        Ok(())
    }
}

#[derive(Default, Clone)]
struct RecordingSink {
    tracks: Arc<Mutex<Vec<(SessionId, MediaTrack)>>>,
}

impl MediaSink for RecordingSink {
    fn on_track(&self, id: &SessionId, track: &MediaTrack) {
        self.tracks.lock().unwrap().push((id.clone(), track.clone()));
    }
}

// =========================================================================
// Harness
// =========================================================================

const WAIT: Duration = Duration::from_secs(3);

struct Harness {
    handle: CoordinatorHandle,
    shared: Arc<Shared>,
    sent: mpsc::UnboundedReceiver<(SessionId, SignalingMessage)>,
}

struct Options {
    delay: Duration,
    gone: &'static [&'static str],
    call_on_open: bool,
    sink: Option<RecordingSink>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(1),
            gone: &[],
            call_on_open: false,
            sink: None,
        }
    }
}

fn harness() -> Harness {
    harness_with(Options::default())
}

fn harness_with(options: Options) -> Harness {
    let shared = Shared::new(options.delay);
    let (tx, sent) = mpsc::unbounded_channel();
    let outbound = ChannelOutbound {
        tx,
        gone: options.gone.iter().map(|id| SessionId::new(*id)).collect(),
    };
    let mut coordinator = Coordinator::new(
        MockFactory {
            shared: Arc::clone(&shared),
        },
        outbound,
    )
    .call_on_open(options.call_on_open);
    if let Some(sink) = options.sink {
        coordinator = coordinator.media_sink(sink);
    }
    Harness {
        handle: coordinator.spawn(),
        shared,
        sent,
    }
}

impl Harness {
    async fn message(&self, id: &str, json: &str) {
        self.handle
            .transport_event(TransportEvent::Message(
                SessionId::new(id),
                json.as_bytes().to_vec(),
            ))
            .await
            .expect("coordinator running");
    }

    async fn offer(&self, id: &str) {
        self.message(id, r#"{"type":"offer","sdp":"v=0 browser offer"}"#).await;
    }

    async fn answer(&self, id: &str) {
        self.message(id, r#"{"type":"answer","sdp":"v=0 browser answer"}"#).await;
    }

    async fn candidate(&self, id: &str, candidate: &str) {
        let json = format!(r#"{{"candidate":"{candidate}","sdpMid":"0","sdpMLineIndex":0}}"#);
        self.message(id, &json).await;
    }

    async fn closed(&self, id: &str) {
        self.handle
            .transport_event(TransportEvent::Closed(SessionId::new(id), 1000, String::new()))
            .await
            .expect("coordinator running");
    }

    async fn next_sent(&mut self) -> (SessionId, SignalingMessage) {
        tokio::time::timeout(WAIT, self.sent.recv())
            .await
            .expect("message within timeout")
            .expect("outbound channel open")
    }

    /// Round-trips through the mailbox, so everything posted before has
    /// been handled (spawned engine work may still be running).
    async fn state(&self, id: &str) -> Option<NegotiationState> {
        self.handle
            .session_info(&SessionId::new(id))
            .await
            .expect("coordinator running")
            .map(|info| info.state)
    }

    /// Polls until the session's engine queue has drained.
    async fn settle(&self, id: &str) {
        let id = SessionId::new(id);
        tokio::time::timeout(WAIT, async {
            loop {
                match self.handle.session_info(&id).await.expect("running") {
                    Some(info) if info.in_flight || info.queued > 0 => {}
                    _ => return,
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("session settles");
    }

    async fn until(&self, mut done: impl FnMut(&Shared) -> bool) {
        tokio::time::timeout(WAIT, async {
            while !done(self.shared.as_ref()) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition within timeout");
    }
}

fn candidates(calls: &[Call]) -> Vec<String> {
    calls
        .iter()
        .filter_map(|c| match c {
            Call::AddCandidate(c) => Some(c.clone()),
            _ => None,
        })
        .collect()
}

// =========================================================================
// Callee path
// =========================================================================

#[tokio::test]
async fn test_remote_offer_creates_callee_and_sends_answer() {
    let mut h = harness();
    h.offer("p1").await;

    let (id, msg) = h.next_sent().await;
    assert_eq!(id.as_str(), "p1");
    match msg {
        SignalingMessage::Description(desc) => assert_eq!(desc.kind, SdpKind::Answer),
        other => panic!("expected answer, got {other:?}"),
    }

    assert_eq!(
        h.shared.calls_for("p1"),
        [
            Call::SetRemote(SdpKind::Offer),
            Call::CreateAnswer,
            Call::SetLocal(SdpKind::Answer),
        ]
    );
    let info = h
        .handle
        .session_info(&SessionId::new("p1"))
        .await
        .expect("running")
        .expect("session exists");
    assert_eq!(info.role, Role::Callee);
    assert_eq!(info.state, NegotiationState::Stable);
}

#[tokio::test]
async fn test_early_candidates_applied_once_in_arrival_order() {
    let mut h = harness();
    h.candidate("p1", "candidate:c1").await;
    h.candidate("p1", "candidate:c2").await;
    assert_eq!(h.state("p1").await, Some(NegotiationState::New));

    h.offer("p1").await;
    h.candidate("p1", "candidate:c3").await;

    let _answer = h.next_sent().await;
    h.settle("p1").await;

    let calls = h.shared.calls_for("p1");
    assert_eq!(calls[0], Call::SetRemote(SdpKind::Offer));
    assert_eq!(
        candidates(&calls),
        ["candidate:c1", "candidate:c2", "candidate:c3"]
    );
    let info = h
        .handle
        .session_info(&SessionId::new("p1"))
        .await
        .expect("running")
        .expect("session exists");
    assert_eq!(info.pending_candidates, 0);
    assert!(info.remote_description_set);
}

#[tokio::test]
async fn test_candidate_after_remote_description_applied_directly() {
    let mut h = harness();
    h.offer("p1").await;
    let _answer = h.next_sent().await;

    h.candidate("p1", "candidate:late").await;
    h.settle("p1").await;

    assert_eq!(candidates(&h.shared.calls_for("p1")), ["candidate:late"]);
}

#[tokio::test]
async fn test_end_of_candidates_is_ignored_and_creates_nothing() {
    let h = harness();
    h.message("p1", r#"{"candidate":"","sdpMid":"0","sdpMLineIndex":0}"#).await;

    assert_eq!(h.state("p1").await, None);
    assert_eq!(h.shared.created.load(Ordering::SeqCst), 0);
}

// =========================================================================
// Caller path
// =========================================================================

#[tokio::test]
async fn test_call_sends_offer_then_answer_reaches_stable() {
    let mut h = harness();
    h.handle.call(SessionId::new("p1")).await.expect("call accepted");

    let (_, msg) = h.next_sent().await;
    assert!(matches!(
        msg,
        SignalingMessage::Description(SessionDescription { kind: SdpKind::Offer, .. })
    ));
    assert_eq!(h.state("p1").await, Some(NegotiationState::OfferPending));

    h.answer("p1").await;
    h.settle("p1").await;

    assert_eq!(h.state("p1").await, Some(NegotiationState::Stable));
    assert_eq!(
        h.shared.calls_for("p1"),
        [
            Call::CreateOffer,
            Call::SetLocal(SdpKind::Offer),
            Call::SetRemote(SdpKind::Answer),
        ]
    );
}

#[tokio::test]
async fn test_call_after_early_candidate_takes_caller_role() {
    let mut h = harness();
    h.candidate("p1", "candidate:early").await;
    h.handle.call(SessionId::new("p1")).await.expect("call accepted");

    let (_, msg) = h.next_sent().await;
    assert!(matches!(
        msg,
        SignalingMessage::Description(SessionDescription { kind: SdpKind::Offer, .. })
    ));
    h.answer("p1").await;
    h.settle("p1").await;

    let info = h
        .handle
        .session_info(&SessionId::new("p1"))
        .await
        .expect("running")
        .expect("session exists");
    assert_eq!(info.role, Role::Caller);
    assert_eq!(info.state, NegotiationState::Stable);
    assert_eq!(candidates(&h.shared.calls_for("p1")), ["candidate:early"]);
}

#[tokio::test]
async fn test_pranswer_keeps_offer_pending_until_final_answer() {
    let mut h = harness();
    h.handle.call(SessionId::new("p1")).await.expect("call accepted");
    let _offer = h.next_sent().await;

    h.message("p1", r#"{"type":"pranswer","sdp":"v=0 provisional"}"#).await;
    h.settle("p1").await;
    assert_eq!(h.state("p1").await, Some(NegotiationState::OfferPending));

    h.answer("p1").await;
    h.settle("p1").await;
    assert_eq!(h.state("p1").await, Some(NegotiationState::Stable));
}

#[tokio::test]
async fn test_call_while_negotiating_is_rejected() {
    let mut h = harness();
    h.handle.call(SessionId::new("p1")).await.expect("call accepted");
    let _offer = h.next_sent().await;

    let err = h.handle.call(SessionId::new("p1")).await.unwrap_err();
    assert!(matches!(
        err,
        NegotiationError::Session(SessionError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn test_call_on_open_offers_to_new_peer() {
    let mut h = harness_with(Options {
        call_on_open: true,
        ..Default::default()
    });
    h.handle
        .transport_event(TransportEvent::Opened(SessionId::new("browser")))
        .await
        .expect("running");

    let (id, msg) = h.next_sent().await;
    assert_eq!(id.as_str(), "browser");
    assert!(matches!(msg, SignalingMessage::Description(d) if d.kind == SdpKind::Offer));
}

#[tokio::test]
async fn test_opened_without_call_on_open_creates_nothing() {
    let h = harness();
    h.handle
        .transport_event(TransportEvent::Opened(SessionId::new("browser")))
        .await
        .expect("running");
    assert_eq!(h.state("browser").await, None);
}

// =========================================================================
// Protocol errors
// =========================================================================

#[tokio::test]
async fn test_answer_in_stable_is_discarded_without_engine_call() {
    let mut h = harness();
    h.offer("p1").await;
    let _answer = h.next_sent().await;
    h.settle("p1").await;
    let before = h.shared.calls_for("p1").len();

    h.answer("p1").await;

    assert_eq!(h.state("p1").await, Some(NegotiationState::Stable));
    assert_eq!(h.shared.calls_for("p1").len(), before);
}

#[tokio::test]
async fn test_answer_from_unknown_id_creates_no_session() {
    let h = harness();
    h.answer("ghost").await;

    assert!(h.handle.sessions().await.expect("running").is_empty());
    assert_eq!(h.shared.created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_offer_while_offer_pending_is_rejected() {
    let mut h = harness();
    h.handle.call(SessionId::new("p1")).await.expect("call accepted");
    let _offer = h.next_sent().await;

    h.offer("p1").await;

    assert_eq!(h.state("p1").await, Some(NegotiationState::OfferPending));
    assert!(!h.shared.calls_for("p1").contains(&Call::SetRemote(SdpKind::Offer)));
}

#[tokio::test]
async fn test_rollback_is_rejected() {
    let mut h = harness();
    h.handle.call(SessionId::new("p1")).await.expect("call accepted");
    let _offer = h.next_sent().await;

    h.message("p1", r#"{"type":"rollback","sdp":""}"#).await;

    assert_eq!(h.state("p1").await, Some(NegotiationState::OfferPending));
}

#[tokio::test]
async fn test_malformed_frame_is_discarded_and_coordinator_continues() {
    let mut h = harness();
    h.message("p1", "{this is not json").await;
    h.message("p1", r#"{"hello":"world"}"#).await;
    assert_eq!(h.state("p1").await, None);

    h.offer("p1").await;
    let (id, _) = h.next_sent().await;
    assert_eq!(id.as_str(), "p1");
}

// =========================================================================
// Renegotiation
// =========================================================================

#[tokio::test]
async fn test_second_offer_in_stable_renegotiates() {
    let mut h = harness();
    h.offer("p1").await;
    let _first = h.next_sent().await;
    h.settle("p1").await;

    h.offer("p1").await;
    let (_, msg) = h.next_sent().await;
    assert!(matches!(msg, SignalingMessage::Description(d) if d.kind == SdpKind::Answer));
    h.settle("p1").await;

    assert_eq!(h.state("p1").await, Some(NegotiationState::Stable));
    let answers = h
        .shared
        .calls_for("p1")
        .into_iter()
        .filter(|c| *c == Call::CreateAnswer)
        .count();
    assert_eq!(answers, 2);
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test]
async fn test_at_most_one_engine_call_in_flight_per_session() {
    let mut h = harness_with(Options {
        delay: Duration::from_millis(10),
        ..Default::default()
    });
    for i in 0..3 {
        h.candidate("p1", &format!("candidate:early{i}")).await;
    }
    h.offer("p1").await;
    for i in 0..5 {
        h.candidate("p1", &format!("candidate:late{i}")).await;
    }

    let _answer = h.next_sent().await;
    h.settle("p1").await;

    assert_eq!(h.shared.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(candidates(&h.shared.calls_for("p1")).len(), 8);
}

#[tokio::test]
async fn test_slow_engine_on_one_session_does_not_block_another() {
    let mut h = harness();
    h.shared.hold("slow");

    h.offer("slow").await;
    h.offer("fast").await;

    let (id, _) = h.next_sent().await;
    assert_eq!(id.as_str(), "fast");
    assert_eq!(h.state("slow").await, Some(NegotiationState::AnswerCreating));

    h.shared.release();
    let (id, _) = h.next_sent().await;
    assert_eq!(id.as_str(), "slow");
}

// =========================================================================
// Teardown
// =========================================================================

#[tokio::test]
async fn test_repeated_close_releases_engine_once() {
    let mut h = harness();
    h.offer("p1").await;
    let _answer = h.next_sent().await;

    h.closed("p1").await;
    h.handle
        .transport_event(TransportEvent::Error(SessionId::new("p1"), "reset".into()))
        .await
        .expect("running");
    h.closed("p1").await;

    assert_eq!(h.state("p1").await, None);
    h.until(|s| s.closes.load(Ordering::SeqCst) >= 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.shared.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_engine_failure_tears_session_down() {
    let mut h = harness();
    h.shared.fail("createAnswer");
    h.offer("p1").await;

    h.until(|s| s.closes.load(Ordering::SeqCst) == 1).await;
    assert_eq!(h.state("p1").await, None);
    assert!(h.sent.try_recv().is_err(), "no answer must be sent");
}

#[tokio::test]
async fn test_rejected_remote_candidate_is_skipped() {
    let mut h = harness();
    h.shared.fail("addIceCandidate");
    h.candidate("p1", "candidate:bad").await;
    h.offer("p1").await;

    let (_, msg) = h.next_sent().await;
    assert!(msg.is_description());
    h.settle("p1").await;
    assert_eq!(h.state("p1").await, Some(NegotiationState::Stable));
    assert_eq!(h.shared.closes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_completion_after_close_is_dropped() {
    let mut h = harness();
    h.shared.hold("p1");
    h.offer("p1").await;
    assert_eq!(h.state("p1").await, Some(NegotiationState::AnswerCreating));

    h.closed("p1").await;
    assert_eq!(h.state("p1").await, None);

    // The held setRemoteDescription now completes for a session that is gone.
    h.shared.release();
    h.until(|s| s.calls_for("p1").len() == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(h.state("p1").await, None, "stale completion must not resurrect");
    assert!(h.sent.try_recv().is_err());

    // The same id can start over with a fresh session.
    h.offer("p1").await;
    let (id, _) = h.next_sent().await;
    assert_eq!(id.as_str(), "p1");
}

#[tokio::test]
async fn test_shutdown_closes_every_engine() {
    let mut h = harness();
    h.offer("a").await;
    h.offer("b").await;
    let _ = h.next_sent().await;
    let _ = h.next_sent().await;

    h.handle.shutdown().await.expect("shutdown");

    assert_eq!(h.shared.closes.load(Ordering::SeqCst), 2);
    assert!(matches!(
        h.handle.sessions().await,
        Err(NegotiationError::Unavailable)
    ));
}

// =========================================================================
// Engine events
// =========================================================================

#[tokio::test]
async fn test_local_candidate_is_trickled_immediately() {
    let mut h = harness();
    h.candidate("p1", "candidate:remote").await;
    assert_eq!(h.state("p1").await, Some(NegotiationState::New));

    let events = h.shared.events_for("p1");
    events
        .local_candidate(IceCandidate::new("candidate:local", "0", 0))
        .await;

    let (id, msg) = h.next_sent().await;
    assert_eq!(id.as_str(), "p1");
    assert_eq!(
        msg,
        SignalingMessage::Candidate(IceCandidate::new("candidate:local", "0", 0))
    );
}

#[tokio::test]
async fn test_event_from_previous_session_epoch_is_dropped() {
    let mut h = harness();
    h.candidate("p1", "candidate:remote").await;
    let old_events = h.shared.events_for("p1");
    h.closed("p1").await;
    h.candidate("p1", "candidate:again").await;

    old_events
        .local_candidate(IceCandidate::new("candidate:stale", "0", 0))
        .await;
    let _ = h.state("p1").await;

    assert!(h.sent.try_recv().is_err(), "stale event must not be sent");
}

#[tokio::test]
async fn test_track_and_connection_state_are_recorded() {
    let sink = RecordingSink::default();
    let h = harness_with(Options {
        sink: Some(sink.clone()),
        ..Default::default()
    });
    h.candidate("p1", "candidate:remote").await;
    let events = h.shared.events_for("p1");

    let track = MediaTrack {
        id: "remote-video".into(),
        kind: MediaKind::Video,
    };
    events.track(track.clone()).await;
    events.connection_state(PeerConnectionState::Connected).await;

    let info = h
        .handle
        .session_info(&SessionId::new("p1"))
        .await
        .expect("running")
        .expect("session exists");
    assert_eq!(info.tracks, [track.clone()]);
    assert_eq!(info.connection, PeerConnectionState::Connected);
    assert_eq!(
        *sink.tracks.lock().unwrap(),
        [(SessionId::new("p1"), track)]
    );
}

// =========================================================================
// Outbound failures
// =========================================================================

#[tokio::test]
async fn test_send_to_vanished_peer_leaves_other_sessions_intact() {
    let mut h = harness_with(Options {
        gone: &["ghost"],
        ..Default::default()
    });
    h.offer("ghost").await;
    h.offer("p1").await;

    let (id, _) = h.next_sent().await;
    assert_eq!(id.as_str(), "p1");
    h.settle("ghost").await;
    assert_eq!(h.state("p1").await, Some(NegotiationState::Stable));
}
