
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Duration};

use mocks::{MockTrack, MockTransport, MockTransportFactory};
use webrtc_roap::rtp_transceiver::media_kind::RtpCodecKind;
use webrtc_roap::rtp_transceiver::TrackHandle;
use webrtc_roap::{
    ConnectionState, LocalTrackUpdate, LocalTracks, Logger, MediaKind, NegotiationState,
    RTCRtpTransceiverDirection, RoapMediaConnection, RoapMediaConnectionBuilder,
    RoapMediaConnectionEventHandler, RoapMessage, RoapMessageType,
};

const TEST_TIME_LIMIT: Duration = Duration::from_secs(5);

/// Recorder serializes every outbound message the way a signaling relay
/// would carry it, and keeps the other events for assertions.
struct Recorder {
    outbound: mpsc::UnboundedSender<String>,
    tracks: Mutex<Vec<MediaKind>>,
    states: Mutex<Vec<ConnectionState>>,
    failures: Mutex<Vec<String>>,
    tones: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl RoapMediaConnectionEventHandler for Recorder {
    async fn on_connection_state_changed(&self, state: ConnectionState) {
        self.states.lock().unwrap().push(state);
    }

    async fn on_remote_track_added(&self, kind: MediaKind, _track: TrackHandle) {
        self.tracks.lock().unwrap().push(kind);
    }

    async fn on_roap_message_to_send(&self, message: RoapMessage) {
        let _ = self.outbound.send(message.to_json().unwrap());
    }

    async fn on_roap_failure(&self, reason: String) {
        self.failures.lock().unwrap().push(reason);
    }

    async fn on_dtmf_tone_changed(&self, tone: String) {
        self.tones.lock().unwrap().push(tone);
    }
}

struct Peer {
    session: Arc<RoapMediaConnection>,
    transport: Arc<MockTransport>,
    recorder: Arc<Recorder>,
}

async fn new_peer(name: &str, local_tracks: LocalTracks) -> (Peer, mpsc::UnboundedReceiver<String>) {
    let _ = env_logger::builder().is_test(true).try_init();

    let transport = MockTransport::new(name);
    let (outbound, rx) = mpsc::unbounded_channel();
    let recorder = Arc::new(Recorder {
        outbound,
        tracks: Mutex::new(vec![]),
        states: Mutex::new(vec![]),
        failures: Mutex::new(vec![]),
        tones: Mutex::new(vec![]),
    });

    let session = RoapMediaConnectionBuilder::new()
        .with_transport_factory(MockTransportFactory::new(Arc::clone(&transport)))
        .with_local_tracks(local_tracks)
        .with_event_handler(Arc::clone(&recorder) as Arc<dyn RoapMediaConnectionEventHandler>)
        .with_logger(Logger::global(name))
        .build()
        .await
        .unwrap();

    let peer = Peer {
        session: Arc::new(session),
        transport,
        recorder,
    };
    (peer, rx)
}

/// relay delivers everything one peer sends to the other one.
fn relay(mut rx: mpsc::UnboundedReceiver<String>, to: Arc<RoapMediaConnection>) {
    tokio::spawn(async move {
        while let Some(raw) = rx.recv().await {
            let message = RoapMessage::from_json(&raw).unwrap();
            if to.roap_message_received(message).await.is_err() {
                break;
            }
        }
    });
}

async fn connected_pair(a_tracks: LocalTracks, b_tracks: LocalTracks) -> (Peer, Peer) {
    let (a, a_rx) = new_peer("a", a_tracks).await;
    let (b, b_rx) = new_peer("b", b_tracks).await;
    relay(a_rx, Arc::clone(&b.session));
    relay(b_rx, Arc::clone(&a.session));
    (a, b)
}

async fn wait_until<F>(mut cond: F)
where
    F: FnMut() -> bool,
{
    timeout(TEST_TIME_LIMIT, async {
        while !cond() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn idle(peer: &Peer) -> bool {
    peer.session.get_negotiation_state() == NegotiationState::Idle
}

async fn next_message(rx: &mut mpsc::UnboundedReceiver<String>) -> RoapMessage {
    let raw = timeout(TEST_TIME_LIMIT, rx.recv()).await.unwrap().unwrap();
    RoapMessage::from_json(&raw).unwrap()
}

fn audio_video() -> LocalTracks {
    LocalTracks {
        audio: Some(MockTrack::new("a-mic", RtpCodecKind::Audio)),
        video: Some(MockTrack::new("a-camera", RtpCodecKind::Video)),
        ..Default::default()
    }
}

fn audio_only() -> LocalTracks {
    LocalTracks {
        audio: Some(MockTrack::new("b-mic", RtpCodecKind::Audio)),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_sessions_negotiate_back_to_back() {
    let (a, b) = connected_pair(audio_video(), audio_only()).await;

    a.session.initiate_offer().await.unwrap();
    wait_until(|| {
        idle(&a) && idle(&b) && b.transport.mock_transceivers().len() == 3
    })
    .await;

    let directions: Vec<RTCRtpTransceiverDirection> = b
        .transport
        .mock_transceivers()
        .iter()
        .map(|t| t.current_direction())
        .collect();
    assert_eq!(
        directions,
        vec![
            RTCRtpTransceiverDirection::Sendrecv,
            RTCRtpTransceiverDirection::Recvonly,
            RTCRtpTransceiverDirection::Recvonly,
        ]
    );
    assert_eq!(
        b.transport.mock_transceivers()[0].current_track_id(),
        Some("b-mic".to_owned())
    );

    wait_until(|| {
        a.session.get_connection_state() == ConnectionState::Connected
            && b.session.get_connection_state() == ConnectionState::Connected
    })
    .await;
    wait_until(|| {
        b.recorder.tracks.lock().unwrap().len() == 2 && a.recorder.tracks.lock().unwrap().len() == 1
    })
    .await;
    assert_eq!(
        *b.recorder.tracks.lock().unwrap(),
        vec![MediaKind::Audio, MediaKind::Video]
    );
    assert_eq!(*a.recorder.tracks.lock().unwrap(), vec![MediaKind::Audio]);

    assert!(a.recorder.failures.lock().unwrap().is_empty());
    assert!(b.recorder.failures.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_sessions_renegotiate_from_answerer() {
    let (a, b) = connected_pair(audio_video(), audio_only()).await;
    a.session.initiate_offer().await.unwrap();
    wait_until(|| { idle(&a) && idle(&b) && b.transport.mock_transceivers().len() == 3 }).await;

    b.session
        .update_send_options(LocalTrackUpdate {
            video: Some(Some(MockTrack::new("b-camera", RtpCodecKind::Video))),
            ..Default::default()
        })
        .await
        .unwrap();

    wait_until(|| {
        idle(&a) && idle(&b) && a.recorder.tracks.lock().unwrap().len() == 2
    })
    .await;
    assert_eq!(
        *a.recorder.tracks.lock().unwrap(),
        vec![MediaKind::Audio, MediaKind::Video]
    );
    assert_eq!(
        b.transport.mock_transceivers()[1].current_direction(),
        RTCRtpTransceiverDirection::Sendrecv
    );
}

#[tokio::test]
async fn test_offer_retried_after_double_conflict() {
    let (a, mut a_rx) = new_peer("a", audio_video()).await;

    a.session.initiate_offer().await.unwrap();
    let raw_offer = a_rx.recv().await.unwrap();
    assert!(raw_offer.contains(r#""messageType":"OFFER""#));
    assert!(raw_offer.contains(r#""tieBreaker":4294967294"#));

    a.session
        .roap_message_received(
            RoapMessage::from_json(r#"{"seq":1,"messageType":"ERROR","errorType":"DOUBLECONFLICT"}"#)
                .unwrap(),
        )
        .await
        .unwrap();
    let retry = next_message(&mut a_rx).await;
    assert_eq!(retry.message_type, RoapMessageType::Offer);
    assert_eq!(retry.seq, 2);

    a.session
        .roap_message_received(
            RoapMessage::from_json(r#"{"seq":2,"messageType":"ANSWER","sdp":"v=0\r\n"}"#).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(next_message(&mut a_rx).await, RoapMessage::ok(2));
    wait_until(|| { idle(&a) }).await;
}

#[tokio::test]
async fn test_local_failure_is_reported_once() {
    let (a, mut a_rx) = new_peer("a", audio_video()).await;
    a.transport
        .fail_create_offer
        .store(true, std::sync::atomic::Ordering::SeqCst);

    assert!(a.session.initiate_offer().await.is_err());
    wait_until(|| { !a.recorder.failures.lock().unwrap().is_empty() }).await;
    assert_eq!(
        a.session.get_negotiation_state(),
        NegotiationState::BrowserError
    );
    assert_eq!(a.recorder.failures.lock().unwrap().len(), 1);
    assert!(a_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_dtmf_and_stats() {
    let (a, b) = connected_pair(audio_video(), audio_only()).await;
    a.session.initiate_offer().await.unwrap();
    wait_until(|| { idle(&a) && idle(&b) }).await;

    a.session
        .insert_dtmf("123", Some(Duration::from_millis(80)), None)
        .await
        .unwrap();
    let dtmf = a.transport.mock_transceivers()[0].dtmf.clone().unwrap();
    assert_eq!(*dtmf.tones.lock().unwrap(), vec!["123".to_owned()]);

    a.transport.fire_dtmf_tone("1").await;
    a.transport.fire_dtmf_tone("").await;
    assert_eq!(
        *a.recorder.tones.lock().unwrap(),
        vec!["1".to_owned(), "".to_owned()]
    );

    let stats = a.session.get_stats().await.unwrap();
    assert_eq!(stats.of_type("transport").count(), 1);
}

#[tokio::test]
async fn test_close_one_side() {
    let (a, b) = connected_pair(audio_video(), audio_only()).await;
    a.session.initiate_offer().await.unwrap();
    wait_until(|| { idle(&a) && idle(&b) }).await;

    a.session.close().await.unwrap();
    a.session.close().await.unwrap();
    assert!(a.session.is_closed());
    assert!(a.transport.closed.load(std::sync::atomic::Ordering::SeqCst));
    assert_eq!(a.session.get_connection_state(), ConnectionState::Closed);
    assert_eq!(
        a.recorder
            .states
            .lock()
            .unwrap()
            .iter()
            .filter(|s| **s == ConnectionState::Closed)
            .count(),
        1
    );

    assert!(!b.session.is_closed());
    assert!(a.session.get_stats().await.is_err());
}
