use std::sync::Mutex as SyncMutex;

use tokio::sync::mpsc;
use tokio::time::timeout;

use super::*;
use crate::rtp_transceiver::media_kind::{MediaKind, RtpCodecKind};
use crate::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::TrackHandle;
use crate::roap::roap_message::LOCAL_TIE_BREAKER;
use crate::transport::ice_connection_state::RTCIceConnectionState;
use crate::transport::peer_connection_state::RTCPeerConnectionState;
use crate::transport::transport_test::{MockTrack, MockTransport, MockTransportFactory};
use crate::transport::RTCTrackEvent;

const TIMEOUT: Duration = Duration::from_secs(5);

const REMOTE_OFFER: &str = "v=0\r\n\
o=- 1 1 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
a=mid:0\r\n\
a=sendrecv\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 102\r\n\
a=mid:1\r\n\
a=sendrecv\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 102\r\n\
a=mid:2\r\n\
a=sendonly\r\n";

struct RecordingHandler {
    messages: mpsc::UnboundedSender<RoapMessage>,
    failures: SyncMutex<Vec<String>>,
    states: SyncMutex<Vec<ConnectionState>>,
    tracks: SyncMutex<Vec<(MediaKind, String)>>,
    tones: SyncMutex<Vec<String>>,
}

#[async_trait::async_trait]
impl RoapMediaConnectionEventHandler for RecordingHandler {
    async fn on_connection_state_changed(&self, state: ConnectionState) {
        self.states.lock().unwrap().push(state);
    }

    async fn on_remote_track_added(&self, kind: MediaKind, track: TrackHandle) {
        self.tracks
            .lock()
            .unwrap()
            .push((kind, track.id().to_owned()));
    }

    async fn on_roap_message_to_send(&self, message: RoapMessage) {
        let _ = self.messages.send(message);
    }

    async fn on_roap_failure(&self, reason: String) {
        self.failures.lock().unwrap().push(reason);
    }

    async fn on_dtmf_tone_changed(&self, tone: String) {
        self.tones.lock().unwrap().push(tone);
    }
}

struct TestSession {
    session: RoapMediaConnection,
    transport: Arc<MockTransport>,
    handler: Arc<RecordingHandler>,
    messages: mpsc::UnboundedReceiver<RoapMessage>,
}

impl TestSession {
    async fn next_message(&mut self) -> RoapMessage {
        timeout(TIMEOUT, self.messages.recv())
            .await
            .unwrap()
            .unwrap()
    }

    async fn wait_for_state(&self, state: NegotiationState) {
        let mut snapshot = self.session.roap.subscribe();
        timeout(TIMEOUT, snapshot.wait_for(|s| s.state == state))
            .await
            .unwrap()
            .unwrap();
    }
}

async fn new_session(local_tracks: LocalTracks) -> TestSession {
    let transport = MockTransport::new();
    let (tx, messages) = mpsc::unbounded_channel();
    let handler = Arc::new(RecordingHandler {
        messages: tx,
        failures: SyncMutex::new(vec![]),
        states: SyncMutex::new(vec![]),
        tracks: SyncMutex::new(vec![]),
        tones: SyncMutex::new(vec![]),
    });

    let session = RoapMediaConnectionBuilder::new()
        .with_transport_factory(Arc::new(MockTransportFactory::new(Arc::clone(&transport))))
        .with_local_tracks(local_tracks)
        .with_event_handler(Arc::clone(&handler) as Arc<dyn RoapMediaConnectionEventHandler>)
        .with_logger(Logger::silent())
        .build()
        .await
        .unwrap();

    TestSession {
        session,
        transport,
        handler,
        messages,
    }
}

fn audio_track() -> LocalTracks {
    LocalTracks {
        audio: Some(MockTrack::new("mic", RtpCodecKind::Audio)),
        ..Default::default()
    }
}

/// negotiate runs a full outgoing exchange and leaves the session in Idle.
async fn negotiate(t: &mut TestSession) -> u32 {
    t.session.initiate_offer().await.unwrap();
    let offer = t.next_message().await;
    assert_eq!(offer.message_type, RoapMessageType::Offer);

    t.session
        .roap_message_received(RoapMessage::answer(offer.seq, "remote-answer".to_owned()))
        .await
        .unwrap();
    let ok = t.next_message().await;
    assert_eq!(ok, RoapMessage::ok(offer.seq));
    t.wait_for_state(NegotiationState::Idle).await;
    offer.seq
}

#[tokio::test]
async fn test_roap_media_connection_initiate_offer() {
    let mut t = new_session(audio_track()).await;
    assert_eq!(t.session.get_negotiation_state(), NegotiationState::Idle);

    t.session.initiate_offer().await.unwrap();
    let offer = t.next_message().await;
    assert_eq!(offer.message_type, RoapMessageType::Offer);
    assert_eq!(offer.seq, 1);
    assert_eq!(offer.tie_breaker, Some(LOCAL_TIE_BREAKER));
    assert!(offer.sdp.unwrap().contains("a=candidate:1"));
    assert_eq!(t.transport.count_calls("add_transceiver"), 3);

    let calls = t.transport.calls().len();
    assert_eq!(
        t.session.initiate_offer().await,
        Err(Error::ErrAlreadyNegotiating)
    );
    assert_eq!(t.transport.calls().len(), calls);
    assert_eq!(t.transport.mock_transceivers().len(), 3);
    assert_eq!(t.session.get_negotiation_state(), NegotiationState::WaitingForAnswer);
}

#[tokio::test]
async fn test_roap_media_connection_outgoing_exchange() {
    let mut t = new_session(audio_track()).await;
    let seq = negotiate(&mut t).await;

    assert_eq!(seq, 1);
    assert_eq!(t.transport.count_calls("set_remote_description"), 1);
    assert!(t.handler.failures.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_roap_media_connection_incoming_offer() {
    let mut t = new_session(audio_track()).await;

    t.session
        .roap_message_received(RoapMessage::offer(1, REMOTE_OFFER.to_owned()))
        .await
        .unwrap();
    let answer = t.next_message().await;
    assert_eq!(answer.message_type, RoapMessageType::Answer);
    assert_eq!(answer.seq, 1);
    assert_eq!(t.transport.count_calls("add_transceiver"), 0);

    let transceivers = t.transport.mock_transceivers();
    assert_eq!(transceivers.len(), 3);
    assert_eq!(
        transceivers[0].current_direction(),
        RTCRtpTransceiverDirection::Sendrecv
    );
    assert_eq!(transceivers[0].current_track_id(), Some("mic".to_owned()));
    assert_eq!(
        transceivers[1].current_direction(),
        RTCRtpTransceiverDirection::Recvonly
    );

    t.session
        .roap_message_received(RoapMessage::ok(1))
        .await
        .unwrap();
    t.wait_for_state(NegotiationState::Idle).await;

    // the session was armed by the incoming offer
    assert_eq!(
        t.session.initiate_offer().await,
        Err(Error::ErrAlreadyNegotiating)
    );
}

#[tokio::test]
async fn test_roap_media_connection_later_offer_does_not_rearm() {
    let mut t = new_session(audio_track()).await;
    negotiate(&mut t).await;

    t.session
        .roap_message_received(RoapMessage::offer(5, REMOTE_OFFER.to_owned()))
        .await
        .unwrap();
    let answer = t.next_message().await;
    assert_eq!(answer.message_type, RoapMessageType::Answer);
    assert_eq!(answer.seq, 5);
    assert_eq!(t.transport.count_calls("add_transceiver"), 3);
}

#[tokio::test]
async fn test_roap_media_connection_update_renegotiates() {
    let mut t = new_session(audio_track()).await;
    negotiate(&mut t).await;

    t.session
        .update_send_options(LocalTrackUpdate {
            video: Some(Some(MockTrack::new("camera", RtpCodecKind::Video))),
            ..Default::default()
        })
        .await
        .unwrap();
    let offer = t.next_message().await;
    assert_eq!(offer.message_type, RoapMessageType::Offer);
    assert_eq!(offer.seq, 2);
    assert_eq!(
        t.transport.mock_transceivers()[1].current_direction(),
        RTCRtpTransceiverDirection::Sendrecv
    );

    t.session
        .roap_message_received(RoapMessage::answer(2, "remote-answer".to_owned()))
        .await
        .unwrap();
    assert_eq!(t.next_message().await, RoapMessage::ok(2));
    t.wait_for_state(NegotiationState::Idle).await;

    // nothing changes, so no new offer
    t.session
        .update_receive_options(ReceiveOptions::default())
        .await
        .unwrap();
    assert!(t.messages.try_recv().is_err());
    assert_eq!(t.session.roap.seq(), 2);
}

#[tokio::test]
async fn test_roap_media_connection_update_before_negotiation() {
    let mut t = new_session(LocalTracks::default()).await;

    t.session
        .update_send_options(LocalTrackUpdate {
            audio: Some(Some(MockTrack::new("mic", RtpCodecKind::Audio))),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(t.messages.try_recv().is_err());
    assert_eq!(t.transport.count_calls("add_transceiver"), 0);

    t.session.initiate_offer().await.unwrap();
    t.next_message().await;
    assert_eq!(
        t.transport.mock_transceivers()[0].current_track_id(),
        Some("mic".to_owned())
    );
}

#[tokio::test]
async fn test_roap_media_connection_local_failure() {
    let t = new_session(audio_track()).await;
    t.transport.fail("create_offer");

    let result = t.session.initiate_offer().await;
    assert!(matches!(result, Err(Error::ErrLocalOfferFailed(_))));
    t.wait_for_state(NegotiationState::BrowserError).await;
    timeout(TIMEOUT, async {
        while t.handler.failures.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(t.handler.failures.lock().unwrap().len(), 1);

    assert!(matches!(
        t.session.update_send_options(LocalTrackUpdate {
            audio: Some(None),
            ..Default::default()
        })
        .await,
        Err(Error::ErrRoapTerminal(_))
    ));
}

#[tokio::test]
async fn test_roap_media_connection_forwards_events() {
    let mut t = new_session(audio_track()).await;
    negotiate(&mut t).await;

    t.transport
        .fire_states(
            RTCIceConnectionState::Connected,
            RTCPeerConnectionState::Connected,
        )
        .await;
    let expected = ConnectionState::from_transport_states(
        RTCIceConnectionState::Connected,
        RTCPeerConnectionState::Connected,
    );
    assert_eq!(t.session.get_connection_state(), expected);
    assert_eq!(*t.handler.states.lock().unwrap(), vec![expected]);

    t.transport
        .fire_track(RTCTrackEvent {
            track: MockTrack::new("remote-audio", RtpCodecKind::Audio),
            mid: Some("0".to_owned()),
        })
        .await;
    assert_eq!(
        *t.handler.tracks.lock().unwrap(),
        vec![(MediaKind::Audio, "remote-audio".to_owned())]
    );

    t.session.insert_dtmf("12#", None, None).await.unwrap();
    t.transport.fire_dtmf_tone("1").await;
    assert_eq!(*t.handler.tones.lock().unwrap(), vec!["1".to_owned()]);

    let stats = t.session.get_stats().await.unwrap();
    assert!(stats.get("RTCPeerConnection").is_some());
}

#[tokio::test]
async fn test_roap_media_connection_close() {
    let mut t = new_session(audio_track()).await;
    negotiate(&mut t).await;

    t.session.close().await.unwrap();
    assert!(t.session.is_closed());
    assert!(t.transport.closed.load(std::sync::atomic::Ordering::SeqCst));
    assert!(!t.transport.has_handler());
    assert_eq!(
        t.handler.states.lock().unwrap().last(),
        Some(&ConnectionState::Closed)
    );

    t.session.close().await.unwrap();
    assert_eq!(t.transport.count_calls("close"), 1);

    assert_eq!(t.session.initiate_offer().await, Err(Error::ErrConnectionClosed));
    assert_eq!(
        t.session
            .roap_message_received(RoapMessage::ok(1))
            .await,
        Err(Error::ErrConnectionClosed)
    );
    assert!(t.messages.try_recv().is_err());
}

#[tokio::test]
async fn test_roap_media_connection_builder() {
    let result = RoapMediaConnectionBuilder::new()
        .with_logger(Logger::silent())
        .build()
        .await;
    assert!(matches!(result, Err(Error::ErrConfig(_))));

    let transport = MockTransport::new();
    let result = RoapMediaConnectionBuilder::new()
        .with_transport_factory(Arc::new(MockTransportFactory::new(Arc::clone(&transport))))
        .with_config(MediaConnectionConfig::from_json(r#"{"iceServers": [{"urls": ["turn:t.example.org"]}]}"#).unwrap())
        .with_logger(Logger::silent())
        .build()
        .await;
    assert!(matches!(result, Err(Error::ErrNoTurnCredentials)));

    let session = RoapMediaConnectionBuilder::new()
        .with_transport_factory(Arc::new(MockTransportFactory::new(transport)))
        .with_initial_seq(41)
        .with_logger(Logger::silent())
        .build()
        .await
        .unwrap();
    assert_eq!(session.roap.seq(), 41);
    assert_eq!(session.get_connection_state(), ConnectionState::New);
}
