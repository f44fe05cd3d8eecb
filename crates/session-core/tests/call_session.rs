//! Call session lifecycle against a scripted signaling stack

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use rcsip_capability_core::ContactId;
use rcsip_session_core::{
    CallErrorReason, CallState, CapabilityRefresher, IpCallSession, RenegotiationKind,
    SessionConfig, SessionEventHandler, SessionRegistry,
};
use rcsip_signaling_core::auth::DigestAuthenticationAgent;
use rcsip_signaling_core::message::{Method, SipRequest, SipResponse};
use rcsip_signaling_core::{Result as SignalingResult, SignalingClient, TransactionContext};

#[derive(Clone)]
enum InviteOutcome {
    Answer(String),
    Status(u16),
    Timeout,
}

struct MockClient {
    invite_outcome: Mutex<InviteOutcome>,
    requests: Mutex<Vec<SipRequest>>,
    responses: Mutex<Vec<SipResponse>>,
}

impl MockClient {
    fn new(outcome: InviteOutcome) -> Arc<Self> {
        Arc::new(Self {
            invite_outcome: Mutex::new(outcome),
            requests: Mutex::new(Vec::new()),
            responses: Mutex::new(Vec::new()),
        })
    }

    fn sent_methods(&self) -> Vec<Method> {
        self.requests.lock().unwrap().iter().map(|r| r.method).collect()
    }

    fn response_codes(&self) -> Vec<u16> {
        self.responses.lock().unwrap().iter().map(|r| r.status_code).collect()
    }
}

#[async_trait]
impl SignalingClient for MockClient {
    async fn send_and_await(&self, request: SipRequest) -> SignalingResult<TransactionContext> {
        let method = request.method;
        self.requests.lock().unwrap().push(request);
        if method == Method::Invite {
            match self.invite_outcome.lock().unwrap().clone() {
                InviteOutcome::Timeout => Ok(TransactionContext::timed_out()),
                InviteOutcome::Status(code) => {
                    Ok(TransactionContext::from_response(SipResponse::new(code, "")))
                }
                InviteOutcome::Answer(sdp) => {
                    let mut response = SipResponse::new(200, "OK");
                    response.set_body("application/sdp", sdp);
                    Ok(TransactionContext::from_response(response))
                }
            }
        } else {
            Ok(TransactionContext::from_response(SipResponse::new(200, "OK")))
        }
    }

    async fn send_only(&self, request: SipRequest) -> SignalingResult<()> {
        self.requests.lock().unwrap().push(request);
        Ok(())
    }

    async fn send_response(&self, response: SipResponse) -> SignalingResult<()> {
        self.responses.lock().unwrap().push(response);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingEvents {
    log: Mutex<Vec<String>>,
}

impl RecordingEvents {
    fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn push(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl SessionEventHandler for RecordingEvents {
    async fn on_session_invited(
        &self,
        contact: &ContactId,
        _session_id: &rcsip_session_core::SessionId,
    ) {
        self.push(format!("invited:{}", contact));
    }

    async fn on_session_accepted(&self, contact: &ContactId) {
        self.push(format!("accepted:{}", contact));
    }

    async fn on_session_started(&self, contact: &ContactId) {
        self.push(format!("started:{}", contact));
    }

    async fn on_session_rejected(&self, contact: &ContactId, reason: CallErrorReason) {
        self.push(format!("rejected:{}:{:?}", contact, reason));
    }

    async fn on_session_terminated(&self, contact: &ContactId) {
        self.push(format!("terminated:{}", contact));
    }

    async fn on_call_error(&self, contact: &ContactId, reason: CallErrorReason) {
        self.push(format!("error:{}:{:?}", contact, reason));
    }

    async fn on_renegotiation_accepted(&self, contact: &ContactId, kind: RenegotiationKind) {
        self.push(format!("renegotiation-accepted:{}:{:?}", contact, kind));
    }

    async fn on_renegotiation_aborted(&self, contact: &ContactId, kind: RenegotiationKind) {
        self.push(format!("renegotiation-aborted:{}:{:?}", contact, kind));
    }
}

struct RecordingRefresher {
    refreshed: Mutex<Vec<ContactId>>,
}

#[async_trait]
impl CapabilityRefresher for RecordingRefresher {
    async fn refresh(&self, contact: &ContactId) {
        self.refreshed.lock().unwrap().push(contact.clone());
    }
}

fn peer() -> ContactId {
    ContactId::parse("+33612345678").unwrap()
}

fn auth() -> Arc<DigestAuthenticationAgent> {
    Arc::new(DigestAuthenticationAgent::new("alice", "secret"))
}

fn config() -> SessionConfig {
    SessionConfig::default()
        .with_ringing_period(Duration::from_secs(5))
        .with_ack_timeout(Duration::from_secs(5))
}

const AUDIO_ANSWER: &str = "v=0\r\n\
    o=- 1 1 IN IP4 10.0.0.2\r\n\
    s=-\r\n\
    c=IN IP4 10.0.0.2\r\n\
    t=0 0\r\n\
    m=audio 5004 RTP/AVP 0\r\n\
    a=rtpmap:0 PCMU/8000\r\n";

fn invite_with_sdp(sdp: &str) -> SipRequest {
    let mut request = SipRequest::new(Method::Invite, "sip:alice@ims.example.com");
    request.add_header("Call-ID", "call-1@peer");
    request.add_header("CSeq", "1 INVITE");
    request.add_header("From", "<sip:+33612345678@ims.example.com>");
    request.add_header("To", "<sip:alice@ims.example.com>");
    request.add_header("P-Asserted-Identity", "<sip:+33612345678@ims.example.com>");
    request.set_body("application/sdp", sdp.to_string());
    request
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn error_handler_is_idempotent_on_terminated_sessions() {
    let client = MockClient::new(InviteOutcome::Timeout);
    let events = Arc::new(RecordingEvents::default());
    let session = IpCallSession::new_outgoing(peer(), config(), client, auth(), events.clone());

    session.handle_call_error(CallErrorReason::NoResponse).await;
    session.handle_call_error(CallErrorReason::NoResponse).await;

    let errors: Vec<_> = events
        .entries()
        .into_iter()
        .filter(|e| e.starts_with("error:"))
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(session.state(), CallState::Terminated);
}

#[tokio::test]
async fn outbound_call_establishes_on_answer() {
    let client = MockClient::new(InviteOutcome::Answer(AUDIO_ANSWER.to_string()));
    let events = Arc::new(RecordingEvents::default());
    let registry = SessionRegistry::new(client.clone(), auth(), events.clone(), config());

    let session = registry.initiate_session(peer()).unwrap();
    session.dial().await.unwrap();

    assert_eq!(session.state(), CallState::Established);
    assert!(client.sent_methods().contains(&Method::Ack));
    assert!(events.entries().iter().any(|e| e.starts_with("started:")));
}

#[tokio::test]
async fn outbound_busy_removes_session_and_triggers_capability_refresh() {
    let client = MockClient::new(InviteOutcome::Status(486));
    let events = Arc::new(RecordingEvents::default());
    let registry = SessionRegistry::new(client, auth(), events.clone(), config());
    let refresher = Arc::new(RecordingRefresher {
        refreshed: Mutex::new(Vec::new()),
    });
    registry.set_capability_refresher(refresher.clone());

    let session = registry.initiate_session(peer()).unwrap();
    let result = session.dial().await;

    assert!(result.is_err());
    assert_eq!(registry.active_count(), 0);
    assert!(events
        .entries()
        .iter()
        .any(|e| e.contains("rejected:") && e.contains("Busy")));

    wait_for(|| !refresher.refreshed.lock().unwrap().is_empty()).await;
    assert_eq!(refresher.refreshed.lock().unwrap()[0], peer());
}

#[tokio::test]
async fn inbound_call_negotiates_audio_and_establishes_on_ack() {
    let client = MockClient::new(InviteOutcome::Answer(String::new()));
    let events = Arc::new(RecordingEvents::default());
    let registry = SessionRegistry::new(client.clone(), auth(), events.clone(), config());

    registry
        .on_invitation_received(invite_with_sdp(AUDIO_ANSWER))
        .await
        .unwrap();

    // Ringing goes out before any decision.
    wait_for(|| client.response_codes().contains(&180)).await;
    let session = registry.get(&peer()).expect("session registered");

    session.accept();
    wait_for(|| client.response_codes().contains(&200)).await;

    registry.on_ack_received(&peer());
    wait_for(|| session.state() == CallState::Established).await;
    assert!(events.entries().iter().any(|e| e.starts_with("started:")));
}

#[tokio::test]
async fn inbound_call_without_common_audio_codec_fails_with_488() {
    let client = MockClient::new(InviteOutcome::Answer(String::new()));
    let events = Arc::new(RecordingEvents::default());
    let registry = SessionRegistry::new(client.clone(), auth(), events.clone(), config());

    let offer = "m=audio 5004 RTP/AVP 102\r\na=rtpmap:102 EVS/16000\r\n";
    registry
        .on_invitation_received(invite_with_sdp(offer))
        .await
        .unwrap();

    wait_for(|| client.response_codes().contains(&180)).await;
    let session = registry.get(&peer()).unwrap();
    session.accept();

    wait_for(|| client.response_codes().contains(&488)).await;
    wait_for(|| registry.get(&peer()).is_none()).await;
    assert!(events
        .entries()
        .iter()
        .any(|e| e.contains("error:") && e.contains("UnsupportedAudio")));
}

#[tokio::test]
async fn invitation_beyond_session_limit_is_rejected_busy() {
    let client = MockClient::new(InviteOutcome::Answer(String::new()));
    let events = Arc::new(RecordingEvents::default());
    let registry = SessionRegistry::new(
        client.clone(),
        auth(),
        events.clone(),
        config().with_max_sessions(1),
    );

    registry
        .on_invitation_received(invite_with_sdp(AUDIO_ANSWER))
        .await
        .unwrap();
    wait_for(|| client.response_codes().contains(&180)).await;

    // A second caller while the first is still ringing.
    let mut second = invite_with_sdp(AUDIO_ANSWER);
    second.set_header("P-Asserted-Identity", "<sip:+33699999999@ims.example.com>");
    second.set_header("From", "<sip:+33699999999@ims.example.com>");
    registry.on_invitation_received(second).await.unwrap();

    wait_for(|| client.response_codes().contains(&486)).await;
    assert!(events
        .entries()
        .iter()
        .any(|e| e.contains("rejected:") && e.contains("MaxSessionsReached")));
}

#[tokio::test]
async fn remote_cancel_while_ringing_answers_487() {
    let client = MockClient::new(InviteOutcome::Answer(String::new()));
    let events = Arc::new(RecordingEvents::default());
    let registry = SessionRegistry::new(client.clone(), auth(), events.clone(), config());

    registry
        .on_invitation_received(invite_with_sdp(AUDIO_ANSWER))
        .await
        .unwrap();
    wait_for(|| client.response_codes().contains(&180)).await;

    registry.on_cancel_received(&peer());
    wait_for(|| client.response_codes().contains(&487)).await;
    assert!(events
        .entries()
        .iter()
        .any(|e| e.contains("rejected:") && e.contains("Cancelled")));
}

#[tokio::test]
async fn hold_renegotiation_sends_sendonly_reinvite() {
    let client = MockClient::new(InviteOutcome::Answer(AUDIO_ANSWER.to_string()));
    let events = Arc::new(RecordingEvents::default());
    let registry = SessionRegistry::new(client.clone(), auth(), events.clone(), config());

    let session = registry.initiate_session(peer()).unwrap();
    session.dial().await.unwrap();
    assert_eq!(session.state(), CallState::Established);

    session.set_on_hold(true).await.unwrap();

    let requests = client.requests.lock().unwrap();
    let reinvite = requests
        .iter()
        .filter(|r| r.method == Method::Invite)
        .last()
        .unwrap();
    assert!(reinvite.body_str().unwrap().contains("a=sendonly"));
    drop(requests);

    assert!(events
        .entries()
        .iter()
        .any(|e| e.contains("renegotiation-accepted:") && e.contains("Hold")));
    assert_eq!(session.state(), CallState::Established);
}

#[tokio::test]
async fn terminating_twice_sends_one_bye() {
    let client = MockClient::new(InviteOutcome::Answer(AUDIO_ANSWER.to_string()));
    let events = Arc::new(RecordingEvents::default());
    let registry = SessionRegistry::new(client.clone(), auth(), events.clone(), config());

    let session = registry.initiate_session(peer()).unwrap();
    session.dial().await.unwrap();

    session.terminate().await.unwrap();
    session.terminate().await.unwrap();

    let byes = client
        .sent_methods()
        .into_iter()
        .filter(|m| *m == Method::Bye)
        .count();
    assert_eq!(byes, 1);
    let terminated = events
        .entries()
        .into_iter()
        .filter(|e| e.starts_with("terminated:"))
        .count();
    assert_eq!(terminated, 1);
}
