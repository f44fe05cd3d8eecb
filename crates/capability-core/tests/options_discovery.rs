//! OPTIONS discovery behavior against a scripted signaling stack

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use rcsip_capability_core::capability::epoch_millis;
use rcsip_capability_core::options::OptionsDiscovery;
use rcsip_capability_core::{
    Capability, CapabilityConfig, CapabilityNotifier, ContactId, ContactStore,
    InMemoryContactStore, RcsStatus, RegistrationState,
};
use rcsip_signaling_core::auth::DigestAuthenticationAgent;
use rcsip_signaling_core::message::{SipRequest, SipResponse};
use rcsip_signaling_core::{Result as SignalingResult, SignalingClient, TransactionContext};

/// Answers every OPTIONS with one scripted outcome.
struct ScriptedClient {
    outcome: Mutex<Outcome>,
}

#[derive(Clone)]
enum Outcome {
    Timeout,
    Status(u16),
    Ok {
        contact_header: String,
        sdp: Option<String>,
    },
}

#[async_trait]
impl SignalingClient for ScriptedClient {
    async fn send_and_await(&self, _request: SipRequest) -> SignalingResult<TransactionContext> {
        match self.outcome.lock().unwrap().clone() {
            Outcome::Timeout => Ok(TransactionContext::timed_out()),
            Outcome::Status(code) => {
                Ok(TransactionContext::from_response(SipResponse::new(code, "")))
            }
            Outcome::Ok { contact_header, sdp } => {
                let mut response = SipResponse::new(200, "OK");
                response.add_header("Contact", contact_header);
                if let Some(sdp) = sdp {
                    response.set_body("application/sdp", sdp);
                }
                Ok(TransactionContext::from_response(response))
            }
        }
    }

    async fn send_only(&self, _request: SipRequest) -> SignalingResult<()> {
        Ok(())
    }

    async fn send_response(&self, _response: SipResponse) -> SignalingResult<()> {
        Ok(())
    }
}

fn discovery(
    outcome: Outcome,
    store: Arc<InMemoryContactStore>,
) -> Arc<OptionsDiscovery> {
    Arc::new(OptionsDiscovery::new(
        Arc::new(ScriptedClient {
            outcome: Mutex::new(outcome),
        }),
        Arc::new(DigestAuthenticationAgent::new("alice", "secret")),
        store,
        Arc::new(CapabilityNotifier::new()),
        CapabilityConfig::default(),
        "sip:+33600000000@ims.example.com",
    ))
}

fn peer() -> ContactId {
    ContactId::parse("+33612345678").unwrap()
}

async fn run_and_wait(discovery: &Arc<OptionsDiscovery>, contact: ContactId) {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = Mutex::new(Some(tx));
    discovery
        .request_capabilities(
            contact,
            Some(Box::new(move |_| {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(());
                }
            })),
        )
        .await;
    tokio::time::timeout(Duration::from_secs(2), rx)
        .await
        .expect("discovery did not complete")
        .expect("completion callback dropped");
}

#[tokio::test]
async fn timeout_preserves_stored_flags_and_stamps_last_request() {
    let store = Arc::new(InMemoryContactStore::new());
    let contact = peer();

    let known = Capability::builder()
        .im_session(true)
        .timestamp_of_last_request(1_000)
        .timestamp_of_last_response(1_000)
        .build();
    store
        .set(&contact, known, RcsStatus::RcsCapable, RegistrationState::Online)
        .await;

    let before = epoch_millis();
    let discovery = discovery(Outcome::Timeout, Arc::clone(&store));
    run_and_wait(&discovery, contact.clone()).await;

    let record = store.get(&contact).await.unwrap();
    assert!(record.capability.im_session);
    assert_eq!(record.status, RcsStatus::RcsCapable);
    assert!(record.capability.timestamp_of_last_request >= before);
    assert_eq!(record.capability.timestamp_of_last_response, 1_000);
}

#[tokio::test]
async fn not_found_reclassifies_to_not_rcs() {
    let store = Arc::new(InMemoryContactStore::new());
    let contact = peer();

    let discovery = discovery(Outcome::Status(404), Arc::clone(&store));
    run_and_wait(&discovery, contact.clone()).await;

    let record = store.get(&contact).await.unwrap();
    assert_eq!(record.status, RcsStatus::NotRcs);
    assert_eq!(record.capability, Capability::default());
}

#[tokio::test]
async fn automata_responder_is_marked_offline() {
    let store = Arc::new(InMemoryContactStore::new());
    let contact = peer();

    let discovery = discovery(
        Outcome::Ok {
            contact_header: "<sip:bot@x>;+g.oma.sip-im;automata".to_string(),
            sdp: None,
        },
        Arc::clone(&store),
    );
    run_and_wait(&discovery, contact.clone()).await;

    let record = store.get(&contact).await.unwrap();
    assert_eq!(record.status, RcsStatus::RcsCapable);
    assert_eq!(record.registration, RegistrationState::Offline);
    assert!(record.capability.sip_automata);
}

#[tokio::test]
async fn not_registered_keeps_known_capabilities_offline() {
    let store = Arc::new(InMemoryContactStore::new());
    let contact = peer();

    let known = Capability::builder().im_session(true).build();
    store
        .set(&contact, known, RcsStatus::RcsCapable, RegistrationState::Online)
        .await;

    let discovery = discovery(Outcome::Status(480), Arc::clone(&store));
    run_and_wait(&discovery, contact.clone()).await;

    let record = store.get(&contact).await.unwrap();
    assert!(record.capability.im_session);
    assert_eq!(record.status, RcsStatus::RcsCapable);
    assert_eq!(record.registration, RegistrationState::Offline);
}

#[tokio::test]
async fn fresh_capability_query_extracts_tags_and_sdp() {
    let store = Arc::new(InMemoryContactStore::new());
    let contact = peer();

    let sdp = "v=0\r\n\
        o=- 1 1 IN IP4 10.0.0.2\r\n\
        s=-\r\n\
        c=IN IP4 10.0.0.2\r\n\
        t=0 0\r\n\
        m=video 5006 RTP/AVP 96\r\n\
        a=rtpmap:96 H264/90000\r\n\
        a=fmtp:96 profile-level-id=42900b\r\n";

    let contact_header = "<sip:peer@x>;+g.oma.sip-im;+g.3gpp.iari-ref=\"urn%3Aurn-7%3A3gpp-application.ims.iari.rcse.ft\"".to_string();
    let discovery = discovery(
        Outcome::Ok {
            contact_header,
            sdp: Some(sdp.to_string()),
        },
        Arc::clone(&store),
    );
    run_and_wait(&discovery, contact.clone()).await;

    let record = store.get(&contact).await.unwrap();
    assert_eq!(record.status, RcsStatus::RcsCapable);
    assert_eq!(record.registration, RegistrationState::Online);
    assert!(record.capability.im_session);
    assert!(record.capability.file_transfer_msrp);
    assert!(record.capability.video_sharing);
}

#[tokio::test]
async fn rapid_repeated_requests_dispatch_once() {
    let store = Arc::new(InMemoryContactStore::new());
    let contact = peer();

    let discovery = discovery(
        Outcome::Ok {
            contact_header: "<sip:peer@x>;+g.oma.sip-im".to_string(),
            sdp: None,
        },
        Arc::clone(&store),
    );

    run_and_wait(&discovery, contact.clone()).await;
    let first_stamp = store.get(&contact).await.unwrap().capability.timestamp_of_last_request;

    // Within the refresh window: gate rejects, callback still fires.
    run_and_wait(&discovery, contact.clone()).await;
    let second_stamp = store.get(&contact).await.unwrap().capability.timestamp_of_last_request;
    assert_eq!(first_stamp, second_stamp);
}
