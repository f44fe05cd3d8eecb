//! Digest authentication and the shared challenge-retry primitive
//!
//! The 407 challenge/response pattern recurs identically across OPTIONS,
//! SUBSCRIBE, INVITE and re-INVITE. It is implemented once here:
//! [`send_with_auth_retry`] sends a request built by the caller, and on a
//! 407 reads the challenge, bumps the dialog CSeq, rebuilds the request
//! with credentials and resends. Retry policy is one authentication round
//! per exchange.

use md5::{Digest, Md5};
use tracing::{debug, warn};

use crate::client::{SignalingClient, TransactionContext};
use crate::dialog::DialogPath;
use crate::errors::{Result, SignalingError};
use crate::message::{status, SipRequest, SipResponse};

/// A parsed digest challenge from a 407 response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub realm: String,
    pub nonce: String,
    pub qop: Option<String>,
    pub algorithm: Option<String>,
}

impl AuthChallenge {
    /// Parse a `Proxy-Authenticate` (or `WWW-Authenticate`) header value.
    pub fn parse(header_value: &str) -> Option<Self> {
        let rest = header_value.trim().strip_prefix("Digest")?.trim();

        let mut realm = None;
        let mut nonce = None;
        let mut qop = None;
        let mut algorithm = None;

        for param in split_challenge_params(rest) {
            let (key, value) = param.split_once('=')?;
            let value = value.trim().trim_matches('"');
            match key.trim() {
                "realm" => realm = Some(value.to_string()),
                "nonce" => nonce = Some(value.to_string()),
                "qop" => qop = Some(value.to_string()),
                "algorithm" => algorithm = Some(value.to_string()),
                _ => {}
            }
        }

        Some(Self {
            realm: realm?,
            nonce: nonce?,
            qop,
            algorithm,
        })
    }
}

/// Comma-split that respects quoted parameter values.
fn split_challenge_params(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth_quoted = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '"' => depth_quoted = !depth_quoted,
            ',' if !depth_quoted => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(s[start..].trim());
    parts
}

/// The authentication collaborator: parses challenges and produces
/// authorization headers for retried requests.
pub trait AuthenticationAgent: Send + Sync {
    /// Extract a challenge from a 407 response, if one is present.
    fn read_challenge(&self, response: &SipResponse) -> Option<AuthChallenge>;

    /// Produce a `Proxy-Authorization` header value answering `challenge`
    /// for the given method and request URI.
    fn authorization_header(
        &self,
        challenge: &AuthChallenge,
        method: &str,
        request_uri: &str,
    ) -> String;
}

/// MD5 digest implementation of [`AuthenticationAgent`] (RFC 2617 subset).
pub struct DigestAuthenticationAgent {
    username: String,
    password: String,
}

impl DigestAuthenticationAgent {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn md5_hex(input: &str) -> String {
        let mut hasher = Md5::new();
        hasher.update(input.as_bytes());
        let digest = hasher.finalize();
        let mut out = String::with_capacity(32);
        for byte in digest {
            out.push_str(&format!("{:02x}", byte));
        }
        out
    }
}

impl AuthenticationAgent for DigestAuthenticationAgent {
    fn read_challenge(&self, response: &SipResponse) -> Option<AuthChallenge> {
        response
            .header("Proxy-Authenticate")
            .or_else(|| response.header("WWW-Authenticate"))
            .and_then(AuthChallenge::parse)
    }

    fn authorization_header(
        &self,
        challenge: &AuthChallenge,
        method: &str,
        request_uri: &str,
    ) -> String {
        let ha1 = Self::md5_hex(&format!(
            "{}:{}:{}",
            self.username, challenge.realm, self.password
        ));
        let ha2 = Self::md5_hex(&format!("{}:{}", method, request_uri));
        let response = Self::md5_hex(&format!("{}:{}:{}", ha1, challenge.nonce, ha2));

        format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\", algorithm=MD5",
            self.username, challenge.realm, challenge.nonce, request_uri, response
        )
    }
}

/// Send a request, answering at most one 407 challenge.
///
/// `build_request` is called once for the initial request (no
/// authorization) and once more on retry with the authorization header
/// value to attach. The dialog CSeq is incremented before the retry, as
/// the retried request is a new transaction within the same dialog.
pub async fn send_with_auth_retry<F>(
    client: &dyn SignalingClient,
    agent: &dyn AuthenticationAgent,
    dialog: &mut DialogPath,
    mut build_request: F,
) -> Result<TransactionContext>
where
    F: FnMut(&DialogPath, Option<&str>) -> SipRequest,
{
    let request = build_request(dialog, None);
    let method = request.method.as_str().to_string();
    let request_uri = request.request_uri.clone();

    let ctx = client.send_and_await(request).await?;
    if ctx.status_code != status::PROXY_AUTHENTICATION_REQUIRED {
        return Ok(ctx);
    }

    let response = ctx
        .response
        .as_ref()
        .ok_or_else(|| SignalingError::Protocol("407 without response".into()))?;
    let challenge = match agent.read_challenge(response) {
        Some(c) => c,
        None => {
            warn!("407 response carried no parsable challenge");
            return Ok(ctx);
        }
    };

    debug!("answering 407 challenge from realm '{}'", challenge.realm);
    dialog.increment_cseq();
    let authorization = agent.authorization_header(&challenge, &method, &request_uri);
    let retried = build_request(dialog, Some(&authorization));
    client.send_and_await(retried).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Method;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ChallengingClient {
        calls: AtomicUsize,
        seen_authorization: Mutex<Option<String>>,
    }

    #[async_trait]
    impl SignalingClient for ChallengingClient {
        async fn send_and_await(&self, request: SipRequest) -> Result<TransactionContext> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                let mut response = SipResponse::new(407, "Proxy Authentication Required");
                response.add_header(
                    "Proxy-Authenticate",
                    "Digest realm=\"ims.example.com\", nonce=\"abc123\", qop=\"auth\"",
                );
                Ok(TransactionContext::from_response(response))
            } else {
                *self.seen_authorization.lock().unwrap() = request
                    .header("Proxy-Authorization")
                    .map(|s| s.to_string());
                Ok(TransactionContext::from_response(SipResponse::new(200, "OK")))
            }
        }

        async fn send_only(&self, _request: SipRequest) -> Result<()> {
            Ok(())
        }

        async fn send_response(&self, _response: SipResponse) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn parses_challenge_with_quoted_params() {
        let challenge = AuthChallenge::parse(
            "Digest realm=\"ims.mnc001.mcc208.3gppnetwork.org\", nonce=\"xyz, 1\", qop=\"auth\", algorithm=MD5",
        )
        .unwrap();
        assert_eq!(challenge.realm, "ims.mnc001.mcc208.3gppnetwork.org");
        assert_eq!(challenge.nonce, "xyz, 1");
        assert_eq!(challenge.qop.as_deref(), Some("auth"));
    }

    #[tokio::test]
    async fn retries_once_with_credentials_and_bumped_cseq() {
        let client = ChallengingClient {
            calls: AtomicUsize::new(0),
            seen_authorization: Mutex::new(None),
        };
        let agent = DigestAuthenticationAgent::new("alice", "secret");
        let mut dialog = DialogPath::new("sip:alice@x", "sip:bob@x", "sip:bob@x");

        let ctx = send_with_auth_retry(&client, &agent, &mut dialog, |path, auth| {
            let mut request = SipRequest::new(Method::Options, path.target.clone());
            if let Some(auth) = auth {
                request.add_header("Proxy-Authorization", auth);
            }
            request
        })
        .await
        .unwrap();

        assert_eq!(ctx.status_code, 200);
        assert_eq!(dialog.cseq(), 2);
        let auth = client.seen_authorization.lock().unwrap().clone().unwrap();
        assert!(auth.contains("username=\"alice\""));
        assert!(auth.contains("nonce=\"abc123\""));
    }
}
