//! Session service configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum concurrent sessions; further invitations are declined.
    pub max_sessions: usize,
    /// How long an inbound invitation rings before "not answered".
    pub ringing_period: Duration,
    /// How long to wait for the ACK finishing session setup.
    pub ack_timeout: Duration,
    /// How long an outbound add-video confirmation may take.
    pub renegotiation_timeout: Duration,
    /// Home domain used to form SIP URIs from contact numbers.
    pub home_domain: String,
    /// The local user's SIP URI.
    pub local_user: String,
    /// Local media address used in SDP offers and answers.
    pub media_address: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 2,
            ringing_period: Duration::from_secs(60),
            ack_timeout: Duration::from_secs(30),
            renegotiation_timeout: Duration::from_secs(30),
            home_domain: "ims.example.com".to_string(),
            local_user: "sip:user@ims.example.com".to_string(),
            media_address: "127.0.0.1".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    pub fn with_ringing_period(mut self, period: Duration) -> Self {
        self.ringing_period = period;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn with_local_user(mut self, uri: impl Into<String>) -> Self {
        self.local_user = uri.into();
        self
    }
}
