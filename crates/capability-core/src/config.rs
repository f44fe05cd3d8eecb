//! Capability service configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Current network access class. Media-sharing tags are suppressed on
/// narrowband access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkAccess {
    /// GPRS/EDGE class access.
    TwoG,
    ThreeG,
    Lte,
    Wifi,
}

impl NetworkAccess {
    /// True for 3G and better.
    pub fn has_broadband(&self) -> bool {
        !matches!(self, NetworkAccess::TwoG)
    }
}

/// Locally enabled RCS services, advertised as feature tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportedServices {
    pub im_session: bool,
    pub file_transfer_msrp: bool,
    pub file_transfer_http: bool,
    pub file_transfer_thumbnail: bool,
    pub file_transfer_store_forward: bool,
    pub group_chat_store_forward: bool,
    pub image_sharing: bool,
    pub video_sharing: bool,
    pub ip_voice_call: bool,
    pub ip_video_call: bool,
    pub cs_video: bool,
    pub presence_discovery: bool,
    pub social_presence: bool,
    pub geolocation_push: bool,
}

impl Default for SupportedServices {
    fn default() -> Self {
        Self {
            im_session: true,
            file_transfer_msrp: true,
            file_transfer_http: true,
            file_transfer_thumbnail: true,
            file_transfer_store_forward: false,
            group_chat_store_forward: false,
            image_sharing: true,
            video_sharing: true,
            ip_voice_call: true,
            ip_video_call: true,
            cs_video: false,
            presence_discovery: false,
            social_presence: false,
            geolocation_push: true,
        }
    }
}

/// Configuration for capability discovery and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityConfig {
    pub supported: SupportedServices,
    /// Extension IARI URNs advertised when `extensions_enabled` is set.
    pub extensions: Vec<String>,
    pub extensions_enabled: bool,
    /// Minimum age before an application-requested refresh is re-sent.
    pub refresh_timeout: Duration,
    /// Age after which the polling engine considers a record stale.
    pub expiry_timeout: Duration,
    /// Polling period; zero disables the polling engine.
    pub polling_period: Duration,
    /// Maximum concurrent outbound OPTIONS exchanges.
    pub max_concurrent_options: usize,
    pub network: NetworkAccess,
    /// Home domain used to form SIP URIs from contact numbers.
    pub home_domain: String,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            supported: SupportedServices::default(),
            extensions: Vec::new(),
            extensions_enabled: false,
            refresh_timeout: Duration::from_secs(3600),
            expiry_timeout: Duration::from_secs(86400),
            polling_period: Duration::from_secs(3600),
            max_concurrent_options: 5,
            network: NetworkAccess::Lte,
            home_domain: "ims.example.com".to_string(),
        }
    }
}

impl CapabilityConfig {
    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn with_expiry_timeout(mut self, timeout: Duration) -> Self {
        self.expiry_timeout = timeout;
        self
    }

    pub fn with_polling_period(mut self, period: Duration) -> Self {
        self.polling_period = period;
        self
    }

    pub fn with_network(mut self, network: NetworkAccess) -> Self {
        self.network = network;
        self
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions_enabled = !extensions.is_empty();
        self.extensions = extensions;
        self
    }
}
