//! Dialog path identification
//!
//! A [`DialogPath`] carries the identifiers that correlate every request
//! and response belonging to one signaling relationship: the Call-ID, the
//! two parties, the request target, and the CSeq counter that orders
//! in-dialog sub-requests (re-INVITEs, authenticated retries).

use uuid::Uuid;

/// Identification of a SIP dialog from the local endpoint's perspective.
#[derive(Debug, Clone)]
pub struct DialogPath {
    pub call_id: String,
    pub local_party: String,
    pub remote_party: String,
    pub target: String,
    cseq: u32,
}

impl DialogPath {
    /// Create a fresh dialog path toward `target` with a generated Call-ID.
    pub fn new(
        local_party: impl Into<String>,
        remote_party: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            call_id: format!("{}@rcsip", Uuid::new_v4()),
            local_party: local_party.into(),
            remote_party: remote_party.into(),
            target: target.into(),
            cseq: 1,
        }
    }

    /// Rebuild a path from an inbound request's identifiers.
    pub fn from_incoming(
        call_id: impl Into<String>,
        local_party: impl Into<String>,
        remote_party: impl Into<String>,
        target: impl Into<String>,
        cseq: u32,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            local_party: local_party.into(),
            remote_party: remote_party.into(),
            target: target.into(),
            cseq,
        }
    }

    pub fn cseq(&self) -> u32 {
        self.cseq
    }

    /// Bump the sequence counter for the next in-dialog request.
    pub fn increment_cseq(&mut self) {
        self.cseq += 1;
    }
}

impl std::fmt::Display for DialogPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {} ({})", self.local_party, self.remote_party, self.call_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cseq_increments() {
        let mut path = DialogPath::new("sip:me@x", "sip:you@x", "sip:you@x");
        assert_eq!(path.cseq(), 1);
        path.increment_cseq();
        assert_eq!(path.cseq(), 2);
    }

    #[test]
    fn fresh_paths_get_distinct_call_ids() {
        let a = DialogPath::new("sip:me@x", "sip:you@x", "sip:you@x");
        let b = DialogPath::new("sip:me@x", "sip:you@x", "sip:you@x");
        assert_ne!(a.call_id, b.call_id);
    }
}
