//! Renewal output classification
//!
//! certbot reports its result only as human-readable text. Everything that
//! depends on that text goes through [`classify_renewal_output`], so the
//! matching strategy can change without touching the reload logic.

/// Printed when no certificate was due for renewal
pub const NO_RENEWALS_MARKER: &str = "No renewals were attempted";

/// Printed when every due certificate was renewed
pub const RENEWED_MARKER: &str = "Congratulations, all renewals succeeded";

/// What a `certbot renew` run did, as far as its output tells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalOutcome {
    /// Nothing was due; no further action
    NoRenewalNeeded,
    /// Certificates changed; the proxy must reload them
    Renewed,
    /// Neither marker found; treated as "no action"
    Unrecognized,
}

impl RenewalOutcome {
    /// Whether the reverse proxy has to pick up new certificates
    pub fn requires_reload(&self) -> bool {
        matches!(self, RenewalOutcome::Renewed)
    }
}

/// Classify captured `certbot renew` output
///
/// The "nothing attempted" marker wins over the success marker.
pub fn classify_renewal_output(output: &str) -> RenewalOutcome {
    if output.contains(NO_RENEWALS_MARKER) {
        RenewalOutcome::NoRenewalNeeded
    } else if output.contains(RENEWED_MARKER) {
        RenewalOutcome::Renewed
    } else {
        RenewalOutcome::Unrecognized
    }
}
