//! Capability extraction, negotiation, and rendering.
//!
//! The set of recognized tokens mirrors the teacher's `protocol::types::Capability`
//! enum, trimmed to the subset this client negotiates and sends (spec.md §3) plus
//! the `symref` accessor added in SPEC_FULL.md §3.

use std::fmt;

use indexmap::IndexSet;

/// An ASCII capability token, optionally carrying a `name=value` payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Capability(String);

impl Capability {
    pub fn new(token: impl Into<String>) -> Self {
        Capability(token.into())
    }

    pub fn name(&self) -> &str {
        self.0.split('=').next().unwrap_or(&self.0)
    }

    pub fn value(&self) -> Option<&str> {
        self.0.splitn(2, '=').nth(1)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An ordered, deduplicated set of capability tokens. Insertion order is
/// preserved so rendering is deterministic (spec.md §4.C: "the server does
/// not rely on order, but tests do").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet(IndexSet<Capability>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tokens<I: IntoIterator<Item = S>, S: Into<String>>(tokens: I) -> Self {
        let mut set = IndexSet::new();
        for t in tokens {
            set.insert(Capability::new(t));
        }
        CapabilitySet(set)
    }

    pub fn insert(&mut self, token: impl Into<String>) {
        self.0.insert(Capability::new(token));
    }

    pub fn has(&self, name: &str) -> bool {
        self.0.iter().any(|c| c.name() == name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|c| c.name() == name).and_then(|c| c.value())
    }

    /// `symref=HEAD:refs/heads/main` → `("HEAD", "refs/heads/main")`.
    pub fn symref_target(&self) -> Option<(&str, &str)> {
        self.get("symref").and_then(|v| v.split_once(':'))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The negotiated set: tokens present in both `self` (the client's
    /// request) and `advertised`, in the client's own insertion order. Never
    /// includes a token the server did not advertise.
    pub fn intersect(&self, advertised: &CapabilitySet) -> CapabilitySet {
        let mut out = IndexSet::new();
        for cap in &self.0 {
            if advertised.has(cap.name()) {
                out.insert(cap.clone());
            }
        }
        CapabilitySet(out)
    }

    /// Space-separated rendering, e.g. `"multi_ack side-band-64k ofs-delta"`.
    pub fn render(&self) -> String {
        self.0
            .iter()
            .map(Capability::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Split the first advertised ref line into its bare `<id> <ref>` form and
/// the capability set carried after a NUL byte. Absent NUL yields an empty
/// capability set (spec.md §4.C).
pub fn extract(first_ref_line: &str) -> (&str, CapabilitySet) {
    match first_ref_line.split_once('\0') {
        Some((line, caps)) => (line, CapabilitySet::from_tokens(caps.split_whitespace())),
        None => (first_ref_line, CapabilitySet::new()),
    }
}
