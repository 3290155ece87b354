//! Parses the `report-status` capability's response stream on push: a
//! `unpack <ok|error>` line followed by one `ok <ref>` / `ng <ref> <reason>`
//! line per update command, terminated by flush.
//!
//! Ported from `dulwich.client.ReportStatusParser` / `_handle_upload_pack_head`
//! sibling logic; state machine shape follows the teacher's
//! `protocol::smart` response readers.

use std::collections::BTreeMap;

use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitPackStatus,
    AwaitRefStatus,
    Done,
}

/// Accumulates `unpack`/`ok`/`ng` lines and renders the final verdict.
#[derive(Debug)]
pub struct ReportStatusParser {
    state: State,
    pack_status: Option<String>,
    /// ref name -> rejection reason, only for refs the server rejected.
    failures: BTreeMap<String, String>,
    accepted: Vec<String>,
}

impl ReportStatusParser {
    pub fn new() -> Self {
        Self {
            state: State::AwaitPackStatus,
            pack_status: None,
            failures: BTreeMap::new(),
            accepted: Vec::new(),
        }
    }

    /// Feed one line of the report-status body (without its trailing `\n`).
    /// Malformed lines are skipped rather than treated as fatal, mirroring
    /// the teacher's lenient line-based parsers.
    pub fn feed_line(&mut self, line: &str) {
        let line = line.trim_end_matches('\n');
        match self.state {
            State::AwaitPackStatus => {
                if let Some(rest) = line.strip_prefix("unpack ") {
                    self.pack_status = Some(rest.to_string());
                    self.state = State::AwaitRefStatus;
                }
                // anything else before "unpack " is unexpected; skip it.
            }
            State::AwaitRefStatus => {
                if let Some(rest) = line.strip_prefix("ok ") {
                    self.accepted.push(rest.to_string());
                } else if let Some(rest) = line.strip_prefix("ng ") {
                    let (ref_name, reason) = rest
                        .split_once(' ')
                        .unwrap_or((rest, "unspecified reason"));
                    self.failures
                        .insert(ref_name.to_string(), reason.to_string());
                }
                // malformed ref-status line: skip, stay in this state.
            }
            State::Done => {}
        }
    }

    /// Mark the stream exhausted (flush received) and render the final
    /// result. Returns `Err` if the pack itself was rejected or any ref
    /// update failed; `Ok` lists the refs the server accepted.
    pub fn finalize(mut self) -> Result<Vec<String>, TransportError> {
        self.state = State::Done;
        match self.pack_status.as_deref() {
            Some("ok") => {}
            Some(reason) => return Err(TransportError::PackRejected(reason.to_string())),
            None => {
                return Err(TransportError::Protocol(
                    "report-status stream ended before an `unpack` line".to_string(),
                ));
            }
        }
        if !self.failures.is_empty() {
            return Err(TransportError::ref_updates_rejected(self.failures));
        }
        Ok(self.accepted)
    }
}

impl Default for ReportStatusParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_refs_accepted() {
        let mut p = ReportStatusParser::new();
        p.feed_line("unpack ok");
        p.feed_line("ok refs/heads/main");
        p.feed_line("ok refs/heads/dev");
        let accepted = p.finalize().unwrap();
        assert_eq!(accepted, vec!["refs/heads/main", "refs/heads/dev"]);
    }

    #[test]
    fn pack_rejected_short_circuits() {
        let mut p = ReportStatusParser::new();
        p.feed_line("unpack index-pack failed");
        let err = p.finalize().unwrap_err();
        assert!(matches!(err, TransportError::PackRejected(_)));
    }

    #[test]
    fn single_ref_rejected() {
        let mut p = ReportStatusParser::new();
        p.feed_line("unpack ok");
        p.feed_line("ok refs/heads/main");
        p.feed_line("ng refs/heads/dev non-fast-forward");
        let err = p.finalize().unwrap_err();
        match err {
            TransportError::RefUpdatesRejected(map) => {
                assert_eq!(map.get("refs/heads/dev").unwrap(), "non-fast-forward");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let mut p = ReportStatusParser::new();
        p.feed_line("unpack ok");
        p.feed_line("garbage line");
        p.feed_line("ok refs/heads/main");
        let accepted = p.finalize().unwrap();
        assert_eq!(accepted, vec!["refs/heads/main"]);
    }

    #[test]
    fn missing_unpack_line_is_protocol_error() {
        let p = ReportStatusParser::new();
        let err = p.finalize().unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }
}
