//! The `receive-pack` (push) conversation: ref advertisement, symmetric
//! change-set computation, update-command emission, pack streaming, and
//! report-status parsing.
//!
//! Ported from `dulwich.client.GitClient.send_pack` / `_handle_receive_pack_head`
//! and `_handle_receive_pack_tail`.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use tracing::debug;

use crate::capability::CapabilitySet;
use crate::config::ClientOptions;
use crate::error::TransportError;
use crate::fetch::RefAdvertisement;
use crate::id::{IdWidth, ObjectId};
use crate::pktline::{Framer, IncrementalParser, Packet};
use crate::report_status::ReportStatusParser;
use crate::sideband;

/// One requested ref change: `old` is the id the client believes the ref
/// currently has (the zero id to create it), `new` is the desired id (the
/// zero id to delete it). `old != new` is the only entry invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    pub name: String,
    pub old: ObjectId,
    pub new: ObjectId,
}

/// Computes the symmetric change set between the server's advertised refs and
/// the caller's desired ref map: for every ref in `old ∪ new`, a `RefUpdate`
/// where the two differ. Refs present only in `old` are deletions (`new` is
/// the zero id); refs present only in `new` are creations (`old` is the zero
/// id). Iteration order follows the advertisement first, then any
/// caller-only refs in the order `new_refs` presents them (spec.md §4.F
/// step 2).
pub fn compute_changeset(
    old_refs: &RefAdvertisement,
    new_refs: &BTreeMap<String, ObjectId>,
    width: IdWidth,
) -> Vec<RefUpdate> {
    let mut updates = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for r in &old_refs.refs {
        seen.insert(r.name.clone());
        let new_id = new_refs.get(&r.name).cloned().unwrap_or_else(|| ObjectId::zero(width));
        if new_id != r.id {
            updates.push(RefUpdate {
                name: r.name.clone(),
                old: r.id.clone(),
                new: new_id,
            });
        }
    }
    for (name, new_id) in new_refs {
        if seen.contains(name) {
            continue;
        }
        updates.push(RefUpdate {
            name: name.clone(),
            old: ObjectId::zero(width),
            new: new_id.clone(),
        });
    }
    updates
}

/// Runs the update-command exchange, streams the pack via `generate_pack`,
/// and parses the server's report-status response (spec.md §4.F).
///
/// `determine_wants` receives the advertised refs and returns the desired
/// post-push ref map; an empty map is a legal no-op push that performs no
/// further I/O beyond a bare flush. `generate_pack` is given the set of
/// objects the server already has (`have`, the advertised ids minus deleted
/// refs) and the set newly introduced (`want`, new non-zero ids the
/// advertisement didn't already list) and writes the pack bytes; it is
/// skipped entirely when `want` is empty (deletions only).
pub fn push<R: Read, W: Write>(
    framer: &mut Framer<R, W>,
    advertisement: &RefAdvertisement,
    options: &ClientOptions,
    determine_wants: impl FnOnce(&RefAdvertisement) -> BTreeMap<String, ObjectId>,
    generate_pack: impl FnOnce(&[ObjectId], &[ObjectId], &mut dyn Write) -> Result<(), TransportError>,
) -> Result<BTreeMap<String, ObjectId>, TransportError> {
    let new_refs = determine_wants(advertisement);
    if new_refs.is_empty() {
        framer.write_flush()?;
        return Ok(BTreeMap::new());
    }

    let width = advertisement
        .refs
        .first()
        .map(|r| r.id.width())
        .unwrap_or_default();
    let updates = compute_changeset(advertisement, &new_refs, width);

    let mut requested =
        CapabilitySet::from_tokens(["report-status", "side-band-64k", "ofs-delta"]);
    requested.insert(format!("agent={}", options.agent));
    let negotiated = requested.intersect(&advertisement.capabilities);

    for (i, update) in updates.iter().enumerate() {
        let line = format!("{} {} {}", update.old, update.new, update.name);
        if i == 0 {
            framer.write_packet_str(&format!("{line}\0{}\n", negotiated.render()))?;
        } else {
            framer.write_packet_str(&format!("{line}\n"))?;
        }
    }
    framer.write_flush()?;

    let already_present: std::collections::HashSet<&ObjectId> =
        advertisement.refs.iter().map(|r| &r.id).collect();
    let have: Vec<ObjectId> = advertisement.refs.iter().map(|r| r.id.clone()).collect();
    let want: Vec<ObjectId> = updates
        .iter()
        .filter(|u| !u.new.is_zero() && !already_present.contains(&u.new))
        .map(|u| u.new.clone())
        .collect();

    if !want.is_empty() {
        debug!(have = have.len(), want = want.len(), "streaming pack for push");
        let mut writer = RawWriter(framer);
        generate_pack(&have, &want, &mut writer)?;
    }

    let post_update: BTreeMap<String, ObjectId> = advertisement
        .refs
        .iter()
        .map(|r| (r.name.clone(), r.id.clone()))
        .chain(new_refs.iter().map(|(k, v)| (k.clone(), v.clone())))
        .collect();
    let post_update: BTreeMap<String, ObjectId> = post_update
        .into_iter()
        .filter(|(name, _)| {
            updates
                .iter()
                .find(|u| &u.name == name)
                .map(|u| !u.new.is_zero())
                .unwrap_or(true)
        })
        .map(|(name, id)| {
            let resolved = new_refs.get(&name).cloned().unwrap_or(id);
            (name, resolved)
        })
        .collect();

    if !negotiated.has("report-status") {
        // Nothing further is expected on the wire; success is inferred from
        // a clean EOF, so we have to actually read for one rather than just
        // assuming it (spec.md §9 "Degradation", §4.F step 8).
        framer.expect_eof()?;
        return Ok(post_update);
    }

    let mut parser = ReportStatusParser::new();
    if negotiated.has("side-band-64k") || negotiated.has("side-band") {
        let mut incremental = IncrementalParser::new();
        sideband::drain(
            &mut || framer.read_packet(),
            |data| {
                for packet in incremental.feed(data)? {
                    feed_report_line(&mut parser, &packet)?;
                }
                Ok(())
            },
            |_progress| {},
        )?;
    } else {
        loop {
            match framer.read_packet()? {
                Packet::Flush => break,
                Packet::Data(line) => feed_report_line(&mut parser, &Packet::Data(line))?,
            }
        }
    }
    framer.expect_eof()?;

    parser.finalize()?;
    Ok(post_update)
}

fn feed_report_line(parser: &mut ReportStatusParser, packet: &Packet) -> Result<(), TransportError> {
    if let Packet::Data(bytes) = packet {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| TransportError::protocol("report-status line is not valid UTF-8"))?;
        parser.feed_line(text);
    }
    Ok(())
}

/// Adapts a [`Framer`]'s raw-write path to `&mut dyn Write` for the caller's
/// pack generator, so pack bytes still flow through the same activity hook
/// as every other write on the connection.
struct RawWriter<'a, R, W>(&'a mut Framer<R, W>);

impl<'a, R, W: Write> Write for RawWriter<'a, R, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .write_raw(buf)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn advertisement_with(
        refs: Vec<(&str, &str)>,
        caps: &[&str],
    ) -> RefAdvertisement {
        RefAdvertisement {
            refs: refs
                .into_iter()
                .map(|(name, id)| crate::fetch::AdvertisedRef {
                    id: id.parse().unwrap(),
                    name: name.to_string(),
                })
                .collect(),
            capabilities: CapabilitySet::from_tokens(caps.iter().copied()),
        }
    }

    #[test]
    fn changeset_detects_creation_update_and_deletion() {
        let advertisement = advertisement_with(
            vec![
                ("refs/heads/main", &"a".repeat(40)),
                ("refs/heads/stale", &"b".repeat(40)),
            ],
            &[],
        );
        let mut new_refs = BTreeMap::new();
        new_refs.insert("refs/heads/main".to_string(), "c".repeat(40).parse().unwrap());
        new_refs.insert("refs/heads/stale".to_string(), ObjectId::zero(IdWidth::Sha1));
        new_refs.insert("refs/heads/new".to_string(), "d".repeat(40).parse().unwrap());

        let updates = compute_changeset(&advertisement, &new_refs, IdWidth::Sha1);
        assert_eq!(updates.len(), 3);
        let by_name = |n: &str| updates.iter().find(|u| u.name == n).unwrap();
        assert_eq!(by_name("refs/heads/main").new.as_str(), "c".repeat(40));
        assert!(by_name("refs/heads/stale").new.is_zero());
        assert!(by_name("refs/heads/new").old.is_zero());
    }

    #[test]
    fn empty_determine_wants_sends_bare_flush_and_returns_empty_map() {
        let mut buf = Vec::new();
        let mut f = Framer::new(Cursor::new(Vec::new()), &mut buf);
        let advertisement = advertisement_with(vec![], &["report-status"]);
        let options = ClientOptions::default();
        let result = push(
            &mut f,
            &advertisement,
            &options,
            |_ad| BTreeMap::new(),
            |_have, _want, _w| panic!("pack generator should not run"),
        )
        .unwrap();
        assert!(result.is_empty());
        assert_eq!(buf, b"0000");
    }

    #[test]
    fn single_create_without_report_status_infers_success() {
        let mut buf = Vec::new();
        let mut f = Framer::new(Cursor::new(Vec::new()), &mut buf);
        let advertisement = advertisement_with(vec![], &["ofs-delta"]);
        let options = ClientOptions::default();
        let new_id: ObjectId = "a".repeat(40).parse().unwrap();
        let result = push(
            &mut f,
            &advertisement,
            &options,
            |_ad| {
                let mut m = BTreeMap::new();
                m.insert("refs/heads/main".to_string(), new_id.clone());
                m
            },
            |_have, _want, w| w.write_all(b"PACKDATA").map_err(TransportError::Io),
        )
        .unwrap();
        assert_eq!(result.get("refs/heads/main").unwrap().as_str(), "a".repeat(40));
        assert!(buf.ends_with(b"PACKDATA"));
    }

    #[test]
    fn report_status_without_sideband_is_parsed() {
        let mut response = Vec::new();
        {
            let mut f = Framer::new(Cursor::new(Vec::new()), &mut response);
            f.write_packet_str("unpack ok\n").unwrap();
            f.write_packet_str("ok refs/heads/main\n").unwrap();
            f.write_flush().unwrap();
        }
        let mut to_server = Vec::new();
        let mut f = Framer::new(Cursor::new(response), &mut to_server);
        let advertisement = advertisement_with(vec![], &["report-status"]);
        let options = ClientOptions::default();
        let new_id: ObjectId = "a".repeat(40).parse().unwrap();
        let result = push(
            &mut f,
            &advertisement,
            &options,
            |_ad| {
                let mut m = BTreeMap::new();
                m.insert("refs/heads/main".to_string(), new_id.clone());
                m
            },
            |_have, _want, w| w.write_all(b"PACKDATA").map_err(TransportError::Io),
        )
        .unwrap();
        assert_eq!(result.get("refs/heads/main").unwrap().as_str(), "a".repeat(40));
    }

    #[test]
    fn rejected_ref_surfaces_as_error() {
        let mut response = Vec::new();
        {
            let mut f = Framer::new(Cursor::new(Vec::new()), &mut response);
            f.write_packet_str("unpack ok\n").unwrap();
            f.write_packet_str("ng refs/heads/main non-fast-forward\n")
                .unwrap();
            f.write_flush().unwrap();
        }
        let mut to_server = Vec::new();
        let mut f = Framer::new(Cursor::new(response), &mut to_server);
        let advertisement = advertisement_with(vec![], &["report-status"]);
        let options = ClientOptions::default();
        let new_id: ObjectId = "a".repeat(40).parse().unwrap();
        let err = push(
            &mut f,
            &advertisement,
            &options,
            |_ad| {
                let mut m = BTreeMap::new();
                m.insert("refs/heads/main".to_string(), new_id.clone());
                m
            },
            |_have, _want, w| w.write_all(b"PACKDATA").map_err(TransportError::Io),
        )
        .unwrap_err();
        assert!(matches!(err, TransportError::RefUpdatesRejected(_)));
    }
}
