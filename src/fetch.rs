//! The `upload-pack` (fetch) conversation: ref advertisement, capability
//! negotiation, the want/have exchange, and pack reception.
//!
//! Ported from `dulwich.client.GitClient.fetch_pack` / `_handle_upload_pack_head`
//! and `_handle_upload_pack_tail`. Collaborators (`determine_wants`, the graph
//! walker, the pack sink) are expressed as plain closures/trait objects rather
//! than subclasses, per spec.md §9 ("Callbacks vs iterators").

use std::io::{Read, Write};

use tracing::{debug, info, trace};

use crate::capability::{self, CapabilitySet};
use crate::config::ClientOptions;
use crate::error::TransportError;
use crate::id::ObjectId;
use crate::pktline::{Framer, Packet};
use crate::sideband;

/// One advertised ref: its object id and full ref name (e.g. `refs/heads/main`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisedRef {
    pub id: ObjectId,
    pub name: String,
}

/// The parsed ref advertisement that opens every conversation.
#[derive(Debug, Clone)]
pub struct RefAdvertisement {
    pub refs: Vec<AdvertisedRef>,
    pub capabilities: CapabilitySet,
}

impl RefAdvertisement {
    pub fn find(&self, name: &str) -> Option<&ObjectId> {
        self.refs.iter().find(|r| r.name == name).map(|r| &r.id)
    }
}

/// A client-side oracle over the local commit graph: `next()` yields locally
/// known ids the server should be asked about, `ack` is invoked when the
/// server confirms it already has a given id (spec.md §6, "Graph walker").
pub trait GraphWalker {
    fn next(&mut self) -> Option<ObjectId>;
    fn ack(&mut self, id: &ObjectId);
}

/// A graph walker with nothing to offer: every fetch degrades correctly to a
/// full clone when the caller has no local history to negotiate from
/// (spec.md §4.E, "the graph walker may yield null on first call").
pub struct EmptyGraphWalker;

impl GraphWalker for EmptyGraphWalker {
    fn next(&mut self) -> Option<ObjectId> {
        None
    }
    fn ack(&mut self, _id: &ObjectId) {}
}

/// Reads the flush-terminated ref advertisement. An `"ERR <reason>"` first
/// line is a server-side refusal (spec.md §3) and is raised immediately,
/// before any negotiation output. An empty-repository advertisement is a
/// single `<zero-id> capabilities^{}\0<caps>` line (spec.md §4.D edge case)
/// and contributes no ref.
pub fn read_ref_advertisement<R: Read, W: Write>(
    framer: &mut Framer<R, W>,
) -> Result<RefAdvertisement, TransportError> {
    let lines = framer.read_sequence()?;
    let mut refs = Vec::new();
    let mut capabilities = CapabilitySet::new();

    for (i, raw) in lines.iter().enumerate() {
        let line = std::str::from_utf8(raw)
            .map_err(|_| TransportError::protocol("ref advertisement line is not valid UTF-8"))?
            .trim_end_matches('\n');

        if i == 0 {
            if let Some(reason) = line.strip_prefix("ERR ") {
                return Err(TransportError::ServerRefused(reason.to_string()));
            }
        }

        let line = if i == 0 {
            let (bare, caps) = capability::extract(line);
            capabilities = caps;
            bare
        } else {
            line
        };

        let (id_str, name) = line
            .split_once(' ')
            .ok_or_else(|| TransportError::protocol(format!("malformed ref line `{line}`")))?;

        if name == "capabilities^{}" {
            continue;
        }

        let id = id_str.parse::<ObjectId>()?;
        refs.push(AdvertisedRef {
            id,
            name: name.to_string(),
        });
    }

    Ok(RefAdvertisement { refs, capabilities })
}

/// Runs the want/have negotiation and drains the resulting pack into
/// `pack_sink`, returning the ref advertisement unchanged (spec.md §4.E).
///
/// `can_read` is the advisory non-blocking probe used to interleave ACK
/// reads with `have` sends (spec.md §5); returning `Ok(false)` unconditionally
/// degrades correctly to the synchronous have/ack loop.
#[allow(clippy::too_many_arguments)]
pub fn fetch<R: Read, W: Write>(
    framer: &mut Framer<R, W>,
    options: &ClientOptions,
    determine_wants: impl FnOnce(&[AdvertisedRef]) -> Vec<ObjectId>,
    graph_walker: &mut dyn GraphWalker,
    mut pack_sink: impl FnMut(&[u8]),
    mut progress: Option<&mut dyn FnMut(&[u8])>,
    mut can_read: impl FnMut() -> Result<bool, TransportError>,
) -> Result<RefAdvertisement, TransportError> {
    let advertisement = read_ref_advertisement(framer)?;

    let wants = determine_wants(&advertisement.refs);
    if wants.is_empty() {
        framer.write_flush()?;
        return Ok(advertisement);
    }

    let mut requested = CapabilitySet::from_tokens(["multi_ack", "side-band-64k", "ofs-delta"]);
    if options.thin_packs {
        requested.insert("thin-pack");
    }
    requested.insert(format!("agent={}", options.agent));
    let negotiated = requested.intersect(&advertisement.capabilities);

    for (i, want) in wants.iter().enumerate() {
        if i == 0 {
            framer.write_packet_str(&format!("want {} {}\n", want, negotiated.render()))?;
        } else {
            framer.write_packet_str(&format!("want {want}\n"))?;
        }
    }
    framer.write_flush()?;

    // Have/ACK loop: for every id the walker offers, send `have` and poll
    // non-blockingly for an interim ACK, per spec.md §4.E step 4.
    while let Some(have_id) = graph_walker.next() {
        framer.write_packet_str(&format!("have {have_id}\n"))?;
        if can_read()? {
            if let Packet::Data(line) = framer.read_packet()? {
                let text = String::from_utf8_lossy(&line);
                let text = text.trim_end();
                if let Some(rest) = text.strip_prefix("ACK ") {
                    let (id_str, suffix) = rest.split_once(' ').unwrap_or((rest, ""));
                    if suffix == "continue" {
                        if let Ok(id) = id_str.parse::<ObjectId>() {
                            graph_walker.ack(&id);
                        }
                    }
                }
            }
        }
    }

    framer.write_packet_str("done\n")?;
    debug!(wants = wants.len(), "sent done, awaiting final acks");

    // Trailing ACKs/NAK until a non-continue line terminates negotiation.
    loop {
        match framer.read_packet()? {
            Packet::Flush => break,
            Packet::Data(line) => {
                let text = String::from_utf8_lossy(&line);
                let text = text.trim_end().to_string();
                trace!(%text, "final negotiation line");
                if text == "NAK" {
                    break;
                }
                if let Some(rest) = text.strip_prefix("ACK ") {
                    let (id_str, suffix) = rest.split_once(' ').unwrap_or((rest, ""));
                    if suffix == "continue" {
                        if let Ok(id) = id_str.parse::<ObjectId>() {
                            graph_walker.ack(&id);
                        }
                        continue;
                    }
                }
                break;
            }
        }
    }

    if negotiated.has("side-band-64k") || negotiated.has("side-band") {
        sideband::drain(
            &mut || framer.read_packet(),
            |data| {
                pack_sink(data);
                Ok(())
            },
            |chunk| {
                if let Some(p) = progress.as_mut() {
                    p(chunk);
                }
            },
        )?;
    } else {
        let mut buf = [0u8; 65536];
        loop {
            let n = framer.read_raw(&mut buf)?;
            if n == 0 {
                break;
            }
            pack_sink(&buf[..n]);
        }
    }

    // The pack (and, for side-band, the flush ending the multiplexed stream)
    // should be the last thing the server sends; anything after it is a
    // framing violation (spec.md §4.E step 7, §7 "unexpected trailing bytes").
    framer.expect_eof()?;

    info!("fetch complete");
    Ok(advertisement)
}
