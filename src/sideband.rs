//! Side-band demultiplexing: once the server advertises `side-band` or
//! `side-band-64k`, every pkt-line after negotiation carries a one-byte
//! channel prefix instead of raw payload. Grounded in the teacher's
//! `protocol::utils` side-band handling and `dulwich.client._read_side_band64k_data`.

use crate::error::TransportError;
use crate::pktline::Packet;

/// The three channels the protocol defines. Channel 1 carries whatever the
/// conversation is actually transferring (pack data on fetch, the nested
/// report-status pkt-lines on push); channel 2 is free-form progress text;
/// channel 3 is a fatal error that ends the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Data,
    Progress,
    FatalError,
}

impl Channel {
    fn from_byte(b: u8) -> Result<Self, TransportError> {
        match b {
            1 => Ok(Channel::Data),
            2 => Ok(Channel::Progress),
            3 => Ok(Channel::FatalError),
            other => Err(TransportError::protocol(format!(
                "unknown side-band channel {other}"
            ))),
        }
    }
}

/// Splits one side-band pkt-line payload into its channel and the bytes that
/// follow the channel byte. A flush packet ends the multiplexed stream.
pub fn demux(packet: &Packet) -> Result<Option<(Channel, &[u8])>, TransportError> {
    match packet {
        Packet::Flush => Ok(None),
        Packet::Data(bytes) => {
            let (&chan, rest) = bytes
                .split_first()
                .ok_or_else(|| TransportError::protocol("empty side-band packet"))?;
            Ok(Some((Channel::from_byte(chan)?, rest)))
        }
    }
}

/// Drives a side-band-demultiplexed read loop, dispatching each channel's
/// payload to the matching handler. `on_progress` is advisory and may be a
/// no-op; channel 3 always ends the loop with a fatal `TransportError::Protocol`
/// (spec.md §7: side-band errors are a framing-level fault, distinct from the
/// `"ERR <reason>"` ref-advertisement refusal that raises `ServerRefused`).
pub fn drain(
    read_packet: &mut dyn FnMut() -> Result<Packet, TransportError>,
    mut on_data: impl FnMut(&[u8]) -> Result<(), TransportError>,
    mut on_progress: impl FnMut(&[u8]),
) -> Result<(), TransportError> {
    loop {
        let packet = read_packet()?;
        match demux(&packet)? {
            None => return Ok(()),
            Some((Channel::Data, payload)) => on_data(payload)?,
            Some((Channel::Progress, payload)) => on_progress(payload),
            Some((Channel::FatalError, payload)) => {
                return Err(TransportError::protocol(format!(
                    "side-band channel 3 fatal error: {}",
                    String::from_utf8_lossy(payload).trim_end()
                )));
            }
        }
    }
}
