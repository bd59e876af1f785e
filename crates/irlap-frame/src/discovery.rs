//! Slotted discovery (XID) exchange.
//!
//! Wire layout of a discovery frame:
//! ```text
//! ┌───────┬─────────┬───────┬───────────┬───────────┬───────┬──────┬─────────┬──────────────┐
//! │ caddr │ control │ ident │ saddr(4B) │ daddr(4B) │ flags │ slot │ version │ info (opt.)  │
//! │ 0xFE  │ XID     │ 0x01  │ LE        │ LE        │ S     │ s    │ 0x00    │              │
//! └───────┴─────────┴───────┴───────────┴───────────┴───────┴──────┴─────────┴──────────────┘
//! info = hint0 [hint1 if hint0 & 0x80] charset nickname...
//! ```

use std::borrow::Cow;
use std::time::Instant;

use bytes::{BufMut, BytesMut};

use crate::codec::{
    encode_header, FrameKind, StationPair, BROADCAST, CBROADCAST, LAP_HEADER_LEN, PF_BIT,
    XID_CMD, XID_RSP,
};
use crate::error::{FrameError, Result};

/// Format identifier for discovery XID frames.
pub const XID_FORMAT: u8 = 0x01;
/// Header through version byte.
pub const XID_FRAME_LEN: usize = LAP_HEADER_LEN + 12;
/// Set in the first hint byte when a second hint byte follows.
pub const HINT_EXTENSION: u8 = 0x80;
/// Longest nickname carried in a discovery frame.
pub const NICKNAME_MAX_LEN: usize = 21;
/// Slot marker of the final discovery command, which carries information.
pub const FINAL_SLOT: u8 = 0xFF;
/// Smallest information block on a final-slot command.
pub const MIN_FINAL_INFO_LEN: usize = 3;
/// Slot counts indexed by their two-bit flag encoding.
pub const SLOT_COUNTS: [u8; 4] = [1, 6, 8, 16];

/// Two-bit flags value for a slot count. Unrecognized counts use 8 slots.
pub fn slot_flags(slots: u8) -> u8 {
    match slots {
        1 => 0x00,
        6 => 0x01,
        8 => 0x02,
        16 => 0x03,
        _ => 0x02,
    }
}

/// Slot count encoded in a flags byte.
pub fn slots_from_flags(flags: u8) -> u8 {
    SLOT_COUNTS[usize::from(flags & 0x03)]
}

/// What a station learned about a peer from one discovery frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    /// The peer's device address.
    pub daddr: u32,
    /// Our own device address.
    pub saddr: u32,
    /// Service hints; `hints[1]` is only meaningful when `hints[0]` has
    /// [`HINT_EXTENSION`] set.
    pub hints: [u8; 2],
    pub charset: u8,
    /// Nickname bytes in `charset`, at most [`NICKNAME_MAX_LEN`] long.
    pub nickname: Vec<u8>,
    pub timestamp: Instant,
}

impl Discovery {
    /// Describe the local station for outgoing discovery frames.
    pub fn new(saddr: u32, nickname: impl AsRef<[u8]>) -> Self {
        let nickname = nickname.as_ref();
        let len = nickname.len().min(NICKNAME_MAX_LEN);
        Self {
            daddr: BROADCAST,
            saddr,
            hints: [0, 0],
            charset: 0,
            nickname: nickname[..len].to_vec(),
            timestamp: Instant::now(),
        }
    }

    pub fn with_hints(mut self, hints: [u8; 2]) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_charset(mut self, charset: u8) -> Self {
        self.charset = charset;
        self
    }

    /// Address replies to this peer.
    pub fn with_daddr(mut self, daddr: u32) -> Self {
        self.daddr = daddr;
        self
    }

    pub fn has_extended_hints(&self) -> bool {
        self.hints[0] & HINT_EXTENSION != 0
    }

    pub fn nickname_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.nickname)
    }
}

/// Fixed part of a received discovery frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XidHeader {
    pub stations: StationPair,
    pub slots: u8,
    pub slot: u8,
    pub version: u8,
}

/// Build a discovery frame.
///
/// A command goes to the broadcast station address; a response goes to
/// `discovery.daddr`. Responses and the final-slot command carry the
/// information block.
pub fn encode_xid(
    dst: &mut BytesMut,
    saddr: u32,
    slots: u8,
    slot: u8,
    command: bool,
    discovery: &Discovery,
) {
    dst.reserve(XID_FRAME_LEN + 3 + NICKNAME_MAX_LEN);
    let control = if command { XID_CMD } else { XID_RSP };
    encode_header(dst, CBROADCAST, command, control | PF_BIT);
    dst.put_u8(XID_FORMAT);

    let daddr = if command { BROADCAST } else { discovery.daddr };
    StationPair::new(saddr, daddr).put(dst);
    dst.put_u8(slot_flags(slots));
    dst.put_u8(slot);
    dst.put_u8(0x00);

    if !command || slot == FINAL_SLOT {
        if discovery.has_extended_hints() {
            dst.put_slice(&discovery.hints);
        } else {
            dst.put_u8(discovery.hints[0]);
        }
        dst.put_u8(discovery.charset);
        let len = discovery.nickname.len().min(NICKNAME_MAX_LEN);
        dst.put_slice(&discovery.nickname[..len]);
    }
}

/// Parse the fixed part of a discovery frame.
pub fn decode_xid_header(frame: &[u8]) -> Result<XidHeader> {
    if frame.len() < XID_FRAME_LEN {
        return Err(FrameError::Truncated {
            kind: FrameKind::Xid,
            need: XID_FRAME_LEN,
            got: frame.len(),
        });
    }
    let stations = StationPair::read(frame, 3).ok_or(FrameError::Truncated {
        kind: FrameKind::Xid,
        need: XID_FRAME_LEN,
        got: frame.len(),
    })?;
    Ok(XidHeader {
        stations,
        slots: slots_from_flags(frame[11]),
        slot: frame[12],
        version: frame[13],
    })
}

/// Parse a discovery information block sent by `daddr` to `saddr`.
///
/// The nickname ends at the first NUL byte or at the end of the block and
/// is capped at [`NICKNAME_MAX_LEN`]; nothing is read past `info`.
pub fn decode_info(info: &[u8], daddr: u32, saddr: u32) -> Result<Discovery> {
    let truncated = |need: usize| FrameError::Truncated {
        kind: FrameKind::Xid,
        need: XID_FRAME_LEN + need,
        got: XID_FRAME_LEN + info.len(),
    };

    let hint0 = *info.first().ok_or_else(|| truncated(2))?;
    let (hints, charset, text_start) = if hint0 & HINT_EXTENSION != 0 {
        if info.len() < 3 {
            return Err(truncated(3));
        }
        ([hint0, info[1]], info[2], 3)
    } else {
        if info.len() < 2 {
            return Err(truncated(2));
        }
        ([hint0, 0], info[1], 2)
    };

    let text = &info[text_start..];
    let end = text
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(text.len())
        .min(NICKNAME_MAX_LEN);

    Ok(Discovery {
        daddr,
        saddr,
        hints,
        charset,
        nickname: text[..end].to_vec(),
        timestamp: Instant::now(),
    })
}
