use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// Command/response bit in the connection-address byte.
pub const CMD_FRAME: u8 = 0x01;
/// Broadcast connection address (upper seven bits all set).
pub const CBROADCAST: u8 = 0xFE;
/// Broadcast device (station) address.
pub const BROADCAST: u32 = 0xFFFF_FFFF;
/// Poll/final bit in the control byte.
pub const PF_BIT: u8 = 0x10;

/// Information frame (low bit clear).
pub const I_FRAME: u8 = 0x00;

/// Supervisory frames (low bits `01`).
pub const RR: u8 = 0x01;
pub const RNR: u8 = 0x05;
pub const REJ: u8 = 0x09;
pub const SREJ: u8 = 0x0D;

/// Unnumbered frames (low bits `11`), poll/final bit clear.
pub const SNRM_CMD: u8 = 0x83;
pub const DISC_CMD: u8 = 0x43;
pub const RD_RSP: u8 = 0x43;
pub const XID_CMD: u8 = 0x2F;
pub const XID_RSP: u8 = 0xAF;
pub const TEST_CMD: u8 = 0xE3;
pub const TEST_RSP: u8 = 0xE3;
pub const UA_RSP: u8 = 0x63;
pub const DM_RSP: u8 = 0x0F;
pub const FRMR_RSP: u8 = 0x87;
pub const UI_FRAME: u8 = 0x03;

/// Connection-address byte + control byte.
pub const LAP_HEADER_LEN: usize = 2;
/// Source + destination device addresses.
pub const STATION_PAIR_LEN: usize = 8;
/// SNRM: header, station pair, new connection address.
pub const SNRM_FRAME_LEN: usize = LAP_HEADER_LEN + STATION_PAIR_LEN + 1;
/// UA: header, station pair.
pub const UA_FRAME_LEN: usize = LAP_HEADER_LEN + STATION_PAIR_LEN;
/// Broadcast TEST: header, station pair.
pub const TEST_FRAME_LEN: usize = LAP_HEADER_LEN + STATION_PAIR_LEN;
/// FRMR: header, rejected control field, cause flags.
pub const FRMR_FRAME_LEN: usize = LAP_HEADER_LEN + 2;

/// Frame types the codec knows how to build and parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    I,
    Rr,
    Rnr,
    Rej,
    Srej,
    Snrm,
    Ua,
    Dm,
    Disc,
    Xid,
    Test,
    Frmr,
    Ui,
    /// Anything shorter than the two-byte header.
    Header,
}

impl FrameKind {
    pub fn name(self) -> &'static str {
        match self {
            FrameKind::I => "I",
            FrameKind::Rr => "RR",
            FrameKind::Rnr => "RNR",
            FrameKind::Rej => "REJ",
            FrameKind::Srej => "SREJ",
            FrameKind::Snrm => "SNRM",
            FrameKind::Ua => "UA",
            FrameKind::Dm => "DM",
            FrameKind::Disc => "DISC",
            FrameKind::Xid => "XID",
            FrameKind::Test => "TEST",
            FrameKind::Frmr => "FRMR",
            FrameKind::Ui => "UI",
            FrameKind::Header => "LAP",
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The four supervisory frame types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupervisoryKind {
    Rr,
    Rnr,
    Rej,
    Srej,
}

impl SupervisoryKind {
    /// Control value with Nr and poll/final clear.
    pub fn code(self) -> u8 {
        match self {
            SupervisoryKind::Rr => RR,
            SupervisoryKind::Rnr => RNR,
            SupervisoryKind::Rej => REJ,
            SupervisoryKind::Srej => SREJ,
        }
    }

    /// Select by the low nibble of a supervisory control byte.
    pub fn from_control(control: u8) -> Option<Self> {
        match control & 0x0F {
            RR => Some(SupervisoryKind::Rr),
            RNR => Some(SupervisoryKind::Rnr),
            REJ => Some(SupervisoryKind::Rej),
            SREJ => Some(SupervisoryKind::Srej),
            _ => None,
        }
    }

    pub fn frame_kind(self) -> FrameKind {
        match self {
            SupervisoryKind::Rr => FrameKind::Rr,
            SupervisoryKind::Rnr => FrameKind::Rnr,
            SupervisoryKind::Rej => FrameKind::Rej,
            SupervisoryKind::Srej => FrameKind::Srej,
        }
    }
}

/// Receive sequence number carried in bits 5-7.
pub fn nr_of(control: u8) -> u8 {
    control >> 5
}

/// Send sequence number carried in bits 1-3 of an I frame.
pub fn ns_of(control: u8) -> u8 {
    (control >> 1) & 0x07
}

pub fn is_pf(control: u8) -> bool {
    control & PF_BIT != 0
}

/// Control byte of an Information frame.
pub fn i_control(ns: u8, nr: u8, pf: bool) -> u8 {
    I_FRAME | ((ns & 0x07) << 1) | ((nr & 0x07) << 5) | pf_bit(pf)
}

/// Control byte of a supervisory frame.
pub fn s_control(kind: SupervisoryKind, nr: u8, pf: bool) -> u8 {
    kind.code() | ((nr & 0x07) << 5) | pf_bit(pf)
}

/// Connection-address byte: seven-bit address plus command/response flag.
pub fn address_byte(caddr: u8, command: bool) -> u8 {
    (caddr & CBROADCAST) | if command { CMD_FRAME } else { 0 }
}

fn pf_bit(pf: bool) -> u8 {
    if pf {
        PF_BIT
    } else {
        0
    }
}

/// The fixed two-byte link header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Connection address with the command bit masked off.
    pub caddr: u8,
    pub command: bool,
    /// Control byte with the poll/final bit masked off.
    pub control: u8,
    pub pf: bool,
}

impl Header {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < LAP_HEADER_LEN {
            return Err(FrameError::Truncated {
                kind: FrameKind::Header,
                need: LAP_HEADER_LEN,
                got: buf.len(),
            });
        }
        Ok(Self {
            caddr: buf[0] & CBROADCAST,
            command: buf[0] & CMD_FRAME != 0,
            control: buf[1] & !PF_BIT,
            pf: buf[1] & PF_BIT != 0,
        })
    }

    /// Control byte as it appeared on the wire.
    pub fn raw_control(&self) -> u8 {
        self.control | pf_bit(self.pf)
    }

    pub fn is_broadcast(&self) -> bool {
        self.caddr == CBROADCAST
    }
}

/// Source and destination device addresses, little-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationPair {
    /// The sending station.
    pub source: u32,
    /// The station the frame is meant for.
    pub destination: u32,
}

impl StationPair {
    pub fn new(source: u32, destination: u32) -> Self {
        Self {
            source,
            destination,
        }
    }

    pub fn put(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.source);
        dst.put_u32_le(self.destination);
    }

    /// Read a pair starting at `offset`, if the buffer is long enough.
    pub fn read(buf: &[u8], offset: usize) -> Option<Self> {
        let bytes = buf.get(offset..offset + STATION_PAIR_LEN)?;
        let (source, destination) = bytes.split_at(4);
        Some(Self {
            source: u32::from_le_bytes(source.try_into().ok()?),
            destination: u32::from_le_bytes(destination.try_into().ok()?),
        })
    }

    /// Whether `station` should accept a frame with this pair.
    pub fn targets(&self, station: u32) -> bool {
        self.destination == station || self.destination == BROADCAST
    }
}

/// W/X/Y/Z cause flags of a Frame-Reject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrmrCauses {
    /// Rejected control field undefined or not implemented.
    pub w: bool,
    /// Control field carried a non-permitted I field.
    pub x: bool,
    /// I field exceeded the negotiated maximum.
    pub y: bool,
    /// Control field carried an invalid Nr.
    pub z: bool,
}

impl FrmrCauses {
    pub fn from_bits(bits: u8) -> Self {
        Self {
            w: bits & 0x01 != 0,
            x: bits & 0x02 != 0,
            y: bits & 0x04 != 0,
            z: bits & 0x08 != 0,
        }
    }

    pub fn bits(&self) -> u8 {
        (self.w as u8) | (self.x as u8) << 1 | (self.y as u8) << 2 | (self.z as u8) << 3
    }
}

pub fn encode_header(dst: &mut BytesMut, caddr: u8, command: bool, control: u8) {
    dst.put_u8(address_byte(caddr, command));
    dst.put_u8(control);
}

/// SNRM command. With `connect`, the frame goes to the broadcast address and
/// carries the station pair and the new connection address; negotiation
/// parameters are appended by the caller.
pub fn encode_snrm(dst: &mut BytesMut, caddr: u8, connect: Option<(StationPair, u8)>) {
    match connect {
        Some((stations, ncaddr)) => {
            dst.reserve(SNRM_FRAME_LEN);
            encode_header(dst, CBROADCAST, true, SNRM_CMD | PF_BIT);
            stations.put(dst);
            dst.put_u8(ncaddr & CBROADCAST);
        }
        None => encode_header(dst, caddr, true, SNRM_CMD | PF_BIT),
    }
}

/// UA response carrying the station pair.
pub fn encode_ua(dst: &mut BytesMut, caddr: u8, stations: StationPair) {
    dst.reserve(UA_FRAME_LEN);
    encode_header(dst, caddr, false, UA_RSP | PF_BIT);
    stations.put(dst);
}

pub fn encode_dm(dst: &mut BytesMut, caddr: u8) {
    encode_header(dst, caddr, false, DM_RSP | PF_BIT);
}

pub fn encode_disc(dst: &mut BytesMut, caddr: u8) {
    encode_header(dst, caddr, true, DISC_CMD | PF_BIT);
}

pub fn encode_rd(dst: &mut BytesMut, caddr: u8) {
    encode_header(dst, caddr, false, RD_RSP | PF_BIT);
}

pub fn encode_supervisory(
    dst: &mut BytesMut,
    caddr: u8,
    command: bool,
    kind: SupervisoryKind,
    nr: u8,
    pf: bool,
) {
    encode_header(dst, caddr, command, s_control(kind, nr, pf));
}

pub fn encode_i(
    dst: &mut BytesMut,
    caddr: u8,
    command: bool,
    ns: u8,
    nr: u8,
    pf: bool,
    payload: &[u8],
) {
    dst.reserve(LAP_HEADER_LEN + payload.len());
    encode_header(dst, caddr, command, i_control(ns, nr, pf));
    dst.put_slice(payload);
}

pub fn encode_ui(dst: &mut BytesMut, caddr: u8, command: bool, pf: bool, payload: &[u8]) {
    dst.reserve(LAP_HEADER_LEN + payload.len());
    encode_header(dst, caddr, command, UI_FRAME | pf_bit(pf));
    dst.put_slice(payload);
}

/// TEST response. Broadcast frames carry the station pair, unicast ones do not.
pub fn encode_test(dst: &mut BytesMut, caddr: u8, stations: Option<StationPair>, payload: &[u8]) {
    dst.reserve(TEST_FRAME_LEN + payload.len());
    encode_header(dst, caddr, false, TEST_RSP | PF_BIT);
    if let Some(stations) = stations {
        stations.put(dst);
    }
    dst.put_slice(payload);
}

pub fn encode_frmr(dst: &mut BytesMut, caddr: u8, rejected_control: u8, causes: FrmrCauses) {
    dst.reserve(FRMR_FRAME_LEN);
    encode_header(dst, caddr, false, FRMR_RSP | PF_BIT);
    dst.put_u8(rejected_control);
    dst.put_u8(causes.bits());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i_control_roundtrips_sequence_fields() {
        for ns in 0..8 {
            for nr in 0..8 {
                for pf in [false, true] {
                    let control = i_control(ns, nr, pf);
                    assert_eq!(control & 0x01, 0, "I frames keep the low bit clear");
                    assert_eq!(ns_of(control), ns);
                    assert_eq!(nr_of(control), nr);
                    assert_eq!(is_pf(control), pf);
                }
            }
        }
    }

    #[test]
    fn s_control_roundtrips_nr_and_kind() {
        let kinds = [
            SupervisoryKind::Rr,
            SupervisoryKind::Rnr,
            SupervisoryKind::Rej,
            SupervisoryKind::Srej,
        ];
        for kind in kinds {
            for nr in 0..8 {
                let control = s_control(kind, nr, true);
                assert_eq!(control & 0x03, 0x01);
                assert_eq!(SupervisoryKind::from_control(control), Some(kind));
                assert_eq!(nr_of(control), nr);
                assert!(is_pf(control));
            }
        }
    }

    #[test]
    fn address_byte_masks_and_flags() {
        assert_eq!(address_byte(0x02, true), 0x03);
        assert_eq!(address_byte(0x03, false), 0x02);
        assert_eq!(address_byte(CBROADCAST, true), 0xFF);
    }

    #[test]
    fn header_parse_strips_flags() {
        let header = Header::parse(&[0x05, 0x93]).unwrap();
        assert_eq!(header.caddr, 0x04);
        assert!(header.command);
        assert_eq!(header.control, SNRM_CMD);
        assert!(header.pf);
        assert_eq!(header.raw_control(), 0x93);
        assert!(!header.is_broadcast());
    }

    #[test]
    fn header_parse_rejects_short_buffer() {
        let err = Header::parse(&[0xFF]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                kind: FrameKind::Header,
                need: 2,
                got: 1
            }
        ));
    }

    #[test]
    fn station_pair_is_little_endian() {
        let mut buf = BytesMut::new();
        StationPair::new(0xAABBCCDD, 0x11223344).put(&mut buf);
        assert_eq!(
            buf.as_ref(),
            &[0xDD, 0xCC, 0xBB, 0xAA, 0x44, 0x33, 0x22, 0x11]
        );
        assert_eq!(
            StationPair::read(&buf, 0),
            Some(StationPair::new(0xAABBCCDD, 0x11223344))
        );
        assert_eq!(StationPair::read(&buf, 1), None);
    }

    #[test]
    fn station_pair_targets_self_or_broadcast() {
        assert!(StationPair::new(1, 7).targets(7));
        assert!(StationPair::new(1, BROADCAST).targets(7));
        assert!(!StationPair::new(1, 8).targets(7));
    }

    #[test]
    fn snrm_broadcast_carries_connect_fields() {
        let mut buf = BytesMut::new();
        encode_snrm(&mut buf, 0x42, Some((StationPair::new(1, 2), 0x42)));
        assert_eq!(buf.len(), SNRM_FRAME_LEN);
        assert_eq!(buf[0], 0xFF);
        assert_eq!(buf[1], SNRM_CMD | PF_BIT);
        assert_eq!(buf[10], 0x42);
    }

    #[test]
    fn snrm_unicast_is_header_only() {
        let mut buf = BytesMut::new();
        encode_snrm(&mut buf, 0x42, None);
        assert_eq!(buf.as_ref(), &[0x43, SNRM_CMD | PF_BIT]);
    }

    #[test]
    fn response_frames_clear_command_bit() {
        let mut buf = BytesMut::new();
        encode_ua(&mut buf, 0x42, StationPair::new(1, 2));
        assert_eq!(buf.len(), UA_FRAME_LEN);
        assert_eq!(&buf[..2], &[0x42, UA_RSP | PF_BIT]);

        buf.clear();
        encode_dm(&mut buf, 0x42);
        assert_eq!(buf.as_ref(), &[0x42, DM_RSP | PF_BIT]);

        buf.clear();
        encode_rd(&mut buf, 0x42);
        assert_eq!(buf.as_ref(), &[0x42, RD_RSP | PF_BIT]);

        buf.clear();
        encode_disc(&mut buf, 0x42);
        assert_eq!(buf.as_ref(), &[0x43, DISC_CMD | PF_BIT]);
    }

    #[test]
    fn test_frame_layout_depends_on_broadcast() {
        let mut buf = BytesMut::new();
        encode_test(&mut buf, CBROADCAST, Some(StationPair::new(1, 2)), b"ping");
        assert_eq!(buf.len(), TEST_FRAME_LEN + 4);
        assert_eq!(&buf[TEST_FRAME_LEN..], b"ping");

        buf.clear();
        encode_test(&mut buf, 0x42, None, b"ping");
        assert_eq!(buf.as_ref(), &[0x42, TEST_RSP | PF_BIT, b'p', b'i', b'n', b'g']);
    }

    #[test]
    fn frmr_causes_roundtrip() {
        let causes = FrmrCauses {
            w: true,
            x: false,
            y: true,
            z: true,
        };
        assert_eq!(causes.bits(), 0x0D);
        assert_eq!(FrmrCauses::from_bits(0x0D), causes);

        let mut buf = BytesMut::new();
        encode_frmr(&mut buf, 0x42, 0x93, causes);
        assert_eq!(buf.as_ref(), &[0x42, FRMR_RSP | PF_BIT, 0x93, 0x0D]);
    }

    #[test]
    fn i_and_ui_frames_append_payload() {
        let mut buf = BytesMut::new();
        encode_i(&mut buf, 0x42, true, 3, 5, false, b"data");
        assert_eq!(buf[0], 0x43);
        assert_eq!(ns_of(buf[1]), 3);
        assert_eq!(nr_of(buf[1]), 5);
        assert_eq!(&buf[2..], b"data");

        buf.clear();
        encode_ui(&mut buf, 0x42, false, true, b"x");
        assert_eq!(buf.as_ref(), &[0x42, UI_FRAME | PF_BIT, b'x']);
    }
}
