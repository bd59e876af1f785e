//! Classification of received frames.
//!
//! The control byte selects the format: low bit clear is an Information
//! frame, low bits `01` a supervisory frame, low bits `11` an unnumbered
//! frame identified by its full value.

use bytes::Bytes;
use tracing::{debug, warn};

use crate::codec::{
    is_pf, nr_of, ns_of, FrameKind, FrmrCauses, Header, StationPair, SupervisoryKind, CBROADCAST,
    DISC_CMD, DM_RSP, FRMR_FRAME_LEN, FRMR_RSP, LAP_HEADER_LEN, SNRM_CMD, SNRM_FRAME_LEN,
    TEST_CMD, TEST_FRAME_LEN, UA_FRAME_LEN, UA_RSP, UI_FRAME, XID_CMD, XID_RSP,
};
use crate::discovery::{
    decode_info, decode_xid_header, FINAL_SLOT, MIN_FINAL_INFO_LEN, XID_FRAME_LEN,
};
use crate::error::{FrameError, Result};
use crate::event::{FrameInfo, FrmrInfo, LinkEvent, SnrmInfo, XidCommand, XidResponse};

/// The local addressing a received frame is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Station {
    /// Our connection address (command bit clear).
    pub caddr: u8,
    /// Our device address.
    pub saddr: u32,
}

/// Classify a frame, logging and dropping anything that yields no event.
pub fn dispatch(frame: &Bytes, station: &Station) -> Option<LinkEvent> {
    match decode_frame(frame, station) {
        Ok(event) => Some(event),
        Err(err) => {
            log_drop(&err);
            None
        }
    }
}

fn log_drop(err: &FrameError) {
    match err {
        FrameError::WrongConnectionAddress { .. }
        | FrameError::NotAddressedToUs { .. }
        | FrameError::InvalidConnectionAddress(_) => debug!(%err, "dropping frame"),
        FrameError::UnknownControl(control) => {
            warn!(control = format_args!("{control:#04x}"), "unknown frame received")
        }
        _ => warn!(%err, "dropping malformed frame"),
    }
}

/// Classify a frame into the event it produces for the state machine.
pub fn decode_frame(frame: &Bytes, station: &Station) -> Result<LinkEvent> {
    let header = Header::parse(frame)?;

    if header.caddr != station.caddr && !header.is_broadcast() {
        return Err(FrameError::WrongConnectionAddress {
            got: header.caddr,
            expected: station.caddr,
        });
    }

    let control = header.control;
    let mut info = FrameInfo {
        caddr: header.caddr,
        command: header.command,
        pf: header.pf,
        ..FrameInfo::default()
    };

    if control & 0x01 == 0 {
        info.nr = Some(nr_of(control));
        info.ns = Some(ns_of(control));
        return Ok(LinkEvent::I {
            info,
            payload: frame.slice(LAP_HEADER_LEN..),
        });
    }

    if control & 0x02 == 0 {
        let kind =
            SupervisoryKind::from_control(control).ok_or(FrameError::UnknownControl(control))?;
        info.nr = Some(nr_of(control));
        return Ok(match kind {
            SupervisoryKind::Rr => LinkEvent::Rr(info),
            SupervisoryKind::Rnr => LinkEvent::Rnr(info),
            SupervisoryKind::Rej => LinkEvent::Rej(info),
            SupervisoryKind::Srej => LinkEvent::Srej(info),
        });
    }

    match control {
        XID_RSP => decode_xid_rsp(frame, station, info),
        XID_CMD => decode_xid_cmd(frame, station, info),
        SNRM_CMD => decode_snrm(frame, station, info),
        DM_RSP => Ok(LinkEvent::DmRsp(info)),
        DISC_CMD if info.command => Ok(LinkEvent::DiscCmd(info)),
        DISC_CMD => Ok(LinkEvent::RdRsp(info)),
        TEST_CMD => decode_test(frame, station, info),
        UA_RSP => {
            info.stations = StationPair::read(frame, LAP_HEADER_LEN);
            let params = if frame.len() > UA_FRAME_LEN {
                frame.slice(UA_FRAME_LEN..)
            } else {
                Bytes::new()
            };
            Ok(LinkEvent::UaRsp { info, params })
        }
        FRMR_RSP => decode_frmr(frame, info),
        UI_FRAME => Ok(LinkEvent::Ui {
            info,
            payload: frame.slice(LAP_HEADER_LEN..),
        }),
        other => Err(FrameError::UnknownControl(other)),
    }
}

fn decode_snrm(frame: &Bytes, station: &Station, mut info: FrameInfo) -> Result<LinkEvent> {
    // Too short to decode: the state machine still sees the request and
    // decides on its own whether to refuse it.
    if frame.len() < SNRM_FRAME_LEN {
        return Ok(LinkEvent::SnrmCmd(None));
    }

    let ncaddr = frame[SNRM_FRAME_LEN - 1] & CBROADCAST;
    if ncaddr == 0x00 || ncaddr == CBROADCAST {
        return Err(FrameError::InvalidConnectionAddress(ncaddr));
    }

    let stations = StationPair::read(frame, LAP_HEADER_LEN).ok_or(FrameError::Truncated {
        kind: FrameKind::Snrm,
        need: SNRM_FRAME_LEN,
        got: frame.len(),
    })?;
    if stations.destination != station.saddr {
        return Err(FrameError::NotAddressedToUs {
            destination: stations.destination,
        });
    }
    info.stations = Some(stations);

    Ok(LinkEvent::SnrmCmd(Some(SnrmInfo {
        info,
        ncaddr,
        params: frame.slice(SNRM_FRAME_LEN..),
    })))
}

fn decode_xid_rsp(frame: &Bytes, station: &Station, mut info: FrameInfo) -> Result<LinkEvent> {
    let header = decode_xid_header(frame)?;
    if !header.stations.targets(station.saddr) {
        return Err(FrameError::NotAddressedToUs {
            destination: header.stations.destination,
        });
    }
    info.stations = Some(header.stations);

    let discovery = decode_info(
        &frame[XID_FRAME_LEN..],
        header.stations.source,
        station.saddr,
    )?;
    debug!(
        daddr = format_args!("{:#010x}", discovery.daddr),
        "discovery response"
    );

    Ok(LinkEvent::DiscoveryXidRsp(XidResponse { info, discovery }))
}

fn decode_xid_cmd(frame: &Bytes, station: &Station, mut info: FrameInfo) -> Result<LinkEvent> {
    let header = decode_xid_header(frame)?;
    if !header.stations.targets(station.saddr) {
        return Err(FrameError::NotAddressedToUs {
            destination: header.stations.destination,
        });
    }
    info.stations = Some(header.stations);

    let discovery = if header.slot == FINAL_SLOT {
        let block = &frame[XID_FRAME_LEN..];
        if block.len() < MIN_FINAL_INFO_LEN {
            return Err(FrameError::Truncated {
                kind: FrameKind::Xid,
                need: XID_FRAME_LEN + MIN_FINAL_INFO_LEN,
                got: frame.len(),
            });
        }
        Some(decode_info(block, header.stations.source, station.saddr)?)
    } else {
        None
    };

    Ok(LinkEvent::DiscoveryXidCmd(XidCommand {
        info,
        slots: header.slots,
        slot: header.slot,
        discovery,
    }))
}

fn decode_test(frame: &Bytes, station: &Station, mut info: FrameInfo) -> Result<LinkEvent> {
    // Only broadcast frames carry the station pair.
    let need = if info.caddr == CBROADCAST {
        TEST_FRAME_LEN
    } else {
        LAP_HEADER_LEN
    };
    if frame.len() < need {
        return Err(FrameError::Truncated {
            kind: FrameKind::Test,
            need,
            got: frame.len(),
        });
    }

    let body_start = if info.caddr == CBROADCAST {
        let stations = StationPair::read(frame, LAP_HEADER_LEN).ok_or(FrameError::Truncated {
            kind: FrameKind::Test,
            need: TEST_FRAME_LEN,
            got: frame.len(),
        })?;
        if !stations.targets(station.saddr) {
            return Err(FrameError::NotAddressedToUs {
                destination: stations.destination,
            });
        }
        info.stations = Some(stations);
        TEST_FRAME_LEN
    } else {
        LAP_HEADER_LEN
    };

    Ok(LinkEvent::Test {
        info,
        payload: frame.slice(body_start..),
    })
}

fn decode_frmr(frame: &Bytes, mut info: FrameInfo) -> Result<LinkEvent> {
    if frame.len() < FRMR_FRAME_LEN {
        return Err(FrameError::Truncated {
            kind: FrameKind::Frmr,
            need: FRMR_FRAME_LEN,
            got: frame.len(),
        });
    }

    let rejected_control = frame[2];
    info.nr = Some(nr_of(rejected_control));
    info.ns = Some(ns_of(rejected_control));
    info.pf = is_pf(rejected_control);

    let causes = FrmrCauses::from_bits(frame[3]);
    if causes.w {
        debug!("rejected control field is undefined or not implemented");
    }
    if causes.x {
        debug!("rejected control field contained a non-permitted I field");
    }
    if causes.y {
        debug!("received I field exceeded the negotiated maximum");
    }
    if causes.z {
        debug!("rejected control field contained an invalid Nr");
    }

    Ok(LinkEvent::FrmrRsp(FrmrInfo {
        info,
        rejected_control,
        causes,
    }))
}
