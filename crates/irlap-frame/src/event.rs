use bytes::Bytes;

use crate::codec::{FrmrCauses, StationPair};
use crate::discovery::Discovery;

/// Fields decoded from a received frame's header and body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameInfo {
    /// Connection address with the command bit masked off.
    pub caddr: u8,
    pub command: bool,
    pub pf: bool,
    pub nr: Option<u8>,
    pub ns: Option<u8>,
    /// Station pair, for frame types that carry one.
    pub stations: Option<StationPair>,
}

/// A decodable SNRM connect request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnrmInfo {
    pub info: FrameInfo,
    /// Connection address the primary wants to use.
    pub ncaddr: u8,
    /// Negotiation parameter block, opaque to this layer.
    pub params: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XidCommand {
    pub info: FrameInfo,
    /// Slot count S of this discovery round.
    pub slots: u8,
    /// Slot number s; [`FINAL_SLOT`](crate::discovery::FINAL_SLOT) closes the round.
    pub slot: u8,
    /// Present on the final-slot command.
    pub discovery: Option<Discovery>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XidResponse {
    pub info: FrameInfo,
    pub discovery: Discovery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrmrInfo {
    /// Nr/Ns/PF of the rejected control field.
    pub info: FrameInfo,
    pub rejected_control: u8,
    pub causes: FrmrCauses,
}

/// One classified frame, handed to the link state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Connect request; `None` when the frame was too short to decode.
    SnrmCmd(Option<SnrmInfo>),
    UaRsp { info: FrameInfo, params: Bytes },
    DmRsp(FrameInfo),
    DiscCmd(FrameInfo),
    RdRsp(FrameInfo),
    DiscoveryXidCmd(XidCommand),
    DiscoveryXidRsp(XidResponse),
    Rr(FrameInfo),
    Rnr(FrameInfo),
    Rej(FrameInfo),
    Srej(FrameInfo),
    I { info: FrameInfo, payload: Bytes },
    Ui { info: FrameInfo, payload: Bytes },
    FrmrRsp(FrmrInfo),
    Test { info: FrameInfo, payload: Bytes },
}

impl LinkEvent {
    /// Event name, distinguishing command from response where both exist.
    pub fn name(&self) -> &'static str {
        let command = self.info().map(|info| info.command).unwrap_or(true);
        match self {
            LinkEvent::SnrmCmd(_) => "snrm_cmd",
            LinkEvent::UaRsp { .. } => "ua_rsp",
            LinkEvent::DmRsp(_) => "dm_rsp",
            LinkEvent::DiscCmd(_) => "disc_cmd",
            LinkEvent::RdRsp(_) => "rd_rsp",
            LinkEvent::DiscoveryXidCmd(_) => "discovery_xid_cmd",
            LinkEvent::DiscoveryXidRsp(_) => "discovery_xid_rsp",
            LinkEvent::Rr(_) if command => "rr_cmd",
            LinkEvent::Rr(_) => "rr_rsp",
            LinkEvent::Rnr(_) if command => "rnr_cmd",
            LinkEvent::Rnr(_) => "rnr_rsp",
            LinkEvent::Rej(_) if command => "rej_cmd",
            LinkEvent::Rej(_) => "rej_rsp",
            LinkEvent::Srej(_) if command => "srej_cmd",
            LinkEvent::Srej(_) => "srej_rsp",
            LinkEvent::I { .. } if command => "i_cmd",
            LinkEvent::I { .. } => "i_rsp",
            LinkEvent::Ui { .. } => "ui_frame",
            LinkEvent::FrmrRsp(_) => "frmr_rsp",
            LinkEvent::Test { .. } if command => "test_cmd",
            LinkEvent::Test { .. } => "test_rsp",
        }
    }

    /// Header fields of the frame, if it was decodable.
    pub fn info(&self) -> Option<&FrameInfo> {
        match self {
            LinkEvent::SnrmCmd(snrm) => snrm.as_ref().map(|s| &s.info),
            LinkEvent::UaRsp { info, .. }
            | LinkEvent::I { info, .. }
            | LinkEvent::Ui { info, .. }
            | LinkEvent::Test { info, .. } => Some(info),
            LinkEvent::DmRsp(info)
            | LinkEvent::DiscCmd(info)
            | LinkEvent::RdRsp(info)
            | LinkEvent::Rr(info)
            | LinkEvent::Rnr(info)
            | LinkEvent::Rej(info)
            | LinkEvent::Srej(info) => Some(info),
            LinkEvent::DiscoveryXidCmd(xid) => Some(&xid.info),
            LinkEvent::DiscoveryXidRsp(xid) => Some(&xid.info),
            LinkEvent::FrmrRsp(frmr) => Some(&frmr.info),
        }
    }

    /// Discovery record attached to XID frames with information.
    pub fn discovery(&self) -> Option<&Discovery> {
        match self {
            LinkEvent::DiscoveryXidCmd(xid) => xid.discovery.as_ref(),
            LinkEvent::DiscoveryXidRsp(xid) => Some(&xid.discovery),
            _ => None,
        }
    }

    /// Information field, for frame types that carry user data.
    pub fn payload(&self) -> Option<&Bytes> {
        match self {
            LinkEvent::I { payload, .. }
            | LinkEvent::Ui { payload, .. }
            | LinkEvent::Test { payload, .. } => Some(payload),
            _ => None,
        }
    }
}
