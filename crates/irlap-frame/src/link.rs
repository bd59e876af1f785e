//! Per-link protocol state and every frame the link sends.
//!
//! A [`LinkContext`] is driven by an external state machine: it feeds
//! received frames through [`LinkContext::receive`] and reacts to the
//! resulting events by calling the send, resend and acknowledge operations
//! here. All of them mutate the context, so callers serialize access per
//! link (one task, or one lock) together with timer expiry handling.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use irlap_transport::{FrameSink, TxFrame};
use tracing::{debug, trace, warn};

use crate::arq::RetransmitQueue;
use crate::codec::{
    address_byte, encode_disc, encode_dm, encode_frmr, encode_header, encode_i, encode_rd,
    encode_snrm, encode_supervisory, encode_test, encode_ua, encode_ui, FrmrCauses, StationPair,
    SupervisoryKind, BROADCAST, CBROADCAST, I_FRAME, LAP_HEADER_LEN, PF_BIT, SNRM_FRAME_LEN,
    UA_FRAME_LEN,
};
use crate::discovery::{encode_xid, Discovery};
use crate::dispatch::{dispatch, Station};
use crate::error::{FrameError, Result};
use crate::event::LinkEvent;
use crate::qos::{LinkConfig, QosNegotiator, TxQos, MAX_WINDOW_SIZE, NEGOTIATION_PARAMS_LEN};
use crate::timer::{ManualTimers, TimerKind, Timers};
use crate::turnaround::Turnaround;

/// Which end of the link this station is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Role {
    Primary,
    Secondary,
    #[default]
    Unknown,
}

/// Link states of the external state machine.
///
/// The frame layer only reads the state, except that a primary poll send
/// moves the link into [`LapState::NrmP`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LapState {
    /// Normal disconnected mode.
    #[default]
    Ndm,
    Query,
    Reply,
    Conn,
    Setup,
    Offline,
    XmitP,
    Pclose,
    NrmP,
    ResetWait,
    Reset,
    NrmS,
    XmitS,
    Sclose,
    ResetCheck,
}

/// User data queued for transmission in a burst.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Numbered Information frame, acknowledged and retransmitted.
    Reliable(Bytes),
    /// Unnumbered Information frame; consumes window but is never queued.
    Unreliable(Bytes),
}

impl Outbound {
    pub fn payload(&self) -> &Bytes {
        match self {
            Outbound::Reliable(payload) | Outbound::Unreliable(payload) => payload,
        }
    }
}

/// Protocol state of one link.
#[derive(Debug)]
pub struct LinkContext<S, T = ManualTimers> {
    saddr: u32,
    daddr: u32,
    caddr: u8,
    role: Role,
    state: LapState,

    vs: u8,
    vr: u8,
    va: u8,
    window_size: u8,
    window: u8,
    ack_required: bool,

    turnaround: Turnaround,
    qos_tx: TxQos,
    final_timeout: Duration,
    wd_timeout: Duration,
    line_capacity: u32,
    bytes_left: u32,
    dynamic_window: bool,
    monitor: bool,

    queue: RetransmitQueue,
    sink: S,
    timers: T,
}

impl<S: FrameSink> LinkContext<S> {
    /// Create a link with recording timers.
    pub fn new(saddr: u32, config: &LinkConfig, sink: S) -> Result<Self> {
        Self::with_timers(saddr, config, sink, ManualTimers::new())
    }
}

impl<S: FrameSink, T: Timers> LinkContext<S, T> {
    pub fn with_timers(saddr: u32, config: &LinkConfig, sink: S, timers: T) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            saddr,
            daddr: BROADCAST,
            caddr: CBROADCAST,
            role: Role::Unknown,
            state: LapState::Ndm,
            vs: 0,
            vr: 0,
            va: 7,
            window_size: config.window_size,
            window: config.window_size,
            ack_required: false,
            turnaround: Turnaround::new(config.baud_rate, config.xbofs),
            qos_tx: config.tx_qos(),
            final_timeout: config.final_timeout,
            wd_timeout: config.wd_timeout,
            line_capacity: config.line_capacity,
            bytes_left: config.line_capacity,
            dynamic_window: config.dynamic_window,
            monitor: config.monitor_mode,
            queue: RetransmitQueue::new(),
            sink,
            timers,
        })
    }

    pub fn saddr(&self) -> u32 {
        self.saddr
    }

    pub fn daddr(&self) -> u32 {
        self.daddr
    }

    /// Peer device address, learned during discovery.
    pub fn set_daddr(&mut self, daddr: u32) {
        self.daddr = daddr;
    }

    pub fn caddr(&self) -> u8 {
        self.caddr
    }

    /// Connection address; the command bit is masked off.
    pub fn set_caddr(&mut self, caddr: u8) {
        self.caddr = caddr & CBROADCAST;
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn set_role(&mut self, role: Role) {
        self.role = role;
    }

    pub fn state(&self) -> LapState {
        self.state
    }

    pub fn set_state(&mut self, state: LapState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "link state");
        }
        self.state = state;
    }

    pub fn vs(&self) -> u8 {
        self.vs
    }

    pub fn vr(&self) -> u8 {
        self.vr
    }

    /// Receive sequence number; reported as Nr in every frame sent next.
    pub fn set_vr(&mut self, vr: u8) {
        self.vr = vr & 0x07;
    }

    /// Last sequence number the peer acknowledged.
    pub fn va(&self) -> u8 {
        self.va
    }

    pub fn window_size(&self) -> u8 {
        self.window_size
    }

    /// Apply a negotiated window size; the remaining window restarts from it.
    pub fn set_window_size(&mut self, window_size: u8) -> Result<()> {
        if !(1..=MAX_WINDOW_SIZE).contains(&window_size) {
            return Err(FrameError::Config(format!(
                "window size {window_size} outside 1..={MAX_WINDOW_SIZE}"
            )));
        }
        self.window_size = window_size;
        self.window = window_size;
        Ok(())
    }

    /// Frames that may still be sent before the next poll/final.
    pub fn window(&self) -> u8 {
        self.window
    }

    pub fn ack_required(&self) -> bool {
        self.ack_required
    }

    /// Set when a received frame must be acknowledged with the next burst.
    pub fn set_ack_required(&mut self, ack_required: bool) {
        self.ack_required = ack_required;
    }

    pub fn bytes_left(&self) -> u32 {
        self.bytes_left
    }

    /// Negotiated transmit parameters used for turnaround waits.
    pub fn set_tx_qos(&mut self, qos: TxQos) {
        self.qos_tx = qos;
        self.turnaround.set_speed(qos.baud_rate);
    }

    pub fn tx_qos(&self) -> TxQos {
        self.qos_tx
    }

    pub fn turnaround(&self) -> &Turnaround {
        &self.turnaround
    }

    pub fn turnaround_mut(&mut self) -> &mut Turnaround {
        &mut self.turnaround
    }

    pub fn queue(&self) -> &RetransmitQueue {
        &self.queue
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn timers(&self) -> &T {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut T {
        &mut self.timers
    }

    /// Addressing the dispatcher filters received frames against.
    pub fn station(&self) -> Station {
        Station {
            caddr: self.caddr,
            saddr: self.saddr,
        }
    }

    /// Classify a received frame. Frames that produce no event are logged
    /// and dropped.
    pub fn receive(&self, frame: &Bytes) -> Option<LinkEvent> {
        dispatch(frame, &self.station())
    }

    /// Connect request. With `qos`, the frame goes to the broadcast
    /// connection address, names both stations, proposes our connection
    /// address and carries the negotiation parameters.
    pub fn send_snrm(&mut self, qos: Option<&dyn QosNegotiator>) -> Result<()> {
        let mut buf = BytesMut::with_capacity(SNRM_FRAME_LEN + NEGOTIATION_PARAMS_LEN);
        match qos {
            Some(qos) => {
                let stations = StationPair::new(self.saddr, self.daddr);
                encode_snrm(&mut buf, self.caddr, Some((stations, self.caddr)));
                insert_params(qos, &mut buf)?;
            }
            None => encode_snrm(&mut buf, self.caddr, None),
        }
        debug!(caddr = self.caddr, daddr = self.daddr, "sending SNRM");
        self.queue_xmit(buf.freeze())
    }

    /// Connect accept, optionally answering the negotiation.
    ///
    /// The station pair is always included, even on a unicast reply, so a
    /// primary can match the answer to its SNRM or DISC without tracking
    /// which one it sent.
    pub fn send_ua(&mut self, qos: Option<&dyn QosNegotiator>) -> Result<()> {
        let mut buf = BytesMut::with_capacity(UA_FRAME_LEN + NEGOTIATION_PARAMS_LEN);
        encode_ua(&mut buf, self.caddr, StationPair::new(self.saddr, self.daddr));
        if let Some(qos) = qos {
            insert_params(qos, &mut buf)?;
        }
        debug!(caddr = self.caddr, "sending UA");
        self.queue_xmit(buf.freeze())
    }

    /// Disconnected mode. Sent to the broadcast address while the link is
    /// not connected.
    pub fn send_dm(&mut self) -> Result<()> {
        let caddr = if self.state == LapState::Ndm {
            CBROADCAST
        } else {
            self.caddr
        };
        let mut buf = BytesMut::with_capacity(LAP_HEADER_LEN);
        encode_dm(&mut buf, caddr);
        self.queue_xmit(buf.freeze())
    }

    pub fn send_disc(&mut self) -> Result<()> {
        let mut buf = BytesMut::with_capacity(LAP_HEADER_LEN);
        encode_disc(&mut buf, self.caddr);
        self.queue_xmit(buf.freeze())
    }

    /// Request-disconnect, sent by a secondary.
    pub fn send_rd(&mut self) -> Result<()> {
        let mut buf = BytesMut::with_capacity(LAP_HEADER_LEN);
        encode_rd(&mut buf, self.caddr);
        self.queue_xmit(buf.freeze())
    }

    /// Receive-Ready with poll/final set, acknowledging up to Vr.
    pub fn send_rr(&mut self, command: bool) -> Result<()> {
        self.send_supervisory(SupervisoryKind::Rr, command)
    }

    /// Supervisory frame with poll/final set, carrying Vr as Nr.
    pub fn send_supervisory(&mut self, kind: SupervisoryKind, command: bool) -> Result<()> {
        let mut buf = BytesMut::with_capacity(LAP_HEADER_LEN);
        encode_supervisory(&mut buf, self.caddr, command, kind, self.vr, true);
        trace!(kind = %kind.frame_kind(), nr = self.vr, command, "sending supervisory frame");
        self.queue_xmit(buf.freeze())
    }

    /// Reject a received frame whose control byte was `rejected_control`.
    pub fn send_frmr(&mut self, rejected_control: u8, causes: FrmrCauses) -> Result<()> {
        let mut buf = BytesMut::with_capacity(LAP_HEADER_LEN + 2);
        encode_frmr(&mut buf, self.caddr, rejected_control, causes);
        self.queue_xmit(buf.freeze())
    }

    /// One discovery frame of a round with `slots` slots.
    pub fn send_discovery_xid(
        &mut self,
        slots: u8,
        slot: u8,
        command: bool,
        discovery: &Discovery,
    ) -> Result<()> {
        let mut buf = BytesMut::new();
        encode_xid(&mut buf, self.saddr, slots, slot, command, discovery);
        debug!(slots, slot, command, "sending discovery XID");
        self.queue_xmit(buf.freeze())
    }

    pub fn send_ui(&mut self, payload: &[u8], caddr: u8, command: bool, pf: bool) -> Result<()> {
        let mut buf = BytesMut::with_capacity(LAP_HEADER_LEN + payload.len());
        encode_ui(&mut buf, caddr, command, pf, payload);
        self.queue_xmit(buf.freeze())
    }

    /// Answer a TEST command by echoing its payload. Broadcast answers name
    /// both stations.
    pub fn send_test(&mut self, caddr: u8, daddr: u32, payload: &[u8]) -> Result<()> {
        let caddr = caddr & CBROADCAST;
        let stations = (caddr == CBROADCAST).then(|| StationPair::new(self.saddr, daddr));
        let mut buf = BytesMut::new();
        encode_test(&mut buf, caddr, stations, payload);
        self.wait_min_turnaround();
        self.queue_xmit(buf.freeze())
    }

    /// Send one frame of a burst, picking the variant from the role, the
    /// remaining window and whether more data is waiting.
    pub fn send_data(&mut self, out: Outbound, more_pending: bool) -> Result<()> {
        let mid_burst = self.window > 1 && more_pending;
        match (self.role, mid_burst) {
            (Role::Primary, true) => self.send_data_primary(out),
            (Role::Primary, false) => self.send_data_primary_poll(out),
            (Role::Secondary, true) => self.send_data_secondary(out),
            (Role::Secondary, false) => self.send_data_secondary_final(out),
            (Role::Unknown, _) => Err(FrameError::RoleUnknown),
        }
    }

    /// Primary, mid-burst: no poll bit.
    pub fn send_data_primary(&mut self, out: Outbound) -> Result<()> {
        self.consume_line(out.payload().len());
        self.window = self.window.saturating_sub(1);
        match out {
            Outbound::Reliable(payload) => {
                let stored = self.push_reliable(&payload);
                self.send_i_frame(&stored, true, false)
            }
            Outbound::Unreliable(payload) => {
                debug!("sending unreliable frame");
                self.send_ui(&payload, self.caddr, true, false)
            }
        }
    }

    /// Primary, last frame of a burst: polls the secondary, restarts the
    /// window and arms the final timer.
    pub fn send_data_primary_poll(&mut self, out: Outbound) -> Result<()> {
        self.timers.cancel(TimerKind::Poll);
        self.consume_line(out.payload().len());

        let sent = match out {
            Outbound::Reliable(payload) => {
                let stored = self.push_reliable(&payload);
                self.set_state(LapState::NrmP);
                self.send_i_frame(&stored, true, true)
            }
            Outbound::Unreliable(payload) => {
                debug!("sending unreliable frame");
                self.set_state(LapState::NrmP);
                self.send_ui_final(&payload, true)
            }
        };

        let mut transmission_time = self.final_timeout;
        self.window = self.window_size;
        if self.dynamic_window {
            transmission_time = transmission_time.saturating_sub(self.unused_line_time());
            trace!(?transmission_time, bytes_left = self.bytes_left, "adjusted transmission time");
            self.bytes_left = self.line_capacity;
        }
        self.timers
            .start(TimerKind::Final, self.final_timeout + transmission_time);

        sent
    }

    /// Secondary, mid-burst: no final bit.
    pub fn send_data_secondary(&mut self, out: Outbound) -> Result<()> {
        self.consume_line(out.payload().len());
        self.window = self.window.saturating_sub(1);
        match out {
            Outbound::Reliable(payload) => {
                let stored = self.push_reliable(&payload);
                self.send_i_frame(&stored, false, false)
            }
            Outbound::Unreliable(payload) => self.send_ui(&payload, self.caddr, false, false),
        }
    }

    /// Secondary, last frame of a burst: carries the final bit, restarts the
    /// window and arms the watchdog.
    pub fn send_data_secondary_final(&mut self, out: Outbound) -> Result<()> {
        self.consume_line(out.payload().len());

        let sent = match out {
            Outbound::Reliable(payload) => {
                let stored = self.push_reliable(&payload);
                self.send_i_frame(&stored, false, true)
            }
            Outbound::Unreliable(payload) => self.send_ui_final(&payload, false),
        };

        self.window = self.window_size;
        if self.dynamic_window {
            self.bytes_left = self.line_capacity;
        }
        self.timers.start(TimerKind::Watchdog, self.wd_timeout);

        sent
    }

    /// Resend every unacknowledged frame in order, poll/final on the last.
    pub fn resend_rejected_frames(&mut self, command: bool) -> Result<()> {
        let count = self.queue.len();
        debug!(count, "resending rejected frames");
        for index in 0..count {
            self.wait_min_turnaround();
            let Some(stored) = self.queue.get(index).cloned() else {
                break;
            };
            self.send_i_frame(&stored, command, index + 1 == count)?;
        }
        Ok(())
    }

    /// Resend the oldest unacknowledged frame with poll/final set.
    pub fn resend_rejected_frame(&mut self, command: bool) -> Result<()> {
        let Some(stored) = self.queue.front().cloned() else {
            return Ok(());
        };
        self.wait_min_turnaround();
        self.send_i_frame(&stored, command, true)
    }

    /// Drop queued frames the peer acknowledged with `nr`; returns how many.
    pub fn acknowledge(&mut self, nr: u8) -> usize {
        let nr = nr & 0x07;
        let dropped = if nr == self.vs {
            self.queue.clear()
        } else {
            self.queue.ack_up_to(nr)
        };
        self.va = (nr + 7) % 8;
        let outstanding = u8::try_from(self.queue.len()).unwrap_or(u8::MAX);
        self.window = self.window_size.saturating_sub(outstanding);
        trace!(nr, dropped, window = self.window, "acknowledged");
        dropped
    }

    /// Start a new poll/final cycle.
    pub fn reset_window(&mut self) {
        self.window = self.window_size;
        self.bytes_left = self.line_capacity;
    }

    /// Sequence state for a fresh connection; unacknowledged frames are
    /// discarded.
    pub fn reset(&mut self) {
        self.vs = 0;
        self.vr = 0;
        self.va = 7;
        self.ack_required = false;
        let dropped = self.queue.clear();
        if dropped > 0 {
            debug!(dropped, "discarding unacknowledged frames");
        }
        self.reset_window();
    }

    /// Make the next frame honour the peer's minimum turnaround time.
    pub fn wait_min_turnaround(&mut self) {
        self.turnaround.wait_min_turnaround(&self.qos_tx);
    }

    /// Stamp Vs into a new Information frame, keep a copy for
    /// retransmission and advance Vs.
    fn push_reliable(&mut self, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(LAP_HEADER_LEN + payload.len());
        encode_i(&mut buf, self.caddr, false, self.vs, 0, false, payload);
        let stored = buf.freeze();
        self.queue.push(stored.clone());
        trace!(vs = self.vs, len = payload.len(), "queued I frame");
        self.vs = (self.vs + 1) % 8;
        self.ack_required = false;
        stored
    }

    /// UI frame closing a burst. If an acknowledgment is owed it goes out in
    /// a trailing Receive-Ready instead.
    fn send_ui_final(&mut self, payload: &[u8], command: bool) -> Result<()> {
        if self.ack_required {
            self.send_ui(payload, self.caddr, command, false)?;
            self.ack_required = false;
            self.send_rr(command)
        } else {
            self.send_ui(payload, self.caddr, command, true)
        }
    }

    /// Transmit a fresh copy of a stored Information frame with the current
    /// connection address and Vr.
    fn send_i_frame(&mut self, stored: &Bytes, command: bool, pf: bool) -> Result<()> {
        let control = stored.get(1).copied().unwrap_or(I_FRAME) & 0x0F;
        let body = stored.get(LAP_HEADER_LEN..).unwrap_or_default();

        let mut control = control | (self.vr << 5);
        if pf {
            control |= PF_BIT;
        }
        let mut buf = BytesMut::with_capacity(LAP_HEADER_LEN + body.len());
        encode_header(&mut buf, self.caddr, command, control);
        buf.extend_from_slice(body);

        trace!(
            caddr = address_byte(self.caddr, command),
            control = format_args!("{control:#04x}"),
            "sending I frame"
        );
        self.queue_xmit(buf.freeze())
    }

    /// Annotate a finished frame and hand it to the transport.
    fn queue_xmit(&mut self, data: Bytes) -> Result<()> {
        let meta = self.turnaround.annotate();
        if self.monitor {
            debug!(len = data.len(), "monitor mode, frame not transmitted");
            return Ok(());
        }
        self.sink.transmit(TxFrame::new(data, meta))?;
        Ok(())
    }

    fn consume_line(&mut self, len: usize) {
        if self.dynamic_window {
            let len = u32::try_from(len).unwrap_or(u32::MAX);
            self.bytes_left = self.bytes_left.saturating_sub(len);
        }
    }

    /// Share of the final timeout the unused line capacity stands for.
    fn unused_line_time(&self) -> Duration {
        if self.line_capacity == 0 {
            return Duration::ZERO;
        }
        self.final_timeout
            .checked_mul(self.bytes_left)
            .map(|total| total / self.line_capacity)
            .unwrap_or(self.final_timeout)
    }
}

fn insert_params(qos: &dyn QosNegotiator, buf: &mut BytesMut) -> Result<()> {
    qos.insert_params(buf).map_err(|err| {
        warn!(%err, "negotiation parameters unavailable, frame dropped");
        err
    })
}
