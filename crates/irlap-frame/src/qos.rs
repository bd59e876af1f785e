use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Space reserved for the negotiation parameter block.
pub const NEGOTIATION_PARAMS_LEN: usize = 25;

/// Fills the negotiation parameter block of SNRM and UA frames.
///
/// The frame layer only reserves the space; encoding the parameters is the
/// collaborator's business.
pub trait QosNegotiator {
    fn insert_params(&self, dst: &mut BytesMut) -> Result<()>;
}

/// A pre-encoded parameter block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticParams(pub Bytes);

impl QosNegotiator for StaticParams {
    fn insert_params(&self, dst: &mut BytesMut) -> Result<()> {
        if self.0.len() > NEGOTIATION_PARAMS_LEN {
            return Err(FrameError::Negotiation(format!(
                "parameter block is {} bytes, max {NEGOTIATION_PARAMS_LEN}",
                self.0.len()
            )));
        }
        dst.put_slice(&self.0);
        Ok(())
    }
}

/// The negotiated transmit parameters that affect turnaround.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxQos {
    /// Line speed in bits per second.
    pub baud_rate: u32,
    /// The peer's minimum turnaround time in microseconds.
    pub min_turn_time_us: u32,
}

/// Default (unnegotiated) IrLAP line speed.
pub const DEFAULT_BAUD_RATE: u32 = 9600;
/// Default minimum turnaround time: 10 ms.
pub const DEFAULT_MIN_TURN_TIME_US: u32 = 10_000;
/// Default extra BOF count at the default speed.
pub const DEFAULT_XBOFS: u32 = 10;
/// Largest window IrLAP can negotiate with 3-bit sequence numbers.
pub const MAX_WINDOW_SIZE: u8 = 7;

/// Per-link configuration.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Negotiated window size (frames per poll/final cycle). Default: 1.
    pub window_size: u8,
    /// Line speed in bits per second.
    pub baud_rate: u32,
    /// Peer's minimum turnaround time in microseconds.
    pub min_turn_time_us: u32,
    /// How long a primary waits for the secondary's answer to a poll.
    pub final_timeout: Duration,
    /// Response deadline when replying as secondary.
    pub wd_timeout: Duration,
    /// Bytes the line carries in one final timeout.
    pub line_capacity: u32,
    /// Shorten the final timer by the unused share of the line capacity.
    pub dynamic_window: bool,
    /// Extra BOF flags sent with each frame.
    pub xbofs: u32,
    /// Build frames but never hand them to the transport.
    pub monitor_mode: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            window_size: 1,
            baud_rate: DEFAULT_BAUD_RATE,
            min_turn_time_us: DEFAULT_MIN_TURN_TIME_US,
            final_timeout: Duration::from_millis(500),
            wd_timeout: Duration::from_millis(1000),
            line_capacity: 400,
            dynamic_window: false,
            xbofs: DEFAULT_XBOFS,
            monitor_mode: false,
        }
    }
}

impl LinkConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_WINDOW_SIZE).contains(&self.window_size) {
            return Err(FrameError::Config(format!(
                "window size {} outside 1..={MAX_WINDOW_SIZE}",
                self.window_size
            )));
        }
        if self.baud_rate == 0 {
            return Err(FrameError::Config("baud rate must be non-zero".into()));
        }
        Ok(())
    }

    pub fn tx_qos(&self) -> TxQos {
        TxQos {
            baud_rate: self.baud_rate,
            min_turn_time_us: self.min_turn_time_us,
        }
    }
}
