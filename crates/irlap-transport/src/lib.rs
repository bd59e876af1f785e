//! Frame handoff seam for the IrLAP frame layer.
//!
//! The frame layer never touches a device. It builds a complete link frame,
//! annotates it with transmit metadata and hands it to a [`FrameSink`]:
//! - [`RecordingSink`] keeps frames in memory (tests, dry runs)
//! - [`DatagramTransport`] carries one link frame per Unix datagram (Linux/macOS)
//!
//! Physical encoding, byte stuffing and baud-rate switching live below this
//! seam and are not modelled here.

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use traits::{FrameSink, RecordingSink, TxFrame, TxMeta};

#[cfg(unix)]
pub use uds::DatagramTransport;
