//! IrLAP link-access frame layer.
//!
//! Builds, classifies and retransmits the link frames of an infrared
//! point-to-point link, leaving the link state machine and the physical
//! device to the caller.
//!
//! # Crate Structure
//!
//! - [`transport`]: Frame handoff seam, recording sink, Unix datagram transport
//! - [`frame`]: Frame codec, receive dispatcher, discovery, ARQ queue and link context

/// Re-export transport types.
pub mod transport {
    pub use irlap_transport::*;
}

/// Re-export frame layer types.
pub mod frame {
    pub use irlap_frame::*;
}
