use crate::codec::FrameKind;

/// Errors that can occur while building, decoding or dispatching link frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame is shorter than its type requires.
    #[error("{kind} frame too short ({got} bytes, need {need})")]
    Truncated {
        kind: FrameKind,
        need: usize,
        got: usize,
    },

    /// A connect request carried a reserved connection address.
    #[error("invalid connection address {0:#04x}")]
    InvalidConnectionAddress(u8),

    /// The frame's connection address is neither ours nor broadcast.
    #[error("wrong connection address {got:#04x} (expected {expected:#04x})")]
    WrongConnectionAddress { got: u8, expected: u8 },

    /// The frame's destination station is neither ours nor broadcast.
    #[error("frame not addressed to us (destination {destination:#010x})")]
    NotAddressedToUs { destination: u32 },

    /// The control byte matches no known frame type.
    #[error("unknown control field {0:#04x}")]
    UnknownControl(u8),

    /// The QoS collaborator failed to produce a parameter block.
    #[error("negotiation parameters rejected: {0}")]
    Negotiation(String),

    /// The link configuration is out of range.
    #[error("invalid link configuration: {0}")]
    Config(String),

    /// The operation needs a primary or secondary role.
    #[error("link role not established")]
    RoleUnknown,

    /// The transport refused the frame.
    #[error("transport error: {0}")]
    Transport(#[from] irlap_transport::TransportError),
}

pub type Result<T> = std::result::Result<T, FrameError>;
