//! IrLAP link-access frame layer.
//!
//! Builds outgoing link frames, classifies incoming ones and keeps the
//! sliding-window retransmission queue for one infrared link:
//! - a 1-byte connection address (7-bit address + command/response bit)
//! - a 1-byte control field (I, supervisory or unnumbered format)
//! - a kind-dependent body: nothing, a station address pair, or a pair plus
//!   negotiation or discovery data
//!
//! The link state machine lives outside this crate. It feeds received frames
//! to [`LinkContext::receive`], reacts to the [`LinkEvent`]s, and calls back
//! into the context to send, resend and acknowledge.

pub mod arq;
pub mod codec;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod link;
pub mod qos;
pub mod timer;
pub mod turnaround;

pub use arq::RetransmitQueue;
pub use codec::{FrameKind, FrmrCauses, Header, StationPair, SupervisoryKind, BROADCAST, CBROADCAST};
pub use discovery::{Discovery, XidHeader, FINAL_SLOT, NICKNAME_MAX_LEN};
pub use dispatch::{decode_frame, dispatch, Station};
pub use error::{FrameError, Result};
pub use event::{FrameInfo, FrmrInfo, LinkEvent, SnrmInfo, XidCommand, XidResponse};
pub use link::{LapState, LinkContext, Outbound, Role};
pub use qos::{LinkConfig, QosNegotiator, StaticParams, TxQos};
pub use timer::{ManualTimers, TimerKind, Timers};
pub use turnaround::Turnaround;

#[cfg(feature = "async")]
pub use timer::{TimerExpiry, TokioTimers};
