use bytes::Bytes;

use crate::error::{Result, TransportError};

/// Transmit metadata attached to every frame at handoff.
///
/// The driver below the seam uses these to honour the peer's turnaround
/// requirements before putting the frame on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxMeta {
    /// Minimum turnaround time in microseconds to wait before this frame.
    pub mtt: u32,
    /// Line speed to switch to once this frame has gone out.
    pub next_speed: u32,
    /// Extra beginning-of-frame flags (XBOFs) to send with this frame.
    pub xbofs: u32,
    /// XBOF count to use for the following frames.
    pub next_xbofs: u32,
    /// Additional XBOFs padding out a turnaround delay at low speeds.
    pub xbofs_delay: u32,
}

/// A fully built link frame plus its transmit metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxFrame {
    /// Connection address, control byte and body.
    pub data: Bytes,
    pub meta: TxMeta,
}

impl TxFrame {
    /// Create a new frame.
    pub fn new(data: impl Into<Bytes>, meta: TxMeta) -> Self {
        Self {
            data: data.into(),
            meta,
        }
    }

    /// The connection-address byte, including the command bit.
    pub fn address(&self) -> Option<u8> {
        self.data.first().copied()
    }

    /// The control byte.
    pub fn control(&self) -> Option<u8> {
        self.data.get(1).copied()
    }

    /// Frame length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the frame buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The "transmit frame" call of the transport.
///
/// Implementations take ownership of the buffer; the frame layer never
/// touches it again after handoff.
pub trait FrameSink {
    fn transmit(&mut self, frame: TxFrame) -> Result<()>;
}

impl<S: FrameSink + ?Sized> FrameSink for &mut S {
    fn transmit(&mut self, frame: TxFrame) -> Result<()> {
        (**self).transmit(frame)
    }
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn transmit(&mut self, frame: TxFrame) -> Result<()> {
        (**self).transmit(frame)
    }
}

/// In-memory sink that records every frame handed to it, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    frames: Vec<TxFrame>,
    closed: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames transmitted so far.
    pub fn frames(&self) -> &[TxFrame] {
        &self.frames
    }

    /// Drain the recorded frames.
    pub fn take(&mut self) -> Vec<TxFrame> {
        std::mem::take(&mut self.frames)
    }

    /// The most recently transmitted frame.
    pub fn last(&self) -> Option<&TxFrame> {
        self.frames.last()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Refuse all further frames with [`TransportError::Shutdown`].
    pub fn close(&mut self) {
        self.closed = true;
    }
}

impl FrameSink for RecordingSink {
    fn transmit(&mut self, frame: TxFrame) -> Result<()> {
        if self.closed {
            return Err(TransportError::Shutdown);
        }
        self.frames.push(frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_keeps_order() {
        let mut sink = RecordingSink::new();
        sink.transmit(TxFrame::new(vec![0x03, 0x93], TxMeta::default()))
            .unwrap();
        sink.transmit(TxFrame::new(vec![0x03, 0x11], TxMeta::default()))
            .unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.frames()[0].control(), Some(0x93));
        assert_eq!(sink.last().and_then(TxFrame::control), Some(0x11));
    }

    #[test]
    fn closed_sink_refuses_frames() {
        let mut sink = RecordingSink::new();
        sink.close();
        let err = sink
            .transmit(TxFrame::new(vec![0x03, 0x93], TxMeta::default()))
            .unwrap_err();
        assert!(matches!(err, TransportError::Shutdown));
        assert!(sink.is_empty());
    }

    #[test]
    fn take_drains_frames() {
        let mut sink = RecordingSink::new();
        sink.transmit(TxFrame::new(vec![0xFE, 0x3F], TxMeta::default()))
            .unwrap();
        let frames = sink.take();
        assert_eq!(frames.len(), 1);
        assert!(sink.is_empty());
    }

    #[test]
    fn header_accessors() {
        let frame = TxFrame::new(vec![0x07], TxMeta::default());
        assert_eq!(frame.address(), Some(0x07));
        assert_eq!(frame.control(), None);
        assert_eq!(frame.len(), 1);
    }

    #[test]
    fn sink_through_mutable_reference() {
        fn send_one<S: FrameSink>(mut sink: S) {
            sink.transmit(TxFrame::new(vec![0x01, 0x01], TxMeta::default()))
                .unwrap();
        }

        let mut sink = RecordingSink::new();
        send_one(&mut sink);
        send_one(&mut sink);
        assert_eq!(sink.len(), 2);
    }
}
