use irlap_transport::TxMeta;

use crate::qos::TxQos;

/// Above this speed the driver waits out turnaround time itself; at or
/// below it the wait is padded with extra BOF flags.
pub const MTT_BY_TIME_ABOVE: u32 = 115_200;

/// Bytes sent during `min_turn_time_us` at `speed` (ten bits per byte).
pub fn min_turn_time_in_bytes(speed: u32, min_turn_time_us: u32) -> u32 {
    (u64::from(speed) * u64::from(min_turn_time_us) / 10_000_000) as u32
}

/// Transmit metadata that accumulates between frames.
///
/// Every frame handed to the transport takes a snapshot via
/// [`annotate`](Self::annotate), which also resets the one-shot fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Turnaround {
    mtt_required: u32,
    speed: u32,
    bofs_count: u32,
    next_bofs: u32,
    xbofs_delay: u32,
}

impl Turnaround {
    pub fn new(speed: u32, xbofs: u32) -> Self {
        Self {
            speed,
            bofs_count: xbofs,
            next_bofs: xbofs,
            ..Self::default()
        }
    }

    /// Snapshot for the frame about to be sent, then reset for the next one.
    pub fn annotate(&mut self) -> TxMeta {
        let meta = TxMeta {
            mtt: self.mtt_required,
            next_speed: self.speed,
            xbofs: self.bofs_count,
            next_xbofs: self.next_bofs,
            xbofs_delay: self.xbofs_delay,
        };
        self.mtt_required = 0;
        self.xbofs_delay = 0;
        self.bofs_count = self.next_bofs;
        meta
    }

    /// Make the next frame honour the peer's minimum turnaround time.
    pub fn wait_min_turnaround(&mut self, qos: &TxQos) {
        if qos.baud_rate > MTT_BY_TIME_ABOVE {
            self.mtt_required = qos.min_turn_time_us;
            return;
        }
        self.xbofs_delay = min_turn_time_in_bytes(qos.baud_rate, qos.min_turn_time_us);
    }

    pub fn require_mtt(&mut self, mtt_us: u32) {
        self.mtt_required = mtt_us;
    }

    pub fn set_speed(&mut self, speed: u32) {
        self.speed = speed;
    }

    /// BOF count to switch to after the next frame.
    pub fn set_next_bofs(&mut self, xbofs: u32) {
        self.next_bofs = xbofs;
    }

    pub fn mtt_required(&self) -> u32 {
        self.mtt_required
    }

    pub fn xbofs_delay(&self) -> u32 {
        self.xbofs_delay
    }

    pub fn bofs_count(&self) -> u32 {
        self.bofs_count
    }

    pub fn speed(&self) -> u32 {
        self.speed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mtt_in_bytes() {
        assert_eq!(min_turn_time_in_bytes(9600, 10_000), 9);
        assert_eq!(min_turn_time_in_bytes(115_200, 1_000), 11);
        assert_eq!(min_turn_time_in_bytes(2400, 0), 0);
    }

    #[test]
    fn annotate_resets_one_shot_state() {
        let mut ta = Turnaround::new(9600, 10);
        ta.require_mtt(500);
        ta.set_next_bofs(4);

        let first = ta.annotate();
        assert_eq!(first.mtt, 500);
        assert_eq!(first.next_speed, 9600);
        assert_eq!(first.xbofs, 10);
        assert_eq!(first.next_xbofs, 4);

        let second = ta.annotate();
        assert_eq!(second.mtt, 0);
        assert_eq!(second.xbofs, 4);
        assert_eq!(second.xbofs_delay, 0);
    }

    #[test]
    fn slow_links_pad_with_xbofs() {
        let mut ta = Turnaround::new(9600, 10);
        ta.wait_min_turnaround(&TxQos {
            baud_rate: 9600,
            min_turn_time_us: 10_000,
        });
        assert_eq!(ta.mtt_required(), 0);
        assert_eq!(ta.xbofs_delay(), 9);
        assert_eq!(ta.annotate().xbofs_delay, 9);
        assert_eq!(ta.xbofs_delay(), 0);
    }

    #[test]
    fn fast_links_wait_by_time() {
        let mut ta = Turnaround::new(4_000_000, 0);
        ta.wait_min_turnaround(&TxQos {
            baud_rate: 4_000_000,
            min_turn_time_us: 1_000,
        });
        assert_eq!(ta.mtt_required(), 1_000);
        assert_eq!(ta.xbofs_delay(), 0);
    }
}
