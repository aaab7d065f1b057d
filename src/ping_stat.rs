use std::time::Duration;

/// Latency and loss of one address over one measurement cycle.
///
/// When nothing was received all delays are `0.0`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PingStat {
    pub sent: u32,
    pub received: u32,
    /// `round(100 * (sent - received) / sent)`, 0 before anything was sent.
    pub loss_percent: u8,
    pub min_delay_ms: f64,
    pub avg_delay_ms: f64,
    pub max_delay_ms: f64,
}

impl PingStat {
    #[must_use]
    pub fn lost(&self) -> u32 {
        self.sent - self.received
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn loss_percent(sent: u32, received: u32) -> u8 {
    if sent == 0 {
        return 0;
    }
    let lost = f64::from(sent - received);
    (lost * 100.0 / f64::from(sent)).round() as u8
}

/// Folds probe rounds into a `PingStat`, keeping it consistent after every round.
#[derive(Clone, Debug, Default)]
pub struct PingStatAccumulator {
    stat: PingStat,
    sum_delay_ms: f64,
}

impl PingStatAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn record_reply(&mut self, rtt: Duration) {
        let delay_ms = rtt.as_nanos() as f64 / 1_000_000.0;
        let stat = &mut self.stat;
        if stat.received == 0 {
            stat.min_delay_ms = delay_ms;
            stat.max_delay_ms = delay_ms;
        } else {
            stat.min_delay_ms = stat.min_delay_ms.min(delay_ms);
            stat.max_delay_ms = stat.max_delay_ms.max(delay_ms);
        }
        stat.sent += 1;
        stat.received += 1;
        self.sum_delay_ms += delay_ms;
        stat.avg_delay_ms = (self.sum_delay_ms / f64::from(stat.received)).clamp(stat.min_delay_ms, stat.max_delay_ms);
        stat.loss_percent = loss_percent(stat.sent, stat.received);
    }

    pub fn record_loss(&mut self) {
        self.stat.sent += 1;
        self.stat.loss_percent = loss_percent(self.stat.sent, self.stat.received);
    }

    #[must_use]
    pub fn stat(&self) -> PingStat {
        self.stat
    }
}
