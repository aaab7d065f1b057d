use crate::icmp::v4::SequenceNumber;
use crate::{PingStat, PingStatAccumulator, ProbeOutcome};
use std::net::Ipv4Addr;
use std::time::Duration;

/// One echo round trip to one address.
pub trait Probe: Send + Sync {
    fn probe(&self, target: Ipv4Addr, sequence_number: SequenceNumber) -> ProbeOutcome;
}

#[derive(Clone, Copy, Debug)]
pub struct RunnerConfig {
    pub rounds: u16,
    /// Fixed pause between two rounds.
    pub interval: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig { rounds: 5, interval: Duration::from_millis(800) }
    }
}

pub struct ProbeRunner<P> {
    prober: P,
    config: RunnerConfig,
}

impl<P> ProbeRunner<P>
where
    P: Probe,
{
    pub fn new(prober: P, config: RunnerConfig) -> Self {
        ProbeRunner { prober, config }
    }

    pub fn prober(&self) -> &P {
        &self.prober
    }

    pub fn config(&self) -> RunnerConfig {
        self.config
    }

    pub fn run(&self, target: Ipv4Addr) -> PingStat {
        self.run_with_progress(target, |_| {})
    }

    /// Like `run`, handing the cumulative statistics to `on_round` after every round.
    pub fn run_with_progress<F>(&self, target: Ipv4Addr, mut on_round: F) -> PingStat
    where
        F: FnMut(&PingStat),
    {
        let mut accumulator = PingStatAccumulator::new();
        let mut sequence_number = SequenceNumber::start_value();
        for round in 0..self.config.rounds {
            if round > 0 && !self.config.interval.is_zero() {
                std::thread::sleep(self.config.interval);
            }

            match self.prober.probe(target, sequence_number) {
                ProbeOutcome::Reply(rtt) => {
                    tracing::trace!("{} seq {}: reply in {:?}", target, sequence_number, rtt);
                    accumulator.record_reply(rtt);
                }
                outcome => {
                    tracing::trace!("{} seq {}: {:?}", target, sequence_number, outcome);
                    accumulator.record_loss();
                }
            }
            on_round(&accumulator.stat());
            sequence_number = sequence_number.next();
        }

        let stat = accumulator.stat();
        tracing::debug!(
            "{}: sent {} received {} loss {}% min/avg/max {:.3}/{:.3}/{:.3} ms",
            target,
            stat.sent,
            stat.received,
            stat.loss_percent,
            stat.min_delay_ms,
            stat.avg_delay_ms,
            stat.max_delay_ms
        );
        stat
    }
}
