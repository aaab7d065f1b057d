use crate::{resolve_destinations, Destination, PingStat, Probe, ProbeRunner, Resolve, ResultPublisher, ResultSet, Target};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Instant;

/// Marks a cycle as running until dropped, whichever way the cycle ends.
struct CycleGuard<'a>(&'a AtomicBool);

impl<'a> CycleGuard<'a> {
    fn acquire(running: &'a AtomicBool) -> Option<Self> {
        running.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).ok().map(|_| CycleGuard(running))
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs measurement cycles over a fixed destination list and publishes each finished cycle.
pub struct SweepCoordinator<P, R> {
    runner: ProbeRunner<P>,
    resolver: R,
    destinations: Vec<Destination>,
    publisher: Arc<ResultPublisher>,
    /// 0 means one worker per address.
    max_concurrency: usize,
    running: AtomicBool,
}

impl<P, R> SweepCoordinator<P, R>
where
    P: Probe,
    R: Resolve,
{
    pub fn new(
        runner: ProbeRunner<P>,
        resolver: R,
        destinations: Vec<Destination>,
        publisher: Arc<ResultPublisher>,
    ) -> Self {
        SweepCoordinator { runner, resolver, destinations, publisher, max_concurrency: 0, running: AtomicBool::new(false) }
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn runner(&self) -> &ProbeRunner<P> {
        &self.runner
    }

    pub fn publisher(&self) -> &Arc<ResultPublisher> {
        &self.publisher
    }

    /// Resolves the destinations and runs one cycle over them.
    ///
    /// Returns `None` without doing anything if a cycle is already running.
    pub fn trigger(&self) -> Option<Arc<ResultSet>> {
        let Some(_guard) = CycleGuard::acquire(&self.running) else {
            tracing::info!("previous cycle still running, skipping this one");
            return None;
        };
        let targets = resolve_destinations(&self.destinations, &self.resolver);
        Some(self.sweep(&targets))
    }

    /// Probes `targets` and publishes the result as one unit.
    ///
    /// Returns `None` without doing anything if a cycle is already running.
    pub fn run_cycle(&self, targets: &[Target]) -> Option<Arc<ResultSet>> {
        let Some(_guard) = CycleGuard::acquire(&self.running) else {
            tracing::info!("previous cycle still running, skipping this one");
            return None;
        };
        Some(self.sweep(targets))
    }

    fn sweep(&self, targets: &[Target]) -> Arc<ResultSet> {
        let start = Instant::now();
        let addresses = unique_addresses(targets);
        tracing::info!("cycle started: {} targets, {} unique addresses", targets.len(), addresses.len());

        let stats = self.probe_all(&addresses);

        let mut result_set = ResultSet::new();
        for target in targets {
            if let Some(stat) = stats.get(&target.resolved_address) {
                result_set.insert(target.id(), *stat);
            }
        }
        tracing::info!("cycle finished in {:?}: {} results", start.elapsed(), result_set.len());
        self.publisher.publish(result_set)
    }

    // Workers take the next address from a shared index until none are left.
    fn probe_all(&self, addresses: &[Ipv4Addr]) -> HashMap<Ipv4Addr, PingStat> {
        if addresses.is_empty() {
            return HashMap::new();
        }
        let workers = match self.max_concurrency {
            0 => addresses.len(),
            max => max.min(addresses.len()),
        };
        let next_index = AtomicUsize::new(0);
        let (stat_tx, stat_rx) = mpsc::channel::<(Ipv4Addr, PingStat)>();

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let stat_tx = stat_tx.clone();
                    let next_index = &next_index;
                    scope.spawn(move || {
                        while let Some(addr) = addresses.get(next_index.fetch_add(1, Ordering::Relaxed)) {
                            // A panic loses this address only; the worker moves on to the next one.
                            let Ok(stat) = panic::catch_unwind(AssertUnwindSafe(|| self.runner.run(*addr))) else {
                                tracing::error!("probing {} panicked, it is left out of this cycle", addr);
                                continue;
                            };
                            if stat_tx.send((*addr, stat)).is_err() {
                                break;
                            }
                        }
                    })
                })
                .collect();
            for handle in handles {
                if handle.join().is_err() {
                    tracing::error!("probe worker panicked");
                }
            }
        });
        drop(stat_tx);

        stat_rx.into_iter().collect()
    }
}

/// Resolved addresses in first-seen order, each once.
fn unique_addresses(targets: &[Target]) -> Vec<Ipv4Addr> {
    let mut addresses: Vec<Ipv4Addr> = Vec::with_capacity(targets.len());
    for target in targets {
        if !addresses.contains(&target.resolved_address) {
            addresses.push(target.resolved_address);
        }
    }
    addresses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icmp::v4::SequenceNumber;
    use crate::probe_runner::tests::{Scripted, ScriptedProbe};
    use crate::target::tests::TableResolver;
    use crate::{ProbeOutcome, RunnerConfig, TargetId};
    use more_asserts as ma;
    use std::sync::Barrier;
    use std::time::Duration;

    const LOCALHOST: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);

    fn runner<P: Probe>(prober: P, rounds: u16) -> ProbeRunner<P> {
        ProbeRunner::new(prober, RunnerConfig { rounds, interval: Duration::ZERO })
    }

    fn coordinator<P: Probe>(
        prober: P,
        rounds: u16,
        resolver: TableResolver,
        destinations: Vec<Destination>,
    ) -> SweepCoordinator<P, TableResolver> {
        SweepCoordinator::new(runner(prober, rounds), resolver, destinations, Arc::new(ResultPublisher::new()))
    }

    fn domain(name: &str) -> Destination {
        Destination::Domain(name.to_owned())
    }

    fn ms(millis: u64) -> Scripted {
        Scripted::Reply(Duration::from_millis(millis))
    }

    #[test]
    fn localhost_cycle_publishes_stats() {
        let prober = ScriptedProbe::default().with(LOCALHOST, vec![ms(1), ms(2), ms(3)]);
        let coordinator =
            coordinator(prober, 3, TableResolver::default(), vec![Destination::Literal(LOCALHOST)]);

        let result_set = coordinator.trigger().unwrap();

        let expected = PingStat {
            sent: 3,
            received: 3,
            loss_percent: 0,
            min_delay_ms: 1.0,
            avg_delay_ms: 2.0,
            max_delay_ms: 3.0,
        };
        assert_eq!(Some(&expected), result_set.get(&Target::literal(LOCALHOST).id()));
        assert_eq!(result_set, coordinator.publisher().snapshot());
    }

    #[test]
    fn shared_address_is_probed_once() {
        let shared = Ipv4Addr::new(10, 0, 0, 7);
        let prober = ScriptedProbe::default().with(shared, vec![ms(5), Scripted::Timeout]);
        let resolver = TableResolver::default().with("a.example.com", &[shared]).with("b.example.com", &[shared]);
        let coordinator = coordinator(prober, 2, resolver, vec![domain("a.example.com"), domain("b.example.com")]);

        let result_set = coordinator.trigger().unwrap();

        assert_eq!(2, coordinator.runner().prober().calls().len());
        let a = result_set.get(&Target::resolved("a.example.com", shared).id()).unwrap();
        let b = result_set.get(&Target::resolved("b.example.com", shared).id()).unwrap();
        assert_eq!(a, b);
        assert_eq!(50, a.loss_percent);
    }

    #[test]
    fn domain_with_two_addresses_yields_two_identities() {
        let first = Ipv4Addr::new(10, 0, 0, 1);
        let second = Ipv4Addr::new(10, 0, 0, 2);
        let prober = ScriptedProbe::default().with(first, vec![ms(1)]).with(second, vec![Scripted::Timeout]);
        let resolver = TableResolver::default().with("two.example.com", &[first, second]);
        let coordinator = coordinator(prober, 1, resolver, vec![domain("two.example.com")]);

        let result_set = coordinator.trigger().unwrap();

        let ids: Vec<TargetIdView> = result_set.ids().map(|id| (id.name.clone(), id.addr)).collect();
        assert_eq!(vec![("two.example.com".to_owned(), first), ("two.example.com".to_owned(), second)], ids);
        assert_eq!(1, result_set.get(&Target::resolved("two.example.com", first).id()).unwrap().received);
        assert_eq!(0, result_set.get(&Target::resolved("two.example.com", second).id()).unwrap().received);
    }

    type TargetIdView = (String, Ipv4Addr);

    #[test]
    fn results_follow_declaration_order() {
        let addrs: Vec<Ipv4Addr> = (1..=6).rev().map(|i| Ipv4Addr::new(10, 0, 1, i)).collect();
        let targets: Vec<Target> = addrs.iter().map(|ip| Target::literal(*ip)).collect();
        let coordinator = coordinator(ScriptedProbe::default(), 1, TableResolver::default(), vec![]);

        let result_set = coordinator.run_cycle(&targets).unwrap();

        let published: Vec<Ipv4Addr> = result_set.ids().map(|id| id.addr).collect();
        assert_eq!(addrs, published);
    }

    #[test]
    fn unresolved_destination_is_left_out() {
        let coordinator = coordinator(
            ScriptedProbe::default(),
            1,
            TableResolver::default(),
            vec![domain("missing.example.com"), Destination::Literal(LOCALHOST)],
        );

        let result_set = coordinator.trigger().unwrap();

        let ids: Vec<String> = result_set.ids().map(ToString::to_string).collect();
        assert_eq!(vec!["127.0.0.1|127.0.0.1".to_owned()], ids);
    }

    #[test]
    fn stale_identities_are_dropped_by_the_next_cycle() {
        let a = Target::literal(Ipv4Addr::new(10, 0, 0, 1));
        let b = Target::literal(Ipv4Addr::new(10, 0, 0, 2));
        let coordinator = coordinator(ScriptedProbe::default(), 1, TableResolver::default(), vec![]);

        coordinator.run_cycle(&[a.clone(), b.clone()]).unwrap();
        coordinator.run_cycle(&[b.clone()]).unwrap();

        let snapshot = coordinator.publisher().snapshot();
        assert_eq!(None, snapshot.get(&a.id()));
        assert!(snapshot.get(&b.id()).is_some());
        assert_eq!(1, snapshot.len());
    }

    #[test]
    fn no_targets_publishes_empty_result_set() {
        let coordinator = coordinator(ScriptedProbe::default(), 3, TableResolver::default(), vec![]);
        coordinator.publisher().publish({
            let mut old = ResultSet::new();
            old.insert(Target::literal(LOCALHOST).id(), PingStat::default());
            old
        });

        let result_set = coordinator.trigger().unwrap();

        assert!(result_set.is_empty());
        assert!(coordinator.publisher().snapshot().is_empty());
    }

    /// Blocks inside the first probe until released.
    struct GatedProbe {
        started: Barrier,
        release: Barrier,
        calls: AtomicUsize,
    }

    impl Probe for GatedProbe {
        fn probe(&self, _target: Ipv4Addr, _sequence_number: SequenceNumber) -> ProbeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.wait();
            self.release.wait();
            ProbeOutcome::Reply(Duration::from_millis(1))
        }
    }

    #[test]
    fn trigger_during_running_cycle_is_skipped() {
        let prober = GatedProbe { started: Barrier::new(2), release: Barrier::new(2), calls: AtomicUsize::new(0) };
        let coordinator =
            Arc::new(coordinator(prober, 1, TableResolver::default(), vec![Destination::Literal(LOCALHOST)]));

        let background = {
            let coordinator = coordinator.clone();
            std::thread::spawn(move || coordinator.trigger())
        };
        coordinator.runner().prober().started.wait();

        assert!(coordinator.is_running());
        assert_eq!(None, coordinator.trigger());
        assert_eq!(None, coordinator.run_cycle(&[Target::literal(LOCALHOST)]));

        coordinator.runner().prober().release.wait();
        let result_set = background.join().unwrap().unwrap();

        assert!(!coordinator.is_running());
        assert_eq!(1, coordinator.runner().prober().calls.load(Ordering::SeqCst));
        assert_eq!(result_set, coordinator.publisher().snapshot());
        assert_eq!(1, result_set.get(&Target::literal(LOCALHOST).id()).unwrap().received);
    }

    struct PanickingProbe {
        bad: Ipv4Addr,
    }

    impl Probe for PanickingProbe {
        fn probe(&self, target: Ipv4Addr, _sequence_number: SequenceNumber) -> ProbeOutcome {
            assert!(target != self.bad, "simulated worker failure");
            ProbeOutcome::Reply(Duration::from_millis(1))
        }
    }

    #[test]
    fn worker_panic_is_contained_and_guard_released() {
        let bad = Ipv4Addr::new(10, 0, 0, 66);
        let destinations = vec![Destination::Literal(bad), Destination::Literal(LOCALHOST)];
        let coordinator = coordinator(PanickingProbe { bad }, 2, TableResolver::default(), destinations);

        let result_set = coordinator.trigger().unwrap();

        assert_eq!(None, result_set.get(&Target::literal(bad).id()));
        assert_eq!(2, result_set.get(&Target::literal(LOCALHOST).id()).unwrap().received);
        assert!(!coordinator.is_running());
        assert!(coordinator.trigger().is_some());
    }

    #[test]
    fn panic_with_single_worker_keeps_probing_remaining_addresses() {
        let bad = Ipv4Addr::new(10, 0, 0, 66);
        let other = Ipv4Addr::new(10, 0, 0, 67);
        let destinations =
            vec![Destination::Literal(bad), Destination::Literal(LOCALHOST), Destination::Literal(other)];
        let coordinator =
            coordinator(PanickingProbe { bad }, 2, TableResolver::default(), destinations).with_max_concurrency(1);

        let result_set = coordinator.trigger().unwrap();

        assert_eq!(None, result_set.get(&Target::literal(bad).id()));
        assert_eq!(2, result_set.get(&Target::literal(LOCALHOST).id()).unwrap().received);
        assert_eq!(2, result_set.get(&Target::literal(other).id()).unwrap().received);
        let ids: Vec<TargetId> = result_set.ids().cloned().collect();
        assert_eq!(vec![Target::literal(LOCALHOST).id(), Target::literal(other).id()], ids);
        assert!(!coordinator.is_running());
    }

    /// Records the highest number of probes in flight at once.
    #[derive(Default)]
    struct CountingProbe {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl Probe for CountingProbe {
        fn probe(&self, _target: Ipv4Addr, _sequence_number: SequenceNumber) -> ProbeOutcome {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            ProbeOutcome::Timeout
        }
    }

    #[test]
    fn max_concurrency_caps_workers() {
        let destinations: Vec<Destination> = (1..=6).map(|i| Destination::Literal(Ipv4Addr::new(10, 0, 2, i))).collect();
        let coordinator =
            coordinator(CountingProbe::default(), 1, TableResolver::default(), destinations).with_max_concurrency(2);

        let result_set = coordinator.trigger().unwrap();

        assert_eq!(6, result_set.len());
        assert_eq!(6, coordinator.runner().prober().calls.load(Ordering::SeqCst));
        ma::assert_le!(coordinator.runner().prober().peak.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unique_addresses_keep_first_seen_order() {
        let a = Ipv4Addr::new(10, 0, 0, 1);
        let b = Ipv4Addr::new(10, 0, 0, 2);
        let targets = vec![Target::resolved("x.example.com", b), Target::literal(a), Target::resolved("y.example.com", b)];
        assert_eq!(vec![b, a], unique_addresses(&targets));
    }
}
