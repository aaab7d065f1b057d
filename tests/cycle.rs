use ping_exporter::icmp::v4::SequenceNumber;
use ping_exporter::{
    render_metrics, Destination, PingError, Probe, ProbeOutcome, ProbeRunner, Resolve, ResultPublisher, RunnerConfig,
    SweepCoordinator,
};
use std::net::Ipv4Addr;
use std::sync::{Arc, Once};
use std::time::Duration;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

static SETUP: Once = Once::new();

fn setup() {
    SETUP.call_once(|| {
        let subscriber = FmtSubscriber::builder().with_max_level(Level::ERROR).finish();
        tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
    });
}

/// Replies after `sequence_number` milliseconds, except for addresses in 10.0.0.0/8.
struct FakeNetwork;

impl Probe for FakeNetwork {
    fn probe(&self, target: Ipv4Addr, sequence_number: SequenceNumber) -> ProbeOutcome {
        if target.octets()[0] == 10 {
            return ProbeOutcome::Timeout;
        }
        ProbeOutcome::Reply(Duration::from_millis(u64::from(u16::from(sequence_number))))
    }
}

struct FakeDns;

impl Resolve for FakeDns {
    fn resolve(&self, name: &str) -> Result<Vec<Ipv4Addr>, PingError> {
        match name {
            "dual.example" => Ok(vec![Ipv4Addr::new(192, 0, 2, 1), Ipv4Addr::new(192, 0, 2, 2)]),
            _ => Err(PingError::Resolution { name: name.to_owned(), message: "no such host".to_owned() }),
        }
    }
}

fn coordinator(destinations: Vec<Destination>) -> SweepCoordinator<FakeNetwork, FakeDns> {
    let runner = ProbeRunner::new(FakeNetwork, RunnerConfig { rounds: 3, interval: Duration::ZERO });
    SweepCoordinator::new(runner, FakeDns, destinations, Arc::new(ResultPublisher::new()))
}

#[test]
fn test_cycle_renders_every_identity() {
    setup();
    let destinations = ["dual.example", "10.1.1.1", "missing.example"]
        .iter()
        .map(|entry| Destination::parse(entry).unwrap())
        .collect();
    let coordinator = coordinator(destinations);

    coordinator.trigger().expect("no other cycle is running");
    let text = render_metrics(&coordinator.publisher().snapshot(), "ping");

    let expected = "\
ping_max_delay{domain=\"dual.example\",addr=\"192.0.2.1\"} 3
ping_min_delay{domain=\"dual.example\",addr=\"192.0.2.1\"} 1
ping_avg_delay{domain=\"dual.example\",addr=\"192.0.2.1\"} 2
ping_send{domain=\"dual.example\",addr=\"192.0.2.1\"} 3
ping_lost{domain=\"dual.example\",addr=\"192.0.2.1\"} 0
ping_max_delay{domain=\"dual.example\",addr=\"192.0.2.2\"} 3
ping_min_delay{domain=\"dual.example\",addr=\"192.0.2.2\"} 1
ping_avg_delay{domain=\"dual.example\",addr=\"192.0.2.2\"} 2
ping_send{domain=\"dual.example\",addr=\"192.0.2.2\"} 3
ping_lost{domain=\"dual.example\",addr=\"192.0.2.2\"} 0
ping_max_delay{domain=\"10.1.1.1\",addr=\"10.1.1.1\"} 0
ping_min_delay{domain=\"10.1.1.1\",addr=\"10.1.1.1\"} 0
ping_avg_delay{domain=\"10.1.1.1\",addr=\"10.1.1.1\"} 0
ping_send{domain=\"10.1.1.1\",addr=\"10.1.1.1\"} 3
ping_lost{domain=\"10.1.1.1\",addr=\"10.1.1.1\"} 3
";
    assert_eq!(expected, text);
}

#[test]
fn test_nothing_published_before_first_cycle() {
    setup();
    let coordinator = coordinator(vec![Destination::Literal(Ipv4Addr::new(192, 0, 2, 9))]);

    assert!(coordinator.publisher().snapshot().is_empty());
    assert_eq!("", render_metrics(&coordinator.publisher().snapshot(), "ping"));
}

#[test]
fn test_each_cycle_replaces_the_previous_snapshot() {
    setup();
    let coordinator = coordinator(vec![Destination::Literal(Ipv4Addr::new(192, 0, 2, 9))]);

    let first = coordinator.trigger().unwrap();
    let second = coordinator.trigger().unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&second, &coordinator.publisher().snapshot()));
    assert_eq!(1, second.len());
    assert!(!coordinator.is_running());
}
