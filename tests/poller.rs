use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use aperture::{Backend, PollEvent, Poller, Registry};

/// Flattens every sweep into a key/value map, the way a line-protocol backend would.
#[derive(Clone, Default)]
struct Capture {
    values: Arc<Mutex<HashMap<String, f64>>>,
    sweeps: Arc<AtomicUsize>,
}

impl Capture {
    fn take(&self) -> HashMap<String, f64> {
        std::mem::take(&mut *self.values.lock().unwrap())
    }

    fn sweeps(&self) -> usize {
        self.sweeps.load(Ordering::SeqCst)
    }
}

impl Backend for Capture {
    fn on_poll(&mut self, event: PollEvent<'_>) {
        match event {
            PollEvent::Begin => {}
            PollEvent::Metric(poll) => {
                let mut values = self.values.lock().unwrap();
                let _ = poll.normalize(|_ts, key, value| {
                    values.insert(key.to_string(), value);
                    ControlFlow::Continue(())
                });
            }
            PollEvent::Done => {
                self.sweeps.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

fn poller_with_capture(registry: &Registry, host: &str) -> (Poller, Capture) {
    let capture = Capture::default();
    let mut poller = Poller::new(registry);
    poller.set_host(host).unwrap();
    poller.add_backend(Box::new(capture.clone()));
    (poller, capture)
}

fn map(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
    pairs.iter().map(|(key, value)| (key.to_string(), *value)).collect()
}

#[test]
fn test_multi_gauge_windows() {
    let registry = Registry::create_at("prefix", 0).unwrap();
    let (mut poller, capture) = poller_with_capture(&registry, "host");

    let g1 = registry.create_gauge("g1").unwrap();
    let g2 = registry.create_gauge("g2").unwrap();
    let g3 = registry.create_gauge("g3").unwrap();
    g2.set(1.0);
    g3.set(1.2e-4);

    poller.poll_at(1);
    assert_eq!(
        capture.take(),
        map(&[("prefix.host.g1", 0.0), ("prefix.host.g2", 1.0), ("prefix.host.g3", 1.2e-4)])
    );

    // Gauges are sticky: g3 keeps reporting without a new set, while closed g1 drops out.
    let g4 = registry.create_gauge("g4").unwrap();
    assert!(g1.close());
    g2.set(2.0);
    g4.set(-1.0);

    poller.poll_at(2);
    assert_eq!(
        capture.take(),
        map(&[
            ("prefix.host.g2", 2.0),
            ("prefix.host.g3", 1.2e-4),
            ("prefix.host.g4", -1.0),
        ])
    );

    let g1 = registry.create_gauge("g1").unwrap();
    g1.set(1.0);

    poller.poll_at(3);
    assert_eq!(
        capture.take(),
        map(&[
            ("prefix.host.g1", 1.0),
            ("prefix.host.g2", 2.0),
            ("prefix.host.g3", 1.2e-4),
            ("prefix.host.g4", -1.0),
        ])
    );

    assert!(g1.close());
    assert!(g2.close());
    assert!(g3.close());
    assert!(g4.close());

    poller.poll_at(4);
    assert!(capture.take().is_empty());
}

#[test]
fn test_counter_rate_normalization() {
    let registry = Registry::create_at("r", 20).unwrap();
    let counter = registry.create_counter("l").unwrap();
    let (mut poller, capture) = poller_with_capture(&registry, "h");

    // The registry's clock sits ahead of the poll; elapsed falls back to one second.
    counter.inc(10);
    poller.poll_at(10);
    assert_eq!(capture.take(), map(&[("r.h.l", 10.0)]));

    counter.inc(10);
    poller.poll_at(20);
    assert_eq!(capture.take(), map(&[("r.h.l", 1.0)]));

    counter.inc(10);
    poller.poll_at(30);
    assert_eq!(capture.take(), map(&[("r.h.l", 1.0)]));

    // Polling twice at the same timestamp also clamps elapsed back to one.
    counter.inc(10);
    poller.poll_at(30);
    assert_eq!(capture.take(), map(&[("r.h.l", 10.0)]));
}

#[test]
fn test_dist_percentiles() {
    let registry = Registry::create_at("r", 0).unwrap();
    let dist = registry.create_dist("d").unwrap();
    let (mut poller, capture) = poller_with_capture(&registry, "h");

    for value in 1..=100 {
        dist.record(value as f64);
    }

    // Under the reservoir size nothing is sampled away, so percentiles are exact order
    // statistics of the recorded values.
    poller.poll_at(1);
    let values = capture.take();
    assert_eq!(values["r.h.d.count"], 100.0);
    assert_eq!(values["r.h.d.p50"], 51.0);
    assert_eq!(values["r.h.d.p90"], 91.0);
    assert_eq!(values["r.h.d.p99"], 100.0);
    assert_eq!(values["r.h.d.max"], 100.0);
}

#[test]
fn test_histo_boundaries() {
    let registry = Registry::create_at("r", 0).unwrap();
    let histo = registry.create_histo("h", &[10, 20, 30, 40]).unwrap();
    let (mut poller, capture) = poller_with_capture(&registry, "host");

    for value in [5.0, 10.0, 15.0, 20.0, 25.0, 30.0, 35.0, 40.0] {
        histo.record(value);
    }

    poller.poll_at(1);
    assert_eq!(
        capture.take(),
        map(&[
            ("r.host.h.below", 1.0),
            ("r.host.h.20", 2.0),
            ("r.host.h.30", 2.0),
            ("r.host.h.40", 2.0),
            ("r.host.h.above", 1.0),
        ])
    );
}

#[test]
fn test_quantile_convergence() {
    let registry = Registry::create_at("r", 0).unwrap();
    let quantile = registry.create_quantile("q", 0.5, 0.0, 1.0).unwrap();
    let (mut poller, capture) = poller_with_capture(&registry, "h");

    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..10_000 {
        quantile.update(rng.random_range(0.0..100.0));
    }

    poller.poll_at(1);
    let sample = capture.take()["r.h.q"];
    assert!((sample - 50.0).abs() < 5.0, "estimate drifted to {}", sample);
}

#[test]
fn test_no_loss_across_threads() {
    let registry = Registry::create_at("r", 0).unwrap();
    let counter = registry.create_counter("hits").unwrap();
    let (mut poller, capture) = poller_with_capture(&registry, "h");

    crossbeam_utils::thread::scope(|s| {
        for _ in 0..4 {
            let counter = counter.clone();
            s.spawn(move |_| {
                for _ in 0..10_000 {
                    counter.inc(1);
                }
            });
        }
    })
    .unwrap();

    // All recorders are done, so two sweeps cover both slots with no stragglers to lose.
    poller.poll_at(1);
    let first = capture.take()["r.h.hits"];
    poller.poll_at(2);
    let second = capture.take()["r.h.hits"];
    assert_eq!(first + second, 40_000.0);
}

#[test]
fn test_idle_windows_read_as_reset() {
    let registry = Registry::create_at("r", 0).unwrap();
    let (mut poller, capture) = poller_with_capture(&registry, "h");

    let counter = registry.create_counter("c").unwrap();
    let gauge = registry.create_gauge("g").unwrap();
    let dist = registry.create_dist("d").unwrap();
    let histo = registry.create_histo("hg", &[1, 2]).unwrap();
    let quantile = registry.create_quantile("q", 0.5, 10.0, 1.0).unwrap();

    counter.inc(7);
    gauge.set(3.5);
    dist.record(1.0);
    histo.record(1.5);
    quantile.update(10.0);

    poller.poll_at(1);
    let busy = capture.take();
    assert_eq!(busy["r.h.c"], 7.0);
    assert_eq!(busy["r.h.d.count"], 1.0);
    assert_eq!(busy["r.h.hg.2"], 1.0);

    // Two idle sweeps drain both slots: rates go to zero, the gauge sticks, and the quantile
    // estimate stays put with an empty observation count.
    poller.poll_at(2);
    poller.poll_at(3);
    let idle = capture.take();
    assert_eq!(idle["r.h.c"], 0.0);
    assert_eq!(idle["r.h.g"], 3.5);
    assert_eq!(idle["r.h.d.count"], 0.0);
    assert_eq!(idle["r.h.d.p50"], 0.0);
    assert_eq!(idle["r.h.d.max"], 0.0);
    assert_eq!(idle["r.h.hg.below"], 0.0);
    assert_eq!(idle["r.h.hg.2"], 0.0);
    assert_eq!(idle["r.h.hg.above"], 0.0);
    assert_eq!(idle["r.h.q"], busy["r.h.q"]);
}

#[test]
fn test_create_close_churn() {
    let registry = Registry::create_at("r", 0).unwrap();
    let (mut poller, capture) = poller_with_capture(&registry, "h");

    let mut ts = 0;
    for round in 0..10u64 {
        let keep = registry.counter("keep").unwrap();
        keep.inc(1);

        let transient = registry.create_counter(&format!("t{}", round)).unwrap();
        transient.inc(1);

        ts += 1;
        poller.poll_at(ts);
        let values = capture.take();
        assert_eq!(values["r.h.keep"], 1.0);
        assert_eq!(values[&format!("r.h.t{}", round)], 1.0);
        assert_eq!(values.len(), 2);

        assert!(transient.close());
    }

    ts += 1;
    poller.poll_at(ts);
    let values = capture.take();
    assert_eq!(values.len(), 1);
    assert_eq!(values["r.h.keep"], 0.0);
}

#[test]
fn test_events_bracket_each_sweep() {
    #[derive(Clone, Default)]
    struct EventLog {
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Backend for EventLog {
        fn on_poll(&mut self, event: PollEvent<'_>) {
            let name = match event {
                PollEvent::Begin => "begin",
                PollEvent::Metric(_) => "metric",
                PollEvent::Done => "done",
            };
            self.log.lock().unwrap().push(name);
        }
    }

    let registry = Registry::create_at("r", 0).unwrap();
    registry.create_counter("a").unwrap();
    registry.create_counter("b").unwrap();

    let events = EventLog::default();
    let mut poller = Poller::new(&registry);
    poller.add_backend(Box::new(events.clone()));

    poller.poll_at(1);
    poller.poll_at(2);

    let log = events.log.lock().unwrap().clone();
    let expected = ["begin", "metric", "metric", "done"];
    assert_eq!(log.len(), 8);
    assert_eq!(&log[..4], &expected[..]);
    assert_eq!(&log[4..], &expected[..]);
}

#[test]
fn test_background_poller() {
    let registry = Registry::create("bg").unwrap();
    let counter = registry.counter("ticks").unwrap();
    let (poller, capture) = poller_with_capture(&registry, "");

    let handle = poller.spawn(Duration::from_millis(10)).unwrap();
    counter.inc(5);
    thread::sleep(Duration::from_millis(150));
    handle.stop();

    assert!(capture.sweeps() >= 1);
    assert!(capture.take().contains_key("bg.ticks"));
}
