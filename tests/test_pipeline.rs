use crossbeam::channel::{unbounded, Receiver, Sender};
use ring_pipeline::{
    ChannelCapacity, ConsoleReader, MapStage, PassthroughStage, PipelineBuilder, PipelineConfig,
    PipelineError, ReadOutcome, Result as PipelineResult, ShutdownMode, Stage, StageMetrics,
    Value,
};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn config(capacity: i64) -> PipelineConfig {
    PipelineConfig::from_raw(capacity, 1).expect("valid config")
}

fn collecting_sink() -> (impl FnMut(Value) + Send + 'static, Receiver<Value>) {
    let (tx, rx) = unbounded();
    (
        move |v: Value| {
            let _ = tx.send(v);
        },
        rx,
    )
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn tick(ticks: &Sender<Instant>, n: usize) {
    for _ in 0..n {
        ticks.send(Instant::now()).expect("buffer ticker closed");
    }
}

fn wait_for_writes(metrics: &StageMetrics, n: u64) {
    wait_until("buffer writes", || metrics.total_received() >= n);
}

#[test]
fn test_filter_chain_scenario() {
    let (tick_tx, tick_rx) = unbounded();
    let (sink, seen) = collecting_sink();
    let mut running = PipelineBuilder::filter_chain(config(3))
        .with_ticker(tick_rx)
        .build()
        .expect("Pipeline build failed")
        .start(sink)
        .expect("Pipeline start failed");
    let input = running.take_input().expect("input available");

    for v in [5, -2, 9, 6, 0] {
        input.send(v).expect("Send failed");
    }
    let first = running.stage_metrics(0).expect("stage 0").clone();
    let second = running.stage_metrics(1).expect("stage 1").clone();
    wait_until("positivity filter", || first.total_received() == 5);
    wait_until("multiple-of-three filter", || second.total_received() == 3);
    wait_for_writes(running.buffer_metrics(), 2);

    tick(&tick_tx, 2);
    assert_eq!(seen.recv().expect("first emission"), 9);
    assert_eq!(seen.recv().expect("second emission"), 6);

    // Buffer is now empty: another tick emits nothing.
    tick(&tick_tx, 1);
    let buffer = running.buffer_metrics().clone();
    input.shutdown();
    running.wait().expect("Wait failed");

    assert_eq!(seen.iter().count(), 0);
    assert_eq!(first.total_dropped(), 2);
    assert_eq!(second.total_dropped(), 1);
    assert_eq!(buffer.total_forwarded(), 2);
    assert_eq!(buffer.total_dropped(), 0);
}

#[test]
fn test_overwrite_scenario() {
    let (tick_tx, tick_rx) = unbounded();
    let (sink, seen) = collecting_sink();
    let mut running = PipelineBuilder::new(config(2))
        .with_ticker(tick_rx)
        .build()
        .expect("Pipeline build failed")
        .start(sink)
        .expect("Pipeline start failed");
    let input = running.take_input().expect("input available");

    for v in [1, 2, 3] {
        input.send(v).expect("Send failed");
    }
    let buffer = running.buffer_metrics().clone();
    wait_until("overwrite", || buffer.total_dropped() == 1);
    assert_eq!(buffer.total_received(), 3);

    tick(&tick_tx, 2);
    assert_eq!(seen.recv().expect("first emission"), 2);
    assert_eq!(seen.recv().expect("second emission"), 3);

    input.shutdown();
    running.wait().expect("Wait failed");
    assert_eq!(seen.iter().count(), 0);
}

#[test]
fn test_exit_with_values_in_flight() {
    let (tick_tx, tick_rx) = unbounded();
    let (sink, seen) = collecting_sink();
    let mut running = PipelineBuilder::filter_chain(config(2))
        .with_ticker(tick_rx)
        .build()
        .expect("Pipeline build failed")
        .start(sink)
        .expect("Pipeline start failed");
    let input = running.take_input().expect("input available");

    input.send(3).expect("Send failed");
    wait_for_writes(running.buffer_metrics(), 1);
    tick(&tick_tx, 1);
    assert_eq!(seen.recv().expect("drained value"), 3);

    let mut notices = Vec::new();
    let outcome = ConsoleReader::new(Cursor::new("6\n9\n12\nexit\n15\n"), &mut notices)
        .run(input)
        .expect("reader failed");
    assert_eq!(outcome, ReadOutcome::Exit);

    running.wait().expect("Wait failed");
    // Retained values are discarded on exit; nothing after "exit" was read.
    assert_eq!(seen.iter().count(), 0);
    // Exit is announced once, by the reader.
    assert_eq!(
        String::from_utf8(notices).unwrap(),
        "exit requested, stopping pipeline\n"
    );
}

#[test]
fn test_flush_on_exit_emits_ordered_survivors() {
    let (_tick_tx, tick_rx) = unbounded();
    let (sink, seen) = collecting_sink();
    let mut running =
        PipelineBuilder::filter_chain(config(2).with_shutdown_mode(ShutdownMode::Flush))
            .with_ticker(tick_rx)
            .build()
            .expect("Pipeline build failed")
            .start(sink)
            .expect("Pipeline start failed");
    let input = running.take_input().expect("input available");

    for v in [3, 6, 9] {
        input.send(v).expect("Send failed");
    }
    wait_for_writes(running.buffer_metrics(), 3);
    input.shutdown();
    running.wait().expect("Wait failed");

    assert_eq!(seen.iter().collect::<Vec<_>>(), vec![6, 9]);
}

#[test]
fn test_reader_rejects_bad_tokens_and_continues() {
    let (tick_tx, tick_rx) = unbounded();
    let (sink, seen) = collecting_sink();
    let mut running = PipelineBuilder::filter_chain(config(4))
        .with_ticker(tick_rx)
        .build()
        .expect("Pipeline build failed")
        .start(sink)
        .expect("Pipeline start failed");
    let input = running.take_input().expect("input available");
    let buffer = running.buffer_metrics().clone();

    let mut notices = Vec::new();
    let outcome = ConsoleReader::new(Cursor::new("4 abc 9\n2.5\n  -3 18 \n"), &mut notices)
        .run(input)
        .expect("reader failed");
    assert_eq!(outcome, ReadOutcome::EndOfInput);

    let notices = String::from_utf8(notices).unwrap();
    assert!(notices.contains("only integers are accepted: \"abc\""));
    assert!(notices.contains("only integers are accepted: \"2.5\""));

    wait_for_writes(&buffer, 2);
    tick(&tick_tx, 2);
    running.wait().expect("Wait failed");
    assert_eq!(seen.iter().collect::<Vec<_>>(), vec![9, 18]);
}

#[test]
fn test_reader_skips_non_utf8_line() {
    let (tick_tx, tick_rx) = unbounded();
    let (sink, seen) = collecting_sink();
    let mut running = PipelineBuilder::filter_chain(config(4))
        .with_ticker(tick_rx)
        .build()
        .expect("Pipeline build failed")
        .start(sink)
        .expect("Pipeline start failed");
    let input = running.take_input().expect("input available");
    let buffer = running.buffer_metrics().clone();

    let mut notices = Vec::new();
    let outcome = ConsoleReader::new(Cursor::new(&b"\xff\xfe 3\n9\n"[..]), &mut notices)
        .run(input)
        .expect("a non-UTF-8 line must not end the reader");
    assert_eq!(outcome, ReadOutcome::EndOfInput);

    let notices = String::from_utf8(notices).unwrap();
    assert!(notices.starts_with("only integers are accepted: "));
    assert_eq!(notices.lines().count(), 1);

    // The whole bad line is skipped, including the 3 on it.
    wait_for_writes(&buffer, 1);
    tick(&tick_tx, 1);
    running.wait().expect("Wait failed");
    assert_eq!(seen.iter().collect::<Vec<_>>(), vec![9]);
    assert_eq!(buffer.total_received(), 1);
}

#[test]
fn test_oversized_capacity_fails_build() {
    assert!(matches!(
        PipelineConfig::from_raw(i64::MAX, 1),
        Err(PipelineError::ConfigError(_))
    ));

    let mut config = config(1);
    config.capacity = usize::MAX / 2;
    assert!(matches!(
        PipelineBuilder::filter_chain(config).build(),
        Err(PipelineError::ConfigError(_))
    ));
}

#[test]
fn test_end_of_input_drains_and_stops() {
    let (tick_tx, tick_rx) = unbounded();
    let (sink, seen) = collecting_sink();
    let mut running = PipelineBuilder::filter_chain(config(3))
        .with_ticker(tick_rx)
        .build()
        .expect("Pipeline build failed")
        .start(sink)
        .expect("Pipeline start failed");
    let shutdown = running.shutdown_handle();
    let input = running.take_input().expect("input available");
    let buffer = running.buffer_metrics().clone();

    let outcome = ConsoleReader::new(Cursor::new("3 6\n"), Vec::new())
        .run(input)
        .expect("reader failed");
    assert_eq!(outcome, ReadOutcome::EndOfInput);

    wait_for_writes(&buffer, 2);
    tick(&tick_tx, 2);
    running.wait().expect("Wait failed");

    assert!(!shutdown.is_fired());
    assert_eq!(seen.iter().collect::<Vec<_>>(), vec![3, 6]);
}

#[test]
fn test_idempotent_shutdown() {
    struct CountingStage {
        stops: Arc<AtomicUsize>,
    }

    impl Stage for CountingStage {
        fn process(&mut self, value: Value) -> PipelineResult<Option<Value>> {
            Ok(Some(value))
        }

        fn on_shutdown(&mut self) -> PipelineResult<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &str {
            "counter"
        }
    }

    let stops = Arc::new(AtomicUsize::new(0));
    let (_tick_tx, tick_rx) = unbounded();
    let mut running = PipelineBuilder::new(config(2))
        .add_stage(CountingStage {
            stops: Arc::clone(&stops),
        })
        .add_stage(CountingStage {
            stops: Arc::clone(&stops),
        })
        .with_ticker(tick_rx)
        .build()
        .expect("Pipeline build failed")
        .start(|_: Value| {})
        .expect("Pipeline start failed");
    let shutdown = running.shutdown_handle();
    let input = running.take_input().expect("input available");

    assert!(shutdown.fire());
    assert!(!shutdown.fire());
    assert!(matches!(input.send(1), Err(PipelineError::ShutDown)));
    wait_until("pipeline threads", || running.is_finished());
    assert!(!shutdown.fire());

    running.shutdown().expect("Shutdown failed");
    assert_eq!(stops.load(Ordering::SeqCst), 2);
}

#[test]
fn test_order_preserved_through_chain() {
    let (tick_tx, tick_rx) = unbounded();
    let (sink, seen) = collecting_sink();
    let mut running = PipelineBuilder::filter_chain(
        config(64).with_channel_capacity(ChannelCapacity::Bounded(4)),
    )
    .add_stage(MapStage::new("negate", |v: Value| Ok(-v)))
    .with_ticker(tick_rx)
    .build()
    .expect("Pipeline build failed")
    .start(sink)
    .expect("Pipeline start failed");
    let input = running.take_input().expect("input available");

    let values: Vec<Value> = (-40..=40).rev().chain(-40..=40).collect();
    let expected: Vec<Value> = values
        .iter()
        .filter(|&&v| v > 0 && v % 3 == 0)
        .map(|v| -v)
        .collect();

    for &v in &values {
        input.send(v).expect("Send failed");
    }
    wait_for_writes(running.buffer_metrics(), expected.len() as u64);
    tick(&tick_tx, expected.len());

    let emitted: Vec<Value> = seen.iter().take(expected.len()).collect();
    assert_eq!(emitted, expected);

    input.shutdown();
    running.wait().expect("Wait failed");
}

#[test]
fn test_sink_failure_stops_pipeline() {
    struct FailingSink;

    impl ring_pipeline::Sink for FailingSink {
        fn emit(&mut self, _value: Value) -> PipelineResult<()> {
            Err(PipelineError::StageError("sink unavailable".into()))
        }
    }

    let (tick_tx, tick_rx) = unbounded();
    let mut running = PipelineBuilder::new(config(2))
        .add_stage(PassthroughStage)
        .with_ticker(tick_rx)
        .build()
        .expect("Pipeline build failed")
        .start(FailingSink)
        .expect("Pipeline start failed");
    let shutdown = running.shutdown_handle();
    let input = running.take_input().expect("input available");

    input.send(1).expect("Send failed");
    wait_for_writes(running.buffer_metrics(), 1);
    tick(&tick_tx, 1);

    wait_until("shutdown after sink failure", || shutdown.is_fired());
    assert!(matches!(running.wait(), Err(PipelineError::StageError(_))));
}

#[test]
#[ignore]
fn test_real_interval_drains_once_per_second() {
    let (sink, seen) = collecting_sink();
    let mut running = PipelineBuilder::filter_chain(config(3))
        .build()
        .expect("Pipeline build failed")
        .start(sink)
        .expect("Pipeline start failed");
    let input = running.take_input().expect("input available");

    let started = Instant::now();
    for v in [3, 6, 9] {
        input.send(v).expect("Send failed");
    }
    let emitted: Vec<Value> = seen.iter().take(3).collect();
    assert_eq!(emitted, vec![3, 6, 9]);
    assert!(started.elapsed() >= Duration::from_secs(2));

    running.shutdown().expect("Shutdown failed");
}
