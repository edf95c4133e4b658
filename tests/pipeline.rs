use bcibridge::event::{Command, CommandEvent, ConnectionEvent, Event, Timestamp};
use bcibridge::pipeline::{Outcome, Pipeline, PipelineError, PipelineFault, PipelineState};
use bcibridge::processor::{
    CommandMapper, DebounceConfig, DebounceProcessor, MapperConfig, Processor, ProcessorError,
    ThresholdConfig, ThresholdProcessor,
};
use bcibridge::publisher::{ChannelPublisher, Publisher, PublisherError};
use bcibridge::source::{
    EventCallback, MockMode, MockSource, Source, SourceError, SubscriberSet, SubscriptionId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

// Source that only delivers what the test pushes through `deliver`.
#[derive(Default)]
struct StubSource {
    subscribers: SubscriberSet,
    connected: AtomicBool,
    fail_connect: bool,
}

impl StubSource {
    fn failing() -> Self {
        Self {
            fail_connect: true,
            ..Default::default()
        }
    }

    fn deliver(&self, event: impl Into<Event>) {
        self.subscribers.emit(event.into());
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Source for StubSource {
    fn source_id(&self) -> &str {
        "stub"
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn connect(&self) -> Result<(), SourceError> {
        if self.fail_connect {
            return Err(SourceError::ConnectionFailed {
                source_id: "stub".to_string(),
                reason: "headset unplugged".to_string(),
            });
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&self) -> Result<(), SourceError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe(&self, callback: EventCallback) -> SubscriptionId {
        self.subscribers.subscribe(callback)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }
}

#[derive(Clone, Default)]
struct Tally {
    events: Arc<Mutex<Vec<Event>>>,
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
    publishes: Arc<AtomicUsize>,
}

impl Tally {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Behavior {
    Record,
    FailStart,
    FailPublish,
    PanicPublish,
    PanicReady,
    NeverReady,
}

struct StubPublisher {
    name: String,
    behavior: Behavior,
    ready: AtomicBool,
    tally: Tally,
}

impl StubPublisher {
    fn new(name: &str, behavior: Behavior) -> (Box<dyn Publisher>, Tally) {
        let tally = Tally::default();
        let publisher = Self {
            name: name.to_string(),
            behavior,
            ready: AtomicBool::new(false),
            tally: tally.clone(),
        };
        (Box::new(publisher), tally)
    }
}

impl Publisher for StubPublisher {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) -> Result<(), PublisherError> {
        if self.behavior == Behavior::FailStart {
            return Err(PublisherError::StartFailed("port busy".to_string()));
        }
        self.tally.starts.fetch_add(1, Ordering::SeqCst);
        self.ready
            .store(self.behavior != Behavior::NeverReady, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), PublisherError> {
        self.tally.stops.fetch_add(1, Ordering::SeqCst);
        self.ready.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn publish(&self, event: &Event) -> Result<(), PublisherError> {
        self.tally.publishes.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::FailPublish => Err(PublisherError::Send("broker gone".to_string())),
            Behavior::PanicPublish => panic!("publisher exploded"),
            _ => {
                self.tally.events.lock().unwrap().push(event.clone());
                Ok(())
            }
        }
    }

    fn is_ready(&self) -> bool {
        if self.behavior == Behavior::PanicReady {
            panic!("readiness check exploded");
        }
        self.ready.load(Ordering::SeqCst)
    }
}

struct CountingProcessor {
    name: &'static str,
    calls: Arc<AtomicUsize>,
    drop_all: bool,
}

impl CountingProcessor {
    fn new(name: &'static str, drop_all: bool) -> (Box<dyn Processor>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let processor = Self {
            name,
            calls: calls.clone(),
            drop_all,
        };
        (Box::new(processor), calls)
    }
}

impl Processor for CountingProcessor {
    fn name(&self) -> &str {
        self.name
    }

    fn process(&mut self, event: Event) -> Result<Option<Event>, ProcessorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((!self.drop_all).then_some(event))
    }

    fn reset(&mut self) {}
}

struct FailingProcessor {
    panic: bool,
}

impl Processor for FailingProcessor {
    fn name(&self) -> &str {
        "failing"
    }

    fn process(&mut self, _event: Event) -> Result<Option<Event>, ProcessorError> {
        if self.panic {
            panic!("stage exploded");
        }
        Err(ProcessorError::ProcessingFailed("corrupt sample".to_string()))
    }

    fn reset(&mut self) {}
}

struct BrittleReset;

impl Processor for BrittleReset {
    fn name(&self) -> &str {
        "brittle"
    }

    fn process(&mut self, event: Event) -> Result<Option<Event>, ProcessorError> {
        Ok(Some(event))
    }

    fn reset(&mut self) {
        panic!("reset exploded");
    }
}

fn command(millis: u64, command: Command, power: f32) -> CommandEvent {
    CommandEvent::new(Timestamp::from_millis(millis), "stub", command, power).unwrap()
}

// Threshold (left >= 0.8) -> Debounce (300ms) -> Mapper (left -> "A")
fn reference_pipeline(source: Arc<dyn Source>) -> Pipeline {
    let pipeline = Pipeline::new(source);
    let thresholds = ThresholdConfig::new(HashMap::from([(Command::Left, 0.8)]), 0.0).unwrap();
    pipeline.add_processor(Box::new(ThresholdProcessor::new(thresholds)));
    pipeline.add_processor(Box::new(DebounceProcessor::new(DebounceConfig::new(
        Duration::from_millis(300),
    ))));
    pipeline.add_processor(Box::new(CommandMapper::new(MapperConfig::new(
        HashMap::from([(Command::Left, "A".to_string())]),
    ))));
    pipeline
}

#[test]
fn repeated_command_within_cooldown_is_debounced() {
    let source = Arc::new(StubSource::default());
    let pipeline = reference_pipeline(source.clone());
    let (publisher, tally) = StubPublisher::new("recorder", Behavior::Record);
    pipeline.add_publisher(publisher).unwrap();
    pipeline.start().unwrap();

    source.deliver(command(0, Command::Left, 0.85));
    source.deliver(command(50, Command::Left, 0.85));

    let events = tally.events();
    assert_eq!(events.len(), 1);
    let accepted = events[0].as_command().unwrap();
    assert_eq!(accepted.command(), Command::Left);
    assert_eq!(accepted.action(), Some("A"));

    let stats = pipeline.statistics();
    assert_eq!((stats.received, stats.processed, stats.dropped), (2, 1, 1));
    assert_eq!(stats.publisher("recorder").unwrap().dispatched, 1);
}

#[test]
fn repeated_command_after_cooldown_passes() {
    let source = Arc::new(StubSource::default());
    let pipeline = reference_pipeline(source.clone());
    let (publisher, tally) = StubPublisher::new("recorder", Behavior::Record);
    pipeline.add_publisher(publisher).unwrap();
    pipeline.start().unwrap();

    source.deliver(command(0, Command::Left, 0.85));
    source.deliver(command(400, Command::Left, 0.85));

    assert_eq!(tally.events().len(), 2);
    let stats = pipeline.statistics();
    assert_eq!((stats.received, stats.processed, stats.dropped), (2, 2, 0));
}

#[test]
fn below_threshold_is_dropped() {
    let source = Arc::new(StubSource::default());
    let pipeline = reference_pipeline(source.clone());
    let (publisher, tally) = StubPublisher::new("recorder", Behavior::Record);
    pipeline.add_publisher(publisher).unwrap();
    pipeline.start().unwrap();

    source.deliver(command(0, Command::Left, 0.79));

    assert!(tally.events().is_empty());
    assert_eq!(pipeline.statistics().dropped, 1);
}

#[test]
fn power_equal_to_default_threshold_passes() {
    let source = Arc::new(StubSource::default());
    let pipeline = Pipeline::new(source.clone());
    let thresholds = ThresholdConfig::new(HashMap::new(), 0.5).unwrap();
    pipeline.add_processor(Box::new(ThresholdProcessor::new(thresholds)));
    let (publisher, tally) = StubPublisher::new("recorder", Behavior::Record);
    pipeline.add_publisher(publisher).unwrap();
    pipeline.start().unwrap();

    source.deliver(command(0, Command::Push, 0.5));
    source.deliver(command(10, Command::Push, 0.49));

    assert_eq!(tally.events().len(), 1);
    assert_eq!(tally.events()[0].as_command().unwrap().power(), 0.5);
}

#[test]
fn dropping_stage_short_circuits_the_chain() {
    let source = Arc::new(StubSource::default());
    let pipeline = Pipeline::new(source.clone());
    let (first, first_calls) = CountingProcessor::new("dropper", true);
    let (second, second_calls) = CountingProcessor::new("after", false);
    pipeline.add_processor(first);
    pipeline.add_processor(second);
    let (publisher, tally) = StubPublisher::new("recorder", Behavior::Record);
    pipeline.add_publisher(publisher).unwrap();
    pipeline.start().unwrap();

    source.deliver(command(0, Command::Push, 0.9));

    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    assert_eq!(tally.publishes.load(Ordering::SeqCst), 0);
}

#[test]
fn received_is_processed_plus_dropped() {
    let source = Arc::new(StubSource::default());
    let pipeline = reference_pipeline(source.clone());
    pipeline.start().unwrap();

    let samples = [
        (0, Command::Left, 0.9),
        (10, Command::Left, 0.95),
        (20, Command::Push, 0.2),
        (30, Command::Left, 0.3),
        (500, Command::Left, 0.81),
        (520, Command::Right, 0.6),
        (530, Command::Right, 0.6),
    ];
    for (millis, cmd, power) in samples {
        source.deliver(command(millis, cmd, power));
        let stats = pipeline.statistics();
        assert_eq!(stats.received, stats.processed + stats.dropped);
    }
    source.deliver(ConnectionEvent::connected("re-synced"));

    let stats = pipeline.statistics();
    assert_eq!(stats.received, 8);
    assert_eq!(stats.received, stats.processed + stats.dropped);
}

#[test]
fn lifecycle_states_and_misuse() {
    let source = Arc::new(StubSource::default());
    let pipeline = Pipeline::new(source.clone());
    assert_eq!(pipeline.state(), PipelineState::Created);

    pipeline.stop().unwrap();
    assert_eq!(pipeline.state(), PipelineState::Created);

    pipeline.start().unwrap();
    assert!(pipeline.is_running());
    assert!(source.is_connected());
    assert_eq!(source.subscriber_count(), 1);
    assert!(matches!(pipeline.start(), Err(PipelineError::AlreadyStarted)));

    pipeline.stop().unwrap();
    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert!(!source.is_connected());
    assert_eq!(source.subscriber_count(), 0);
    pipeline.stop().unwrap();

    pipeline.start().unwrap();
    assert!(pipeline.is_running());
}

#[test]
fn restart_resets_statistics_and_processor_state() {
    let source = Arc::new(StubSource::default());
    let pipeline = reference_pipeline(source.clone());
    pipeline.start().unwrap();
    source.deliver(command(0, Command::Left, 0.9));
    pipeline.stop().unwrap();
    assert_eq!(pipeline.statistics().processed, 1);

    pipeline.start().unwrap();
    assert_eq!(pipeline.statistics().received, 0);

    // The debounce anchor from the previous run is gone.
    source.deliver(command(50, Command::Left, 0.9));
    assert_eq!(pipeline.statistics().processed, 1);
}

#[test]
fn inject_requires_running_pipeline() {
    let source = Arc::new(StubSource::default());
    let pipeline = reference_pipeline(source);
    assert!(matches!(
        pipeline.inject(command(0, Command::Left, 0.9).into()),
        Err(PipelineError::NotStarted)
    ));

    pipeline.start().unwrap();
    assert_eq!(
        pipeline.inject(command(0, Command::Left, 0.9).into()).unwrap(),
        Outcome::Dispatched(0)
    );
    assert_eq!(
        pipeline.inject(command(10, Command::Left, 0.9).into()).unwrap(),
        Outcome::Dropped
    );
}

#[test]
fn publisher_start_failure_rolls_back() {
    let source = Arc::new(StubSource::default());
    let pipeline = Pipeline::new(source.clone());
    let (first, first_tally) = StubPublisher::new("first", Behavior::Record);
    let (broken, _) = StubPublisher::new("broken", Behavior::FailStart);
    let (last, last_tally) = StubPublisher::new("last", Behavior::Record);
    pipeline.add_publisher(first).unwrap();
    pipeline.add_publisher(broken).unwrap();
    pipeline.add_publisher(last).unwrap();

    match pipeline.start() {
        Err(PipelineError::PublisherStart { publisher, .. }) => assert_eq!(publisher, "broken"),
        other => panic!("unexpected result {:?}", other),
    }

    assert_eq!(first_tally.starts(), 1);
    assert_eq!(first_tally.stops(), 1);
    assert_eq!(last_tally.starts(), 0);
    assert_eq!(pipeline.state(), PipelineState::Created);
    assert!(!source.is_connected());
    assert_eq!(source.subscriber_count(), 0);
}

#[test]
fn source_connect_failure_rolls_back() {
    let source = Arc::new(StubSource::failing());
    let pipeline = Pipeline::new(source.clone());
    let (publisher, tally) = StubPublisher::new("recorder", Behavior::Record);
    pipeline.add_publisher(publisher).unwrap();

    assert!(matches!(pipeline.start(), Err(PipelineError::SourceConnect(_))));
    assert_eq!(tally.starts(), 1);
    assert_eq!(tally.stops(), 1);
    assert_eq!(source.subscriber_count(), 0);
    assert!(!pipeline.is_running());
    assert!(matches!(
        pipeline.inject(command(0, Command::Push, 0.9).into()),
        Err(PipelineError::NotStarted)
    ));
}

#[test]
fn failing_publisher_does_not_block_others() {
    let source = Arc::new(StubSource::default());
    let pipeline = Pipeline::new(source.clone());
    let (broken, _) = StubPublisher::new("broken", Behavior::FailPublish);
    let (panicky, _) = StubPublisher::new("panicky", Behavior::PanicPublish);
    let (healthy, tally) = StubPublisher::new("healthy", Behavior::Record);
    pipeline.add_publisher(broken).unwrap();
    pipeline.add_publisher(panicky).unwrap();
    pipeline.add_publisher(healthy).unwrap();

    let reported = Arc::new(Mutex::new(Vec::new()));
    let sink = reported.clone();
    pipeline.set_error_hook(move |fault| {
        if let PipelineFault::Dispatch(e) = fault {
            sink.lock().unwrap().push(e.publisher.clone());
        }
    });
    pipeline.start().unwrap();

    source.deliver(command(0, Command::Push, 0.9));
    source.deliver(command(500, Command::Pull, 0.9));

    assert_eq!(tally.events().len(), 2);
    assert_eq!(
        *reported.lock().unwrap(),
        vec!["broken", "panicky", "broken", "panicky"]
    );

    let stats = pipeline.statistics();
    assert_eq!(stats.processed, 2);
    let broken = stats.publisher("broken").unwrap();
    assert_eq!((broken.dispatched, broken.failed), (2, 2));
    assert_eq!(stats.publisher("panicky").unwrap().failed, 2);
    assert_eq!(stats.publisher("healthy").unwrap().failed, 0);
}

#[test]
fn processor_failures_drop_the_event() {
    let source = Arc::new(StubSource::default());
    let pipeline = Pipeline::new(source.clone());
    let failing = pipeline.add_processor(Box::new(FailingProcessor { panic: false }));
    let (publisher, tally) = StubPublisher::new("recorder", Behavior::Record);
    pipeline.add_publisher(publisher).unwrap();

    let faults = Arc::new(AtomicUsize::new(0));
    let counter = faults.clone();
    pipeline.set_error_hook(move |fault| {
        if matches!(fault, PipelineFault::Processor { .. }) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    pipeline.start().unwrap();

    source.deliver(command(0, Command::Push, 0.9));
    assert!(pipeline.remove_processor(failing));
    pipeline.add_processor(Box::new(FailingProcessor { panic: true }));
    source.deliver(command(10, Command::Push, 0.9));

    assert!(tally.events().is_empty());
    assert_eq!(faults.load(Ordering::SeqCst), 2);
    let stats = pipeline.statistics();
    assert_eq!((stats.received, stats.dropped, stats.processor_errors), (2, 2, 2));
    assert!(!pipeline.remove_processor(failing));
}

#[test]
fn not_ready_publishers_are_skipped() {
    let source = Arc::new(StubSource::default());
    let pipeline = Pipeline::new(source.clone());
    let (sleepy, sleepy_tally) = StubPublisher::new("sleepy", Behavior::NeverReady);
    let (awake, awake_tally) = StubPublisher::new("awake", Behavior::Record);
    pipeline.add_publisher(sleepy).unwrap();
    pipeline.add_publisher(awake).unwrap();
    pipeline.start().unwrap();

    source.deliver(command(0, Command::Lift, 0.7));

    assert_eq!(sleepy_tally.publishes.load(Ordering::SeqCst), 0);
    assert_eq!(awake_tally.events().len(), 1);
    let stats = pipeline.statistics();
    let sleepy = stats.publisher("sleepy").unwrap();
    assert_eq!((sleepy.dispatched, sleepy.skipped_not_ready), (0, 1));
}

#[test]
fn publishers_added_or_removed_while_running() {
    let source = Arc::new(StubSource::default());
    let pipeline = Pipeline::new(source.clone());
    pipeline.start().unwrap();

    let (late, tally) = StubPublisher::new("late", Behavior::Record);
    let id = pipeline.add_publisher(late).unwrap();
    assert_eq!(tally.starts(), 1);

    source.deliver(command(0, Command::Drop, 0.9));
    assert_eq!(tally.events().len(), 1);

    assert!(pipeline.remove_publisher(id));
    assert_eq!(tally.stops(), 1);
    assert!(!pipeline.remove_publisher(id));
    assert!(pipeline.publisher_names().is_empty());

    source.deliver(command(10, Command::Drop, 0.9));
    assert_eq!(tally.events().len(), 1);

    let (broken, _) = StubPublisher::new("broken", Behavior::FailStart);
    assert!(matches!(
        pipeline.add_publisher(broken),
        Err(PipelineError::PublisherStart { .. })
    ));
    assert!(pipeline.publisher_names().is_empty());
}

#[test]
fn mock_source_connection_events_flow_through() {
    let source = Arc::new(MockSource::manual("mock"));
    let pipeline = Pipeline::new(source.clone());
    let (publisher, mut receiver) = ChannelPublisher::with_capacity("channel", 16);
    pipeline.add_publisher(Box::new(publisher)).unwrap();

    pipeline.start().unwrap();
    assert!(source.emit_command(Command::Push, 1.7));
    pipeline.stop().unwrap();

    let mut received = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        received.push(event);
    }

    assert_eq!(received.len(), 3);
    assert!(matches!(&received[0], Event::Connection(c) if c.connected));
    let pushed = received[1].as_command().unwrap();
    assert_eq!((pushed.command(), pushed.power()), (Command::Push, 1.0));
    assert!(matches!(&received[2], Event::Connection(c) if !c.connected));
    assert_eq!(pipeline.statistics().received, 3);
}

#[test]
fn panicking_readiness_check_counts_as_not_ready() {
    let source = Arc::new(StubSource::default());
    let pipeline = Pipeline::new(source.clone());
    let (flaky, flaky_tally) = StubPublisher::new("flaky", Behavior::PanicReady);
    let (healthy, healthy_tally) = StubPublisher::new("healthy", Behavior::Record);
    pipeline.add_publisher(flaky).unwrap();
    pipeline.add_publisher(healthy).unwrap();

    let reported = Arc::new(Mutex::new(Vec::new()));
    let sink = reported.clone();
    pipeline.set_error_hook(move |fault| {
        if let PipelineFault::Dispatch(e) = fault {
            sink.lock().unwrap().push((e.publisher.clone(), e.source.to_string()));
        }
    });
    pipeline.start().unwrap();

    source.deliver(command(0, Command::Push, 0.9));
    source.deliver(command(10, Command::Pull, 0.9));

    assert_eq!(healthy_tally.events().len(), 2);
    assert_eq!(flaky_tally.publishes.load(Ordering::SeqCst), 0);
    let reported = reported.lock().unwrap().clone();
    assert_eq!(reported.len(), 2);
    assert!(reported
        .iter()
        .all(|(name, reason)| name == "flaky" && reason.contains("readiness check exploded")));

    let stats = pipeline.statistics();
    let flaky = stats.publisher("flaky").unwrap();
    assert_eq!((flaky.dispatched, flaky.failed, flaky.skipped_not_ready), (0, 0, 2));
    assert_eq!(stats.publisher("healthy").unwrap().dispatched, 2);
}

#[test]
fn panicking_reset_does_not_abort_stop_or_restart() {
    let source = Arc::new(StubSource::default());
    let pipeline = reference_pipeline(source.clone());
    pipeline.add_processor(Box::new(BrittleReset));
    let (publisher, tally) = StubPublisher::new("recorder", Behavior::Record);
    pipeline.add_publisher(publisher).unwrap();

    pipeline.start().unwrap();
    source.deliver(command(0, Command::Left, 0.9));
    pipeline.stop().unwrap();
    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert_eq!(tally.stops(), 1);
    assert!(!source.is_connected());

    pipeline.start().unwrap();
    source.deliver(command(50, Command::Left, 0.9));
    assert_eq!(tally.events().len(), 2);
}

#[test]
fn cleared_error_hook_is_not_called() {
    let source = Arc::new(StubSource::default());
    let pipeline = Pipeline::new(source.clone());
    let (broken, _) = StubPublisher::new("broken", Behavior::FailPublish);
    pipeline.add_publisher(broken).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    pipeline.set_error_hook(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    pipeline.start().unwrap();

    source.deliver(command(0, Command::Push, 0.9));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    pipeline.clear_error_hook();
    source.deliver(command(10, Command::Push, 0.9));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.statistics().publisher("broken").unwrap().failed, 2);
}

#[test]
fn reconfiguration_under_live_traffic_keeps_counters_consistent() {
    let mode = MockMode::Random {
        commands: vec![Command::Left, Command::Right, Command::Push, Command::Pull],
        interval: Duration::from_millis(1),
        power_range: (0.3, 1.0),
    };
    let source = Arc::new(MockSource::new("mock", mode));
    let pipeline = reference_pipeline(source.clone());
    let (publisher, tally) = StubPublisher::new("recorder", Behavior::Record);
    pipeline.add_publisher(publisher).unwrap();
    pipeline.start().unwrap();

    let done = AtomicBool::new(false);
    let cycles = thread::scope(|scope| {
        let reconfigure = scope.spawn(|| {
            let check = || {
                let stats = pipeline.statistics();
                assert_eq!(stats.received, stats.processed + stats.dropped);
            };
            let mut cycles = 0;
            loop {
                let (processor, _) = CountingProcessor::new("transient", false);
                let stage = pipeline.add_processor(processor);
                check();
                let (extra, _) = StubPublisher::new("transient", Behavior::Record);
                let id = pipeline.add_publisher(extra).unwrap();
                check();
                assert!(pipeline.remove_publisher(id));
                check();
                assert!(pipeline.remove_processor(stage));
                check();
                cycles += 1;
                if done.load(Ordering::SeqCst) {
                    break cycles;
                }
            }
        });

        let deadline = Instant::now() + Duration::from_secs(10);
        while pipeline.statistics().received < 200 {
            assert!(Instant::now() < deadline, "source stalled");
            thread::sleep(Duration::from_millis(2));
        }
        done.store(true, Ordering::SeqCst);
        reconfigure.join().unwrap()
    });
    assert!(cycles > 0);

    pipeline.stop().unwrap();
    assert!(!source.is_connected());
    assert_eq!(pipeline.processor_names().len(), 3);
    assert_eq!(pipeline.publisher_names(), vec!["recorder"]);

    let settled = pipeline.statistics();
    assert_eq!(settled.received, settled.processed + settled.dropped);
    assert_eq!(settled.publisher("recorder").unwrap().dispatched, settled.processed);
    let delivered = tally.events().len();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(pipeline.statistics(), settled);
    assert_eq!(tally.events().len(), delivered);
}
