use linksync::host_time::HostTime;
use linksync::session::{FlagCallback, TempoCallback};
use linksync::{
    create_sync_manager, ClockError, FixedRoute, Listener, LocalSessionClock, SessionClock,
    SessionState, SyncError, SyncManager, INVALID_BPM,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

fn route() -> Arc<FixedRoute> {
    Arc::new(FixedRoute::new(48_000.0, Duration::from_millis(5)))
}

fn initialized(bpm: f64, quantum: f64) -> SyncManager<LocalSessionClock> {
    let manager = create_sync_manager(route());
    manager.initialize(bpm, quantum).unwrap();
    manager
}

fn flush(manager: &SyncManager<LocalSessionClock>) {
    manager.with_session_clock(|clock| clock.flush());
}

#[test]
fn test_reads_before_initialize_degrade() {
    let manager = create_sync_manager(route());
    assert!(!manager.is_initialized());
    assert_eq!(manager.beat_time(), 0.0);
    assert_eq!(manager.tempo(), INVALID_BPM);
    assert!(!manager.is_playing());
    assert!(!manager.is_connected());
    assert!(!manager.is_enabled());
    assert!(manager.with_session_clock(|_| ()).is_none());
    assert!(matches!(
        manager.render_sync(),
        Err(SyncError::NotInitialized)
    ));
}

#[test]
fn test_initialize_sets_engine_data() {
    let manager = initialized(120.0, 4.0);
    let data = manager.engine_data();

    assert!(manager.is_initialized());
    assert_eq!(manager.tempo(), 120.0);
    assert_eq!(manager.quantum(), 4.0);
    assert!(!data.request_start && !data.request_stop);
    assert!(!data.has_tempo_proposal());
    assert!(!data.has_beat_reset());
    assert_eq!(data.output_latency, 5_000_000);
    assert!(!manager.is_enabled());
}

#[test]
fn test_initialize_twice_fails() {
    let manager = initialized(120.0, 4.0);
    assert_eq!(
        manager.initialize(90.0, 4.0),
        Err(SyncError::AlreadyInitialized)
    );
    assert_eq!(manager.tempo(), 120.0);
}

#[test]
fn test_initialize_with_invalid_tempo_is_fatal() {
    let manager = create_sync_manager(route());
    match manager.initialize(0.0, 4.0) {
        Err(SyncError::ClockUnavailable(_)) => {}
        other => panic!("expected ClockUnavailable, got {:?}", other),
    }
    assert!(!manager.is_initialized());
    assert!(manager.initialize(120.0, 4.0).is_ok());
}

static CLOCKS_CREATED: AtomicUsize = AtomicUsize::new(0);

/// Local clock that counts constructions and takes a while to build.
struct SlowCountingClock(LocalSessionClock);

impl SessionClock for SlowCountingClock {
    fn create(initial_bpm: f64) -> Result<Self, ClockError> {
        CLOCKS_CREATED.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        LocalSessionClock::new(initial_bpm).map(SlowCountingClock)
    }

    fn is_connected(&self) -> bool {
        self.0.is_connected()
    }

    fn is_enabled(&self) -> bool {
        self.0.is_enabled()
    }

    fn set_enabled(&self, enabled: bool) {
        self.0.set_enabled(enabled)
    }

    fn capture_session_state(&self) -> SessionState {
        self.0.capture_session_state()
    }

    fn commit_session_state(&self, state: SessionState) {
        self.0.commit_session_state(state)
    }

    fn host_time(&self) -> HostTime {
        self.0.host_time()
    }

    fn set_tempo_callback(&self, callback: TempoCallback) {
        self.0.set_tempo_callback(callback)
    }

    fn set_enabled_callback(&self, callback: FlagCallback) {
        self.0.set_enabled_callback(callback)
    }

    fn set_connected_callback(&self, callback: FlagCallback) {
        self.0.set_connected_callback(callback)
    }
}

#[test]
fn test_concurrent_initialize_creates_one_clock() {
    let manager: SyncManager<SlowCountingClock> = SyncManager::new(route());
    let barrier = Arc::new(Barrier::new(8));
    let mut handles = vec![];

    for _ in 0..8 {
        let manager = manager.clone();
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            barrier.wait();
            manager.initialize(120.0, 4.0)
        }));
    }

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter(|r| r.is_err())
        .all(|r| *r == Err(SyncError::AlreadyInitialized)));
    assert_eq!(CLOCKS_CREATED.load(Ordering::SeqCst), 1);
    assert!(manager.is_initialized());
}

#[test]
fn test_initialize_rejects_unusable_sample_rate() {
    for rate in [0.0, -48_000.0, f64::NAN, f64::INFINITY] {
        let manager = create_sync_manager(Arc::new(FixedRoute::new(
            rate,
            Duration::from_millis(5),
        )));
        match manager.initialize(120.0, 4.0) {
            Err(SyncError::InvalidSampleRate(_)) => {}
            other => panic!("sample rate {} should be rejected, got {:?}", rate, other),
        }
        assert!(!manager.is_initialized());
        assert!(matches!(
            manager.render_sync(),
            Err(SyncError::NotInitialized)
        ));
    }
}

#[test]
fn test_failed_initialize_can_be_retried() {
    let manager = create_sync_manager(route());
    assert!(manager.initialize(120.0, -1.0).is_err());
    assert!(manager.initialize(120.0, 4.0).is_ok());
    assert_eq!(
        manager.initialize(120.0, 4.0),
        Err(SyncError::AlreadyInitialized)
    );
}

#[test]
fn test_initialize_rejects_invalid_quantum() {
    let manager = create_sync_manager(route());
    assert_eq!(
        manager.initialize(120.0, 0.0),
        Err(SyncError::InvalidQuantum(0.0))
    );
    assert!(!manager.is_initialized());
}

#[test]
fn test_quantum_round_trip() {
    let manager = initialized(120.0, 4.0);
    for quantum in [0.25, 1.0, 3.0, 7.5, 16.0] {
        manager.set_quantum(quantum).unwrap();
        assert_eq!(manager.quantum(), quantum);
    }
    assert!(manager.set_quantum(-1.0).is_err());
    assert!(manager.set_quantum(f64::INFINITY).is_err());
    assert_eq!(manager.quantum(), 16.0);
}

#[test]
fn test_set_tempo_is_a_proposal() {
    let manager = initialized(120.0, 4.0);
    manager.set_tempo(105.0).unwrap();

    assert_eq!(manager.engine_data().propose_bpm, 105.0);
    // The session keeps its tempo until the render path applies the proposal.
    assert_eq!(manager.tempo(), 120.0);
    assert_eq!(manager.set_tempo(-5.0), Err(SyncError::InvalidTempo(-5.0)));
    assert_eq!(manager.engine_data().propose_bpm, 105.0);
}

#[test]
fn test_set_playing_flags_are_exclusive() {
    let manager = initialized(120.0, 4.0);

    manager.set_playing(true);
    let data = manager.engine_data();
    assert!(data.request_start);
    assert!(!data.request_stop);

    manager.set_playing(false);
    let data = manager.engine_data();
    assert!(!data.request_start);
    assert!(data.request_stop);
}

#[test]
fn test_last_writer_wins() {
    let manager = initialized(120.0, 4.0);
    manager.set_tempo(100.0).unwrap();
    manager.set_tempo(110.0).unwrap();
    manager.set_quantum(3.0).unwrap();
    manager.set_quantum(5.0).unwrap();

    let data = manager.engine_data();
    assert_eq!(data.propose_bpm, 110.0);
    assert_eq!(data.quantum, 5.0);
}

#[test]
fn test_concurrent_writers_never_tear() {
    let manager = initialized(120.0, 4.0);
    manager.set_playing(true);
    let mut handles = vec![];

    for t in 0..8u32 {
        let manager = manager.clone();
        handles.push(thread::spawn(move || {
            for i in 0..200u32 {
                let value = f64::from(t * 1000 + i + 1);
                manager.set_tempo(value).unwrap();
                manager.set_quantum(value).unwrap();
                manager.set_playing(i % 2 == 0);
            }
        }));
    }

    let reader = {
        let manager = manager.clone();
        thread::spawn(move || {
            for _ in 0..500 {
                let data = manager.engine_data();
                assert!(data.quantum > 0.0);
                assert!(data.request_start != data.request_stop);
            }
        })
    };

    for handle in handles {
        handle.join().unwrap();
    }
    reader.join().unwrap();

    // Every thread ends with i = 199: tempo = quantum = t * 1000 + 200.
    let data = manager.engine_data();
    let final_values: Vec<f64> = (0..8u32).map(|t| f64::from(t * 1000 + 200)).collect();
    assert!(final_values.contains(&data.propose_bpm));
    assert!(final_values.contains(&data.quantum));
    assert!(data.request_stop);
    assert!(!data.request_start);
}

#[test]
fn test_tempo_listener_receives_applied_proposal() {
    let manager = initialized(120.0, 4.0);
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    manager.add_listener(Listener::tempo(move |bpm, quantum| {
        sink.lock().unwrap().push((bpm, quantum));
    }));

    manager.set_tempo(105.0).unwrap();
    let mut render = manager.render_sync().unwrap();
    let now = manager.with_session_clock(|c| c.host_time()).unwrap();
    render.process(now, 256);
    flush(&manager);

    assert_eq!(*received.lock().unwrap(), vec![(105.0, 4.0)]);
    assert_eq!(manager.tempo(), 105.0);
}

#[test]
fn test_remote_tempo_change_reaches_listeners() {
    let manager = initialized(120.0, 4.0);
    manager.set_quantum(8.0).unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    manager.add_listener(Listener::tempo(move |bpm, quantum| {
        sink.lock().unwrap().push((bpm, quantum));
    }));

    manager.with_session_clock(|clock| clock.apply_peer_tempo(133.0));
    flush(&manager);

    assert_eq!(*received.lock().unwrap(), vec![(133.0, 8.0)]);
}

#[test]
fn test_listener_sees_new_tempo_through_manager() {
    let manager = initialized(120.0, 4.0);
    let observed = Arc::new(Mutex::new(None));
    let sink = observed.clone();
    let reader = manager.clone();
    manager.add_listener(Listener::tempo(move |_, _| {
        *sink.lock().unwrap() = Some(reader.tempo());
    }));

    manager.with_session_clock(|clock| clock.apply_peer_tempo(90.0));
    flush(&manager);

    assert_eq!(*observed.lock().unwrap(), Some(90.0));
}

#[test]
fn test_connection_change_only_reaches_connection_listeners() {
    let manager = initialized(120.0, 4.0);
    let tempo_calls = Arc::new(AtomicUsize::new(0));
    let connection_values = Arc::new(Mutex::new(Vec::new()));

    let counter = tempo_calls.clone();
    manager.add_listener(Listener::tempo(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    let sink = connection_values.clone();
    manager.add_listener(Listener::connection(move |connected| {
        sink.lock().unwrap().push(connected);
    }));

    manager.with_session_clock(|clock| clock.set_peer_count(1));
    manager.set_enabled(true);
    flush(&manager);

    assert!(manager.is_connected());
    assert_eq!(*connection_values.lock().unwrap(), vec![true]);
    assert_eq!(tempo_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_activation_listener() {
    let manager = initialized(120.0, 4.0);
    let values = Arc::new(Mutex::new(Vec::new()));
    let sink = values.clone();
    manager.add_listener(Listener::activation(move |enabled| {
        sink.lock().unwrap().push(enabled);
    }));

    manager.set_enabled(true);
    manager.set_enabled(false);
    flush(&manager);

    assert_eq!(*values.lock().unwrap(), vec![true, false]);
    assert!(!manager.is_enabled());
}

#[test]
fn test_remove_all_listeners_silences_callbacks() {
    let manager = initialized(120.0, 4.0);
    let calls = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let counter = calls.clone();
        manager.add_listener(Listener::tempo(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
    }
    let counter = calls.clone();
    manager.add_listener(Listener::connection(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    manager.remove_all_listeners();
    assert_eq!(manager.listener_count(), 0);

    manager.with_session_clock(|clock| {
        clock.apply_peer_tempo(140.0);
        clock.set_peer_count(2);
        clock.set_enabled(true);
    });
    flush(&manager);

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_remove_unknown_listener() {
    let manager = initialized(120.0, 4.0);
    let other = create_sync_manager(route());
    let foreign = other.add_listener(Listener::activation(|_| {}));
    manager.add_listener(Listener::activation(|_| {}));

    assert!(!manager.remove_listener(foreign));
    assert_eq!(manager.listener_count(), 1);
}

#[test]
fn test_route_change_updates_latency_without_dispatch() {
    let route = route();
    let manager: SyncManager<LocalSessionClock> = create_sync_manager(route.clone());
    manager.initialize(120.0, 4.0).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    for listener in [
        Listener::tempo({
            let c = calls.clone();
            move |_, _| {
                c.fetch_add(1, Ordering::SeqCst);
            }
        }),
        Listener::connection({
            let c = calls.clone();
            move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            }
        }),
    ] {
        manager.add_listener(listener);
    }

    route.set_output_latency(Duration::from_millis(12));
    manager.handle_route_change();
    flush(&manager);

    assert_eq!(manager.engine_data().output_latency, 12_000_000);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_beat_time_advances() {
    let manager = initialized(240.0, 4.0);
    let first = manager.beat_time();
    thread::sleep(Duration::from_millis(100));
    let second = manager.beat_time();
    assert!(second > first, "{} should be after {}", second, first);

    let phase = manager.phase();
    assert!((0.0..4.0).contains(&phase));
}

#[test]
fn test_calibration_is_captured_once() {
    let manager = initialized(120.0, 4.0);
    let calibration = manager.calibration().unwrap();
    assert_eq!(calibration.seconds_to_host_time, 1.0e9);
    assert_eq!(calibration.sample_rate, 48_000.0);
}
