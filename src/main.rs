use clap::Parser;
use linksync::{
    cli::{validate_quantum, validate_tempo, Args},
    create_scheduler, create_sync_manager, logging,
    render::run_render_loop,
    ui::BeatMonitor,
    FixedRoute, LocalSessionClock, Scheduler, SessionClock, Settings, SyncManager,
};
use log::LevelFilter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::{thread, time::Duration};

fn main() {
    let args = parse_command_line_arguments();
    initialize_logging(&args);

    let settings = load_settings(&args);
    let route = Arc::new(FixedRoute::new(
        settings.sample_rate,
        settings.output_latency(),
    ));
    let manager = create_sync_manager(route);

    if let Err(e) = manager.initialize(settings.initial_bpm, settings.quantum) {
        exit_with_error(&format!("Error initializing session clock: {}", e));
    }

    configure_session(&manager, &settings, &args);

    let running = Arc::new(AtomicBool::new(true));
    let scheduler = create_scheduler();
    start_render_loop(&scheduler, &manager, settings.buffer_frames, running.clone());
    start_monitor(&scheduler, &manager, running.clone());

    run_application_loop(args.run_for, &running);
}

fn parse_command_line_arguments() -> Args {
    Args::parse()
}

fn initialize_logging(args: &Args) {
    if args.log_stderr {
        logging::init_stderr_logger();
    } else if let Err(e) = logging::init_logger(LevelFilter::Debug) {
        eprintln!("Logger initialization failed: {}", e);
    }
    log::info!("Application starting");
}

fn load_settings(args: &Args) -> Settings {
    let mut settings = match Settings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => exit_with_error(&format!("Error loading settings: {}", e)),
    };
    args.apply_to(&mut settings);

    if let Err(error_msg) = validate_tempo(settings.initial_bpm)
        .and_then(|_| validate_quantum(settings.quantum))
        .and_then(|_| args.propose.map(validate_tempo).unwrap_or(Ok(())))
    {
        exit_with_error(&error_msg);
    }
    settings
}

fn configure_session(
    manager: &SyncManager<LocalSessionClock>,
    settings: &Settings,
    args: &Args,
) {
    manager.with_session_clock(|clock| {
        clock.set_peer_count(settings.peers);
        clock.set_enabled(settings.enabled);
    });

    if let Some(bpm) = args.propose {
        if let Err(e) = manager.set_tempo(bpm) {
            log::warn!("Tempo proposal rejected: {}", e);
        }
    }

    manager.set_playing(!args.stopped);
    println!(
        "Session at {:.1} BPM, quantum {}, {} simulated peer(s)",
        manager.tempo(),
        manager.quantum(),
        settings.peers
    );
}

fn start_render_loop<T: Scheduler, C: SessionClock>(
    scheduler: &T,
    manager: &SyncManager<C>,
    buffer_frames: u32,
    running: Arc<AtomicBool>,
) {
    let render = match manager.render_sync() {
        Ok(render) => render,
        Err(e) => exit_with_error(&format!("Error attaching render path: {}", e)),
    };

    scheduler.spawn("render", move || {
        run_render_loop(render, buffer_frames, running, |frame| {
            if let Some(click) = frame.click {
                log::trace!(
                    "Click: beat {} (downbeat {}) at {:?}",
                    click.beat,
                    click.downbeat,
                    click.host_time
                );
            }
        });
    });
}

fn start_monitor<T: Scheduler, C: SessionClock>(
    scheduler: &T,
    manager: &SyncManager<C>,
    running: Arc<AtomicBool>,
) {
    let monitor_manager = manager.clone();
    scheduler.spawn("monitor", move || {
        let monitor = BeatMonitor::new(monitor_manager);
        monitor.run(running);
    });
}

fn run_application_loop(run_for: Option<u64>, running: &AtomicBool) {
    log::info!("Application running. Press Ctrl+C to exit...");
    println!("\nPress Ctrl+C to exit...");
    match run_for {
        Some(seconds) => {
            thread::sleep(Duration::from_secs(seconds));
            running.store(false, Ordering::SeqCst);
            // Let the render and monitor threads observe the flag.
            thread::sleep(Duration::from_millis(200));
            log::info!("Run time elapsed, exiting");
        }
        None => loop {
            thread::sleep(Duration::from_secs(1));
        },
    }
}

fn exit_with_error(error_msg: &str) -> ! {
    log::error!("{}", error_msg);
    eprintln!("{}", error_msg);
    std::process::exit(1);
}
