//! Headless backend: drive the hand driver against the in-memory scene.
//!
//! Used for CI and for checking a driver without a host application.
//! Supports a configurable poll interval, graceful signal handling, an exit
//! timer and periodic status logging.

use crate::config::DriverConfig;
use crate::jumper::PRIMARY_SLICE_VIEW;
use crate::scene::MemoryScene;
use crate::state::HandsState;
use calloop::EventLoop;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// Global flag set by SIGTERM/SIGINT handlers.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Headless loop configuration.
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    /// Poll interval in milliseconds (higher = less CPU).
    pub poll_interval_ms: u64,
    /// Exit after this many seconds.
    pub exit_after: Option<u64>,
    /// Seconds between status log lines.
    pub status_interval_secs: u64,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            exit_after: None,
            status_interval_secs: 60,
        }
    }
}

/// Install signal handlers for graceful shutdown (SIGTERM, SIGINT).
fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Run until a signal, the exit timer, or the driver closing the stream.
pub fn run(driver: DriverConfig, config: HeadlessConfig) -> anyhow::Result<()> {
    let mut event_loop = EventLoop::<HandsState>::try_new()?;
    let mut state = HandsState::new(driver, Box::new(MemoryScene::new()), event_loop.handle());
    run_session(&mut event_loop, &mut state, &config)
}

/// Start the session, drive it, and tear it down however the loop ends.
fn run_session(
    event_loop: &mut EventLoop<'static, HandsState>,
    state: &mut HandsState,
    config: &HeadlessConfig,
) -> anyhow::Result<()> {
    state.start_session()?;
    let result = drive(event_loop, state, config);
    log_status(state);
    state.end_session();
    info!(
        "Headless backend shutting down ({} line(s), {} decode error(s))",
        state.decoder.lines_seen, state.decoder.decode_errors
    );
    result
}

fn drive(
    event_loop: &mut EventLoop<'static, HandsState>,
    state: &mut HandsState,
    config: &HeadlessConfig,
) -> anyhow::Result<()> {
    state.connect_driver()?;

    install_signal_handlers();

    let start_time = Instant::now();
    let exit_duration = config.exit_after.map(Duration::from_secs);
    let mut last_status_log = Instant::now();
    let status_interval = Duration::from_secs(config.status_interval_secs);

    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    info!(
        "Headless backend initialized (poll interval: {}ms), entering event loop",
        config.poll_interval_ms
    );

    while state.running {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            info!("Shutdown signal received, exiting");
            state.running = false;
            break;
        }

        if let Some(dur) = exit_duration {
            if start_time.elapsed() >= dur {
                info!("Headless exit timer fired after {}s", dur.as_secs());
                state.running = false;
                break;
            }
        }

        if last_status_log.elapsed() >= status_interval {
            log_status(state);
            last_status_log = Instant::now();
        }

        event_loop.dispatch(Some(poll_interval), state)?;

        if !state.connection.is_connected() {
            info!("Hand driver stream ended, exiting");
            state.running = false;
        }
    }
    Ok(())
}

/// One status line: stream counters, the navigating hand and the slices.
fn log_status(state: &HandsState) {
    let hand = state.cursors.hand(state.config.jump_hand);
    let jump_phase = state.jumper.as_ref().map(|j| j.phase());
    let focal_point = state.scene.slice_focal_point(PRIMARY_SLICE_VIEW).ok();
    info!(
        lines = state.decoder.lines_seen,
        decode_errors = state.decoder.decode_errors,
        gesture_changes = state.gesture_log.handler().changes,
        pose = ?hand.pose,
        gesture = hand.gesture.as_str().unwrap_or("none"),
        ?jump_phase,
        ?focal_point,
        status = state.last_status.as_deref().unwrap_or(""),
        "Headless status"
    );
}
