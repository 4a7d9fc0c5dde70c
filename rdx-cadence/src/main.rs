use anyhow::Result;
use cadence::prelude::*;
use cadence::{ENGINE_NAME, VERSION};
use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tracing::info;

fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    // 2. Load the configuration, optionally from the file named on the command line.
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = SchedulerConfig::load(config_path.as_deref())?
        .with_interval("demo_snapshot", Duration::from_secs(3));
    info!(
        "{} v{} starting with a {:?} run loop.",
        ENGINE_NAME, VERSION, config.run_loop_interval
    );

    // 3. Create the scheduler on top of a tokio reactor.
    let scheduler = Scheduler::new(Rc::new(TokioReactor::new()), config)?;

    // 4. Log scheduler events on the reactor's own thread.
    spawn_event_listener(&scheduler)?;

    // 5. Register timers and tasks to exercise the scheduler.
    register_demo_work(&scheduler)?;

    // 6. Run the reactor. Returns once the shutdown timer stops it.
    scheduler.start()?;

    Ok(())
}

/// Drains the event stream once per second.
fn spawn_event_listener(scheduler: &Scheduler<TokioReactor>) -> Result<()> {
    let mut events = scheduler.subscribe_events();
    scheduler.every(Duration::from_secs(1), move || {
        while let Ok(event) = events.try_recv() {
            info!("[EVENT] => {:?}", event);
        }
    })?;
    Ok(())
}

/// Registers demo requests with the scheduler.
fn register_demo_work(scheduler: &Scheduler<TokioReactor>) -> Result<()> {
    let ticks = Rc::new(Cell::new(0u32));

    // --- A 2-second periodic status line ---
    let counter = ticks.clone();
    scheduler.every(Duration::from_secs(2), move || {
        counter.set(counter.get() + 1);
        info!("[PERIODIC] Status check #{}", counter.get());
    })?;

    // --- A named interval from the configuration ---
    scheduler.at_interval("demo_snapshot", || info!("[SNAPSHOT] Taking snapshot."))?;

    // --- A one-shot that is cancelled before it ever fires ---
    let doomed = scheduler.after(Duration::from_secs(4), || {
        info!("[ONE-SHOT] This should never be printed.")
    });
    scheduler.cancel(doomed);

    // --- A long-running task, executed in quanta ---
    let handle = scheduler.clone();
    scheduler.after(Duration::from_secs(1), move || {
        let mut processed = 0u32;
        handle.start_task("demo_scan", move || {
            processed += 1;
            if processed % 100 == 0 {
                info!("[TASK] Scanned {} records.", processed);
            }
            processed < 500
        });
    });

    // --- Shut the whole reactor down after ten seconds ---
    let handle = scheduler.clone();
    scheduler.after(Duration::from_secs(10), move || {
        info!("[SHUTDOWN] {} periodic checks ran. Stopping.", ticks.get());
        handle.stop();
    });

    Ok(())
}
