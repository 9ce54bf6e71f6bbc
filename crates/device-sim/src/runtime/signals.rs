use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::runtime::Builder;
use tracing::{info, warn};

/// Raise `stop` on SIGINT (and SIGTERM on unix). The listener thread exits on
/// its own once `stop` is set by anyone else.
pub fn spawn_signal_listener(stop: Arc<AtomicBool>) -> io::Result<thread::JoinHandle<()>> {
    let runtime = Builder::new_current_thread().enable_all().build()?;
    thread::Builder::new()
        .name("signals".into())
        .spawn(move || runtime.block_on(wait_for_shutdown(stop)))
}

/// Raise `stop` after `seconds`.
pub fn spawn_run_timer(seconds: u64, stop: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let deadline = std::time::Instant::now() + Duration::from_secs(seconds);
        while !stop.load(Ordering::Acquire) {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                info!(seconds, "Run duration elapsed");
                stop.store(true, Ordering::Release);
                break;
            }
            thread::sleep(remaining.min(Duration::from_millis(100)));
        }
    })
}

async fn wait_for_shutdown(stop: Arc<AtomicBool>) {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let terminate = terminate_signal();
    tokio::pin!(terminate);
    let mut ctrl_c_armed = true;
    let mut poll = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            res = &mut ctrl_c, if ctrl_c_armed => match res {
                Ok(()) => {
                    info!(signal = "SIGINT", "Received signal");
                    stop.store(true, Ordering::Release);
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "Unable to listen for Ctrl+C");
                    ctrl_c_armed = false;
                }
            },
            signal = &mut terminate => {
                info!(signal, "Received signal");
                stop.store(true, Ordering::Release);
                return;
            }
            _ = poll.tick() => {
                if stop.load(Ordering::Acquire) {
                    return;
                }
            }
        }
    }
}

#[cfg(unix)]
async fn terminate_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
            "SIGTERM"
        }
        Err(e) => {
            warn!(error = %e, "Unable to listen for SIGTERM");
            std::future::pending().await
        }
    }
}

#[cfg(not(unix))]
async fn terminate_signal() -> &'static str {
    std::future::pending().await
}
