//! Cooperative shutdown signaling. Extends the `Arc<AtomicBool>` cancel-flag
//! pattern (see `indexer/mod.rs`'s `is_cancelled`/`wait_if_paused`) with an
//! interactive, TTY-aware interrupt prompt and a forced-exit path on a
//! second interrupt.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

static SHUTTING_DOWN: AtomicBool = AtomicBool::new(false);
static INTERRUPT_COUNT: AtomicUsize = AtomicUsize::new(0);

type Cleanup = Box<dyn Fn() + Send + Sync>;
static CLEANUPS: Mutex<Vec<Cleanup>> = Mutex::new(Vec::new());

/// Three choices offered on the first interactive interrupt.
pub enum InterruptChoice {
    AbortNow,
    FinishThenExit,
    CancelAndContinue,
}

/// Test seam: overrides TTY detection and the exit function so the prompt
/// and forced-exit paths are exercised without a real terminal or process
/// exit.
pub trait ShutdownEnv {
    fn is_tty(&self) -> bool;
    fn exit(&self, code: i32) -> !;
    fn read_choice(&self) -> Option<String>;
}

pub struct RealEnv;

impl ShutdownEnv for RealEnv {
    fn is_tty(&self) -> bool {
        use is_terminal::IsTerminal;
        io::stdin().is_terminal()
    }

    fn exit(&self, code: i32) -> ! {
        std::process::exit(code);
    }

    fn read_choice(&self) -> Option<String> {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line).ok()?;
        Some(line.trim().to_string())
    }
}

/// Registers a cleanup to run (in registration order) on forced exit.
/// Callers should unregister on clean release; this crate's cleanups are
/// process-lifetime (database close, checkpoint flush) so they are
/// typically registered once at startup.
pub fn register_cleanup<F: Fn() + Send + Sync + 'static>(f: F) {
    CLEANUPS.lock().unwrap().push(Box::new(f));
}

pub fn should_abort() -> bool {
    SHUTTING_DOWN.load(Ordering::Relaxed)
}

fn run_cleanups() {
    for cleanup in CLEANUPS.lock().unwrap().iter() {
        cleanup();
    }
}

/// Handle one interrupt signal. Call from a signal handler or, in tests,
/// directly.
pub fn handle_interrupt(env: &dyn ShutdownEnv) {
    let count = INTERRUPT_COUNT.fetch_add(1, Ordering::SeqCst) + 1;

    if count >= 2 {
        tracing::warn!("second interrupt received, forcing exit");
        run_cleanups();
        env.exit(130);
    }

    if !env.is_tty() {
        // Non-interactive: equivalent to "finish then exit".
        SHUTTING_DOWN.store(true, Ordering::SeqCst);
        return;
    }

    loop {
        print!("\nInterrupted. (1) abort now  (2) finish current then exit  (3) cancel, continue: ");
        let _ = io::stdout().flush();
        match env.read_choice().as_deref() {
            Some("1") => {
                run_cleanups();
                env.exit(130);
            }
            Some("2") => {
                SHUTTING_DOWN.store(true, Ordering::SeqCst);
                return;
            }
            Some("3") => {
                INTERRUPT_COUNT.store(0, Ordering::SeqCst);
                return;
            }
            _ => continue,
        }
    }
}

/// Resets global shutdown state. Test-only: production runs for one
/// process lifetime and never needs to reset.
#[cfg(test)]
pub fn reset_for_test() {
    SHUTTING_DOWN.store(false, Ordering::SeqCst);
    INTERRUPT_COUNT.store(0, Ordering::SeqCst);
    CLEANUPS.lock().unwrap().clear();
}

/// Sets the shutdown flag directly, standing in for a real interrupt signal
/// in tests that exercise a consumer loop's abort path without going
/// through [`handle_interrupt`].
#[cfg(test)]
pub fn force_abort_for_test() {
    SHUTTING_DOWN.store(true, Ordering::SeqCst);
}
