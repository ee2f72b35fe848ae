//! Harness shared by the integration tests.
//!
//! Server adapters never block, but the peers in these tests do. [`SimThread`] runs a hook
//! on its own clock thread so a test can play the peer side.
use std::{
    convert::Infallible,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
};

use simbridge_protocol::hook::CycleHook;

/// A hook driven by a free-running clock on a background thread.
pub struct SimThread<P> {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<P>>,
}

impl<P: Send + 'static> SimThread<P> {
    /// Starts the clock. Every tick calls `eval` on the pins first, like a design
    /// evaluated before its testbench hooks, and then the hook.
    pub fn spawn<H>(mut hook: H, mut pins: P, mut eval: impl FnMut(&mut P) + Send + 'static) -> Self
    where
        H: CycleHook<Pins = P, Error = Infallible> + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::spawn(move || {
            let mut tick = 0;
            while flag.load(Ordering::Acquire) {
                eval(&mut pins);
                let Ok(()) = hook.cycle(tick, &mut pins);
                tick += 1;
            }
            pins
        });
        SimThread {
            running,
            handle: Some(handle),
        }
    }

    /// Stops the clock and returns the final pin state.
    pub fn stop(mut self) -> P {
        self.running.store(false, Ordering::Release);
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(pins)) => pins,
            _ => panic!("simulation thread panicked"),
        }
    }
}

impl<P> Drop for SimThread<P> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
