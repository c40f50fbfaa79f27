//! Channel-backed signals and their forwarder threads
//!
//! Design: A [`SignalChannel`] field owns the sending half of a flume
//! channel. Each instance gets one forwarder thread per channel field that
//! selects over the data channel and a stop channel:
//! - a value arrives: emit the engine signal
//! - every sender is gone: exit
//! - the stop sender is dropped (instance freed): drain what is queued, exit
//!
//! The instance joins its forwarders before the host value is dropped.

use flume::{Receiver, Selector, Sender};
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::method::SignalArgs;
use crate::logging::log_forwarder;
use crate::variant::Signal;

/// Send-only signal field; every value sent is emitted on the engine object
pub struct SignalChannel<A> {
    sender: Option<Sender<A>>,
}

impl<A> SignalChannel<A> {
    /// Queue one emission; `false` once the channel is closed or unbound
    pub fn send(&self, args: A) -> bool {
        self.sender
            .as_ref()
            .is_some_and(|sender| sender.send(args).is_ok())
    }

    /// Drop this field's sender; the forwarder exits once clones are gone too
    pub fn close(&mut self) {
        self.sender = None;
    }

    pub fn is_open(&self) -> bool {
        self.sender.is_some()
    }

    /// Sender for use from other threads
    pub fn sender(&self) -> Option<Sender<A>> {
        self.sender.clone()
    }

    pub(crate) fn open(&mut self, sender: Sender<A>) {
        self.sender = Some(sender);
    }
}

impl<A> Default for SignalChannel<A> {
    fn default() -> Self {
        Self { sender: None }
    }
}

impl<A> fmt::Debug for SignalChannel<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalChannel")
            .field("open", &self.is_open())
            .finish()
    }
}

enum Event<A> {
    Value(A),
    Closed,
    Stop,
}

/// Running forwarder thread of one instance's channel field
pub struct Forwarder {
    signal: String,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Forwarder {
    /// Spawn a thread emitting `signal` for every value `data` yields
    pub(crate) fn spawn<A: SignalArgs>(
        thread_name: String,
        data: Receiver<A>,
        signal: Signal,
        running: Arc<AtomicUsize>,
    ) -> io::Result<Self> {
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);
        let name = signal.name().to_string();
        running.fetch_add(1, Ordering::AcqRel);
        let spawned = thread::Builder::new().name(thread_name).spawn({
            let running = Arc::clone(&running);
            move || {
                forward(&data, &stop_rx, &signal);
                running.fetch_sub(1, Ordering::AcqRel);
            }
        });
        match spawned {
            Ok(handle) => Ok(Self {
                signal: name,
                stop: Some(stop_tx),
                handle: Some(handle),
            }),
            Err(err) => {
                running.fetch_sub(1, Ordering::AcqRel);
                Err(err)
            }
        }
    }

    pub fn signal(&self) -> &str {
        &self.signal
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Ask the thread to drain and exit, then wait for it
    pub(crate) fn stop(mut self) {
        self.stop = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                crate::logging::error!(target: "signals", signal = %self.signal, "forwarder panicked");
            }
        }
    }
}

impl fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forwarder")
            .field("signal", &self.signal)
            .field("finished", &self.is_finished())
            .finish()
    }
}

fn forward<A: SignalArgs>(data: &Receiver<A>, stop: &Receiver<()>, signal: &Signal) {
    log_forwarder(signal.object(), signal.name(), "started");
    loop {
        let event = Selector::new()
            .recv(data, |msg| match msg {
                Ok(args) => Event::Value(args),
                Err(_) => Event::Closed,
            })
            .recv(stop, |_| Event::Stop)
            .wait();
        match event {
            Event::Value(args) => signal.emit(args),
            Event::Closed => break,
            Event::Stop => {
                for args in data.try_iter() {
                    signal.emit(args);
                }
                break;
            }
        }
    }
    log_forwarder(signal.object(), signal.name(), "stopped");
}
