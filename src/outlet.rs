use std::{
    fmt, io,
    panic::resume_unwind,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::signal::{signal, Signal, Trigger};

/// A builder object that can be used to configure and spawn the thread behind an [`Outlet`].
///
/// Obtained from [`Outlet::builder`]. The thread is spawned by [`Builder::relay`] or
/// [`Builder::generate`].
#[derive(Clone)]
pub struct Builder {
    name: Option<String>,
    capacity: usize,
}

impl Builder {
    /// Sets the name of the spawned thread.
    ///
    /// The name is also used to tag the thread's log messages.
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Sets the capacity of the [`Outlet`]'s channel.
    ///
    /// By default, a capacity of 0 is used, which means that every value is handed directly from
    /// the background thread to a consumer that is waiting for it. A larger capacity lets the
    /// thread run ahead of its consumers by up to `capacity` values.
    #[inline]
    pub fn capacity(self, capacity: usize) -> Self {
        Self { capacity, ..self }
    }

    /// Spawns a thread running `body`.
    ///
    /// `body` is handed the only [`Sender`] of the new channel, and the detach [`Signal`] that
    /// fires when the [`Outlet`] is dropped. The channel is closed when `body` returns.
    pub(crate) fn spawn<T, F>(self, body: F) -> io::Result<Outlet<T>>
    where
        T: Send + 'static,
        F: FnOnce(Sender<T>, &Signal) -> Stop + Send + 'static,
    {
        let (sender, receiver) = crossbeam_channel::bounded(self.capacity);
        let (detach, detached) = signal();
        let mut builder = thread::Builder::new();
        if let Some(name) = self.name.clone() {
            builder = builder.name(name);
        }
        let handle = builder.spawn(move || {
            let name = self.name.as_deref().unwrap_or("<unnamed>");
            log::trace!("outlet thread '{name}' starting");
            let stop = body(sender, &detached);
            log::trace!("outlet thread '{name}' stopped: {stop}");
        })?;

        Ok(Outlet {
            receiver,
            detach,
            handle: Some(handle),
        })
    }
}

/// Why the thread behind an [`Outlet`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stop {
    /// The cancellation signal fired.
    Cancelled,
    /// The relay's source channel was closed.
    SourceClosed,
    /// The generator's producer had no more values.
    Exhausted,
    /// The [`Outlet`] was dropped.
    Detached,
}

impl fmt::Display for Stop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stop::Cancelled => "cancelled",
            Stop::SourceClosed => "source closed",
            Stop::Exhausted => "producer exhausted",
            Stop::Detached => "outlet dropped",
        })
    }
}

/// The receiving end of a channel that is fed by an owned background thread.
///
/// [`Outlet`]s are returned by [`relay`](fn@crate::relay) and
/// [`generate`](fn@crate::generate). The background thread is the only writer to the channel, and
/// closes it exactly once, when it stops. Consumers read from the [`Outlet`] until it reports the
/// channel as closed. A closed channel looks the same whether the thread ran out of input or was
/// cancelled; check the [`Signal`] if the difference matters.
///
/// This type enforces structured concurrency: when it's dropped, the thread is told to stop and is
/// then joined. If the thread has panicked, the panic will be forwarded to the thread dropping the
/// [`Outlet`].
pub struct Outlet<T> {
    receiver: Receiver<T>,
    /// Fired on drop, so that the thread stops even if nothing else would make it.
    detach: Trigger,
    handle: Option<JoinHandle<()>>,
}

impl<T> Drop for Outlet<T> {
    fn drop(&mut self) {
        self.detach.fire();

        // Wait for it to exit and propagate its panic if it panicked.
        if let Some(handle) = self.handle.take() {
            if let Err(payload) = handle.join() {
                if !thread::panicking() {
                    resume_unwind(payload);
                }
            }
        }
    }
}

impl Outlet<()> {
    /// Returns a builder that can be used to configure and spawn an [`Outlet`].
    #[inline]
    pub fn builder() -> Builder {
        Builder {
            name: None,
            capacity: 0,
        }
    }
}

impl<T> Outlet<T> {
    /// Blocks until a value is available, and returns it.
    ///
    /// Returns [`None`] once the channel is closed and empty.
    pub fn recv(&self) -> Option<T> {
        self.receiver.recv().ok()
    }

    /// Returns a value if one is available right now.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Blocks until a value is available, the channel is closed, or `timeout` elapses.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Returns the underlying [`Receiver`].
    ///
    /// This can be used as an arm of a [`crossbeam_channel::select!`], or cloned to let several
    /// consumers read from the same [`Outlet`]. Clones observe the channel as closed once the
    /// [`Outlet`] is dropped.
    #[inline]
    pub fn receiver(&self) -> &Receiver<T> {
        &self.receiver
    }

    /// Returns a blocking iterator over the values received from this [`Outlet`].
    ///
    /// The iterator ends when the channel is closed.
    pub fn iter(&self) -> crossbeam_channel::Iter<'_, T> {
        self.receiver.iter()
    }

    /// Checks whether the background thread has stopped.
    ///
    /// Once this returns `true`, the channel is closed, though it may still hold buffered values.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl<'a, T> IntoIterator for &'a Outlet<T> {
    type Item = T;
    type IntoIter = crossbeam_channel::Iter<'a, T>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterating over an [`Outlet`] yields its values until the channel is closed.
///
/// The [`Outlet`] is dropped, and its thread joined, when the iterator is dropped.
impl<T> IntoIterator for Outlet<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    #[inline]
    fn into_iter(self) -> IntoIter<T> {
        IntoIter { outlet: self }
    }
}

/// A blocking [`Iterator`] that owns an [`Outlet`].
pub struct IntoIter<T> {
    outlet: Outlet<T>,
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.outlet.recv()
    }
}
