//! Cancellable producers.

use std::io;

use crossbeam_channel::{select, Sender};

use crate::{
    outlet::{Builder, Stop},
    Outlet, Signal,
};

impl Builder {
    /// Spawns a generator thread that sends the values returned by `producer` to the returned
    /// [`Outlet`].
    ///
    /// See [`generate`] for details.
    pub fn generate<T, F>(self, signal: &Signal, producer: F) -> io::Result<Outlet<T>>
    where
        T: Send + 'static,
        F: FnMut() -> Option<T> + Send + 'static,
    {
        let signal = signal.clone();
        self.spawn(move |output, detached| produce(&signal, detached, producer, &output))
    }
}

/// Calls `producer` on a background thread and sends every value it returns to a new [`Outlet`].
///
/// The generator stops when `producer` returns [`None`], when `signal` fires, or when the
/// [`Outlet`] is dropped. Every send races against the signal, so a generator that nobody reads
/// from anymore stops as soon as the signal fires.
///
/// `producer` is not called again once the signal has fired. It should not block for long; the
/// generator can only notice cancellation between calls.
///
/// # Panics
///
/// Panics if the OS fails to create a thread. Use [`Builder::generate`] to handle that error
/// instead.
///
/// # Examples
///
/// ```
/// use ordone::{generate, signal};
///
/// let (trigger, signal) = signal();
/// let moos = generate(&signal, || Some("moo"));
///
/// assert_eq!(moos.recv(), Some("moo"));
/// assert_eq!(moos.recv(), Some("moo"));
///
/// drop(trigger);
/// // At most one more value, which was already on its way.
/// assert!(moos.iter().count() <= 1);
/// ```
pub fn generate<T, F>(signal: &Signal, producer: F) -> Outlet<T>
where
    T: Send + 'static,
    F: FnMut() -> Option<T> + Send + 'static,
{
    Outlet::builder()
        .generate(signal, producer)
        .expect("failed to spawn generator thread")
}

fn produce<T>(
    signal: &Signal,
    detached: &Signal,
    mut producer: impl FnMut() -> Option<T>,
    output: &Sender<T>,
) -> Stop {
    let cancel = signal.receiver();
    let detach = detached.receiver();
    loop {
        if signal.is_fired() {
            return Stop::Cancelled;
        }
        if detached.is_fired() {
            return Stop::Detached;
        }

        let Some(value) = producer() else {
            return Stop::Exhausted;
        };

        select! {
            send(output, value) -> res => {
                if res.is_err() {
                    return Stop::Detached;
                }
            },
            recv(cancel) -> _ => return Stop::Cancelled,
            recv(detach) -> _ => return Stop::Detached,
        }
    }
}
