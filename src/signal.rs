//! One-shot broadcast cancellation.
//!
//! [`signal`] creates a connected pair of [`Trigger`] and [`Signal`]. The [`Trigger`] is owned by
//! whoever decides when work should stop; the [`Signal`] can be cloned freely and handed to every
//! thread or task that needs to observe that decision.
//!
//! Firing is broadcast and permanent: once any holder of a [`Signal`] has observed it as fired,
//! every other holder will too, and it can never become active again. Firing a second time does
//! nothing.
//!
//! A [`Signal`] can be waited on in three ways:
//!
//! - by blocking the calling thread ([`Signal::block`], [`Signal::block_timeout`]),
//! - from `async` code on any executor ([`Signal::fired`]),
//! - as one arm of a [`crossbeam_channel::select!`], via [`Signal::receiver`]. This is the form
//!   the relay and generator threads use, and it is what makes a blocked channel operation
//!   abandonable.

use std::{
    convert::Infallible,
    error::Error,
    fmt,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll, Waker},
    time::Duration,
};

use crossbeam_channel::{select, Receiver, RecvTimeoutError, Select, Sender, TryRecvError};

/// Creates a connected pair of [`Trigger`] and [`Signal`].
pub fn signal() -> (Trigger, Signal) {
    // Nothing is ever sent on this channel. Firing drops the only sender, which every receiver
    // observes as a disconnection.
    let (sender, receiver) = crossbeam_channel::bounded(0);
    let shared = Arc::new(Shared {
        receiver,
        state: Mutex::new(State {
            sender: Some(sender),
            wakers: Vec::new(),
        }),
    });
    (
        Trigger {
            shared: shared.clone(),
        },
        Signal { shared },
    )
}

struct Shared {
    receiver: Receiver<Infallible>,
    state: Mutex<State>,
}

impl Shared {
    /// Locks the state, ignoring poisoning. The critical sections never leave the state
    /// half-updated, and [`Trigger`] locks it from `Drop`, where a second panic would abort.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct State {
    /// `None` once the signal has fired.
    sender: Option<Sender<Infallible>>,
    /// Tasks waiting in [`Signal::fired`].
    wakers: Vec<Waker>,
}

/// The firing end of a cancellation signal.
///
/// There is exactly one [`Trigger`] per signal. Dropping it fires the signal, so keeping the
/// [`Trigger`] in a local variable guarantees that everything observing the connected [`Signal`]s
/// is told to stop when the enclosing scope is left, whether by returning or by unwinding.
pub struct Trigger {
    shared: Arc<Shared>,
}

impl Drop for Trigger {
    fn drop(&mut self) {
        self.fire();
    }
}

impl Trigger {
    /// Fires the signal, waking every thread and task waiting on a connected [`Signal`].
    ///
    /// Only the first call has any effect.
    pub fn fire(&self) {
        let mut state = self.shared.lock();
        if let Some(sender) = state.sender.take() {
            drop(sender);
            state.wakers.drain(..).for_each(Waker::wake);
            log::trace!("cancellation signal fired");
        }
    }

    /// Returns a new [`Signal`] connected to this [`Trigger`].
    pub fn signal(&self) -> Signal {
        Signal {
            shared: self.shared.clone(),
        }
    }
}

/// The observing end of a cancellation signal.
///
/// [`Signal`]s are cheap to clone, and all clones observe the same [`Trigger`].
#[derive(Clone)]
pub struct Signal {
    shared: Arc<Shared>,
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("fired", &self.is_fired())
            .finish()
    }
}

impl Signal {
    /// Returns whether the connected [`Trigger`] has fired.
    pub fn is_fired(&self) -> bool {
        matches!(
            self.shared.receiver.try_recv(),
            Err(TryRecvError::Disconnected)
        )
    }

    /// Blocks the calling thread until the signal fires.
    pub fn block(&self) {
        match self.shared.receiver.recv() {
            Ok(never) => match never {},
            Err(_) => {}
        }
    }

    /// Blocks the calling thread until the signal fires or `timeout` elapses.
    ///
    /// Returns `true` if the signal has fired.
    pub fn block_timeout(&self, timeout: Duration) -> bool {
        match self.shared.receiver.recv_timeout(timeout) {
            Ok(never) => match never {},
            Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    /// Asynchronously waits for the signal to fire.
    ///
    /// This does not depend on any particular executor.
    pub async fn fired(&self) {
        struct Waiter<'a>(&'a Signal);

        impl<'a> Future for Waiter<'a> {
            type Output = ();

            fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
                let mut state = self.0.shared.lock();
                if state.sender.is_none() {
                    return Poll::Ready(());
                }
                if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    state.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }

        Waiter(self).await
    }

    /// Returns a receiver that becomes disconnected when the signal fires.
    ///
    /// No message is ever received from it. Its only use is as an arm of a
    /// [`crossbeam_channel::select!`] (or a [`Select`]), to make another channel operation race
    /// against cancellation.
    pub fn receiver(&self) -> &Receiver<Infallible> {
        &self.shared.receiver
    }

    /// Receives a value from `receiver`, unless the signal fires first.
    ///
    /// If a value is available and the signal has fired at the same time, either outcome may
    /// be returned.
    pub fn recv<T>(&self, receiver: &Receiver<T>) -> Result<T, Interrupted> {
        select! {
            recv(receiver) -> msg => msg.map_err(|_| Interrupted::Disconnected),
            recv(self.shared.receiver) -> _ => Err(Interrupted::Cancelled),
        }
    }

    /// Sends `value` on `sender`, unless the signal fires before a receiver accepts it.
    ///
    /// On failure the value is handed back in the returned [`SendInterrupted`].
    pub fn send<T>(&self, sender: &Sender<T>, value: T) -> Result<(), SendInterrupted<T>> {
        let mut sel = Select::new();
        let send = sel.send(sender);
        let cancel = sel.recv(&self.shared.receiver);
        let oper = sel.select();
        match oper.index() {
            i if i == send => oper.send(sender, value).map_err(|err| SendInterrupted {
                value: err.into_inner(),
                reason: Interrupted::Disconnected,
            }),
            i => {
                debug_assert_eq!(i, cancel);
                match oper.recv(&self.shared.receiver) {
                    Ok(never) => match never {},
                    Err(_) => Err(SendInterrupted {
                        value,
                        reason: Interrupted::Cancelled,
                    }),
                }
            }
        }
    }
}

/// Why a channel operation performed through a [`Signal`] did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    /// The signal fired first.
    Cancelled,
    /// The other end of the channel is gone.
    Disconnected,
}

impl Error for Interrupted {}

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interrupted::Cancelled => f.write_str("operation was cancelled"),
            Interrupted::Disconnected => f.write_str("channel is disconnected"),
        }
    }
}

/// An error returned by [`Signal::send`], carrying the value that could not be sent.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SendInterrupted<T> {
    value: T,
    reason: Interrupted,
}

impl<T> SendInterrupted<T> {
    /// Returns why the send did not complete.
    #[inline]
    pub fn reason(&self) -> Interrupted {
        self.reason
    }

    /// Returns the value that was not sent.
    #[inline]
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> fmt::Debug for SendInterrupted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendInterrupted")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for SendInterrupted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "send interrupted: {}", self.reason)
    }
}

impl<T> Error for SendInterrupted<T> {}
