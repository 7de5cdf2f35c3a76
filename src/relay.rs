//! Cancellation-aware relaying of a channel into a fresh one.

use std::io;

use crossbeam_channel::{select, Receiver, Sender};

use crate::{
    outlet::{Builder, Stop},
    Outlet, Signal,
};

impl Builder {
    /// Spawns a relay thread that forwards values from `source` to the returned [`Outlet`].
    ///
    /// See [`relay`] for the forwarding rules.
    pub fn relay<T>(self, signal: &Signal, source: Receiver<T>) -> io::Result<Outlet<T>>
    where
        T: Send + 'static,
    {
        let signal = signal.clone();
        self.spawn(move |output, detached| forward(&signal, detached, &source, &output))
    }
}

/// Forwards every value from `source` to a new [`Outlet`], until `source` is closed or `signal`
/// fires.
///
/// Each step of the relay waits for whichever happens first: the signal firing, or `source`
/// yielding a value (or being closed). A received value is then sent on, but that send races
/// against the signal again, so a consumer that has stopped reading can never keep the relay
/// thread alive after cancellation. A value abandoned this way is dropped; it is neither delivered
/// nor replaced.
///
/// Values arrive in the order they were received from `source`. If the signal fires while a
/// value is ready at the same time, either may win.
///
/// The [`Outlet`]'s channel is closed when the relay stops. If `source` is already closed, it is
/// closed without yielding anything; if `signal` has already fired, nothing is read from `source`
/// at all.
///
/// # Panics
///
/// Panics if the OS fails to create a thread. Use [`Builder::relay`] to handle that error instead.
///
/// # Examples
///
/// ```
/// use ordone::{relay, signal};
///
/// let (trigger, signal) = signal();
/// let (source, rx) = crossbeam_channel::unbounded();
/// let output = relay(&signal, rx);
///
/// source.send("moo").unwrap();
/// assert_eq!(output.recv(), Some("moo"));
///
/// // `source` is still open, but the relay stops anyway.
/// trigger.fire();
/// assert_eq!(output.recv(), None);
/// ```
pub fn relay<T>(signal: &Signal, source: Receiver<T>) -> Outlet<T>
where
    T: Send + 'static,
{
    Outlet::builder()
        .relay(signal, source)
        .expect("failed to spawn relay thread")
}

fn forward<T>(
    signal: &Signal,
    detached: &Signal,
    source: &Receiver<T>,
    output: &Sender<T>,
) -> Stop {
    let cancel = signal.receiver();
    let detach = detached.receiver();
    loop {
        if signal.is_fired() {
            return Stop::Cancelled;
        }

        let value = select! {
            recv(cancel) -> _ => return Stop::Cancelled,
            recv(detach) -> _ => return Stop::Detached,
            recv(source) -> msg => match msg {
                Ok(value) => value,
                Err(_) => return Stop::SourceClosed,
            },
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

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use crossbeam_channel::{bounded, unbounded, RecvTimeoutError};

    use crate::{
        signal,
        test::{drain, wait_finished, PATIENCE},
    };

    use super::*;

    #[test]
    fn forwards_until_source_closes() {
        let (_trigger, signal) = signal();
        let (tx, rx) = unbounded();
        let output = relay(&signal, rx);
        tx.send("a").unwrap();
        tx.send("b").unwrap();
        drop(tx);
        assert_eq!(drain(&output), ["a", "b"]);
    }

    #[test]
    fn preserves_order_of_long_stream() {
        let (_trigger, signal) = signal();
        let (tx, rx) = bounded(4);
        let output = relay(&signal, rx);
        thread::scope(|s| {
            s.spawn(move || {
                for i in 0..1000 {
                    tx.send(i).unwrap();
                }
            });
            assert_eq!(drain(&output), (0..1000).collect::<Vec<_>>());
        });
    }

    #[test]
    fn closed_source_yields_nothing() {
        let (_trigger, signal) = signal();
        let (tx, rx) = unbounded::<u32>();
        drop(tx);
        let output = relay(&signal, rx);
        assert!(drain(&output).is_empty());
    }

    #[test]
    fn fired_before_start_yields_nothing() {
        let (trigger, signal) = signal();
        let (tx, rx) = unbounded();
        tx.send("a").unwrap();
        tx.send("b").unwrap();
        trigger.fire();

        let output = relay(&signal, rx.clone());
        assert!(drain(&output).is_empty());
        // Nothing was taken out of the source.
        assert_eq!(rx.len(), 2);
        drop(tx);
    }

    #[test]
    fn fired_after_push_yields_prefix() {
        let (trigger, signal) = signal();
        let (tx, rx) = unbounded();
        let output = relay(&signal, rx.clone());
        for i in 0..10 {
            tx.send(i).unwrap();
        }
        trigger.fire();

        let got = drain(&output);
        assert!(got.len() <= 10);
        assert_eq!(got, (0..got.len() as i32).collect::<Vec<_>>());
    }

    #[test]
    fn single_value_then_fire_never_hangs() {
        let (trigger, signal) = signal();
        let (tx, rx) = unbounded();
        let output = relay(&signal, rx);
        tx.send("a").unwrap();
        trigger.fire();

        let got = drain(&output);
        assert!(got.is_empty() || got == ["a"], "unexpected output {got:?}");
    }

    #[test]
    fn fire_is_idempotent() {
        let (trigger, signal) = signal();
        let (_tx, rx) = unbounded::<()>();
        let output = relay(&signal, rx);
        trigger.fire();
        trigger.fire();
        drop(trigger);
        assert!(drain(&output).is_empty());
        wait_finished(&output);
    }

    #[test]
    fn relays_sharing_a_signal_all_stop() {
        let (trigger, signal) = signal();
        let (_tx1, rx1) = unbounded::<u8>();
        let (_tx2, rx2) = unbounded::<u8>();
        let first = relay(&signal, rx1);
        let second = relay(&signal, rx2);

        trigger.fire();
        wait_finished(&first);
        wait_finished(&second);
        assert!(drain(&first).is_empty());
        assert!(drain(&second).is_empty());
    }

    #[test]
    fn absent_consumer_does_not_block_cancellation() {
        let (trigger, signal) = signal();
        let (tx, rx) = unbounded();
        let output = relay(&signal, rx);
        tx.send(1).unwrap();

        // Give the relay time to pick up the value and block on handing it over.
        thread::sleep(Duration::from_millis(20));
        assert!(!output.is_finished());

        trigger.fire();
        wait_finished(&output);
    }

    #[test]
    fn drop_stops_relay_on_open_source() {
        let (_trigger, signal) = signal();
        let (tx, rx) = unbounded();
        let output = relay(&signal, rx);
        tx.send(1).unwrap();
        assert_eq!(output.recv(), Some(1));

        drop(output);
        // The relay thread has exited, taking the source receiver with it.
        assert!(tx.send(2).is_err());
    }

    #[test]
    fn several_consumers_share_output() {
        let (_trigger, signal) = signal();
        let (tx, rx) = unbounded();
        let output = relay(&signal, rx);
        for i in 0..100 {
            tx.send(i).unwrap();
        }
        drop(tx);

        let mut all = thread::scope(|s| {
            let consumers: Vec<_> = (0..3)
                .map(|_| {
                    let receiver = output.receiver().clone();
                    s.spawn(move || receiver.iter().collect::<Vec<_>>())
                })
                .collect();
            consumers
                .into_iter()
                .flat_map(|c| c.join().unwrap())
                .collect::<Vec<_>>()
        });
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn builder_configures_relay() {
        let (_trigger, signal) = signal();
        let (tx, rx) = unbounded();
        let output = Outlet::builder()
            .name("relay-test")
            .capacity(8)
            .relay(&signal, rx)
            .unwrap();
        for i in 0..8 {
            tx.send(i).unwrap();
        }
        drop(tx);
        // With enough capacity, the relay can finish before anyone reads.
        wait_finished(&output);
        assert_eq!(drain(&output), (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn consumer_cannot_hang_after_fire() {
        let (trigger, signal) = signal();
        let (tx, rx) = unbounded();
        let output = relay(&signal, rx);
        thread::scope(|s| {
            let consumer = s.spawn(|| output.iter().count());
            tx.send(()).unwrap();
            trigger.fire();
            let count = consumer.join().unwrap();
            assert!(count <= 1);
        });
        assert_eq!(
            output.recv_timeout(PATIENCE),
            Err(RecvTimeoutError::Disconnected)
        );
    }
}
