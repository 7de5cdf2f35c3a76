//! Cancellation-aware channel relays on owned threads.
//!
//! When a consumer reads from a channel it doesn't control, two things can keep it waiting
//! forever: the producer may never close the channel, and a thread forwarding values to the
//! consumer may block on a hand-off nobody will ever accept. This library solves both with a
//! shared *cancellation signal* and a *relay* that races every wait against it.
//!
//! # Overview
//!
//! - [`signal`](fn@signal) creates a [`Trigger`] and a [`Signal`]. The [`Trigger`] fires once,
//!   explicitly or when it is dropped; every clone of the [`Signal`] observes it.
//! - [`relay`](fn@relay) forwards a [`crossbeam_channel::Receiver`] into a fresh channel until the
//!   source is closed or the signal fires. It never blocks past cancellation, not even while
//!   handing a value to a consumer that has stopped reading.
//! - [`generate`](fn@generate) runs a producer closure on a background thread, sending its values
//!   until the producer runs out or the signal fires.
//!
//! Both [`relay`](fn@relay) and [`generate`](fn@generate) return an [`Outlet`], which owns the
//! background thread. This enforces *structured concurrency*: when the [`Outlet`] is dropped, the
//! thread is told to stop and joined, and a panic on that thread is forwarded to the thread
//! dropping the [`Outlet`]. No thread outlives the code that started it.
//!
//! # Usage
//!
//! Two endless producers, each consumed through a relay, all stopped by a single signal when the
//! [`Trigger`] goes out of scope:
//!
//! ```
//! use std::{thread, time::Duration};
//! use ordone::{generate, relay, signal};
//!
//! let (trigger, signal) = signal();
//! let cows = generate(&signal, || Some("moo"));
//! let pigs = generate(&signal, || Some("oink"));
//!
//! thread::scope(|s| {
//!     for animal in [&cows, &pigs] {
//!         let signal = &signal;
//!         s.spawn(move || {
//!             for sound in relay(signal, animal.receiver().clone()) {
//!                 println!("{sound}");
//!             }
//!         });
//!     }
//!
//!     thread::sleep(Duration::from_millis(10));
//!     drop(trigger);
//! });
//! ```
//!
//! A consumer can't tell from the [`Outlet`] alone whether the relay stopped because the source
//! was exhausted or because it was cancelled; it can ask the [`Signal`]:
//!
//! ```
//! use ordone::{relay, signal};
//!
//! let (trigger, signal) = signal();
//! let (source, rx) = crossbeam_channel::unbounded();
//! source.send(1).unwrap();
//! drop(source);
//!
//! let output = relay(&signal, rx);
//! assert_eq!(output.iter().collect::<Vec<_>>(), [1]);
//! assert!(!signal.is_fired());
//! # drop(trigger);
//! ```

mod generate;
mod outlet;
mod relay;
mod signal;

pub use crossbeam_channel;

pub use generate::generate;
pub use outlet::{Builder, IntoIter, Outlet};
pub use relay::relay;
pub use signal::{signal, Interrupted, SendInterrupted, Signal, Trigger};
