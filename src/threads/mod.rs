//! Pipeline threads: one OS thread per stage (spec section 5), wired
//! together in `main.rs` the way the teacher's `main` spawns `Listener`/
//! `Exporter`/`Prometheus` via named `thread::Builder`s.

pub mod aggregator_thread;
pub mod exporter_thread;
pub mod listener;
pub mod observer_thread;
