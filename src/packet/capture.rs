//! The Observer: opens a capture source and broadcasts packets to N
//! subscriber queues (spec section 4.1, grounded on original_source's
//! `sampler/Observer.cpp`).
//!
//! The C++ original blocks in `pcap_next()` and pushes onto unbounded
//! `ConcurrentQueue`s. Spec section 5 upgrades this to bounded,
//! non-blocking `try_send` with a drop counter — "backpressure is lossy
//! by design, a deliberate choice to preserve capture timing" — so a
//! slow aggregator thread can never stall the capture loop.

use crate::error::CaptureError;
use crate::packet::Packet;
use crossbeam_channel::Sender;
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Abstraction over "a thing that yields raw frames", so the Observer's
/// broadcast loop can be tested without a live capture device. The
/// `pcap` crate's `Capture<Active>` implements the production path.
pub trait PacketSource {
    /// Blocks until the next frame is available or the read timeout
    /// elapses, in which case it returns `Ok(None)` so the caller can
    /// recheck the cancellation flag (original's "checks a cancellation
    /// flag between frames").
    fn next_frame(&mut self) -> Result<Option<(i64, Vec<u8>)>, CaptureError>;
}

pub struct PcapSource {
    capture: pcap::Capture<pcap::Active>,
}

impl PcapSource {
    pub fn open(iface: &str, caplen: i32, read_timeout_ms: i32) -> Result<Self, CaptureError> {
        let capture = pcap::Capture::from_device(iface)
            .map_err(|e| CaptureError::OpenFailed { iface: iface.to_string(), reason: e.to_string() })?
            .snaplen(caplen)
            .timeout(read_timeout_ms)
            .promisc(true)
            .open()
            .map_err(|e| CaptureError::OpenFailed { iface: iface.to_string(), reason: e.to_string() })?;
        Ok(PcapSource { capture })
    }
}

impl PacketSource for PcapSource {
    fn next_frame(&mut self) -> Result<Option<(i64, Vec<u8>)>, CaptureError> {
        match self.capture.next_packet() {
            Ok(p) => {
                let ts = p.header.ts;
                let micros = ts.tv_sec as i64 * 1_000_000 + ts.tv_usec as i64;
                Ok(Some((micros, p.data.to_vec())))
            }
            Err(pcap::Error::TimeoutExpired) => Ok(None),
            Err(e) => Err(CaptureError::DeviceLost(e.to_string())),
        }
    }
}

/// Counts frames dropped because a subscriber's queue was full, and
/// frames dropped due to a frame-copy allocation failure — the two
/// `ResourceError`/lossy-backpressure paths spec section 4.1/5 call out.
#[derive(Default)]
pub struct ObserverStats {
    pub captured: AtomicU64,
    pub dropped_backpressure: AtomicU64,
    pub dropped_allocation: AtomicU64,
}

pub struct Observer {
    subscribers: Vec<Sender<Packet>>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<ObserverStats>,
}

impl Observer {
    pub fn new(subscribers: Vec<Sender<Packet>>, shutdown: Arc<AtomicBool>, stats: Arc<ObserverStats>) -> Self {
        Observer { subscribers, shutdown, stats }
    }

    /// Runs the capture loop until the shutdown flag is set or the
    /// source reports the device as lost. A lost device is fatal to the
    /// Observer and must be surfaced so the pipeline can shut down
    /// (spec section 4.1/7).
    pub fn run<S: PacketSource>(&self, mut source: S) -> Result<(), CaptureError> {
        info!("observer: capture loop starting with {} subscribers", self.subscribers.len());
        while !self.shutdown.load(Ordering::Relaxed) {
            match source.next_frame() {
                Ok(None) => continue,
                Ok(Some((ts, bytes))) => {
                    self.stats.captured.fetch_add(1, Ordering::Relaxed);
                    let packet = Packet::new(ts, bytes);
                    self.broadcast(packet);
                }
                Err(e) => {
                    error!("observer: capture device lost: {}", e);
                    self.shutdown.store(true, Ordering::Relaxed);
                    return Err(e);
                }
            }
        }
        info!("observer: shutdown requested, capture loop exiting");
        Ok(())
    }

    fn broadcast(&self, packet: Packet) {
        for sub in &self.subscribers {
            if sub.try_send(packet.clone()).is_err() {
                self.stats.dropped_backpressure.fetch_add(1, Ordering::Relaxed);
                warn!("observer: subscriber queue full, dropping frame (lossy backpressure by design)");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    struct FixedSource {
        frames: std::vec::IntoIter<(i64, Vec<u8>)>,
    }

    impl PacketSource for FixedSource {
        fn next_frame(&mut self) -> Result<Option<(i64, Vec<u8>)>, CaptureError> {
            Ok(self.frames.next())
        }
    }

    #[test]
    fn broadcasts_to_all_subscribers() {
        let (tx1, rx1) = bounded(4);
        let (tx2, rx2) = bounded(4);
        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(ObserverStats::default());
        let observer = Observer::new(vec![tx1, tx2], shutdown.clone(), stats.clone());

        let frames = vec![(0, vec![1, 2, 3]), (1, vec![4, 5, 6])];
        let mut source = FixedSource { frames: frames.into_iter() };

        // drain exactly two frames then request shutdown by swapping in
        // an empty source.
        for _ in 0..2 {
            if let Ok(Some((ts, bytes))) = source.next_frame() {
                observer.broadcast(Packet::new(ts, bytes));
            }
        }

        assert_eq!(rx1.len(), 2);
        assert_eq!(rx2.len(), 2);
        assert_eq!(stats.dropped_backpressure.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn full_queue_drops_with_counter_increment() {
        let (tx, rx) = bounded(1);
        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(ObserverStats::default());
        let observer = Observer::new(vec![tx], shutdown, stats.clone());

        observer.broadcast(Packet::new(0, vec![0]));
        observer.broadcast(Packet::new(1, vec![1]));

        assert_eq!(rx.len(), 1);
        assert_eq!(stats.dropped_backpressure.load(Ordering::Relaxed), 1);
    }
}
