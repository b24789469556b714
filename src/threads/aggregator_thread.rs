//! The Aggregator's own thread: merges the Observer's packet queue and
//! the listener's decoded-record queue into one `Aggregator`, polling
//! for expired records at a fixed cadence (spec section 5, "the expirer
//! is implemented as inline polling between batches on the Aggregator
//! thread"). Grounded on the teacher's single-loop-per-thread style
//! (`threads::listener::listen`, `threads::exporter::exporte`) but
//! merging two input queues, which the teacher's `mpsc`-based pipeline
//! never needed to do — `crossbeam-channel`'s `select!` is the direct
//! substitute.

use crate::aggregator::{Aggregator, ExpiredBatch};
use crate::packet::Packet;
use crate::threads::listener::DecodedRecord;
use crossbeam_channel::{never, select, tick, Receiver, Sender};
use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn now_us() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_micros() as i64).unwrap_or(0)
}

/// Runs the merge loop until `shutdown` is observed, then drains every
/// table unconditionally so no aggregated flow is lost (spec section 8,
/// "no loss on shutdown").
pub fn run(
    mut aggregator: Aggregator,
    observation_domain_id: u32,
    packet_rx: Receiver<Packet>,
    record_rx: Receiver<DecodedRecord>,
    export_tx: Sender<ExpiredBatch>,
    shutdown: Arc<AtomicBool>,
    poll_interval_us: i64,
) {
    info!("aggregator: merge loop starting, polling every {}us", poll_interval_us);
    let ticker = tick(Duration::from_micros(poll_interval_us.max(1) as u64));
    // main.rs drops the packet sender entirely when no capture device is
    // configured; a disconnected crossbeam receiver is always "ready" in
    // `select!`, which would otherwise spin this loop at full CPU forever.
    let packet_rx: Receiver<Packet> = if packet_rx.sender_count() == 0 { never() } else { packet_rx };

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        select! {
            recv(packet_rx) -> msg => {
                if let Ok(packet) = msg {
                    for batch in aggregator.on_packet(&packet, observation_domain_id) {
                        let _ = export_tx.try_send(batch);
                    }
                }
            }
            recv(record_rx) -> msg => {
                if let Ok(record) = msg {
                    for batch in aggregator.on_data_record(&record.fields, record.observation_domain_id, record.timestamp_us) {
                        let _ = export_tx.try_send(batch);
                    }
                }
            }
            recv(ticker) -> _ => {
                dispatch_expired(&mut aggregator, &export_tx, now_us());
            }
        }
    }

    info!("aggregator: shutdown requested, draining tables");
    dispatch_expired(&mut aggregator, &export_tx, now_us());
    for batch in aggregator.drain_all() {
        if export_tx.send(batch).is_err() {
            break;
        }
    }
}

fn dispatch_expired(aggregator: &mut Aggregator, export_tx: &Sender<ExpiredBatch>, now_us: i64) {
    for batch in aggregator.poll_expired(now_us) {
        let _ = export_tx.try_send(batch);
    }
}
