//! The Exporter's own thread. Grounded on the teacher's
//! `threads::exporter::exporte`, which just logged every received
//! `IpfixMsg`; here the loop instead hands batches of expired records to
//! the real `Exporter` for IPFIX encoding and transport.

use crate::aggregator::ExpiredBatch;
use crate::exporter::{Exporter, Transport};
use crossbeam_channel::Receiver;
use log::{error, info};
use std::time::{SystemTime, UNIX_EPOCH};

fn now_us() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_micros() as i64).unwrap_or(0)
}

pub fn run<T: Transport>(mut exporter: Exporter<T>, export_rx: Receiver<ExpiredBatch>) {
    info!("exporter: export loop starting");
    while let Ok(batch) = export_rx.recv() {
        if let Err(e) = exporter.export(now_us(), std::slice::from_ref(&batch)) {
            error!("exporter: {}", e);
        }
    }
    info!("exporter: input channel closed, exiting");
}
