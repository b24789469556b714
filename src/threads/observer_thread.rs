//! The Observer's own thread: opens the capture device and runs the
//! broadcast loop until shutdown or device loss (spec section 4.1).
//! Grounded on the teacher's `thread::Builder` + named-thread pattern in
//! `main.rs`.

use crate::error::CaptureError;
use crate::packet::{Observer, PcapSource};
use log::error;

pub fn run(observer: Observer, iface: &str, caplen: i32, read_timeout_ms: i32) -> Result<(), CaptureError> {
    let source = PcapSource::open(iface, caplen, read_timeout_ms)?;
    if let Err(e) = observer.run(source) {
        error!("observer: capture loop exited: {}", e);
        return Err(e);
    }
    Ok(())
}
