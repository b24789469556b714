use log::{error, info, LevelFilter};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use structopt::StructOpt;

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

#[macro_use]
extern crate num_derive;

mod aggregator;
mod config;
mod error;
mod exporter;
mod hashtable;
mod ie;
mod ipfix;
mod netflow5;
mod packet;
mod rule;
mod threads;

use aggregator::Aggregator;
use config::Settings;
use exporter::{Exporter, UdpTransport};
use packet::{Observer, ObserverStats};
use threads::listener::{DecodedRecord, ListenerStats};

#[derive(Debug, StructOpt)]
struct Opts {
    /// Log level to use
    #[structopt(long = "--log", default_value = "Info")]
    log_level: LevelFilter,

    /// Path to the TOML/INI configuration file (rules, expiration,
    /// listener/exporter addresses). Built-in defaults are used if
    /// omitted.
    #[structopt(short = "-c", long = "--config")]
    config: Option<PathBuf>,
}

fn main() {
    let opts = Opts::from_args();

    env_logger::Builder::new().format_timestamp_millis().filter(None, opts.log_level).init();
    info!("starting vflow-aggregator");

    let settings = match Settings::load(opts.config) {
        Ok(s) => s,
        Err(e) => {
            error!("configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let rule_set = match settings.build_rule_set() {
        Ok(rs) => rs,
        Err(e) => {
            error!("rule configuration error: {}", e);
            std::process::exit(1);
        }
    };
    let rules_for_export = rule_set.rules.clone();

    let shutdown = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::new();

    let ctrlc_shutdown = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("received interrupt, signaling shutdown");
        ctrlc_shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
    }) {
        error!("failed to install signal handler: {}", e);
    }

    let (packet_tx, packet_rx) = crossbeam_channel::bounded(4096);
    let (record_tx, record_rx) = crossbeam_channel::bounded(4096);
    let (export_tx, export_rx) = crossbeam_channel::bounded(1024);

    if let Some(iface) = settings.listener.capture_device.clone() {
        let observer_stats = Arc::new(ObserverStats::default());
        let observer_shutdown = shutdown.clone();
        handles.push(
            thread::Builder::new()
                .name("Observer".to_string())
                .spawn(move || {
                    let observer = Observer::new(vec![packet_tx], observer_shutdown, observer_stats);
                    if let Err(e) = threads::observer_thread::run(observer, &iface, 128, 200) {
                        error!("observer thread exited: {}", e);
                    }
                })
                .expect("failed to spawn Observer thread"),
        );
    } else {
        info!("no capture device configured, packet ingest disabled");
        drop(packet_tx);
    }

    let listener_addr = SocketAddr::from_str(&settings.listener.host).expect("invalid listener.host address");
    let listener_shutdown = shutdown.clone();
    handles.push(
        thread::Builder::new()
            .name("Listener".to_string())
            .spawn(move || {
                let stats = Arc::new(ListenerStats::default());
                if let Err(e) = threads::listener::listen(listener_addr, record_tx, listener_shutdown, stats) {
                    error!("listener thread exited: {}", e);
                }
            })
            .expect("failed to spawn Listener thread"),
    );

    let poll_interval_us = settings.poll_interval_us();
    let active_timeout_us = settings.active_timeout_us();
    let inactive_timeout_us = settings.inactive_timeout_us();
    let hashtable_bits = settings.hashtable_bits;
    let max_table_size = settings.max_table_size;
    let front_payload_len = settings.front_payload_len;

    handles.push(
        thread::Builder::new()
            .name("Aggregator".to_string())
            .spawn(move || {
                let aggregator = Aggregator::new(rule_set, hashtable_bits, max_table_size, active_timeout_us, inactive_timeout_us, front_payload_len);
                threads::aggregator_thread::run(aggregator, 0, packet_rx, record_rx, export_tx, shutdown.clone(), poll_interval_us);
            })
            .expect("failed to spawn Aggregator thread"),
    );

    let exporter_addr = SocketAddr::from_str(&settings.exporter.host).expect("invalid exporter.host address");
    let template_refresh_us = settings.exporter.template_refresh_secs as i64 * 1_000_000;
    let template_refresh_messages = settings.exporter.template_refresh_messages;
    handles.push(
        thread::Builder::new()
            .name("Exporter".to_string())
            .spawn(move || match UdpTransport::connect(exporter_addr) {
                Ok(transport) => {
                    let exporter = Exporter::new(transport, 0, template_refresh_us, template_refresh_messages, &rules_for_export);
                    threads::exporter_thread::run(exporter, export_rx);
                }
                Err(e) => error!("failed to open export transport: {}", e),
            })
            .expect("failed to spawn Exporter thread"),
    );

    for handle in handles {
        let _ = handle.join();
    }

    info!("vflow-aggregator exiting");
}
