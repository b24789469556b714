//! UDP ingest: decodes IPFIX and NetFlow v5 datagrams and forwards each
//! Data Record to the Aggregator thread. Grounded on the teacher's
//! `threads::listener::listen`/`parse_ipfix_msg`/`parse_v5_msg`: the
//! version-sniffing dispatch and the per-exporter Template cache are
//! kept almost verbatim, generalized to emit `(IeKey, FieldValue)` pairs
//! through the shared decoded-record channel instead of `Box<dyn Flow>`.

use crate::error::{ProtocolError, ProtocolErrorContext};
use crate::ie::{FieldValue, IeKey};
use crate::ipfix;
use crate::netflow5;
use core::convert::TryInto;
use crossbeam_channel::Sender;
use log::{debug, error, trace, warn};
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// One decoded record ready for rule matching, tagged with the metadata
/// the Aggregator needs but the wire format doesn't carry alongside each
/// record (observation domain, arrival time).
pub struct DecodedRecord {
    pub observation_domain_id: u32,
    pub timestamp_us: i64,
    pub fields: Vec<(IeKey, FieldValue)>,
}

#[derive(Default)]
pub struct ListenerStats {
    pub datagrams_received: AtomicU64,
    pub decode_errors: AtomicU64,
    pub dropped_backpressure: AtomicU64,
}

#[derive(PartialEq, Eq, Hash)]
struct ExporterKey {
    addr: IpAddr,
    domain_id: u32,
}

/// A DataSet buffered because it arrived referencing a template its
/// exporter hadn't announced yet (spec section 4.5: "a DataSet
/// referencing an unknown template is buffered up to a bounded window,
/// then dropped").
struct PendingDataSet {
    template_id: u16,
    domain_id: u32,
    export_time: i64,
    bytes: Vec<u8>,
    buffered_at_us: i64,
}

/// How long an unresolved DataSet is kept waiting for its Template, and
/// how many can be held at once per exporter (a bounded window on both
/// axes, neither of which the spec pins to a specific value).
const UNKNOWN_TEMPLATE_WINDOW_US: i64 = 5_000_000;
const UNKNOWN_TEMPLATE_BUFFER_CAP: usize = 64;

#[derive(Default)]
struct ExporterState {
    sampling: u32,
    templates: HashMap<u16, ipfix::Template>,
    pending: VecDeque<PendingDataSet>,
}

impl ExporterState {
    fn buffer_unknown(&mut self, template_id: u16, domain_id: u32, export_time: i64, bytes: &[u8], now_us: i64) {
        while self.pending.len() >= UNKNOWN_TEMPLATE_BUFFER_CAP {
            self.pending.pop_front();
        }
        self.pending.push_back(PendingDataSet { template_id, domain_id, export_time, bytes: bytes.to_vec(), buffered_at_us: now_us });
    }

    /// Drops stale entries, then decodes and removes every pending
    /// DataSet that `template` now resolves, in arrival order.
    fn drain_pending(&mut self, template: &ipfix::Template, now_us: i64, out: &mut Vec<DecodedRecord>) {
        self.pending.retain(|p| now_us - p.buffered_at_us < UNKNOWN_TEMPLATE_WINDOW_US);

        let mut remaining = VecDeque::with_capacity(self.pending.len());
        while let Some(pending) = self.pending.pop_front() {
            if pending.template_id != template.id {
                remaining.push_back(pending);
                continue;
            }
            match ipfix::decode_data_set(&pending.bytes, template) {
                Ok(records) => {
                    for record in records {
                        out.push(DecodedRecord { observation_domain_id: pending.domain_id, timestamp_us: pending.export_time, fields: record.fields });
                    }
                }
                Err(e) => warn!("listener: dropping buffered data set for template {}: {}", template.id, e),
            }
        }
        self.pending = remaining;
    }
}

const MIN_BUF_LEN: usize = 2;

/// Binds a UDP socket and decodes datagrams until `shutdown` is set,
/// forwarding every Data Record to `sender`. Backpressure is lossy, the
/// same policy the Observer applies to captured packets (spec section
/// 5): a slow Aggregator must never stall the listener.
pub fn listen(addr: SocketAddr, sender: Sender<DecodedRecord>, shutdown: Arc<AtomicBool>, stats: Arc<ListenerStats>) -> std::io::Result<()> {
    let socket = UdpSocket::bind(addr)?;
    socket.set_read_timeout(Some(std::time::Duration::from_millis(200)))?;
    log::info!("listener: listening for UDP datagrams on {}", addr);

    let mut buf = [0u8; 65535];
    let mut exporters: HashMap<ExporterKey, ExporterState> = HashMap::new();

    while !shutdown.load(Ordering::Relaxed) {
        trace!("listener: waiting for data...");
        let (len, from) = match socket.recv_from(&mut buf) {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => return Err(e),
        };
        stats.datagrams_received.fetch_add(1, Ordering::Relaxed);

        if len < MIN_BUF_LEN {
            warn!("listener: datagram from {} too small to carry a version field", from);
            continue;
        }

        let version = u16::from_be_bytes(buf[0..MIN_BUF_LEN].try_into().unwrap());
        let records = match version {
            netflow5::VERSION => decode_netflow5(from, &buf[..len]),
            ipfix::VERSION => decode_ipfix(from.ip(), &buf[..len], &mut exporters),
            other => {
                warn!("listener: unsupported netflow version {} from {}", other, from);
                stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };

        match records {
            Ok(records) => {
                for record in records {
                    if sender.try_send(record).is_err() {
                        stats.dropped_backpressure.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            Err(ctx) => {
                error!("listener: {}", ctx);
                stats.decode_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    log::info!("listener: shutdown requested, exiting");
    Ok(())
}

fn protocol_error(source: SocketAddr, error: ProtocolError) -> ProtocolErrorContext {
    ProtocolErrorContext { error, source }
}

fn decode_netflow5(from: SocketAddr, buf: &[u8]) -> Result<Vec<DecodedRecord>, ProtocolErrorContext> {
    let header = netflow5::Header::read(buf).map_err(|e| protocol_error(from, e))?;
    let mut offset = netflow5::Header::SIZE;
    let mut out = Vec::with_capacity(header.count as usize);

    while offset + netflow5::DataSet::SIZE <= buf.len() {
        let mut pdu = netflow5::DataSet::read(&buf[offset..]).map_err(|e| protocol_error(from, e))?;
        pdu.add_sampling(header.sampl_interval() as u32);
        out.push(DecodedRecord {
            observation_domain_id: header.engine_id as u32,
            timestamp_us: header.unix_secs as i64 * 1_000_000 + (header.unix_nsecs as i64 / 1000),
            fields: pdu.to_fields(),
        });
        offset += netflow5::DataSet::SIZE;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ie::FieldType;
    use crate::ipfix::{Template, TemplateField};
    use std::collections::HashMap as StdHashMap;
    use std::net::Ipv4Addr;

    fn octets_template(id: u16) -> Template {
        Template { id, fields: vec![TemplateField { ie: IeKey::standard(FieldType::OctetDeltaCount as u16), length: 4 }] }
    }

    fn data_set_message(domain_id: u32, export_time: u32, template_id: u16, octets: u32) -> Vec<u8> {
        let template = octets_template(template_id);
        let mut values = StdHashMap::new();
        values.insert(IeKey::standard(FieldType::OctetDeltaCount as u16), FieldValue::U32(octets));
        let mut body = Vec::new();
        ipfix::encode_data_record(&mut body, &template, &values);

        let mut msg = Vec::new();
        ipfix::SetHeader { id: template_id, length: (ipfix::SetHeader::SIZE + body.len()) as u16 }.write(&mut msg);
        msg.extend_from_slice(&body);

        let mut out = Vec::new();
        ipfix::Header { version: ipfix::VERSION, length: (ipfix::Header::SIZE + msg.len()) as u16, export_time, seq_number: 0, domain_id }.write(&mut out);
        out.extend_from_slice(&msg);
        out
    }

    fn template_message(domain_id: u32, export_time: u32, template_id: u16) -> Vec<u8> {
        let template = octets_template(template_id);
        let mut body = Vec::new();
        template.write(&mut body);

        let mut msg = Vec::new();
        ipfix::SetHeader { id: ipfix::TEMPLATE_SET_ID, length: (ipfix::SetHeader::SIZE + body.len()) as u16 }.write(&mut msg);
        msg.extend_from_slice(&body);

        let mut out = Vec::new();
        ipfix::Header { version: ipfix::VERSION, length: (ipfix::Header::SIZE + msg.len()) as u16, export_time, seq_number: 0, domain_id }.write(&mut out);
        out.extend_from_slice(&msg);
        out
    }

    #[test]
    fn data_set_for_unknown_template_is_buffered_then_decoded_once_template_arrives() {
        let from = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
        let mut exporters: HashMap<ExporterKey, ExporterState> = HashMap::new();

        let data_msg = data_set_message(7, 0, 300, 111);
        let records = decode_ipfix(from, &data_msg, &mut exporters).unwrap();
        assert!(records.is_empty(), "no template yet, data set must be buffered, not decoded");

        let template_msg = template_message(7, 1, 300);
        let records = decode_ipfix(from, &template_msg, &mut exporters).unwrap();
        assert_eq!(records.len(), 1, "buffered data set should decode once its template arrives");
        assert_eq!(records[0].fields[0].1.as_u64(), Some(111));
    }

    #[test]
    fn data_set_buffered_too_long_is_dropped_without_decoding() {
        let from = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
        let mut exporters: HashMap<ExporterKey, ExporterState> = HashMap::new();

        let data_msg = data_set_message(7, 0, 301, 222);
        let records = decode_ipfix(from, &data_msg, &mut exporters).unwrap();
        assert!(records.is_empty());

        // Template arrives after the buffering window has elapsed.
        let template_msg = template_message(7, 10, 301);
        let records = decode_ipfix(from, &template_msg, &mut exporters).unwrap();
        assert!(records.is_empty(), "stale buffered data set must be dropped, not decoded");
    }

    #[test]
    fn data_set_for_known_template_decodes_immediately() {
        let from = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
        let mut exporters: HashMap<ExporterKey, ExporterState> = HashMap::new();

        let template_msg = template_message(7, 0, 302);
        decode_ipfix(from, &template_msg, &mut exporters).unwrap();

        let data_msg = data_set_message(7, 1, 302, 55);
        let records = decode_ipfix(from, &data_msg, &mut exporters).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fields[0].1.as_u64(), Some(55));
    }
}

fn decode_ipfix(from: IpAddr, buf: &[u8], exporters: &mut HashMap<ExporterKey, ExporterState>) -> Result<Vec<DecodedRecord>, ProtocolErrorContext> {
    let addr = SocketAddr::new(from, 0);
    let header = ipfix::Header::read(buf).map_err(|e| protocol_error(addr, e))?;
    if buf.len() != header.length as usize {
        return Err(protocol_error(addr, ProtocolError::LengthMismatch { header: header.length as usize, received: buf.len() }));
    }

    let key = ExporterKey { addr: from, domain_id: header.domain_id };
    let state = exporters.entry(key).or_default();
    let export_time_us = header.export_time as i64 * 1_000_000;

    let mut offset = ipfix::Header::SIZE;
    let mut out = Vec::new();

    while offset + ipfix::SetHeader::SIZE <= buf.len() {
        let set = ipfix::SetHeader::read(&buf[offset..]).map_err(|e| protocol_error(addr, e))?;
        offset += ipfix::SetHeader::SIZE;
        let end_of_set = (offset + set.content_size()).min(buf.len());

        if set.id == ipfix::TEMPLATE_SET_ID || set.id == ipfix::OPTIONS_TEMPLATE_SET_ID {
            while offset + 4 <= end_of_set {
                let (template, consumed) = ipfix::Template::read(&buf[offset..end_of_set]).map_err(|e| protocol_error(addr, e))?;
                debug!("listener: template {} received from {}:{}", template.id, from, header.domain_id);
                offset += consumed;
                state.drain_pending(&template, export_time_us, &mut out);
                state.templates.insert(template.id, template);
            }
        } else if set.id >= ipfix::MIN_DATA_SET_ID {
            if let Some(template) = state.templates.get(&set.id) {
                match ipfix::decode_data_set(&buf[offset..end_of_set], template) {
                    Ok(records) => {
                        for record in records {
                            out.push(DecodedRecord { observation_domain_id: header.domain_id, timestamp_us: export_time_us, fields: record.fields });
                        }
                    }
                    Err(e) => return Err(protocol_error(addr, e)),
                }
            } else {
                warn!("listener: data set references unknown template {} for domain {}, buffering", set.id, header.domain_id);
                state.buffer_unknown(set.id, header.domain_id, export_time_us, &buf[offset..end_of_set], export_time_us);
            }
        } else {
            return Err(protocol_error(addr, ProtocolError::InvalidSetId(set.id)));
        }

        offset = end_of_set;
    }

    Ok(out)
}
