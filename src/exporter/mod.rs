//! Exporter: renders expired `FlowRecord`s into IPFIX messages and hands
//! them to a transport (spec section 4.5/6). Grounded on the teacher's
//! `threads::exporter::exporte`, which only ever logged decoded
//! `IpfixMsg`s — here the Exporter is the producing half the teacher
//! never implemented, paired with a `Transport` trait the way
//! `threads::listener::listen` pairs a `UdpSocket` with its parsing loop.

use crate::aggregator::ExpiredBatch;
use crate::error::TransportError;
use crate::ie::{registry, reverse_of, IeKey};
use crate::ipfix::{Encoder, Template, TemplateField, VARIABLE_LENGTH};
use crate::rule::Rule;
use log::{debug, warn};
use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};

/// Seam for UDP/TCP/SCTP export transports (spec section 6). Only UDP is
/// implemented: the teacher's pipeline only ever listens on UDP, and
/// this pack carries no mature safe SCTP crate, so TCP/SCTP are left as
/// a documented extension point rather than a half-working client.
pub trait Transport {
    fn send(&mut self, message: &[u8]) -> Result<(), TransportError>;
}

pub struct UdpTransport {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpTransport {
    pub fn connect(target: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(|e| TransportError::Transient(e.to_string()))?;
        Ok(UdpTransport { socket, target })
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, message: &[u8]) -> Result<(), TransportError> {
        self.socket.send_to(message, self.target).map_err(|e| TransportError::Transient(e.to_string()))?;
        Ok(())
    }
}

/// Builds the wire `Template` for a rule's records. A biflow rule's
/// aggregate fields get a second, reverse-IE template entry appended so
/// the exporter can render the paired forward/reverse counters the
/// hashtable keeps distinct (spec section 3, "forward and reverse
/// counter fields are paired").
fn template_for_rule(rule: &Rule) -> Template {
    let mut fields: Vec<TemplateField> = rule
        .fields
        .iter()
        .map(|field| {
            let length = registry().lookup(field.ie).and_then(|spec| spec.length).unwrap_or(VARIABLE_LENGTH);
            TemplateField { ie: field.ie, length }
        })
        .collect();

    if rule.biflow_aggregation {
        for field in rule.aggregate_fields() {
            let length = registry().lookup(field.ie).and_then(|spec| spec.length).unwrap_or(VARIABLE_LENGTH);
            fields.push(TemplateField { ie: reverse_of(field.ie), length });
        }
    }

    Template { id: rule.template_id, fields }
}

/// Owns one wire `Template` per rule and the `Encoder` that packs
/// expired records into IPFIX messages, retrying transient transport
/// failures a bounded number of times before counting the batch as lost
/// (spec section 7, `TransportError::Transient` vs `Persistent`).
pub struct Exporter<T: Transport> {
    transport: T,
    encoder: Encoder,
    templates: HashMap<u16, Template>,
    max_retries: u32,
}

impl<T: Transport> Exporter<T> {
    pub fn new(transport: T, domain_id: u32, refresh_interval_us: i64, refresh_message_count: u32, rules: &[Rule]) -> Self {
        let templates = rules.iter().map(|rule| (rule.template_id, template_for_rule(rule))).collect();
        Exporter { transport, encoder: Encoder::new(domain_id, refresh_interval_us, refresh_message_count), templates, max_retries: 3 }
    }

    /// Encodes and sends every batch of expired records, one Template's
    /// worth of Data Sets at a time.
    pub fn export(&mut self, now_us: i64, batches: &[ExpiredBatch]) -> Result<(), TransportError> {
        for batch in batches {
            let template = match self.templates.get(&batch.template_id) {
                Some(t) => t,
                None => {
                    warn!("exporter: no template registered for rule {}, dropping {} record(s)", batch.template_id, batch.records.len());
                    continue;
                }
            };
            let messages = self.encoder.encode_batch(now_us, template, &batch.records);
            for message in messages {
                self.send_with_retry(&message)?;
            }
        }
        Ok(())
    }

    fn send_with_retry(&mut self, message: &[u8]) -> Result<(), TransportError> {
        let mut attempts = 0;
        loop {
            match self.transport.send(message) {
                Ok(()) => return Ok(()),
                Err(TransportError::Transient(reason)) => {
                    attempts += 1;
                    debug!("exporter: transient send failure (attempt {}/{}): {}", attempts, self.max_retries, reason);
                    if attempts >= self.max_retries {
                        return Err(TransportError::Persistent { attempts, reason });
                    }
                }
                Err(persistent) => return Err(persistent),
            }
        }
    }
}
