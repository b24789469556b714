//! Aggregator coordinator (spec section 4.4). No pack file implements
//! this coordinator directly; the component that owns the RuleSet and
//! one Hashtable per Rule, dispatches each input to every Rule that
//! matches it, and periodically polls its tables for expired records to
//! hand to the Exporter, follows spec.md 4.4 and the Design Notes'
//! guidance to replace the original's virtual `FlowSink` chain with a
//! capability interface.

use crate::hashtable::{FlowRecord, Hashtable};
use crate::ie::{registry, AggregationPolicy, FieldValue, IeKey, IE_FRONT_PAYLOAD, PEN_VERMONT};
use crate::packet::Packet;
use crate::rule::{collect_fields, rule_matches_fields, synthesize_key, synthesize_key_from_fields, synthesize_reverse_key, synthesize_reverse_key_from_fields, Rule, RuleSet};
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters surfaced by the (out of scope) metrics/CLI layer; kept
/// alongside the Aggregator rather than bolted on externally, matching
/// how the teacher's thread modules each carry their own atomics.
#[derive(Default)]
pub struct AggregatorStats {
    pub packets_seen: AtomicU64,
    pub packets_unmatched: AtomicU64,
    pub data_records_seen: AtomicU64,
    pub data_records_unmatched: AtomicU64,
    pub active_expired: AtomicU64,
    pub inactive_expired: AtomicU64,
    pub forced_evicted: AtomicU64,
}

struct RuleTable {
    rule: Rule,
    table: Hashtable,
}

/// A batch of expired records ready for IPFIX encoding, all sharing the
/// Rule (and therefore the wire Template) they were aggregated under.
pub struct ExpiredBatch {
    pub template_id: u16,
    pub records: Vec<FlowRecord>,
}

pub struct Aggregator {
    rule_tables: Vec<RuleTable>,
    active_timeout_us: i64,
    inactive_timeout_us: i64,
    /// Bytes of post-L4-header payload captured per flow under the
    /// `frontPayload` aggregate field (spec section 4.3, FRONT_PAYLOAD
    /// policy). Zero disables the feature entirely.
    front_payload_len: usize,
    stats: Arc<AggregatorStats>,
}

impl Aggregator {
    pub fn new(rule_set: RuleSet, hashtable_bits: u8, max_table_size: usize, active_timeout_us: i64, inactive_timeout_us: i64, front_payload_len: usize) -> Self {
        let rule_tables = rule_set
            .rules
            .into_iter()
            .map(|rule| RuleTable { rule, table: Hashtable::new(hashtable_bits, max_table_size) })
            .collect();
        Aggregator { rule_tables, active_timeout_us, inactive_timeout_us, front_payload_len, stats: Arc::new(AggregatorStats::default()) }
    }

    pub fn stats(&self) -> Arc<AggregatorStats> {
        self.stats.clone()
    }

    fn front_payload(&self, packet: &Packet) -> Option<Vec<u8>> {
        if self.front_payload_len == 0 {
            return None;
        }
        let headers = packet.headers().ok()?;
        let offset = headers.l4_offset.unwrap_or(headers.l3_offset);
        let bytes = packet.bytes();
        if offset >= bytes.len() {
            return Some(Vec::new());
        }
        let end = (offset + self.front_payload_len).min(bytes.len());
        Some(bytes[offset..end].to_vec())
    }

    /// Dispatches a captured packet to every Rule whose key-field
    /// patterns it satisfies (spec section 4.1/4.4, the Observer's
    /// `onPacket` path). Returns one batch per rule table that was
    /// forced to evict its oldest-inactive record to stay under
    /// `max_size` while handling this packet (spec section 4.3: forced
    /// eviction is expiry, the record must still reach the exporter).
    pub fn on_packet(&mut self, packet: &Packet, observation_domain_id: u32) -> Vec<ExpiredBatch> {
        self.stats.packets_seen.fetch_add(1, Ordering::Relaxed);
        let headers = match packet.headers() {
            Ok(h) => h,
            Err(_) => {
                self.stats.packets_unmatched.fetch_add(1, Ordering::Relaxed);
                return Vec::new();
            }
        };

        let front_payload = self.front_payload(packet);
        let mut matched = false;
        let mut forced = Vec::new();

        for rt in &mut self.rule_tables {
            if !rt.rule.matches(headers) {
                continue;
            }
            matched = true;

            let mut fields = collect_fields(&rt.rule, headers);
            if let Some(bytes) = &front_payload {
                if registry().policy(IeKey::enterprise(IE_FRONT_PAYLOAD, PEN_VERMONT)) == AggregationPolicy::FrontPayload {
                    fields.push((IeKey::enterprise(IE_FRONT_PAYLOAD, PEN_VERMONT), FieldValue::Bytes(bytes.clone())));
                }
            }

            let evicted = if rt.rule.biflow_aggregation {
                if let (Some(fwd), Some(rev)) = (synthesize_key(&rt.rule, headers), synthesize_reverse_key(&rt.rule, headers)) {
                    rt.table.aggregate_biflow(fwd, rev, observation_domain_id, packet.timestamp_us(), fields).evicted
                } else {
                    None
                }
            } else if let Some(key) = synthesize_key(&rt.rule, headers) {
                rt.table.aggregate_input(key, observation_domain_id, packet.timestamp_us(), false, fields).evicted
            } else {
                None
            };

            if let Some(record) = evicted {
                self.stats.forced_evicted.fetch_add(1, Ordering::Relaxed);
                forced.push(ExpiredBatch { template_id: rt.rule.template_id, records: vec![record] });
            }
        }

        if !matched {
            self.stats.packets_unmatched.fetch_add(1, Ordering::Relaxed);
        }
        forced
    }

    /// Dispatches a decoded Data Record — from the IPFIX or NetFlow v5
    /// ingest path — to every Rule whose key-field patterns it
    /// satisfies (spec section 4.4, "the same dispatch semantics apply
    /// regardless of source"). Returns forced-eviction batches the same
    /// way [`Aggregator::on_packet`] does.
    pub fn on_data_record(&mut self, fields: &[(IeKey, FieldValue)], observation_domain_id: u32, timestamp_us: i64) -> Vec<ExpiredBatch> {
        self.stats.data_records_seen.fetch_add(1, Ordering::Relaxed);
        let map: HashMap<IeKey, FieldValue> = fields.iter().cloned().collect();
        let mut matched = false;
        let mut forced = Vec::new();

        for rt in &mut self.rule_tables {
            if !rule_matches_fields(&rt.rule, &map) {
                continue;
            }
            matched = true;

            let values: Vec<(IeKey, FieldValue)> = rt.rule.fields.iter().filter_map(|f| map.get(&f.ie).map(|v| (f.ie, v.clone()))).collect();

            let evicted = if rt.rule.biflow_aggregation {
                if let (Some(fwd), Some(rev)) = (synthesize_key_from_fields(&rt.rule, &map), synthesize_reverse_key_from_fields(&rt.rule, &map)) {
                    rt.table.aggregate_biflow(fwd, rev, observation_domain_id, timestamp_us, values).evicted
                } else {
                    None
                }
            } else if let Some(key) = synthesize_key_from_fields(&rt.rule, &map) {
                rt.table.aggregate_input(key, observation_domain_id, timestamp_us, false, values).evicted
            } else {
                None
            };

            if let Some(record) = evicted {
                self.stats.forced_evicted.fetch_add(1, Ordering::Relaxed);
                forced.push(ExpiredBatch { template_id: rt.rule.template_id, records: vec![record] });
            }
        }

        if !matched {
            self.stats.data_records_unmatched.fetch_add(1, Ordering::Relaxed);
        }
        forced
    }

    /// Polls every rule table for active- and inactive-timeout expiry,
    /// returning one batch per rule with any expired records (spec
    /// section 4.3/5, the inline-polling expirer merged with the input
    /// queue rather than run on a dedicated timer thread).
    pub fn poll_expired(&mut self, now_us: i64) -> Vec<ExpiredBatch> {
        let mut batches = Vec::new();
        for rt in &mut self.rule_tables {
            let mut expired = rt.table.expire_active(now_us, self.active_timeout_us);
            self.stats.active_expired.fetch_add(expired.len() as u64, Ordering::Relaxed);
            let inactive = rt.table.expire_inactive(now_us, self.inactive_timeout_us);
            self.stats.inactive_expired.fetch_add(inactive.len() as u64, Ordering::Relaxed);
            expired.extend(inactive);
            if !expired.is_empty() {
                debug!("aggregator: rule {} yielded {} expired record(s)", rt.rule.template_id, expired.len());
                batches.push(ExpiredBatch { template_id: rt.rule.template_id, records: expired });
            }
        }
        batches
    }

    /// Drains every table unconditionally, used at shutdown so no
    /// aggregated flow is lost (spec section 8, "no loss on shutdown").
    pub fn drain_all(&mut self) -> Vec<ExpiredBatch> {
        self.rule_tables
            .iter_mut()
            .filter_map(|rt| {
                let records = rt.table.drain_all();
                if records.is_empty() {
                    None
                } else {
                    Some(ExpiredBatch { template_id: rt.rule.template_id, records })
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ie::FieldType;
    use crate::rule::{Field, Modifier, Semantic};

    fn tcp_packet(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16) -> Packet {
        let mut buf = vec![0u8; 14 + 20 + 20];
        buf[12] = 0x08;
        buf[13] = 0x00;
        buf[14] = 0x45;
        buf[14 + 9] = 6;
        buf[14 + 12..14 + 16].copy_from_slice(&src);
        buf[14 + 16..14 + 20].copy_from_slice(&dst);
        let l4 = 34;
        buf[l4..l4 + 2].copy_from_slice(&sport.to_be_bytes());
        buf[l4 + 2..l4 + 4].copy_from_slice(&dport.to_be_bytes());
        Packet::new(0, buf)
    }

    fn five_tuple_rule(biflow: bool) -> Rule {
        Rule::build(
            256,
            biflow,
            vec![
                Field { ie: IeKey::standard(FieldType::SourceIPv4Address as u16), modifier: Modifier::Keep, pattern: None, semantic: Semantic::SourceDirectional },
                Field { ie: IeKey::standard(FieldType::DestinationIPv4Address as u16), modifier: Modifier::Keep, pattern: None, semantic: Semantic::DestinationDirectional },
                Field { ie: IeKey::standard(FieldType::SourceTransportPort as u16), modifier: Modifier::Keep, pattern: None, semantic: Semantic::SourceDirectional },
                Field { ie: IeKey::standard(FieldType::DestinationTransportPort as u16), modifier: Modifier::Keep, pattern: None, semantic: Semantic::DestinationDirectional },
                Field { ie: IeKey::standard(FieldType::ProtocolIdentifier as u16), modifier: Modifier::Keep, pattern: None, semantic: Semantic::Default },
                Field { ie: IeKey::standard(FieldType::OctetDeltaCount as u16), modifier: Modifier::Aggregate, pattern: None, semantic: Semantic::Default },
            ],
        )
        .unwrap()
    }

    #[test]
    fn single_flow_creates_one_record_with_summed_octets() {
        let rule_set = RuleSet { rules: vec![five_tuple_rule(false)] };
        let mut agg = Aggregator::new(rule_set, 4, 1024, 30_000_000, 15_000_000, 0);

        agg.on_packet(&tcp_packet([10, 0, 0, 1], [10, 0, 0, 2], 1000, 80), 0);
        agg.on_packet(&tcp_packet([10, 0, 0, 1], [10, 0, 0, 2], 1000, 80), 0);

        let batches = agg.drain_all();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].records.len(), 1);
    }

    #[test]
    fn biflow_rule_folds_reverse_traffic_into_one_record() {
        let rule_set = RuleSet { rules: vec![five_tuple_rule(true)] };
        let mut agg = Aggregator::new(rule_set, 4, 1024, 30_000_000, 15_000_000, 0);

        agg.on_packet(&tcp_packet([10, 0, 0, 1], [10, 0, 0, 2], 1000, 80), 0);
        agg.on_packet(&tcp_packet([10, 0, 0, 2], [10, 0, 0, 1], 80, 1000), 0);

        let batches = agg.drain_all();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].records.len(), 1);
    }

    /// Spec section 8, scenario S4: 5 packets A->B (50B each) and 3
    /// packets B->A (80B each) fold into one biflow record with
    /// forward octetCount=250 and reverse octetCount=240.
    #[test]
    fn biflow_scenario_s4_keeps_forward_and_reverse_octet_sums_distinct() {
        let rule_set = RuleSet { rules: vec![five_tuple_rule(true)] };
        let mut agg = Aggregator::new(rule_set, 4, 1024, 300_000_000, 60_000_000, 0);

        let octets_ie = crate::ie::IeKey::standard(FieldType::OctetDeltaCount as u16);
        // ip_total_length drives the OctetDeltaCount extraction (rule/mod.rs extract_raw).
        let packet_of_len = |src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16, len: u16| {
            let p = tcp_packet(src, dst, sport, dport);
            let mut bytes = p.bytes().to_vec();
            bytes[14 + 2..14 + 4].copy_from_slice(&len.to_be_bytes());
            Packet::new(p.timestamp_us(), bytes)
        };

        for _ in 0..5 {
            agg.on_packet(&packet_of_len([10, 0, 0, 1], [10, 0, 0, 2], 1000, 80, 50), 0);
        }
        for _ in 0..3 {
            agg.on_packet(&packet_of_len([10, 0, 0, 2], [10, 0, 0, 1], 80, 1000, 80), 0);
        }

        let batches = agg.drain_all();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].records.len(), 1);
        let record = &batches[0].records[0];
        assert_eq!(record.values[&octets_ie].as_u64(), Some(250));
        assert_eq!(record.values[&crate::ie::reverse_of(octets_ie)].as_u64(), Some(240));
    }

    #[test]
    fn unmatched_packet_increments_stats_without_creating_a_record() {
        let rule_set = RuleSet {
            rules: vec![Rule::build(
                256,
                false,
                vec![Field {
                    ie: IeKey::standard(FieldType::ProtocolIdentifier as u16),
                    modifier: Modifier::Keep,
                    pattern: Some(crate::rule::Pattern::Protocol(vec![(17, 17)])),
                    semantic: Semantic::Default,
                }],
            )
            .unwrap()],
        };
        let mut agg = Aggregator::new(rule_set, 4, 1024, 30_000_000, 15_000_000, 0);

        agg.on_packet(&tcp_packet([10, 0, 0, 1], [10, 0, 0, 2], 1000, 80), 0);

        assert_eq!(agg.stats().packets_unmatched.load(Ordering::Relaxed), 1);
        assert!(agg.drain_all().is_empty());
    }

    #[test]
    fn forced_eviction_surfaces_the_evicted_record_instead_of_dropping_it() {
        let rule_set = RuleSet { rules: vec![five_tuple_rule(false)] };
        // max_table_size of 1 forces every second distinct key to evict the first.
        let mut agg = Aggregator::new(rule_set, 4, 1, 300_000_000, 60_000_000, 0);

        agg.on_packet(&tcp_packet([10, 0, 0, 1], [10, 0, 0, 2], 1000, 80), 0);
        let forced = agg.on_packet(&tcp_packet([10, 0, 0, 3], [10, 0, 0, 4], 2000, 81), 0);

        assert_eq!(forced.len(), 1);
        assert_eq!(forced[0].records.len(), 1);
        assert_eq!(agg.stats().forced_evicted.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn poll_expired_splits_active_and_inactive_timeouts_into_one_batch() {
        let rule_set = RuleSet { rules: vec![five_tuple_rule(false)] };
        let mut agg = Aggregator::new(rule_set, 4, 1024, 100, 100, 0);
        agg.on_packet(&tcp_packet([10, 0, 0, 1], [10, 0, 0, 2], 1000, 80), 0);

        let batches = agg.poll_expired(1_000_000);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].records.len(), 1);
    }
}
