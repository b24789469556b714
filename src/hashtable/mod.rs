//! Flow aggregation table (spec section 4.3). No pack file implements a
//! hashtable directly; this module follows the Design Notes' guidance on
//! "Hash bucket chains with raw next-pointers", which calls for
//! replacing that structure with a slab/arena with 32-bit indices rather
//! than pointer-chasing.
//!
//! Three link structures are needed: a bucket chain for key lookup, and
//! two intrusive lists ordered by `firstSeen` (active timeout) and
//! `lastSeen` (inactive timeout). Here all three are `Option<u32>`
//! indices into a single arena `Vec<Slot>`, and a table is owned by
//! exactly one aggregator thread — no locking on the hot path (spec
//! section 5).

use crate::ie::{registry, reverse_of, AggregationPolicy, FieldValue, IeKey};
use log::debug;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A single aggregated flow: the key that identifies it plus every
/// nonFlowKey field accumulated so far (spec section 4.3).
#[derive(Debug, Clone)]
pub struct FlowRecord {
    pub key: Vec<u8>,
    pub values: HashMap<IeKey, FieldValue>,
    pub first_seen_us: i64,
    pub last_seen_us: i64,
    pub created_at_us: i64,
    pub observation_domain_id: u32,
    /// Set once a packet matching the reverse (swapped) key has been
    /// folded into this record (spec section 4.2, biflow fold).
    pub reverse_seen: bool,
    pub export_count: u64,
}

impl FlowRecord {
    fn new(key: Vec<u8>, observation_domain_id: u32, timestamp_us: i64) -> Self {
        FlowRecord {
            key,
            values: HashMap::new(),
            first_seen_us: timestamp_us,
            last_seen_us: timestamp_us,
            created_at_us: timestamp_us,
            observation_domain_id,
            reverse_seen: false,
            export_count: 0,
        }
    }
}

struct Slot {
    record: FlowRecord,
    hash: u64,
    bucket_next: Option<u32>,
    active_prev: Option<u32>,
    active_next: Option<u32>,
    inactive_prev: Option<u32>,
    inactive_next: Option<u32>,
}

/// Combines an incoming observation into an existing aggregate value
/// according to its IE's [`AggregationPolicy`] (spec section 4.3 table).
fn combine(policy: AggregationPolicy, existing: &mut FieldValue, incoming: FieldValue) {
    match policy {
        AggregationPolicy::Key | AggregationPolicy::FirstSeen => {}
        AggregationPolicy::LastSeen => *existing = incoming,
        AggregationPolicy::Sum => {
            if let (Some(a), Some(b)) = (existing.as_u64(), incoming.as_u64()) {
                *existing = FieldValue::U64(a.saturating_add(b));
            }
        }
        AggregationPolicy::Min => {
            if let (Some(a), Some(b)) = (existing.as_u64(), incoming.as_u64()) {
                if b < a {
                    *existing = incoming;
                }
            }
        }
        AggregationPolicy::Max => {
            if let (Some(a), Some(b)) = (existing.as_u64(), incoming.as_u64()) {
                if b > a {
                    *existing = incoming;
                }
            }
        }
        AggregationPolicy::Or => {
            if let (Some(a), Some(b)) = (existing.as_u64(), incoming.as_u64()) {
                *existing = FieldValue::U64(a | b);
            }
        }
        AggregationPolicy::FrontPayload => {
            if matches!(existing, FieldValue::Bytes(b) if b.is_empty()) {
                *existing = incoming;
            }
        }
    }
}

fn hash_key(key: &[u8]) -> u64 {
    let mut h = DefaultHasher::new();
    key.hash(&mut h);
    h.finish()
}

/// Outcome of feeding one observation into the table: whether it
/// created a fresh record or folded into an existing one, and — when
/// `biflow_aggregation` folded a reverse-direction packet — whether this
/// was the first time the reverse direction was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOutcome {
    Created,
    Merged,
    MergedReverseFirstSeen,
}

/// Result of feeding one observation into the table: the `outcome`, plus
/// a forcibly-expired record when creating this observation's record
/// pushed the table over `max_size` (spec section 4.3, "the oldest
/// inactive record is forcibly expired first"). `evicted` must be handed
/// to the exporter exactly like any other expired record — forced
/// eviction is expiry, not a discard.
#[derive(Debug)]
pub struct AggregateResult {
    pub outcome: AggregateOutcome,
    pub evicted: Option<FlowRecord>,
}

pub struct Hashtable {
    buckets: Vec<Option<u32>>,
    bits: u8,
    slots: Vec<Option<Slot>>,
    free: Vec<u32>,
    active_head: Option<u32>,
    active_tail: Option<u32>,
    inactive_head: Option<u32>,
    inactive_tail: Option<u32>,
    len: usize,
    max_size: usize,
    pub forced_evictions: u64,
}

impl Hashtable {
    pub fn new(bits: u8, max_size: usize) -> Self {
        let bucket_count = 1usize << bits;
        Hashtable {
            buckets: vec![None; bucket_count],
            bits,
            slots: Vec::new(),
            free: Vec::new(),
            active_head: None,
            active_tail: None,
            inactive_head: None,
            inactive_tail: None,
            len: 0,
            max_size,
            forced_evictions: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    fn bucket_index(&self, hash: u64) -> usize {
        let mask = (1u64 << self.bits) - 1;
        (hash & mask) as usize
    }

    fn find(&self, hash: u64, key: &[u8]) -> Option<u32> {
        let mut cur = self.buckets[self.bucket_index(hash)];
        while let Some(idx) = cur {
            let slot = self.slots[idx as usize].as_ref().expect("bucket chain points at a live slot");
            if slot.hash == hash && slot.record.key == key {
                return Some(idx);
            }
            cur = slot.bucket_next;
        }
        None
    }

    fn alloc_slot(&mut self, slot: Slot) -> u32 {
        if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = Some(slot);
            idx
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(Some(slot));
            idx
        }
    }

    fn push_active_tail(&mut self, idx: u32) {
        let slot = self.slots[idx as usize].as_mut().unwrap();
        slot.active_prev = self.active_tail;
        slot.active_next = None;
        if let Some(tail) = self.active_tail {
            self.slots[tail as usize].as_mut().unwrap().active_next = Some(idx);
        } else {
            self.active_head = Some(idx);
        }
        self.active_tail = Some(idx);
    }

    fn push_inactive_tail(&mut self, idx: u32) {
        let slot = self.slots[idx as usize].as_mut().unwrap();
        slot.inactive_prev = self.inactive_tail;
        slot.inactive_next = None;
        if let Some(tail) = self.inactive_tail {
            self.slots[tail as usize].as_mut().unwrap().inactive_next = Some(idx);
        } else {
            self.inactive_head = Some(idx);
        }
        self.inactive_tail = Some(idx);
    }

    fn unlink_active(&mut self, idx: u32) {
        let (prev, next) = {
            let slot = self.slots[idx as usize].as_ref().unwrap();
            (slot.active_prev, slot.active_next)
        };
        match prev {
            Some(p) => self.slots[p as usize].as_mut().unwrap().active_next = next,
            None => self.active_head = next,
        }
        match next {
            Some(n) => self.slots[n as usize].as_mut().unwrap().active_prev = prev,
            None => self.active_tail = prev,
        }
    }

    fn unlink_inactive(&mut self, idx: u32) {
        let (prev, next) = {
            let slot = self.slots[idx as usize].as_ref().unwrap();
            (slot.inactive_prev, slot.inactive_next)
        };
        match prev {
            Some(p) => self.slots[p as usize].as_mut().unwrap().inactive_next = next,
            None => self.inactive_head = next,
        }
        match next {
            Some(n) => self.slots[n as usize].as_mut().unwrap().inactive_prev = prev,
            None => self.inactive_tail = prev,
        }
    }

    /// Re-homes a record to the tail of the inactive list after an
    /// observation bumps its `lastSeen` (spec: inactive timeout is
    /// measured from the most recent packet, so the ordering must stay
    /// sorted by `lastSeen` for `expire_inactive` to scan a prefix).
    fn touch_inactive(&mut self, idx: u32) {
        self.unlink_inactive(idx);
        self.push_inactive_tail(idx);
    }

    fn remove_slot(&mut self, idx: u32) -> FlowRecord {
        self.unlink_active(idx);
        self.unlink_inactive(idx);

        let hash = self.slots[idx as usize].as_ref().unwrap().hash;
        let bucket = self.bucket_index(hash);
        let mut cur = self.buckets[bucket];
        let mut prev: Option<u32> = None;
        while let Some(cand) = cur {
            let next = self.slots[cand as usize].as_ref().unwrap().bucket_next;
            if cand == idx {
                match prev {
                    Some(p) => self.slots[p as usize].as_mut().unwrap().bucket_next = next,
                    None => self.buckets[bucket] = next,
                }
                break;
            }
            prev = Some(cand);
            cur = next;
        }

        let slot = self.slots[idx as usize].take().expect("removing a live slot");
        self.free.push(idx);
        self.len -= 1;
        slot.record
    }

    /// Evicts the record at the head of the inactive list (the one with
    /// the oldest `lastSeen`, i.e. the LRU entry), used by the
    /// forced-eviction path when `max_size` is reached (spec section
    /// 4.3: "the oldest inactive record is forcibly expired first").
    fn evict_oldest_inactive(&mut self) -> Option<FlowRecord> {
        let idx = self.inactive_head?;
        Some(self.remove_slot(idx))
    }

    fn merge_into(&mut self, idx: u32, timestamp_us: i64, reverse: bool, fields: impl IntoIterator<Item = (IeKey, FieldValue)>) -> AggregateResult {
        let slot = self.slots[idx as usize].as_mut().unwrap();
        let first_reverse = reverse && !slot.record.reverse_seen;
        if reverse {
            slot.record.reverse_seen = true;
        }
        slot.record.last_seen_us = slot.record.last_seen_us.max(timestamp_us);
        for (ie, incoming) in fields {
            let policy = registry().policy(ie);
            // Biflow records keep forward and reverse counters in paired,
            // distinct slots (spec section 3): a reverse-direction
            // observation's aggregate fields land under the RFC 5103
            // reverse IE, never mixed into the forward accumulation. Key
            // fields (addresses/ports making up the record's identity)
            // are never redirected — they were fixed at record creation.
            let store_key = if reverse && policy.is_aggregate() { reverse_of(ie) } else { ie };
            slot.record
                .values
                .entry(store_key)
                .and_modify(|existing| combine(policy, existing, incoming.clone()))
                .or_insert(incoming);
        }
        self.touch_inactive(idx);
        let outcome = if first_reverse { AggregateOutcome::MergedReverseFirstSeen } else { AggregateOutcome::Merged };
        AggregateResult { outcome, evicted: None }
    }

    fn create_new(
        &mut self,
        key: Vec<u8>,
        hash: u64,
        observation_domain_id: u32,
        timestamp_us: i64,
        reverse: bool,
        fields: impl IntoIterator<Item = (IeKey, FieldValue)>,
    ) -> AggregateResult {
        let mut evicted_record = None;
        if self.len >= self.max_size && self.max_size > 0 {
            if let Some(evicted) = self.evict_oldest_inactive() {
                self.forced_evictions += 1;
                debug!(
                    "hashtable: forced eviction of flow created at {} to stay under max_size {}",
                    evicted.created_at_us, self.max_size
                );
                evicted_record = Some(evicted);
            }
        }

        let mut record = FlowRecord::new(key, observation_domain_id, timestamp_us);
        record.reverse_seen = reverse;
        for (ie, value) in fields {
            let policy = registry().policy(ie);
            let store_key = if reverse && policy.is_aggregate() { reverse_of(ie) } else { ie };
            record.values.insert(store_key, value);
        }

        let slot = Slot {
            record,
            hash,
            bucket_next: self.buckets[self.bucket_index(hash)],
            active_prev: None,
            active_next: None,
            inactive_prev: None,
            inactive_next: None,
        };
        let idx = self.alloc_slot(slot);
        let bucket = self.bucket_index(hash);
        self.buckets[bucket] = Some(idx);
        self.push_active_tail(idx);
        self.push_inactive_tail(idx);
        self.len += 1;
        AggregateResult { outcome: AggregateOutcome::Created, evicted: evicted_record }
    }

    /// Feeds one observation — a flow key plus a set of nonFlowKey field
    /// values — into the table. `reverse` is set when this observation
    /// arrived via a biflow rule's reverse (swapped) key lookup. The
    /// returned `evicted` record, when present, must still reach the
    /// exporter (spec section 4.3, forced eviction is expiry).
    pub fn aggregate_input(
        &mut self,
        key: Vec<u8>,
        observation_domain_id: u32,
        timestamp_us: i64,
        reverse: bool,
        fields: impl IntoIterator<Item = (IeKey, FieldValue)>,
    ) -> AggregateResult {
        let hash = hash_key(&key);
        if let Some(idx) = self.find(hash, &key) {
            self.merge_into(idx, timestamp_us, reverse, fields)
        } else {
            self.create_new(key, hash, observation_domain_id, timestamp_us, reverse, fields)
        }
    }

    /// Feeds one observation from a biflow rule: looks up `forward_key`
    /// first, then `reverse_key`, and only creates a fresh record under
    /// `forward_key` if neither exists yet (spec section 4.2, "a packet
    /// in either direction folds into the same aggregate").
    pub fn aggregate_biflow(
        &mut self,
        forward_key: Vec<u8>,
        reverse_key: Vec<u8>,
        observation_domain_id: u32,
        timestamp_us: i64,
        fields: impl IntoIterator<Item = (IeKey, FieldValue)>,
    ) -> AggregateResult {
        let fwd_hash = hash_key(&forward_key);
        if let Some(idx) = self.find(fwd_hash, &forward_key) {
            return self.merge_into(idx, timestamp_us, false, fields);
        }
        let rev_hash = hash_key(&reverse_key);
        if let Some(idx) = self.find(rev_hash, &reverse_key) {
            return self.merge_into(idx, timestamp_us, true, fields);
        }
        self.create_new(forward_key, fwd_hash, observation_domain_id, timestamp_us, false, fields)
    }

    /// Evicts every record whose `firstSeen` is older than
    /// `now - active_timeout_us` (spec section 4.3, active timeout).
    pub fn expire_active(&mut self, now_us: i64, active_timeout_us: i64) -> Vec<FlowRecord> {
        let mut evicted = Vec::new();
        while let Some(idx) = self.active_head {
            let first_seen = self.slots[idx as usize].as_ref().unwrap().record.first_seen_us;
            if now_us - first_seen < active_timeout_us {
                break;
            }
            evicted.push(self.remove_slot(idx));
        }
        evicted
    }

    /// Evicts every record whose `lastSeen` is older than
    /// `now - inactive_timeout_us` (spec section 4.3, inactive timeout).
    pub fn expire_inactive(&mut self, now_us: i64, inactive_timeout_us: i64) -> Vec<FlowRecord> {
        let mut evicted = Vec::new();
        while let Some(idx) = self.inactive_head {
            let last_seen = self.slots[idx as usize].as_ref().unwrap().record.last_seen_us;
            if now_us - last_seen < inactive_timeout_us {
                break;
            }
            evicted.push(self.remove_slot(idx));
        }
        evicted
    }

    /// Drains every remaining record, in no particular order — used at
    /// shutdown so no aggregated flow is lost (spec section 8, "no loss
    /// on shutdown").
    pub fn drain_all(&mut self) -> Vec<FlowRecord> {
        let mut out = Vec::with_capacity(self.len);
        while let Some(idx) = self.active_head {
            out.push(self.remove_slot(idx));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ie::FieldType;

    fn octets_ie() -> IeKey {
        IeKey::standard(FieldType::OctetDeltaCount as u16)
    }

    #[test]
    fn first_packet_creates_a_record() {
        let mut table = Hashtable::new(4, 1024);
        let result = table.aggregate_input(b"key-a".to_vec(), 0, 100, false, [(octets_ie(), FieldValue::U64(40))]);
        assert_eq!(result.outcome, AggregateOutcome::Created);
        assert!(result.evicted.is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn repeated_key_sums_octet_counts() {
        let mut table = Hashtable::new(4, 1024);
        table.aggregate_input(b"key-a".to_vec(), 0, 100, false, [(octets_ie(), FieldValue::U64(40))]);
        let result = table.aggregate_input(b"key-a".to_vec(), 0, 200, false, [(octets_ie(), FieldValue::U64(60))]);
        assert_eq!(result.outcome, AggregateOutcome::Merged);

        let evicted = table.expire_active(100_000_000, 0);
        let rec = evicted.into_iter().find(|r| r.key == b"key-a").unwrap();
        assert_eq!(rec.values[&octets_ie()].as_u64(), Some(100));
        assert_eq!(rec.last_seen_us, 200);
    }

    #[test]
    fn active_timeout_evicts_by_first_seen() {
        let mut table = Hashtable::new(4, 1024);
        table.aggregate_input(b"key-a".to_vec(), 0, 0, false, []);
        table.aggregate_input(b"key-b".to_vec(), 0, 50, false, []);

        let evicted = table.expire_active(100, 60);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].key, b"key-a");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn inactive_timeout_uses_last_seen_not_first_seen() {
        let mut table = Hashtable::new(4, 1024);
        table.aggregate_input(b"key-a".to_vec(), 0, 0, false, []);
        table.aggregate_input(b"key-a".to_vec(), 0, 90, false, []);

        let evicted = table.expire_inactive(100, 30);
        assert!(evicted.is_empty(), "record last seen at 90 should not be inactive-expired at t=100 with a 30us timeout");

        let evicted = table.expire_inactive(130, 30);
        assert_eq!(evicted.len(), 1);
    }

    #[test]
    fn max_size_forces_eviction_of_oldest_inactive_and_surfaces_it() {
        let mut table = Hashtable::new(4, 2);
        table.aggregate_input(b"a".to_vec(), 0, 0, false, [(octets_ie(), FieldValue::U64(7))]);
        table.aggregate_input(b"b".to_vec(), 0, 1, false, []);
        let result = table.aggregate_input(b"c".to_vec(), 0, 2, false, []);

        assert_eq!(table.len(), 2);
        assert_eq!(table.forced_evictions, 1);
        assert!(table.find(hash_key(b"a"), b"a").is_none());

        let evicted = result.evicted.expect("forced eviction must surface the expired record, not discard it");
        assert_eq!(evicted.key, b"a", "the oldest-by-lastSeen (inactive LRU) record is evicted first, not the oldest-by-firstSeen one");
        assert_eq!(evicted.values[&octets_ie()].as_u64(), Some(7), "the evicted record's accumulated fields must not be lost");
    }

    #[test]
    fn forced_eviction_picks_inactive_lru_over_active_order() {
        // "a" is created first (oldest firstSeen) but its lastSeen is
        // bumped after "b" is created, so the inactive (lastSeen) LRU
        // order has "b" at the head even though the active (firstSeen)
        // order still has "a" at the head.
        let mut table = Hashtable::new(4, 2);
        table.aggregate_input(b"a".to_vec(), 0, 0, false, []);
        table.aggregate_input(b"b".to_vec(), 0, 1, false, []);
        table.aggregate_input(b"a".to_vec(), 0, 5, false, []);

        let result = table.aggregate_input(b"c".to_vec(), 0, 6, false, []);

        assert!(table.find(hash_key(b"a"), b"a").is_some(), "a was re-touched and must survive");
        assert!(table.find(hash_key(b"b"), b"b").is_none(), "b is the inactive LRU head and must be the one evicted");
        assert_eq!(result.evicted.unwrap().key, b"b");
    }

    #[test]
    fn biflow_reverse_merge_marks_reverse_seen_once() {
        let mut table = Hashtable::new(4, 1024);
        table.aggregate_input(b"fwd".to_vec(), 0, 0, false, []);
        let first = table.aggregate_input(b"fwd".to_vec(), 0, 1, true, []);
        let second = table.aggregate_input(b"fwd".to_vec(), 0, 2, true, []);
        assert_eq!(first.outcome, AggregateOutcome::MergedReverseFirstSeen);
        assert_eq!(second.outcome, AggregateOutcome::Merged);
    }

    #[test]
    fn aggregate_biflow_keeps_forward_and_reverse_counters_separate() {
        let mut table = Hashtable::new(4, 1024);
        table.aggregate_biflow(b"fwd".to_vec(), b"rev".to_vec(), 0, 0, [(octets_ie(), FieldValue::U64(10))]);
        table.aggregate_biflow(b"fwd".to_vec(), b"rev".to_vec(), 0, 1, [(octets_ie(), FieldValue::U64(15))]);
        let result = table.aggregate_biflow(b"rev".to_vec(), b"fwd".to_vec(), 0, 2, [(octets_ie(), FieldValue::U64(5))]);

        assert_eq!(result.outcome, AggregateOutcome::MergedReverseFirstSeen);
        assert_eq!(table.len(), 1);

        let evicted = table.expire_active(1_000_000, 0);
        assert_eq!(evicted[0].values[&octets_ie()].as_u64(), Some(25), "forward direction keeps its own accumulation");
        assert_eq!(evicted[0].values[&crate::ie::reverse_of(octets_ie())].as_u64(), Some(5), "reverse direction lands in its own paired field");
    }

    #[test]
    fn drain_all_empties_the_table() {
        let mut table = Hashtable::new(4, 1024);
        table.aggregate_input(b"a".to_vec(), 0, 0, false, []);
        table.aggregate_input(b"b".to_vec(), 0, 0, false, []);
        let drained = table.drain_all();
        assert_eq!(drained.len(), 2);
        assert_eq!(table.len(), 0);
    }
}
