//! NetFlow v5 ingest (spec section 4.5, "supplemental secondary ingest
//! path"). Adapted from the teacher's `flow::netflow5` almost verbatim —
//! the wire format doesn't change — except `Result<_, String>` becomes
//! [`ProtocolError`], and a [`DataSet::to_fields`] conversion is added so
//! a decoded record can be fed into the same Aggregator entry point a
//! decoded IPFIX Data Record uses.

use crate::error::ProtocolError;
use crate::ie::{FieldType, FieldValue, IeKey};
use std::convert::TryInto;
use std::fmt;
use std::net::Ipv4Addr;

pub const VERSION: u16 = 5;

#[derive(Debug)]
pub struct Header {
    pub version: u16,
    pub count: u16,
    pub uptime: u32,
    pub unix_secs: u32,
    pub unix_nsecs: u32,
    pub seq_number: u32,
    pub engine_type: u8,
    pub engine_id: u8,
    sampl: u16,
}

impl Header {
    pub const SIZE: usize = 24;

    pub fn read(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < Self::SIZE {
            return Err(ProtocolError::ShortBuffer { needed: Self::SIZE, got: buf.len() });
        }

        Ok(Header {
            version: u16::from_be_bytes(buf[0..2].try_into().unwrap()),
            count: u16::from_be_bytes(buf[2..4].try_into().unwrap()),
            uptime: u32::from_be_bytes(buf[4..8].try_into().unwrap()),
            unix_secs: u32::from_be_bytes(buf[8..12].try_into().unwrap()),
            unix_nsecs: u32::from_be_bytes(buf[12..16].try_into().unwrap()),
            seq_number: u32::from_be_bytes(buf[16..20].try_into().unwrap()),
            engine_type: buf[20],
            engine_id: buf[21],
            sampl: u16::from_be_bytes(buf[22..24].try_into().unwrap()),
        })
    }

    #[inline]
    pub fn sampl_mode(&self) -> u16 {
        self.sampl >> 14
    }

    #[inline]
    pub fn sampl_interval(&self) -> u16 {
        self.sampl & 0b0011_1111_1111_1111
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "version: {}, count: {}, uptime: {}ms, unix_secs: {}s, unix_nsecs: {}ns, seq_number: {}, engine_type: {}, engine_id: {}, sampl_mode: {}, sampl_interval: {}",
            self.version,
            self.count,
            self.uptime,
            self.unix_secs,
            self.unix_nsecs,
            self.seq_number,
            self.engine_type,
            self.engine_id,
            self.sampl_mode(),
            self.sampl_interval()
        )
    }
}

/// from https://www.cisco.com/c/en/us/td/docs/net_mgmt/netflow_collection_engine/3-6/user/guide/format.html#wp1006186
#[derive(Debug)]
pub struct DataSet {
    pub src_addr: u32,
    pub dst_addr: u32,
    pub next_hop: u32,
    pub input_int: u16,
    pub output_int: u16,
    pub packets: u32,
    pub octets: u32,
    pub start_time: u32,
    pub end_time: u32,
    pub src_port: u16,
    pub dst_port: u16,
    pad1: u8,
    pub tcp_flag: u8,
    pub protocol: u8,
    pub tos: u8,
    pub src_as: u16,
    pub dst_as: u16,
    pub src_mask: u8,
    pub dst_mask: u8,
    pad2: u16,
}

impl fmt::Display for DataSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "from: {}/{}:{}, to: {}/{}:{}, octets: {}, packets: {}, protocol: {}, duration: {}ms, src_as: {}, dst_as: {}, tos: {}",
            Ipv4Addr::from(self.src_addr),
            self.src_mask,
            self.src_port,
            Ipv4Addr::from(self.dst_addr),
            self.dst_mask,
            self.dst_port,
            self.octets,
            self.packets,
            self.protocol,
            self.duration(),
            self.src_as,
            self.dst_as,
            self.tos
        )
    }
}

impl DataSet {
    pub const SIZE: usize = 48;

    pub fn read(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < Self::SIZE {
            return Err(ProtocolError::ShortBuffer { needed: Self::SIZE, got: buf.len() });
        }

        Ok(DataSet {
            src_addr: u32::from_be_bytes(buf[0..4].try_into().unwrap()),
            dst_addr: u32::from_be_bytes(buf[4..8].try_into().unwrap()),
            next_hop: u32::from_be_bytes(buf[8..12].try_into().unwrap()),
            input_int: u16::from_be_bytes(buf[12..14].try_into().unwrap()),
            output_int: u16::from_be_bytes(buf[14..16].try_into().unwrap()),
            packets: u32::from_be_bytes(buf[16..20].try_into().unwrap()),
            octets: u32::from_be_bytes(buf[20..24].try_into().unwrap()),
            start_time: u32::from_be_bytes(buf[24..28].try_into().unwrap()),
            end_time: u32::from_be_bytes(buf[28..32].try_into().unwrap()),
            src_port: u16::from_be_bytes(buf[32..34].try_into().unwrap()),
            dst_port: u16::from_be_bytes(buf[34..36].try_into().unwrap()),
            pad1: buf[36],
            tcp_flag: buf[37],
            protocol: buf[38],
            tos: buf[39],
            src_as: u16::from_be_bytes(buf[40..42].try_into().unwrap()),
            dst_as: u16::from_be_bytes(buf[42..44].try_into().unwrap()),
            src_mask: buf[44],
            dst_mask: buf[45],
            pad2: u16::from_be_bytes(buf[46..48].try_into().unwrap()),
        })
    }

    #[inline]
    pub fn duration(&self) -> u32 {
        self.end_time.saturating_sub(self.start_time)
    }

    pub fn add_sampling(&mut self, sampling: u32) {
        if sampling > 0 {
            self.octets *= sampling;
            self.packets *= sampling;
        }
    }

    /// Converts this record into the same `(IeKey, FieldValue)` shape an
    /// IPFIX Data Record decodes to, so the Aggregator has a single
    /// entry point regardless of which wire format produced the record
    /// (spec section 4.4, "NetFlow v5 feeds the same onDataRecord path").
    pub fn to_fields(&self) -> Vec<(IeKey, FieldValue)> {
        vec![
            (IeKey::standard(FieldType::SourceIPv4Address as u16), FieldValue::U32(self.src_addr)),
            (IeKey::standard(FieldType::DestinationIPv4Address as u16), FieldValue::U32(self.dst_addr)),
            (IeKey::standard(FieldType::IngressInterface as u16), FieldValue::U16(self.input_int)),
            (IeKey::standard(FieldType::EgressInterface as u16), FieldValue::U16(self.output_int)),
            (IeKey::standard(FieldType::PacketDeltaCount as u16), FieldValue::U32(self.packets)),
            (IeKey::standard(FieldType::OctetDeltaCount as u16), FieldValue::U32(self.octets)),
            (IeKey::standard(FieldType::SourceTransportPort as u16), FieldValue::U16(self.src_port)),
            (IeKey::standard(FieldType::DestinationTransportPort as u16), FieldValue::U16(self.dst_port)),
            (IeKey::standard(FieldType::TcpControlBits as u16), FieldValue::U8(self.tcp_flag)),
            (IeKey::standard(FieldType::ProtocolIdentifier as u16), FieldValue::U8(self.protocol)),
            (IeKey::standard(FieldType::IPClassOfService as u16), FieldValue::U8(self.tos)),
            (IeKey::standard(FieldType::SourceIPv4PrefixLength as u16), FieldValue::U8(self.src_mask)),
            (IeKey::standard(FieldType::DestinationIPv4PrefixLength as u16), FieldValue::U8(self.dst_mask)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const HEADER_PAYLOAD: [u8; Header::SIZE] = hex!(
        "00 05 00 10 00 00 04 b2 60 80 b8 9c 1a 47 ff 30
         00 00 00 02 01 00 00 00"
    );

    const DATA_SET_PAYLOAD: [u8; DataSet::SIZE] = hex!(
        "70 0a 14 0a ac 1e be 0a ac c7 0f 01 00 00 00 00
         00 00 03 1b 00 00 01 03 00 00 02 36 00 00 03 a8
         00 28 00 50 00 00 06 00 c3 0d 35 bd 15 1a 00 00"
    );

    #[test]
    fn read_valid_msg_header() {
        let header = Header::read(&HEADER_PAYLOAD).unwrap();

        assert_eq!(header.version, VERSION);
        assert_eq!(header.count, 16);
        assert_eq!(header.uptime, 1202);
        assert_eq!(header.unix_secs, 1619048604);
        assert_eq!(header.seq_number, 2);
        assert_eq!(header.sampl_mode(), 0);
        assert_eq!(header.sampl_interval(), 0);
    }

    #[test]
    fn read_invalid_msg_header_is_a_protocol_error() {
        assert!(matches!(Header::read(&HEADER_PAYLOAD[0..Header::SIZE - 1]), Err(ProtocolError::ShortBuffer { .. })));
    }

    #[test]
    fn read_valid_data_msg() {
        let msg = DataSet::read(&DATA_SET_PAYLOAD).unwrap();

        assert_eq!(msg.src_addr, u32::from(Ipv4Addr::new(112, 10, 20, 10)));
        assert_eq!(msg.dst_addr, u32::from(Ipv4Addr::new(172, 30, 190, 10)));
        assert_eq!(msg.packets, 795);
        assert_eq!(msg.octets, 259);
        assert_eq!(msg.duration(), 370);
        assert_eq!(msg.src_port, 40);
        assert_eq!(msg.dst_port, 80);
        assert_eq!(msg.protocol, 6);
        assert_eq!(msg.src_as, 49933);
        assert_eq!(msg.dst_as, 13757);
    }

    #[test]
    fn read_invalid_data_msg_is_a_protocol_error() {
        assert!(matches!(DataSet::read(&DATA_SET_PAYLOAD[0..DataSet::SIZE - 1]), Err(ProtocolError::ShortBuffer { .. })));
    }

    #[test]
    fn valid_sampling_scales_octets_and_packets() {
        let mut msg = DataSet::read(&DATA_SET_PAYLOAD).unwrap();
        msg.add_sampling(10);
        assert_eq!(msg.packets, 7950);
        assert_eq!(msg.octets, 2590);
    }

    #[test]
    fn to_fields_round_trips_key_fields() {
        let msg = DataSet::read(&DATA_SET_PAYLOAD).unwrap();
        let fields = msg.to_fields();
        assert!(fields.contains(&(IeKey::standard(FieldType::SourceIPv4Address as u16), FieldValue::U32(msg.src_addr))));
        assert!(fields.contains(&(IeKey::standard(FieldType::ProtocolIdentifier as u16), FieldValue::U8(6))));
    }
}
