//! IPFIX (RFC 7011) message parsing and encoding.
//!
//! Generalizes the teacher's `flow::ipfix` module (Header/SetHeader/
//! TemplateHeader/TemplateField/DataSet) to the on-wire features the
//! spec calls for that the teacher's read-only collector never needed:
//! variable-length Information Elements (template length `0xFFFF`, a
//! 1- or 3-byte runtime length prefix in the Data Record) and
//! enterprise-specific Information Elements (bit 15 of the field id set,
//! followed by a 4-byte enterprise number in the Template Record).
//!
//! [`encoder`] is new: the teacher only ever reads IPFIX, it never
//! produces it, because Vermont's Aggregator/Exporter split is the half
//! of the pipeline the teacher's original authors didn't write.

mod encoder;

pub use encoder::Encoder;

use crate::error::ProtocolError;
use crate::ie::{FieldValue, IeKey};
use std::convert::TryInto;

pub const VERSION: u16 = 10;
pub const TEMPLATE_SET_ID: u16 = 2;
pub const OPTIONS_TEMPLATE_SET_ID: u16 = 3;
pub const MIN_DATA_SET_ID: u16 = 256;
pub const VARIABLE_LENGTH: u16 = 0xFFFF;
const ENTERPRISE_BIT: u16 = 0x8000;

#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub version: u16,
    pub length: u16,
    pub export_time: u32,
    pub seq_number: u32,
    pub domain_id: u32,
}

impl Header {
    pub const SIZE: usize = 16;

    pub fn read(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < Self::SIZE {
            return Err(ProtocolError::ShortBuffer { needed: Self::SIZE, got: buf.len() });
        }
        Ok(Header {
            version: u16::from_be_bytes(buf[0..2].try_into().unwrap()),
            length: u16::from_be_bytes(buf[2..4].try_into().unwrap()),
            export_time: u32::from_be_bytes(buf[4..8].try_into().unwrap()),
            seq_number: u32::from_be_bytes(buf[8..12].try_into().unwrap()),
            domain_id: u32::from_be_bytes(buf[12..16].try_into().unwrap()),
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&self.length.to_be_bytes());
        out.extend_from_slice(&self.export_time.to_be_bytes());
        out.extend_from_slice(&self.seq_number.to_be_bytes());
        out.extend_from_slice(&self.domain_id.to_be_bytes());
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SetHeader {
    pub id: u16,
    pub length: u16,
}

impl SetHeader {
    pub const SIZE: usize = 4;

    pub fn read(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < Self::SIZE {
            return Err(ProtocolError::ShortBuffer { needed: Self::SIZE, got: buf.len() });
        }
        Ok(SetHeader {
            id: u16::from_be_bytes(buf[0..2].try_into().unwrap()),
            length: u16::from_be_bytes(buf[2..4].try_into().unwrap()),
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.id.to_be_bytes());
        out.extend_from_slice(&self.length.to_be_bytes());
    }

    #[inline]
    pub fn content_size(&self) -> usize {
        self.length as usize - Self::SIZE
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TemplateHeader {
    pub id: u16,
    pub field_count: u16,
}

impl TemplateHeader {
    pub const SIZE: usize = 4;

    pub fn read(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < Self::SIZE {
            return Err(ProtocolError::ShortBuffer { needed: Self::SIZE, got: buf.len() });
        }
        Ok(TemplateHeader {
            id: u16::from_be_bytes(buf[0..2].try_into().unwrap()),
            field_count: u16::from_be_bytes(buf[2..4].try_into().unwrap()),
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.id.to_be_bytes());
        out.extend_from_slice(&self.field_count.to_be_bytes());
    }
}

/// One field of a Template Record: which IE, and its declared length
/// (`0xFFFF` means variable-length, the runtime length travels with
/// each Data Record instead).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateField {
    pub ie: IeKey,
    pub length: u16,
}

impl TemplateField {
    /// Reads one field entry, returning the field and the number of
    /// bytes consumed (4 for a standard IE, 8 for an enterprise-specific
    /// one, per RFC 7011 section 3.2).
    pub fn read(buf: &[u8]) -> Result<(Self, usize), ProtocolError> {
        if buf.len() < 4 {
            return Err(ProtocolError::ShortBuffer { needed: 4, got: buf.len() });
        }
        let raw_id = u16::from_be_bytes(buf[0..2].try_into().unwrap());
        let length = u16::from_be_bytes(buf[2..4].try_into().unwrap());

        if raw_id & ENTERPRISE_BIT != 0 {
            if buf.len() < 8 {
                return Err(ProtocolError::ShortBuffer { needed: 8, got: buf.len() });
            }
            let enterprise = u32::from_be_bytes(buf[4..8].try_into().unwrap());
            let id = raw_id & !ENTERPRISE_BIT;
            Ok((TemplateField { ie: IeKey::enterprise(id, enterprise), length }, 8))
        } else {
            Ok((TemplateField { ie: IeKey::standard(raw_id), length }, 4))
        }
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        if self.ie.is_enterprise_specific() {
            out.extend_from_slice(&(self.ie.id | ENTERPRISE_BIT).to_be_bytes());
            out.extend_from_slice(&self.length.to_be_bytes());
            out.extend_from_slice(&self.ie.enterprise.to_be_bytes());
        } else {
            out.extend_from_slice(&self.ie.id.to_be_bytes());
            out.extend_from_slice(&self.length.to_be_bytes());
        }
    }

    pub fn wire_size(&self) -> usize {
        if self.ie.is_enterprise_specific() {
            8
        } else {
            4
        }
    }
}

/// A decoded Template Record: the ordered field layout Data Records
/// tagged with `id` must be read against.
#[derive(Debug, Clone)]
pub struct Template {
    pub id: u16,
    pub fields: Vec<TemplateField>,
}

impl Template {
    pub fn read(buf: &[u8]) -> Result<(Self, usize), ProtocolError> {
        let header = TemplateHeader::read(buf)?;
        let mut offset = TemplateHeader::SIZE;
        let mut fields = Vec::with_capacity(header.field_count as usize);
        for _ in 0..header.field_count {
            let (field, consumed) = TemplateField::read(&buf[offset..])?;
            fields.push(field);
            offset += consumed;
        }
        Ok((Template { id: header.id, fields }, offset))
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        TemplateHeader { id: self.id, field_count: self.fields.len() as u16 }.write(out);
        for field in &self.fields {
            field.write(out);
        }
    }
}

/// A Data Record decoded against its [`Template`]'s field layout.
#[derive(Debug, Clone)]
pub struct DataRecord {
    pub template_id: u16,
    pub fields: Vec<(IeKey, FieldValue)>,
}

/// Reads the variable-length runtime prefix that precedes a Data
/// Record's field bytes when its Template declared length `0xFFFF`
/// (RFC 7011 section 7): one length byte if the value is under 255
/// octets, or the escape byte `0xFF` followed by a 2-byte length.
fn read_varlen(buf: &[u8]) -> Result<(usize, usize), ProtocolError> {
    if buf.is_empty() {
        return Err(ProtocolError::ShortBuffer { needed: 1, got: 0 });
    }
    if buf[0] == 0xFF {
        if buf.len() < 3 {
            return Err(ProtocolError::ShortBuffer { needed: 3, got: buf.len() });
        }
        let len = u16::from_be_bytes(buf[1..3].try_into().unwrap()) as usize;
        Ok((len, 3))
    } else {
        Ok((buf[0] as usize, 1))
    }
}

fn write_varlen(out: &mut Vec<u8>, len: usize) {
    if len < 255 {
        out.push(len as u8);
    } else {
        out.push(0xFF);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    }
}

/// Decodes every Data Record packed into a DataSet's content against
/// `template`, stopping cleanly at the end of the buffer (trailing
/// padding is common and is not itself an error).
pub fn decode_data_set(buf: &[u8], template: &Template) -> Result<Vec<DataRecord>, ProtocolError> {
    let mut records = Vec::new();
    let mut offset = 0;

    'records: loop {
        let record_start = offset;
        let mut fields = Vec::with_capacity(template.fields.len());
        for field in &template.fields {
            let (len, value_offset) = if field.length == VARIABLE_LENGTH {
                match read_varlen(&buf[offset..]) {
                    Ok(v) => v,
                    Err(_) => break 'records,
                }
            } else {
                (field.length as usize, 0)
            };
            offset += value_offset;
            if buf.len() < offset + len {
                if fields.is_empty() && offset == record_start {
                    break 'records;
                }
                return Err(ProtocolError::ShortBuffer { needed: offset + len, got: buf.len() });
            }
            fields.push((field.ie, FieldValue::from_be_bytes(&buf[offset..offset + len])));
            offset += len;
        }
        if fields.is_empty() {
            break;
        }
        records.push(DataRecord { template_id: template.id, fields });
        if offset >= buf.len() {
            break;
        }
    }

    Ok(records)
}

/// Encodes one Data Record's field values in `template`'s field order.
/// Values for variable-length fields are prefixed with a runtime length
/// (see [`read_varlen`]); other fields are encoded to exactly the
/// template's declared length, left-padded with zero if the source
/// value is narrower (spec section 4.5).
pub fn encode_data_record(out: &mut Vec<u8>, template: &Template, values: &std::collections::HashMap<IeKey, FieldValue>) {
    for field in &template.fields {
        let bytes = values.get(&field.ie).map(FieldValue::encode_be).unwrap_or_default();
        if field.length == VARIABLE_LENGTH {
            write_varlen(out, bytes.len());
            out.extend_from_slice(&bytes);
        } else {
            let want = field.length as usize;
            if bytes.len() >= want {
                out.extend_from_slice(&bytes[bytes.len() - want..]);
            } else {
                out.extend(std::iter::repeat(0u8).take(want - bytes.len()));
                out.extend_from_slice(&bytes);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ie::FieldType;
    use std::collections::HashMap;

    #[test]
    fn template_field_round_trips_standard_ie() {
        let field = TemplateField { ie: IeKey::standard(FieldType::SourceIPv4Address as u16), length: 4 };
        let mut buf = Vec::new();
        field.write(&mut buf);
        let (read_back, consumed) = TemplateField::read(&buf).unwrap();
        assert_eq!(consumed, 4);
        assert_eq!(read_back, field);
    }

    #[test]
    fn template_field_round_trips_enterprise_ie() {
        let field = TemplateField { ie: IeKey::enterprise(100, 29305), length: VARIABLE_LENGTH };
        let mut buf = Vec::new();
        field.write(&mut buf);
        let (read_back, consumed) = TemplateField::read(&buf).unwrap();
        assert_eq!(consumed, 8);
        assert_eq!(read_back, field);
    }

    #[test]
    fn template_round_trips() {
        let template = Template {
            id: 256,
            fields: vec![
                TemplateField { ie: IeKey::standard(FieldType::SourceIPv4Address as u16), length: 4 },
                TemplateField { ie: IeKey::standard(FieldType::OctetDeltaCount as u16), length: 8 },
            ],
        };
        let mut buf = Vec::new();
        template.write(&mut buf);
        let (read_back, consumed) = Template::read(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(read_back.id, 256);
        assert_eq!(read_back.fields.len(), 2);
    }

    #[test]
    fn data_set_round_trips_fixed_length_fields() {
        let template = Template {
            id: 256,
            fields: vec![
                TemplateField { ie: IeKey::standard(FieldType::SourceIPv4Address as u16), length: 4 },
                TemplateField { ie: IeKey::standard(FieldType::OctetDeltaCount as u16), length: 8 },
            ],
        };
        let mut values = HashMap::new();
        values.insert(IeKey::standard(FieldType::SourceIPv4Address as u16), FieldValue::U32(0x0A000001));
        values.insert(IeKey::standard(FieldType::OctetDeltaCount as u16), FieldValue::U64(1234));

        let mut buf = Vec::new();
        encode_data_record(&mut buf, &template, &values);
        let records = decode_data_set(&buf, &template).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fields.len(), 2);
        assert!(records[0].fields.contains(&(IeKey::standard(FieldType::SourceIPv4Address as u16), FieldValue::U32(0x0A000001))));
    }

    #[test]
    fn data_set_round_trips_variable_length_field() {
        let template = Template { id: 257, fields: vec![TemplateField { ie: IeKey::enterprise(100, 29305), length: VARIABLE_LENGTH }] };
        let mut values = HashMap::new();
        values.insert(IeKey::enterprise(100, 29305), FieldValue::Bytes(vec![1, 2, 3, 4, 5]));

        let mut buf = Vec::new();
        encode_data_record(&mut buf, &template, &values);
        let records = decode_data_set(&buf, &template).unwrap();
        assert_eq!(records[0].fields[0].1, FieldValue::Bytes(vec![1, 2, 3, 4, 5]));
    }

    #[test]
    fn data_set_decodes_multiple_packed_records() {
        let template = Template { id: 256, fields: vec![TemplateField { ie: IeKey::standard(FieldType::OctetDeltaCount as u16), length: 8 }] };
        let mut buf = Vec::new();
        for v in [1u64, 2, 3] {
            let mut values = HashMap::new();
            values.insert(IeKey::standard(FieldType::OctetDeltaCount as u16), FieldValue::U64(v));
            encode_data_record(&mut buf, &template, &values);
        }
        let records = decode_data_set(&buf, &template).unwrap();
        assert_eq!(records.len(), 3);
    }
}
