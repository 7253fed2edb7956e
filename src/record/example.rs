//! Just enough protobuf to read and write `tf.train.Example`.
//!
//! ```text
//! Example  { Features features = 1; }
//! Features { map<string, Feature> feature = 1; }
//! Feature  { oneof { BytesList bytes_list = 1; FloatList float_list = 2; Int64List int64_list = 3; } }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

const VARINT: u8 = 0;
const FIXED64: u8 = 1;
const LEN: u8 = 2;
const FIXED32: u8 = 5;

// Byte values longer than this are shown by length only.
const MAX_SHOWN_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum Feature {
    Bytes(Vec<Vec<u8>>),
    Float(Vec<f32>),
    Int64(Vec<i64>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Example {
    pub features: BTreeMap<String, Feature>,
}

impl Example {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feature(mut self, key: impl Into<String>, feature: Feature) -> Self {
        self.features.insert(key.into(), feature);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Feature> {
        self.features.get(key)
    }

    pub fn int64s(&self, key: &str) -> Option<&[i64]> {
        match self.features.get(key) {
            Some(Feature::Int64(v)) => Some(v),
            _ => None,
        }
    }

    pub fn floats(&self, key: &str) -> Option<&[f32]> {
        match self.features.get(key) {
            Some(Feature::Float(v)) => Some(v),
            _ => None,
        }
    }

    pub fn bytes(&self, key: &str) -> Option<&[Vec<u8>]> {
        match self.features.get(key) {
            Some(Feature::Bytes(v)) => Some(v),
            _ => None,
        }
    }

    /// Decode a serialized Example. Error offsets are relative to `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut example = Example::new();
        let mut r = Reader::new(buf, 0);
        while let Some((field, wire)) = r.key()? {
            match (field, wire) {
                (1, LEN) => {
                    let (base, features) = r.len_delimited()?;
                    decode_features(features, base, &mut example.features)?;
                }
                _ => r.skip(wire)?,
            }
        }
        Ok(example)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut features = Vec::new();
        for (key, feature) in &self.features {
            let mut entry = Vec::new();
            put_len(&mut entry, 1, key.as_bytes());
            put_len(&mut entry, 2, &encode_feature(feature));
            put_len(&mut features, 1, &entry);
        }
        let mut out = Vec::new();
        put_len(&mut out, 1, &features);
        out
    }
}

fn decode_features(buf: &[u8], base: usize, out: &mut BTreeMap<String, Feature>) -> Result<()> {
    let mut r = Reader::new(buf, base);
    while let Some((field, wire)) = r.key()? {
        if (field, wire) != (1, LEN) {
            r.skip(wire)?;
            continue;
        }
        let (entry_base, entry) = r.len_delimited()?;
        let mut e = Reader::new(entry, entry_base);
        let mut key = String::new();
        let mut feature = None;
        while let Some((field, wire)) = e.key()? {
            match (field, wire) {
                (1, LEN) => {
                    let (at, bytes) = e.len_delimited()?;
                    key = String::from_utf8(bytes.to_vec())
                        .map_err(|_| decode_error(at, "feature key is not UTF-8"))?;
                }
                (2, LEN) => {
                    let (at, bytes) = e.len_delimited()?;
                    feature = Some(decode_feature(bytes, at)?);
                }
                _ => e.skip(wire)?,
            }
        }
        out.insert(key, feature.unwrap_or(Feature::Bytes(Vec::new())));
    }
    Ok(())
}

fn decode_feature(buf: &[u8], base: usize) -> Result<Feature> {
    let mut r = Reader::new(buf, base);
    let mut feature = Feature::Bytes(Vec::new());
    while let Some((field, wire)) = r.key()? {
        if wire != LEN {
            r.skip(wire)?;
            continue;
        }
        let (at, list) = r.len_delimited()?;
        feature = match field {
            1 => Feature::Bytes(decode_bytes_list(list, at)?),
            2 => Feature::Float(decode_float_list(list, at)?),
            3 => Feature::Int64(decode_int64_list(list, at)?),
            _ => continue,
        };
    }
    Ok(feature)
}

fn decode_bytes_list(buf: &[u8], base: usize) -> Result<Vec<Vec<u8>>> {
    let mut r = Reader::new(buf, base);
    let mut values = Vec::new();
    while let Some((field, wire)) = r.key()? {
        match (field, wire) {
            (1, LEN) => values.push(r.len_delimited()?.1.to_vec()),
            _ => r.skip(wire)?,
        }
    }
    Ok(values)
}

fn decode_float_list(buf: &[u8], base: usize) -> Result<Vec<f32>> {
    let mut r = Reader::new(buf, base);
    let mut values = Vec::new();
    while let Some((field, wire)) = r.key()? {
        match (field, wire) {
            (1, LEN) => {
                let (at, packed) = r.len_delimited()?;
                if packed.len() % 4 != 0 {
                    return Err(decode_error(at, "packed float list is not a multiple of 4 bytes"));
                }
                values.extend(
                    packed
                        .chunks_exact(4)
                        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
                );
            }
            (1, FIXED32) => values.push(f32::from_bits(r.fixed32()?)),
            _ => r.skip(wire)?,
        }
    }
    Ok(values)
}

fn decode_int64_list(buf: &[u8], base: usize) -> Result<Vec<i64>> {
    let mut r = Reader::new(buf, base);
    let mut values = Vec::new();
    while let Some((field, wire)) = r.key()? {
        match (field, wire) {
            (1, LEN) => {
                let (at, packed) = r.len_delimited()?;
                let mut p = Reader::new(packed, at);
                while !p.is_empty() {
                    values.push(p.varint()? as i64);
                }
            }
            (1, VARINT) => values.push(r.varint()? as i64),
            _ => r.skip(wire)?,
        }
    }
    Ok(values)
}

fn encode_feature(feature: &Feature) -> Vec<u8> {
    let mut list = Vec::new();
    let field = match feature {
        Feature::Bytes(values) => {
            for v in values {
                put_len(&mut list, 1, v);
            }
            1
        }
        Feature::Float(values) => {
            let packed: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
            if !packed.is_empty() {
                put_len(&mut list, 1, &packed);
            }
            2
        }
        Feature::Int64(values) => {
            let mut packed = Vec::new();
            for &v in values {
                put_varint(&mut packed, v as u64);
            }
            if !packed.is_empty() {
                put_len(&mut list, 1, &packed);
            }
            3
        }
    };
    let mut out = Vec::new();
    put_len(&mut out, field, &list);
    out
}

fn put_varint(out: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        out.push((v as u8) | 0x80);
        v >>= 7;
    }
    out.push(v as u8);
}

fn put_len(out: &mut Vec<u8>, field: u32, bytes: &[u8]) {
    put_varint(out, ((field as u64) << 3) | LEN as u64);
    put_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

fn decode_error(offset: usize, reason: &str) -> Error {
    Error::Record {
        offset: offset as u64,
        reason: reason.to_string(),
    }
}

/// Cursor over a protobuf message. `base` is the offset of `buf` inside the
/// outermost message, for error reporting.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], base: usize) -> Self {
        Self { buf, pos: 0, base }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn at(&self) -> usize {
        self.base + self.pos
    }

    fn varint(&mut self) -> Result<u64> {
        let start = self.at();
        let mut value = 0u64;
        for shift in (0..70).step_by(7) {
            let byte = *self
                .buf
                .get(self.pos)
                .ok_or_else(|| decode_error(start, "truncated varint"))?;
            self.pos += 1;
            value |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(decode_error(start, "varint longer than 10 bytes"))
    }

    /// Next `(field, wire type)`, `None` at the end of the message.
    fn key(&mut self) -> Result<Option<(u32, u8)>> {
        if self.is_empty() {
            return Ok(None);
        }
        let key = self.varint()?;
        Ok(Some(((key >> 3) as u32, (key & 0x7) as u8)))
    }

    fn take(&mut self, n: usize) -> Result<(usize, &'a [u8])> {
        let start = self.at();
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| decode_error(start, "field runs past the end of the message"))?;
        let buf = self.buf;
        let bytes = &buf[self.pos..end];
        self.pos = end;
        Ok((start, bytes))
    }

    fn len_delimited(&mut self) -> Result<(usize, &'a [u8])> {
        let n = self.varint()? as usize;
        self.take(n)
    }

    fn fixed32(&mut self) -> Result<u32> {
        let (_, b) = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn skip(&mut self, wire: u8) -> Result<()> {
        match wire {
            VARINT => self.varint().map(|_| ()),
            FIXED64 => self.take(8).map(|_| ()),
            LEN => self.len_delimited().map(|_| ()),
            FIXED32 => self.take(4).map(|_| ()),
            other => Err(decode_error(
                self.at(),
                &format!("unsupported wire type {}", other),
            )),
        }
    }
}

impl fmt::Display for Example {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "features {{")?;
        for (key, feature) in &self.features {
            writeln!(f, "  feature {{")?;
            writeln!(f, "    key: {:?}", key)?;
            writeln!(f, "    value {{")?;
            match feature {
                Feature::Bytes(values) => {
                    writeln!(f, "      bytes_list {{")?;
                    for v in values {
                        if v.len() > MAX_SHOWN_BYTES {
                            writeln!(f, "        value: <{} bytes>", v.len())?;
                        } else {
                            writeln!(f, "        value: {:?}", String::from_utf8_lossy(v))?;
                        }
                    }
                }
                Feature::Float(values) => {
                    writeln!(f, "      float_list {{")?;
                    for v in values {
                        writeln!(f, "        value: {}", v)?;
                    }
                }
                Feature::Int64(values) => {
                    writeln!(f, "      int64_list {{")?;
                    for v in values {
                        writeln!(f, "        value: {}", v)?;
                    }
                }
            }
            writeln!(f, "      }}")?;
            writeln!(f, "    }}")?;
            writeln!(f, "  }}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_unpacked_int64_values() {
        // Int64List with two unpacked values: field 1 varint 3, field 1 varint 300
        let int64_list = [0x08, 0x03, 0x08, 0xac, 0x02];
        let mut feature = Vec::new();
        put_len(&mut feature, 3, &int64_list);
        let mut entry = Vec::new();
        put_len(&mut entry, 1, b"label");
        put_len(&mut entry, 2, &feature);
        let mut features = Vec::new();
        put_len(&mut features, 1, &entry);
        let mut example = Vec::new();
        put_len(&mut example, 1, &features);

        let decoded = Example::decode(&example).unwrap();
        assert_eq!(decoded.int64s("label"), Some(&[3, 300][..]));
    }

    #[test]
    fn negative_int64_survives_encoding() {
        let ex = Example::new().with_feature("v", Feature::Int64(vec![-1, 7]));
        let back = Example::decode(&ex.encode()).unwrap();
        assert_eq!(back.int64s("v"), Some(&[-1, 7][..]));
    }

    #[test]
    fn truncated_message_is_an_error() {
        let ex = Example::new().with_feature("k", Feature::Bytes(vec![b"abc".to_vec()]));
        let bytes = ex.encode();
        assert!(Example::decode(&bytes[..bytes.len() - 2]).is_err());
    }

    #[test]
    fn long_bytes_are_summarised() {
        let ex = Example::new().with_feature("image/encoded", Feature::Bytes(vec![vec![0u8; 100]]));
        let text = ex.to_string();
        assert!(text.contains("key: \"image/encoded\""));
        assert!(text.contains("value: <100 bytes>"));
    }
}
