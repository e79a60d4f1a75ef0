//! HPACK header compression (RFC 7541).
//!
//! Encoding favors predictability over ratio: exact static-table matches are
//! emitted as indexed fields, everything else as literals without indexing,
//! never Huffman-coded. Decoding is complete: dynamic table, both literal
//! forms, table-size updates and Huffman-coded strings.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HpackError {
    #[error("truncated header block")]
    Truncated,
    #[error("invalid table index {0}")]
    BadIndex(usize),
    #[error("invalid huffman coding")]
    BadHuffman,
    #[error("dynamic table size update beyond the negotiated maximum")]
    BadTableSize,
    #[error("integer overflow in header field")]
    IntegerOverflow,
}

/// RFC 7541 Appendix A static table.
const STATIC_TABLE: &[(&str, &str)] = &[
    (":authority", ""),
    (":method", "GET"),
    (":method", "POST"),
    (":path", "/"),
    (":path", "/index.html"),
    (":scheme", "http"),
    (":scheme", "https"),
    (":status", "200"),
    (":status", "204"),
    (":status", "206"),
    (":status", "304"),
    (":status", "400"),
    (":status", "404"),
    (":status", "500"),
    ("accept-charset", ""),
    ("accept-encoding", "gzip, deflate"),
    ("accept-language", ""),
    ("accept-ranges", ""),
    ("accept", ""),
    ("access-control-allow-origin", ""),
    ("age", ""),
    ("allow", ""),
    ("authorization", ""),
    ("cache-control", ""),
    ("content-disposition", ""),
    ("content-encoding", ""),
    ("content-language", ""),
    ("content-length", ""),
    ("content-location", ""),
    ("content-range", ""),
    ("content-type", ""),
    ("cookie", ""),
    ("date", ""),
    ("etag", ""),
    ("expect", ""),
    ("expires", ""),
    ("from", ""),
    ("host", ""),
    ("if-match", ""),
    ("if-modified-since", ""),
    ("if-none-match", ""),
    ("if-range", ""),
    ("if-unmodified-since", ""),
    ("last-modified", ""),
    ("link", ""),
    ("location", ""),
    ("max-forwards", ""),
    ("proxy-authenticate", ""),
    ("proxy-authorization", ""),
    ("range", ""),
    ("referer", ""),
    ("refresh", ""),
    ("retry-after", ""),
    ("server", ""),
    ("set-cookie", ""),
    ("strict-transport-security", ""),
    ("transfer-encoding", ""),
    ("user-agent", ""),
    ("vary", ""),
    ("via", ""),
    ("www-authenticate", ""),
];

// ===== integer primitives =====

fn encode_integer(out: &mut Vec<u8>, value: usize, prefix_bits: u8, first_byte: u8) {
    let max_prefix = (1usize << prefix_bits) - 1;
    if value < max_prefix {
        out.push(first_byte | value as u8);
        return;
    }
    out.push(first_byte | max_prefix as u8);
    let mut rest = value - max_prefix;
    while rest >= 128 {
        out.push((rest % 128 + 128) as u8);
        rest /= 128;
    }
    out.push(rest as u8);
}

fn decode_integer(
    buf: &[u8],
    pos: &mut usize,
    prefix_bits: u8,
) -> Result<usize, HpackError> {
    let max_prefix = (1usize << prefix_bits) - 1;
    let first = *buf.get(*pos).ok_or(HpackError::Truncated)?;
    *pos += 1;
    let mut value = (first as usize) & max_prefix;
    if value < max_prefix {
        return Ok(value);
    }
    let mut shift = 0u32;
    loop {
        let byte = *buf.get(*pos).ok_or(HpackError::Truncated)?;
        *pos += 1;
        value = value
            .checked_add(((byte & 0x7f) as usize) << shift)
            .ok_or(HpackError::IntegerOverflow)?;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift > 28 {
            return Err(HpackError::IntegerOverflow);
        }
    }
}

// ===== encoder =====

/// Stateless header-block encoder. Emission order is exactly the order of
/// the input pairs; the connection layer has already placed pseudo-headers
/// per the fingerprint's permutation.
pub fn encode_block(fields: &[(String, String)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(fields.len() * 32);
    for (name, value) in fields {
        let lowered = name.to_ascii_lowercase();
        match static_lookup(&lowered, value) {
            StaticMatch::Full(index) => {
                encode_integer(&mut out, index, 7, 0x80);
            }
            StaticMatch::Name(index) => {
                // literal without indexing, indexed name
                encode_integer(&mut out, index, 4, 0x00);
                encode_string(&mut out, value);
            }
            StaticMatch::None => {
                out.push(0x00);
                encode_string(&mut out, &lowered);
                encode_string(&mut out, value);
            }
        }
    }
    out
}

enum StaticMatch {
    Full(usize),
    Name(usize),
    None,
}

fn static_lookup(name: &str, value: &str) -> StaticMatch {
    let mut name_index = None;
    for (i, (entry_name, entry_value)) in STATIC_TABLE.iter().enumerate() {
        if *entry_name == name {
            if *entry_value == value {
                return StaticMatch::Full(i + 1);
            }
            name_index.get_or_insert(i + 1);
        }
    }
    match name_index {
        Some(index) => StaticMatch::Name(index),
        None => StaticMatch::None,
    }
}

fn encode_string(out: &mut Vec<u8>, text: &str) {
    encode_integer(out, text.len(), 7, 0x00);
    out.extend_from_slice(text.as_bytes());
}

// ===== decoder =====

/// Header-block decoder with a dynamic table, one per connection direction.
#[derive(Debug)]
pub struct Decoder {
    dynamic: Vec<(String, String)>,
    size: usize,
    max_size: usize,
}

impl Decoder {
    pub fn new(max_size: usize) -> Self {
        Self {
            dynamic: Vec::new(),
            size: 0,
            max_size,
        }
    }

    /// Decode a complete header block into `(name, value)` pairs in wire
    /// order.
    pub fn decode(&mut self, block: &[u8]) -> Result<Vec<(String, String)>, HpackError> {
        let mut fields = Vec::new();
        let mut pos = 0;
        while pos < block.len() {
            let byte = block[pos];
            if byte & 0x80 != 0 {
                // indexed field
                let index = decode_integer(block, &mut pos, 7)?;
                fields.push(self.lookup(index)?);
            } else if byte & 0xc0 == 0x40 {
                // literal with incremental indexing
                let (name, value) = self.literal(block, &mut pos, 6)?;
                self.insert(name.clone(), value.clone());
                fields.push((name, value));
            } else if byte & 0xe0 == 0x20 {
                // dynamic table size update
                let new_size = decode_integer(block, &mut pos, 5)?;
                if new_size > self.max_size {
                    return Err(HpackError::BadTableSize);
                }
                self.evict_to(new_size);
            } else {
                // literal without indexing / never indexed (0x00 / 0x10)
                let (name, value) = self.literal(block, &mut pos, 4)?;
                fields.push((name, value));
            }
        }
        Ok(fields)
    }

    fn literal(
        &mut self,
        block: &[u8],
        pos: &mut usize,
        prefix_bits: u8,
    ) -> Result<(String, String), HpackError> {
        let index = decode_integer(block, pos, prefix_bits)?;
        let name = if index == 0 {
            decode_string(block, pos)?
        } else {
            self.lookup(index)?.0
        };
        let value = decode_string(block, pos)?;
        Ok((name, value))
    }

    fn lookup(&self, index: usize) -> Result<(String, String), HpackError> {
        if index == 0 {
            return Err(HpackError::BadIndex(0));
        }
        if index <= STATIC_TABLE.len() {
            let (name, value) = STATIC_TABLE[index - 1];
            return Ok((name.to_string(), value.to_string()));
        }
        self.dynamic
            .get(index - STATIC_TABLE.len() - 1)
            .cloned()
            .ok_or(HpackError::BadIndex(index))
    }

    fn insert(&mut self, name: String, value: String) {
        let entry_size = name.len() + value.len() + 32;
        self.dynamic.insert(0, (name, value));
        self.size += entry_size;
        self.evict_to(self.max_size);
    }

    fn evict_to(&mut self, limit: usize) {
        while self.size > limit {
            match self.dynamic.pop() {
                Some((name, value)) => self.size -= name.len() + value.len() + 32,
                None => break,
            }
        }
    }
}

fn decode_string(block: &[u8], pos: &mut usize) -> Result<String, HpackError> {
    let huffman = block.get(*pos).ok_or(HpackError::Truncated)? & 0x80 != 0;
    let len = decode_integer(block, pos, 7)?;
    let end = pos.checked_add(len).ok_or(HpackError::IntegerOverflow)?;
    let raw = block.get(*pos..end).ok_or(HpackError::Truncated)?;
    *pos = end;
    let bytes = if huffman {
        huffman::decode(raw)?
    } else {
        raw.to_vec()
    };
    String::from_utf8(bytes).map_err(|_| HpackError::BadHuffman)
}

pub(crate) mod huffman {
    //! RFC 7541 Appendix B Huffman decoding.
    //!
    //! The code is canonical: within a bit length, codes are assigned to
    //! symbols in ascending order, and each length's first code extends the
    //! previous length's last code. Storing only the per-symbol lengths and
    //! rebuilding the codes keeps the table honest.

    use once_cell::sync::Lazy;

    use super::HpackError;

    const EOS: usize = 256;

    /// Code length per symbol 0..=256.
    #[rustfmt::skip]
    const LENGTHS: [u8; 257] = [
        13, 23, 28, 28, 28, 28, 28, 28, 28, 24, 30, 28, 28, 30, 28, 28,
        28, 28, 28, 28, 28, 28, 30, 28, 28, 28, 28, 28, 28, 28, 28, 28,
         6, 10, 10, 12, 13,  6,  8, 11, 10, 10,  8, 11,  8,  6,  6,  6,
         5,  5,  5,  6,  6,  6,  6,  6,  6,  6,  7,  8, 15,  6, 12, 10,
        13,  6,  7,  7,  7,  7,  7,  7,  7,  7,  7,  7,  7,  7,  7,  7,
         7,  7,  7,  7,  7,  7,  7,  7,  8,  7,  8, 13, 19, 13, 14,  6,
        15,  5,  6,  5,  6,  5,  6,  6,  6,  5,  7,  7,  6,  6,  6,  5,
         6,  7,  6,  5,  5,  6,  7,  7,  7,  7,  7, 15, 11, 14, 13, 28,
        20, 22, 20, 20, 22, 22, 22, 23, 22, 23, 23, 23, 23, 23, 24, 23,
        24, 24, 22, 23, 24, 23, 23, 23, 23, 21, 22, 23, 22, 23, 23, 24,
        22, 21, 20, 22, 22, 23, 23, 21, 23, 22, 22, 24, 21, 22, 23, 23,
        21, 21, 22, 21, 23, 22, 23, 23, 20, 22, 22, 22, 23, 22, 22, 23,
        26, 26, 20, 19, 22, 23, 22, 25, 26, 26, 26, 27, 27, 26, 24, 25,
        19, 21, 26, 27, 27, 26, 27, 24, 21, 21, 26, 26, 28, 27, 27, 27,
        20, 24, 20, 21, 22, 21, 21, 23, 22, 22, 25, 25, 24, 24, 26, 23,
        26, 27, 26, 26, 27, 27, 27, 27, 27, 28, 27, 27, 27, 27, 27, 26,
        30,
    ];

    struct Table {
        /// `(code, length, symbol)` sorted by code value, MSB-first.
        entries: Vec<(u32, u8, u16)>,
    }

    static TABLE: Lazy<Table> = Lazy::new(|| {
        let mut order: Vec<usize> = (0..=EOS).collect();
        order.sort_by_key(|&sym| (LENGTHS[sym], sym));

        let mut entries = Vec::with_capacity(order.len());
        let mut code: u32 = 0;
        let mut prev_len: u8 = 0;
        for sym in order {
            let len = LENGTHS[sym];
            code <<= len - prev_len;
            entries.push((code, len, sym as u16));
            code += 1;
            prev_len = len;
        }
        Table { entries }
    });

    pub fn decode(input: &[u8]) -> Result<Vec<u8>, HpackError> {
        let table = &*TABLE;
        let mut out = Vec::with_capacity(input.len() * 2);
        let mut acc: u32 = 0;
        let mut bits: u8 = 0;

        let mut bit_iter = input.iter().flat_map(|byte| {
            (0..8).rev().map(move |shift| (byte >> shift) & 1)
        });

        loop {
            match bit_iter.next() {
                Some(bit) => {
                    acc = (acc << 1) | u32::from(bit);
                    bits += 1;
                    if bits >= 5 {
                        if let Some(symbol) = lookup(table, acc, bits) {
                            if symbol as usize == EOS {
                                return Err(HpackError::BadHuffman);
                            }
                            out.push(symbol as u8);
                            acc = 0;
                            bits = 0;
                        } else if bits > 30 {
                            return Err(HpackError::BadHuffman);
                        }
                    }
                }
                None => break,
            }
        }

        // Remaining bits must be a prefix of EOS: all ones, fewer than 8.
        if bits >= 8 || acc != (1u32 << bits) - 1 {
            if bits > 0 {
                return Err(HpackError::BadHuffman);
            }
        }
        Ok(out)
    }

    fn lookup(table: &Table, code: u32, len: u8) -> Option<u16> {
        table
            .entries
            .binary_search_by(|(entry_code, entry_len, _)| {
                entry_code.cmp(&code).then(entry_len.cmp(&len))
            })
            .ok()
            .map(|i| table.entries[i].2)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn canonical_codes_match_rfc_anchors() {
            let find = |sym: u16| {
                TABLE
                    .entries
                    .iter()
                    .find(|(_, _, s)| *s == sym)
                    .map(|(code, len, _)| (*code, *len))
                    .unwrap()
            };
            assert_eq!(find(b'0' as u16), (0x0, 5));
            assert_eq!(find(b'a' as u16), (0x3, 5));
            assert_eq!(find(b' ' as u16), (0x14, 6));
            assert_eq!(find(b':' as u16), (0x5c, 7));
            assert_eq!(find(b'X' as u16), (0xfc, 8));
            assert_eq!(find(b'?' as u16), (0x3fc, 10));
            assert_eq!(find(0), (0x1ff8, 13));
            assert_eq!(find(b'\\' as u16), (0x7fff0, 19));
            assert_eq!(find(256), (0x3fffffff, 30));
        }

        #[test]
        fn decodes_rfc_example() {
            // RFC 7541 C.4.1: "www.example.com"
            let encoded = [
                0xf1, 0xe3, 0xc2, 0xe5, 0xf2, 0x3a, 0x6b, 0xa0, 0xab, 0x90, 0xf4, 0xff,
            ];
            assert_eq!(decode(&encoded).unwrap(), b"www.example.com");
        }

        #[test]
        fn decodes_rfc_custom_key() {
            // RFC 7541 C.6.1: "custom-key" / "custom-value"
            let key = [0x25, 0xa8, 0x49, 0xe9, 0x5b, 0xa9, 0x7d, 0x7f];
            let value = [0x25, 0xa8, 0x49, 0xe9, 0x5b, 0xb8, 0xe8, 0xb4, 0xbf];
            assert_eq!(decode(&key).unwrap(), b"custom-key");
            assert_eq!(decode(&value).unwrap(), b"custom-value");
        }

        #[test]
        fn padding_must_be_eos_prefix() {
            // 00000 111 -> '0' followed by a valid all-ones padding
            assert_eq!(decode(&[0x07]), Ok(vec![b'0']));
            // 00000 000 -> '0' followed by zero padding, which is invalid
            assert!(decode(&[0x00]).is_err());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_match_round_trip() {
        let fields = vec![
            (":method".to_string(), "GET".to_string()),
            (":authority".to_string(), "example.com".to_string()),
            (":scheme".to_string(), "https".to_string()),
            (":path".to_string(), "/".to_string()),
            ("User-Agent".to_string(), "guise".to_string()),
            ("x-custom".to_string(), "1".to_string()),
            ("x-custom".to_string(), "2".to_string()),
        ];
        let block = encode_block(&fields);
        let mut decoder = Decoder::new(4096);
        let decoded = decoder.decode(&block).unwrap();
        let expected: Vec<(String, String)> = fields
            .iter()
            .map(|(n, v)| (n.to_ascii_lowercase(), v.clone()))
            .collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn decode_indexed_and_incremental() {
        // RFC 7541 C.3.1 first request, unhuffman'd literals
        let block = [
            0x82, 0x86, 0x84, 0x41, 0x0f, 0x77, 0x77, 0x77, 0x2e, 0x65, 0x78, 0x61, 0x6d,
            0x70, 0x6c, 0x65, 0x2e, 0x63, 0x6f, 0x6d,
        ];
        let mut decoder = Decoder::new(4096);
        let fields = decoder.decode(&block).unwrap();
        assert_eq!(
            fields,
            vec![
                (":method".to_string(), "GET".to_string()),
                (":scheme".to_string(), "http".to_string()),
                (":path".to_string(), "/".to_string()),
                (":authority".to_string(), "www.example.com".to_string()),
            ]
        );

        // second request on the same connection reuses the dynamic entry
        let block2 = [0x82, 0x86, 0x84, 0xbe];
        let fields2 = decoder.decode(&block2).unwrap();
        assert_eq!(fields2[3].1, "www.example.com");
    }

    #[test]
    fn oversized_index_is_rejected() {
        let mut decoder = Decoder::new(4096);
        assert_eq!(decoder.decode(&[0xff, 0x7f]), Err(HpackError::BadIndex(254)));
    }
}
