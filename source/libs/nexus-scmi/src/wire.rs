// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Little-endian word helpers for SCMI payloads.
//!
//! SCMI payloads are arrays of 32-bit little-endian words. 64-bit quantities
//! (clock rates, timestamps) travel as a (low, high) word pair.

/// Size of one payload word in bytes.
pub const WORD: usize = 4;

/// Reads word `idx` from `payload`, or `None` when the payload is too short.
#[inline]
pub fn read_word(payload: &[u8], idx: usize) -> Option<u32> {
    let start = idx.checked_mul(WORD)?;
    let bytes = payload.get(start..start.checked_add(WORD)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Splits a 64-bit value into `(low, high)` words.
#[inline]
pub const fn split_u64(value: u64) -> (u32, u32) {
    (value as u32, (value >> 32) as u32)
}

/// Joins a `(low, high)` word pair.
#[inline]
pub const fn join_u64(low: u32, high: u32) -> u64 {
    ((high as u64) << 32) | low as u64
}

/// Bounded word writer over a caller-provided buffer.
///
/// Writes past the end are dropped and reported through [`WordWriter::overflowed`].
pub struct WordWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
    overflowed: bool,
}

impl<'a> WordWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, len: 0, overflowed: false }
    }

    pub fn put(&mut self, word: u32) -> &mut Self {
        self.put_bytes(&word.to_le_bytes())
    }

    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        let (low, high) = split_u64(value);
        self.put(low).put(high)
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        match self.buf.get_mut(self.len..self.len + bytes.len()) {
            Some(dst) => {
                dst.copy_from_slice(bytes);
                self.len += bytes.len();
            }
            None => self.overflowed = true,
        }
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn read_word_bounds() {
        let payload = [1, 0, 0, 0, 0xff, 0xff, 0xff, 0xff];
        assert_eq!(read_word(&payload, 0), Some(1));
        assert_eq!(read_word(&payload, 1), Some(u32::MAX));
        assert_eq!(read_word(&payload, 2), None);
        assert_eq!(read_word(&payload[..7], 1), None);
        assert_eq!(read_word(&payload, usize::MAX), None);
        assert_eq!(read_word(&payload, usize::MAX / WORD), None);
    }

    #[test]
    fn split_join_boundaries() {
        for value in [0u64, u32::MAX as u64, 1u64 << 32, u64::MAX] {
            let (low, high) = split_u64(value);
            assert_eq!(join_u64(low, high), value);
        }
        assert_eq!(split_u64(1u64 << 32), (0, 1));
        assert_eq!(split_u64(u32::MAX as u64), (u32::MAX, 0));
    }

    #[test]
    fn writer_drops_overflowing_words() {
        let mut buf = [0u8; 6];
        let mut w = WordWriter::new(&mut buf);
        w.put(0x0403_0201).put(0xdead_beef);
        assert_eq!(w.len(), 4);
        assert!(w.overflowed());
        assert_eq!(&buf[..4], &[1, 2, 3, 4]);
    }

    proptest! {
        #[test]
        fn split_join_roundtrip(value in any::<u64>()) {
            let (low, high) = split_u64(value);
            prop_assert_eq!(join_u64(low, high), value);
        }

        #[test]
        fn read_word_never_panics(payload in proptest::collection::vec(any::<u8>(), 0..64), idx in 0usize..32) {
            let word = read_word(&payload, idx);
            prop_assert_eq!(word.is_some(), (idx + 1) * WORD <= payload.len());
        }
    }
}
