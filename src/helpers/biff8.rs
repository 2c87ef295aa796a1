//! Record reader for the BIFF8 stream of Excel 97-2003 workbooks.
//! A record is `type: u16, size: u16, payload`; payloads larger than 8224 bytes spill into CONTINUE records.

use crate::error::Result;
use crate::helpers::bytes::le_f64;
use crate::helpers::bytes::le_u16;
use crate::helpers::bytes::le_u32;
use crate::helpers::bytes::le_u64;
use crate::helpers::bytes::le_usize;
use encoding_rs::Encoding;
use thiserror::Error;

const CONTINUE: u16 = 60;

#[derive(Error, Debug)]
pub enum Biff8Error {
    #[error("Fewer than {0} bytes remaining in record")]
    NotEnoughDataError(usize),
}

pub(crate) struct Biff8Reader {
    /// Code page of compressed strings, set from the CODEPAGE record.
    pub(crate) encoding: &'static Encoding,
    buffer: Vec<u8>,
    /// Position of the next record header.
    pointer: usize,
    /// Payload slices of the current record, CONTINUE parts included.
    parts: Vec<(usize, usize)>,
    part: usize,
    offset: usize,
}

impl Biff8Reader {
    pub(crate) fn new(data: Vec<u8>) -> Biff8Reader {
        Biff8Reader {
            encoding: encoding_rs::WINDOWS_1252,
            buffer: data,
            pointer: 0,
            parts: Vec::new(),
            part: 0,
            offset: 0,
        }
    }

    /// Moves to the next record and returns its type, `None` at the end of the stream.
    pub(crate) fn next(&mut self) -> Result<Option<u16>> {
        if self.pointer + 4 > self.buffer.len() {
            return Ok(None);
        }
        let kind = self.u16_at(self.pointer)?;
        self.parts.clear();
        self.part = 0;
        self.offset = 0;
        self.push_part()?;
        while self.pointer + 4 <= self.buffer.len() && self.u16_at(self.pointer)? == CONTINUE {
            self.push_part()?;
        }
        Ok(Some(kind))
    }

    fn push_part(&mut self) -> Result<()> {
        let size = self.u16_at(self.pointer + 2)? as usize;
        let lower = self.pointer + 4;
        let upper = self.buffer.len().min(lower + size);
        self.parts.push((lower, upper));
        self.pointer = upper;
        Ok(())
    }

    /// Jumps to an absolute stream offset, e.g. a BOUNDSHEET8 sheet position.
    pub(crate) fn goto(&mut self, pointer: usize) {
        self.pointer = pointer;
        self.parts.clear();
    }

    /// Reads at most `length` bytes without crossing into the next CONTINUE part.
    fn take(&mut self, length: usize) -> &[u8] {
        let Some(&(lower, upper)) = self.parts.get(self.part) else {
            return &[];
        };
        let source = upper.min(lower + self.offset);
        let target = upper.min(source + length);
        if target == upper {
            self.part += 1;
            self.offset = 0;
        } else {
            self.offset += target - source;
        }
        &self.buffer[source..target]
    }

    fn take_exact(&mut self, length: usize) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(length);
        while bytes.len() < length {
            let chunk = self.take(length - bytes.len());
            if chunk.is_empty() {
                Err(Biff8Error::NotEnoughDataError(length))?;
            }
            bytes.extend_from_slice(chunk);
        }
        Ok(bytes)
    }

    pub(crate) fn skip(&mut self, length: usize) -> Result<()> {
        self.take_exact(length).map(|_| ())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take_exact(1)?[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16> {
        self.take_exact(2).map(|bytes| le_u16(&bytes))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        self.take_exact(4).map(|bytes| le_u32(&bytes))
    }

    pub(crate) fn read_usize(&mut self) -> Result<usize> {
        self.take_exact(4).map(|bytes| le_usize(&bytes))
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64> {
        self.take_exact(8).map(|bytes| le_u64(&bytes))
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64> {
        self.take_exact(8).map(|bytes| le_f64(&bytes))
    }

    /// u16 located `offset` bytes before the end of the current record.
    pub(crate) fn u16_from_end(&self, offset: usize) -> Result<u16> {
        let mut offset = offset;
        for &(lower, upper) in self.parts.iter().rev() {
            if lower + offset <= upper {
                return self.u16_at(upper - offset);
            }
            offset -= upper - lower;
        }
        Err(Biff8Error::NotEnoughDataError(2))?
    }

    fn u16_at(&self, index: usize) -> Result<u16> {
        match self.buffer.get(index..index + 2) {
            Some(bytes) => Ok(le_u16(bytes)),
            None => Err(Biff8Error::NotEnoughDataError(2))?,
        }
    }

    /// Decodes an RK value: bit 0 scales by 1/100, bit 1 marks a 30-bit integer.
    pub(crate) fn read_rk(&mut self) -> Result<f64> {
        let raw = self.read_u32()?;
        let mut value = if raw & 0x02 != 0 {
            ((raw as i32) >> 2) as f64
        } else {
            f64::from_bits(((raw & 0xFFFF_FFFC) as u64) << 32)
        };
        if raw & 0x01 != 0 {
            value /= 100.0;
        }
        Ok(value)
    }

    /// ShortXLUnicodeString: 8-bit character count.
    pub(crate) fn read_short_string(&mut self) -> Result<String> {
        let chars = self.read_u8()? as usize;
        self.read_plain_string(chars)
    }

    /// XLUnicodeString: 16-bit character count.
    pub(crate) fn read_string(&mut self) -> Result<String> {
        let chars = self.read_u16()? as usize;
        self.read_plain_string(chars)
    }

    fn read_plain_string(&mut self, chars: usize) -> Result<String> {
        let wide = self.read_u8()? & 0x01 != 0;
        let mut text = String::new();
        self.read_chars(chars, wide, &mut text);
        Ok(text)
    }

    /// XLUnicodeRichExtendedString as stored in the SST, possibly spread over CONTINUE records.
    /// Formatting runs and phonetic blocks follow the characters and are skipped.
    pub(crate) fn read_rich_string(&mut self) -> Result<String> {
        let mut remaining = self.read_u16()? as usize;
        let flags = self.read_u8()?;
        let runs = if flags & 0x08 != 0 {
            self.read_u16()? as usize
        } else {
            0
        };
        let phonetic = if flags & 0x04 != 0 {
            self.read_usize()?
        } else {
            0
        };
        let mut wide = flags & 0x01 != 0;
        let mut text = String::new();
        loop {
            remaining -= self.read_chars(remaining, wide, &mut text).min(remaining);
            if remaining == 0 {
                break;
            }
            // Each CONTINUE part restarts with its own option byte.
            wide = self.read_u8()? & 0x01 != 0;
        }
        self.skip(4 * runs)?;
        self.skip(phonetic)?;
        Ok(text)
    }

    /// Decodes up to `chars` characters from the current part, returns how many were read.
    fn read_chars(&mut self, chars: usize, wide: bool, text: &mut String) -> usize {
        let wanted = if wide { chars * 2 } else { chars };
        let bytes = self.take(wanted).to_vec();
        if wide {
            let (decoded, _) = encoding_rs::UTF_16LE.decode_without_bom_handling(&bytes);
            text.push_str(&decoded);
            bytes.len() / 2
        } else {
            // Compressed strings are single-byte text in the workbook code page.
            let (decoded, _) = self.encoding.decode_without_bom_handling(&bytes);
            text.push_str(&decoded);
            bytes.len()
        }
    }
}

#[macro_export]
macro_rules! match_biff8_record {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(kind) = $reader.next()? {
            match kind {
                $($arms)*
                _ => (),
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: u16, payload: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&kind.to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn test_read_records() {
        let mut data = record(0x0809, &[1, 2]);
        data.extend(record(0x000A, &[]));
        let mut reader = Biff8Reader::new(data);
        assert_eq!(reader.next().unwrap(), Some(0x0809));
        assert_eq!(reader.read_u16().unwrap(), 0x0201);
        assert_eq!(reader.next().unwrap(), Some(0x000A));
        assert_eq!(reader.next().unwrap(), None);
    }

    #[test]
    fn test_string_across_continue() {
        // "abcd" split as "ab" + CONTINUE("cd") with a fresh option byte.
        let mut data = record(0x00FC, &[4, 0, 0, b'a', b'b']);
        data.extend(record(CONTINUE, &[0, b'c', b'd']));
        let mut reader = Biff8Reader::new(data);
        reader.next().unwrap();
        assert_eq!(reader.read_rich_string().unwrap(), "abcd");
    }

    #[test]
    fn test_compressed_and_wide_strings() {
        // Compressed 0xC0 'b' in the 1251 code page, then a wide U+0416.
        let mut payload = vec![2, 0, 0, 0xC0, b'b'];
        payload.extend([1, 0, 1, 0x16, 0x04]);
        let mut reader = Biff8Reader::new(record(0x0004, &payload));
        reader.encoding = encoding_rs::WINDOWS_1251;
        reader.next().unwrap();
        assert_eq!(reader.read_string().unwrap(), "\u{0410}b");
        assert_eq!(reader.read_string().unwrap(), "\u{0416}");
    }

    #[test]
    fn test_rk_integer_and_scaled() {
        let integer = (42i32 << 2) as u32 | 0x02;
        let scaled = (1234i32 << 2) as u32 | 0x03;
        let mut payload = integer.to_le_bytes().to_vec();
        payload.extend(scaled.to_le_bytes());
        let mut reader = Biff8Reader::new(record(0x027E, &payload));
        reader.next().unwrap();
        assert_eq!(reader.read_rk().unwrap(), 42.0);
        assert_eq!(reader.read_rk().unwrap(), 12.34);
    }
}
