//! BIFF record framing
//!
//! A workbook stream is a flat sequence of `code: u16, len: u16, data` records.

use crate::error::{Result, SheetError};

pub const BOF: u16 = 0x809;
pub const EOF: u16 = 0x0A;
pub const BOUNDSHEET: u16 = 0x85;
pub const DIMENSION: u16 = 0x200;
pub const ROW: u16 = 0x208;
pub const FILEPASS: u16 = 0x2F;
pub const RK: u16 = 0x7E;
pub const RK2: u16 = 0x27E;
pub const MULRK: u16 = 0xBD;
pub const MULBLANK: u16 = 0xBE;
pub const SST: u16 = 0xFC;
pub const CONTINUE: u16 = 0x3C;
pub const LABEL: u16 = 0x204;
pub const LABELSST: u16 = 0xFD;
pub const NUMBER: u16 = 0x203;
pub const STRING: u16 = 0x207;
pub const FORMULA: u16 = 0x406;
pub const FORMULA2: u16 = 0x6;
pub const FORMAT: u16 = 0x41E;
pub const XF: u16 = 0xE0;
pub const BOOLERR: u16 = 0x205;
pub const FONT: u16 = 0x31;
pub const PALETTE: u16 = 0x92;
pub const NINETEENFOUR: u16 = 0x22;
pub const MERGEDCELLS: u16 = 0xE5;
pub const COLINFO: u16 = 0x7D;
pub const DEFCOLWIDTH: u16 = 0x55;
pub const STANDARDWIDTH: u16 = 0x99;
pub const HYPERLINK: u16 = 0x1B8;

/// Substream types carried by BOF
pub const SUBSTREAM_GLOBALS: u16 = 0x5;
pub const SUBSTREAM_WORKSHEET: u16 = 0x10;

/// One record borrowed from the workbook stream
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    pub code: u16,
    /// Stream offset of the record header
    pub offset: usize,
    pub data: &'a [u8],
}

impl<'a> Record<'a> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bytes(&self, pos: usize, len: usize) -> Result<&'a [u8]> {
        pos.checked_add(len)
            .and_then(|end| self.data.get(pos..end))
            .ok_or_else(|| self.truncated(pos + len))
    }

    pub fn u8(&self, pos: usize) -> Result<u8> {
        self.data.get(pos).copied().ok_or_else(|| self.truncated(pos + 1))
    }

    pub fn u16(&self, pos: usize) -> Result<u16> {
        let b = self.bytes(pos, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32(&self, pos: usize) -> Result<u32> {
        let b = self.bytes(pos, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn f64(&self, pos: usize) -> Result<f64> {
        let b = self.bytes(pos, 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(f64::from_le_bytes(raw))
    }

    pub fn truncated(&self, needed: usize) -> SheetError {
        SheetError::InvalidFormat(format!(
            "Record 0x{:04X} at offset {} is {} bytes, needs {}",
            self.code,
            self.offset,
            self.data.len(),
            needed
        ))
    }
}

/// Sequential reader over the records of a workbook stream
#[derive(Debug, Clone)]
pub struct RecordIter<'a> {
    stream: &'a [u8],
    pos: usize,
}

impl<'a> RecordIter<'a> {
    pub fn new(stream: &'a [u8], pos: usize) -> Self {
        RecordIter { stream, pos }
    }

    /// Code of the next record without consuming it
    pub fn peek_code(&self) -> Option<u16> {
        self.stream
            .get(self.pos..self.pos + 2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    /// Next record, failing at the end of the stream
    ///
    /// Substreams always close with EOF, so running out of bytes means the
    /// stream was cut short.
    pub fn expect_next(&mut self, context: &str) -> Result<Record<'a>> {
        match self.next() {
            Some(record) => record,
            None => Err(SheetError::InvalidFormat(format!(
                "Workbook stream ends inside {}",
                context
            ))),
        }
    }
}

impl<'a> Iterator for RecordIter<'a> {
    type Item = Result<Record<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.stream.len() {
            return None;
        }

        let offset = self.pos;
        let header = match self.stream.get(offset..offset + 4) {
            Some(h) => h,
            None => {
                self.pos = self.stream.len();
                return Some(Err(SheetError::InvalidFormat(format!(
                    "Truncated record header at offset {}",
                    offset
                ))));
            }
        };
        let code = u16::from_le_bytes([header[0], header[1]]);
        let len = u16::from_le_bytes([header[2], header[3]]) as usize;

        let data = match self.stream.get(offset + 4..offset + 4 + len) {
            Some(d) => d,
            None => {
                self.pos = self.stream.len();
                return Some(Err(SheetError::InvalidFormat(format!(
                    "Record 0x{:04X} at offset {} runs past the end of the stream",
                    code, offset
                ))));
            }
        };

        self.pos = offset + 4 + len;
        Some(Ok(Record { code, offset, data }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: u16, data: &[u8]) -> Vec<u8> {
        let mut out = code.to_le_bytes().to_vec();
        out.extend_from_slice(&(data.len() as u16).to_le_bytes());
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn test_iterates_records() {
        let mut stream = record(BOF, &[0, 6, 5, 0]);
        stream.extend(record(EOF, &[]));

        let mut iter = RecordIter::new(&stream, 0);
        assert_eq!(iter.peek_code(), Some(BOF));
        let bof = iter.next().unwrap().unwrap();
        assert_eq!(bof.u16(0).unwrap(), 0x600);
        assert_eq!(bof.u16(2).unwrap(), SUBSTREAM_GLOBALS);
        assert!(bof.u32(2).is_err());

        let eof = iter.next().unwrap().unwrap();
        assert_eq!(eof.code, EOF);
        assert_eq!(eof.offset, 8);
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_truncated_record() {
        let mut stream = record(NUMBER, &[0; 14]);
        stream.truncate(10);
        let mut iter = RecordIter::new(&stream, 0);
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
        assert!(iter.clone().expect_next("sheet").is_err());
    }
}
