//! BIFF string layouts and the shared string table
//!
//! BIFF8 strings carry an option byte: bit 0 selects UTF-16 over the
//! "compressed" one-byte form, bit 2 announces extended (phonetic) data and
//! bit 3 rich-text formatting runs. BIFF7 strings are plain codepage bytes.

use super::records::Record;
use crate::error::{Result, SheetError};

const FLAG_UTF16: u8 = 0x01;
const FLAG_EXTENDED: u8 = 0x04;
const FLAG_RICH: u8 = 0x08;

/// Compressed BIFF8 characters: each byte is a UTF-16 unit with a zero high byte
pub fn decode_compressed(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

pub fn decode_utf16(bytes: &[u8]) -> String {
    let (text, _) = encoding_rs::UTF_16LE.decode_without_bom_handling(bytes);
    text.into_owned()
}

/// BIFF7 text in the workbook codepage
pub fn decode_codepage(bytes: &[u8]) -> String {
    let (text, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes);
    text.into_owned()
}

/// Width of the character count preceding a string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountWidth {
    U8,
    U16,
}

impl CountWidth {
    fn read(self, record: &Record<'_>, pos: usize) -> Result<(usize, usize)> {
        match self {
            CountWidth::U8 => Ok((record.u8(pos)? as usize, 1)),
            CountWidth::U16 => Ok((record.u16(pos)? as usize, 2)),
        }
    }
}

/// BIFF8 unicode string at `pos`; returns the text and the bytes consumed
pub fn read_unicode_string(
    record: &Record<'_>,
    pos: usize,
    width: CountWidth,
) -> Result<(String, usize)> {
    let (chars, mut consumed) = width.read(record, pos)?;
    let flags = record.u8(pos + consumed)?;
    consumed += 1;

    let mut runs = 0usize;
    if flags & FLAG_RICH != 0 {
        runs = record.u16(pos + consumed)? as usize;
        consumed += 2;
    }
    let mut extended = 0usize;
    if flags & FLAG_EXTENDED != 0 {
        extended = record.u32(pos + consumed)? as usize;
        consumed += 4;
    }

    let byte_len = if flags & FLAG_UTF16 != 0 {
        chars * 2
    } else {
        chars
    };
    let raw = record.bytes(pos + consumed, byte_len)?;
    let text = if flags & FLAG_UTF16 != 0 {
        decode_utf16(raw)
    } else {
        decode_compressed(raw)
    };

    consumed += byte_len + runs * 4 + extended;
    Ok((text, consumed))
}

/// BIFF7 byte string at `pos`; returns the text and the bytes consumed
pub fn read_byte_string(
    record: &Record<'_>,
    pos: usize,
    width: CountWidth,
) -> Result<(String, usize)> {
    let (len, consumed) = width.read(record, pos)?;
    let raw = record.bytes(pos + consumed, len)?;
    Ok((decode_codepage(raw), consumed + len))
}

/// Decode the SST record plus the CONTINUE records that follow it
///
/// `fragments[0]` is the SST record data. Header fields and skipped runs
/// read straight across fragment boundaries. Character data that crosses one
/// restarts with a fresh option byte, so a string may switch between the
/// compressed and UTF-16 forms mid-way.
pub fn parse_sst(fragments: &[&[u8]]) -> Result<Vec<String>> {
    let mut reader = FragmentReader {
        fragments,
        index: 0,
        pos: 0,
    };

    let _total = reader.read_u32()?;
    let unique = reader.read_u32()? as usize;

    // a bogus count must not drive the allocation
    let mut strings = Vec::with_capacity(unique.min(1 << 16));
    for _ in 0..unique {
        let chars = reader.read_u16()? as usize;
        let flags = reader.read_u8()?;

        let runs = if flags & FLAG_RICH != 0 {
            reader.read_u16()? as usize
        } else {
            0
        };
        let extended = if flags & FLAG_EXTENDED != 0 {
            reader.read_u32()? as usize
        } else {
            0
        };

        let units = reader.read_chars(chars, flags & FLAG_UTF16 != 0)?;
        strings.push(String::from_utf16_lossy(&units));

        reader.skip(runs * 4 + extended)?;
    }

    Ok(strings)
}

struct FragmentReader<'a> {
    fragments: &'a [&'a [u8]],
    index: usize,
    pos: usize,
}

impl<'a> FragmentReader<'a> {
    fn exhausted() -> SheetError {
        SheetError::InvalidFormat("SST data continues past its last CONTINUE record".to_string())
    }

    /// Move to the next fragment once the current one is used up
    fn advance_if_done(&mut self) -> Result<()> {
        while self.pos >= self.current().len() {
            if self.index + 1 >= self.fragments.len() {
                return Err(Self::exhausted());
            }
            self.index += 1;
            self.pos = 0;
        }
        Ok(())
    }

    fn current(&self) -> &'a [u8] {
        self.fragments.get(self.index).copied().unwrap_or(&[])
    }

    fn read_u8(&mut self) -> Result<u8> {
        self.advance_if_done()?;
        let b = self.current()[self.pos];
        self.pos += 1;
        Ok(b)
    }

    fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes([self.read_u8()?, self.read_u8()?]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes([
            self.read_u8()?,
            self.read_u8()?,
            self.read_u8()?,
            self.read_u8()?,
        ]))
    }

    fn skip(&mut self, mut count: usize) -> Result<()> {
        while count > 0 {
            self.advance_if_done()?;
            let step = count.min(self.current().len() - self.pos);
            self.pos += step;
            count -= step;
        }
        Ok(())
    }

    fn read_chars(&mut self, mut remaining: usize, mut wide: bool) -> Result<Vec<u16>> {
        let mut units = Vec::with_capacity(remaining);
        while remaining > 0 {
            if self.pos >= self.current().len() {
                self.advance_if_done()?;
                // continued character data restarts with its own option byte
                wide = self.current()[self.pos] & FLAG_UTF16 != 0;
                self.pos += 1;
                continue;
            }

            let available = &self.current()[self.pos..];
            if wide {
                let take = remaining.min(available.len() / 2);
                if take == 0 {
                    return Err(SheetError::InvalidFormat(
                        "UTF-16 character split across SST records".to_string(),
                    ));
                }
                units.extend(
                    available[..take * 2]
                        .chunks_exact(2)
                        .map(|c| u16::from_le_bytes([c[0], c[1]])),
                );
                self.pos += take * 2;
                remaining -= take;
            } else {
                let take = remaining.min(available.len());
                units.extend(available[..take].iter().map(|&b| b as u16));
                self.pos += take;
                remaining -= take;
            }
        }
        Ok(units)
    }
}
