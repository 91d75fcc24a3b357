//! OLE2 compound file reader
//!
//! Legacy `.xls` files wrap their BIFF record stream in a compound file: a
//! small FAT-style file system with 512-byte big blocks and 64-byte small
//! blocks. This module walks just enough of it to pull out the "Workbook"
//! (BIFF8) or "Book" (BIFF7) stream.
//!
//! Every chain ends at the sentinel returned by [`read_int4`] for the reserved
//! values `0xFFFFFFFE` and `0xFFFFFFFF`. Walks that never reach it, or step
//! outside the allocation table, fail with `InvalidFormat`.

use crate::error::{Result, SheetError};
use std::path::Path;

/// File signature
pub const SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// End-of-chain (and free sector) marker
pub const END_OF_CHAIN: i64 = -2;

pub const BIG_BLOCK_SIZE: usize = 0x200;
pub const SMALL_BLOCK_SIZE: usize = 0x40;
pub const SMALL_BLOCK_THRESHOLD: usize = 0x1000;

const NUM_BIG_BLOCK_DEPOT_BLOCKS_POS: usize = 0x2c;
const ROOT_START_BLOCK_POS: usize = 0x30;
const SMALL_BLOCK_DEPOT_BLOCK_POS: usize = 0x3c;
const EXTENSION_BLOCK_POS: usize = 0x44;
const NUM_EXTENSION_BLOCK_POS: usize = 0x48;
const BIG_BLOCK_DEPOT_BLOCKS_POS: usize = 0x4c;

const PROPERTY_STORAGE_BLOCK_SIZE: usize = 0x80;
const SIZE_OF_NAME_POS: usize = 0x40;
const TYPE_POS: usize = 0x42;
const START_BLOCK_POS: usize = 0x74;
const SIZE_POS: usize = 0x78;

/// Depot pointers that fit in the header
const HEADER_DEPOT_SLOTS: usize = (BIG_BLOCK_SIZE - BIG_BLOCK_DEPOT_BLOCKS_POS) / 4;
/// Depot pointers per extension sector, the last slot links to the next one
const EXTENSION_DEPOT_SLOTS: usize = BIG_BLOCK_SIZE / 4 - 1;

/// Decode a little-endian 4-byte integer
///
/// `0xFFFFFFFE` and above come back as [`END_OF_CHAIN`], never as their
/// unsigned value.
pub fn read_int4(data: &[u8], pos: usize) -> Result<i64> {
    let bytes = data
        .get(pos..pos + 4)
        .ok_or_else(|| SheetError::InvalidFormat(format!("Compound file truncated at {}", pos)))?;
    let value = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if value >= 0xFFFF_FFFE {
        Ok(END_OF_CHAIN)
    } else {
        Ok(value as i64)
    }
}

/// Directory entry of the compound file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub entry_type: u8,
    pub start_sector: i64,
    pub size: u32,
}

/// Parsed compound file
#[derive(Debug)]
pub struct CompoundFile {
    data: Vec<u8>,
    big_block_chain: Vec<i64>,
    small_block_chain: Vec<i64>,
    entries: Vec<DirectoryEntry>,
    workbook: Option<usize>,
    root: Option<usize>,
}

impl CompoundFile {
    /// Read and parse a compound file from disk
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::open(data)
    }

    /// Parse a compound file held in memory
    pub fn open(data: Vec<u8>) -> Result<Self> {
        if data.len() < SIGNATURE.len() || data[..SIGNATURE.len()] != SIGNATURE {
            return Err(SheetError::InvalidFormat(
                "Not an OLE2 compound file (bad signature)".to_string(),
            ));
        }
        if data.len() < BIG_BLOCK_SIZE {
            return Err(SheetError::InvalidFormat(
                "Compound file header truncated".to_string(),
            ));
        }

        let num_big_block_depot_blocks = read_count(&data, NUM_BIG_BLOCK_DEPOT_BLOCKS_POS)?;
        let sbd_start_block = read_int4(&data, SMALL_BLOCK_DEPOT_BLOCK_POS)?;
        let root_start_block = read_int4(&data, ROOT_START_BLOCK_POS)?;
        let extension_block = read_int4(&data, EXTENSION_BLOCK_POS)?;
        let num_extension_blocks = read_count(&data, NUM_EXTENSION_BLOCK_POS)?;

        let depot_blocks = Self::read_depot_blocks(
            &data,
            num_big_block_depot_blocks,
            extension_block,
            num_extension_blocks,
        )?;

        let mut big_block_chain = Vec::with_capacity(depot_blocks.len() * (BIG_BLOCK_SIZE / 4));
        for &block in &depot_blocks {
            let pos = sector_offset(block)?;
            for i in 0..BIG_BLOCK_SIZE / 4 {
                big_block_chain.push(read_int4(&data, pos + i * 4)?);
            }
        }

        let mut small_block_chain = Vec::new();
        let mut guard = ChainGuard::new(big_block_chain.len());
        let mut block = sbd_start_block;
        while block != END_OF_CHAIN {
            guard.step("small block depot")?;
            let pos = sector_offset(block)?;
            for i in 0..BIG_BLOCK_SIZE / 4 {
                small_block_chain.push(read_int4(&data, pos + i * 4)?);
            }
            block = chain_next(&big_block_chain, block)?;
        }

        let mut file = CompoundFile {
            data,
            big_block_chain,
            small_block_chain,
            entries: Vec::new(),
            workbook: None,
            root: None,
        };

        let directory = file.read_big_chain(root_start_block)?;
        file.read_property_sets(&directory)?;

        log::debug!(
            "Compound file: {} depot blocks, {} directory entries",
            depot_blocks.len(),
            file.entries.len()
        );
        Ok(file)
    }

    /// Sectors holding the big block allocation table
    fn read_depot_blocks(
        data: &[u8],
        num_depot_blocks: usize,
        mut extension_block: i64,
        num_extension_blocks: usize,
    ) -> Result<Vec<i64>> {
        // every depot and extension sector has to exist in the file
        let sectors = data.len() / BIG_BLOCK_SIZE;
        if num_depot_blocks > sectors || num_extension_blocks > sectors {
            return Err(SheetError::InvalidFormat(format!(
                "Header claims {} depot and {} extension sectors in a file of {} sectors",
                num_depot_blocks, num_extension_blocks, sectors
            )));
        }

        let in_header = if num_extension_blocks != 0 {
            HEADER_DEPOT_SLOTS
        } else {
            num_depot_blocks.min(HEADER_DEPOT_SLOTS)
        };

        let mut blocks = Vec::with_capacity(num_depot_blocks);
        for i in 0..in_header {
            blocks.push(read_int4(data, BIG_BLOCK_DEPOT_BLOCKS_POS + i * 4)?);
        }

        for _ in 0..num_extension_blocks {
            if blocks.len() >= num_depot_blocks {
                break;
            }
            let mut pos = sector_offset(extension_block)?;
            let to_read = (num_depot_blocks - blocks.len()).min(EXTENSION_DEPOT_SLOTS);
            for _ in 0..to_read {
                blocks.push(read_int4(data, pos)?);
                pos += 4;
            }
            if blocks.len() < num_depot_blocks {
                extension_block = read_int4(data, pos)?;
            }
        }

        Ok(blocks)
    }

    /// Follow the big block chain from `start`, concatenating whole sectors
    fn read_big_chain(&self, start: i64) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut guard = ChainGuard::new(self.big_block_chain.len());
        let mut block = start;
        while block != END_OF_CHAIN {
            guard.step("big block")?;
            let pos = sector_offset(block)?;
            let sector = self.data.get(pos..).ok_or_else(|| {
                SheetError::InvalidFormat(format!("Sector {} beyond end of file", block))
            })?;
            out.extend_from_slice(&sector[..sector.len().min(BIG_BLOCK_SIZE)]);
            block = chain_next(&self.big_block_chain, block)?;
        }
        Ok(out)
    }

    /// Follow the small block chain from `start` over the root entry's stream
    fn read_small_chain(&self, start: i64, root_data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut guard = ChainGuard::new(self.small_block_chain.len());
        let mut block = start;
        while block != END_OF_CHAIN {
            guard.step("small block")?;
            let pos = usize::try_from(block)
                .map_err(|_| SheetError::InvalidFormat(format!("Bad small block {}", block)))?
                * SMALL_BLOCK_SIZE;
            let chunk = root_data.get(pos..).ok_or_else(|| {
                SheetError::InvalidFormat(format!("Small block {} beyond root stream", block))
            })?;
            out.extend_from_slice(&chunk[..chunk.len().min(SMALL_BLOCK_SIZE)]);
            block = chain_next(&self.small_block_chain, block)?;
        }
        Ok(out)
    }

    fn read_property_sets(&mut self, directory: &[u8]) -> Result<()> {
        for record in directory.chunks_exact(PROPERTY_STORAGE_BLOCK_SIZE) {
            let name_size = u16::from_le_bytes([record[SIZE_OF_NAME_POS], record[SIZE_OF_NAME_POS + 1]])
                as usize;
            let name_bytes = &record[..name_size.min(SIZE_OF_NAME_POS)];
            let units: Vec<u16> = name_bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .filter(|&u| u != 0)
                .collect();

            let entry = DirectoryEntry {
                name: String::from_utf16_lossy(&units),
                entry_type: record[TYPE_POS],
                start_sector: read_int4(record, START_BLOCK_POS)?,
                size: u32::from_le_bytes([
                    record[SIZE_POS],
                    record[SIZE_POS + 1],
                    record[SIZE_POS + 2],
                    record[SIZE_POS + 3],
                ]),
            };

            let lower = entry.name.to_lowercase();
            if self.workbook.is_none() && (lower == "workbook" || lower == "book") {
                self.workbook = Some(self.entries.len());
            }
            if self.root.is_none() && entry.name == "Root Entry" {
                self.root = Some(self.entries.len());
            }
            self.entries.push(entry);
        }
        Ok(())
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    /// Bytes of the workbook stream, truncated to the declared size
    pub fn workbook_stream(&self) -> Result<Vec<u8>> {
        let entry = self
            .workbook
            .and_then(|i| self.entries.get(i))
            .ok_or_else(|| {
                SheetError::InvalidFormat("No Workbook or Book stream in compound file".to_string())
            })?;

        let size = entry.size as usize;
        let mut stream = if size < SMALL_BLOCK_THRESHOLD {
            let root = self
                .root
                .and_then(|i| self.entries.get(i))
                .ok_or_else(|| {
                    SheetError::InvalidFormat("Compound file has no Root Entry".to_string())
                })?;
            let root_data = self.read_big_chain(root.start_sector)?;
            self.read_small_chain(entry.start_sector, &root_data)?
        } else {
            self.read_big_chain(entry.start_sector)?
        };

        if stream.len() < size {
            return Err(SheetError::InvalidFormat(format!(
                "Workbook stream holds {} of {} declared bytes",
                stream.len(),
                size
            )));
        }
        stream.truncate(size);
        Ok(stream)
    }
}

/// Non-negative count field of the header
fn read_count(data: &[u8], pos: usize) -> Result<usize> {
    let value = read_int4(data, pos)?;
    usize::try_from(value)
        .map_err(|_| SheetError::InvalidFormat(format!("Bad header count at 0x{:x}", pos)))
}

/// Byte offset of big block `block`, skipping the header sector
fn sector_offset(block: i64) -> Result<usize> {
    usize::try_from(block)
        .ok()
        .and_then(|b| b.checked_add(1))
        .and_then(|b| b.checked_mul(BIG_BLOCK_SIZE))
        .ok_or_else(|| SheetError::InvalidFormat(format!("Bad sector index {}", block)))
}

fn chain_next(chain: &[i64], block: i64) -> Result<i64> {
    usize::try_from(block)
        .ok()
        .and_then(|b| chain.get(b))
        .copied()
        .ok_or_else(|| SheetError::InvalidFormat(format!("Sector {} outside allocation table", block)))
}

/// Bounds the number of steps of a chain walk so cycles fail instead of spinning
struct ChainGuard {
    remaining: usize,
}

impl ChainGuard {
    fn new(chain_len: usize) -> Self {
        ChainGuard {
            remaining: chain_len + 1,
        }
    }

    fn step(&mut self, what: &str) -> Result<()> {
        if self.remaining == 0 {
            return Err(SheetError::InvalidFormat(format!(
                "{} chain does not terminate",
                what
            )));
        }
        self.remaining -= 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_read_int4_sentinel() {
        assert_eq!(read_int4(&[0xFF, 0xFF, 0xFF, 0xFF], 0).unwrap(), -2);
        assert_eq!(read_int4(&[0xFE, 0xFF, 0xFF, 0xFF], 0).unwrap(), -2);
        assert_eq!(read_int4(&[0xFD, 0xFF, 0xFF, 0xFF], 0).unwrap(), 0xFFFF_FFFD);
        assert_eq!(read_int4(&[0x01, 0x02, 0x00, 0x00, 0x00], 1).unwrap(), 2);
        assert!(read_int4(&[0x01, 0x02], 0).is_err());
    }

    #[test]
    fn test_bad_signature() {
        let mut data = vec![0u8; 1024];
        data[..4].copy_from_slice(b"PK\x03\x04");
        let err = CompoundFile::open(data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);

        let err = CompoundFile::open(vec![0xD0, 0xCF]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    fn put_u32(data: &mut [u8], pos: usize, value: u32) {
        data[pos..pos + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Write directory entry `slot` of the directory sector starting at `dir`
    fn put_entry(
        data: &mut [u8],
        dir: usize,
        slot: usize,
        name: &str,
        kind: u8,
        start: u32,
        size: u32,
    ) {
        let base = dir + slot * PROPERTY_STORAGE_BLOCK_SIZE;
        let units: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
        for (i, u) in units.iter().enumerate() {
            data[base + i * 2..base + i * 2 + 2].copy_from_slice(&u.to_le_bytes());
        }
        data[base + SIZE_OF_NAME_POS..base + SIZE_OF_NAME_POS + 2]
            .copy_from_slice(&((units.len() * 2) as u16).to_le_bytes());
        data[base + TYPE_POS] = kind;
        put_u32(data, base + START_BLOCK_POS, start);
        put_u32(data, base + SIZE_POS, size);
    }

    /// Header + FAT sector + directory sector + one data sector
    fn tiny_compound_file(stream: &[u8]) -> Vec<u8> {
        let mut data = vec![0u8; BIG_BLOCK_SIZE * 4];
        data[..8].copy_from_slice(&SIGNATURE);
        data[NUM_BIG_BLOCK_DEPOT_BLOCKS_POS..NUM_BIG_BLOCK_DEPOT_BLOCKS_POS + 4]
            .copy_from_slice(&1u32.to_le_bytes());
        data[ROOT_START_BLOCK_POS..ROOT_START_BLOCK_POS + 4].copy_from_slice(&1u32.to_le_bytes());
        data[SMALL_BLOCK_DEPOT_BLOCK_POS..SMALL_BLOCK_DEPOT_BLOCK_POS + 4]
            .copy_from_slice(&0xFFFF_FFFEu32.to_le_bytes());
        data[EXTENSION_BLOCK_POS..EXTENSION_BLOCK_POS + 4]
            .copy_from_slice(&0xFFFF_FFFEu32.to_le_bytes());
        for i in 0..HEADER_DEPOT_SLOTS {
            let pos = BIG_BLOCK_DEPOT_BLOCKS_POS + i * 4;
            data[pos..pos + 4].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        }
        data[BIG_BLOCK_DEPOT_BLOCKS_POS..BIG_BLOCK_DEPOT_BLOCKS_POS + 4]
            .copy_from_slice(&0u32.to_le_bytes());

        // FAT in sector 0: 0 = FAT, 1 = directory, 2 = workbook
        let fat = BIG_BLOCK_SIZE;
        for i in 0..BIG_BLOCK_SIZE / 4 {
            data[fat + i * 4..fat + i * 4 + 4].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        }
        data[fat..fat + 4].copy_from_slice(&0xFFFF_FFFDu32.to_le_bytes());
        data[fat + 4..fat + 8].copy_from_slice(&0xFFFF_FFFEu32.to_le_bytes());
        data[fat + 8..fat + 12].copy_from_slice(&0xFFFF_FFFEu32.to_le_bytes());

        let dir = BIG_BLOCK_SIZE * 2;
        put_entry(&mut data, dir, 0, "Root Entry", 5, 0xFFFF_FFFE, 0);
        // large enough to bypass the small block path
        put_entry(&mut data, dir, 1, "Workbook", 2, 2, SMALL_BLOCK_THRESHOLD as u32);

        let body = BIG_BLOCK_SIZE * 3;
        data[body..body + stream.len()].copy_from_slice(stream);
        data
    }

    #[test]
    fn test_directory_and_declared_size_check() {
        let file = CompoundFile::open(tiny_compound_file(b"\x09\x08")).unwrap();
        let names: Vec<_> = file.entries().iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"Root Entry"));
        assert!(names.contains(&"Workbook"));

        // declared size exceeds the single sector in the chain
        let err = file.workbook_stream().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_cyclic_chain_is_rejected() {
        let mut data = tiny_compound_file(b"");
        // directory sector points at itself
        let fat = BIG_BLOCK_SIZE;
        data[fat + 4..fat + 8].copy_from_slice(&1u32.to_le_bytes());
        let err = CompoundFile::open(data).unwrap_err();
        assert!(err.to_string().contains("does not terminate"));
    }

    #[test]
    fn test_huge_depot_count_rejected() {
        let mut data = tiny_compound_file(b"");
        put_u32(&mut data, NUM_BIG_BLOCK_DEPOT_BLOCKS_POS, 0x7FFF_FFFF);
        let err = CompoundFile::open(data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);

        let mut data = tiny_compound_file(b"");
        put_u32(&mut data, NUM_EXTENSION_BLOCK_POS, 0x7FFF_FFFF);
        let err = CompoundFile::open(data).unwrap_err();
        assert!(matches!(err, SheetError::InvalidFormat(_)));
    }

    #[test]
    fn test_depot_listed_in_extension_sector() {
        // 110 FAT sectors: 109 listed in the header, the last one in an extension
        // sector. The workbook's final sector sits beyond what the first 109 cover.
        const FAT_SECTORS: usize = HEADER_DEPOT_SLOTS + 1;
        const ENTRIES_PER_SECTOR: usize = BIG_BLOCK_SIZE / 4;
        let extension = FAT_SECTORS;
        let directory = extension + 1;
        let first_data = directory + 1;
        let far_sector = HEADER_DEPOT_SLOTS * ENTRIES_PER_SECTOR + 48;
        let data_sectors: Vec<usize> = (first_data..first_data + 7)
            .chain(std::iter::once(far_sector))
            .collect();

        let mut data = vec![0u8; BIG_BLOCK_SIZE * (far_sector + 2)];
        data[..8].copy_from_slice(&SIGNATURE);
        put_u32(&mut data, NUM_BIG_BLOCK_DEPOT_BLOCKS_POS, FAT_SECTORS as u32);
        put_u32(&mut data, ROOT_START_BLOCK_POS, directory as u32);
        put_u32(&mut data, SMALL_BLOCK_DEPOT_BLOCK_POS, 0xFFFF_FFFE);
        put_u32(&mut data, EXTENSION_BLOCK_POS, extension as u32);
        put_u32(&mut data, NUM_EXTENSION_BLOCK_POS, 1);
        for i in 0..HEADER_DEPOT_SLOTS {
            put_u32(&mut data, BIG_BLOCK_DEPOT_BLOCKS_POS + i * 4, i as u32);
        }

        let ext = (extension + 1) * BIG_BLOCK_SIZE;
        for i in 0..ENTRIES_PER_SECTOR {
            put_u32(&mut data, ext + i * 4, 0xFFFF_FFFF);
        }
        put_u32(&mut data, ext, HEADER_DEPOT_SLOTS as u32);
        put_u32(&mut data, ext + EXTENSION_DEPOT_SLOTS * 4, 0xFFFF_FFFE);

        // FAT entry for sector n lives in FAT sector n / 128
        let set_fat = |data: &mut Vec<u8>, sector: usize, value: u32| {
            let fat_sector = sector / ENTRIES_PER_SECTOR;
            let pos = (fat_sector + 1) * BIG_BLOCK_SIZE + (sector % ENTRIES_PER_SECTOR) * 4;
            put_u32(data, pos, value);
        };
        for fat_sector in 0..FAT_SECTORS {
            for i in 0..ENTRIES_PER_SECTOR {
                set_fat(&mut data, fat_sector * ENTRIES_PER_SECTOR + i, 0xFFFF_FFFF);
            }
        }
        for sector in 0..FAT_SECTORS {
            set_fat(&mut data, sector, 0xFFFF_FFFD);
        }
        set_fat(&mut data, extension, 0xFFFF_FFFC);
        set_fat(&mut data, directory, 0xFFFF_FFFE);
        for pair in data_sectors.windows(2) {
            set_fat(&mut data, pair[0], pair[1] as u32);
        }
        set_fat(&mut data, far_sector, 0xFFFF_FFFE);

        let dir = (directory + 1) * BIG_BLOCK_SIZE;
        let size = data_sectors.len() * BIG_BLOCK_SIZE;
        put_entry(&mut data, dir, 0, "Root Entry", 5, 0xFFFF_FFFE, 0);
        put_entry(&mut data, dir, 1, "Workbook", 2, first_data as u32, size as u32);

        let stream: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        for (chunk, &sector) in stream.chunks(BIG_BLOCK_SIZE).zip(&data_sectors) {
            let pos = (sector + 1) * BIG_BLOCK_SIZE;
            data[pos..pos + chunk.len()].copy_from_slice(chunk);
        }

        let file = CompoundFile::open(data).unwrap();
        assert_eq!(file.workbook_stream().unwrap(), stream);
    }
}
