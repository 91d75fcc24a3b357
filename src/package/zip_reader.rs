//! Minimal ZIP reader for spreadsheet packages
//!
//! Reads the central directory once, then hands out members either fully
//! decompressed (small parts such as `workbook.xml`) or as a streaming
//! decompressor that can be copied straight to disk (worksheets, shared
//! strings, `content.xml`).

use crate::error::{Result, SheetError};
use flate2::read::DeflateDecoder;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// ZIP local file header signature
const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;

/// ZIP central directory signature
const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x02014b50;

/// ZIP end of central directory signature
const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06054b50;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATE: u16 = 8;

/// Entry in the ZIP central directory
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub name: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub compression_method: u16,
    pub offset: u64,
}

/// Read-only view of a package archive
pub struct PackageArchive {
    file: BufReader<File>,
    entries: Vec<ZipEntry>,
}

impl PackageArchive {
    /// Open a ZIP file and read its central directory
    ///
    /// Any failure (missing file, truncated archive, not a zip at all) is
    /// reported as [`SheetError::ZipNotReadable`] with the underlying status.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        Self::open_inner(path).map_err(|e| SheetError::ZipNotReadable {
            path: path.display().to_string(),
            status: e.to_string(),
        })
    }

    fn open_inner(path: &Path) -> Result<Self> {
        let mut file = BufReader::new(File::open(path)?);
        let entries = Self::read_central_directory(&mut file)?;
        Ok(PackageArchive { file, entries })
    }

    /// Get list of all entries in the ZIP
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Find an entry by name
    pub fn find_entry(&self, name: &str) -> Option<&ZipEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find_entry(name).is_some()
    }

    /// Read a member fully into memory
    pub fn read_part(&mut self, name: &str) -> Result<Vec<u8>> {
        let entry = self.entry_or_missing(name)?;
        let mut reader = self.open_entry(&entry)?;
        let mut data = Vec::with_capacity(entry.uncompressed_size as usize);
        reader.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Decompress a member into `dest` without buffering it in memory
    pub fn extract_part(&mut self, name: &str, dest: &Path) -> Result<u64> {
        let entry = self.entry_or_missing(name)?;
        let mut reader = self.open_entry(&entry)?;
        let mut out = File::create(dest)?;
        let written = std::io::copy(&mut reader, &mut out)?;
        log::trace!("Extracted '{}' ({} bytes) to {}", name, written, dest.display());
        Ok(written)
    }

    fn entry_or_missing(&self, name: &str) -> Result<ZipEntry> {
        self.find_entry(name)
            .cloned()
            .ok_or_else(|| SheetError::PartMissing {
                part: name.to_string(),
            })
    }

    /// Position the file at the entry's data and wrap it in a decompressor
    fn open_entry(&mut self, entry: &ZipEntry) -> Result<Box<dyn Read + '_>> {
        self.file.seek(SeekFrom::Start(entry.offset))?;

        let signature = read_u32_le(&mut self.file)?;
        if signature != LOCAL_FILE_HEADER_SIGNATURE {
            return Err(SheetError::InvalidFormat(format!(
                "Invalid local file header signature for '{}'",
                entry.name
            )));
        }

        // version, flags, method, time, date, CRC-32, both sizes: the central
        // directory already told us what we need
        self.file.seek(SeekFrom::Current(22))?;

        let filename_len = read_u16_le(&mut self.file)? as i64;
        let extra_len = read_u16_le(&mut self.file)? as i64;
        self.file.seek(SeekFrom::Current(filename_len + extra_len))?;

        let limited_reader = (&mut self.file).take(entry.compressed_size);

        match entry.compression_method {
            METHOD_DEFLATE => Ok(Box::new(DeflateDecoder::new(limited_reader))),
            METHOD_STORED => Ok(Box::new(limited_reader)),
            method => Err(SheetError::NotSupported(format!(
                "Compression method {} for '{}'",
                method, entry.name
            ))),
        }
    }

    /// Read the central directory from the ZIP file
    fn read_central_directory(file: &mut BufReader<File>) -> Result<Vec<ZipEntry>> {
        let eocd_offset = Self::find_eocd(file)?;
        file.seek(SeekFrom::Start(eocd_offset))?;

        let signature = read_u32_le(file)?;
        if signature != END_OF_CENTRAL_DIRECTORY_SIGNATURE {
            return Err(SheetError::InvalidFormat(format!(
                "Invalid end of central directory signature: 0x{:08x}",
                signature
            )));
        }

        // Skip disk number fields and entries on this disk
        file.seek(SeekFrom::Current(6))?;
        let total_entries = read_u16_le(file)? as usize;
        let _cd_size = read_u32_le(file)?;
        let cd_offset = read_u32_le(file)? as u64;

        file.seek(SeekFrom::Start(cd_offset))?;

        let mut entries = Vec::with_capacity(total_entries);
        for _ in 0..total_entries {
            let signature = read_u32_le(file)?;
            if signature != CENTRAL_DIRECTORY_SIGNATURE {
                break;
            }

            // Skip version made by, version needed, flags
            file.seek(SeekFrom::Current(6))?;

            let compression_method = read_u16_le(file)?;

            // Skip modification time, date, CRC-32
            file.seek(SeekFrom::Current(8))?;

            let compressed_size = read_u32_le(file)? as u64;
            let uncompressed_size = read_u32_le(file)? as u64;
            let filename_len = read_u16_le(file)? as usize;
            let extra_len = read_u16_le(file)? as usize;
            let comment_len = read_u16_le(file)? as usize;

            // Skip disk number, internal attributes, external attributes
            file.seek(SeekFrom::Current(8))?;

            let offset = read_u32_le(file)? as u64;

            let mut filename_buf = vec![0u8; filename_len];
            file.read_exact(&mut filename_buf)?;
            let name = String::from_utf8_lossy(&filename_buf).to_string();

            file.seek(SeekFrom::Current((extra_len + comment_len) as i64))?;

            entries.push(ZipEntry {
                name,
                compressed_size,
                uncompressed_size,
                compression_method,
                offset,
            });
        }

        log::trace!("Central directory lists {} entries", entries.len());
        Ok(entries)
    }

    /// Find the end of central directory record by scanning from the end of the file
    fn find_eocd(file: &mut BufReader<File>) -> Result<u64> {
        let file_size = file.seek(SeekFrom::End(0))?;

        // EOCD is at least 22 bytes, search last 65KB (max comment size + EOCD)
        let search_start = file_size.saturating_sub(65557);
        file.seek(SeekFrom::Start(search_start))?;

        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;

        buffer
            .windows(4)
            .rposition(|w| w == END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes())
            .map(|i| search_start + i as u64)
            .ok_or_else(|| {
                SheetError::InvalidFormat("End of central directory not found".to_string())
            })
    }
}

fn read_u16_le<R: Read>(reader: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32_le<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}
