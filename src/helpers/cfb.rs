//! OLE Compound File Binary reader used to reach the `Workbook` stream of `.xls` files.
//! The whole container is loaded in memory; government exports are small enough for that.

use crate::error::Result;
use crate::helpers::bytes::le_u16;
use crate::helpers::bytes::le_u64;
use crate::helpers::bytes::le_usize;
use crate::helpers::bytes::le_usize_iter;
use encoding_rs::UTF_16LE;
use std::collections::HashMap;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use thiserror::Error;

/// Sector ids above this value are markers (free, end of chain, FAT, DIFAT).
const MAX_REG_SECT: usize = 0xFFFF_FFFA;
const SIGNATURE: u64 = 0xE11A_B1A1_E011_CFD0;
const MINI_STREAM_CUTOFF: usize = 4096;
const MINI_SECTOR_SIZE: usize = 64;
const HEADER_SIZE: usize = 512;

#[derive(Error, Debug)]
pub enum CfbError {
    #[error("The file is corrupted or has an invalid CFB structure")]
    FileFormatError,

    #[error("Invalid OLE signature (not an office document?)")]
    OleSignatureError,

    #[error("Invalid sector size '2 ^ {1}' for major version '{0}'")]
    SectorSizeError(u16, u16),

    #[error("Sector chain starting at {0} is broken")]
    SectorChainError(usize),

    #[error("Empty root directory")]
    RootDirectoryError,
}

/// Stream location inside the container.
#[derive(Debug, Clone, Copy)]
struct Entry {
    start: usize,
    size: usize,
}

/// Sector store; sector `n` begins right after the header-sized slot `n + 1`.
struct Sectors {
    data: Vec<u8>,
    size: usize,
    offset: usize,
}

impl Sectors {
    fn get(&self, index: usize) -> Option<&[u8]> {
        let lower = self.offset + index * self.size;
        if lower >= self.data.len() {
            return None;
        }
        let upper = self.data.len().min(lower + self.size);
        Some(&self.data[lower..upper])
    }

    /// Follows `table` from `start`, concatenating every visited sector.
    fn chain(&self, table: &[usize], start: usize) -> Result<Vec<u8>> {
        let mut content = Vec::new();
        let mut index = start;
        let mut visited = 0usize;
        while index <= MAX_REG_SECT {
            let sector = self.get(index).ok_or(CfbError::SectorChainError(start))?;
            content.extend_from_slice(sector);
            visited += 1;
            if visited > table.len() {
                Err(CfbError::SectorChainError(start))?;
            }
            index = *table.get(index).ok_or(CfbError::SectorChainError(start))?;
        }
        Ok(content)
    }
}

/// Parsed compound file with named streams.
pub(crate) struct Cfb {
    entries: HashMap<String, Entry>,
    fat: Vec<usize>,
    sectors: Sectors,
    mini_fat: Vec<usize>,
    mini_sectors: Sectors,
}

impl Cfb {
    pub(crate) fn new<RS: Read + Seek>(reader: &mut RS) -> Result<Cfb> {
        let size = reader.seek(SeekFrom::End(0))? as usize;
        if size < HEADER_SIZE {
            Err(CfbError::FileFormatError)?;
        }
        reader.seek(SeekFrom::Start(0))?;
        let mut data = vec![0u8; size];
        reader.read_exact(&mut data)?;

        if le_u64(&data[0..8]) != SIGNATURE {
            Err(CfbError::OleSignatureError)?;
        }
        let major_version = le_u16(&data[26..28]);
        let sector_shift = le_u16(&data[30..32]);
        let sector_size = match (major_version, sector_shift) {
            (3, 9) => 512,
            (4, 12) => 4096,
            _ => Err(CfbError::SectorSizeError(major_version, sector_shift))?,
        };
        let directory_start = le_usize(&data[48..52]);
        let mini_fat_start = le_usize(&data[60..64]);
        let mini_fat_count = le_usize(&data[64..68]);
        let mut difat_next = le_usize(&data[68..72]);

        // The header carries the first 109 FAT sector ids, extra ones live in DIFAT sectors.
        let mut fat_sectors: Vec<usize> = le_usize_iter(&data[76..HEADER_SIZE]).collect();
        let sectors = Sectors {
            data,
            size: sector_size,
            offset: sector_size,
        };
        let mut hops = 0usize;
        while difat_next <= MAX_REG_SECT {
            let sector = sectors.get(difat_next).ok_or(CfbError::FileFormatError)?;
            let mut ids: Vec<usize> = le_usize_iter(sector).collect();
            difat_next = ids.pop().ok_or(CfbError::FileFormatError)?;
            fat_sectors.extend(ids);
            hops += 1;
            if hops > sectors.data.len() / sector_size {
                Err(CfbError::FileFormatError)?;
            }
        }

        let mut fat = Vec::new();
        for id in fat_sectors.into_iter().filter(|id| *id <= MAX_REG_SECT) {
            let sector = sectors.get(id).ok_or(CfbError::FileFormatError)?;
            fat.extend(le_usize_iter(sector));
        }

        let entries = load_entries(&sectors.chain(&fat, directory_start)?)?;
        let mini_fat = if mini_fat_count > 0 {
            le_usize_iter(&sectors.chain(&fat, mini_fat_start)?).collect()
        } else {
            Vec::new()
        };
        let mini_data = match entries.get("Root Entry") {
            Some(root) => {
                let mut stream = sectors.chain(&fat, root.start)?;
                stream.truncate(root.size);
                stream
            }
            None => Vec::new(),
        };

        Ok(Cfb {
            entries,
            fat,
            sectors,
            mini_fat,
            mini_sectors: Sectors {
                data: mini_data,
                size: MINI_SECTOR_SIZE,
                offset: 0,
            },
        })
    }

    pub(crate) fn exists(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns the content of stream `name`, or `None` when it is absent.
    pub(crate) fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let Some(entry) = self.entries.get(name) else {
            return Ok(None);
        };
        let mut bytes = if entry.size < MINI_STREAM_CUTOFF {
            self.mini_sectors.chain(&self.mini_fat, entry.start)?
        } else {
            self.sectors.chain(&self.fat, entry.start)?
        };
        bytes.truncate(entry.size);
        Ok(Some(bytes))
    }
}

/// Directory entries are 128 bytes: UTF-16 name, name length at 64, start sector at 116, size at 120.
fn load_entries(bytes: &[u8]) -> Result<HashMap<String, Entry>> {
    let entries: HashMap<String, Entry> = bytes
        .chunks_exact(128)
        .map(|raw| {
            let length = (le_u16(&raw[64..66]) as usize).min(64);
            let (name, _, _) = UTF_16LE.decode(&raw[..length]);
            let name = name.trim_end_matches('\0').to_owned();
            let entry = Entry {
                start: le_usize(&raw[116..120]),
                size: le_u64(&raw[120..128]) as usize,
            };
            (name, entry)
        })
        .filter(|(name, _)| !name.is_empty())
        .collect();
    if entries.is_empty() {
        Err(CfbError::RootDirectoryError)?
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_reject_small_file() {
        let mut reader = Cursor::new(vec![0u8; 100]);
        assert!(Cfb::new(&mut reader).is_err());
    }

    #[test]
    fn test_reject_bad_signature() {
        let mut reader = Cursor::new(vec![0u8; 1024]);
        let result = Cfb::new(&mut reader);
        assert!(matches!(
            result,
            Err(crate::error::CrawlerError::CfbHelperError(CfbError::OleSignatureError))
        ));
    }
}
