use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use tracing::warn;

use super::record::HEADER_LEN;
use crate::Result;
use crate::layout::parse_thread_file;

/// Top-level metadata files of a native capture directory
#[derive(Debug, Default)]
pub struct SeaMetadata {
    /// `<handle>.str`
    pub strings: HashMap<u64, String>,
    /// `<tid>.tid` or `<pid>,<tid>.tid`
    pub threads: BTreeMap<i64, String>,
    /// `<pid>.pid` (named pseudo processes)
    pub processes: BTreeMap<i64, String>,
}

pub fn read_sea_metadata(root: &Path) -> Result<SeaMetadata> {
    let mut meta = SeaMetadata::default();

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let (Some(stem), Some(ext)) = (
            path.file_stem().and_then(|s| s.to_str()),
            path.extension().and_then(|s| s.to_str()),
        ) else {
            continue;
        };

        match ext {
            "str" => match stem.parse::<u64>() {
                Ok(handle) => {
                    meta.strings.insert(handle, read_first_line(&path)?);
                }
                Err(_) => warn!(file = %path.display(), "string file with a non-numeric handle"),
            },
            "tid" => match parse_thread_file(stem) {
                Some(tid) => {
                    meta.threads.insert(tid, read_first_line(&path)?);
                }
                None => warn!(file = %path.display(), "unrecognised thread name file"),
            },
            "pid" => match stem.parse::<i64>() {
                Ok(pid) => {
                    meta.processes.insert(pid, read_first_line(&path)?);
                }
                Err(_) => warn!(file = %path.display(), "unrecognised process name file"),
            },
            _ => {}
        }
    }

    Ok(meta)
}

fn read_first_line(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path)?;
    Ok(content.lines().next().unwrap_or_default().to_string())
}

/// Timestamp of the first record, or None when the file holds no records
pub fn peek_first_timestamp(path: &Path) -> Result<Option<u64>> {
    let mut file = File::open(path)?;
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = file.read(&mut header[filled..])?;
        if n == 0 {
            return Ok(None);
        }
        filled += n;
    }
    if header.iter().all(|b| *b == 0) {
        return Ok(None);
    }
    let mut time = [0u8; 8];
    time.copy_from_slice(&header[..8]);
    Ok(Some(u64::from_le_bytes(time)))
}
