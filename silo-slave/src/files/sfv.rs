//! SFV checksum lists
//!
//! One `<file name> <crc32 hex>` per line. Lines starting with `;` are
//! comments. The CRC is the last whitespace-separated field, so file names
//! may contain spaces.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

/// Parse SFV text into file name → CRC32
pub fn parse_sfv(text: &str) -> BTreeMap<String, u32> {
    let mut entries = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }
        let Some((name, crc)) = line.rsplit_once(char::is_whitespace) else {
            tracing::debug!(line, "Skipping SFV line without checksum");
            continue;
        };
        let name = name.trim_end();
        if name.is_empty() || crc.is_empty() || crc.len() > 8 {
            tracing::debug!(line, "Skipping malformed SFV line");
            continue;
        }
        match u32::from_str_radix(crc, 16) {
            Ok(crc) => {
                entries.insert(name.to_string(), crc);
            }
            Err(_) => tracing::debug!(line, "Skipping malformed SFV line"),
        }
    }
    entries
}

/// Read and parse an SFV file
pub fn read_sfv(path: &Path) -> io::Result<BTreeMap<String, u32>> {
    let bytes = std::fs::read(path)?;
    Ok(parse_sfv(&String::from_utf8_lossy(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sfv() {
        let text = "; generated by a tool\r\n\
                    ; another comment\n\
                    \n\
                    track01.mp3 0a1B2c3D\n\
                    my song.mp3 FFFFFFFF\n";
        let entries = parse_sfv(text);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries["track01.mp3"], 0x0A1B_2C3D);
        assert_eq!(entries["my song.mp3"], 0xFFFF_FFFF);
    }

    #[test]
    fn test_skips_garbage() {
        let entries = parse_sfv("nochecksum\nfile.bin zzzz\nfile2.bin 123456789\nok.bin 1\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries["ok.bin"], 1);
    }

    #[test]
    fn test_read_sfv() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("release.sfv");
        std::fs::write(&path, b"a.r00 00000001\n").unwrap();
        assert_eq!(read_sfv(&path).unwrap()["a.r00"], 1);
    }
}
