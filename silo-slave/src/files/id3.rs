//! ID3v1 tag reading

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use silo_common::protocol::Id3Tag;

const TAG_SIZE: u64 = 128;
const TAG_MAGIC: &[u8; 3] = b"TAG";

/// Read the trailing ID3v1 tag; `Ok(None)` when the file has none
pub fn read_id3(path: &Path) -> io::Result<Option<Id3Tag>> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len < TAG_SIZE {
        return Ok(None);
    }

    file.seek(SeekFrom::End(-(TAG_SIZE as i64)))?;
    let mut block = [0u8; TAG_SIZE as usize];
    file.read_exact(&mut block)?;
    Ok(parse_id3(&block))
}

/// Decode a 128-byte ID3v1 block
pub fn parse_id3(block: &[u8; 128]) -> Option<Id3Tag> {
    if &block[..3] != TAG_MAGIC {
        return None;
    }

    let comment = &block[97..127];
    // ID3v1.1 stores the track in the last comment byte after a zero
    let (comment, track) = if comment[28] == 0 && comment[29] != 0 {
        (&comment[..28], Some(comment[29]))
    } else {
        (comment, None)
    };

    Some(Id3Tag {
        title: text(&block[3..33]),
        artist: text(&block[33..63]),
        album: text(&block[63..93]),
        year: text(&block[93..97]),
        comment: text(comment),
        genre: block[127],
        track,
    })
}

/// Latin-1 field with NUL padding and trailing spaces removed
fn text(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    field[..end]
        .iter()
        .map(|&b| char::from(b))
        .collect::<String>()
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(title: &str, comment: &[u8], genre: u8) -> [u8; 128] {
        let mut block = [0u8; 128];
        block[..3].copy_from_slice(b"TAG");
        block[3..3 + title.len()].copy_from_slice(title.as_bytes());
        block[33..39].copy_from_slice(b"Artist");
        block[63..68].copy_from_slice(b"Album");
        block[93..97].copy_from_slice(b"1999");
        block[97..97 + comment.len()].copy_from_slice(comment);
        block[127] = genre;
        block
    }

    #[test]
    fn test_parse_v1() {
        let tag = parse_id3(&block("Song   ", b"nice", 17)).unwrap();
        assert_eq!(tag.title, "Song");
        assert_eq!(tag.artist, "Artist");
        assert_eq!(tag.album, "Album");
        assert_eq!(tag.year, "1999");
        assert_eq!(tag.comment, "nice");
        assert_eq!(tag.genre, 17);
        assert_eq!(tag.track, None);
    }

    #[test]
    fn test_parse_v1_1_track() {
        let mut comment = [0u8; 30];
        comment[..2].copy_from_slice(b"hi");
        comment[29] = 7;
        let tag = parse_id3(&block("T", &comment, 0)).unwrap();
        assert_eq!(tag.comment, "hi");
        assert_eq!(tag.track, Some(7));
    }

    #[test]
    fn test_latin1() {
        let mut b = block("", b"", 0);
        b[3] = 0xE9;
        assert_eq!(parse_id3(&b).unwrap().title, "é");
    }

    #[test]
    fn test_no_tag() {
        assert!(parse_id3(&[0u8; 128]).is_none());
    }

    #[test]
    fn test_read_from_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("song.mp3");
        let mut data = vec![0xFFu8; 1000];
        data.extend_from_slice(&block("Tagged", b"", 3));
        std::fs::write(&path, &data).unwrap();

        let tag = read_id3(&path).unwrap().unwrap();
        assert_eq!(tag.title, "Tagged");

        let short = temp.path().join("short.mp3");
        std::fs::write(&short, b"tiny").unwrap();
        assert!(read_id3(&short).unwrap().is_none());
    }
}
