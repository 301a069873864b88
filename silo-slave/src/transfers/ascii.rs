//! ASCII mode line ending conversion

/// Expands bare LF to CRLF across chunk boundaries
#[derive(Debug, Default)]
pub struct AsciiEncoder {
    last: Option<u8>,
}

impl AsciiEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the converted form of `input` to `out`
    pub fn encode(&mut self, input: &[u8], out: &mut Vec<u8>) {
        out.reserve(input.len() + input.len() / 16);
        for &byte in input {
            if byte == b'\n' && self.last != Some(b'\r') {
                out.push(b'\r');
            }
            out.push(byte);
            self.last = Some(byte);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(chunks: &[&[u8]]) -> Vec<u8> {
        let mut encoder = AsciiEncoder::new();
        let mut out = Vec::new();
        for chunk in chunks {
            encoder.encode(chunk, &mut out);
        }
        out
    }

    #[test]
    fn test_expands_lf() {
        assert_eq!(encode(&[b"a\nb\n"]), b"a\r\nb\r\n");
    }

    #[test]
    fn test_keeps_existing_crlf() {
        assert_eq!(encode(&[b"a\r\nb"]), b"a\r\nb");
    }

    #[test]
    fn test_crlf_split_across_chunks() {
        assert_eq!(encode(&[b"a\r", b"\nb\n"]), b"a\r\nb\r\n");
    }

    #[test]
    fn test_leading_lf() {
        assert_eq!(encode(&[b"\n\n"]), b"\r\n\r\n");
    }
}
