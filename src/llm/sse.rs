//! Line segmentation for upstream `text/event-stream` bodies.
//!
//! Network chunks do not respect event boundaries: a `data:` line (or a
//! multi-byte character inside it) can be split across two reads. The decoder
//! keeps only the unfinished tail of the last line between pushes.

#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns the payloads of every `data:` line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.strip_prefix(' ').unwrap_or(data);
                payloads.push(data.to_string());
            }
        }
        payloads
    }

    /// Bytes received after the last newline.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_data_lines_and_skips_event_names() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b"event: response.output_text.delta\ndata: {\"a\":1}\n\n");
        assert_eq!(out, vec![r#"{"a":1}"#.to_string()]);
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn reassembles_lines_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"delta\":\"Hel").is_empty());
        let out = decoder.push(b"lo\"}\r\n\r\ndata: [DONE]\n");
        assert_eq!(out, vec![r#"{"delta":"Hello"}"#.to_string(), "[DONE]".to_string()]);
    }

    #[test]
    fn keeps_multibyte_characters_split_between_chunks() {
        let bytes = "data: é\n".as_bytes();
        let split = bytes.len() - 2;
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&bytes[..split]).is_empty());
        assert_eq!(decoder.push(&bytes[split..]), vec!["é".to_string()]);
    }

    #[test]
    fn accepts_data_without_space() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.push(b"data:x\n"), vec!["x".to_string()]);
    }
}
