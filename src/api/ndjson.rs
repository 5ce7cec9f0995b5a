use serde::de::DeserializeOwned;

/// Incremental decoder for newline-delimited JSON bodies.
///
/// Lines may be split across network reads. Blank lines are skipped and
/// lines that fail to decode are logged and dropped.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<T: DeserializeOwned>(&mut self, bytes: &[u8]) -> Vec<T> {
        self.buffer.extend_from_slice(bytes);
        let mut decoded = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(value) = decode_line(&line) {
                decoded.push(value);
            }
        }
        decoded
    }

    /// Decodes whatever is left after the body ended without a trailing newline.
    pub fn finish<T: DeserializeOwned>(mut self) -> Vec<T> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest).into_iter().collect()
    }
}

fn decode_line<T: DeserializeOwned>(line: &[u8]) -> Option<T> {
    let text = String::from_utf8_lossy(line);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(target: "bulk", error = %err, line = %trimmed, "skipping malformed stream line");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::ProcessEmailsChunk;

    use super::*;

    #[test]
    fn lines_split_across_reads_decode_once() {
        let mut decoder = NdjsonDecoder::new();
        let first: Vec<ProcessEmailsChunk> =
            decoder.push(br#"{"status":"success","results":[],"total_pro"#);
        assert!(first.is_empty());

        let second: Vec<ProcessEmailsChunk> =
            decoder.push(b"cessed\":3}\n{\"status\":\"no_emails\"}\n");
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].total_processed, 3);
        assert!(second[1].is_exhausted());
    }

    #[test]
    fn blank_and_malformed_lines_are_skipped() {
        let mut decoder = NdjsonDecoder::new();
        let chunks: Vec<ProcessEmailsChunk> =
            decoder.push(b"\n  \nnot json\n{\"status\":\"error\",\"message\":\"boom\"}\n");
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_error());
        assert_eq!(chunks[0].message.as_deref(), Some("boom"));
    }

    #[test]
    fn trailing_document_without_newline_is_decoded_on_finish() {
        let mut decoder = NdjsonDecoder::new();
        let pushed: Vec<ProcessEmailsChunk> =
            decoder.push(br#"{"status":"success","total_processed":1}"#);
        assert!(pushed.is_empty());
        let rest: Vec<ProcessEmailsChunk> = decoder.finish();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].total_processed, 1);
    }
}
