//! Streaming ingest: bytes in, cleaned code out, one publish per chunk.
//!
//! A generation response arrives as an arbitrary split of UTF-8 bytes. Each
//! chunk goes through a stateful decoder (so a multi-byte character cut in
//! half by the transport is held back until its tail arrives), is appended to
//! the raw buffer, and the whole buffer is re-stripped with
//! [`strip_code_fences`]. Re-stripping from scratch matters: a fence marker
//! can itself be split across chunks.

use bytes::Bytes;
use encoding_rs::{CoderResult, Decoder, UTF_8};
use futures::{Stream, StreamExt, pin_mut};
use tracing::{debug, trace};

use crate::fence::strip_code_fences;

/// Incremental UTF-8 decoder scoped to one stream.
///
/// Malformed sequences decode to U+FFFD and a leading byte-order mark is
/// dropped, matching what a browser `TextDecoder` does in streaming mode.
pub struct Utf8StreamDecoder {
    decoder: Decoder,
}

impl std::fmt::Debug for Utf8StreamDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Utf8StreamDecoder").finish()
    }
}

impl Default for Utf8StreamDecoder {
    fn default() -> Self {
        Self {
            decoder: UTF_8.new_decoder(),
        }
    }
}

impl Utf8StreamDecoder {
    /// Decode `bytes` and append the text to `out`.
    ///
    /// When `last` is `false`, an incomplete trailing sequence is kept inside
    /// the decoder for the next call.
    pub fn decode_into(&mut self, bytes: &[u8], out: &mut String, last: bool) {
        let mut consumed = 0;
        loop {
            let remaining = &bytes[consumed..];
            let needed = self
                .decoder
                .max_utf8_buffer_length(remaining.len())
                .unwrap_or(remaining.len() * 3 + 4);
            out.reserve(needed);
            let (result, read, _replaced) = self.decoder.decode_to_string(remaining, out, last);
            consumed += read;
            match result {
                CoderResult::InputEmpty => break,
                CoderResult::OutputFull => continue,
            }
        }
    }
}

/// Mutable accumulator for one in-flight generation.
#[derive(Debug, Default)]
pub struct StreamIngest {
    decoder: Utf8StreamDecoder,
    buffer: String,
    chunks: usize,
}

/// What is left once a stream has been fully read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutput {
    /// Everything the model sent, decoded.
    pub raw: String,
    /// `raw` with code fences stripped.
    pub code: String,
    /// Number of transport chunks read.
    pub chunks: usize,
}

impl StreamIngest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk and return the cleaned rendering of the whole buffer.
    pub fn push(&mut self, chunk: &[u8]) -> String {
        self.decoder.decode_into(chunk, &mut self.buffer, false);
        self.chunks += 1;
        trace!(chunk_len = chunk.len(), buffer_len = self.buffer.len(), "chunk ingested");
        strip_code_fences(&self.buffer)
    }

    /// The raw text decoded so far.
    pub fn raw(&self) -> &str {
        &self.buffer
    }

    /// Flush the decoder and return the final buffer.
    pub fn finish(mut self) -> IngestOutput {
        self.decoder.decode_into(&[], &mut self.buffer, true);
        let code = strip_code_fences(&self.buffer);
        IngestOutput {
            raw: self.buffer,
            code,
            chunks: self.chunks,
        }
    }
}

/// Drive `stream` to completion, calling `publish` with the cleaned code
/// after every chunk and once more after the decoder is flushed.
///
/// The first read error aborts the loop and is returned as-is; whatever was
/// published before it stays published.
pub async fn ingest_stream<S, E, F>(stream: S, mut publish: F) -> Result<IngestOutput, E>
where
    S: Stream<Item = Result<Bytes, E>>,
    F: FnMut(&str),
{
    pin_mut!(stream);
    let mut ingest = StreamIngest::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let cleaned = ingest.push(&chunk);
        publish(&cleaned);
    }

    let output = ingest.finish();
    publish(&output.code);
    debug!(chunks = output.chunks, raw_len = output.raw.len(), "stream ingested");
    Ok(output)
}

#[cfg(test)]
mod test {
    use super::*;
    use futures::stream;

    fn chunks(parts: &[&[u8]]) -> Vec<Result<Bytes, std::io::Error>> {
        parts.iter().map(|p| Ok(Bytes::copy_from_slice(p))).collect()
    }

    #[tokio::test]
    async fn fenced_stream_yields_clean_code() {
        let input = chunks(&[b"```ts\n", b"const y", b"=2;\n```"]);
        let mut published = Vec::new();
        let output = ingest_stream(stream::iter(input), |code| published.push(code.to_owned()))
            .await
            .unwrap();

        assert_eq!(output.code, "const y=2;");
        assert_eq!(output.chunks, 3);
        // Before the closing fence arrives the partial text is shown as-is.
        assert_eq!(published[0], "```ts");
        assert_eq!(published[1], "```ts\nconst y");
        assert_eq!(published[2], "const y=2;");
        assert_eq!(published.last().map(String::as_str), Some("const y=2;"));
    }

    #[tokio::test]
    async fn split_fence_marker_is_recognised() {
        let input = chunks(&[b"``", b"`tsx\nlet a", b" = 1;\n`", b"``"]);
        let output = ingest_stream(stream::iter(input), |_| {}).await.unwrap();
        assert_eq!(output.code, "let a = 1;");
    }

    #[tokio::test]
    async fn multibyte_character_split_across_chunks_survives() {
        let text = "const s = \"héllo ✓\";";
        let bytes = text.as_bytes();
        // Split inside the three-byte check mark.
        let cut = text.find('✓').unwrap() + 1;
        let input = chunks(&[&bytes[..cut], &bytes[cut..]]);

        let mut published = Vec::new();
        let output = ingest_stream(stream::iter(input), |code| published.push(code.to_owned()))
            .await
            .unwrap();

        assert_eq!(output.raw, text);
        assert!(!published[0].contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn truncated_sequence_at_end_becomes_replacement() {
        let input = chunks(&[b"ok", &[0xE2, 0x9C]]);
        let output = ingest_stream(stream::iter(input), |_| {}).await.unwrap();
        assert_eq!(output.raw, "ok\u{FFFD}");
    }

    #[tokio::test]
    async fn read_error_aborts_and_keeps_earlier_publishes() {
        let input: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::other("connection reset")),
            Ok(Bytes::from_static(b" never read")),
        ];
        let mut published = Vec::new();
        let err = ingest_stream(stream::iter(input), |code| published.push(code.to_owned()))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "connection reset");
        assert_eq!(published, vec!["partial".to_owned()]);
    }

    #[test]
    fn leading_bom_is_dropped() {
        let mut ingest = StreamIngest::new();
        let cleaned = ingest.push(b"\xEF\xBB\xBFhello");
        assert_eq!(cleaned, "hello");
        assert_eq!(ingest.raw(), "hello");
    }

    #[test]
    fn empty_stream_finishes_empty() {
        let output = StreamIngest::new().finish();
        assert_eq!(output.raw, "");
        assert_eq!(output.code, "");
        assert_eq!(output.chunks, 0);
    }
}
