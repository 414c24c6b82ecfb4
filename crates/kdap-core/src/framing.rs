//! Content-Length framing (`spec.md` §4.2, §6): "a DAP framing/reader-writer
//! stream... out of scope" for the core, but the router needs *something*
//! concrete to read from and write to, both in production and in tests. This
//! module is deliberately thin — a newtype over `tokio::io` implementing
//! exactly the wire format `spec.md` describes and nothing else.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::KdapError;

const HEADER_PREFIX: &str = "Content-Length:";

/// Reads one `Content-Length`-framed JSON body per call.
pub struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        FrameReader { inner }
    }

    /// Reads one framed message body. Returns `Ok(None)` on a clean
    /// end-of-stream (no partial header pending); any error here is fatal
    /// per `spec.md` §7 (`IOError`/`ProtocolError`).
    pub async fn read_message(&mut self) -> Result<Option<Vec<u8>>, KdapError> {
        let mut content_length: Option<usize> = None;

        loop {
            let mut line = String::new();
            let read = self
                .inner
                .read_line(&mut line)
                .await
                .map_err(|source| KdapError::io("framing header", source))?;

            if read == 0 {
                if content_length.is_some() {
                    return Err(KdapError::protocol(
                        "framing header",
                        <serde_json::Error as serde::de::Error>::custom(
                            "stream closed mid-header",
                        ),
                    ));
                }
                return Ok(None);
            }

            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                break;
            }

            if let Some(value) = trimmed
                .get(..HEADER_PREFIX.len())
                .filter(|prefix| prefix.eq_ignore_ascii_case(HEADER_PREFIX))
                .map(|_| trimmed[HEADER_PREFIX.len()..].trim())
            {
                let parsed: usize = value.parse().map_err(|_| {
                    KdapError::protocol(
                        "framing header",
                        <serde_json::Error as serde::de::Error>::custom(format!(
                            "invalid Content-Length value `{value}`"
                        )),
                    )
                })?;
                content_length = Some(parsed);
            }
        }

        let length = content_length.ok_or_else(|| {
            KdapError::protocol(
                "framing header",
                <serde_json::Error as serde::de::Error>::custom("missing Content-Length header"),
            )
        })?;

        let mut body = vec![0u8; length];
        tokio::io::AsyncReadExt::read_exact(&mut self.inner, &mut body)
            .await
            .map_err(|source| KdapError::io("framing body", source))?;

        Ok(Some(body))
    }
}

/// Writes one `Content-Length`-framed JSON body per call, atomically (the
/// header and body are written with a single buffered write sequence so no
/// other writer can interleave a frame — enforced structurally by giving
/// each output stream exactly one [`FrameWriter`], owned by its writer task).
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        FrameWriter { inner }
    }

    pub async fn write_message(&mut self, body: &[u8]) -> Result<(), KdapError> {
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        self.inner
            .write_all(header.as_bytes())
            .await
            .map_err(|source| KdapError::io("framing header", source))?;
        self.inner
            .write_all(body)
            .await
            .map_err(|source| KdapError::io("framing body", source))?;
        self.inner
            .flush()
            .await
            .map_err(|source| KdapError::io("framing flush", source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_single_frame() {
        let (mut near, far) = tokio::io::duplex(4096);

        let mut writer = FrameWriter::new(&mut near);
        writer.write_message(br#"{"seq":1}"#).await.unwrap();
        drop(near);

        let mut reader = FrameReader::new(tokio::io::BufReader::new(far));
        let body = reader.read_message().await.unwrap().unwrap();
        assert_eq!(body, br#"{"seq":1}"#);
    }

    #[tokio::test]
    async fn clean_eof_with_no_pending_header_returns_none() {
        let (near, far) = tokio::io::duplex(16);
        drop(near);
        let mut reader = FrameReader::new(tokio::io::BufReader::new(far));
        assert!(reader.read_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn header_is_case_insensitive() {
        let (mut near, far) = tokio::io::duplex(4096);

        near.write_all(b"content-length: 2\r\n\r\n{}").await.unwrap();
        drop(near);

        let mut reader = FrameReader::new(tokio::io::BufReader::new(far));
        let body = reader.read_message().await.unwrap().unwrap();
        assert_eq!(body, b"{}");
    }
}
