//! `Content-Length`-framed JSON envelope reading and writing.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::envelope::Envelope;
use crate::error::{Error, Result};

/// Reads one framed envelope; `None` on a clean EOF at a frame boundary.
///
/// # Errors
///
/// [`Error::Protocol`] on a frame without `Content-Length`, [`Error::Io`] on
/// transport failure, [`Error::Deserialize`] on an undecodable body.
pub async fn read_envelope(
	reader: &mut (impl AsyncBufRead + Unpin + Send),
) -> Result<Option<Envelope>> {
	let mut content_length: Option<usize> = None;
	let mut line = String::new();
	loop {
		line.clear();
		let bytes_read = reader.read_line(&mut line).await?;
		if bytes_read == 0 {
			if content_length.is_some() {
				return Err(Error::Protocol("EOF inside frame header".into()));
			}
			return Ok(None);
		}
		let trimmed = line.trim();
		if trimmed.is_empty() {
			break;
		}
		if let Some(value) = trimmed.strip_prefix("Content-Length: ") {
			content_length = value
				.parse()
				.map(Some)
				.map_err(|_| Error::Protocol(format!("bad Content-Length: {value}")))?;
		}
	}

	let length = content_length.ok_or_else(|| Error::Protocol("missing Content-Length".into()))?;
	let mut body = vec![0u8; length];
	reader.read_exact(&mut body).await?;
	Ok(Some(serde_json::from_slice(&body)?))
}

/// Writes one framed envelope and flushes.
///
/// # Errors
///
/// [`Error::Io`] on transport failure.
pub async fn write_envelope(
	writer: &mut (impl AsyncWrite + Unpin + Send),
	envelope: &Envelope,
) -> Result<()> {
	let body = serde_json::to_string(envelope)?;
	let frame = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
	writer.write_all(frame.as_bytes()).await?;
	writer.flush().await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use tokio::io::BufReader;

	use super::*;

	#[tokio::test]
	async fn envelope_survives_framing() {
		let mut buf = Vec::new();
		let envelope = Envelope::request(1, "ping", vec![]);
		write_envelope(&mut buf, &envelope).await.unwrap();

		let mut reader = BufReader::new(buf.as_slice());
		let back = read_envelope(&mut reader).await.unwrap().unwrap();
		assert_eq!(back.id, Some(1));
		assert_eq!(back.method.as_deref(), Some("ping"));
		assert!(read_envelope(&mut reader).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn missing_content_length_is_a_protocol_error() {
		let mut reader = BufReader::new(&b"X-Other: 1\r\n\r\n{}"[..]);
		assert!(matches!(
			read_envelope(&mut reader).await,
			Err(Error::Protocol(_))
		));
	}

	#[tokio::test]
	async fn eof_at_frame_boundary_is_clean() {
		let mut reader = BufReader::new(&b""[..]);
		assert!(read_envelope(&mut reader).await.unwrap().is_none());
	}
}
