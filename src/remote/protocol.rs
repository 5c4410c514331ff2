//! Wire protocol for the remote port
//!
//! One envelope per connection. The encoding is length-prefixed text: a
//! header line carrying the protocol version and the message tag, followed
//! by payload lines where the tag requires them. Strings travel as a
//! decimal byte-length line followed by the raw bytes and a terminating
//! newline, so argument values may contain spaces and newlines; all
//! payloads must be valid UTF-8.
//!
//! The codec performs no semantic validation of payload contents; whether a
//! forwarded argument is an openable file path is the coordinator's concern.

use thiserror::Error;

/// Protocol name and version on every header line. Peers speaking a
/// different version are rejected as malformed rather than guessed at.
pub const PROTOCOL_HEADER: &str = "REFBASE/1";

/// Hard cap on a complete encoded message. Readers must not buffer more
/// than this from an untrusted local peer.
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Maximum number of forwarded command-line arguments.
pub const MAX_ARGS: usize = 1024;

/// Maximum encoded length of a single string payload.
pub const MAX_STRING_BYTES: usize = 8192;

const TAG_SEND_ARGS: &str = "SEND_COMMAND_LINE_ARGUMENTS";
const TAG_PING: &str = "PING";
const TAG_PONG: &str = "PONG";
const TAG_OK: &str = "OK";
const TAG_FOCUS: &str = "FOCUS";

/// Decoding failures. Every variant means the peer sent something this
/// version of the protocol cannot accept; the connection is dropped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Empty input where a message was expected
    #[error("empty message")]
    Empty,

    /// Header line does not carry the expected protocol name/version
    #[error("unsupported protocol header: {0:?}")]
    UnsupportedHeader(String),

    /// Tag token is not one of the known messages
    #[error("unknown message tag: {0:?}")]
    UnknownTag(String),

    /// Tag mandates a payload but none was supplied
    #[error("missing payload for {0}")]
    MissingPayload(&'static str),

    /// A count or length line is not a decimal number
    #[error("invalid length field: {0:?}")]
    InvalidLength(String),

    /// Declared payload length does not match the supplied data
    #[error("payload length mismatch")]
    LengthMismatch,

    /// Declared count or length exceeds protocol bounds
    #[error("payload exceeds protocol bounds")]
    Oversized,

    /// String payload is not valid UTF-8
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,

    /// Message ended before its declared payload
    #[error("truncated message")]
    Truncated,

    /// Well-formed message followed by extra bytes
    #[error("trailing bytes after message")]
    TrailingData,
}

/// One wire message: a tag plus its typed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Forward the launching process's argv to the primary instance
    SendCommandLineArguments(Vec<String>),

    /// Ask the listener to identify itself
    Ping,

    /// Reply to [`Envelope::Ping`] carrying the instance identifier
    Pong(String),

    /// Acknowledge a request that carries no reply data
    Ok,

    /// Ask the primary instance to raise its main window
    Focus,
}

impl Envelope {
    /// Wire tag for this message
    pub fn tag(&self) -> &'static str {
        match self {
            Self::SendCommandLineArguments(_) => TAG_SEND_ARGS,
            Self::Ping => TAG_PING,
            Self::Pong(_) => TAG_PONG,
            Self::Ok => TAG_OK,
            Self::Focus => TAG_FOCUS,
        }
    }

    /// Encode into a complete wire message.
    ///
    /// The same payload bounds apply on both sides of the wire: an envelope
    /// the peer would reject as [`ProtocolError::Oversized`] fails here
    /// instead of producing bytes that are silently dropped remotely.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Self::SendCommandLineArguments(args) => {
                if args.len() > MAX_ARGS
                    || args.iter().any(|arg| arg.len() > MAX_STRING_BYTES)
                {
                    return Err(ProtocolError::Oversized);
                }
            }
            Self::Pong(id) if id.len() > MAX_STRING_BYTES => {
                return Err(ProtocolError::Oversized);
            }
            _ => {}
        }

        let mut out = Vec::new();
        out.extend_from_slice(PROTOCOL_HEADER.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.tag().as_bytes());
        out.push(b'\n');

        match self {
            Self::SendCommandLineArguments(args) => {
                out.extend_from_slice(args.len().to_string().as_bytes());
                out.push(b'\n');
                for arg in args {
                    push_string(&mut out, arg);
                }
            }
            Self::Pong(id) => push_string(&mut out, id),
            Self::Ping | Self::Ok | Self::Focus => {}
        }

        Ok(out)
    }

    /// Decode a complete wire message. The entire input must be consumed;
    /// trailing bytes are rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let mut cursor = Cursor::new(bytes);
        let header = cursor.read_line()?;
        let header = std::str::from_utf8(header).map_err(|_| ProtocolError::InvalidUtf8)?;

        let (version, tag) = header
            .split_once(' ')
            .ok_or_else(|| ProtocolError::UnsupportedHeader(header.to_string()))?;
        if version != PROTOCOL_HEADER {
            return Err(ProtocolError::UnsupportedHeader(version.to_string()));
        }

        let envelope = match tag {
            TAG_SEND_ARGS => {
                if cursor.is_empty() {
                    return Err(ProtocolError::MissingPayload(TAG_SEND_ARGS));
                }
                let count = cursor.read_length_line(MAX_ARGS)?;
                let mut args = Vec::with_capacity(count);
                for _ in 0..count {
                    args.push(cursor.read_string()?);
                }
                Self::SendCommandLineArguments(args)
            }
            TAG_PING => Self::Ping,
            TAG_PONG => {
                if cursor.is_empty() {
                    return Err(ProtocolError::MissingPayload(TAG_PONG));
                }
                Self::Pong(cursor.read_string()?)
            }
            TAG_OK => Self::Ok,
            TAG_FOCUS => Self::Focus,
            other => return Err(ProtocolError::UnknownTag(other.to_string())),
        };

        if !cursor.is_empty() {
            return Err(ProtocolError::TrailingData);
        }

        Ok(envelope)
    }
}

/// Read one complete message from a half-closed stream.
///
/// The sender shuts down its write side after the request, so end-of-message
/// is end-of-stream. The read is bounded by [`MAX_MESSAGE_BYTES`]; a peer
/// that keeps sending past the cap gets an `InvalidData` error instead of
/// growing our buffer.
pub async fn read_message<R>(reader: &mut R) -> std::io::Result<Vec<u8>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    use tokio::io::AsyncReadExt;

    let mut buf = Vec::new();
    let mut bounded = reader.take(MAX_MESSAGE_BYTES as u64 + 1);
    bounded.read_to_end(&mut buf).await?;
    if buf.len() > MAX_MESSAGE_BYTES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "message exceeds protocol bounds",
        ));
    }
    Ok(buf)
}

fn push_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.len().to_string().as_bytes());
    out.push(b'\n');
    out.extend_from_slice(s.as_bytes());
    out.push(b'\n');
}

/// Positional reader over a complete received message
struct Cursor<'a> {
    buf: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Next line without its terminating newline
    fn read_line(&mut self) -> Result<&'a [u8], ProtocolError> {
        let end = self
            .buf
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(ProtocolError::Truncated)?;
        let line = &self.buf[..end];
        self.buf = &self.buf[end + 1..];
        Ok(line)
    }

    /// Decimal count/length line, bounded before any allocation happens
    fn read_length_line(&mut self, max: usize) -> Result<usize, ProtocolError> {
        let line = self.read_line()?;
        let text = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8)?;
        let value: usize = text
            .parse()
            .map_err(|_| ProtocolError::InvalidLength(text.to_string()))?;
        if value > max {
            return Err(ProtocolError::Oversized);
        }
        Ok(value)
    }

    /// Length-prefixed string: `<len>\n<bytes>\n`
    fn read_string(&mut self) -> Result<String, ProtocolError> {
        let len = self.read_length_line(MAX_STRING_BYTES)?;
        if self.buf.len() < len + 1 {
            return Err(ProtocolError::Truncated);
        }
        let (data, rest) = self.buf.split_at(len);
        if rest[0] != b'\n' {
            return Err(ProtocolError::LengthMismatch);
        }
        self.buf = &rest[1..];
        std::str::from_utf8(data)
            .map(str::to_owned)
            .map_err(|_| ProtocolError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn roundtrip(envelope: Envelope) {
        let bytes = envelope.encode().expect("round-trip encode");
        let decoded = Envelope::decode(&bytes).expect("round-trip decode");
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_roundtrip_no_payload_tags() {
        roundtrip(Envelope::Ping);
        roundtrip(Envelope::Ok);
        roundtrip(Envelope::Focus);
    }

    #[test]
    fn test_roundtrip_pong() {
        roundtrip(Envelope::Pong("instance-a".to_string()));
        roundtrip(Envelope::Pong(String::new()));
    }

    #[test]
    fn test_roundtrip_arguments() {
        roundtrip(Envelope::SendCommandLineArguments(vec![]));
        roundtrip(Envelope::SendCommandLineArguments(vec![
            "paper1.bib".to_string(),
            "path with spaces/notes.bib".to_string(),
            "newline\nin\npath".to_string(),
        ]));
    }

    #[test]
    fn test_wire_shape() {
        let bytes = Envelope::Ping.encode().unwrap();
        assert_eq!(bytes, b"REFBASE/1 PING\n");

        let bytes = Envelope::SendCommandLineArguments(vec!["a.bib".to_string()])
            .encode()
            .unwrap();
        assert_eq!(
            bytes,
            b"REFBASE/1 SEND_COMMAND_LINE_ARGUMENTS\n1\n5\na.bib\n"
        );
    }

    #[test]
    fn test_encode_enforces_decode_bounds() {
        // Payloads the receiving side would reject never make it onto the
        // wire in the first place
        let arg = "x".repeat(MAX_STRING_BYTES + 1);
        assert_eq!(
            Envelope::SendCommandLineArguments(vec![arg]).encode(),
            Err(ProtocolError::Oversized)
        );

        let args = vec!["a.bib".to_string(); MAX_ARGS + 1];
        assert_eq!(
            Envelope::SendCommandLineArguments(args).encode(),
            Err(ProtocolError::Oversized)
        );

        assert_eq!(
            Envelope::Pong("x".repeat(MAX_STRING_BYTES + 1)).encode(),
            Err(ProtocolError::Oversized)
        );
    }

    #[test]
    fn test_encode_accepts_payloads_at_the_bounds() {
        roundtrip(Envelope::SendCommandLineArguments(vec![
            "x".repeat(MAX_STRING_BYTES),
        ]));
        roundtrip(Envelope::Pong("x".repeat(MAX_STRING_BYTES)));
    }

    #[test]
    fn test_decode_empty() {
        assert_eq!(Envelope::decode(b""), Err(ProtocolError::Empty));
    }

    #[test]
    fn test_decode_unknown_tag() {
        let err = Envelope::decode(b"REFBASE/1 SHUTDOWN\n").unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownTag(_)));
    }

    #[test]
    fn test_decode_bad_header() {
        let err = Envelope::decode(b"REFBASE/2 PING\n").unwrap_err();
        assert!(matches!(err, ProtocolError::UnsupportedHeader(_)));

        let err = Envelope::decode(b"PING\n").unwrap_err();
        assert!(matches!(err, ProtocolError::UnsupportedHeader(_)));
    }

    #[test]
    fn test_decode_missing_payload() {
        assert_eq!(
            Envelope::decode(b"REFBASE/1 PONG\n"),
            Err(ProtocolError::MissingPayload("PONG"))
        );
        assert_eq!(
            Envelope::decode(b"REFBASE/1 SEND_COMMAND_LINE_ARGUMENTS\n"),
            Err(ProtocolError::MissingPayload("SEND_COMMAND_LINE_ARGUMENTS"))
        );
    }

    #[test]
    fn test_decode_length_mismatch() {
        // declared 10 bytes, supplied 5
        assert_eq!(
            Envelope::decode(b"REFBASE/1 PONG\n10\nhello\n"),
            Err(ProtocolError::Truncated)
        );
        // declared 3 bytes, supplied 5
        assert_eq!(
            Envelope::decode(b"REFBASE/1 PONG\n3\nhello\n"),
            Err(ProtocolError::LengthMismatch)
        );
    }

    #[test]
    fn test_decode_trailing_data() {
        assert_eq!(
            Envelope::decode(b"REFBASE/1 PING\nextra\n"),
            Err(ProtocolError::TrailingData)
        );
    }

    #[test]
    fn test_decode_oversized_declared_count() {
        // Oversized declarations are rejected before any allocation
        let msg = format!("REFBASE/1 SEND_COMMAND_LINE_ARGUMENTS\n{}\n", usize::MAX);
        assert_eq!(
            Envelope::decode(msg.as_bytes()),
            Err(ProtocolError::Oversized)
        );

        let msg = format!("REFBASE/1 PONG\n{}\n", MAX_STRING_BYTES + 1);
        assert_eq!(
            Envelope::decode(msg.as_bytes()),
            Err(ProtocolError::Oversized)
        );
    }

    #[test]
    fn test_decode_invalid_length_field() {
        let err = Envelope::decode(b"REFBASE/1 PONG\nabc\nxyz\n").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidLength(_)));
    }

    #[test]
    fn test_decode_invalid_utf8() {
        assert_eq!(
            Envelope::decode(b"REFBASE/1 PONG\n2\n\xff\xfe\n"),
            Err(ProtocolError::InvalidUtf8)
        );
    }

    #[test]
    fn test_decode_truncated_never_panics() {
        // Every prefix of a valid message decodes to an error, not a panic
        let full = Envelope::SendCommandLineArguments(vec![
            "paper1.bib".to_string(),
            "paper2.bib".to_string(),
        ])
        .encode()
        .unwrap();
        for cut in 0..full.len() {
            assert!(Envelope::decode(&full[..cut]).is_err());
        }
    }

    proptest! {
        #[test]
        fn prop_roundtrip_arguments(args in proptest::collection::vec(".{0,64}", 0..16)) {
            roundtrip(Envelope::SendCommandLineArguments(args));
        }

        #[test]
        fn prop_roundtrip_pong(id in ".{0,64}") {
            roundtrip(Envelope::Pong(id));
        }

        #[test]
        fn prop_garbage_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            // Decoding arbitrary bytes must fail cleanly or produce a message
            let _ = Envelope::decode(&bytes);
        }
    }
}
