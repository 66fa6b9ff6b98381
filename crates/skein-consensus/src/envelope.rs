use skein_storage::codec;
use skein_types::{Command, SkeinError};

/// zstd level for compressed payloads.
const COMPRESSION_LEVEL: i32 = 3;

/// How a command payload is encoded inside its envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Plain,
    /// A zstd frame of the plain encoding.
    Compressed,
}

/// The bytes carried by a command log entry.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Envelope {
    pub encoding: Encoding,
    pub payload: Vec<u8>,
}

pub fn encode_command(cmd: &Command, encoding: Encoding) -> Result<Vec<u8>, SkeinError> {
    let plain = codec::encode(cmd)?;
    let payload = match encoding {
        Encoding::Plain => plain,
        Encoding::Compressed => zstd::encode_all(plain.as_slice(), COMPRESSION_LEVEL)
            .map_err(|e| SkeinError::Storage(format!("compress command: {e}")))?,
    };
    codec::encode(&Envelope { encoding, payload })
}

/// Decode a log payload. The error is a human-readable reason; callers
/// attach the log position.
pub fn decode_command(bytes: &[u8]) -> Result<Command, String> {
    let envelope: Envelope = codec::decode(bytes).map_err(|e| format!("envelope: {e}"))?;
    let plain = match envelope.encoding {
        Encoding::Plain => envelope.payload,
        Encoding::Compressed => zstd::decode_all(envelope.payload.as_slice())
            .map_err(|e| format!("decompress: {e}"))?,
    };
    codec::decode(&plain).map_err(|e| format!("command: {e}"))
}
