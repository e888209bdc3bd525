//! Codec module: incremental request decoding and response chunk framing
//!
//! # Architecture
//!
//! - Request handling:
//!   - [`RequestDecoder`]: decodes one request into [`ParseEvent`](crate::protocol::ParseEvent)s
//!   - [`HeadDecoder`]: the line based request line and header parser
//!   - Body decoding via the [`body`] module
//!
//! - Response handling:
//!   - [`ChunkEncoder`]: chunked transfer encoding of response content
//!
//! All decoders implement [`tokio_util::codec::Decoder`] over a `BytesMut`
//! the caller appends transport data to, and resume exactly where the
//! previous call stopped.

pub mod body;
mod chunk_encoder;
mod head_decoder;
mod request_decoder;

pub use chunk_encoder::ChunkEncoder;
pub use chunk_encoder::MIN_CHUNK_SPACE;
pub use chunk_encoder::framing_len;
pub use head_decoder::HeadDecoder;
pub use request_decoder::RequestDecoder;
