pub mod decoder;
pub mod directed;
pub mod error;
pub mod frame;
pub mod grid;
pub mod mode;
pub mod modulator;
pub mod varicode;

pub use decoder::{DecodeResult, Decoder, NullDecoder, ScriptedDecoder, ToneDecoder};
pub use error::{ProtocolError, Result};
pub use frame::{FrameEncoder, MatrixParity, ParityPolicy, PlaceholderParity, ToneFrame, decode_frame, encode_message};
pub use mode::SubMode;
pub use modulator::{Modulator, generate_audio};
