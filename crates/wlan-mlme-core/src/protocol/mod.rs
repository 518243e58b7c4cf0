//! Protocol module containing the management frame codec and its building blocks.

pub mod codec;
pub mod frames;
pub mod ie;
pub mod mac;
pub mod sequence;
pub mod wep;

pub use codec::{decode_body, decode_frame, encode_body, encode_frame, ProtocolError};
pub use frames::*;
pub use mac::{MacAddr, MgmtHeader, MgmtSubtype, MGMT_HEADER_LEN};
pub use sequence::SequenceCounter;
