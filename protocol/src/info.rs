//! Protocol identification constants, consumed by the discovery
//! advertisement.

/// Short protocol tag sent in query responses.
pub const GAME_ID: &str = "MCPE";

/// Numeric protocol version the proxy speaks.
pub const CURRENT_PROTOCOL: i32 = 201;

/// Human-readable client version matching [`CURRENT_PROTOCOL`].
pub const GAME_VERSION: &str = "1.2.10";
