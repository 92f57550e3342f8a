//! The session-lifecycle cores: issuing access/refresh pairs, advancing
//! rotation chains with reuse detection, and the read/revoke side of a
//! user's sessions.

pub mod issuer;
pub mod registry;
pub mod rotation;

pub use issuer::{IssueError, IssuedTokens, TokenIssuer};
pub use registry::{SessionError, SessionRegistry};
pub use rotation::{RotatedTokens, RotationEngine, RotationError};
