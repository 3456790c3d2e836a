//! Domain layer with media entities, errors and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{Fingerprint, MediaBitmap, MediaCategory, MediaRequest, MediaSize};
pub use errors::{MediaError, MediaResult};
pub use ports::MediaSourcePort;
