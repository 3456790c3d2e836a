//! Port definitions.

mod media_source_port;

pub use media_source_port::MediaSourcePort;
