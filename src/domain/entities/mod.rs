//! Domain entity definitions.

mod fingerprint;
mod media;
mod thumbnail_task;

pub use fingerprint::{Fingerprint, MediaRequest};
pub use media::{
    ExpiredNotice, ExpiredVariant, MediaBitmap, MediaCategory, MediaKind, MediaSize, MediaState,
};
pub use thumbnail_task::ThumbnailTask;
