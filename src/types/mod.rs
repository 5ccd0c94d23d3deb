mod file;
mod metadata;
mod stats;
mod version;

pub use file::{FileType, FileTypeDetector, MARKDOWN_MIME, PLAIN_TEXT_MIME};
pub use metadata::{timestamp_now, File, FileMetadata, DEFAULT_ENCODING};
pub use stats::ProjectStats;
pub use version::FileVersion;
