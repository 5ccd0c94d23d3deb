use serde::{Deserialize, Serialize};

pub const MARKDOWN_MIME: &str = "text/markdown";
pub const PLAIN_TEXT_MIME: &str = "text/plain";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    Markdown,
    PlainText,
}

impl FileType {
    pub fn mime_type(&self) -> &'static str {
        match self {
            FileType::Markdown => MARKDOWN_MIME,
            FileType::PlainText => PLAIN_TEXT_MIME,
        }
    }

    pub fn from_mime(mime: &str) -> Option<FileType> {
        match mime {
            MARKDOWN_MIME => Some(FileType::Markdown),
            PLAIN_TEXT_MIME => Some(FileType::PlainText),
            _ => None,
        }
    }
}

pub struct FileTypeDetector;

impl FileTypeDetector {
    /// Only the `.md` suffix is recognised; everything else is plain text.
    pub fn detect(file_name: &str) -> FileType {
        if file_name.ends_with(".md") {
            FileType::Markdown
        } else {
            FileType::PlainText
        }
    }
}
