use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::pipeline::IngestError;

/// Broad file categories seen in the inbox
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FileCategory {
    Pdf,
    Image,
    Empty,
    Unsupported,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Image => "image",
            Self::Empty => "empty",
            Self::Unsupported => "unsupported",
        }
    }
}

/// Result of format detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatDetection {
    pub mime_type: String,
    pub category: FileCategory,
    pub file_size_bytes: u64,
}

const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024; // 100MB

/// Detect file format from magic bytes (NOT file extensions).
pub fn detect_format(path: &Path) -> Result<FormatDetection, IngestError> {
    let unreadable = |e: std::io::Error| IngestError::FileUnreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    let metadata = std::fs::metadata(path).map_err(unreadable)?;
    let file_size = metadata.len();

    if file_size == 0 {
        return Ok(FormatDetection {
            mime_type: "application/x-empty".into(),
            category: FileCategory::Empty,
            file_size_bytes: 0,
        });
    }

    let mut file = std::fs::File::open(path).map_err(unreadable)?;
    let mut header = [0u8; 8];
    let bytes_read = file.read(&mut header).map_err(unreadable)?;

    let (mime_type, category) = match &header[..bytes_read] {
        // PDF: starts with %PDF
        [0x25, 0x50, 0x44, 0x46, ..] => ("application/pdf", FileCategory::Pdf),
        // JPEG: starts with FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => ("image/jpeg", FileCategory::Image),
        // PNG: starts with 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => ("image/png", FileCategory::Image),
        // TIFF: little-endian (49 49 2A 00) or big-endian (4D 4D 00 2A)
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => {
            ("image/tiff", FileCategory::Image)
        }
        _ => ("application/octet-stream", FileCategory::Unsupported),
    };

    Ok(FormatDetection {
        mime_type: mime_type.to_string(),
        category,
        file_size_bytes: file_size,
    })
}

/// Whether the name carries a `.pdf` extension (any case).
pub fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Accept only non-empty PDFs within the size limit.
pub fn ensure_pdf(path: &Path) -> Result<FormatDetection, IngestError> {
    let detection = detect_format(path)?;
    match detection.category {
        FileCategory::Pdf if detection.file_size_bytes <= MAX_FILE_SIZE => Ok(detection),
        FileCategory::Pdf => Err(IngestError::FileUnreadable {
            path: path.to_path_buf(),
            reason: format!(
                "file too large: {} bytes exceeds {MAX_FILE_SIZE}",
                detection.file_size_bytes
            ),
        }),
        FileCategory::Empty => Err(IngestError::FileUnreadable {
            path: path.to_path_buf(),
            reason: "zero-byte file".into(),
        }),
        FileCategory::Image | FileCategory::Unsupported => {
            Err(IngestError::UnsupportedFileType {
                path: path.to_path_buf(),
                detected: detection.mime_type,
            })
        }
    }
}
