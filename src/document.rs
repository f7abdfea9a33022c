use crate::chat::Document;
use async_trait::async_trait;
use tracing::warn;

pub const PDF_MIME: &str = "application/pdf";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("Please upload a PDF file only.")]
    NotPdf,
    #[error("File size must be less than {}.", display_size(.max_bytes))]
    TooLarge { max_bytes: usize },
    #[error("Failed to process PDF. Please try again.")]
    Extraction,
}

/// Render a byte limit the way the upload panel states it: "10MB", "512KB",
/// or a plain byte count when the limit is not a whole unit.
pub fn display_size(bytes: &usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * KB;
    match *bytes {
        b if b >= MB && b % MB == 0 => format!("{}MB", b / MB),
        b if b >= KB && b % KB == 0 => format!("{}KB", b / KB),
        b => format!("{} bytes", b),
    }
}

/// Pulls plain text out of an uploaded file.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, bytes: Vec<u8>) -> anyhow::Result<String>;
}

pub struct PdfExtractor;

#[async_trait]
impl DocumentExtractor for PdfExtractor {
    async fn extract(&self, bytes: Vec<u8>) -> anyhow::Result<String> {
        // A panicking parser surfaces here as a JoinError.
        let text = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&bytes).map_err(|e| anyhow::anyhow!("{}", e))
        })
        .await??;
        Ok(text)
    }
}

/// Check the declared type and size before any extraction work.
pub fn validate_upload(
    content_type: Option<&str>,
    size: usize,
    max_bytes: usize,
) -> Result<(), UploadError> {
    let is_pdf = content_type
        .map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or("")
                .trim()
                .eq_ignore_ascii_case(PDF_MIME)
        })
        .unwrap_or(false);
    if !is_pdf {
        return Err(UploadError::NotPdf);
    }
    if size > max_bytes {
        return Err(UploadError::TooLarge { max_bytes });
    }
    Ok(())
}

/// Validate and extract an uploaded file into a [`Document`].
pub async fn ingest(
    extractor: &dyn DocumentExtractor,
    name: &str,
    content_type: Option<&str>,
    bytes: Vec<u8>,
    max_bytes: usize,
) -> Result<Document, UploadError> {
    validate_upload(content_type, bytes.len(), max_bytes)?;

    let text = match extractor.extract(bytes).await {
        Ok(text) => text,
        Err(e) => {
            warn!(file = %name, "PDF extraction failed: {:#}", e);
            return Err(UploadError::Extraction);
        }
    };

    if text.trim().is_empty() {
        warn!(file = %name, "PDF contains no extractable text");
        return Err(UploadError::Extraction);
    }

    Ok(Document::new(name, text))
}
