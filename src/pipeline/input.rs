//! Input resolution: turn a user-supplied path or URL into document bytes.
//!
//! URLs are downloaded into a `TempDir` that lives as long as the
//! [`ResolvedInput`], so local and remote inputs share one code path. The
//! document format is decided from magic bytes first and the file extension
//! second; only PDF and DOCX are accepted.

use crate::error::NotesError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

pub const PDF_MIME: &str = "application/pdf";
pub const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Document formats the extractor accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Pdf,
    Docx,
}

impl DocumentFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => PDF_MIME,
            DocumentFormat::Docx => DOCX_MIME,
        }
    }

    /// File extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
        }
    }

    /// Map a MIME type to a format; anything else is unsupported.
    pub fn from_mime(mime: &str) -> Result<Self, NotesError> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            PDF_MIME => Ok(DocumentFormat::Pdf),
            DOCX_MIME => Ok(DocumentFormat::Docx),
            _ => Err(NotesError::UnsupportedFormat {
                detail: format!("MIME type '{mime}' is not PDF or DOCX"),
            }),
        }
    }

    /// Detect the format from the leading bytes and the file name.
    ///
    /// DOCX files are ZIP archives, so the `PK` signature alone is not enough;
    /// the extension must agree.
    pub fn detect(bytes: &[u8], path: &Path) -> Result<Self, NotesError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        if bytes.starts_with(b"%PDF") {
            return Ok(DocumentFormat::Pdf);
        }
        if bytes.starts_with(b"PK\x03\x04") && ext.as_deref() == Some("docx") {
            return Ok(DocumentFormat::Docx);
        }

        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        Err(NotesError::UnsupportedFormat {
            detail: format!(
                "'{}' is not a PDF or DOCX file (first bytes: {:?})",
                path.display(),
                magic
            ),
        })
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DocumentFormat::Pdf => "PDF",
            DocumentFormat::Docx => "DOCX",
        })
    }
}

/// A document read into memory and ready for extraction.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub bytes: Vec<u8>,
    pub format: DocumentFormat,
    /// File name used in logs and progress events.
    pub name: String,
}

/// The resolved input — either a local path or a downloaded temp file.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; document downloaded to a temp directory.
    /// The `TempDir` is kept alive to prevent cleanup until processing completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Get the path to the document regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local file path.
///
/// If the input is a URL, download it to a temporary directory.
/// If the input is a local file, validate it exists and is readable.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, NotesError> {
    if input.trim().is_empty() {
        return Err(NotesError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Read a resolved document, enforcing the size limit and detecting its format.
pub async fn load_document(path: &Path, max_file_size_mb: u64) -> Result<LoadedDocument, NotesError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => NotesError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => NotesError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    check_size(path, bytes.len(), max_file_size_mb)?;
    let format = DocumentFormat::detect(&bytes, path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    debug!("Loaded {} '{}' ({} bytes)", format, name, bytes.len());
    Ok(LoadedDocument {
        bytes,
        format,
        name,
    })
}

fn check_size(path: &Path, len: usize, max_file_size_mb: u64) -> Result<(), NotesError> {
    let size_mb = len as f64 / (1024.0 * 1024.0);
    if size_mb > max_file_size_mb as f64 {
        return Err(NotesError::FileTooLarge {
            path: path.to_path_buf(),
            size_mb,
            limit_mb: max_file_size_mb,
        });
    }
    Ok(())
}

/// Resolve a local file path, validating existence and read permission.
fn resolve_local(path_str: &str) -> Result<ResolvedInput, NotesError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(NotesError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(NotesError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(NotesError::FileNotFound { path });
        }
    }

    debug!("Resolved local document: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

/// Download a URL to a temporary directory and return the path.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, NotesError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| NotesError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            NotesError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            NotesError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(NotesError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let filename = filename_from_url(url, content_type.as_deref());

    let temp_dir = TempDir::new().map_err(|e| NotesError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| NotesError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| NotesError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded to: {}", file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Pick a local file name for a download.
///
/// The last URL path segment is used when present. A PDF or DOCX
/// `Content-Type` decides the extension, since format detection relies on it
/// for DOCX.
fn filename_from_url(url: &str, content_type: Option<&str>) -> String {
    let segment = reqwest::Url::parse(url).ok().and_then(|parsed| {
        parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
            .filter(|last| !last.is_empty())
    });
    let served = content_type.and_then(|ct| DocumentFormat::from_mime(ct).ok());

    match (segment, served) {
        (Some(name), Some(format)) => {
            let ext = Path::new(&name)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase());
            if ext.as_deref() == Some(format.extension()) {
                name
            } else {
                format!("{name}.{}", format.extension())
            }
        }
        (None, Some(format)) => format!("downloaded.{}", format.extension()),
        (Some(name), None) if name.contains('.') => name,
        _ => "downloaded.pdf".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url_path() {
        assert_eq!(filename_from_url("https://x.org/books/ch1.docx", None), "ch1.docx");
        assert_eq!(filename_from_url("https://x.org/download", None), "downloaded.pdf");
        assert_eq!(
            filename_from_url("https://x.org/books/ch1.pdf", Some("application/pdf")),
            "ch1.pdf"
        );
    }

    #[test]
    fn filename_follows_served_docx_type() {
        assert_eq!(
            filename_from_url("https://x.org/files/4711", Some(DOCX_MIME)),
            "4711.docx"
        );
        assert_eq!(
            filename_from_url("https://x.org/", Some("application/pdf; charset=binary")),
            "downloaded.pdf"
        );
        assert_eq!(
            filename_from_url("https://x.org/get.php", Some(DOCX_MIME)),
            "get.php.docx"
        );
        assert_eq!(
            filename_from_url("https://x.org/files/4711", Some("application/octet-stream")),
            "downloaded.pdf"
        );
        // The chosen name is what format detection keys DOCX on.
        let name = filename_from_url("https://x.org/files/4711", Some(DOCX_MIME));
        assert_eq!(
            DocumentFormat::detect(b"PK\x03\x04rest", Path::new(&name)).unwrap(),
            DocumentFormat::Docx
        );
    }

    #[test]
    fn detect_pdf_by_magic() {
        let fmt = DocumentFormat::detect(b"%PDF-1.7\n", Path::new("anything.bin")).unwrap();
        assert_eq!(fmt, DocumentFormat::Pdf);
    }

    #[test]
    fn detect_docx_needs_zip_magic_and_extension() {
        let zip = b"PK\x03\x04rest";
        assert_eq!(
            DocumentFormat::detect(zip, Path::new("notes.DOCX")).unwrap(),
            DocumentFormat::Docx
        );
        assert!(DocumentFormat::detect(zip, Path::new("archive.zip")).is_err());
    }

    #[test]
    fn detect_rejects_plain_text() {
        let err = DocumentFormat::detect(b"hello", Path::new("a.txt")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn from_mime_accepts_parameters_and_rejects_others() {
        assert_eq!(
            DocumentFormat::from_mime("application/PDF; charset=binary").unwrap(),
            DocumentFormat::Pdf
        );
        assert_eq!(
            DocumentFormat::from_mime(DOCX_MIME).unwrap(),
            DocumentFormat::Docx
        );
        assert!(DocumentFormat::from_mime("text/plain").is_err());
    }

    #[test]
    fn size_limit_is_enforced() {
        let err = check_size(Path::new("big.pdf"), 3 * 1024 * 1024, 2).unwrap_err();
        assert!(matches!(err, NotesError::FileTooLarge { limit_mb: 2, .. }));
        assert!(check_size(Path::new("ok.pdf"), 1024, 2).is_ok());
    }

    #[tokio::test]
    async fn load_document_reads_pdf() {
        let mut tmp = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        tmp.write_all(b"%PDF-1.4 body").unwrap();
        let doc = load_document(tmp.path(), 50).await.unwrap();
        assert_eq!(doc.format, DocumentFormat::Pdf);
        assert_eq!(doc.bytes.len(), 13);
        assert!(doc.name.ends_with(".pdf"));
    }

    #[tokio::test]
    async fn resolve_missing_file() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.err().unwrap();
        assert!(matches!(err, NotesError::FileNotFound { .. }));
    }
}
