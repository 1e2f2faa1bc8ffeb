// src/document.rs

/// Declared media kind of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Image,
}

impl DocumentKind {
    /// Map an accepted file extension (`pdf`, `png`, `jpg`, `jpeg`) to a kind.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "png" | "jpg" | "jpeg" => Some(DocumentKind::Image),
            _ => None,
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.trim().to_ascii_lowercase();
        if mime == "application/pdf" {
            Some(DocumentKind::Pdf)
        } else if mime.starts_with("image/") {
            Some(DocumentKind::Image)
        } else {
            None
        }
    }
}

/// One uploaded document: raw bytes plus its declared kind and display name.
/// Created per file, discarded after the batch completes.
#[derive(Debug, Clone)]
pub struct DocumentPayload {
    pub name: String,
    pub kind: DocumentKind,
    pub bytes: Vec<u8>,
}

impl DocumentPayload {
    pub fn new(name: impl Into<String>, kind: DocumentKind, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            kind,
            bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_extensions() {
        assert_eq!(DocumentKind::from_extension("pdf"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_extension("PDF"), Some(DocumentKind::Pdf));
        assert_eq!(
            DocumentKind::from_extension("png"),
            Some(DocumentKind::Image)
        );
        assert_eq!(
            DocumentKind::from_extension("jpg"),
            Some(DocumentKind::Image)
        );
        assert_eq!(
            DocumentKind::from_extension("JPEG"),
            Some(DocumentKind::Image)
        );
        assert_eq!(DocumentKind::from_extension("docx"), None);
        assert_eq!(DocumentKind::from_extension(""), None);
    }

    #[test]
    fn mime_mapping() {
        assert_eq!(
            DocumentKind::from_mime("application/pdf"),
            Some(DocumentKind::Pdf)
        );
        assert_eq!(
            DocumentKind::from_mime("image/png"),
            Some(DocumentKind::Image)
        );
        assert_eq!(
            DocumentKind::from_mime("image/jpeg"),
            Some(DocumentKind::Image)
        );
        assert_eq!(DocumentKind::from_mime("text/plain"), None);
    }
}
