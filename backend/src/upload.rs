use actix_multipart::{Multipart, MultipartError};
use actix_web::http::header::{CONTENT_TYPE, HeaderMap};
use actix_web::web::{Bytes, BytesMut};
use futures_util::TryStreamExt;
use thiserror::Error;

pub const IMAGE_FIELD: &str = "image";
const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No image uploaded")]
    MissingImage,
    #[error("Image exceeds the {limit} byte upload limit")]
    TooLarge { limit: usize },
    #[error("Failed to read upload: {0}")]
    Multipart(#[from] MultipartError),
}

#[derive(Debug)]
pub struct ImageUpload {
    pub bytes: Bytes,
    pub mime_type: String,
    pub file_name: Option<String>,
}

pub fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false)
}

/// Reads the `image` field of a multipart form into memory. Other fields are
/// skipped; an empty `image` field is returned as-is and rejected downstream.
pub async fn read_image(mut payload: Multipart, limit: usize) -> Result<ImageUpload, UploadError> {
    while let Some(mut field) = payload.try_next().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let declared = field.content_type().map(|mime| mime.essence_str().to_string());
        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        let mut data = BytesMut::new();
        while let Some(chunk) = field.try_next().await? {
            if data.len() + chunk.len() > limit {
                return Err(UploadError::TooLarge { limit });
            }
            data.extend_from_slice(&chunk);
        }

        let bytes = data.freeze();
        let mime_type = resolve_mime(declared.as_deref(), &bytes);
        return Ok(ImageUpload {
            bytes,
            mime_type,
            file_name,
        });
    }
    Err(UploadError::MissingImage)
}

/// Declared type wins unless it is missing or generic, in which case the
/// format is sniffed from the leading bytes.
pub fn resolve_mime(declared: Option<&str>, bytes: &[u8]) -> String {
    match declared {
        Some(mime) if !mime.is_empty() && mime != OCTET_STREAM => mime.to_string(),
        _ => image::guess_format(bytes)
            .map(|format| format.to_mime_type().to_string())
            .unwrap_or_else(|_| declared.unwrap_or(OCTET_STREAM).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::header::HeaderValue;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const JPEG_MAGIC: &[u8] = b"\xff\xd8\xff\xe0\0\x10JFIF\0";

    #[test]
    fn declared_mime_is_kept() {
        assert_eq!(resolve_mime(Some("image/webp"), PNG_MAGIC), "image/webp");
    }

    #[test]
    fn generic_or_missing_mime_is_sniffed() {
        assert_eq!(resolve_mime(None, PNG_MAGIC), "image/png");
        assert_eq!(resolve_mime(Some(OCTET_STREAM), JPEG_MAGIC), "image/jpeg");
    }

    #[test]
    fn unknown_bytes_keep_declared_or_generic_mime() {
        assert_eq!(resolve_mime(None, b"not an image"), OCTET_STREAM);
        assert_eq!(resolve_mime(Some(OCTET_STREAM), b"???"), OCTET_STREAM);
    }

    #[test]
    fn multipart_detection_reads_content_type() {
        let mut headers = HeaderMap::new();
        assert!(!is_multipart(&headers));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert!(!is_multipart(&headers));
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("Multipart/Form-Data; boundary=abc"),
        );
        assert!(is_multipart(&headers));
    }
}
