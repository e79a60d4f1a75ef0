//! multipart/form-data bodies (RFC 7578).
//!
//! A [`Form`] accumulates text fields and file parts in insertion order and
//! encodes them against a boundary: caller-generated or a random 48-char
//! dash+digit string.

use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{self, Result};

/// Boundary source: the default random generator or a caller-supplied one.
pub type BoundaryGenerator = Arc<dyn Fn() -> String + Send + Sync>;

pub(crate) fn random_boundary() -> String {
    let mut boundary = String::with_capacity(48);
    boundary.push_str("------------------------");
    for _ in 0..24 {
        boundary.push(char::from(b'0' + fastrand::u8(0..10)));
    }
    boundary
}

/// One part of a multipart body.
pub struct Part {
    value: Bytes,
    file_name: Option<Cow<'static, str>>,
    mime: Option<String>,
}

impl Part {
    /// A plain text field value.
    pub fn text<T: Into<Cow<'static, str>>>(value: T) -> Part {
        Part {
            value: Bytes::from(value.into().into_owned()),
            file_name: None,
            mime: None,
        }
    }

    /// A file part from in-memory bytes.
    pub fn bytes<B: Into<Bytes>>(value: B) -> Part {
        Part {
            value: value.into(),
            file_name: None,
            mime: None,
        }
    }

    /// A file part read from disk; content type inferred from the
    /// extension, `application/octet-stream` otherwise.
    pub async fn file_path<P: AsRef<Path>>(path: P) -> Result<Part> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let value = tokio::fs::read(path).await.map_err(error::body)?;
        Ok(Part {
            value: Bytes::from(value),
            file_name: file_name.map(Cow::Owned),
            mime: Some(mime.essence_str().to_string()),
        })
    }

    /// A file part drained from an async reader.
    pub async fn reader<R>(mut reader: R) -> Result<Part>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        use tokio::io::AsyncReadExt;
        let mut value = Vec::new();
        reader.read_to_end(&mut value).await.map_err(error::body)?;
        Ok(Part {
            value: Bytes::from(value),
            file_name: None,
            mime: None,
        })
    }

    /// Set the part's file name.
    #[must_use]
    pub fn file_name<T: Into<Cow<'static, str>>>(mut self, name: T) -> Part {
        let name = name.into();
        if self.mime.is_none() {
            self.mime = Some(
                mime_guess::from_path(name.as_ref())
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string(),
            );
        }
        self.file_name = Some(name);
        self
    }

    /// Override the part's content type.
    #[must_use]
    pub fn mime_str(mut self, mime: &str) -> Part {
        self.mime = Some(mime.to_string());
        self
    }
}

impl fmt::Debug for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Part")
            .field("len", &self.value.len())
            .field("file_name", &self.file_name)
            .field("mime", &self.mime)
            .finish()
    }
}

/// A multipart form under construction.
pub struct Form {
    boundary: String,
    fields: Vec<(Cow<'static, str>, Part)>,
}

impl Default for Form {
    fn default() -> Self {
        Self::new()
    }
}

impl Form {
    pub fn new() -> Form {
        Form {
            boundary: random_boundary(),
            fields: Vec::new(),
        }
    }

    /// Use a caller-controlled boundary generator.
    pub fn with_boundary(generator: &BoundaryGenerator) -> Form {
        Form {
            boundary: generator(),
            fields: Vec::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Add a text field.
    #[must_use]
    pub fn text<T, U>(self, name: T, value: U) -> Form
    where
        T: Into<Cow<'static, str>>,
        U: Into<Cow<'static, str>>,
    {
        self.part(name, Part::text(value))
    }

    /// Add a customized part.
    #[must_use]
    pub fn part<T>(mut self, name: T, part: Part) -> Form
    where
        T: Into<Cow<'static, str>>,
    {
        self.fields.push((name.into(), part));
        self
    }

    /// The `Content-Type` header value for this form.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Encode the full body, parts in insertion order.
    pub fn encode(&self) -> Bytes {
        let mut out = Vec::with_capacity(
            self.fields
                .iter()
                .map(|(_, part)| part.value.len() + 128)
                .sum(),
        );
        for (name, part) in &self.fields {
            out.extend_from_slice(b"--");
            out.extend_from_slice(self.boundary.as_bytes());
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(b"Content-Disposition: form-data; name=\"");
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b"\"");
            if let Some(file_name) = &part.file_name {
                out.extend_from_slice(b"; filename=\"");
                out.extend_from_slice(file_name.as_bytes());
                out.extend_from_slice(b"\"");
            }
            out.extend_from_slice(b"\r\n");
            if let Some(mime) = &part.mime {
                out.extend_from_slice(b"Content-Type: ");
                out.extend_from_slice(mime.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(&part.value);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"--");
        out.extend_from_slice(self.boundary.as_bytes());
        out.extend_from_slice(b"--\r\n");
        Bytes::from(out)
    }
}

impl fmt::Debug for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Form")
            .field("boundary", &self.boundary)
            .field("parts", &self.fields.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_fields_in_insertion_order() {
        let form = Form::new()
            .text("first", "1")
            .part("f", Part::bytes(&b"hello"[..]).file_name("x.txt"))
            .text("last", "z");
        let body = String::from_utf8(form.encode().to_vec()).unwrap();

        let first = body.find("name=\"first\"").unwrap();
        let file = body
            .find("Content-Disposition: form-data; name=\"f\"; filename=\"x.txt\"")
            .unwrap();
        let last = body.find("name=\"last\"").unwrap();
        assert!(first < file && file < last);
        assert!(body.contains("Content-Type: text/plain"));
        assert!(body.contains("hello"));
        assert!(body.ends_with(&format!("--{}--\r\n", form.boundary())));
    }

    #[test]
    fn custom_boundary_generator() {
        let generator: BoundaryGenerator = Arc::new(|| "fixed-boundary".to_string());
        let form = Form::with_boundary(&generator).text("a", "b");
        assert_eq!(form.boundary(), "fixed-boundary");
        assert_eq!(
            form.content_type(),
            "multipart/form-data; boundary=fixed-boundary"
        );
    }

    #[test]
    fn default_boundary_shape() {
        let boundary = random_boundary();
        assert_eq!(boundary.len(), 48);
        assert!(boundary.starts_with("------------------------"));
        assert!(boundary[24..].bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn unknown_extension_falls_back_to_octet_stream() {
        let part = Part::bytes(&b"x"[..]).file_name("data.weirdext");
        assert_eq!(part.mime.as_deref(), Some("application/octet-stream"));
    }
}
