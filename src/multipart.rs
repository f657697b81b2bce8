//! multipart/form-data body encoder.
//!
//! Builds the exact bytes of an upload request body from a list of named parts
//! so the wire format can be inspected and tested without a live server.

use crate::errors::{AppError, AppResult};

const CRLF: &[u8] = b"\r\n";
const MAX_BOUNDARY_LEN: usize = 70;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartBody {
    Text(String),
    File {
        filename: String,
        content_type: String,
        data: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    pub body: PartBody,
}

impl Part {
    fn content(&self) -> &[u8] {
        match &self.body {
            PartBody::Text(value) => value.as_bytes(),
            PartBody::File { data, .. } => data,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MultipartBody {
    boundary: String,
    parts: Vec<Part>,
}

impl Default for MultipartBody {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartBody {
    pub fn new() -> Self {
        Self {
            boundary: format!("vecpic-{}", uuid::Uuid::new_v4().simple()),
            parts: Vec::new(),
        }
    }

    /// Use a fixed boundary; it must follow RFC 2046 (1-70 chars, no trailing space).
    pub fn with_boundary(boundary: &str) -> AppResult<Self> {
        let valid_chars = boundary.chars().all(|c| {
            c.is_ascii_alphanumeric() || "'()+_,-./:=? ".contains(c)
        });

        if boundary.is_empty()
            || boundary.len() > MAX_BOUNDARY_LEN
            || boundary.ends_with(' ')
            || !valid_chars
        {
            return Err(AppError::encoding(format!("invalid boundary '{}'", boundary)));
        }

        Ok(Self {
            boundary: boundary.to_string(),
            parts: Vec::new(),
        })
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(Part {
            name: name.into(),
            body: PartBody::Text(value.into()),
        });
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        self.parts.push(Part {
            name: name.into(),
            body: PartBody::File {
                filename: filename.into(),
                content_type: content_type.into(),
                data,
            },
        });
        self
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Value for the request's Content-Type header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn encode(&self) -> AppResult<Vec<u8>> {
        let delimiter = format!("--{}", self.boundary);
        let capacity = self
            .parts
            .iter()
            .map(|p| p.content().len() + p.name.len() + 128 + delimiter.len())
            .sum::<usize>()
            + delimiter.len()
            + 4;
        let mut out = Vec::with_capacity(capacity);

        for part in &self.parts {
            if part.name.is_empty() {
                return Err(AppError::encoding("part name must not be empty"));
            }
            if contains(part.content(), delimiter.as_bytes()) {
                return Err(AppError::encoding(format!(
                    "content of part '{}' contains the boundary",
                    part.name
                )));
            }

            out.extend_from_slice(delimiter.as_bytes());
            out.extend_from_slice(CRLF);

            let mut disposition = format!(
                "Content-Disposition: form-data; name=\"{}\"",
                quote(&part.name)?
            );
            if let PartBody::File { filename, .. } = &part.body {
                disposition.push_str(&format!("; filename=\"{}\"", quote(filename)?));
            }
            out.extend_from_slice(disposition.as_bytes());
            out.extend_from_slice(CRLF);

            if let PartBody::File { content_type, .. } = &part.body {
                check_header_value(content_type)?;
                out.extend_from_slice(format!("Content-Type: {}", content_type).as_bytes());
                out.extend_from_slice(CRLF);
            }

            out.extend_from_slice(CRLF);
            out.extend_from_slice(part.content());
            out.extend_from_slice(CRLF);
        }

        out.extend_from_slice(delimiter.as_bytes());
        out.extend_from_slice(b"--");
        out.extend_from_slice(CRLF);

        Ok(out)
    }
}

fn check_header_value(value: &str) -> AppResult<()> {
    if value.contains('\r') || value.contains('\n') {
        return Err(AppError::encoding(format!(
            "header value {:?} contains a line break",
            value
        )));
    }
    Ok(())
}

// Quoted-string form used by browsers: '"' becomes %22, backslashes pass through
// since form-data parsers do not unescape them.
fn quote(value: &str) -> AppResult<String> {
    check_header_value(value)?;
    Ok(value.replace('"', "%22"))
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_exact_layout() {
        let body = MultipartBody::with_boundary("XyZ")
            .unwrap()
            .file("file", "x.jpg", "image/jpeg", b"abc".to_vec())
            .text("colormode", "color");

        let encoded = String::from_utf8(body.encode().unwrap()).unwrap();
        let expected = "--XyZ\r\n\
            Content-Disposition: form-data; name=\"file\"; filename=\"x.jpg\"\r\n\
            Content-Type: image/jpeg\r\n\
            \r\n\
            abc\r\n\
            --XyZ\r\n\
            Content-Disposition: form-data; name=\"colormode\"\r\n\
            \r\n\
            color\r\n\
            --XyZ--\r\n";

        assert_eq!(encoded, expected);
        assert_eq!(body.content_type(), "multipart/form-data; boundary=XyZ");
    }

    #[test]
    fn test_generated_boundaries_differ() {
        let a = MultipartBody::new();
        let b = MultipartBody::new();
        assert_ne!(a.boundary(), b.boundary());
        assert!(a.boundary().len() <= MAX_BOUNDARY_LEN);
        assert!(MultipartBody::with_boundary(a.boundary()).is_ok());
    }

    #[test]
    fn test_quotes_are_escaped() {
        let body = MultipartBody::with_boundary("b")
            .unwrap()
            .file("file", "my \"best\" shot.png", "image/png", vec![1, 2, 3]);

        let encoded = body.encode().unwrap();
        let text = String::from_utf8_lossy(&encoded);
        assert!(text.contains("filename=\"my %22best%22 shot.png\""));
    }

    #[test]
    fn test_backslashes_pass_through() {
        let body = MultipartBody::with_boundary("b")
            .unwrap()
            .text("a\\\"b", "v");

        let encoded = body.encode().unwrap();
        let text = String::from_utf8_lossy(&encoded);
        assert!(text.contains("name=\"a\\%22b\""));
    }

    #[test]
    fn test_header_injection_rejected() {
        let body = MultipartBody::new().text("colormode\r\nX-Evil: 1", "color");
        assert!(matches!(body.encode(), Err(AppError::Encoding(_))));

        let body = MultipartBody::new().file("file", "x.jpg", "image/jpeg\r\n", vec![1]);
        assert!(matches!(body.encode(), Err(AppError::Encoding(_))));
    }

    #[test]
    fn test_boundary_collision_rejected() {
        let body = MultipartBody::with_boundary("abc")
            .unwrap()
            .text("note", "before --abc after");
        assert!(matches!(body.encode(), Err(AppError::Encoding(_))));
    }

    #[test]
    fn test_invalid_boundaries() {
        assert!(MultipartBody::with_boundary("").is_err());
        assert!(MultipartBody::with_boundary(&"a".repeat(71)).is_err());
        assert!(MultipartBody::with_boundary("trailing ").is_err());
        assert!(MultipartBody::with_boundary("semi;colon").is_err());
    }

    #[test]
    fn test_empty_body_is_just_the_close_delimiter() {
        let body = MultipartBody::with_boundary("end").unwrap();
        assert_eq!(body.encode().unwrap(), b"--end--\r\n".to_vec());
        assert!(body.parts().is_empty());
    }
}
