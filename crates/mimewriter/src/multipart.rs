use crate::HeaderMap;
use std::io::Write;

/// Streams a multipart body: each call to `create_part` writes the
/// delimiter line and the part headers and hands back a writer for the
/// part content. `close` writes the final delimiter.
///
/// The writer only produces the body; the `Content-Type` field that
/// names the boundary belongs to the enclosing header, which the
/// caller builds using `boundary()`.
pub struct MultipartWriter<W: Write> {
    out: W,
    boundary: String,
    parts_written: usize,
}

impl<W: Write> MultipartWriter<W> {
    /// Create a writer with a freshly generated random boundary
    pub fn new(out: W) -> Self {
        Self::with_boundary(out, generate_boundary())
    }

    pub fn with_boundary<B: Into<String>>(out: W, boundary: B) -> Self {
        Self {
            out,
            boundary: boundary.into(),
            parts_written: 0,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn create_part(&mut self, headers: &HeaderMap) -> std::io::Result<PartWriter<'_, W>> {
        if self.parts_written > 0 {
            self.out.write_all(b"\r\n")?;
        }
        write!(self.out, "--{}\r\n", self.boundary)?;
        headers.write_to(&mut self.out)?;
        self.parts_written += 1;
        Ok(PartWriter { out: &mut self.out })
    }

    /// Write the closing delimiter and return the underlying stream
    pub fn close(mut self) -> std::io::Result<W> {
        if self.parts_written > 0 {
            self.out.write_all(b"\r\n")?;
        }
        write!(self.out, "--{}--\r\n", self.boundary)?;
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Writes the content of a single part
pub struct PartWriter<'a, W: Write> {
    out: &'a mut W,
}

impl<W: Write> Write for PartWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.out.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.out.flush()
    }
}

/// Generate a random boundary.
/// The url-safe alphabet is used so that the boundary never contains
/// a tspecial and can appear unquoted in a Content-Type parameter.
pub fn generate_boundary() -> String {
    let uuid = uuid::Uuid::new_v4();
    data_encoding::BASE64URL_NOPAD.encode(uuid.as_bytes())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn basic() {
        let mut writer = MultipartWriter::with_boundary(vec![], "mm-boundary");

        let mut headers = HeaderMap::default();
        headers.add("Content-Type", "text/plain");
        {
            let mut part = writer.create_part(&headers).unwrap();
            part.write_all(b"hello").unwrap();
        }

        let mut headers = HeaderMap::default();
        headers.add("Content-Type", "message/delivery-status");
        {
            let mut part = writer.create_part(&headers).unwrap();
            part.write_all(b"Action: failed\r\n\r\n").unwrap();
        }

        let out = writer.close().unwrap();
        k9::assert_equal!(
            String::from_utf8(out).unwrap(),
            concat!(
                "--mm-boundary\r\n",
                "Content-Type: text/plain\r\n",
                "\r\n",
                "hello\r\n",
                "--mm-boundary\r\n",
                "Content-Type: message/delivery-status\r\n",
                "\r\n",
                "Action: failed\r\n",
                "\r\n",
                "\r\n",
                "--mm-boundary--\r\n",
            )
        );
    }

    #[test]
    fn no_parts() {
        let writer = MultipartWriter::with_boundary(vec![], "b");
        let out = writer.close().unwrap();
        assert_eq!(out, b"--b--\r\n");
    }

    #[test]
    fn random_boundaries() {
        let a = MultipartWriter::new(vec![]);
        let b = MultipartWriter::new(vec![]);
        assert_ne!(a.boundary(), b.boundary());
        assert_eq!(a.boundary().len(), 22);
        assert!(a
            .boundary()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
