#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// The name portion of the header
    name: String,
    /// The value portion of the header.
    /// Folded values keep their embedded CRLF + whitespace
    /// continuation sequences so that they are written back
    /// exactly as they were received.
    value: String,
}

impl Header {
    pub fn new<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_value(&self) -> &str {
        &self.value
    }

    pub fn assign<V: Into<String>>(&mut self, value: V) {
        self.value = value.into();
    }

    /// Format the header into the provided output stream,
    /// as though writing it out as part of a mime part
    pub fn write_header<W: std::io::Write + ?Sized>(&self, out: &mut W) -> std::io::Result<()> {
        out.write_all(self.name.as_bytes())?;
        out.write_all(b": ")?;
        out.write_all(self.value.as_bytes())?;
        out.write_all(b"\r\n")
    }

    /// Convenience method wrapping write_header that returns
    /// the formatted header as a standalone string
    pub fn to_header_string(&self) -> String {
        format!("{}: {}\r\n", self.name, self.value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn header_string() {
        let header = Header::new("To", "someone@example.com");
        assert_eq!(header.to_header_string(), "To: someone@example.com\r\n");

        let mut out = vec![];
        header.write_header(&mut out).unwrap();
        assert_eq!(out, b"To: someone@example.com\r\n");
    }

    #[test]
    fn assign_replaces_value() {
        let mut header = Header::new("Subject", "hello");
        header.assign("goodbye");
        assert_eq!(header.get_value(), "goodbye");
        assert_eq!(header.get_name(), "Subject");
    }
}
