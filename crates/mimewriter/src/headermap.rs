use crate::{Header, MimeWriterError, Result};

/// Represents an ordered list of headers.
/// Note that there may be multiple headers with the same name.
/// Derefs to the underlying `Vec<Header>` for mutation,
/// but provides some accessors for retrieving headers by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    headers: Vec<Header>,
}

impl std::ops::Deref for HeaderMap {
    type Target = Vec<Header>;
    fn deref(&self) -> &Vec<Header> {
        &self.headers
    }
}

impl std::ops::DerefMut for HeaderMap {
    fn deref_mut(&mut self) -> &mut Vec<Header> {
        &mut self.headers
    }
}

impl HeaderMap {
    pub fn new(headers: Vec<Header>) -> Self {
        Self { headers }
    }

    /// Append a field, keeping any existing fields of the same name
    pub fn add<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        self.headers.push(Header::new(name, value));
    }

    /// Replace the value of the first field named `name`,
    /// or append it if there is no such field
    pub fn set<V: Into<String>>(&mut self, name: &str, value: V) {
        match self
            .headers
            .iter_mut()
            .find(|header| header.get_name().eq_ignore_ascii_case(name))
        {
            Some(header) => header.assign(value),
            None => self.add(name, value),
        }
    }

    pub fn get_first(&self, name: &str) -> Option<&Header> {
        self.iter_named(name).next()
    }

    pub fn get_last(&self, name: &str) -> Option<&Header> {
        self.iter_named(name).next_back()
    }

    pub fn iter_named<'a, 'name>(
        &'a self,
        name: &'name str,
    ) -> impl DoubleEndedIterator<Item = &'a Header> + 'name
    where
        'a: 'name,
    {
        self.headers
            .iter()
            .filter(move |header| header.get_name().eq_ignore_ascii_case(name))
    }

    /// Write each field in insertion order, followed by the
    /// empty line that terminates a header block
    pub fn write_to<W: std::io::Write + ?Sized>(&self, out: &mut W) -> std::io::Result<()> {
        for header in &self.headers {
            header.write_header(out)?;
        }
        out.write_all(b"\r\n")
    }

    pub fn to_header_string(&self) -> String {
        let mut result = String::new();
        for header in &self.headers {
            result.push_str(&header.to_header_string());
        }
        result.push_str("\r\n");
        result
    }

    /// Parse a block of header fields.
    /// Parsing stops at the first empty line; the returned offset
    /// is the position just after that line, which is where the
    /// body of the message starts. Continuation lines are joined
    /// onto the preceding field with a CRLF so that the folding is
    /// reproduced when the map is written back out.
    pub fn parse(block: &str) -> Result<(Self, usize)> {
        let mut headers: Vec<Header> = vec![];
        let mut offset = 0;

        while offset < block.len() {
            let remainder = &block[offset..];
            let (line, next) = match memchr::memchr(b'\n', remainder.as_bytes()) {
                Some(idx) => (&remainder[..idx], offset + idx + 1),
                None => (remainder, block.len()),
            };
            let line = line.strip_suffix('\r').unwrap_or(line);
            offset = next;

            if line.is_empty() {
                break;
            }

            if line.starts_with([' ', '\t']) {
                match headers.last_mut() {
                    Some(header) => {
                        let value = format!("{}\r\n{line}", header.get_value());
                        header.assign(value);
                    }
                    None => {
                        return Err(MimeWriterError::HeaderParse(format!(
                            "continuation line {line:?} has no preceding field"
                        )))
                    }
                }
                continue;
            }

            let (name, value) = line.split_once(':').ok_or_else(|| {
                MimeWriterError::HeaderParse(format!("missing colon in {line:?}"))
            })?;
            if name.is_empty() || name.contains([' ', '\t']) {
                return Err(MimeWriterError::HeaderParse(format!(
                    "invalid field name in {line:?}"
                )));
            }
            headers.push(Header::new(name, value.trim_start_matches([' ', '\t'])));
        }

        Ok((Self { headers }, offset))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn preserves_order_and_repeats() {
        let mut map = HeaderMap::default();
        map.add("Received", "from a");
        map.add("Subject", "hello");
        map.add("Received", "from b");

        k9::assert_equal!(
            map.to_header_string(),
            "Received: from a\r\nSubject: hello\r\nReceived: from b\r\n\r\n"
        );
        assert_eq!(map.get_first("received").unwrap().get_value(), "from a");
        assert_eq!(map.get_last("RECEIVED").unwrap().get_value(), "from b");
        assert_eq!(map.iter_named("Received").count(), 2);
    }

    #[test]
    fn set_replaces_first() {
        let mut map = HeaderMap::default();
        map.add("To", "a@example.com");
        map.set("to", "b@example.com");
        map.set("From", "c@example.com");
        k9::assert_equal!(
            map.to_header_string(),
            "To: b@example.com\r\nFrom: c@example.com\r\n\r\n"
        );
    }

    #[test]
    fn write_matches_string() {
        let mut map = HeaderMap::default();
        map.add("Action", "failed");
        map.add("Status", "5.1.1");
        let mut out = vec![];
        map.write_to(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), map.to_header_string());
    }

    #[test]
    fn empty_map_is_just_terminator() {
        assert_eq!(HeaderMap::default().to_header_string(), "\r\n");
    }

    #[test]
    fn parse_folded() {
        let block = "Subject: hello\r\n  there\r\nTo: someone@example.com\r\n\r\nbody\r\n";
        let (map, offset) = HeaderMap::parse(block).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(
            map.get_first("Subject").unwrap().get_value(),
            "hello\r\n  there"
        );
        assert_eq!(&block[offset..], "body\r\n");
        k9::assert_equal!(
            map.to_header_string(),
            "Subject: hello\r\n  there\r\nTo: someone@example.com\r\n\r\n"
        );
    }

    #[test]
    fn parse_bare_lf_and_no_body() {
        let (map, offset) = HeaderMap::parse("From: a@example.com\nTo: b@example.com\n").unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(offset, 38);
    }

    #[test]
    fn parse_errors() {
        assert_eq!(
            HeaderMap::parse("no colon here\r\n"),
            Err(MimeWriterError::HeaderParse(
                "missing colon in \"no colon here\"".to_string()
            ))
        );
        assert!(matches!(
            HeaderMap::parse(" leading continuation\r\n"),
            Err(MimeWriterError::HeaderParse(_))
        ));
        assert!(matches!(
            HeaderMap::parse("Bad Name: value\r\n"),
            Err(MimeWriterError::HeaderParse(_))
        ));
    }
}
