use crate::client_types::{PendingReply, ReplyLine};
use crate::{
    AsyncReadAndWrite, BoxedAsyncReadAndWrite, Command, ForwardPath, Response, ReversePath,
    SmtpClientTimeouts,
};
use memchr::memmem::Finder;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::timeout;

const MAX_LINE_LEN: usize = 4096;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("reply is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed reply line {0:?}")]
    MalformedReply(String),
    #[error("reply line is longer than {MAX_LINE_LEN} bytes")]
    ReplyTooLong,
    #[error("connection closed")]
    NotConnected,
    #[error("rejected: {}", .0.to_single_line())]
    Rejected(Response),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("connecting to {address} timed out after {duration:?}")]
    ConnectTimeout { address: String, duration: Duration },
    #[error("no reply to {command} within {duration:?}")]
    ReplyTimeout { command: String, duration: Duration },
    #[error("writing {command} timed out after {duration:?}")]
    WriteTimeout { command: String, duration: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsmtpCapability {
    pub name: String,
    pub param: Option<String>,
}

/// A single, sequential SMTP session
#[derive(Debug)]
pub struct SmtpClient {
    stream: Option<BoxedAsyncReadAndWrite>,
    peer: String,
    capabilities: HashMap<String, EsmtpCapability>,
    buffer: Vec<u8>,
    timeouts: SmtpClientTimeouts,
}

/// The host portion of `host:port` or `[literal]:port`, for logging
fn peer_name(addr: &str) -> &str {
    let host = match addr.rsplit_once(':') {
        Some((host, port)) if port.bytes().all(|b| b.is_ascii_digit()) => host,
        _ => addr,
    };
    host.trim_start_matches('[').trim_end_matches(']')
}

fn accept(response: Response, codes: &[u16]) -> Result<Response, ClientError> {
    if codes.contains(&response.code) {
        Ok(response)
    } else {
        Err(ClientError::Rejected(response))
    }
}

impl SmtpClient {
    /// Connect to `addr`. The banner is not consumed;
    /// call `read_greeting` next.
    pub async fn new<A: ToSocketAddrs + ToString + Clone>(
        addr: A,
        timeouts: SmtpClientTimeouts,
    ) -> Result<Self, ClientError> {
        let stream = timeout(timeouts.connect, TcpStream::connect(addr.clone()))
            .await
            .map_err(|_| ClientError::ConnectTimeout {
                address: addr.to_string(),
                duration: timeouts.connect,
            })??;
        // Each command waits for its reply, so don't delay small writes
        stream.set_nodelay(true)?;
        Ok(Self::with_stream(stream, addr.to_string(), timeouts))
    }

    pub fn with_stream<S: AsyncReadAndWrite + 'static, H: AsRef<str>>(
        stream: S,
        peer: H,
        timeouts: SmtpClientTimeouts,
    ) -> Self {
        Self {
            stream: Some(Box::new(stream)),
            peer: peer_name(peer.as_ref()).to_string(),
            capabilities: HashMap::new(),
            buffer: Vec::with_capacity(1024),
            timeouts,
        }
    }

    pub fn timeouts(&self) -> &SmtpClientTimeouts {
        &self.timeouts
    }

    /// The extensions advertised in the EHLO reply, keyed by
    /// their uppercased name. Empty after a HELO.
    pub fn capabilities(&self) -> &HashMap<String, EsmtpCapability> {
        &self.capabilities
    }

    async fn read_line(
        &mut self,
        duration: Duration,
        waiting_for: &str,
    ) -> Result<String, ClientError> {
        loop {
            if let Some(end) = memchr::memmem::find(&self.buffer, b"\r\n") {
                let mut line: Vec<u8> = self.buffer.drain(..end + 2).collect();
                line.truncate(end);
                return Ok(String::from_utf8(line)?);
            }
            if self.buffer.len() > MAX_LINE_LEN {
                self.buffer.clear();
                return Err(ClientError::ReplyTooLong);
            }

            let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;
            let mut chunk = [0u8; 1024];
            let size = timeout(duration, stream.read(&mut chunk))
                .await
                .map_err(|_| ClientError::ReplyTimeout {
                    command: waiting_for.to_string(),
                    duration,
                })??;
            if size == 0 {
                self.stream.take();
                return Err(ClientError::NotConnected);
            }
            self.buffer.extend_from_slice(&chunk[..size]);
        }
    }

    async fn read_reply(
        &mut self,
        command: Option<&Command>,
        duration: Duration,
    ) -> Result<Response, ClientError> {
        let waiting_for = match command {
            Some(command) => command.encode().trim_end().to_string(),
            None => "greeting".to_string(),
        };

        let line = self.read_line(duration, &waiting_for).await?;
        tracing::trace!("recv<-{}: {line}", self.peer);
        let first =
            ReplyLine::parse(&line).ok_or_else(|| ClientError::MalformedReply(line.clone()))?;
        let mut reply = PendingReply::start(&first);
        let mut last = first.last;

        while !last {
            let line = self.read_line(duration, &waiting_for).await?;
            tracing::trace!("recv<-{}: {line}", self.peer);
            last = match ReplyLine::parse(&line) {
                Some(next) if reply.push(&next) => next.last,
                _ => return Err(ClientError::MalformedReply(line)),
            };
        }

        Ok(reply.finish(command.map(Command::encode)))
    }

    async fn write_all(
        &mut self,
        data: &[u8],
        duration: Duration,
        what: &str,
    ) -> Result<(), ClientError> {
        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;
        let write = async {
            stream.write_all(data).await?;
            stream.flush().await
        };
        timeout(duration, write)
            .await
            .map_err(|_| ClientError::WriteTimeout {
                command: what.to_string(),
                duration,
            })?
            .map_err(ClientError::from)
    }

    /// Send `command` and return the reply, whatever its code
    pub async fn send_command(&mut self, command: &Command) -> Result<Response, ClientError> {
        let line = command.encode();
        tracing::trace!("send->{}: {}", self.peer, line.trim_end());
        self.write_all(
            line.as_bytes(),
            command.write_timeout(&self.timeouts),
            line.trim_end(),
        )
        .await?;
        self.read_reply(Some(command), command.reply_timeout(&self.timeouts))
            .await
    }

    /// Read the banner that the server sends on connect
    pub async fn read_greeting(&mut self) -> Result<Response, ClientError> {
        let response = self.read_reply(None, self.timeouts.greeting).await?;
        accept(response, &[220])
    }

    pub async fn ehlo(
        &mut self,
        name: &str,
    ) -> Result<&HashMap<String, EsmtpCapability>, ClientError> {
        let response = self.send_command(&Command::Ehlo(name.to_string())).await?;
        let response = accept(response, &[250])?;

        // The first line is the server's greeting, each
        // following line names one extension
        self.capabilities = response
            .content
            .lines()
            .skip(1)
            .filter(|line| !line.is_empty())
            .map(|line| {
                let (name, param) = match line.split_once(' ') {
                    Some((name, param)) => (name, Some(param.to_string())),
                    None => (line, None),
                };
                (
                    name.to_ascii_uppercase(),
                    EsmtpCapability {
                        name: name.to_string(),
                        param,
                    },
                )
            })
            .collect();
        Ok(&self.capabilities)
    }

    pub async fn helo(&mut self, name: &str) -> Result<Response, ClientError> {
        let response = self.send_command(&Command::Helo(name.to_string())).await?;
        self.capabilities.clear();
        accept(response, &[250])
    }

    /// Greet the server with EHLO, or with HELO if it
    /// permanently rejects EHLO
    pub async fn hello(&mut self, name: &str) -> Result<(), ClientError> {
        match self.ehlo(name).await.map(|_| ()) {
            Ok(()) => Ok(()),
            Err(ClientError::Rejected(response)) if response.is_permanent() => {
                tracing::debug!(
                    "{}: EHLO rejected ({}), trying HELO",
                    self.peer,
                    response.to_single_line()
                );
                self.helo(name).await.map(|_| ())
            }
            Err(err) => Err(err),
        }
    }

    pub async fn mail_from(&mut self, sender: ReversePath) -> Result<Response, ClientError> {
        let response = self.send_command(&Command::MailFrom(sender)).await?;
        accept(response, &[250])
    }

    pub async fn rcpt_to(&mut self, recipient: ForwardPath) -> Result<Response, ClientError> {
        let response = self.send_command(&Command::RcptTo(recipient)).await?;
        accept(response, &[250, 251])
    }

    /// Issue DATA. Once this succeeds the server expects
    /// the payload, which is sent with `send_data`.
    pub async fn data(&mut self) -> Result<Response, ClientError> {
        let response = self.send_command(&Command::Data).await?;
        accept(response, &[354])
    }

    /// Send the message payload followed by the end-of-data marker.
    /// Lines beginning with `.` are dot-stuffed.
    pub async fn send_data<B: AsRef<[u8]>>(&mut self, data: B) -> Result<Response, ClientError> {
        let data = dot_stuff(data.as_ref());
        let marker: &[u8] = if data.ends_with(b"\r\n") {
            b".\r\n"
        } else {
            b"\r\n.\r\n"
        };
        tracing::trace!(
            "send->{}: <{} bytes of message data>",
            self.peer,
            data.len()
        );

        self.write_all(&data, self.timeouts.data, "message data")
            .await?;
        self.write_all(
            marker,
            Command::DataDot.write_timeout(&self.timeouts),
            "end of data",
        )
        .await?;

        let response = self
            .read_reply(
                Some(&Command::DataDot),
                Command::DataDot.reply_timeout(&self.timeouts),
            )
            .await?;
        accept(response, &[250])
    }

    /// End the session and close the connection
    pub async fn quit(&mut self) -> Result<Response, ClientError> {
        let result = self.send_command(&Command::Quit).await;
        self.stream.take();
        accept(result?, &[221])
    }
}

/// Double any `.` found at the start of a line (RFC 5321 section 4.5.2)
fn dot_stuff(data: &[u8]) -> Cow<'_, [u8]> {
    static LINE_THEN_DOT: LazyLock<Finder<'static>> = LazyLock::new(|| Finder::new("\n."));

    let leading_dot = data.first() == Some(&b'.');
    let mut dots = LINE_THEN_DOT.find_iter(data).peekable();
    if !leading_dot && dots.peek().is_none() {
        return Cow::Borrowed(data);
    }

    let mut stuffed = Vec::with_capacity(data.len() + 16);
    if leading_dot {
        stuffed.push(b'.');
    }
    let mut copied = 0;
    for newline in dots {
        stuffed.extend_from_slice(&data[copied..=newline]);
        stuffed.push(b'.');
        copied = newline + 1;
    }
    stuffed.extend_from_slice(&data[copied..]);
    Cow::Owned(stuffed)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::EnhancedStatusCode;
    use tokio::io::{AsyncBufReadExt, BufReader};

    #[test]
    fn stuffing() {
        assert!(matches!(dot_stuff(b"foo"), Cow::Borrowed(_)));
        assert_eq!(&*dot_stuff(b".foo"), b"..foo");
        assert_eq!(&*dot_stuff(b"foo\r\n.bar"), b"foo\r\n..bar");
        assert_eq!(
            &*dot_stuff(b"foo\n.bar\n..baz\n"),
            b"foo\n..bar\n...baz\n"
        );
    }

    #[test]
    fn peer_names() {
        assert_eq!(peer_name("foo"), "foo");
        assert_eq!(peer_name("foo:25"), "foo");
        assert_eq!(peer_name("[foo]:25"), "foo");
        assert_eq!(peer_name("[::1]:25"), "::1");
        assert_eq!(peer_name("127.0.0.1:2525"), "127.0.0.1");
    }

    /// Plays the server side of a session over `stream`, answering
    /// each command from `script` in order; returns every line the
    /// client sent, including the message payload.
    async fn scripted_server(
        stream: tokio::io::DuplexStream,
        script: Vec<&'static str>,
    ) -> Vec<String> {
        let (read, mut write) = tokio::io::split(stream);
        let mut lines = BufReader::new(read).lines();
        let mut script = script.into_iter();
        let mut transcript = vec![];
        let mut in_data = false;

        write.write_all(b"220 mock ready\r\n").await.unwrap();
        while let Ok(Some(line)) = lines.next_line().await {
            let end_of_data = in_data && line == ".";
            transcript.push(line);
            if in_data && !end_of_data {
                continue;
            }
            in_data = false;
            let Some(reply) = script.next() else {
                break;
            };
            if reply.starts_with("354") {
                in_data = true;
            }
            write.write_all(reply.as_bytes()).await.unwrap();
        }
        transcript
    }

    fn timeouts() -> SmtpClientTimeouts {
        SmtpClientTimeouts::uniform(Duration::from_secs(20))
    }

    #[tokio::test]
    async fn full_session() {
        let (client_side, server_side) = tokio::io::duplex(8192);
        let server = tokio::spawn(scripted_server(
            server_side,
            vec![
                "250-mock greets you\r\n250-PIPELINING\r\n250 SIZE 1000\r\n",
                "250 2.1.0 ok\r\n",
                "250 2.1.5 ok\r\n",
                "354 go ahead\r\n",
                "250 2.0.0 queued\r\n",
                "221 bye\r\n",
            ],
        ));

        let mut client = SmtpClient::with_stream(client_side, "mock:25", timeouts());
        client.read_greeting().await.unwrap();
        client.hello("client.example.com").await.unwrap();
        assert!(client.capabilities().contains_key("PIPELINING"));
        assert_eq!(
            client.capabilities()["SIZE"].param.as_deref(),
            Some("1000")
        );

        client.mail_from(ReversePath::NullSender).await.unwrap();
        let rcpt = client
            .rcpt_to(ForwardPath::try_from("user@example.com").unwrap())
            .await
            .unwrap();
        assert_eq!(rcpt.enhanced_code, Some(EnhancedStatusCode::new(2, 1, 5)));
        client.data().await.unwrap();
        let accepted = client
            .send_data("Subject: hi\r\n\r\n.leading dot\r\n")
            .await
            .unwrap();
        assert_eq!(accepted.content, "queued");
        client.quit().await.unwrap();

        let transcript = server.await.unwrap();
        k9::assert_equal!(
            transcript,
            vec![
                "EHLO client.example.com",
                "MAIL FROM:<>",
                "RCPT TO:<user@example.com>",
                "DATA",
                "Subject: hi",
                "",
                "..leading dot",
                ".",
                "QUIT",
            ]
        );
    }

    #[tokio::test]
    async fn unterminated_payload_gets_crlf() {
        let (client_side, server_side) = tokio::io::duplex(8192);
        let server = tokio::spawn(scripted_server(
            server_side,
            vec!["354 go ahead\r\n", "250 ok\r\n"],
        ));

        let mut client = SmtpClient::with_stream(client_side, "mock", timeouts());
        client.read_greeting().await.unwrap();
        client.data().await.unwrap();
        client.send_data("no newline").await.unwrap();
        drop(client);

        k9::assert_equal!(server.await.unwrap(), vec!["DATA", "no newline", "."]);
    }

    #[tokio::test]
    async fn helo_fallback() {
        let (client_side, server_side) = tokio::io::duplex(8192);
        let server = tokio::spawn(scripted_server(
            server_side,
            vec!["502 5.5.1 what is EHLO\r\n", "250 hello\r\n"],
        ));

        let mut client = SmtpClient::with_stream(client_side, "mock", timeouts());
        client.read_greeting().await.unwrap();
        client.hello("client.example.com").await.unwrap();
        assert!(client.capabilities().is_empty());
        drop(client);

        k9::assert_equal!(
            server.await.unwrap(),
            vec!["EHLO client.example.com", "HELO client.example.com"]
        );
    }

    #[tokio::test]
    async fn transient_ehlo_failure_is_returned() {
        let (client_side, server_side) = tokio::io::duplex(8192);
        let _server = tokio::spawn(scripted_server(
            server_side,
            vec!["421 4.3.2 shutting down\r\n"],
        ));

        let mut client = SmtpClient::with_stream(client_side, "mock", timeouts());
        client.read_greeting().await.unwrap();
        match client.hello("client.example.com").await {
            Err(ClientError::Rejected(response)) => assert!(response.is_transient()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejected_recipient() {
        let (client_side, server_side) = tokio::io::duplex(8192);
        let _server = tokio::spawn(scripted_server(
            server_side,
            vec![
                "250 mock\r\n",
                "250 ok\r\n",
                "550-5.1.1 no such user\r\n550 5.1.1 really\r\n",
            ],
        ));

        let mut client = SmtpClient::with_stream(client_side, "mock", timeouts());
        client.read_greeting().await.unwrap();
        client.hello("client.example.com").await.unwrap();
        client.mail_from(ReversePath::NullSender).await.unwrap();
        let err = client
            .rcpt_to(ForwardPath::try_from("nobody@example.com").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "rejected: 550 5.1.1 no such user really");
        match err {
            ClientError::Rejected(response) => {
                assert_eq!(response.code, 550);
                assert_eq!(response.content, "no such user\nreally");
                assert_eq!(
                    response.command.as_deref(),
                    Some("RCPT TO:<nobody@example.com>\r\n")
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_reply() {
        let (client_side, mut server_side) = tokio::io::duplex(64);
        server_side.write_all(b"hello there\r\n").await.unwrap();
        let mut client = SmtpClient::with_stream(client_side, "mock", timeouts());
        assert!(matches!(
            client.read_greeting().await,
            Err(ClientError::MalformedReply(line)) if line == "hello there"
        ));
    }

    #[tokio::test]
    async fn eof_is_not_connected() {
        let (client_side, server_side) = tokio::io::duplex(64);
        drop(server_side);
        let mut client = SmtpClient::with_stream(client_side, "mock", timeouts());
        assert!(matches!(
            client.read_greeting().await,
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_server_times_out() {
        let (client_side, _server_side) = tokio::io::duplex(64);
        let mut client = SmtpClient::with_stream(client_side, "mock", timeouts());
        match client.read_greeting().await {
            Err(ClientError::ReplyTimeout { command, duration }) => {
                assert_eq!(command, "greeting");
                assert_eq!(duration, Duration::from_secs(20));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
