use crate::address::select_encoding;
use crate::error::{DsnError, Result};
use crate::report::ReportAssembler;
use crate::types::{EncodingMode, Envelope, RecipientInfo, ReportingMtaInfo};
use mimewriter::HeaderMap;
use rfc5321::{ClientError, ForwardPath, ReversePath, SmtpClient, SmtpClientTimeouts};
use serde::{Deserialize, Serialize};
use tokio::net::ToSocketAddrs;

/// The `From` of every relayed report
pub const MAILER_DAEMON: &str = "MAILER-DAEMON (Mail Delivery System)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayOptions {
    /// The name we announce in EHLO/HELO
    #[serde(default = "RelayOptions::default_ehlo_name")]
    pub ehlo_name: String,

    #[serde(default)]
    pub timeouts: SmtpClientTimeouts,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            ehlo_name: Self::default_ehlo_name(),
            timeouts: SmtpClientTimeouts::default(),
        }
    }
}

impl RelayOptions {
    fn default_ehlo_name() -> String {
        "localhost".to_string()
    }
}

/// Generates a report and hands it to an SMTP relay.
/// Reports are sent from the null reverse-path so that they
/// can never cause a bounce of their own. Failures are returned
/// to the caller; nothing is retried.
#[derive(Default)]
pub struct RelayDispatcher {
    options: RelayOptions,
    assembler: ReportAssembler,
}

impl RelayDispatcher {
    pub fn new(options: RelayOptions) -> Self {
        Self {
            options,
            assembler: ReportAssembler::new(),
        }
    }

    pub fn with_assembler(mut self, assembler: ReportAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn options(&self) -> &RelayOptions {
        &self.options
    }

    pub async fn send<A: ToSocketAddrs + ToString + Clone>(
        &self,
        relay: A,
        mode: EncodingMode,
        envelope: &Envelope,
        reporting: &ReportingMtaInfo,
        recipients: &[RecipientInfo],
        original_headers: &HeaderMap,
    ) -> Result<()> {
        let envelope = Envelope {
            from: MAILER_DAEMON.to_string(),
            ..envelope.clone()
        };

        let mut body = vec![];
        let header = self.assembler.generate(
            mode,
            &envelope,
            reporting,
            recipients,
            original_headers,
            &mut body,
        )?;

        let forward_paths = recipients
            .iter()
            .map(|rcpt| {
                let address = select_encoding(mode, &rcpt.final_recipient)
                    .map_err(DsnError::transcoding("Final-Recipient"))?;
                ForwardPath::try_from(address.as_str())
                    .map_err(|err| DsnError::Dispatch(ClientError::InvalidAddress(err)))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut message = header.to_header_string().into_bytes();
        message.append(&mut body);

        let relay_name = relay.to_string();
        tracing::debug!("connecting to {relay_name} to send {}", envelope.message_id);
        let mut client = SmtpClient::new(relay, self.options.timeouts).await?;
        client.read_greeting().await?;
        client.hello(&self.options.ehlo_name).await?;

        client.mail_from(ReversePath::NullSender).await?;
        for path in forward_paths {
            tracing::debug!("{relay_name}: RCPT TO:<{path}>");
            client.rcpt_to(path).await?;
        }

        client.data().await?;
        let response = client.send_data(&message).await?;
        tracing::debug!(
            "{relay_name}: accepted {}: {}",
            envelope.message_id,
            response.to_single_line()
        );

        if let Err(err) = client.quit().await {
            tracing::warn!("{relay_name}: error during QUIT: {err:#}");
        }

        Ok(())
    }
}

/// Generate a report with the default notification text and send
/// it through `relay` using the default `RelayOptions`
pub async fn send_dsn<A: ToSocketAddrs + ToString + Clone>(
    relay: A,
    mode: EncodingMode,
    envelope: &Envelope,
    reporting: &ReportingMtaInfo,
    recipients: &[RecipientInfo],
    original_headers: &HeaderMap,
) -> Result<()> {
    RelayDispatcher::default()
        .send(
            relay,
            mode,
            envelope,
            reporting,
            recipients,
            original_headers,
        )
        .await
}
