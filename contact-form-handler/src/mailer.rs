use async_trait::async_trait;
use lettre::{
    transport::smtp::authentication::{Credentials, Mechanism},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;
use tracing::{info, warn};

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: Message) -> Result<(), lambda_http::Error>;
}

pub struct SmtpMailer(AsyncSmtpTransport<Tokio1Executor>);

impl SmtpMailer {
    /// Builds the transport. No connection is opened until the first message is sent.
    pub fn new(
        smtp_url: &str,
        credentials: Option<Credentials>,
        timeout: Duration,
    ) -> Result<Self, lettre::transport::smtp::Error> {
        info!("Using SMTP server {smtp_url}");
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::from_url(smtp_url)?
            .authentication(vec![Mechanism::Plain, Mechanism::Login])
            .timeout(Some(timeout));

        // Sending credentials over a non-TLS connection is risky, so we only set the credentials
        // when the connection URL is over TLS. If the environment is misconfigured so that
        // the credentials are not sent, the server will reject the message.
        if let Some(credentials) = credentials {
            if smtp_url.starts_with("smtps://") {
                builder = builder.credentials(credentials);
            } else {
                warn!("Not sending SMTP credentials over unencrypted connection to {smtp_url}");
            }
        }

        Ok(Self(builder.build()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: Message) -> Result<(), lambda_http::Error> {
        self.0.send(message).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Mailer, SmtpMailer};
    use googletest::prelude::*;
    use lettre::{message::header::ContentType, Message};
    use serial_test::serial;
    use std::time::Duration;
    use test_support::fake_smtp::{start_poisoned_smtp_server, FakeSmtpServer};
    use tokio::time::timeout;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn arbitrary_message() -> Message {
        Message::builder()
            .from("Ada Lovelace <ada@example.com>".parse().unwrap())
            .to("Site Owner <owner@example.com>".parse().unwrap())
            .subject("Project Inquiry from Ada Lovelace")
            .header(ContentType::TEXT_HTML)
            .body("<p>Hello</p>".to_string())
            .unwrap()
    }

    #[googletest::test]
    #[tokio::test]
    #[serial]
    async fn delivers_message_to_smtp_server() {
        let fake_smtp = FakeSmtpServer::shared();
        fake_smtp.start();
        fake_smtp.flush().await;
        let mailer = SmtpMailer::new(&FakeSmtpServer::url(), None, TIMEOUT).unwrap();

        let result = mailer.send(arbitrary_message()).await;

        expect_that!(result.is_ok(), eq(true));
        expect_that!(
            timeout(Duration::from_secs(1), fake_smtp.last_mail_content()).await,
            ok(ok(all!(
                contains_substring("Subject: Project Inquiry from Ada Lovelace"),
                contains_substring("<p>Hello</p>")
            )))
        );
    }

    #[tokio::test]
    #[serial]
    async fn fails_when_smtp_server_rejects_session() -> Result<()> {
        let url = start_poisoned_smtp_server();
        let mailer = SmtpMailer::new(&url, None, TIMEOUT).unwrap();

        let result = mailer.send(arbitrary_message()).await;

        verify_that!(result.is_err(), eq(true))
    }

    #[tokio::test]
    async fn fails_when_smtp_server_is_unreachable() -> Result<()> {
        let mailer = SmtpMailer::new("smtp://127.0.0.1:9", None, TIMEOUT).unwrap();

        let result = mailer.send(arbitrary_message()).await;

        verify_that!(result.is_err(), eq(true))
    }
}
