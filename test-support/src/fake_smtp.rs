use crate::wait_until_listening;
use log::debug;
use mailin_embedded::{Handler, Server, SslConfig};
use std::{
    net::IpAddr,
    sync::{Arc, Once, OnceLock},
    time::Duration,
};
use tokio::{
    sync::watch::{self, error::RecvError, Receiver, Sender},
    time::timeout,
};

pub const SMTP_PORT: u16 = 4567;
pub const POISONED_SMTP_PORT: u16 = 4568;

const SERVER_NAME: &str = "contact.example";

#[derive(Clone)]
struct SmtpHandler(Vec<u8>, Arc<Sender<String>>);

impl Handler for SmtpHandler {
    fn data(&mut self, buf: &[u8]) -> std::io::Result<()> {
        debug!("Got data:\n{}", String::from_utf8_lossy(buf));
        self.0.extend(buf);
        Ok(())
    }

    fn data_end(&mut self) -> mailin_embedded::Response {
        let content = String::from_utf8_lossy(&self.0).into_owned();
        self.0.clear();
        let _ = self.1.send(content);
        mailin_embedded::response::OK
    }

    fn auth_plain(
        &mut self,
        authorization_id: &str,
        authentication_id: &str,
        password: &str,
    ) -> mailin_embedded::Response {
        debug!("Got authentication data {authorization_id}, {authentication_id}, {password}");
        mailin_embedded::response::AUTH_OK
    }
}

/// SMTP server which accepts everything and hands the content of the last mail to the test.
///
/// The server thread lives for the rest of the test process, so tests share one instance through
/// [`FakeSmtpServer::shared`] and call [`FakeSmtpServer::flush`] before sending.
pub struct FakeSmtpServer(
    std::sync::Mutex<Option<Server<SmtpHandler>>>,
    tokio::sync::Mutex<Receiver<String>>,
);

impl FakeSmtpServer {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel("".into());
        let handler = SmtpHandler(Vec::new(), Arc::new(sender));
        let mut server = Server::new(handler);
        server
            .with_name(SERVER_NAME)
            .with_ssl(SslConfig::None)
            .unwrap()
            .with_addr(format!("0.0.0.0:{SMTP_PORT}"))
            .unwrap();
        Self(
            std::sync::Mutex::new(Some(server)),
            tokio::sync::Mutex::new(receiver),
        )
    }

    pub fn shared() -> &'static FakeSmtpServer {
        static FAKE_SMTP: OnceLock<FakeSmtpServer> = OnceLock::new();
        FAKE_SMTP.get_or_init(FakeSmtpServer::new)
    }

    pub fn start(&self) {
        let mut guard = self.0.lock().unwrap();
        if let Some(server) = guard.take() {
            std::thread::spawn(move || {
                let _ = server.serve();
            });
            wait_until_listening(SMTP_PORT);
        }
    }

    pub async fn last_mail_content(&self) -> Result<String, RecvError> {
        let mut receiver = self.1.lock().await;
        receiver.changed().await?;
        let content = receiver.borrow_and_update().clone();
        drop(receiver);
        Ok(content)
    }

    pub async fn flush(&self) {
        let mut receiver = self.1.lock().await;
        let _ = timeout(Duration::from_millis(100), receiver.changed()).await;
        receiver.borrow_and_update();
    }

    pub fn url() -> String {
        format!("smtp://127.0.0.1:{SMTP_PORT}")
    }
}

impl Default for FakeSmtpServer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
struct PoisonedSmtpHandler;

impl Handler for PoisonedSmtpHandler {
    fn helo(&mut self, _ip: IpAddr, _domain: &str) -> mailin_embedded::Response {
        mailin_embedded::response::INTERNAL_ERROR
    }

    fn mail(&mut self, _ip: IpAddr, _domain: &str, _from: &str) -> mailin_embedded::Response {
        mailin_embedded::response::INTERNAL_ERROR
    }
}

/// Starts (once per process) an SMTP server which rejects every session, and returns its URL.
pub fn start_poisoned_smtp_server() -> String {
    static POISONED: Once = Once::new();
    POISONED.call_once(|| {
        let mut server = Server::new(PoisonedSmtpHandler);
        server
            .with_name(SERVER_NAME)
            .with_ssl(SslConfig::None)
            .unwrap()
            .with_addr(format!("0.0.0.0:{POISONED_SMTP_PORT}"))
            .unwrap();
        std::thread::spawn(move || {
            let _ = server.serve();
        });
        wait_until_listening(POISONED_SMTP_PORT);
    });
    format!("smtp://127.0.0.1:{POISONED_SMTP_PORT}")
}
