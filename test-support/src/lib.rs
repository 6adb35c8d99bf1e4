pub mod fake_contact_endpoint;
pub mod fake_recaptcha;
pub mod fake_smtp;

use simplelog::{ColorChoice, CombinedLogger, Config, LevelFilter, TermLogger, TerminalMode};
use std::{
    net::{SocketAddr, TcpStream},
    sync::Once,
    time::Duration,
};

pub fn setup_logging() {
    static LOGGING: Once = Once::new();
    LOGGING.call_once(|| {
        let _ = CombinedLogger::init(vec![TermLogger::new(
            LevelFilter::Debug,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        )]);
    });
}

// The embedded SMTP servers bind on a background thread, so the first test to use one has to
// wait for the port to open before the system under test connects.
pub(crate) fn wait_until_listening(port: u16) {
    let address = SocketAddr::from(([127, 0, 0, 1], port));
    for _ in 0..100 {
        if TcpStream::connect_timeout(&address, Duration::from_millis(50)).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    log::warn!("Nothing is listening on port {port}");
}
