use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use suppaftp::{FtpError, FtpStream};
use tokio::task::spawn_blocking;

use super::{AttemptOutcome, Dictionary, ServiceProtocol};
use crate::net;
use crate::types::Credential;

/// Ports handed to the FTP brute forcer by default.
pub const DEFAULT_PORTS: &[u16] = &[21, 2121];

pub const DEFAULT_USERS: &[&str] = &["anonymous", "ftp", "admin"];

pub const DEFAULT_PASSWORDS: &[&str] = &["", "anonymous@", "ftp"];

/// Plaintext USER/PASS login.
#[derive(Debug, Clone)]
pub struct FtpProtocol {
    timeout: Duration,
}

impl Default for FtpProtocol {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
        }
    }
}

impl FtpProtocol {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Built-in dictionary, overridden by whichever files are given and readable.
    pub fn dictionary(users_file: Option<&Path>, passwords_file: Option<&Path>) -> Dictionary {
        Dictionary::load(users_file, passwords_file, DEFAULT_USERS, DEFAULT_PASSWORDS)
    }
}

#[async_trait]
impl ServiceProtocol for FtpProtocol {
    fn name(&self) -> &'static str {
        "ftp"
    }

    async fn probe(&self, host: IpAddr, port: u16) -> bool {
        net::grab_banner(SocketAddr::new(host, port), self.timeout)
            .await
            .is_some_and(|banner| is_ftp_greeting(&banner))
    }

    async fn attempt(
        &self,
        host: IpAddr,
        port: u16,
        username: &str,
        password: &str,
    ) -> AttemptOutcome {
        let addr = SocketAddr::new(host, port);
        let credential = Credential::new(username, password);
        let timeout = self.timeout;
        spawn_blocking(move || try_login(addr, credential, timeout))
            .await
            .unwrap_or_else(|e| AttemptOutcome::ConnectionFailure(format!("login task failed: {e}")))
    }
}

fn is_ftp_greeting(banner: &str) -> bool {
    banner.contains("220")
}

fn try_login(addr: SocketAddr, credential: Credential, timeout: Duration) -> AttemptOutcome {
    let mut ftp = match FtpStream::connect_timeout(addr, timeout) {
        Ok(ftp) => ftp,
        Err(e) => return AttemptOutcome::ConnectionFailure(format!("connect: {e}")),
    };
    let _ = ftp.get_ref().set_read_timeout(Some(timeout));
    let _ = ftp.get_ref().set_write_timeout(Some(timeout));

    match ftp.login(&credential.username, &credential.password) {
        Ok(()) => {
            let _ = ftp.quit();
            AttemptOutcome::Success(credential)
        }
        Err(FtpError::UnexpectedResponse(resp)) if is_permanent_rejection(resp.status.code()) => {
            AttemptOutcome::AuthFailure
        }
        Err(e) => AttemptOutcome::ConnectionFailure(format!("login: {e}")),
    }
}

/// 5xx replies to USER/PASS are clean rejections; 4xx and transport errors are not.
fn is_permanent_rejection(code: u32) -> bool {
    (500..600).contains(&code)
}
