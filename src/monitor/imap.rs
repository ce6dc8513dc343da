//! Minimal IMAP-over-TLS session: login, select, search, fetch.
//!
//! Blocking socket I/O — callers run session operations under
//! `tokio::task::spawn_blocking`.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;

use crate::config::MonitorConfig;
use crate::error::MonitorError;

/// Bound on TCP connect and per-read blocking so a dead server cannot
/// wedge the poll loop indefinitely.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// An authenticated session with the mailbox selected.
///
/// The monitor owns exactly one of these in a replaceable slot and
/// swaps in a fresh session on failure; there is no shared connection
/// state anywhere else.
pub struct ImapSession {
    stream: TlsStream,
    tag: u32,
}

impl ImapSession {
    /// Connect, authenticate and select the configured mailbox.
    pub fn connect(config: &MonitorConfig) -> Result<Self, MonitorError> {
        let addr = (config.imap_host.as_str(), config.imap_port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                MonitorError::Connection(format!("no address for {}", config.imap_host))
            })?;
        let tcp = TcpStream::connect_timeout(&addr, HANDSHAKE_TIMEOUT)?;
        tcp.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;

        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth(),
        );
        let server_name = rustls::pki_types::ServerName::try_from(config.imap_host.clone())
            .map_err(|e| MonitorError::Connection(format!("invalid server name: {e}")))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| MonitorError::Connection(e.to_string()))?;

        let mut session = Self {
            stream: rustls::StreamOwned::new(conn, tcp),
            tag: 0,
        };

        // Server greeting
        session.read_line()?;

        let login = session.command(&format!(
            "LOGIN \"{}\" \"{}\"",
            config.account,
            config.password.expose_secret()
        ))?;
        if !is_ok(&login) {
            return Err(MonitorError::Connection("IMAP login rejected".into()));
        }

        let select = session.command(&format!("SELECT \"{}\"", config.mailbox))?;
        if !is_ok(&select) {
            return Err(MonitorError::Connection(format!(
                "cannot select mailbox {}",
                config.mailbox
            )));
        }

        Ok(session)
    }

    /// Sequence numbers of messages flagged UNSEEN.
    pub fn search_unseen(&mut self) -> Result<Vec<String>, MonitorError> {
        let lines = self.command("SEARCH UNSEEN")?;
        if !is_ok(&lines) {
            return Err(MonitorError::Protocol("SEARCH UNSEEN failed".into()));
        }

        let mut ids = Vec::new();
        for line in &lines {
            if let Some(rest) = line.strip_prefix("* SEARCH") {
                ids.extend(rest.split_whitespace().map(str::to_string));
            }
        }
        Ok(ids)
    }

    /// Fetch a message's full RFC 822 content. A plain fetch (no PEEK)
    /// lets the server set \Seen as a side effect, which is the only
    /// acknowledgment this design uses.
    pub fn fetch(&mut self, id: &str) -> Result<Vec<u8>, MonitorError> {
        let lines = self.command(&format!("FETCH {id} RFC822"))?;
        if !is_ok(&lines) {
            return Err(MonitorError::Protocol(format!("FETCH {id} failed")));
        }

        // Message body sits between the untagged FETCH line and the
        // closing paren + tagged OK lines.
        if lines.len() < 3 {
            return Err(MonitorError::Protocol(format!("short FETCH response for {id}")));
        }
        let raw: String = lines[1..lines.len() - 2].concat();
        Ok(raw.into_bytes())
    }

    /// Best-effort LOGOUT; the session is consumed either way.
    pub fn logout(mut self) {
        let _ = self.command("LOGOUT");
    }

    fn command(&mut self, cmd: &str) -> Result<Vec<String>, MonitorError> {
        self.tag += 1;
        let tag = format!("A{}", self.tag);
        let full = format!("{tag} {cmd}\r\n");
        self.stream.write_all(full.as_bytes())?;
        self.stream.flush()?;

        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            let done = line.starts_with(&tag);
            lines.push(line);
            if done {
                return Ok(lines);
            }
        }
    }

    fn read_line(&mut self) -> Result<String, MonitorError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.stream.read(&mut byte) {
                Ok(0) => return Err(MonitorError::Connection("connection closed".into())),
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).to_string());
                    }
                }
                Err(e) => return Err(MonitorError::Io(e)),
            }
        }
    }
}

fn is_ok(lines: &[String]) -> bool {
    lines.last().is_some_and(|l| l.contains("OK"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_ok_checks_tagged_line() {
        let ok = vec!["* SEARCH 1 2\r\n".to_string(), "A3 OK done\r\n".to_string()];
        assert!(is_ok(&ok));
        let no = vec!["A3 NO failure\r\n".to_string()];
        assert!(!is_ok(&no));
        assert!(!is_ok(&[]));
    }

    #[test]
    fn search_line_parsing_shape() {
        // Mirrors the parse inside search_unseen.
        let line = "* SEARCH 4 17 23\r\n";
        let rest = line.strip_prefix("* SEARCH").unwrap();
        let ids: Vec<&str> = rest.split_whitespace().collect();
        assert_eq!(ids, vec!["4", "17", "23"]);
    }
}
