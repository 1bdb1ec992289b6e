//! IMAP transport over TLS (blocking).
//!
//! Speaks just enough IMAP4rev1 for a polling pass: LOGIN, SELECT,
//! UID SEARCH/FETCH/COPY/STORE, EXPUNGE and LOGOUT. Run it from
//! `spawn_blocking` when called from async code.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use crate::config::CheckMailConfig;
use crate::error::TransportError;
use crate::mail::parse::{parse_content, parse_header};
use crate::mail::{MailTransport, Mailbox, MessageContent, MessageHeader, MessageId};

static UID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bUID (\d+)").unwrap());
static FLAGS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bFLAGS \(([^)]*)\)").unwrap());

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Connects to an IMAP server over implicit TLS.
#[derive(Debug, Clone)]
pub struct ImapTransport {
    host: String,
    port: u16,
    username: String,
    password: SecretString,
    read_timeout: Duration,
}

impl ImapTransport {
    pub fn new(host: &str, port: u16, username: &str, password: SecretString) -> Self {
        Self {
            host: host.to_string(),
            port,
            username: username.to_string(),
            password,
            read_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(config: &CheckMailConfig) -> Self {
        Self::new(
            &config.imap_host,
            config.imap_port,
            &config.username,
            config.password.clone(),
        )
        .with_read_timeout(config.read_timeout)
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    fn open_tls(&self) -> Result<TlsStream, TransportError> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port)).map_err(|e| {
            TransportError::Connect {
                host: self.host.clone(),
                reason: e.to_string(),
            }
        })?;
        tcp.set_read_timeout(Some(self.read_timeout))?;
        tcp.set_write_timeout(Some(self.read_timeout))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls_pki_types::ServerName::try_from(self.host.clone())
            .map_err(|e| TransportError::Tls(e.to_string()))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| TransportError::Tls(e.to_string()))?;
        Ok(rustls::StreamOwned::new(conn, tcp))
    }
}

impl MailTransport for ImapTransport {
    type Mailbox = ImapMailbox<TlsStream>;

    fn connect(&self) -> Result<Self::Mailbox, TransportError> {
        let stream = self.open_tls()?;
        let mut mailbox = ImapMailbox::from_stream(stream);
        mailbox.read_greeting()?;
        mailbox.login(&self.username, &self.password)?;
        debug!(host = %self.host, user = %self.username, "IMAP session established");
        Ok(mailbox)
    }
}

/// A response line with any `{n}` literals pulled out.
///
/// `text` keeps the literal markers; the literal bytes are in `literals`,
/// in the order they appeared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseLine {
    pub text: String,
    pub literals: Vec<Vec<u8>>,
}

/// An authenticated IMAP connection.
pub struct ImapMailbox<S: Read + Write> {
    stream: BufReader<S>,
    tag: u32,
    selected: Option<String>,
    closed: bool,
}

impl<S: Read + Write> ImapMailbox<S> {
    /// Wrap an already-connected stream. No bytes are exchanged.
    pub fn from_stream(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
            tag: 0,
            selected: None,
            closed: false,
        }
    }

    fn read_greeting(&mut self) -> Result<(), TransportError> {
        let greeting = read_response(&mut self.stream)?;
        if greeting.text.starts_with("* OK") || greeting.text.starts_with("* PREAUTH") {
            Ok(())
        } else {
            Err(TransportError::Protocol(format!(
                "unexpected greeting: {}",
                greeting.text
            )))
        }
    }

    /// Authenticate with LOGIN.
    pub fn login(&mut self, username: &str, password: &SecretString) -> Result<(), TransportError> {
        let cmd = format!(
            "LOGIN {} {}",
            quote(username),
            quote(password.expose_secret())
        );
        match self.command(&cmd) {
            Ok(_) => Ok(()),
            Err(TransportError::CommandFailed { .. }) => Err(TransportError::AuthFailed {
                user: username.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    /// Send one tagged command and collect the untagged responses.
    fn command(&mut self, cmd: &str) -> Result<Vec<ResponseLine>, TransportError> {
        if self.closed {
            return Err(TransportError::Protocol("connection closed".into()));
        }
        self.tag += 1;
        let tag = format!("A{}", self.tag);
        // Never echo credentials into errors or logs.
        let name = cmd.split_whitespace().take(2).collect::<Vec<_>>().join(" ");
        let name = if name.starts_with("LOGIN") { "LOGIN".to_string() } else { name };

        let writer = self.stream.get_mut();
        writer.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        writer.flush()?;

        let tagged_prefix = format!("{tag} ");
        let mut untagged = Vec::new();
        loop {
            let line = read_response(&mut self.stream)?;
            if let Some(status) = line.text.strip_prefix(&tagged_prefix) {
                if status.starts_with("OK") {
                    return Ok(untagged);
                }
                return Err(TransportError::CommandFailed {
                    command: name,
                    response: status.to_string(),
                });
            }
            untagged.push(line);
        }
    }

    fn selected(&self) -> Result<&str, TransportError> {
        self.selected.as_deref().ok_or(TransportError::NoFolderSelected)
    }

    fn search_all(&mut self) -> Result<Vec<u32>, TransportError> {
        let lines = self.command("UID SEARCH ALL")?;
        Ok(parse_search(&lines))
    }
}

impl<S: Read + Write> Mailbox for ImapMailbox<S> {
    fn open_folder(&mut self, path: &str) -> Result<(), TransportError> {
        match self.command(&format!("SELECT {}", quote(path))) {
            Ok(_) => {
                self.selected = Some(path.to_string());
                Ok(())
            }
            Err(TransportError::CommandFailed { .. }) => {
                Err(TransportError::FolderNotFound(path.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    fn list_messages(&mut self) -> Result<Vec<MessageHeader>, TransportError> {
        self.selected()?;
        let uids = self.search_all()?;
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let lines = self.command(&format!(
            "UID FETCH {} (UID FLAGS BODY.PEEK[HEADER.FIELDS (SUBJECT DATE)])",
            uid_set(&uids)
        ))?;

        let mut headers = Vec::with_capacity(uids.len());
        for line in lines.iter().filter(|l| is_fetch(l)) {
            let Some(uid) = fetch_uid(&line.text) else {
                warn!(response = %line.text, "FETCH response without UID, skipping");
                continue;
            };
            let id = MessageId(uid);
            let raw = line.literals.first().map(Vec::as_slice).unwrap_or_default();
            headers.push(parse_header(id, raw, fetch_flags_deleted(&line.text))?);
        }
        headers.sort_by_key(|h| h.id);
        Ok(headers)
    }

    fn fetch_content(&mut self, id: MessageId) -> Result<MessageContent, TransportError> {
        self.selected()?;
        let lines = self.command(&format!("UID FETCH {id} (UID BODY.PEEK[])"))?;
        let raw = lines
            .iter()
            .filter(|l| is_fetch(l))
            .find(|l| fetch_uid(&l.text) == Some(id.0))
            .and_then(|l| l.literals.first())
            .ok_or(TransportError::MessageNotFound(id))?;
        parse_content(id, raw)
    }

    fn copy_messages(&mut self, ids: &[MessageId], dest: &str) -> Result<(), TransportError> {
        self.selected()?;
        if ids.is_empty() {
            return Ok(());
        }
        let uids: Vec<u32> = ids.iter().map(|id| id.0).collect();
        self.command(&format!("UID COPY {} {}", uid_set(&uids), quote(dest)))?;
        Ok(())
    }

    fn flag_deleted(&mut self, ids: &[MessageId]) -> Result<(), TransportError> {
        self.selected()?;
        if ids.is_empty() {
            return Ok(());
        }
        let uids: Vec<u32> = ids.iter().map(|id| id.0).collect();
        self.command(&format!(
            "UID STORE {} +FLAGS.SILENT (\\Deleted)",
            uid_set(&uids)
        ))?;
        Ok(())
    }

    fn expunge(&mut self) -> Result<(), TransportError> {
        let folder = self.selected()?.to_string();
        self.command("EXPUNGE")?;
        debug!(folder = %folder, "Expunged folder");
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        let result = self.command("LOGOUT").map(|_| ());
        self.closed = true;
        result
    }
}

impl<S: Read + Write> Drop for ImapMailbox<S> {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close();
        }
    }
}

// ── Protocol helpers ────────────────────────────────────────────────

/// Read one full response, following any literals to the end of the line.
pub fn read_response<R: BufRead>(reader: &mut R) -> Result<ResponseLine, TransportError> {
    let mut response = ResponseLine::default();
    loop {
        let mut buf = Vec::new();
        let n = reader.read_until(b'\n', &mut buf)?;
        if n == 0 || !buf.ends_with(b"\r\n") {
            return Err(TransportError::Protocol("IMAP connection closed".into()));
        }
        let line = String::from_utf8_lossy(&buf[..buf.len() - 2]).into_owned();
        let literal = literal_len(&line);
        response.text.push_str(&line);

        let Some(len) = literal else {
            return Ok(response);
        };
        let mut data = vec![0u8; len];
        reader.read_exact(&mut data)?;
        response.literals.push(data);
    }
}

/// Length of a trailing `{n}` literal marker, if any.
fn literal_len(line: &str) -> Option<usize> {
    let inner = line.strip_suffix('}')?;
    let start = inner.rfind('{')?;
    inner[start + 1..].trim_end_matches('+').parse().ok()
}

/// Compress UIDs into an IMAP sequence set (`1:3,7,9:10`).
pub fn uid_set(uids: &[u32]) -> String {
    let mut sorted = uids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges: Vec<(u32, u32)> = Vec::new();
    for uid in sorted {
        match ranges.last_mut() {
            Some((_, end)) if *end + 1 == uid => *end = uid,
            _ => ranges.push((uid, uid)),
        }
    }

    ranges
        .iter()
        .map(|(start, end)| {
            if start == end {
                start.to_string()
            } else {
                format!("{start}:{end}")
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// IMAP quoted string.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn parse_search(lines: &[ResponseLine]) -> Vec<u32> {
    lines
        .iter()
        .filter_map(|l| l.text.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace().filter_map(|n| n.parse().ok()))
        .collect()
}

fn is_fetch(line: &ResponseLine) -> bool {
    line.text.starts_with("* ") && line.text.contains(" FETCH (")
}

fn fetch_uid(text: &str) -> Option<u32> {
    UID_RE.captures(text)?.get(1)?.as_str().parse().ok()
}

fn fetch_flags_deleted(text: &str) -> bool {
    FLAGS_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .is_some_and(|flags| {
            flags
                .as_str()
                .split_whitespace()
                .any(|f| f.eq_ignore_ascii_case("\\Deleted"))
        })
}
