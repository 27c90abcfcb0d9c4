//! IMAP-backed [`MailStore`] over rustls (or plain TCP).

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use tracing::{Span, debug, info, info_span, warn};

use crate::config::MailConfig;
use crate::error::MailStoreError;
use crate::mailstore::parse::parse_message;
use crate::mailstore::{FetchedMessage, MailStore, SearchFilter};

/// Connect, read and write timeout for every IMAP round trip.
const IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetch items: full message without setting `\Seen`.
const FETCH_QUERY: &str = "(UID BODY.PEEK[])";

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Transport under the IMAP session.
pub enum MailStream {
    Tls(Box<TlsStream>),
    Plain(TcpStream),
}

impl Read for MailStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tls(s) => s.read(buf),
            Self::Plain(s) => s.read(buf),
        }
    }
}

impl Write for MailStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tls(s) => s.write(buf),
            Self::Plain(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tls(s) => s.flush(),
            Self::Plain(s) => s.flush(),
        }
    }
}

/// Server extensions that change how messages are moved.
#[derive(Debug, Clone, Copy)]
struct ServerCaps {
    /// RFC 6851 `UID MOVE`.
    moves: bool,
    /// RFC 4315 `UID EXPUNGE`.
    uidplus: bool,
}

/// An authenticated IMAP session with one mailbox selected.
///
/// The session is logged out on drop if [`MailStore::logout`] was not called.
pub struct ImapStore {
    session: Option<imap::Session<MailStream>>,
    mailbox: String,
    caps: Option<ServerCaps>,
    span: Span,
}

impl ImapStore {
    /// Connect, authenticate, and select `config.mailbox`.
    ///
    /// Blocking; run on the blocking pool.
    pub fn connect(config: &MailConfig) -> Result<Self, MailStoreError> {
        let span = info_span!("mailstore", component = "mailstore", host = %config.host);
        let _enter = span.enter();

        let stream = open_stream(config)?;
        let mut client = imap::Client::new(stream);
        client
            .read_greeting()
            .map_err(|e| MailStoreError::Connect {
                host: config.host.clone(),
                port: config.port,
                reason: format!("no server greeting: {e}"),
            })?;

        let mut session = client
            .login(&config.username, config.password.expose_secret())
            .map_err(|(e, _client)| MailStoreError::Auth {
                username: config.username.clone(),
                reason: e.to_string(),
            })?;
        info!("Logged in to the IMAP server");

        let mailbox = session
            .select(&config.mailbox)
            .map_err(|e| MailStoreError::Select {
                mailbox: config.mailbox.clone(),
                reason: e.to_string(),
            })?;
        info!(
            mailbox = %config.mailbox,
            exists = mailbox.exists,
            recent = mailbox.recent,
            "Mailbox selected"
        );

        drop(_enter);
        Ok(Self {
            session: Some(session),
            mailbox: config.mailbox.clone(),
            caps: None,
            span,
        })
    }

    fn session(&mut self) -> Result<&mut imap::Session<MailStream>, MailStoreError> {
        self.session.as_mut().ok_or(MailStoreError::Closed)
    }

    fn caps(&mut self) -> Result<ServerCaps, MailStoreError> {
        if let Some(known) = self.caps {
            return Ok(known);
        }
        let reported = self
            .session()?
            .capabilities()
            .map_err(|e| MailStoreError::Capability(e.to_string()))?;
        let known = ServerCaps {
            moves: reported.has_str("MOVE"),
            uidplus: reported.has_str("UIDPLUS"),
        };
        debug!(moves = known.moves, uidplus = known.uidplus, "Queried server capabilities");
        self.caps = Some(known);
        Ok(known)
    }
}

impl MailStore for ImapStore {
    fn search(&mut self, filter: &SearchFilter) -> Result<Vec<u32>, MailStoreError> {
        let span = self.span.clone();
        let _enter = span.enter();

        let query = filter.to_imap_query();
        let found = self
            .session()?
            .uid_search(&query)
            .map_err(|e| MailStoreError::Search(e.to_string()))?;
        let mut uids: Vec<u32> = found.into_iter().collect();
        uids.sort_unstable();
        info!(query = %query, matched = uids.len(), "Search complete");
        Ok(uids)
    }

    fn fetch_one(&mut self, uid: u32) -> Result<Option<FetchedMessage>, MailStoreError> {
        let span = self.span.clone();
        let _enter = span.enter();

        let fetches = self
            .session()?
            .uid_fetch(uid.to_string(), FETCH_QUERY)
            .map_err(|e| MailStoreError::Fetch {
                uid,
                reason: e.to_string(),
            })?;

        let Some(fetch) = fetches.iter().find(|f| f.uid == Some(uid)) else {
            return Ok(None);
        };
        let Some(raw) = fetch.body() else {
            return Err(MailStoreError::Fetch {
                uid,
                reason: "server returned no body".to_string(),
            });
        };

        let message = parse_message(fetch.message, uid, raw).ok_or_else(|| {
            MailStoreError::Fetch {
                uid,
                reason: "unparseable message".to_string(),
            }
        })?;
        debug!(uid, seq = message.seq, subject = %message.subject(), "Fetched message");
        Ok(Some(message))
    }

    fn ensure_folder(&mut self, folder: &str, create: bool) -> Result<(), MailStoreError> {
        let span = self.span.clone();
        let _enter = span.enter();

        // imap sends the LIST pattern verbatim.
        let pattern = quote_mailbox(folder)?;
        let exists = !self
            .session()?
            .list(Some(""), Some(pattern.as_str()))
            .map_err(|e| MailStoreError::List {
                folder: folder.to_string(),
                reason: e.to_string(),
            })?
            .is_empty();
        if exists {
            return Ok(());
        }
        if !create {
            return Err(MailStoreError::FolderMissing {
                folder: folder.to_string(),
            });
        }

        self.session()?
            .create(folder)
            .map_err(|e| MailStoreError::CreateFolder {
                folder: folder.to_string(),
                reason: e.to_string(),
            })?;
        info!(folder, "Created folder");
        Ok(())
    }

    fn move_message(&mut self, uid: u32, folder: &str) -> Result<(), MailStoreError> {
        let span = self.span.clone();
        let _enter = span.enter();

        let move_err = |reason: String| MailStoreError::Move {
            uid,
            folder: folder.to_string(),
            reason,
        };
        let uid_set = uid.to_string();
        let caps = self.caps()?;

        if caps.moves {
            self.session()?
                .uid_mv(&uid_set, folder)
                .map_err(|e| move_err(e.to_string()))?;
        } else if caps.uidplus {
            // imap sends the COPY destination verbatim.
            let destination = quote_mailbox(folder)?;
            let session = self.session()?;
            session
                .uid_copy(&uid_set, &destination)
                .map_err(|e| move_err(e.to_string()))?;
            session
                .uid_store(&uid_set, "+FLAGS.SILENT (\\Deleted)")
                .map_err(|e| move_err(e.to_string()))?;
            session
                .uid_expunge(&uid_set)
                .map_err(|e| move_err(e.to_string()))?;
        } else {
            // A plain EXPUNGE would purge every \Deleted message in the mailbox.
            return Err(move_err(
                "server supports neither MOVE nor UIDPLUS".to_string(),
            ));
        }
        info!(uid, from = %self.mailbox, to = folder, "Moved message");
        Ok(())
    }

    fn logout(&mut self) -> Result<(), MailStoreError> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        let _enter = self.span.enter();
        session
            .logout()
            .map_err(|e| MailStoreError::Logout(e.to_string()))?;
        info!("Logged out");
        Ok(())
    }
}

impl Drop for ImapStore {
    fn drop(&mut self) {
        if self.session.is_some()
            && let Err(e) = self.logout()
        {
            warn!(error = %e, "Logout on drop failed");
        }
    }
}

/// Render a mailbox name as an IMAP quoted string.
pub fn quote_mailbox(name: &str) -> Result<String, MailStoreError> {
    if name.contains(['\r', '\n']) {
        return Err(MailStoreError::InvalidFolder {
            folder: name.escape_debug().to_string(),
        });
    }
    Ok(format!(
        "\"{}\"",
        name.replace('\\', "\\\\").replace('"', "\\\"")
    ))
}

/// Open the transport: TCP, then TLS via rustls when enabled.
fn open_stream(config: &MailConfig) -> Result<MailStream, MailStoreError> {
    let connect_err = |reason: String| MailStoreError::Connect {
        host: config.host.clone(),
        port: config.port,
        reason,
    };

    let addrs = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|e| connect_err(e.to_string()))?;
    let mut last_err = None;
    let mut tcp = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, IO_TIMEOUT) {
            Ok(stream) => {
                tcp = Some(stream);
                break;
            }
            Err(e) => {
                debug!(%addr, error = %e, "Connect attempt failed");
                last_err = Some(e);
            }
        }
    }
    let tcp = tcp.ok_or_else(|| {
        connect_err(
            last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "host resolved to no addresses".to_string()),
        )
    })?;
    tcp.set_read_timeout(Some(IO_TIMEOUT))
        .map_err(|e| connect_err(e.to_string()))?;
    tcp.set_write_timeout(Some(IO_TIMEOUT))
        .map_err(|e| connect_err(e.to_string()))?;

    if !config.use_tls {
        warn!("TLS disabled, credentials are sent in clear text");
        return Ok(MailStream::Plain(tcp));
    }

    let tls_err = |reason: String| MailStoreError::Tls {
        host: config.host.clone(),
        reason,
    };

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name = rustls_pki_types::ServerName::try_from(config.host.clone())
        .map_err(|e| tls_err(e.to_string()))?;
    let conn = rustls::ClientConnection::new(tls_config, server_name)
        .map_err(|e| tls_err(e.to_string()))?;

    Ok(MailStream::Tls(Box::new(rustls::StreamOwned::new(conn, tcp))))
}
