//! In-process fake IMAP server
//!
//! Connection lifecycle, in either TLS mode:
//!
//! ```text
//!   STARTTLS:      TCP -> greeting -> STARTTLS -> handshake -> commands
//!   implicit TLS:  TCP -> handshake -> greeting -> commands
//! ```
//!
//! Commands are parsed with `imap-codec` once their literals have been
//! read. 8-bit text outside a literal is answered with `BAD`, as RFC
//! 3501 requires. By default the server advertises LITERAL+ and
//! accepts `SEARCH CHARSET UTF-8`; [`FakeImapServer::start_ascii_only`]
//! starts one that does neither, like many older servers.

use super::handlers::{
    FetchItem, StoreArgs, handle_capability, handle_expunge, handle_list, handle_login,
    handle_logout, handle_noop, handle_select, handle_uid_fetch, handle_uid_search,
    handle_uid_store,
};
use super::io::{read_command, write_line};
use super::mailbox::Mailbox;
use imap_codec::CommandCodec;
use imap_codec::decode::Decoder;
use imap_codec::imap_types::command::CommandBody;
use imap_codec::imap_types::mailbox::Mailbox as ImapMailbox;
use rcgen::generate_simple_self_signed;
use rustls::pki_types::PrivatePkcs8KeyDer;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

const GREETING: &str = "* OK IMAP4rev1 Fake server ready\r\n";

#[derive(Debug, Clone, Copy)]
enum Mode {
    StartTls,
    ImplicitTls,
}

/// Protocol extensions the server offers.
#[derive(Debug, Clone, Copy)]
struct Extensions {
    /// LITERAL+ in CAPABILITY and `CHARSET UTF-8` accepted by SEARCH.
    utf8_search: bool,
}

/// A fake IMAP server on localhost with an OS-assigned port and a
/// self-signed certificate for `127.0.0.1`.
pub struct FakeImapServer {
    port: u16,
    mailbox: Arc<Mutex<Mailbox>>,
    _handle: tokio::task::JoinHandle<()>,
}

impl FakeImapServer {
    /// Start a server that expects STARTTLS before anything else.
    pub async fn start(mailbox: Mailbox) -> Self {
        Self::spawn(mailbox, Mode::StartTls, Extensions { utf8_search: true }).await
    }

    /// Start a server that negotiates TLS as soon as the client connects.
    #[allow(dead_code)]
    pub async fn start_implicit_tls(mailbox: Mailbox) -> Self {
        Self::spawn(mailbox, Mode::ImplicitTls, Extensions { utf8_search: true }).await
    }

    /// Start a STARTTLS server without LITERAL+ that answers
    /// `SEARCH CHARSET UTF-8` with `NO [BADCHARSET]`.
    #[allow(dead_code)]
    pub async fn start_ascii_only(mailbox: Mailbox) -> Self {
        Self::spawn(mailbox, Mode::StartTls, Extensions { utf8_search: false }).await
    }

    async fn spawn(mailbox: Mailbox, mode: Mode, extensions: Extensions) -> Self {
        // Tests race to install the provider; losing is fine.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind to ephemeral port");
        let port = listener.local_addr().unwrap().port();

        let cert = generate_simple_self_signed(vec!["127.0.0.1".to_string()])
            .expect("generate self-signed cert");
        let cert_der = cert.cert.der().clone();
        let key_der = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());
        let tls_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der], key_der.into())
            .expect("build server TLS config");
        let acceptor = TlsAcceptor::from(Arc::new(tls_config));

        let mailbox = Arc::new(Mutex::new(mailbox));
        let shared = mailbox.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _addr)) = listener.accept().await {
                let acceptor = acceptor.clone();
                let mailbox = shared.clone();
                tokio::spawn(async move {
                    match mode {
                        Mode::StartTls => {
                            handle_starttls(stream, acceptor, &mailbox, extensions).await;
                        }
                        Mode::ImplicitTls => {
                            handle_implicit_tls(stream, acceptor, &mailbox, extensions).await;
                        }
                    }
                });
            }
        });

        Self {
            port,
            mailbox,
            _handle: handle,
        }
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Current mailbox state, including every STORE and EXPUNGE
    /// clients have issued so far.
    #[allow(dead_code)]
    pub fn mailbox(&self) -> Mailbox {
        self.mailbox.lock().unwrap().clone()
    }
}

async fn handle_starttls(
    stream: TcpStream,
    acceptor: TlsAcceptor,
    mailbox: &Mutex<Mailbox>,
    extensions: Extensions,
) {
    let mut reader = BufReader::new(stream);
    if write_line(&mut reader, GREETING).await.is_err() {
        return;
    }

    let mut line = String::new();
    if reader.read_line(&mut line).await.is_err() {
        return;
    }
    let mut parts = line.trim().splitn(2, ' ');
    let (Some(tag), Some(command)) = (parts.next(), parts.next()) else {
        return;
    };
    if !command.eq_ignore_ascii_case("STARTTLS") {
        let _ = write_line(&mut reader, &format!("{tag} BAD Expected STARTTLS\r\n")).await;
        return;
    }
    let ok = format!("{tag} OK Begin TLS negotiation now\r\n");
    if write_line(&mut reader, &ok).await.is_err() {
        return;
    }

    let Ok(tls_stream) = acceptor.accept(reader.into_inner()).await else {
        return;
    };
    run_session(BufReader::new(tls_stream), mailbox, extensions).await;
}

async fn handle_implicit_tls(
    stream: TcpStream,
    acceptor: TlsAcceptor,
    mailbox: &Mutex<Mailbox>,
    extensions: Extensions,
) {
    let Ok(tls_stream) = acceptor.accept(stream).await else {
        return;
    };
    let mut reader = BufReader::new(tls_stream);
    if write_line(&mut reader, GREETING).await.is_err() {
        return;
    }
    run_session(reader, mailbox, extensions).await;
}

fn mailbox_name(mb: &ImapMailbox<'_>) -> String {
    match mb {
        ImapMailbox::Inbox => "INBOX".to_string(),
        ImapMailbox::Other(other) => {
            let bytes: &[u8] = other.as_ref();
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

fn line_tag(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or("*")
}

/// Whether a SEARCH names a charset other than US-ASCII.
fn names_non_ascii_charset(command: &str) -> bool {
    let upper = command.to_ascii_uppercase();
    upper.contains(" CHARSET ") && !upper.contains(" CHARSET US-ASCII ")
}

/// The command loop. Read-only handlers get a snapshot of the mailbox;
/// STORE and EXPUNGE lock it to mutate.
async fn run_session<S: AsyncRead + AsyncWrite + Unpin>(
    mut reader: BufReader<S>,
    mailbox: &Mutex<Mailbox>,
    extensions: Extensions,
) {
    let mut selected_folder: Option<String> = None;
    let codec = CommandCodec::default();

    loop {
        let Ok(Some(raw)) = read_command(&mut reader).await else {
            break;
        };
        let text = raw.text();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }

        if raw.eight_bit {
            let resp = format!("{} BAD 8-bit text not supported\r\n", line_tag(trimmed));
            if write_line(&mut reader, &resp).await.is_err() {
                break;
            }
            continue;
        }

        let Ok((_, command)) = codec.decode(&raw.bytes) else {
            let resp = format!("{} BAD Parse error\r\n", line_tag(trimmed));
            if write_line(&mut reader, &resp).await.is_err() {
                break;
            }
            continue;
        };

        let tag = command.tag.inner();
        let snap = mailbox.lock().unwrap().clone();
        let selected = selected_folder.as_deref();

        match command.body {
            CommandBody::Capability => {
                handle_capability(tag, extensions.utf8_search, &mut reader).await;
            }
            CommandBody::Noop => handle_noop(tag, &mut reader).await,
            CommandBody::Login { .. } => {
                if !handle_login(tag, &mut reader).await {
                    break;
                }
            }
            CommandBody::List { .. } => handle_list(tag, &snap, &mut reader).await,
            CommandBody::Select { mailbox: mb, .. } => {
                let name = mailbox_name(&mb);
                selected_folder = handle_select(tag, &name, &snap, &mut reader).await;
            }
            CommandBody::Search {
                criteria,
                uid: true,
                ..
            } => {
                if !extensions.utf8_search && names_non_ascii_charset(trimmed) {
                    let resp = format!("{tag} NO [BADCHARSET (US-ASCII)] Unsupported charset\r\n");
                    if write_line(&mut reader, &resp).await.is_err() {
                        break;
                    }
                    continue;
                }
                handle_uid_search(tag, criteria.as_ref(), &snap, selected, &mut reader).await;
            }
            CommandBody::Fetch {
                sequence_set,
                uid: true,
                ..
            } => {
                let item = FetchItem::from_command(trimmed);
                handle_uid_fetch(tag, &sequence_set, &item, &snap, selected, &mut reader).await;
            }
            CommandBody::Store {
                ref sequence_set,
                uid: true,
                ref kind,
                ref response,
                ref flags,
                ..
            } => {
                let args = StoreArgs {
                    sequence_set,
                    kind,
                    response,
                    flags,
                };
                handle_uid_store(tag, &args, mailbox, selected, &mut reader).await;
            }
            CommandBody::Expunge => handle_expunge(tag, mailbox, selected, &mut reader).await,
            CommandBody::Logout => {
                handle_logout(tag, &mut reader).await;
                break;
            }
            _ => {
                let resp = format!("{tag} BAD Unknown command\r\n");
                if write_line(&mut reader, &resp).await.is_err() {
                    break;
                }
            }
        }
    }
}
