//! Commands that do not touch mailbox state: CAPABILITY, NOOP, LOGIN
//! and LOGOUT. LOGIN accepts any credentials.

use crate::fake_imap::io::write_line;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// `literal_plus` adds LITERAL+ (RFC 7888) to the list.
pub async fn handle_capability<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    literal_plus: bool,
    stream: &mut BufReader<S>,
) {
    let line = if literal_plus {
        "* CAPABILITY IMAP4rev1 STARTTLS LITERAL+\r\n"
    } else {
        "* CAPABILITY IMAP4rev1 STARTTLS\r\n"
    };
    let _ = write_line(stream, line).await;
    let _ = write_line(stream, &format!("{tag} OK CAPABILITY completed\r\n")).await;
}

pub async fn handle_noop<S: AsyncRead + AsyncWrite + Unpin>(tag: &str, stream: &mut BufReader<S>) {
    let _ = write_line(stream, &format!("{tag} OK NOOP completed\r\n")).await;
}

/// Returns false when the connection should be dropped.
pub async fn handle_login<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    stream: &mut BufReader<S>,
) -> bool {
    write_line(stream, &format!("{tag} OK LOGIN completed\r\n"))
        .await
        .is_ok()
}

/// Untagged BYE first, then the tagged OK (RFC 3501 6.1.3).
pub async fn handle_logout<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    stream: &mut BufReader<S>,
) {
    let _ = write_line(stream, "* BYE\r\n").await;
    let _ = write_line(stream, &format!("{tag} OK LOGOUT completed\r\n")).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::io::{read_all, test_stream};

    #[tokio::test]
    async fn capability_advertises_starttls() {
        let (client, mut stream) = test_stream();
        handle_capability("A1", false, &mut stream).await;
        drop(stream);
        let output = read_all(client).await;
        assert!(output.contains("* CAPABILITY IMAP4rev1 STARTTLS\r\n"));
        assert!(output.ends_with("A1 OK CAPABILITY completed\r\n"));
    }

    #[tokio::test]
    async fn capability_can_offer_literal_plus() {
        let (client, mut stream) = test_stream();
        handle_capability("A1", true, &mut stream).await;
        drop(stream);
        assert!(read_all(client).await.contains("STARTTLS LITERAL+\r\n"));
    }

    #[tokio::test]
    async fn login_echoes_tag() {
        let (client, mut stream) = test_stream();
        assert!(handle_login("TAG42", &mut stream).await);
        drop(stream);
        assert_eq!(read_all(client).await, "TAG42 OK LOGIN completed\r\n");
    }

    #[tokio::test]
    async fn logout_sends_bye_before_ok() {
        let (client, mut stream) = test_stream();
        handle_logout("X1", &mut stream).await;
        drop(stream);
        assert_eq!(read_all(client).await, "* BYE\r\nX1 OK LOGOUT completed\r\n");
    }

    #[tokio::test]
    async fn noop_is_ok() {
        let (client, mut stream) = test_stream();
        handle_noop("N1", &mut stream).await;
        drop(stream);
        assert_eq!(read_all(client).await, "N1 OK NOOP completed\r\n");
    }
}
