//! LIST and SELECT.

use crate::fake_imap::io::write_line;
use crate::fake_imap::mailbox::Mailbox;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// One `* LIST` line per folder, ignoring the reference and pattern.
pub async fn handle_list<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    mailbox: &Mailbox,
    stream: &mut BufReader<S>,
) {
    for folder in &mailbox.folders {
        let line = format!("* LIST (\\HasNoChildren) \"/\" \"{}\"\r\n", folder.name);
        if write_line(stream, &line).await.is_err() {
            return;
        }
    }
    let _ = write_line(stream, &format!("{tag} OK LIST completed\r\n")).await;
}

/// Select `folder_name`; returns it when it exists so the server can
/// remember the selection.
pub async fn handle_select<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    folder_name: &str,
    mailbox: &Mailbox,
    stream: &mut BufReader<S>,
) -> Option<String> {
    let Some(folder) = mailbox.get_folder(folder_name) else {
        let _ = write_line(stream, &format!("{tag} NO Folder not found\r\n")).await;
        return None;
    };

    let uidnext = folder.emails.iter().map(|e| e.uid).max().map_or(1, |max| max + 1);
    let lines = [
        "* FLAGS (\\Seen \\Answered \\Flagged \\Deleted \\Draft)\r\n".to_string(),
        format!("* {} EXISTS\r\n", folder.emails.len()),
        "* 0 RECENT\r\n".to_string(),
        "* OK [UIDVALIDITY 1]\r\n".to_string(),
        format!("* OK [UIDNEXT {uidnext}]\r\n"),
        "* OK [PERMANENTFLAGS (\\Seen \\Deleted)] Limited\r\n".to_string(),
        format!("{tag} OK [READ-WRITE] SELECT completed\r\n"),
    ];
    for line in &lines {
        if write_line(stream, line).await.is_err() {
            return None;
        }
    }
    Some(folder_name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::io::{read_all, test_stream};
    use crate::fake_imap::mailbox::MailboxBuilder;

    #[tokio::test]
    async fn lists_every_folder_then_ok() {
        let mailbox = MailboxBuilder::new().folder("INBOX").folder("Spam").build();
        let (client, mut stream) = test_stream();
        handle_list("L1", &mailbox, &mut stream).await;
        drop(stream);
        let output = read_all(client).await;
        assert!(output.contains("\"INBOX\""));
        assert!(output.contains("\"Spam\""));
        assert!(output.ends_with("L1 OK LIST completed\r\n"));
    }

    #[tokio::test]
    async fn select_reports_counts() {
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .email(5, false, b"x")
            .email(10, true, b"y")
            .build();
        let (client, mut stream) = test_stream();
        let selected = handle_select("S1", "INBOX", &mailbox, &mut stream).await;
        drop(stream);
        let output = read_all(client).await;
        assert_eq!(selected.as_deref(), Some("INBOX"));
        assert!(output.contains("* 2 EXISTS"));
        assert!(output.contains("* OK [UIDNEXT 11]"));
        assert!(output.ends_with("S1 OK [READ-WRITE] SELECT completed\r\n"));
    }

    #[tokio::test]
    async fn select_missing_folder_is_no() {
        let mailbox = MailboxBuilder::new().folder("INBOX").build();
        let (client, mut stream) = test_stream();
        let selected = handle_select("S2", "Promotions", &mailbox, &mut stream).await;
        drop(stream);
        assert!(selected.is_none());
        assert_eq!(read_all(client).await, "S2 NO Folder not found\r\n");
    }
}
