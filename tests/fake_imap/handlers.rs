//! Responses for the commands the adapter issues.
//!
//! Each handler writes its untagged data followed by the tagged
//! completion, flushing after every write.

use super::command::{Criterion, list_matches, parse_uid_set};
use super::mailbox::Mailbox;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

pub async fn write_line<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
    line: &str,
) -> std::io::Result<()> {
    write_bytes(stream, line.as_bytes()).await
}

pub async fn write_bytes<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
    data: &[u8],
) -> std::io::Result<()> {
    stream.get_mut().write_all(data).await?;
    stream.get_mut().flush().await
}

/// `LIST "" <pattern>`: one line per folder matching the pattern.
pub async fn handle_list<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    args: &[String],
    mailbox: &Mailbox,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    let pattern = args.get(1).map_or("", String::as_str);
    for folder in &mailbox.folders {
        if list_matches(pattern, &folder.name) {
            let line = format!("* LIST (\\HasNoChildren) \"/\" \"{}\"\r\n", folder.name);
            write_line(stream, &line).await?;
        }
    }
    write_line(stream, &format!("{tag} OK LIST completed\r\n")).await
}

/// `SELECT <folder>`. Returns the newly selected folder; a failed
/// SELECT leaves nothing selected.
pub async fn handle_select<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    args: &[String],
    mailbox: &Mailbox,
    stream: &mut BufReader<S>,
) -> std::io::Result<Option<String>> {
    let name = args.first().map_or("", String::as_str);
    let Some(folder) = mailbox.get_folder(name) else {
        write_line(stream, &format!("{tag} NO Mailbox does not exist\r\n")).await?;
        return Ok(None);
    };

    write_line(stream, "* FLAGS (\\Seen \\Answered \\Flagged \\Deleted \\Draft)\r\n").await?;
    write_line(stream, &format!("* {} EXISTS\r\n", folder.emails.len())).await?;
    write_line(stream, "* 0 RECENT\r\n").await?;
    write_line(stream, "* OK [UIDVALIDITY 1]\r\n").await?;
    write_line(stream, &format!("{tag} OK [READ-ONLY] SELECT completed\r\n")).await?;
    Ok(Some(folder.name.clone()))
}

/// `UID SEARCH <criteria>` over the selected folder.
pub async fn handle_uid_search<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    args: &[String],
    mailbox: &Mailbox,
    selected: Option<&str>,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    let Some(folder) = selected.and_then(|name| mailbox.get_folder(name)) else {
        return write_line(stream, &format!("{tag} BAD No folder selected\r\n")).await;
    };
    let Some(criterion) = Criterion::parse(args) else {
        return write_line(stream, &format!("{tag} BAD Unsupported search criteria\r\n")).await;
    };
    if mailbox.reject_body_search && criterion.needs_body() {
        return write_line(stream, &format!("{tag} NO Body search is not supported\r\n")).await;
    }

    let uids: Vec<String> = folder
        .emails
        .iter()
        .filter(|e| criterion.matches(e))
        .map(|e| e.uid.to_string())
        .collect();
    let line = if uids.is_empty() {
        "* SEARCH\r\n".to_string()
    } else {
        format!("* SEARCH {}\r\n", uids.join(" "))
    };
    write_line(stream, &line).await?;
    write_line(stream, &format!("{tag} OK SEARCH completed\r\n")).await
}

/// `UID FETCH <set> <items>`. Always answers with UID, FLAGS,
/// RFC822.SIZE and the full message as a literal.
pub async fn handle_uid_fetch<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    args: &[String],
    mailbox: &Mailbox,
    selected: Option<&str>,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    let Some(folder) = selected.and_then(|name| mailbox.get_folder(name)) else {
        return write_line(stream, &format!("{tag} BAD No folder selected\r\n")).await;
    };

    let uids = parse_uid_set(args.first().map_or("", String::as_str));
    for (idx, email) in folder.emails.iter().enumerate() {
        if !uids.contains(&email.uid) || email.unfetchable {
            continue;
        }
        let flags = if email.seen { "\\Seen" } else { "" };
        let len = email.raw.len();
        let header = format!(
            "* {} FETCH (UID {} FLAGS ({flags}) RFC822.SIZE {len} BODY[] {{{len}}}\r\n",
            idx + 1,
            email.uid
        );
        write_line(stream, &header).await?;
        write_bytes(stream, &email.raw).await?;
        write_line(stream, ")\r\n").await?;
    }
    write_line(stream, &format!("{tag} OK FETCH completed\r\n")).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::mailbox::MailboxBuilder;
    use tokio::io::AsyncReadExt;

    fn mailbox() -> Mailbox {
        MailboxBuilder::new()
            .folder("INBOX")
            .email(1, true, b"Subject: Server outage\r\n\r\nDown again")
            .email(2, false, b"Subject: Lunch\r\n\r\nThe server outage is over")
            .unfetchable_email(3, b"Subject: outage\r\n\r\n")
            .folder("Other Users/team@example.com/INBOX")
            .build()
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    async fn output<F, Fut>(run: F) -> String
    where
        F: FnOnce(BufReader<tokio::io::DuplexStream>) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let (mut client, server) = tokio::io::duplex(8192);
        run(BufReader::new(server)).await;
        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn list_filters_by_pattern() {
        let mb = mailbox();
        let out = output(|mut s| async move {
            handle_list("A1", &args(&["", "%"]), &mb, &mut s).await.unwrap();
        })
        .await;

        assert!(out.contains("\"INBOX\""));
        assert!(!out.contains("Other Users"));
        assert!(out.ends_with("A1 OK LIST completed\r\n"));
    }

    #[tokio::test]
    async fn select_of_missing_folder_is_no() {
        let mb = mailbox();
        let out = output(|mut s| async move {
            let selected = handle_select("A2", &args(&["Archive"]), &mb, &mut s)
                .await
                .unwrap();
            assert!(selected.is_none());
        })
        .await;

        assert_eq!(out, "A2 NO Mailbox does not exist\r\n");
    }

    #[tokio::test]
    async fn search_matches_subject_or_body_case_insensitively() {
        let mb = mailbox();
        let out = output(|mut s| async move {
            let criteria = args(&["OR", "SUBJECT", "SERVER OUTAGE", "BODY", "server outage"]);
            handle_uid_search("A3", &criteria, &mb, Some("INBOX"), &mut s)
                .await
                .unwrap();
        })
        .await;

        assert!(out.starts_with("* SEARCH 1 2\r\n"));
    }

    #[tokio::test]
    async fn body_search_can_be_rejected() {
        let mb = MailboxBuilder::new().folder("INBOX").reject_body_search().build();
        let out = output(|mut s| async move {
            let criteria = args(&["OR", "SUBJECT", "x", "BODY", "x"]);
            handle_uid_search("A4", &criteria, &mb, Some("INBOX"), &mut s)
                .await
                .unwrap();
        })
        .await;

        assert!(out.starts_with("A4 NO"));
    }

    #[tokio::test]
    async fn fetch_returns_literal_and_skips_unfetchable() {
        let mb = mailbox();
        let out = output(|mut s| async move {
            handle_uid_fetch("A5", &args(&["1,3", "(BODY.PEEK[])"]), &mb, Some("INBOX"), &mut s)
                .await
                .unwrap();
        })
        .await;

        assert!(out.contains("* 1 FETCH (UID 1 FLAGS (\\Seen) RFC822.SIZE 36 BODY[] {36}\r\n"));
        assert!(!out.contains("UID 3"));
        assert!(out.ends_with("A5 OK FETCH completed\r\n"));
    }
}
