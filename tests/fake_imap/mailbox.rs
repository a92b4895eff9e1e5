//! Folders and messages served by the fake server.

#[derive(Debug, Clone)]
pub struct Mailbox {
    pub folders: Vec<Folder>,
    /// Answer `BODY`/`TEXT` searches with `NO`, like servers without a
    /// full-text index.
    pub reject_body_search: bool,
}

impl Mailbox {
    pub fn get_folder(&self, name: &str) -> Option<&Folder> {
        self.folders.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct Folder {
    pub name: String,
    pub emails: Vec<TestEmail>,
}

#[derive(Debug, Clone)]
pub struct TestEmail {
    pub uid: u32,
    pub seen: bool,
    pub raw: Vec<u8>,
    /// Matches searches but never comes back from `UID FETCH`.
    pub unfetchable: bool,
}

impl TestEmail {
    /// The `Subject:` header value, empty when missing.
    pub fn subject(&self) -> String {
        let text = String::from_utf8_lossy(&self.raw);
        text.split("\r\n\r\n")
            .next()
            .unwrap_or_default()
            .lines()
            .find_map(|line| {
                let (key, value) = line.split_once(':')?;
                key.eq_ignore_ascii_case("subject")
                    .then(|| value.trim().to_string())
            })
            .unwrap_or_default()
    }

    /// Everything after the header block.
    pub fn body(&self) -> String {
        let text = String::from_utf8_lossy(&self.raw);
        text.split_once("\r\n\r\n")
            .map(|(_, body)| body.to_string())
            .unwrap_or_default()
    }
}

/// Builds a [`Mailbox`]. Emails land in the most recently added folder.
pub struct MailboxBuilder {
    folders: Vec<Folder>,
    reject_body_search: bool,
}

impl MailboxBuilder {
    pub fn new() -> Self {
        Self {
            folders: Vec::new(),
            reject_body_search: false,
        }
    }

    pub fn folder(mut self, name: &str) -> Self {
        self.folders.push(Folder {
            name: name.to_string(),
            emails: Vec::new(),
        });
        self
    }

    pub fn email(self, uid: u32, seen: bool, raw: &[u8]) -> Self {
        self.push(uid, seen, raw, false)
    }

    pub fn unfetchable_email(self, uid: u32, raw: &[u8]) -> Self {
        self.push(uid, false, raw, true)
    }

    pub fn reject_body_search(mut self) -> Self {
        self.reject_body_search = true;
        self
    }

    pub fn build(self) -> Mailbox {
        Mailbox {
            folders: self.folders,
            reject_body_search: self.reject_body_search,
        }
    }

    fn push(mut self, uid: u32, seen: bool, raw: &[u8], unfetchable: bool) -> Self {
        self.folders
            .last_mut()
            .expect("call .folder() before adding emails")
            .emails
            .push(TestEmail {
                uid,
                seen,
                raw: raw.to_vec(),
                unfetchable,
            });
        self
    }
}
