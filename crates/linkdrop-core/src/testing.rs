//! Test doubles shared by the core's unit tests.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::port::MessagingPort,
    Result,
};

#[derive(Clone, Debug, PartialEq)]
pub enum Sent {
    Text(String),
    Photo { path: PathBuf, caption: String },
    Video {
        path: PathBuf,
        caption: String,
        duration_secs: Option<u32>,
    },
}

#[derive(Default)]
pub struct FakeMessenger {
    next_id: Mutex<i32>,
    pub sent: Mutex<Vec<Sent>>,
    pub edits: Mutex<Vec<(MessageRef, String)>>,
    /// Uploads whose file name matches one of these fail.
    pub fail_uploads: Mutex<Vec<String>>,
    /// Whether each upload's file existed at send time.
    pub existed_on_send: Mutex<Vec<bool>>,
}

impl FakeMessenger {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(1),
            ..Default::default()
        }
    }

    pub fn failing_on(names: &[&str]) -> Self {
        let fake = Self::new();
        *fake.fail_uploads.lock().unwrap() = names.iter().map(|s| s.to_string()).collect();
        fake
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Sent::Text(t) => Some(t.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn uploads(&self) -> Vec<Sent> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|s| !matches!(s, Sent::Text(_)))
            .cloned()
            .collect()
    }

    fn alloc(&self, chat_id: ChatId) -> MessageRef {
        let mut guard = self.next_id.lock().unwrap();
        let id = *guard;
        *guard += 1;
        MessageRef {
            chat_id,
            message_id: MessageId(id),
        }
    }

    fn check_upload(&self, path: &Path) -> Result<()> {
        self.existed_on_send.lock().unwrap().push(path.exists());
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if self.fail_uploads.lock().unwrap().contains(&name) {
            return Err(Error::External(format!("upload of {name} rejected")));
        }
        Ok(())
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        self.sent.lock().unwrap().push(Sent::Text(text.to_string()));
        Ok(self.alloc(chat_id))
    }

    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()> {
        self.edits.lock().unwrap().push((msg, text.to_string()));
        Ok(())
    }

    async fn send_photo(&self, _chat_id: ChatId, path: &Path, caption: &str) -> Result<()> {
        self.check_upload(path)?;
        self.sent.lock().unwrap().push(Sent::Photo {
            path: path.to_path_buf(),
            caption: caption.to_string(),
        });
        Ok(())
    }

    async fn send_video(
        &self,
        _chat_id: ChatId,
        path: &Path,
        caption: &str,
        duration_secs: Option<u32>,
    ) -> Result<()> {
        self.check_upload(path)?;
        self.sent.lock().unwrap().push(Sent::Video {
            path: path.to_path_buf(),
            caption: caption.to_string(),
            duration_secs,
        });
        Ok(())
    }
}
