//! Product message collection
//!
//! Products report user facing messages by writing one file per message into
//! the workspace messages folder. The file name prefix decides the type.

use pds_core::domain::message::{Message, MessageType};
use std::path::Path;
use tracing::debug;

use crate::error::MessageCollectError;

#[derive(Debug, Default, Clone, Copy)]
pub struct MessageCollector;

impl MessageCollector {
    pub fn new() -> Self {
        Self
    }

    /// Reads all message files directly inside `directory`
    ///
    /// A directory that does not exist or is empty yields no messages. Files
    /// are read in file name order.
    pub fn collect(&self, directory: Option<&Path>) -> Result<Vec<Message>, MessageCollectError> {
        let directory = directory.ok_or(MessageCollectError::MissingDirectory)?;

        if !directory.is_dir() {
            debug!("No messages folder at {}", directory.display());
            return Ok(Vec::new());
        }

        let io_error = |source| MessageCollectError::Io {
            path: directory.display().to_string(),
            source,
        };

        let mut files = Vec::new();
        for entry in std::fs::read_dir(directory).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        let mut messages = Vec::with_capacity(files.len());
        for path in files {
            let text = std::fs::read_to_string(&path).map_err(|source| MessageCollectError::Io {
                path: path.display().to_string(),
                source,
            })?;

            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            messages.push(Message::new(message_type_for(&file_name), text));
        }

        Ok(messages)
    }
}

fn message_type_for(file_name: &str) -> MessageType {
    let upper = file_name.to_ascii_uppercase();
    if upper.starts_with("ERROR") {
        MessageType::Error
    } else if upper.starts_with("WARNING") {
        MessageType::Warning
    } else {
        MessageType::Info
    }
}
