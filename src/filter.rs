use crate::events::{ChangeEvent, ChangeKind, QualifyingFile};

/// Leading letter the print spooler gives finished receipt jobs.
pub const RECEIPT_PREFIX: char = 'd';

/// Decides which change events are new receipt jobs.
#[derive(Debug, Clone)]
pub struct ReceiptFilter {
    prefix: char,
}

impl Default for ReceiptFilter {
    fn default() -> Self {
        Self {
            prefix: RECEIPT_PREFIX,
        }
    }
}

impl ReceiptFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts creations whose base filename starts with the receipt prefix,
    /// ignoring case. Everything else, overflow included, is rejected.
    pub fn accepts(&self, event: &ChangeEvent) -> bool {
        if event.kind != ChangeKind::Created {
            return false;
        }

        event
            .file_name()
            .and_then(|name| name.chars().next())
            .map(|first| first.to_lowercase().eq(self.prefix.to_lowercase()))
            .unwrap_or(false)
    }

    pub fn qualify(&self, event: ChangeEvent) -> Option<QualifyingFile> {
        if self.accepts(&event) {
            Some(QualifyingFile::from_event(event))
        } else {
            None
        }
    }
}
