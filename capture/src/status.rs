//! Live status text for the host's status area.

use tokio::sync::watch;

/// Latest human-readable description of document activity.
///
/// Purely presentational: nothing written here reaches an exporter.
#[derive(Debug)]
pub struct StatusLine {
    tx: watch::Sender<String>,
}

impl StatusLine {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(String::new());
        Self { tx }
    }

    /// Replaces the current text.
    pub fn set(&self, text: impl Into<String>) {
        self.tx.send_replace(text.into());
    }

    #[must_use]
    pub fn current(&self) -> String {
        self.tx.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.tx.subscribe()
    }
}

impl Default for StatusLine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        assert_eq!(StatusLine::new().current(), "");
    }

    #[tokio::test]
    async fn subscribers_see_updates() {
        let status = StatusLine::new();
        let mut rx = status.subscribe();

        status.set("Document 1 Save");
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), "Document 1 Save");
        assert_eq!(status.current(), "Document 1 Save");
    }
}
