//! Append-only text report fed by POST-coded datagrams

use parking_lot::Mutex;

/// Human-readable status report shared between the ingress thread and viewers
///
/// Reset to the banner at the start of every listener session. Viewers
/// attaching to the `post` stream receive a snapshot of the whole text.
pub struct TextReport {
    banner: String,
    terminator: String,
    text: Mutex<String>,
}

impl TextReport {
    pub fn new(banner: impl Into<String>, terminator: impl Into<String>) -> Self {
        let banner = banner.into();
        Self {
            text: Mutex::new(banner.clone()),
            banner,
            terminator: terminator.into(),
        }
    }

    /// Discard everything but the banner
    pub fn reset(&self) {
        let mut text = self.text.lock();
        text.clear();
        text.push_str(&self.banner);
    }

    /// Append one line followed by the configured terminator
    pub fn append_line(&self, line: &str) {
        let mut text = self.text.lock();
        text.push_str(line);
        text.push_str(&self.terminator);
    }

    /// Full current text
    pub fn snapshot(&self) -> String {
        self.text.lock().clone()
    }

    pub fn terminator(&self) -> &str {
        &self.terminator
    }
}
