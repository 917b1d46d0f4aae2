//! Deferred "install this app" prompt. The host hands over a prompt handle
//! when the platform offers one; it can be shown at most once.

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Accepted,
    Dismissed,
}

#[derive(Debug)]
pub struct InstallPrompt<P> {
    pending: Option<P>,
    installed: bool,
}

impl<P> Default for InstallPrompt<P> {
    fn default() -> Self {
        Self {
            pending: None,
            installed: false,
        }
    }
}

impl<P> InstallPrompt<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the newest prompt. Ignored once the app is installed.
    pub fn capture(&mut self, prompt: P) {
        if self.installed {
            return;
        }
        debug!("Install prompt captured");
        self.pending = Some(prompt);
    }

    pub fn is_installable(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    pub fn mark_installed(&mut self) {
        self.installed = true;
        self.pending = None;
    }

    /// Hand out the captured prompt. Later calls return `None` until a new
    /// prompt is captured.
    pub fn take(&mut self) -> Option<P> {
        self.pending.take()
    }

    /// Record what the user chose after being shown the prompt.
    pub fn complete(&mut self, outcome: InstallOutcome) {
        debug!(?outcome, "Install prompt answered");
        if outcome == InstallOutcome::Accepted {
            self.mark_installed();
        }
    }
}
