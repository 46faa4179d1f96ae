//! Key negotiated with a host key manager.

use super::{Credential, CredentialSource};
use crate::error::{EditError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Default number of availability checks before giving up.
const DEFAULT_MAX_ATTEMPTS: u32 = 50;
/// Default delay between availability checks (50 x 100ms = 5s).
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A key manager provided by the surrounding environment.
#[async_trait]
pub trait KeyManagerHost: Send + Sync {
    /// Whether the key manager can be reached yet.
    async fn is_available(&self) -> bool;

    /// Whether the user already picked a key.
    async fn has_selected_key(&self) -> Result<bool>;

    /// Opens the host's key selection UI and waits for it to close.
    async fn open_select_key(&self) -> Result<()>;

    /// Returns the currently selected key.
    async fn selected_key(&self) -> Result<Credential>;
}

/// Obtains the key from a [`KeyManagerHost`], opening its selection UI when
/// nothing is selected or the last key was rejected.
pub struct HostNegotiated<H> {
    host: H,
    max_attempts: u32,
    poll_interval: Duration,
    connected: AtomicBool,
    needs_selection: AtomicBool,
}

impl<H: KeyManagerHost> HostNegotiated<H> {
    /// Wraps a host with the default polling budget.
    pub fn new(host: H) -> Self {
        Self {
            host,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            connected: AtomicBool::new(false),
            needs_selection: AtomicBool::new(false),
        }
    }

    /// Overrides the polling budget.
    pub fn with_polling(mut self, max_attempts: u32, poll_interval: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.poll_interval = poll_interval;
        self
    }

    /// The wrapped host.
    pub fn host(&self) -> &H {
        &self.host
    }

    async fn wait_for_host(&self) -> Result<()> {
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }

        let mut attempts = 0;
        loop {
            if self.host.is_available().await {
                self.connected.store(true, Ordering::Release);
                return Ok(());
            }
            attempts += 1;
            if attempts >= self.max_attempts {
                tracing::warn!(attempts, "key manager not found");
                return Err(EditError::HostUnavailable(
                    "Could not connect to the API key manager. Please try again.".into(),
                ));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl<H: KeyManagerHost> CredentialSource for HostNegotiated<H> {
    async fn credential(&self) -> Result<Credential> {
        self.wait_for_host().await?;

        let has_key = if self.needs_selection.load(Ordering::Acquire) {
            false
        } else {
            match self.host.has_selected_key().await {
                Ok(has_key) => has_key,
                Err(e) => {
                    tracing::debug!("error checking for API key: {e}");
                    false
                }
            }
        };

        if !has_key {
            // Completion of the selection UI is taken as success.
            self.host.open_select_key().await?;
            self.needs_selection.store(false, Ordering::Release);
        }

        self.host.selected_key().await
    }

    async fn invalidate(&self) {
        self.needs_selection.store(true, Ordering::Release);
    }

    fn describe(&self) -> &'static str {
        "key manager"
    }
}

/// A [`KeyManagerHost`] backed by an external helper program.
///
/// The helper is invoked as `<program> has`, `<program> select` and
/// `<program> get`; `has` reports through its exit status, `get` prints the
/// key on stdout.
#[derive(Debug, Clone)]
pub struct HelperCommandHost {
    program: PathBuf,
}

impl HelperCommandHost {
    /// Creates a host for the given helper program.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn resolve(&self) -> Option<PathBuf> {
        if self.program.components().count() > 1 || self.program.is_absolute() {
            return self.program.is_file().then(|| self.program.clone());
        }
        let path = std::env::var_os("PATH")?;
        std::env::split_paths(&path)
            .map(|dir| dir.join(&self.program))
            .find(|candidate| candidate.is_file())
    }

    async fn run(&self, action: &str) -> Result<std::process::Output> {
        let program = self.resolve().ok_or_else(|| {
            EditError::HostUnavailable(format!(
                "key manager {} not found",
                self.program.display()
            ))
        })?;
        let output = tokio::process::Command::new(&program)
            .arg(action)
            .stdin(std::process::Stdio::inherit())
            .stderr(std::process::Stdio::inherit())
            .output()
            .await?;
        Ok(output)
    }

    fn program_name(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl KeyManagerHost for HelperCommandHost {
    async fn is_available(&self) -> bool {
        self.resolve().is_some()
    }

    async fn has_selected_key(&self) -> Result<bool> {
        Ok(self.run("has").await?.status.success())
    }

    async fn open_select_key(&self) -> Result<()> {
        let output = self.run("select").await?;
        if !output.status.success() {
            return Err(EditError::Config(format!(
                "Could not open API key selection ({} exited with {}). Please try again.",
                self.program_name().display(),
                output.status
            )));
        }
        Ok(())
    }

    async fn selected_key(&self) -> Result<Credential> {
        let output = self.run("get").await?;
        if !output.status.success() {
            return Err(EditError::MissingCredential);
        }
        Credential::new(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
