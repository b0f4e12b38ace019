//! Configuration for the instance-manager facade

use serde::{Deserialize, Serialize};

/// Whether several copies of the application may run at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Every launch keeps running; instances just gain messaging.
    #[default]
    MultipleInstances,
    /// Secondary launches forward their arguments to the primary and stop.
    SingleInstance,
}

/// How a redundant secondary instance terminates under
/// [`Mode::SingleInstance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitPolicy {
    /// The process exits on its own right after forwarding.
    #[default]
    Auto,
    /// An exit-requested event is emitted; the application decides.
    Manual,
}

/// Instance-manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Organization name (identity component)
    pub organization: String,

    /// Application name (identity component)
    pub application: String,

    /// Application version (identity component)
    pub version: String,

    #[serde(default)]
    pub mode: Mode,

    #[serde(default)]
    pub exit_policy: ExitPolicy,

    /// Payload a secondary instance forwards to the primary on startup
    /// under [`Mode::SingleInstance`]. Defaults to the process arguments
    /// (without the program name) joined by spaces.
    #[serde(skip)]
    pub forward_payload: Option<Vec<u8>>,
}

impl ManagerConfig {
    pub fn new(
        organization: impl Into<String>,
        application: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            organization: organization.into(),
            application: application.into(),
            version: version.into(),
            mode: Mode::default(),
            exit_policy: ExitPolicy::default(),
            forward_payload: None,
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_exit_policy(mut self, exit_policy: ExitPolicy) -> Self {
        self.exit_policy = exit_policy;
        self
    }

    pub fn with_forward_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.forward_payload = Some(payload.into());
        self
    }

    /// The payload a secondary forwards: the configured one, or the
    /// process invocation arguments.
    pub fn resolve_forward_payload(&self) -> Vec<u8> {
        match &self.forward_payload {
            Some(payload) => payload.clone(),
            None => std::env::args()
                .skip(1)
                .collect::<Vec<_>>()
                .join(" ")
                .into_bytes(),
        }
    }
}
