//! Process-wide narrative enablement.

/// Enables the narrative collaborator when set to a truthy value.
pub const ENABLED_VAR: &str = "SURPLUS_NARRATIVE_ENABLED";
/// Credential for the external text generator.
pub const API_KEY_VAR: &str = "SURPLUS_NARRATIVE_API_KEY";

/// Whether narrative generation may run, plus the credential it runs with.
///
/// Enabled only when the flag is truthy (`1`, `true`, `yes`, `on`) and a
/// non-empty API key is present.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct NarrativeGate {
    requested: bool,
    api_key: Option<String>,
}

impl core::fmt::Debug for NarrativeGate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NarrativeGate")
            .field("requested", &self.requested)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl NarrativeGate {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new(requested: bool, api_key: Option<String>) -> Self {
        Self {
            requested,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let requested = lookup(ENABLED_VAR).is_some_and(|v| truthy(&v));
        Self::new(requested, lookup(API_KEY_VAR))
    }

    pub fn is_enabled(&self) -> bool {
        self.requested && self.api_key.is_some()
    }

    /// The credential, only while the gate is enabled.
    pub fn api_key(&self) -> Option<&str> {
        if self.is_enabled() {
            self.api_key.as_deref()
        } else {
            None
        }
    }
}
