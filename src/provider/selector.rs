//! Provider selection policy.
//!
//! [`resolve_provider`] is a pure function of the requested mode and a
//! snapshot of model readiness, so the same inputs always pick the same
//! provider.  `auto` walks a strict priority chain (local, then inference,
//! then stub) and attempts exactly one candidate.  Explicit modes never fall
//! back; an unmet precondition is reported as
//! [`ProviderError::Unavailable`].

use crate::config::ProviderMode;
use crate::models::ModelDescriptor;

use super::{ProviderError, ProviderKind};

/// Everything the policy looks at for one request.
#[derive(Debug, Clone, Copy)]
pub struct SelectionContext<'a> {
    /// Tracker snapshot taken for this request.
    pub models: &'a [ModelDescriptor],
    /// An on-device runtime backend is configured.
    pub local_runtime: bool,
    /// A hosted-inference credential is configured.
    pub inference_credential: bool,
    /// Repo id of the model the requested voice needs, if known.
    pub model: Option<&'a str>,
}

impl SelectionContext<'_> {
    /// Why the local provider cannot serve this request, or `None` if it can.
    fn local_blocker(&self) -> Option<String> {
        if !self.local_runtime {
            return Some("no on-device runtime is configured".into());
        }

        let any_required_ready = self
            .models
            .iter()
            .any(|m| !m.optional && m.local_supported && m.exists_locally);
        if !any_required_ready {
            return Some("no local-capable required model has been downloaded".into());
        }

        let wanted = self
            .model
            .and_then(|repo| self.models.iter().find(|m| m.repo_identifier == repo));
        match wanted {
            Some(m) if !m.local_supported => {
                Some(format!("model {} cannot run on-device", m.repo_identifier))
            }
            Some(m) if !m.exists_locally => {
                Some(format!("model {} is not downloaded", m.repo_identifier))
            }
            _ => None,
        }
    }
}

/// Pick the provider for `mode`.
pub fn resolve_provider(
    mode: ProviderMode,
    ctx: &SelectionContext<'_>,
) -> Result<ProviderKind, ProviderError> {
    match mode {
        ProviderMode::Auto => {
            if ctx.local_blocker().is_none() {
                Ok(ProviderKind::Local)
            } else if ctx.inference_credential {
                Ok(ProviderKind::Inference)
            } else {
                Ok(ProviderKind::Stub)
            }
        }
        ProviderMode::Local => match ctx.local_blocker() {
            None => Ok(ProviderKind::Local),
            Some(reason) => Err(ProviderError::Unavailable { mode, reason }),
        },
        ProviderMode::Inference => {
            if ctx.inference_credential {
                Ok(ProviderKind::Inference)
            } else {
                Err(ProviderError::Unavailable {
                    mode,
                    reason: "no inference credential is configured".into(),
                })
            }
        }
        ProviderMode::Stub => Ok(ProviderKind::Stub),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
