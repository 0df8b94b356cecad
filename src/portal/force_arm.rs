//! Force-arm escalation after the portal refuses a plain arm.
//!
//! `Idle -> Rejected -> Escalated`. `Rejected` holds the force-arm button
//! scraped from the refusal itself; nothing else may feed the escalation.

use regex::Regex;
use std::mem;
use tracing::debug;

use super::{
    arm_state::ArmState,
    error::{Error, Result},
    models::{OrbButton, OrbButtons},
};

/// Texts that mean the panel wants the arm forced.
pub const DEFAULT_TRIGGERS: &[&str] = &[
    r"(?i)\d+\s+sensors?\s+open",
    r"(?i)sensors?\s+(are|is)\s+open",
    r"(?i)bypass",
];

#[derive(Clone, Debug)]
pub struct ForceArmPolicy {
    enabled: bool,
    triggers: Vec<Regex>,
}

impl ForceArmPolicy {
    /// # Errors
    /// Returns [`Error::Pattern`] if a trigger does not compile.
    pub fn new(triggers: &[&str]) -> Result<Self> {
        let triggers = triggers
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            enabled: true,
            triggers,
        })
    }

    /// # Errors
    /// Returns [`Error::Pattern`] if a built-in trigger does not compile.
    pub fn standard() -> Result<Self> {
        Self::new(DEFAULT_TRIGGERS)
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn triggered(&self, evidence: &[&str]) -> bool {
        evidence
            .iter()
            .any(|text| self.triggers.iter().any(|trigger| trigger.is_match(text)))
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum ForceArmState {
    #[default]
    Idle,
    Rejected {
        button: OrbButton,
    },
    Escalated,
}

#[derive(Debug, Default)]
pub struct ForceArm {
    state: ForceArmState,
}

impl ForceArm {
    #[must_use]
    pub fn state(&self) -> &ForceArmState {
        &self.state
    }

    /// Record the reply to a plain arm command. Returns `true` when the reply
    /// is a refusal that carries a usable force-arm button.
    pub fn observe(
        &mut self,
        policy: &ForceArmPolicy,
        target: ArmState,
        evidence: &[&str],
        reply: &OrbButtons,
    ) -> bool {
        self.state = ForceArmState::Idle;
        if !policy.is_enabled() || target == ArmState::Off || !policy.triggered(evidence) {
            return false;
        }

        let Some(button) = reply
            .force_arm()
            .filter(|button| button.target().is_none_or(|arm| arm == target))
        else {
            debug!(%target, "refusal carries no force-arm button");
            return false;
        };

        debug!(%target, "plain arm refused; force-arm available");
        self.state = ForceArmState::Rejected {
            button: button.clone(),
        };
        true
    }

    /// Consume the refusal and produce the force-arm command body.
    ///
    /// # Errors
    /// Returns [`Error::NotInitialized`] without a prior refusal and
    /// [`Error::StaleTokens`] when another exchange happened since.
    pub fn escalate(&mut self, current_generation: u64) -> Result<String> {
        match mem::take(&mut self.state) {
            ForceArmState::Rejected { button } if button.generation == current_generation => {
                self.state = ForceArmState::Escalated;
                Ok(command_body(&button))
            }
            ForceArmState::Rejected { .. } => Err(Error::StaleTokens("force-arm tokens predate the last exchange")),
            other => {
                self.state = other;
                Err(Error::NotInitialized("force arm needs a prior refusal"))
            }
        }
    }
}

/// Pre-encoded `RunRRACommand` body; token values go out exactly as scraped.
#[must_use]
pub fn command_body(button: &OrbButton) -> String {
    format!(
        "sat={}&href={}&armstate=forcearm&arm={}",
        button.sat, button.href, button.arm
    )
}
