//! Committee roles and the policy-delta domains they vote in

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Basis-point moves allowed in a normal meeting
pub const NORMAL_DELTAS_BPS: [i32; 3] = [-25, 0, 25];

/// Basis-point moves allowed when crisis mode is on
pub const CRISIS_DELTAS_BPS: [i32; 5] = [-50, -25, 0, 25, 50];

/// Allowed policy deltas for a run
pub fn allowed_deltas(crisis_mode: bool) -> &'static [i32] {
    if crisis_mode {
        &CRISIS_DELTAS_BPS
    } else {
        &NORMAL_DELTAS_BPS
    }
}

/// Clamp a generated delta into the allowed set.
///
/// Anything missing or outside `allowed` becomes 0; the flag reports whether
/// that happened.
pub fn coerce_delta(raw: Option<i64>, allowed: &[i32]) -> (i32, bool) {
    match raw.and_then(|d| i32::try_from(d).ok()) {
        Some(d) if allowed.contains(&d) => (d, false),
        _ => (0, true),
    }
}

/// A voting member of the committee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Balances both mandates
    Centrist,
    /// Leans toward inflation control
    Hawk,
    /// Leans toward employment and growth
    Dove,
}

impl Role {
    /// Every role, in speaking order
    pub const ALL: [Role; 3] = [Role::Centrist, Role::Hawk, Role::Dove];

    /// Lowercase identifier
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Centrist => "centrist",
            Self::Hawk => "hawk",
            Self::Dove => "dove",
        }
    }

    /// Fixed persona for this role
    pub fn profile(self) -> &'static RoleProfile {
        match self {
            Self::Centrist => &CENTRIST,
            Self::Hawk => &HAWK,
            Self::Dove => &DOVE,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "centrist" => Ok(Self::Centrist),
            "hawk" => Ok(Self::Hawk),
            "dove" => Ok(Self::Dove),
            other => Err(crate::error::Error::invalid_input(format!("unknown role: {}", other))),
        }
    }
}

/// Persona injected into every prompt for a role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleProfile {
    /// Role this profile belongs to
    pub role: Role,
    /// Name used in prompts and transcripts
    pub display_name: &'static str,
    /// Policy bias
    pub bias: &'static str,
    /// Speaking style
    pub style: &'static str,
}

static CENTRIST: RoleProfile = RoleProfile {
    role: Role::Centrist,
    display_name: "Centrist",
    bias: "Neutral: weighs both sides of the dual mandate, prefers gradual moves, \
           and pays attention to policy lags and the symmetry of risks.",
    style: "Measured, careful and well organised; frames arguments as risk management \
            under uncertainty.",
};

static HAWK: RoleProfile = RoleProfile {
    role: Role::Hawk,
    display_name: "Hawk",
    bias: "Hawkish: puts inflation and the anchoring of expectations first, tolerates \
           slower near-term growth, and favours firmer guidance.",
    style: "Direct and pressing but evidence-based; returns often to sticky inflation \
            and second-round effects.",
};

static DOVE: RoleProfile = RoleProfile {
    role: Role::Dove,
    display_name: "Dove",
    bias: "Dovish: puts downside risks to employment and growth first, watches the \
           lagged effect of tighter financial conditions, and favours patience.",
    style: "Calm and empathetic; warns against over-tightening and a hard landing.",
};
