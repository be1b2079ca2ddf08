//! Mode, state and assertion types shared by every component.

use std::fmt;

use serde::{Deserialize, Serialize};

/// User-selected top-level behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaffeineMode {
    #[default]
    Disabled,
    Enabled,
    Auto,
    Timer,
}

impl CaffeineMode {
    pub const ALL: [CaffeineMode; 4] = [
        CaffeineMode::Disabled,
        CaffeineMode::Enabled,
        CaffeineMode::Auto,
        CaffeineMode::Timer,
    ];

    /// Next mode in the toggle cycle: Disabled -> Enabled -> Auto -> Timer -> Disabled.
    pub fn next(self) -> Self {
        match self {
            CaffeineMode::Disabled => CaffeineMode::Enabled,
            CaffeineMode::Enabled => CaffeineMode::Auto,
            CaffeineMode::Auto => CaffeineMode::Timer,
            CaffeineMode::Timer => CaffeineMode::Disabled,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CaffeineMode::Disabled => "disabled",
            CaffeineMode::Enabled => "enabled",
            CaffeineMode::Auto => "auto",
            CaffeineMode::Timer => "timer",
        }
    }
}

impl fmt::Display for CaffeineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether "prevent idle sleep" is asserted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CaffeineState {
    Active,
    #[default]
    Inactive,
}

impl CaffeineState {
    pub fn from_active(active: bool) -> Self {
        if active {
            CaffeineState::Active
        } else {
            CaffeineState::Inactive
        }
    }

    pub fn is_active(self) -> bool {
        self == CaffeineState::Active
    }
}

impl fmt::Display for CaffeineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaffeineState::Active => f.write_str("active"),
            CaffeineState::Inactive => f.write_str("inactive"),
        }
    }
}

/// Interactive session lock status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    Locked,
    #[default]
    Unlocked,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Locked => f.write_str("locked"),
            SessionState::Unlocked => f.write_str("unlocked"),
        }
    }
}

/// A value sent to the OS power primitive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Assertion {
    pub state: CaffeineState,
    /// Also keep the display on. Meaningless while `state` is inactive.
    pub keep_display_on: bool,
}

impl Assertion {
    pub const INACTIVE: Assertion = Assertion {
        state: CaffeineState::Inactive,
        keep_display_on: false,
    };

    pub fn new(state: CaffeineState, keep_display_on: bool) -> Self {
        Self {
            state,
            keep_display_on,
        }
    }

    /// Whether the system idle timer must be suppressed.
    pub fn system_required(&self) -> bool {
        self.state.is_active()
    }

    /// Whether the display idle timer must be suppressed.
    pub fn display_required(&self) -> bool {
        self.state.is_active() && self.keep_display_on
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_cycle_visits_every_mode_in_order() {
        assert_eq!(CaffeineMode::Disabled.next(), CaffeineMode::Enabled);
        assert_eq!(CaffeineMode::Enabled.next(), CaffeineMode::Auto);
        assert_eq!(CaffeineMode::Auto.next(), CaffeineMode::Timer);
        assert_eq!(CaffeineMode::Timer.next(), CaffeineMode::Disabled);
    }

    #[test]
    fn four_toggles_return_to_start() {
        for mode in CaffeineMode::ALL {
            assert_eq!(mode.next().next().next().next(), mode);
        }
    }

    #[test]
    fn mode_serializes_lowercase() {
        let json = serde_json::to_string(&CaffeineMode::Timer).unwrap();
        assert_eq!(json, "\"timer\"");
        let mode: CaffeineMode = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(mode, CaffeineMode::Auto);
    }

    #[test]
    fn inactive_assertion_requires_nothing() {
        let a = Assertion::new(CaffeineState::Inactive, true);
        assert!(!a.system_required());
        assert!(!a.display_required());

        let b = Assertion::new(CaffeineState::Active, true);
        assert!(b.system_required());
        assert!(b.display_required());
    }
}
