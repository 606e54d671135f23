//! On/off hysteresis state machine.
//!
//! Pure decision logic: given the current state, a reading and the limits,
//! decide the next state and what to do with the elements. Actuation is
//! left to the caller.

use crate::interfaces::ControllerState;

/// Target temperature and the half-width of the band around it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    pub target: f64,
    pub threshold: f64,
}

impl Limits {
    pub fn lower(&self) -> f64 {
        self.target - self.threshold
    }

    pub fn upper(&self) -> f64 {
        self.target + self.threshold
    }

    pub fn contains(&self, temperature: f64) -> bool {
        temperature >= self.lower() && temperature <= self.upper()
    }
}

/// When an actuating state returns to `Stable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutoffRule {
    /// As soon as the reading is back inside the band.
    AtThreshold,
    /// Once the reading, rounded to `precision` decimals, reaches the rounded target.
    AtTarget { precision: u32 },
}

/// Element command attached to a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Leave the elements alone.
    Hold,
    /// Cooling off, then heating on.
    Heat,
    /// Heating off, then cooling on.
    Cool,
    /// Both elements off.
    AllOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: ControllerState,
    pub action: Action,
}

impl Transition {
    fn new(next: ControllerState, action: Action) -> Self {
        Self { next, action }
    }
}

/// Round half-up to `places` decimals: 44.95 → 45.0, 44.94 → 44.9.
pub fn round_half_up(value: f64, places: u32) -> f64 {
    let pow = 10f64.powi(places as i32);
    (value * pow + 0.5).floor() / pow
}

/// Decide the next state for `temperature`.
pub fn evaluate(
    current: ControllerState,
    temperature: f64,
    limits: Limits,
    rule: CutoffRule,
) -> Transition {
    match current {
        ControllerState::Stable | ControllerState::Unknown => {
            if temperature < limits.lower() {
                Transition::new(ControllerState::HeatingUp, Action::Heat)
            } else if temperature > limits.upper() {
                Transition::new(ControllerState::CoolingDown, Action::Cool)
            } else {
                Transition::new(ControllerState::Stable, Action::Hold)
            }
        }
        ControllerState::HeatingUp | ControllerState::CoolingDown => {
            let cutoff = match rule {
                CutoffRule::AtThreshold => limits.contains(temperature),
                CutoffRule::AtTarget { precision } => {
                    let value = round_half_up(temperature, precision);
                    let expected = round_half_up(limits.target, precision);
                    if current == ControllerState::HeatingUp {
                        value >= expected
                    } else {
                        value <= expected
                    }
                }
            };
            if cutoff {
                Transition::new(ControllerState::Stable, Action::AllOff)
            } else {
                Transition::new(current, Action::Hold)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: Limits = Limits {
        target: 45.0,
        threshold: 0.5,
    };
    const AT_TARGET: CutoffRule = CutoffRule::AtTarget { precision: 1 };

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_half_up(44.96, 1), 45.0);
        assert_eq!(round_half_up(44.94, 1), 44.9);
        assert_eq!(round_half_up(44.52, 1), 44.5);
        assert_eq!(round_half_up(45.0, 1), 45.0);
        assert_eq!(round_half_up(44.6, 0), 45.0);
        assert_eq!(round_half_up(44.449, 2), 44.45);
    }

    #[test]
    fn test_from_stable() {
        let t = evaluate(ControllerState::Stable, 44.0, LIMITS, AT_TARGET);
        assert_eq!(t, Transition::new(ControllerState::HeatingUp, Action::Heat));

        let t = evaluate(ControllerState::Stable, 46.0, LIMITS, AT_TARGET);
        assert_eq!(t, Transition::new(ControllerState::CoolingDown, Action::Cool));

        let t = evaluate(ControllerState::Stable, 45.2, LIMITS, AT_TARGET);
        assert_eq!(t, Transition::new(ControllerState::Stable, Action::Hold));
    }

    #[test]
    fn test_band_edges_are_inside() {
        let t = evaluate(ControllerState::Unknown, 44.5, LIMITS, AT_TARGET);
        assert_eq!(t.next, ControllerState::Stable);
        let t = evaluate(ControllerState::Unknown, 45.5, LIMITS, AT_TARGET);
        assert_eq!(t.next, ControllerState::Stable);
    }

    #[test]
    fn test_heating_cutoff_at_target() {
        // 44.96 rounds to 45.0
        let t = evaluate(ControllerState::HeatingUp, 44.96, LIMITS, AT_TARGET);
        assert_eq!(t, Transition::new(ControllerState::Stable, Action::AllOff));

        // 44.52 rounds to 44.5: inside the band but below target
        let t = evaluate(ControllerState::HeatingUp, 44.52, LIMITS, AT_TARGET);
        assert_eq!(t, Transition::new(ControllerState::HeatingUp, Action::Hold));
    }

    #[test]
    fn test_cooling_cutoff_at_target() {
        let t = evaluate(ControllerState::CoolingDown, 45.04, LIMITS, AT_TARGET);
        assert_eq!(t.next, ControllerState::Stable);

        let t = evaluate(ControllerState::CoolingDown, 45.3, LIMITS, AT_TARGET);
        assert_eq!(t.next, ControllerState::CoolingDown);
    }

    #[test]
    fn test_cutoff_at_threshold() {
        let rule = CutoffRule::AtThreshold;
        let t = evaluate(ControllerState::HeatingUp, 44.5, LIMITS, rule);
        assert_eq!(t, Transition::new(ControllerState::Stable, Action::AllOff));

        let t = evaluate(ControllerState::HeatingUp, 44.4, LIMITS, rule);
        assert_eq!(t.next, ControllerState::HeatingUp);

        let t = evaluate(ControllerState::CoolingDown, 45.5, LIMITS, rule);
        assert_eq!(t.next, ControllerState::Stable);
    }

    #[test]
    fn test_overshoot_still_cuts_off() {
        let t = evaluate(ControllerState::HeatingUp, 47.0, LIMITS, AT_TARGET);
        assert_eq!(t.next, ControllerState::Stable);
        let t = evaluate(ControllerState::CoolingDown, 40.0, LIMITS, AT_TARGET);
        assert_eq!(t.next, ControllerState::Stable);
    }
}
