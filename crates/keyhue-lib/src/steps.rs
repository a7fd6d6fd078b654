//! Hue step planning — shortest cyclic path on the 0..=255 wheel.
//!
//! The firmware only moves hue one unit per command, so a transition is a
//! planned count of single-unit writes with a delay between them. The
//! configured step size shapes the delegate cadence, not the per-write
//! stride.

use std::thread;
use std::time::Duration;

use crate::channel::DeviceChannel;
use crate::error::{KeyhueError, Result};
use crate::hid::DeviceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// A planned transition: direction and number of one-unit steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPlan {
    pub direction: Direction,
    pub count: u16,
}

/// Pick the shorter arc from `current` to `target`. Ties go forward.
pub fn plan(current: u8, target: u8) -> StepPlan {
    let forward = target.wrapping_sub(current) as u16;
    let backward = current.wrapping_sub(target) as u16;
    if forward <= backward {
        StepPlan {
            direction: Direction::Forward,
            count: forward,
        }
    } else {
        StepPlan {
            direction: Direction::Backward,
            count: backward,
        }
    }
}

/// Stepping parameters for a walked transition.
#[derive(Debug, Clone, Copy)]
pub struct StepSettings {
    /// Configured step size, kept in 1..=255.
    pub step: u32,
    /// Pause between consecutive hue writes.
    pub delay: Duration,
}

impl Default for StepSettings {
    fn default() -> Self {
        StepSettings {
            step: 8,
            delay: Duration::from_millis(15),
        }
    }
}

impl StepSettings {
    pub fn validate(&self) -> Result<()> {
        if !(1..=255).contains(&self.step) {
            return Err(KeyhueError::Config(format!(
                "step must be in 1..=255, got {}",
                self.step
            )));
        }
        Ok(())
    }
}

/// Walk a connected channel to `target` one hue unit at a time.
///
/// Reads the current color first, plans the shorter arc and issues one write
/// per unit, sleeping `settings.delay` between writes. Saturation is carried
/// over from the read, matching what the firmware's own hue keys do. Returns
/// the number of steps issued.
pub fn walk(
    channel: &mut impl DeviceChannel,
    target: u8,
    settings: &StepSettings,
    channel_index: u8,
) -> Result<u16> {
    settings.validate()?;

    let Some((current, saturation)) = channel.get_color(channel_index) else {
        return Err(DeviceError::Io("could not read current hue".into()).into());
    };

    let plan = plan(current, target);
    log::debug!(
        "hue walk: {current} -> {target}, {} steps {:?}",
        plan.count,
        plan.direction
    );

    let mut hue = current;
    for _ in 0..plan.count {
        hue = match plan.direction {
            Direction::Forward => hue.wrapping_add(1),
            Direction::Backward => hue.wrapping_sub(1),
        };
        if !channel.set_color(hue, saturation, channel_index) {
            return Err(DeviceError::Io(format!("hue step write failed at {hue}")).into());
        }
        if !settings.delay.is_zero() {
            thread::sleep(settings.delay);
        }
    }
    Ok(plan.count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::mock::MockChannel;

    // ── plan ──

    #[test]
    fn plan_wraps_forward_across_zero() {
        let p = plan(250, 10);
        assert_eq!(p.direction, Direction::Forward);
        assert_eq!(p.count, 16);
    }

    #[test]
    fn plan_wraps_backward_across_zero() {
        let p = plan(10, 250);
        assert_eq!(p.direction, Direction::Backward);
        assert_eq!(p.count, 16);
    }

    #[test]
    fn plan_no_move_when_equal() {
        assert_eq!(plan(42, 42).count, 0);
    }

    #[test]
    fn plan_tie_at_128_goes_forward() {
        let p = plan(0, 128);
        assert_eq!(p.direction, Direction::Forward);
        assert_eq!(p.count, 128);
    }

    #[test]
    fn plan_short_arcs_both_directions() {
        assert_eq!(
            plan(10, 20),
            StepPlan {
                direction: Direction::Forward,
                count: 10
            }
        );
        assert_eq!(
            plan(20, 10),
            StepPlan {
                direction: Direction::Backward,
                count: 10
            }
        );
    }

    // ── settings ──

    #[test]
    fn settings_reject_zero_step() {
        let settings = StepSettings {
            step: 0,
            delay: Duration::ZERO,
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn settings_reject_oversized_step() {
        let settings = StepSettings {
            step: 256,
            delay: Duration::ZERO,
        };
        assert!(settings.validate().is_err());
    }

    // ── walk ──

    fn fast() -> StepSettings {
        StepSettings {
            step: 8,
            delay: Duration::ZERO,
        }
    }

    #[test]
    fn walk_issues_one_write_per_unit() {
        let mut channel = MockChannel::connected_with(250, 255);
        let steps = walk(&mut channel, 10, &fast(), 0).unwrap();
        assert_eq!(steps, 16);
        let st = channel.state();
        assert_eq!(st.sent.len(), 16);
        // Wraps through 255 -> 0 and lands exactly on target.
        assert_eq!(st.sent.first(), Some(&(251, 255, 0)));
        assert_eq!(st.sent.last(), Some(&(10, 255, 0)));
    }

    #[test]
    fn walk_backward_lands_on_target() {
        let mut channel = MockChannel::connected_with(10, 255);
        walk(&mut channel, 250, &fast(), 0).unwrap();
        assert_eq!(channel.state().color, Some((250, 255)));
    }

    #[test]
    fn walk_noop_when_already_at_target() {
        let mut channel = MockChannel::connected_with(85, 255);
        assert_eq!(walk(&mut channel, 85, &fast(), 0).unwrap(), 0);
        assert!(channel.state().sent.is_empty());
    }

    #[test]
    fn walk_preserves_device_saturation() {
        let mut channel = MockChannel::connected_with(0, 180);
        walk(&mut channel, 3, &fast(), 0).unwrap();
        assert!(channel.state().sent.iter().all(|&(_, s, _)| s == 180));
    }

    #[test]
    fn walk_fails_without_readable_color() {
        let mut channel = MockChannel::new();
        assert!(walk(&mut channel, 85, &fast(), 0).is_err());
    }

    #[test]
    fn walk_fails_when_write_drops_mid_transition() {
        let mut channel = MockChannel::connected_with(0, 255);
        channel.state().fail_writes = true;
        assert!(walk(&mut channel, 20, &fast(), 0).is_err());
    }
}
