//! `set` subcommand — drive the keyboard to a target color.

use std::time::Duration;

use clap::Args;
use keyhue_lib::channel::DeviceChannel;
use keyhue_lib::color::Color;
use keyhue_lib::hid::DeviceError;
use keyhue_lib::steps::{self, StepSettings};

use super::{Config, Result, open_channel};

#[derive(Args)]
pub struct SetArgs {
    /// Color expression: a name, #RRGGBB, or hsv:<H>
    pub color: String,

    /// Persist to EEPROM after setting
    #[arg(long)]
    pub save: bool,

    /// Issue a single write instead of stepping to the target hue
    #[arg(long)]
    pub direct: bool,

    /// Hue step size (overrides config)
    #[arg(long)]
    pub step: Option<u32>,

    /// Delay between hue steps in milliseconds (overrides config)
    #[arg(long, value_name = "MS")]
    pub delay_ms: Option<u64>,

    /// VIA channel index
    #[arg(long, default_value_t = 0)]
    pub channel: u8,

    #[command(flatten)]
    pub address: super::AddressArgs,
}

pub(super) fn cmd_set(args: SetArgs) -> Result<()> {
    // Parse before touching the device so a bad expression never needs one.
    let color = Color::parse(&args.color)?;
    let config = Config::load();
    let address = args.address.resolve(&config)?;

    let mut channel = open_channel(address)?;
    let (hue, saturation) = color.hsv();

    // Named colors land in one write; hex/hsv targets walk the wheel so the
    // transition looks like the firmware's own hue keys.
    if args.direct || matches!(color, Color::Named(_)) {
        if !channel.set_color(hue, saturation, args.channel) {
            return Err(DeviceError::Io("color write failed".into()).into());
        }
    } else {
        let settings = StepSettings {
            step: args.step.unwrap_or(config.step),
            delay: Duration::from_millis(args.delay_ms.unwrap_or(config.delay_ms)),
        };
        let count = steps::walk(&mut channel, hue, &settings, args.channel)?;
        log::debug!("walked {count} steps to hue {hue}");
    }

    if args.save && !channel.save(args.channel) {
        return Err(DeviceError::Io("EEPROM save failed".into()).into());
    }

    println!("OK: hue set to {hue}");
    Ok(())
}
