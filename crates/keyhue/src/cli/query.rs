//! `get` / `save` / `probe` subcommands — read back and inspect the device.

use keyhue_lib::channel::DeviceChannel;
use keyhue_lib::hid::{DeviceError, HidChannel};
use serde::Serialize;

use super::{AddressArgs, Config, Result, open_channel};

#[derive(Serialize)]
struct ColorOutput {
    hue: u8,
    saturation: u8,
}

pub(super) fn cmd_get(channel_index: u8, address: &AddressArgs, json: bool) -> Result<()> {
    let config = Config::load();
    let mut channel = open_channel(address.resolve(&config)?)?;

    let Some((hue, saturation)) = channel.get_color(channel_index) else {
        return Err(DeviceError::Io("could not read current color".into()).into());
    };
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&ColorOutput { hue, saturation })
                .map_err(std::io::Error::other)?
        );
    } else {
        // Bare hue on stdout, script-friendly.
        println!("{hue}");
    }
    Ok(())
}

pub(super) fn cmd_save(channel_index: u8, address: &AddressArgs) -> Result<()> {
    let config = Config::load();
    let mut channel = open_channel(address.resolve(&config)?)?;

    if !channel.save(channel_index) {
        return Err(DeviceError::Io("EEPROM save failed".into()).into());
    }
    println!("OK: saved to EEPROM");
    Ok(())
}

#[derive(Serialize)]
struct ProbeOutput {
    address: String,
    raw_interface_present: bool,
    interfaces: Vec<keyhue_lib::hid::DiscoveredInterface>,
}

pub(super) fn cmd_probe(address: &AddressArgs, json: bool) -> Result<()> {
    let config = Config::load();
    let resolved = address.resolve(&config)?;
    let mut channel = HidChannel::new(resolved);
    let interfaces = channel.discover()?;
    let present = interfaces.iter().any(|i| i.raw_interface);

    if json {
        let output = ProbeOutput {
            address: resolved.to_string(),
            raw_interface_present: present,
            interfaces,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&output).map_err(std::io::Error::other)?
        );
        return Ok(());
    }

    println!("Keyboard: {resolved}");
    if interfaces.is_empty() {
        println!("No HID interfaces found for this vid/pid.");
    }
    for interface in &interfaces {
        let marker = if interface.raw_interface { " (raw)" } else { "" };
        println!(
            "  usage {:#06x}/{:#04x}{marker}  {}",
            interface.usage_page, interface.usage, interface.path
        );
    }
    if present {
        println!("Raw vendor interface present.");
    } else {
        println!("Raw vendor interface NOT present; only the delegate path will work.");
    }
    Ok(())
}
