//! CLI subcommands — one-shot color set/get/save and interface probing.

mod query;
mod set;

use clap::{Args, Subcommand};

pub(super) use keyhue_lib::KeyhueError;
pub(super) use keyhue_lib::config::{Config, parse_hex_id};
pub(super) use keyhue_lib::error::Result;
pub(super) use keyhue_lib::hid::{DeviceAddress, HidChannel};

#[derive(Subcommand)]
pub enum Command {
    /// Set the keyboard color: a name (red, yellow, green, cyan, blue,
    /// purple), #RRGGBB, or hsv:<H>
    Set(set::SetArgs),

    /// Read the current hue back from the keyboard
    Get {
        /// VIA channel index
        #[arg(long, default_value_t = 0)]
        channel: u8,
        #[command(flatten)]
        address: AddressArgs,
    },

    /// Persist the keyboard's current color to EEPROM
    Save {
        /// VIA channel index
        #[arg(long, default_value_t = 0)]
        channel: u8,
        #[command(flatten)]
        address: AddressArgs,
    },

    /// List HID interfaces of the configured keyboard and check the raw
    /// vendor one is present
    Probe {
        #[command(flatten)]
        address: AddressArgs,
    },
}

/// Device address overrides; unset fields come from the config file.
#[derive(Args)]
pub(super) struct AddressArgs {
    /// Vendor id in hex, e.g. 0x3434
    #[arg(long)]
    vid: Option<String>,

    /// Product id in hex
    #[arg(long)]
    pid: Option<String>,

    /// Usage page of the raw vendor interface
    #[arg(long)]
    usage_page: Option<String>,

    /// Usage of the raw vendor interface
    #[arg(long)]
    usage: Option<String>,
}

impl AddressArgs {
    pub(super) fn resolve(&self, config: &Config) -> Result<DeviceAddress> {
        let mut address = config.device_address()?;
        if let Some(vid) = &self.vid {
            address.vendor_id = parse_hex_id(vid).map_err(KeyhueError::Config)?;
        }
        if let Some(pid) = &self.pid {
            address.product_id = parse_hex_id(pid).map_err(KeyhueError::Config)?;
        }
        if let Some(usage_page) = &self.usage_page {
            address.usage_page = parse_hex_id(usage_page).map_err(KeyhueError::Config)?;
        }
        if let Some(usage) = &self.usage {
            address.usage = parse_hex_id(usage).map_err(KeyhueError::Config)?;
        }
        Ok(address)
    }
}

/// Open the raw HID interface for a one-shot command.
pub(super) fn open_channel(address: DeviceAddress) -> Result<HidChannel> {
    let mut channel = HidChannel::new(address);
    channel.open()?;
    Ok(channel)
}

pub fn run(cmd: Command, json: bool) -> Result<()> {
    match cmd {
        Command::Set(args) => {
            if json {
                log::warn!("--json is not supported for `set` (ignored)");
            }
            set::cmd_set(args)
        }
        Command::Get { channel, address } => query::cmd_get(channel, &address, json),
        Command::Save { channel, address } => query::cmd_save(channel, &address),
        Command::Probe { address } => query::cmd_probe(&address, json),
    }
}
