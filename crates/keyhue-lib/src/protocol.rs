//! VIA raw HID report construction and parsing.
//!
//! VIA speaks fixed 32-byte vendor reports. Writes are prefixed with a zero
//! HID report id, so an outgoing buffer is 33 bytes; reads come back without
//! the id. Color state lives under the `rgblight` value channel.

/// VIA command: set a value on a channel.
pub const VIA_SET_VALUE: u8 = 0x07;
/// VIA command: read a value back from a channel.
pub const VIA_GET_VALUE: u8 = 0x08;
/// VIA command: persist current channel state to EEPROM.
pub const VIA_SAVE: u8 = 0x09;

/// Value id: brightness.
pub const VIA_RGB_BRIGHTNESS: u8 = 1;
/// Value id: effect index.
pub const VIA_RGB_EFFECT: u8 = 2;
/// Value id: effect speed.
pub const VIA_RGB_SPEED: u8 = 3;
/// Value id: color as a `(hue, saturation)` pair.
pub const VIA_RGB_COLOR: u8 = 4;

/// Fixed VIA report size, excluding the report id.
pub const REPORT_SIZE: usize = 32;
/// Report id prepended to every outgoing report.
pub const REPORT_ID: u8 = 0x00;

/// Build an outgoing report: `[id, command, channel, value_id, payload...]`,
/// zero-padded to [`REPORT_SIZE`] + 1 bytes.
pub fn build_report(command: u8, channel: u8, value_id: u8, payload: &[u8]) -> Vec<u8> {
    let mut report = vec![0u8; REPORT_SIZE + 1];
    report[0] = REPORT_ID;
    report[1] = command;
    report[2] = channel;
    report[3] = value_id;
    let n = payload.len().min(REPORT_SIZE - 3);
    report[4..4 + n].copy_from_slice(&payload[..n]);
    report
}

/// Report setting the color of a channel.
pub fn set_color_report(channel: u8, hue: u8, saturation: u8) -> Vec<u8> {
    build_report(VIA_SET_VALUE, channel, VIA_RGB_COLOR, &[hue, saturation])
}

/// Report requesting the current color of a channel.
pub fn get_color_report(channel: u8) -> Vec<u8> {
    build_report(VIA_GET_VALUE, channel, VIA_RGB_COLOR, &[])
}

/// Report persisting a channel's color state to EEPROM.
pub fn save_report(channel: u8) -> Vec<u8> {
    build_report(VIA_SAVE, channel, VIA_RGB_COLOR, &[])
}

/// Extract `(hue, saturation)` from a color read response.
///
/// Responses echo the request layout, so hue and saturation sit at offsets
/// 3 and 4. Short responses yield `None`.
pub fn parse_color_response(response: &[u8]) -> Option<(u8, u8)> {
    if response.len() < 5 {
        return None;
    }
    Some((response[3], response[4]))
}
