use rip_rs_packets::EthernetFrame;

/// Parses `<iface> <hex bytes>`. The hex may be split by whitespace anywhere between byte pairs.
pub fn parse_line(line: &str) -> Result<(String, EthernetFrame), &'static str> {
    let mut fields = line.split_whitespace();
    let iface = fields.next().ok_or("Missing interface name")?;
    let hex: String = fields.collect();
    if hex.is_empty() {
        return Err("Missing frame bytes");
    }
    if !hex.is_ascii() {
        return Err("Invalid hex digit");
    }
    if hex.len() % 2 != 0 {
        return Err("Odd number of hex digits");
    }

    let bytes = (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| "Invalid hex digit"))
        .collect::<Result<Vec<u8>, _>>()?;
    Ok((iface.to_string(), EthernetFrame::from_buffer(bytes, 0)?))
}

/// Formats a frame the way `parse_line` reads it.
pub fn format_line(iface: &str, frame: &EthernetFrame) -> String {
    let hex: String = frame.bytes().iter().map(|b| format!("{:02x}", b)).collect();
    format!("{} {}", iface, hex)
}
