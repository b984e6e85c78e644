//! Firmware info and port listing command implementations.

use {
    crate::config::Config,
    anyhow::{Context, Result},
    console::style,
    nucleoflash::{
        DetectedPort, FirmwareImage, HandshakeCommand, auto_detect_port, detect_ports,
    },
    serde::Serialize,
    std::path::Path,
};

/// Upload parameters derived from a firmware file.
#[derive(Debug, Serialize)]
pub(crate) struct FirmwareInfo {
    pub(crate) path: String,
    pub(crate) length: usize,
    pub(crate) crc: String,
    pub(crate) chunk_size: usize,
    pub(crate) chunks: usize,
    pub(crate) handshake: String,
}

impl FirmwareInfo {
    pub(crate) fn new(path: &Path, image: &FirmwareImage, chunk_size: usize) -> Self {
        let handshake = HandshakeCommand::new(image.wire_len(), image.crc()).build();
        Self {
            path: path
                .display()
                .to_string(),
            length: image.len(),
            crc: format!("0x{:08X}", image.crc()),
            chunk_size,
            chunks: image.chunk_count(chunk_size),
            handshake: to_hex(&handshake),
        }
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Info command implementation.
pub(crate) fn cmd_info(config: &Config, firmware: &Path, json: bool) -> Result<()> {
    let image = FirmwareImage::from_file(firmware)
        .with_context(|| format!("Failed to load firmware {}", firmware.display()))?;
    let chunk_size = config
        .upload_config()
        .chunk_size;
    let info = FirmwareInfo::new(firmware, &image, chunk_size);

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": info,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!(
        "{}",
        style("Firmware Information")
            .bold()
            .underlined()
    );
    println!("  {:<12} {}", style("File:").dim(), info.path);
    println!("  {:<12} {} bytes", style("Length:").dim(), info.length);
    println!("  {:<12} {}", style("STM32 CRC:").dim(), style(&info.crc).cyan());
    println!(
        "  {:<12} {} x {} bytes",
        style("Chunks:").dim(),
        info.chunks,
        info.chunk_size
    );
    println!("  {:<12} {}", style("Handshake:").dim(), info.handshake);
    if image.len() % 4 != 0 {
        println!(
            "  {} trailing {} byte(s) are not covered by the CRC",
            style("!").yellow(),
            image.len() % 4
        );
    }

    Ok(())
}

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let detected = detect_ports();

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "ports": detected,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    eprintln!(
        "{}",
        style("Available serial ports")
            .bold()
            .underlined()
    );

    if detected.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return Ok(());
    }

    for port in &detected {
        eprintln!("  {} {}", style("•").green(), describe_port(port));
    }

    if let Ok(auto_port) = auto_detect_port() {
        eprintln!(
            "\n{} Auto-detected: {}",
            style("→")
                .green()
                .bold(),
            style(&auto_port.name)
                .cyan()
                .bold()
        );
    }

    Ok(())
}

fn describe_port(port: &DetectedPort) -> String {
    let device_type = if port
        .device
        .is_known()
    {
        format!(" [{}]", style(port.device.name()).yellow())
    } else {
        String::new()
    };
    let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        format!(" ({vid:04X}:{pid:04X})")
    } else {
        String::new()
    };
    let product = port
        .product
        .as_deref()
        .map(|p| format!(" - {}", style(p).dim()))
        .unwrap_or_default();

    format!(
        "{}{device_type}{vid_pid}{product}",
        style(&port.name).cyan()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use nucleoflash::DeviceKind;

    #[test]
    fn test_firmware_info_fields() {
        let image = FirmwareImage::from_bytes(vec![0x78, 0x56, 0x34, 0x12]).unwrap();
        let info = FirmwareInfo::new(Path::new("app.bin"), &image, 16);

        assert_eq!(info.length, 4);
        assert_eq!(info.crc, "0xDF8A8A2B");
        assert_eq!(info.chunks, 1);
        assert_eq!(
            info.handshake,
            "75 70 67 72 61 64 65 46 77 04 00 00 00 2B 8A 8A DF"
        );
    }

    #[test]
    fn test_firmware_info_chunk_count() {
        let image = FirmwareImage::from_bytes(vec![0u8; 33]).unwrap();
        let info = FirmwareInfo::new(Path::new("app.bin"), &image, 16);
        assert_eq!(info.chunks, 3);
    }

    #[test]
    fn test_firmware_info_serializes() {
        let image = FirmwareImage::from_bytes(Vec::new()).unwrap();
        let info = FirmwareInfo::new(Path::new("empty.bin"), &image, 16);
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["length"], 0);
        assert_eq!(value["crc"], "0xFFFFFFFF");
        assert_eq!(value["chunks"], 0);
    }

    #[test]
    fn test_describe_port_plain() {
        console::set_colors_enabled(false);
        let mut port = DetectedPort::unknown("/dev/ttyACM0");
        port.device = DeviceKind::StLink;
        port.vid = Some(0x0483);
        port.pid = Some(0x374B);
        port.product = Some("STLink".to_string());

        assert_eq!(
            describe_port(&port),
            "/dev/ttyACM0 [ST-LINK] (0483:374B) - STLink"
        );
    }
}
