//! Serial port and baud rate selection.
//!
//! The port comes from, in order: the command line (or `NUCLEOFLASH_PORT`),
//! the configuration file, then auto-detection, which prefers ST-LINK
//! virtual COM ports.

use {
    crate::{CliError, DEFAULT_BAUD, config::Config},
    anyhow::Result,
    log::{debug, info},
    nucleoflash::{DetectedPort, detect_ports, device::select_port},
};

/// Pick the serial port to use.
pub(crate) fn select_serial_port(explicit: Option<&str>, config: &Config) -> Result<String> {
    if let Some(port) = explicit {
        debug!("Using port from command line: {port}");
        return Ok(port.to_string());
    }

    if let Some(port) = &config
        .connection
        .serial
    {
        debug!("Using port from config: {port}");
        return Ok(port.clone());
    }

    let port = select_detected_port(&detect_ports())?;
    info!(
        "Auto-selected port: {} [{}]",
        port.name,
        port.device
            .name()
    );
    Ok(port.name)
}

/// Pick the best candidate among detected ports.
fn select_detected_port(ports: &[DetectedPort]) -> Result<DetectedPort> {
    select_port(ports)
        .cloned()
        .ok_or_else(|| {
            CliError::DeviceNotFound(
                "No serial ports found. Connect the board or pass --port.".to_string(),
            )
            .into()
        })
}

/// Pick the baud rate: command line (or `NUCLEOFLASH_BAUD`), then config,
/// then the board default.
pub(crate) fn select_baud(explicit: Option<u32>, config: &Config) -> u32 {
    explicit
        .or(config
            .connection
            .baud)
        .unwrap_or(DEFAULT_BAUD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nucleoflash::DeviceKind;

    fn config_with_port(port: &str) -> Config {
        let mut config = Config::default();
        config.connection.serial = Some(port.to_string());
        config
    }

    #[test]
    fn test_explicit_port_wins() {
        let config = config_with_port("/dev/ttyUSB9");
        let port = select_serial_port(Some("/dev/ttyACM0"), &config).unwrap();
        assert_eq!(port, "/dev/ttyACM0");
    }

    #[test]
    fn test_config_port_used_without_explicit() {
        let config = config_with_port("COM4");
        assert_eq!(select_serial_port(None, &config).unwrap(), "COM4");
    }

    #[test]
    fn test_no_ports_is_device_not_found() {
        let err = select_detected_port(&[]).unwrap_err();
        let cli_err = err.downcast_ref::<CliError>().unwrap();
        assert!(matches!(cli_err, CliError::DeviceNotFound(_)));
        assert_eq!(cli_err.exit_code(), 4);
    }

    #[test]
    fn test_detected_stlink_preferred() {
        let mut stlink = DetectedPort::unknown("/dev/ttyACM0");
        stlink.device = DeviceKind::StLink;
        let ports = vec![DetectedPort::unknown("/dev/ttyS0"), stlink];

        assert_eq!(select_detected_port(&ports).unwrap().name, "/dev/ttyACM0");
    }

    #[test]
    fn test_select_baud_priority() {
        let mut config = Config::default();
        assert_eq!(select_baud(None, &config), 115_200);

        config.connection.baud = Some(57_600);
        assert_eq!(select_baud(None, &config), 57_600);
        assert_eq!(select_baud(Some(9_600), &config), 9_600);
    }
}
