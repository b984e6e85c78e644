//! Native serial port backend using the `serialport` crate.

use {
    crate::{
        error::Result,
        port::{DataBits, FlowControl, Parity, SerialConfig, StopBits},
    },
    log::debug,
};

/// Open a native serial port with the given configuration.
pub fn open(config: &SerialConfig) -> Result<Box<dyn serialport::SerialPort>> {
    debug!(
        "Opening {} at {} baud ({:?} timeout)",
        config.port_name, config.baud_rate, config.timeout
    );
    let port = serialport::new(&config.port_name, config.baud_rate)
        .timeout(config.timeout)
        .data_bits(
            config
                .data_bits
                .into(),
        )
        .parity(
            config
                .parity
                .into(),
        )
        .stop_bits(
            config
                .stop_bits
                .into(),
        )
        .flow_control(
            config
                .flow_control
                .into(),
        )
        .open()?;
    Ok(port)
}

// Type conversions from our types to serialport types

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Seven => Self::Seven,
            DataBits::Eight => Self::Eight,
        }
    }
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => Self::None,
            Parity::Odd => Self::Odd,
            Parity::Even => Self::Even,
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => Self::One,
            StopBits::Two => Self::Two,
        }
    }
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => Self::None,
            FlowControl::Hardware => Self::Hardware,
            FlowControl::Software => Self::Software,
        }
    }
}
