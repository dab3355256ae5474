//! Board-level setup run before the serial port is opened
//!
//! On a BeagleBone the cape UART pins must be switched to UART mode with
//! `config-pin` before the device node works.

use std::process::ExitStatus;
use thiserror::Error;
use tokio::process::Command;
use tracing::info;

/// Pin configuration tool shipped with BeagleBone images
pub const CONFIG_PIN_COMMAND: &str = "config-pin";

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("failed to run `{command} {pin} uart`")]
    Spawn {
        command: String,
        pin: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command} {pin} uart` exited with {status}")]
    CommandFailed {
        command: String,
        pin: String,
        status: ExitStatus,
    },
}

/// Switch every pin to UART mode, in order, stopping at the first failure
pub async fn configure_uart_pins(pins: &[String]) -> Result<(), PlatformError> {
    configure_uart_pins_with(CONFIG_PIN_COMMAND, pins).await
}

/// Same as [`configure_uart_pins`] with an explicit pin tool
pub async fn configure_uart_pins_with(command: &str, pins: &[String]) -> Result<(), PlatformError> {
    if pins.is_empty() {
        return Ok(());
    }

    info!(count = pins.len(), "Setting up UART pins");
    for pin in pins {
        info!("running: {} {} uart", command, pin);
        let status = Command::new(command)
            .arg(pin)
            .arg("uart")
            .status()
            .await
            .map_err(|source| PlatformError::Spawn {
                command: command.to_string(),
                pin: pin.clone(),
                source,
            })?;

        if !status.success() {
            return Err(PlatformError::CommandFailed {
                command: command.to_string(),
                pin: pin.clone(),
                status,
            });
        }
    }
    Ok(())
}
