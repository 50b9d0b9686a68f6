use thiserror::Error;

use crate::modbus::protocol::ExceptionCode;

#[derive(Error, Debug)]
pub enum ModbusError {
    #[error("Timeout occurred")]
    Timeout,

    #[error("CRC checksum mismatch")]
    CrcMismatch,

    #[error("Response from unexpected address: expected {expected}, got {actual}")]
    InvalidAddress { expected: u8, actual: u8 },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Slave reported exception for function 0x{function:02X}: {exception}")]
    SlaveFailure { function: u8, exception: ExceptionCode },

    #[error("Communication error: {0}")]
    CommunicationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ModbusError {
    /// Exception code carried by a `SlaveFailure`, if any.
    pub fn exception_code(&self) -> Option<ExceptionCode> {
        match self {
            ModbusError::SlaveFailure { exception, .. } => Some(*exception),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        ModbusError::CommunicationError(format!("IO error: {}", err))
    }
}

impl From<serialport::Error> for ModbusError {
    fn from(err: serialport::Error) -> Self {
        ModbusError::CommunicationError(format!("Serial port error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slave_failure_exposes_exception_code() {
        let err = ModbusError::SlaveFailure {
            function: 0x03,
            exception: ExceptionCode::IllegalDataAddress,
        };
        assert_eq!(err.exception_code(), Some(ExceptionCode::IllegalDataAddress));
        assert_eq!(ModbusError::Timeout.exception_code(), None);
    }

    #[test]
    fn io_errors_become_communication_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "line dropped");
        assert!(matches!(ModbusError::from(io), ModbusError::CommunicationError(_)));
    }
}
