use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("valve {0} did not respond")]
    Valve(&'static str),
    #[error("pressure sensor fault: {0}")]
    SensorFault(String),
    #[error("pressure sensor timeout")]
    SensorTimeout,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
