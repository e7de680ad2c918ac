use std::{error::Error, fmt::Display, io};

/// Why a terminal screen could not be shown.
#[derive(Debug)]
pub enum GuiError {
    /// Drawing to or reading from the terminal failed
    IoError(io::Error),
    /// There is nothing to choose from
    NothingToSelect,
}

impl Display for GuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuiError::IoError(error) => write!(f, "terminal error: {error}"),
            GuiError::NothingToSelect => write!(f, "no serial ports found"),
        }
    }
}

impl Error for GuiError {}

impl From<io::Error> for GuiError {
    fn from(value: io::Error) -> Self {
        Self::IoError(value)
    }
}
