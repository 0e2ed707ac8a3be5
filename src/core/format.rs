//! Serial byte format
//!
//! Parses the three-character format triple (`8N1`, `7E2`, ...) and maps it
//! onto the `serialport` crate's settings.

use std::fmt;
use std::str::FromStr;

use serialport::{DataBits, Parity as SpParity, StopBits};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FormatError {
    #[error("format \"{0}\" must have exactly three characters (e.g. 8N1)")]
    Length(String),

    #[error("invalid data bits '{0}' in format (expected 5, 6, 7 or 8)")]
    DataBits(char),

    #[error("invalid parity '{0}' in format (expected N, E or O)")]
    Parity(char),

    #[error("invalid stop bits '{0}' in format (expected 1 or 2)")]
    StopBits(char),
}

/// Parity scheme
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Data bits, parity and stop bits of the serial link
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SerialFormat {
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
}

impl Default for SerialFormat {
    fn default() -> Self {
        Self {
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
        }
    }
}

impl FromStr for SerialFormat {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let chars: Vec<char> = s.chars().collect();
        let [bits, parity, stop] = chars[..] else {
            return Err(FormatError::Length(s.to_string()));
        };

        let data_bits = match bits {
            '5' => 5,
            '6' => 6,
            '7' => 7,
            '8' => 8,
            other => return Err(FormatError::DataBits(other)),
        };
        let parity = match parity {
            'N' => Parity::None,
            'E' => Parity::Even,
            'O' => Parity::Odd,
            other => return Err(FormatError::Parity(other)),
        };
        let stop_bits = match stop {
            '1' => 1,
            '2' => 2,
            other => return Err(FormatError::StopBits(other)),
        };

        Ok(Self {
            data_bits,
            parity,
            stop_bits,
        })
    }
}

impl fmt::Display for SerialFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Even => 'E',
            Parity::Odd => 'O',
        };
        write!(f, "{}{}{}", self.data_bits, parity, self.stop_bits)
    }
}

impl SerialFormat {
    pub fn serialport_data_bits(&self) -> DataBits {
        match self.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        }
    }

    pub fn serialport_parity(&self) -> SpParity {
        match self.parity {
            Parity::None => SpParity::None,
            Parity::Even => SpParity::Even,
            Parity::Odd => SpParity::Odd,
        }
    }

    pub fn serialport_stop_bits(&self) -> StopBits {
        match self.stop_bits {
            2 => StopBits::Two,
            _ => StopBits::One,
        }
    }
}
