use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::frame::FrameView;

/// Barcode formats a backend may recognise.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbology {
    Ean13,
    Ean8,
    UpcA,
    UpcE,
    Code39,
    Code93,
    Code128,
    Itf,
    Codabar,
    Qr,
    DataMatrix,
    Pdf417,
    Aztec,
}

impl Symbology {
    pub const ALL: [Symbology; 13] = [
        Symbology::Ean13,
        Symbology::Ean8,
        Symbology::UpcA,
        Symbology::UpcE,
        Symbology::Code39,
        Symbology::Code93,
        Symbology::Code128,
        Symbology::Itf,
        Symbology::Codabar,
        Symbology::Qr,
        Symbology::DataMatrix,
        Symbology::Pdf417,
        Symbology::Aztec,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Symbology::Ean13 => "ean13",
            Symbology::Ean8 => "ean8",
            Symbology::UpcA => "upc_a",
            Symbology::UpcE => "upc_e",
            Symbology::Code39 => "code39",
            Symbology::Code93 => "code93",
            Symbology::Code128 => "code128",
            Symbology::Itf => "itf",
            Symbology::Codabar => "codabar",
            Symbology::Qr => "qr",
            Symbology::DataMatrix => "data_matrix",
            Symbology::Pdf417 => "pdf417",
            Symbology::Aztec => "aztec",
        }
    }
}

impl fmt::Display for Symbology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Symbology {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Symbology::ALL
            .into_iter()
            .find(|sym| sym.as_str() == wanted)
            .ok_or_else(|| anyhow!("unknown barcode format '{}'", s))
    }
}

/// One symbol found in a frame.
///
/// `raw_value` is `None` when the symbol was located but its payload could
/// not be represented as text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol {
    pub symbology: Symbology,
    pub raw_value: Option<String>,
}

impl Symbol {
    pub fn new(symbology: Symbology, raw_value: impl Into<String>) -> Self {
        Self {
            symbology,
            raw_value: Some(raw_value.into()),
        }
    }

    pub fn unreadable(symbology: Symbology) -> Self {
        Self {
            symbology,
            raw_value: None,
        }
    }
}

/// Blocking decoder backend.
///
/// # Contract
///
/// Implementations receive a borrowed `FrameView` and MUST NOT:
/// - Keep pixel data beyond the `decode` call
/// - Block indefinitely (the session waits for each result before trying the next frame)
///
/// Symbols are returned in the order the backend found them. The session
/// takes the first readable one.
pub trait DecoderBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the backend recognises a format.
    fn supports(&self, symbology: Symbology) -> bool;

    /// Decode symbols in a frame.
    fn decode(&mut self, frame: &FrameView<'_>) -> Result<Vec<Symbol>>;

    /// Optional warm-up hook (model loading).
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbology_parses_config_names() {
        assert_eq!("code128".parse::<Symbology>().unwrap(), Symbology::Code128);
        assert_eq!(" QR ".parse::<Symbology>().unwrap(), Symbology::Qr);
        assert_eq!(
            "data_matrix".parse::<Symbology>().unwrap(),
            Symbology::DataMatrix
        );
        assert!("code11".parse::<Symbology>().is_err());
    }

    #[test]
    fn symbology_names_match_serde() {
        for sym in Symbology::ALL {
            let json = serde_json::to_string(&sym).unwrap();
            assert_eq!(json, format!("\"{}\"", sym.as_str()));
        }
    }
}
