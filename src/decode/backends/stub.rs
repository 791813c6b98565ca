//! Stub backend for synthetic frames.
//!
//! Synthetic cameras stamp a small marker at the start of the pixel buffer
//! describing the symbols "visible" in the frame:
//!
//! ```text
//! MAGIC (8 bytes) | count (u8) | { symbology (u8) | len (u16 LE) | utf-8 payload }*
//! ```
//!
//! A frame without the magic contains no symbols. A frame with the magic but
//! a truncated or malformed body is a decode failure.

use anyhow::{anyhow, Result};
use std::collections::HashSet;

use crate::decode::backend::{DecoderBackend, Symbol, Symbology};
use crate::frame::FrameView;

pub const MARKER_MAGIC: &[u8; 8] = b"SCANSYM1";

/// Upper bound on symbols stamped into one frame.
pub const MAX_MARKER_SYMBOLS: usize = 16;

/// Stamp `symbols` into the start of `pixels`.
pub fn write_marker(pixels: &mut [u8], symbols: &[(Symbology, &str)]) -> Result<()> {
    if symbols.len() > MAX_MARKER_SYMBOLS {
        return Err(anyhow!(
            "at most {} symbols fit in one marker",
            MAX_MARKER_SYMBOLS
        ));
    }
    let mut marker = Vec::with_capacity(64);
    marker.extend_from_slice(MARKER_MAGIC);
    marker.push(symbols.len() as u8);
    for (symbology, value) in symbols {
        let len = u16::try_from(value.len())
            .map_err(|_| anyhow!("symbol payload too long ({} bytes)", value.len()))?;
        marker.push(symbology_index(*symbology));
        marker.extend_from_slice(&len.to_le_bytes());
        marker.extend_from_slice(value.as_bytes());
    }
    if marker.len() > pixels.len() {
        return Err(anyhow!(
            "frame too small for marker ({} < {} bytes)",
            pixels.len(),
            marker.len()
        ));
    }
    pixels[..marker.len()].copy_from_slice(&marker);
    Ok(())
}

/// Read the marker from a pixel buffer. `Ok(None)` when no marker is present.
pub fn read_marker(pixels: &[u8]) -> Result<Option<Vec<Symbol>>> {
    let Some(body) = pixels.strip_prefix(MARKER_MAGIC.as_slice()) else {
        return Ok(None);
    };
    let (&count, mut rest) = body
        .split_first()
        .ok_or_else(|| anyhow!("marker truncated before symbol count"))?;
    let mut symbols = Vec::with_capacity(count as usize);
    for i in 0..count {
        if rest.len() < 3 {
            return Err(anyhow!("marker truncated in symbol {}", i));
        }
        let symbology = symbology_from_index(rest[0])?;
        let len = u16::from_le_bytes([rest[1], rest[2]]) as usize;
        rest = &rest[3..];
        if rest.len() < len {
            return Err(anyhow!("marker payload truncated in symbol {}", i));
        }
        let raw_value = std::str::from_utf8(&rest[..len]).ok().map(str::to_string);
        symbols.push(Symbol {
            symbology,
            raw_value,
        });
        rest = &rest[len..];
    }
    Ok(Some(symbols))
}

fn symbology_index(symbology: Symbology) -> u8 {
    Symbology::ALL
        .iter()
        .position(|s| *s == symbology)
        .unwrap_or(0) as u8
}

fn symbology_from_index(index: u8) -> Result<Symbology> {
    Symbology::ALL
        .get(index as usize)
        .copied()
        .ok_or_else(|| anyhow!("unknown symbology index {}", index))
}

/// Stub backend for testing. Reads markers stamped by synthetic cameras.
pub struct StubBackend {
    formats: HashSet<Symbology>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            formats: Symbology::ALL.into_iter().collect(),
        }
    }

    /// Restrict recognised formats. Symbols of other formats are ignored.
    pub fn with_formats(formats: impl IntoIterator<Item = Symbology>) -> Self {
        Self {
            formats: formats.into_iter().collect(),
        }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DecoderBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn supports(&self, symbology: Symbology) -> bool {
        self.formats.contains(&symbology)
    }

    fn decode(&mut self, frame: &FrameView<'_>) -> Result<Vec<Symbol>> {
        let symbols = read_marker(frame.pixels())?.unwrap_or_default();
        Ok(symbols
            .into_iter()
            .filter(|symbol| self.formats.contains(&symbol.symbology))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, Rotation};

    fn frame_with(symbols: &[(Symbology, &str)]) -> Frame {
        let mut pixels = vec![0x80u8; 256];
        write_marker(&mut pixels, symbols).unwrap();
        Frame::new(pixels, 16, 16, Rotation::Deg0, 1)
    }

    #[test]
    fn stub_backend_reads_marker_in_order() {
        let frame = frame_with(&[(Symbology::Code128, "PAT-1"), (Symbology::Qr, "PAT-2")]);
        let mut backend = StubBackend::new();

        let symbols = backend.decode(&frame.view()).unwrap();
        assert_eq!(
            symbols,
            vec![
                Symbol::new(Symbology::Code128, "PAT-1"),
                Symbol::new(Symbology::Qr, "PAT-2"),
            ]
        );
    }

    #[test]
    fn plain_frames_have_no_symbols() {
        let frame = Frame::new(vec![0x10u8; 256], 16, 16, Rotation::Deg0, 1);
        let mut backend = StubBackend::new();
        assert!(backend.decode(&frame.view()).unwrap().is_empty());
    }

    #[test]
    fn truncated_marker_is_an_error() {
        let mut pixels = MARKER_MAGIC.to_vec();
        pixels.extend_from_slice(&[1, 6, 10, 0, b'A']);
        let frame = Frame::new(pixels, 1, 1, Rotation::Deg0, 1);
        let mut backend = StubBackend::new();
        assert!(backend.decode(&frame.view()).is_err());
    }

    #[test]
    fn unsupported_formats_are_filtered() {
        let frame = frame_with(&[(Symbology::Qr, "QR-ONLY"), (Symbology::Ean13, "4006381333931")]);
        let mut backend = StubBackend::with_formats([Symbology::Ean13]);

        assert!(!backend.supports(Symbology::Qr));
        let symbols = backend.decode(&frame.view()).unwrap();
        assert_eq!(symbols, vec![Symbol::new(Symbology::Ean13, "4006381333931")]);
    }

    #[test]
    fn marker_must_fit_in_frame() {
        let mut pixels = vec![0u8; 10];
        assert!(write_marker(&mut pixels, &[(Symbology::Qr, "TOO-LONG")]).is_err());
    }
}
