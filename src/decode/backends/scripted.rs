use anyhow::Result;
use std::collections::VecDeque;

use crate::decode::backend::{DecoderBackend, Symbol, Symbology};
use crate::frame::FrameView;

/// Replays a fixed sequence of results, one per decoded frame.
///
/// Once the script is exhausted every frame decodes empty.
pub struct ScriptedBackend {
    script: VecDeque<Result<Vec<Symbol>>>,
    calls: u64,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Result<Vec<Symbol>>>) -> Self {
        Self {
            script: script.into(),
            calls: 0,
        }
    }

    /// `n` empty results followed by one value.
    pub fn value_after(n: usize, symbology: Symbology, value: &str) -> Self {
        let mut script: Vec<Result<Vec<Symbol>>> = (0..n).map(|_| Ok(Vec::new())).collect();
        script.push(Ok(vec![Symbol::new(symbology, value)]));
        Self::new(script)
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DecoderBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn supports(&self, _symbology: Symbology) -> bool {
        true
    }

    fn decode(&mut self, _frame: &FrameView<'_>) -> Result<Vec<Symbol>> {
        self.calls += 1;
        self.script.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, Rotation};
    use anyhow::anyhow;

    #[test]
    fn replays_script_then_decodes_empty() {
        let frame = Frame::new(vec![], 0, 0, Rotation::Deg0, 1);
        let mut backend = ScriptedBackend::new(vec![
            Err(anyhow!("out of focus")),
            Ok(vec![Symbol::new(Symbology::Code128, "X")]),
        ]);

        assert!(backend.decode(&frame.view()).is_err());
        assert_eq!(backend.decode(&frame.view()).unwrap().len(), 1);
        assert_eq!(backend.remaining(), 0);
        assert!(backend.decode(&frame.view()).unwrap().is_empty());
        assert_eq!(backend.calls(), 3);
    }

    #[test]
    fn value_after_pads_with_empty_results() {
        let frame = Frame::new(vec![], 0, 0, Rotation::Deg0, 1);
        let mut backend = ScriptedBackend::value_after(2, Symbology::Qr, "LATE");

        assert!(backend.decode(&frame.view()).unwrap().is_empty());
        assert!(backend.decode(&frame.view()).unwrap().is_empty());
        let symbols = backend.decode(&frame.view()).unwrap();
        assert_eq!(symbols[0].raw_value.as_deref(), Some("LATE"));
    }
}
