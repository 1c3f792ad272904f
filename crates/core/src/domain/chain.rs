//! Effect chains and the edit session
//!
//! The session keeps the cumulative editing model: every new effect is
//! rendered on top of the current result. Alongside the current buffer it
//! records the ordered chain of requests that produced it, so the result can
//! always be rebuilt from the original with [`replay`]. Undo and redo are
//! built on that.

use crate::domain::audio::{AudioError, PcmBuffer, Result};
use crate::domain::effects::{EffectRequest, VolumeParams};
use crate::domain::render::{CancelToken, RenderEngine};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Ordered list of effect requests, applied first to last
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectChain {
    #[serde(default)]
    effects: Vec<EffectRequest>,
}

impl EffectChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request to the end of the chain
    pub fn push(&mut self, request: EffectRequest) {
        self.effects.push(request);
    }

    pub fn pop(&mut self) -> Option<EffectRequest> {
        self.effects.pop()
    }

    /// Remove a request by index
    pub fn remove(&mut self, index: usize) -> Result<EffectRequest> {
        if index < self.effects.len() {
            Ok(self.effects.remove(index))
        } else {
            Err(AudioError::InvalidParameter(format!(
                "effect index {} out of bounds ({} effects)",
                index,
                self.effects.len()
            )))
        }
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn effects(&self) -> &[EffectRequest] {
        &self.effects
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EffectRequest> {
        self.effects.iter()
    }

    pub fn clear(&mut self) {
        self.effects.clear();
    }

    /// Validate every request in order
    pub fn validate(&self) -> Result<()> {
        self.effects.iter().try_for_each(EffectRequest::validate)
    }

    /// Copy of the chain where every unseeded reverb has a fixed seed
    pub fn seeded(&self) -> Self {
        self.effects.iter().cloned().map(seed_reverb).collect()
    }
}

impl FromIterator<EffectRequest> for EffectChain {
    fn from_iter<I: IntoIterator<Item = EffectRequest>>(iter: I) -> Self {
        Self {
            effects: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a EffectChain {
    type Item = &'a EffectRequest;
    type IntoIter = std::slice::Iter<'a, EffectRequest>;

    fn into_iter(self) -> Self::IntoIter {
        self.effects.iter()
    }
}

fn seed_reverb(request: EffectRequest) -> EffectRequest {
    let unseeded = matches!(&request, EffectRequest::Reverb(p) if p.seed.is_none());
    if unseeded {
        request.with_seed(rand::random())
    } else {
        request
    }
}

/// Render `chain` over `original` from scratch
///
/// Volume requests are playback state and are skipped. An empty chain or
/// an empty original returns a copy of the original.
pub fn replay(engine: &RenderEngine, original: &PcmBuffer, chain: &EffectChain) -> Result<PcmBuffer> {
    replay_with_cancel(engine, original, chain, &CancelToken::new())
}

pub fn replay_with_cancel(
    engine: &RenderEngine,
    original: &PcmBuffer,
    chain: &EffectChain,
    cancel: &CancelToken,
) -> Result<PcmBuffer> {
    let mut buffer = original.clone();
    if original.is_empty() {
        debug!(effects = chain.len(), "empty buffer, nothing to replay");
        return Ok(buffer);
    }
    for request in chain.iter().filter(|r| r.kind().is_buffer_transform()) {
        buffer = engine.render_with_cancel(&buffer, request, cancel)?;
    }
    Ok(buffer)
}

/// One loaded recording and the edits applied to it
#[derive(Debug, Clone)]
pub struct EditSession {
    engine: RenderEngine,
    original: PcmBuffer,
    current: PcmBuffer,
    chain: EffectChain,
    redo: Vec<EffectRequest>,
    volume: f32,
}

impl EditSession {
    pub fn new(engine: RenderEngine, original: PcmBuffer) -> Self {
        Self {
            engine,
            current: original.clone(),
            original,
            chain: EffectChain::new(),
            redo: Vec::new(),
            volume: 1.0,
        }
    }

    pub fn engine(&self) -> &RenderEngine {
        &self.engine
    }

    pub fn original(&self) -> &PcmBuffer {
        &self.original
    }

    pub fn current(&self) -> &PcmBuffer {
        &self.current
    }

    /// Requests that produced `current()` from `original()`
    pub fn chain(&self) -> &EffectChain {
        &self.chain
    }

    /// Live playback gain; never baked into the buffer
    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, gain: f32) -> Result<()> {
        EffectRequest::Volume(VolumeParams { gain }).validate()?;
        self.volume = gain;
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        !self.chain.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Render `request` on top of the current buffer
    ///
    /// Returns `Ok(false)` when there was nothing to process. On any error
    /// the current buffer and chain are left as they were.
    pub fn apply(&mut self, request: EffectRequest) -> Result<bool> {
        self.apply_with_cancel(request, &CancelToken::new())
    }

    pub fn apply_with_cancel(&mut self, request: EffectRequest, cancel: &CancelToken) -> Result<bool> {
        if let EffectRequest::Volume(p) = request {
            self.set_volume(p.gain)?;
            return Ok(true);
        }

        let request = seed_reverb(request);
        match self.engine.render_with_cancel(&self.current, &request, cancel) {
            Ok(rendered) => {
                info!(effect = %request, length = rendered.len(), "effect applied");
                self.current = rendered;
                self.chain.push(request);
                self.redo.clear();
                Ok(true)
            }
            Err(e) if e.is_no_op() => {
                debug!(effect = %request, "empty buffer, nothing to apply");
                Ok(false)
            }
            Err(e) => {
                warn!(effect = %request, error = %e, "effect failed, keeping previous buffer");
                Err(e)
            }
        }
    }

    /// Drop the last applied effect and rebuild the current buffer
    pub fn undo(&mut self) -> Result<bool> {
        let Some(last) = self.chain.pop() else {
            return Ok(false);
        };
        match replay(&self.engine, &self.original, &self.chain) {
            Ok(rebuilt) => {
                debug!(effect = %last, "undone");
                self.current = rebuilt;
                self.redo.push(last);
                Ok(true)
            }
            Err(e) => {
                self.chain.push(last);
                Err(e)
            }
        }
    }

    /// Re-apply the most recently undone effect
    pub fn redo(&mut self) -> Result<bool> {
        let Some(next) = self.redo.pop() else {
            return Ok(false);
        };
        match self.engine.render(&self.current, &next) {
            Ok(rendered) => {
                debug!(effect = %next, "redone");
                self.current = rendered;
                self.chain.push(next);
                Ok(true)
            }
            Err(e) => {
                self.redo.push(next);
                Err(e)
            }
        }
    }

    /// Discard every effect and return to the original recording
    pub fn reset(&mut self) {
        info!(dropped = self.chain.len(), "effects reset");
        self.current = self.original.clone();
        self.chain.clear();
        self.redo.clear();
    }

    /// Replace the applied effects with `chain`, rendered from the original
    ///
    /// The last volume request in the chain, if any, becomes the playback
    /// gain.
    pub fn load_chain(&mut self, chain: &EffectChain) -> Result<()> {
        chain.validate()?;
        let chain = chain.seeded();
        let rendered = replay(&self.engine, &self.original, &chain)?;
        let volume = chain.iter().rev().find_map(|request| match request {
            EffectRequest::Volume(p) => Some(p.gain),
            _ => None,
        });

        self.current = rendered;
        if let Some(gain) = volume {
            self.volume = gain;
        }
        self.chain = chain;
        self.redo.clear();
        Ok(())
    }
}
