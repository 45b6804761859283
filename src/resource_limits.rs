//! Deterministic render cost accounting.
//!
//! Four counters are tracked: assign score, render score, render length
//! and nesting depth. Each has an optional ceiling; the first breach sets
//! a sticky `reached` flag and aborts the render with a memory error (or a
//! stack-level error for depth).

use crate::error::{Error, Result};
use crate::value::Value;

/// Default nesting ceiling for both parsing and rendering.
pub const MAX_DEPTH: usize = 100;

#[derive(Debug, Clone)]
pub struct ResourceLimits {
    pub render_length_limit: Option<usize>,
    pub render_score_limit: Option<usize>,
    pub assign_score_limit: Option<usize>,
    pub depth_limit: Option<usize>,
    render_length: usize,
    render_score: usize,
    assign_score: usize,
    depth: usize,
    max_depth: usize,
    capture_depth: usize,
    reached: bool,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            render_length_limit: None,
            render_score_limit: None,
            assign_score_limit: None,
            depth_limit: Some(MAX_DEPTH),
            render_length: 0,
            render_score: 0,
            assign_score: 0,
            depth: 0,
            max_depth: 0,
            capture_depth: 0,
            reached: false,
        }
    }
}

fn exceeds(value: usize, limit: Option<usize>) -> bool {
    limit.is_some_and(|limit| value > limit)
}

impl ResourceLimits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_render_length_limit(mut self, limit: usize) -> Self {
        self.render_length_limit = Some(limit);
        self
    }

    pub fn with_render_score_limit(mut self, limit: usize) -> Self {
        self.render_score_limit = Some(limit);
        self
    }

    pub fn with_assign_score_limit(mut self, limit: usize) -> Self {
        self.assign_score_limit = Some(limit);
        self
    }

    pub fn render_length(&self) -> usize {
        self.render_length
    }

    pub fn render_score(&self) -> usize {
        self.render_score
    }

    pub fn assign_score(&self) -> usize {
        self.assign_score
    }

    /// Deepest render nesting seen since the last reset.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Whether any ceiling was breached since the last reset.
    pub fn reached(&self) -> bool {
        self.reached
    }

    /// Clear the counters, keeping the configured ceilings.
    pub fn reset(&mut self) {
        self.render_length = 0;
        self.render_score = 0;
        self.assign_score = 0;
        self.depth = 0;
        self.max_depth = 0;
        self.capture_depth = 0;
        self.reached = false;
    }

    fn limit_reached(&mut self) -> Error {
        self.reached = true;
        tracing::warn!(
            render_length = self.render_length,
            render_score = self.render_score,
            assign_score = self.assign_score,
            "resource limits reached"
        );
        Error::memory()
    }

    pub fn increment_render_score(&mut self, amount: usize) -> Result<()> {
        self.render_score += amount;
        if exceeds(self.render_score, self.render_score_limit) {
            return Err(self.limit_reached());
        }
        Ok(())
    }

    /// Fails if `amount` more render score would breach the ceiling,
    /// without charging it. Guards work sized by template data, such as
    /// expanding a range.
    pub fn check_render_score(&self, amount: usize) -> Result<()> {
        if exceeds(self.render_score.saturating_add(amount), self.render_score_limit) {
            return Err(Error::memory());
        }
        Ok(())
    }

    /// Record a breach detected without mutable access to the counters.
    pub(crate) fn mark_reached(&mut self) {
        self.reached = true;
    }

    pub fn increment_assign_score(&mut self, amount: usize) -> Result<()> {
        self.assign_score += amount;
        if exceeds(self.assign_score, self.assign_score_limit) {
            return Err(self.limit_reached());
        }
        Ok(())
    }

    /// Account `bytes` of written output. While capturing, writes count
    /// toward the assign score instead of the render length.
    pub fn increment_write_score(&mut self, bytes: usize) -> Result<()> {
        if self.capture_depth > 0 {
            return self.increment_assign_score(bytes);
        }
        self.render_length += bytes;
        if exceeds(self.render_length, self.render_length_limit) {
            return Err(self.limit_reached());
        }
        Ok(())
    }

    pub(crate) fn begin_capture(&mut self) {
        self.capture_depth += 1;
    }

    pub(crate) fn end_capture(&mut self) {
        self.capture_depth = self.capture_depth.saturating_sub(1);
    }

    pub(crate) fn enter_scope(&mut self) -> Result<()> {
        if exceeds(self.depth + 1, self.depth_limit) {
            return Err(Error::stack_level());
        }
        self.depth += 1;
        self.max_depth = self.max_depth.max(self.depth);
        Ok(())
    }

    pub(crate) fn exit_scope(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

/// Cost of storing `value` in a variable.
///
/// Scalars cost 1, text its UTF-8 byte length, sequences 1 plus their
/// elements and maps 1 plus every key and value.
pub fn assign_score_of(value: &Value) -> usize {
    match value {
        Value::Str(s) => s.len(),
        Value::Array(items) => 1 + items.iter().map(assign_score_of).sum::<usize>(),
        Value::Object(map) => {
            1 + map
                .iter()
                .map(|(key, value)| key.len() + assign_score_of(value))
                .sum::<usize>()
        }
        _ => 1,
    }
}
