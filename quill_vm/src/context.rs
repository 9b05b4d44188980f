//! The scope-frame stack.
//!
//! Frames are strictly LIFO. Each records the operand-stack depth at
//! entry so popping truncates the stack in O(1), and whether it is a call
//! boundary. Name lookup walks innermost-to-outermost and stops at the
//! first call boundary; only the pre-seeded bottom frame (built-ins and
//! initial bindings) is visible beyond it.

use crate::value::ValueRef;
use rustc_hash::FxHashMap;

/// One nested scope.
#[derive(Debug)]
pub struct Frame {
    bindings: FxHashMap<String, ValueRef>,
    /// Opened by a function call; `RETURN` unwinds through plain frames
    /// up to and including this one.
    pub is_call: bool,
    /// Source offset of the call instruction, for the failure trace.
    pub call_site: Option<u32>,
    /// Excluded from the failure trace (the seeded bottom frame).
    pub hidden: bool,
    /// Operand-stack depth recorded at entry.
    pub stack_depth: usize,
}

/// The frame stack.
#[derive(Debug, Default)]
pub struct Context {
    frames: Vec<Frame>,
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_frame(&mut self, is_call: bool, call_site: Option<u32>, stack_depth: usize) {
        self.frames.push(Frame {
            bindings: FxHashMap::default(),
            is_call,
            call_site,
            hidden: false,
            stack_depth,
        });
    }

    /// Push the pre-seeded bottom frame. It is a call boundary (so
    /// lookups inside `__main__` terminate here) but never traced.
    pub fn push_root_frame(&mut self) {
        self.frames.push(Frame {
            bindings: FxHashMap::default(),
            is_call: true,
            call_site: None,
            hidden: true,
            stack_depth: 0,
        });
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Bind `name` in the innermost frame, shadowing any outer binding.
    pub fn declare(&mut self, name: impl Into<String>, cell: ValueRef) {
        if let Some(frame) = self.frames.last_mut() {
            frame.bindings.insert(name.into(), cell);
        }
    }

    /// Look a name up: innermost frame out to the nearest call boundary
    /// (inclusive), then the bottom frame as the only fallback.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<ValueRef> {
        for (i, frame) in self.frames.iter().enumerate().rev() {
            if let Some(cell) = frame.bindings.get(name) {
                return Some(cell.clone());
            }
            if frame.is_call {
                if i == 0 {
                    return None;
                }
                return self
                    .frames
                    .first()
                    .and_then(|root| root.bindings.get(name))
                    .cloned();
            }
        }
        None
    }

    /// Operand-stack depth recorded by the innermost frame, the target
    /// of `RESET_STACK`.
    #[must_use]
    pub fn reset_depth(&self) -> usize {
        self.frames.last().map_or(0, |f| f.stack_depth)
    }

    /// Pop the innermost frame (a plain block), returning it so the
    /// caller can restore the operand stack.
    pub fn pop_frame(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// Pop frames until a call boundary has been popped, returning it.
    /// The bottom frame is never popped.
    pub fn unwind_to_call(&mut self) -> Option<Frame> {
        while self.frames.len() > 1 {
            let frame = self.frames.pop()?;
            if frame.is_call {
                return Some(frame);
            }
        }
        None
    }

    /// Call-site offsets of the open, visible call frames, outermost
    /// first. Used to render the failure trace.
    #[must_use]
    pub fn call_sites(&self) -> Vec<u32> {
        self.frames
            .iter()
            .filter(|f| f.is_call && !f.hidden)
            .filter_map(|f| f.call_site)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{cell, Value};

    fn int(v: i64) -> ValueRef {
        cell(Value::Int(v))
    }

    #[test]
    fn test_shadowing() {
        let mut ctx = Context::new();
        ctx.push_root_frame();
        ctx.declare("x", int(1));
        ctx.push_frame(false, None, 0);
        ctx.declare("x", int(2));
        assert_eq!(*ctx.lookup("x").unwrap().borrow(), Value::Int(2));
        ctx.pop_frame();
        assert_eq!(*ctx.lookup("x").unwrap().borrow(), Value::Int(1));
    }

    #[test]
    fn test_lookup_stops_at_call_boundary() {
        let mut ctx = Context::new();
        ctx.push_root_frame();
        ctx.declare("global", int(0));
        ctx.push_frame(true, Some(1), 0);
        ctx.declare("local", int(1));
        ctx.push_frame(true, Some(2), 0);
        // The intermediate call frame's binding is invisible here.
        assert!(ctx.lookup("local").is_none());
        // The bottom frame stays visible everywhere.
        assert_eq!(*ctx.lookup("global").unwrap().borrow(), Value::Int(0));
    }

    #[test]
    fn test_unwind_pops_through_plain_frames() {
        let mut ctx = Context::new();
        ctx.push_root_frame();
        ctx.push_frame(true, Some(5), 3);
        ctx.push_frame(false, None, 4);
        ctx.push_frame(false, None, 5);
        let call = ctx.unwind_to_call().unwrap();
        assert_eq!(call.stack_depth, 3);
        assert_eq!(ctx.depth(), 1);
    }

    #[test]
    fn test_unwind_never_pops_root() {
        let mut ctx = Context::new();
        ctx.push_root_frame();
        assert!(ctx.unwind_to_call().is_none());
        assert_eq!(ctx.depth(), 1);
    }

    #[test]
    fn test_call_sites_skip_hidden() {
        let mut ctx = Context::new();
        ctx.push_root_frame();
        ctx.push_frame(true, Some(10), 0);
        ctx.push_frame(false, None, 0);
        ctx.push_frame(true, Some(20), 0);
        assert_eq!(ctx.call_sites(), vec![10, 20]);
    }
}
