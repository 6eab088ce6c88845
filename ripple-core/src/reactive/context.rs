//! Effect Stack
//!
//! The effect stack records which computation is currently running. This
//! enables automatic dependency tracking: when an observed field is read,
//! the effect on top of the stack is subscribed to it.
//!
//! # Implementation
//!
//! Each [`Runtime`](super::Runtime) owns one stack. Running an effect pushes a
//! frame and the returned [`StackScope`] guard pops it again, so the stack
//! stays balanced even when an effect body panics. Nested runs therefore
//! restore the outer effect as soon as the inner one finishes.
//!
//! Besides effect frames there are untracked frames, pushed by
//! [`Runtime::untracked`](super::Runtime::untracked). An untracked frame on
//! top suppresses tracking but does not hide the enclosing effect from the
//! self-trigger check.

use std::sync::Arc;

use parking_lot::Mutex;

use super::ids::EffectId;
use super::runtime::Reactive;

/// One entry on the effect stack.
pub(crate) enum Frame {
    /// A running effect; reads subscribe it.
    Effect(Arc<dyn Reactive>),
    /// Tracking is paused until this frame is popped.
    Untracked,
}

impl Frame {
    fn effect_id(&self) -> Option<EffectId> {
        match self {
            Frame::Effect(effect) => Some(effect.effect_id()),
            Frame::Untracked => None,
        }
    }
}

/// The ordered frames of currently executing effects.
#[derive(Default)]
pub(crate) struct EffectStack {
    frames: Vec<Frame>,
}

impl EffectStack {
    pub(crate) fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub(crate) fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// The effect new reads should subscribe, if any.
    pub(crate) fn tracking(&self) -> Option<Arc<dyn Reactive>> {
        match self.frames.last() {
            Some(Frame::Effect(effect)) => Some(Arc::clone(effect)),
            _ => None,
        }
    }

    /// The innermost running effect, looking through untracked frames.
    pub(crate) fn running(&self) -> Option<EffectId> {
        self.frames.iter().rev().find_map(Frame::effect_id)
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }
}

/// Guard that pops its frame when dropped.
pub(crate) struct StackScope<'a> {
    stack: &'a Mutex<EffectStack>,
    effect: Option<EffectId>,
}

impl<'a> StackScope<'a> {
    pub(crate) fn enter(stack: &'a Mutex<EffectStack>, frame: Frame) -> Self {
        let effect = frame.effect_id();
        stack.lock().push(frame);
        Self { stack, effect }
    }
}

impl Drop for StackScope<'_> {
    fn drop(&mut self) {
        let popped = self.stack.lock().pop();

        // Catch scopes released out of order.
        debug_assert_eq!(
            popped.as_ref().and_then(Frame::effect_id),
            self.effect,
            "effect stack mismatch"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::reactive::ids::DepKey;

    struct MockReactive {
        id: EffectId,
    }

    impl Reactive for MockReactive {
        fn effect_id(&self) -> EffectId {
            self.id
        }

        fn is_active(&self) -> bool {
            true
        }

        fn trigger(&self) -> Result<()> {
            Ok(())
        }

        fn execute(&self) -> Result<()> {
            Ok(())
        }

        fn record_dependency(&self, _key: DepKey) {}
    }

    fn mock() -> Arc<dyn Reactive> {
        Arc::new(MockReactive { id: EffectId::new() })
    }

    #[test]
    fn scope_tracks_effect() {
        let stack = Mutex::new(EffectStack::default());
        let effect = mock();
        let id = effect.effect_id();

        assert!(stack.lock().tracking().is_none());

        {
            let _scope = StackScope::enter(&stack, Frame::Effect(effect));
            assert_eq!(stack.lock().running(), Some(id));
            assert!(stack.lock().tracking().is_some());
        }

        // Frame should be gone after drop
        assert_eq!(stack.lock().depth(), 0);
        assert!(stack.lock().running().is_none());
    }

    #[test]
    fn nested_scopes_restore_outer() {
        let stack = Mutex::new(EffectStack::default());
        let outer = mock();
        let inner = mock();
        let outer_id = outer.effect_id();
        let inner_id = inner.effect_id();

        {
            let _outer = StackScope::enter(&stack, Frame::Effect(outer));
            assert_eq!(stack.lock().running(), Some(outer_id));

            {
                let _inner = StackScope::enter(&stack, Frame::Effect(inner));
                assert_eq!(stack.lock().running(), Some(inner_id));
            }

            assert_eq!(stack.lock().running(), Some(outer_id));
        }

        assert!(stack.lock().running().is_none());
    }

    #[test]
    fn untracked_frame_pauses_tracking_only() {
        let stack = Mutex::new(EffectStack::default());
        let effect = mock();
        let id = effect.effect_id();

        let _outer = StackScope::enter(&stack, Frame::Effect(effect));
        let _paused = StackScope::enter(&stack, Frame::Untracked);

        assert!(stack.lock().tracking().is_none());
        assert_eq!(stack.lock().running(), Some(id));
        assert_eq!(stack.lock().depth(), 2);
    }

    #[test]
    fn scope_pops_during_unwind() {
        let stack = Mutex::new(EffectStack::default());

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = StackScope::enter(&stack, Frame::Effect(mock()));
            panic!("body failed");
        }));

        assert!(result.is_err());
        assert_eq!(stack.lock().depth(), 0);
    }
}
