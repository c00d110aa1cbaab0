//! Scoped binding and explicit teardown.
//!
//! A [`Binder`] binds a [`Target`] when created and unbinds it when dropped,
//! so the unbind runs on every exit path. [`FlagGuard`] does the same for a
//! context capability flag, restoring whatever value it had before.
//!
//! Teardown is never implicit. Hardware objects are released only through
//! [`Destroyable::destroy`], because drop order is not a good place to call
//! into the graphics API.

use tracing::trace;

use crate::context::GpuContext;

/// Something that can be made current on the context.
pub trait Target {
    fn bind(&self);
    fn unbind(&self);
}

/// Explicit hardware teardown. Calling `destroy` twice is a no-op.
pub trait Destroyable {
    fn destroy(&mut self);
}

/// Keeps a target bound for its own lifetime.
#[must_use = "the target is unbound as soon as the binder is dropped"]
pub struct Binder<'a, T: Target + ?Sized> {
    target: &'a T,
}

impl<'a, T: Target + ?Sized> Binder<'a, T> {
    pub fn new(target: &'a T) -> Self {
        target.bind();
        Self { target }
    }
}

impl<T: Target + ?Sized> Drop for Binder<'_, T> {
    fn drop(&mut self) {
        self.target.unbind();
    }
}

/// Context capability flags the engine does not own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    DepthTest,
    Blend,
}

/// Forces a capability flag for a scope and restores the previous value.
#[must_use = "the flag is restored as soon as the guard is dropped"]
pub struct FlagGuard<'a> {
    ctx: &'a GpuContext,
    capability: Capability,
    previous: bool,
}

impl<'a> FlagGuard<'a> {
    pub fn new(ctx: &'a GpuContext, capability: Capability, value: bool) -> Self {
        let previous = ctx.is_enabled(capability);
        if previous != value {
            trace!(?capability, value, "force flag");
            ctx.set_capability(capability, value);
        }
        Self { ctx, capability, previous }
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        if self.ctx.is_enabled(self.capability) != self.previous {
            self.ctx.set_capability(self.capability, self.previous);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Recorder {
        log: RefCell<Vec<&'static str>>,
    }

    impl Target for Recorder {
        fn bind(&self) {
            self.log.borrow_mut().push("bind");
        }
        fn unbind(&self) {
            self.log.borrow_mut().push("unbind");
        }
    }

    fn scoped(target: &Recorder, early: bool) -> Option<()> {
        let _b = Binder::new(target);
        if early {
            return None;
        }
        target.log.borrow_mut().push("work");
        Some(())
    }

    #[test]
    fn test_binder_unbinds_on_every_path() {
        let target = Recorder { log: RefCell::new(Vec::new()) };
        scoped(&target, false);
        scoped(&target, true);
        assert_eq!(
            *target.log.borrow(),
            ["bind", "work", "unbind", "bind", "unbind"]
        );
    }

    #[test]
    fn test_binder_unbinds_on_panic() {
        let target = Recorder { log: RefCell::new(Vec::new()) };
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _b = Binder::new(&target);
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(*target.log.borrow(), ["bind", "unbind"]);
    }

    #[test]
    fn test_nested_binders_unwind_in_reverse() {
        let outer = Recorder { log: RefCell::new(Vec::new()) };
        let inner = Recorder { log: RefCell::new(Vec::new()) };
        {
            let _a = Binder::new(&outer);
            let _b = Binder::new(&inner);
            assert_eq!(*inner.log.borrow(), ["bind"]);
        }
        assert_eq!(*outer.log.borrow(), ["bind", "unbind"]);
        assert_eq!(*inner.log.borrow(), ["bind", "unbind"]);
    }
}
