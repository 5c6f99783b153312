//! Owning wrapper for engine value references
//!
//! Every engine value stored in a task, timer or listener record is held
//! as a [`ScriptHandle`]: acquired when stored, released exactly once when
//! dropped. Duplicating a reference is always an explicit `clone`; there
//! is no way to copy a handle without taking a new count.

use std::fmt;

use super::{EngineRef, RawScriptValue};

/// An owned reference to an engine value.
pub struct ScriptHandle {
    engine: EngineRef,
    raw: RawScriptValue,
}

impl ScriptHandle {
    /// Take a new reference to `raw` and own it.
    pub fn acquire(engine: &EngineRef, raw: RawScriptValue) -> Self {
        engine.acquire(raw);
        Self {
            engine: engine.clone(),
            raw,
        }
    }

    /// Own a reference the engine has already counted for the host
    /// (values returned by `call`, `compile`, `promise_result`,
    /// rejection notices).
    pub fn adopt(engine: &EngineRef, raw: RawScriptValue) -> Self {
        Self {
            engine: engine.clone(),
            raw,
        }
    }

    /// The underlying id. Valid only while this handle (or another
    /// reference) is alive; never store the result.
    pub fn raw(&self) -> RawScriptValue {
        self.raw
    }

    /// Identity comparison through the engine's strict equality.
    pub fn is_same(&self, other: &ScriptHandle) -> bool {
        self.engine.strict_equals(self.raw, other.raw)
    }
}

impl Clone for ScriptHandle {
    fn clone(&self) -> Self {
        Self::acquire(&self.engine, self.raw)
    }
}

impl Drop for ScriptHandle {
    fn drop(&mut self) {
        self.engine.release(self.raw);
    }
}

impl fmt::Debug for ScriptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScriptHandle").field(&self.raw.0).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::stub::StubEngine;
    use crate::engine::EngineRef;
    use std::rc::Rc;

    #[test]
    fn test_drop_releases_exactly_once() {
        let stub = Rc::new(StubEngine::new());
        let engine: EngineRef = stub.clone();
        let raw = stub.number(7.0);
        {
            let handle = ScriptHandle::adopt(&engine, raw);
            assert_eq!(handle.raw(), raw);
            assert_eq!(stub.live_values(), 1);
        }
        assert_eq!(stub.live_values(), 0);
    }

    #[test]
    fn test_clone_takes_a_new_count() {
        let stub = Rc::new(StubEngine::new());
        let engine: EngineRef = stub.clone();
        let handle = ScriptHandle::adopt(&engine, stub.number(1.0));
        let copy = handle.clone();
        drop(handle);
        // the clone still keeps the value alive
        assert_eq!(stub.live_values(), 1);
        drop(copy);
        assert_eq!(stub.live_values(), 0);
    }

    #[test]
    fn test_is_same_uses_engine_identity() {
        let stub = Rc::new(StubEngine::new());
        let engine: EngineRef = stub.clone();
        let a = ScriptHandle::adopt(&engine, stub.number(3.0));
        let b = a.clone();
        let c = ScriptHandle::adopt(&engine, stub.text("three"));
        assert!(a.is_same(&b));
        assert!(!a.is_same(&c));
    }
}
