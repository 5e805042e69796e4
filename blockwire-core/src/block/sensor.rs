use std::collections::HashSet;
use std::sync::Arc;

use super::{Block, BlockError, Busy, PollMap, ReadFn, ResetFn, Shared};
use crate::descriptor::BlockDescriptor;
use crate::value::Value;

/// Scalar reading. Never takes arguments and is only reported through polling.
#[derive(Clone)]
pub struct Sensor {
    shared: Arc<Shared<Value, ReadFn>>,
}

impl Sensor {
    pub fn new(descriptor: Arc<BlockDescriptor>, extension: &str) -> Self {
        let value = descriptor.default().clone();
        Self {
            shared: Shared::new(descriptor, extension, value),
        }
    }

    /// Read through the callback if one is installed, then return the stored value.
    pub fn get(&self) -> Result<Value, BlockError> {
        let read = self.shared.callback();
        let fresh = match read {
            Some(read) => read(&[]).map_err(BlockError::Callback)?,
            None => Value::Null,
        };
        let mut state = self.shared.state.lock();
        if !fresh.is_null() {
            state.value = fresh;
        }
        Ok(state.value.clone())
    }

    /// Overwrite the stored value. The callback is not invoked.
    pub fn set(&self, value: impl Into<Value>) {
        self.shared.state.lock().value = value.into();
    }

    /// Last stored value.
    pub fn value(&self) -> Value {
        self.shared.state.lock().value.clone()
    }

    pub fn set_do_read(&self, read: Option<ReadFn>) {
        self.shared.set_callback(read);
    }

    pub fn has_do_read(&self) -> bool {
        self.shared.callback.read().is_some()
    }
}

impl Block for Sensor {
    fn descriptor(&self) -> &Arc<BlockDescriptor> {
        &self.shared.descriptor
    }

    fn extension(&self) -> &str {
        &self.shared.extension
    }

    fn busy(&self) -> HashSet<Busy> {
        self.shared.busy()
    }

    fn reset(&self) {
        let default = self.shared.descriptor.default().clone();
        self.shared.reset_with(|v| *v = default);
    }

    fn poll(&self) -> Result<PollMap, BlockError> {
        Ok(PollMap::from([(Vec::new(), self.get()?)]))
    }

    fn set_on_reset(&self, hook: Option<ResetFn>) {
        *self.shared.on_reset.write() = hook;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{read_fn, reset_fn};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sensor(default: i32) -> Sensor {
        let d = BlockDescriptor::sensor("temp")
            .default_value(default)
            .build()
            .unwrap();
        Sensor::new(d, "ext")
    }

    #[test]
    fn set_then_get_round_trip() {
        let s = sensor(0);
        assert_eq!(s.get().unwrap(), Value::from(0));
        s.set("hot");
        assert_eq!(s.get().unwrap(), Value::from("hot"));
        s.set(Value::List(vec![1.into(), 2.into()]));
        assert_eq!(s.get().unwrap(), Value::List(vec![1.into(), 2.into()]));
    }

    #[test]
    fn read_callback_updates_value() {
        let s = sensor(0);
        let n = Arc::new(AtomicUsize::new(0));
        let c = n.clone();
        s.set_do_read(Some(read_fn(move |args| {
            assert!(args.is_empty());
            Ok(Value::from(c.fetch_add(1, Ordering::SeqCst) as i64 + 10))
        })));
        assert!(s.has_do_read());
        assert_eq!(s.get().unwrap(), Value::from(10));
        assert_eq!(s.get().unwrap(), Value::from(11));
        assert_eq!(s.value(), Value::from(11));

        s.set_do_read(None);
        s.set(3);
        assert_eq!(s.get().unwrap(), Value::from(3));
    }

    #[test]
    fn null_read_keeps_stored_value() {
        let s = sensor(5);
        s.set_do_read(Some(read_fn(|_| Ok(Value::Null))));
        assert_eq!(s.get().unwrap(), Value::from(5));
    }

    #[test]
    fn failed_read_propagates() {
        let s = sensor(5);
        s.set_do_read(Some(read_fn(|_| Err("sensor offline".into()))));
        assert!(matches!(s.get(), Err(BlockError::Callback(_))));
        assert_eq!(s.value(), Value::from(5));
    }

    #[test]
    fn reset_restores_default_and_calls_hook() {
        let s = sensor(1);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        s.set_on_reset(Some(reset_fn(move || {
            h.fetch_add(1, Ordering::SeqCst);
        })));
        s.set(9);
        s.reset();
        assert_eq!(s.value(), Value::from(1));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn poll_and_no_cgi() {
        let s = sensor(2);
        let p = s.poll().unwrap();
        assert_eq!(p.get(&Vec::new()), Some(&Value::from(2)));
        assert!(s.get_cgi("/temp").is_none());
    }
}
