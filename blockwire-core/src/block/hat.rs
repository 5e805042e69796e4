use std::collections::HashSet;
use std::sync::Arc;

use super::{Block, BlockError, Busy, FlagFn, PollMap, ResetFn, Shared};
use crate::descriptor::BlockDescriptor;
use crate::value::Value;

/// Event source. `flag()` raises the event; `state()` reports it once, `peek()` any number
/// of times.
#[derive(Clone)]
pub struct Hat {
    shared: Arc<Shared<bool, FlagFn>>,
}

impl Hat {
    pub fn new(descriptor: Arc<BlockDescriptor>, extension: &str) -> Self {
        Self {
            shared: Shared::new(descriptor, extension, false),
        }
    }

    /// With a flag callback, its answer; otherwise the sticky flag, which is then cleared.
    pub fn state(&self) -> bool {
        if let Some(flag) = self.shared.callback() {
            return flag();
        }
        std::mem::take(&mut self.shared.state.lock().value)
    }

    /// Like `state`, but leaves the sticky flag raised.
    pub fn peek(&self) -> bool {
        if let Some(flag) = self.shared.callback() {
            return flag();
        }
        self.shared.state.lock().value
    }

    pub fn flag(&self) {
        self.shared.state.lock().value = true;
    }

    pub fn set_do_flag(&self, flag: Option<FlagFn>) {
        self.shared.set_callback(flag);
    }

    pub fn has_do_flag(&self) -> bool {
        self.shared.callback.read().is_some()
    }
}

impl Block for Hat {
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
        self.shared.reset_with(|flag| *flag = false);
    }

    fn poll(&self) -> Result<PollMap, BlockError> {
        Ok(PollMap::from([(Vec::new(), Value::Bool(self.peek()))]))
    }

    fn take_poll(&self) -> Result<PollMap, BlockError> {
        Ok(PollMap::from([(Vec::new(), Value::Bool(self.state()))]))
    }

    fn set_on_reset(&self, hook: Option<ResetFn>) {
        *self.shared.on_reset.write() = hook;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::flag_fn;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn hat() -> Hat {
        Hat::new(BlockDescriptor::hat("clap").build().unwrap(), "ext")
    }

    #[test]
    fn sticky_flag_is_read_once() {
        let h = hat();
        assert!(!h.state());
        h.flag();
        assert!(h.state());
        assert!(!h.state());
    }

    #[test]
    fn reset_lowers_flag() {
        let h = hat();
        h.flag();
        h.reset();
        assert!(!h.state());
    }

    #[test]
    fn flag_callback_is_not_consumed() {
        let h = hat();
        let up = Arc::new(AtomicBool::new(true));
        let u = up.clone();
        h.set_do_flag(Some(flag_fn(move || u.load(Ordering::SeqCst))));
        assert!(h.state());
        assert!(h.state());
        up.store(false, Ordering::SeqCst);
        assert!(!h.state());

        h.set_do_flag(None);
        h.flag();
        assert_eq!(h.take_poll().unwrap()[&Vec::new()], Value::Bool(true));
        assert_eq!(h.take_poll().unwrap()[&Vec::new()], Value::Bool(false));
    }

    #[test]
    fn poll_peeks_take_poll_consumes() {
        let h = hat();
        h.flag();
        assert!(h.peek());
        assert_eq!(h.poll().unwrap()[&Vec::new()], Value::Bool(true));
        assert_eq!(h.poll().unwrap()[&Vec::new()], Value::Bool(true));
        assert_eq!(h.take_poll().unwrap()[&Vec::new()], Value::Bool(true));
        assert!(!h.peek());
        assert_eq!(h.poll().unwrap()[&Vec::new()], Value::Bool(false));
    }

    #[test]
    fn no_cgi() {
        assert!(hat().get_cgi("/clap").is_none());
    }
}
