use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use super::{
    parse_busy, AsyncResult, Block, BlockError, Busy, Cgi, ReadFn, ResetFn, Shared, INVALID,
};
use crate::descriptor::BlockDescriptor;
use crate::value::{Value, ValueTree};

pub(crate) struct RequesterState {
    tree: ValueTree,
    results: Vec<AsyncResult>,
    /// Asynchronous requests waiting for a value, with their converted arguments.
    pending: HashMap<Busy, Vec<Value>>,
    /// Sequence number of the last `set` per argument tuple.
    stamps: HashMap<Vec<Value>, u64>,
    sequence: u64,
    resets: u64,
}

impl RequesterState {
    fn new(default: Value) -> Self {
        Self {
            tree: ValueTree::with_fallback(default),
            results: Vec::new(),
            pending: HashMap::new(),
            stamps: HashMap::new(),
            sequence: 0,
            resets: 0,
        }
    }
}

/// Reporter answered later. Without a read callback, requests wait until someone `set`s
/// a value for the same arguments; with one, reads run inline or on a worker thread.
#[derive(Clone)]
pub struct Requester {
    shared: Arc<Shared<RequesterState, ReadFn>>,
}

impl Requester {
    pub fn new(descriptor: Arc<BlockDescriptor>, extension: &str) -> Self {
        let state = RequesterState::new(descriptor.default().clone());
        Self {
            shared: Shared::new(descriptor, extension, state),
        }
    }

    /// Read through the callback if installed and return the resolved value. Never waits.
    pub fn get<S: AsRef<str>>(&self, raw: &[S]) -> Result<Value, BlockError> {
        let args = self.shared.descriptor.signature().convert(raw)?;
        self.read(&args)
    }

    fn read(&self, args: &[Value]) -> Result<Value, BlockError> {
        let fresh = match self.shared.callback() {
            Some(read) => read(args).map_err(BlockError::Callback)?,
            None => Value::Null,
        };
        let mut state = self.shared.state.lock();
        if !fresh.is_null() {
            state.value.tree.store(fresh, args);
        }
        Ok(state.value.tree.resolve(args))
    }

    /// Resolved value for `raw`, without reading or waiting.
    pub fn value<S: AsRef<str>>(&self, raw: &[S]) -> Result<Value, BlockError> {
        let args = self.shared.descriptor.signature().convert(raw)?;
        Ok(self.shared.state.lock().value.tree.resolve(&args))
    }

    /// Synchronous request. With a read callback this is a plain read; without one it
    /// blocks until `set` is called with matching arguments, or the block is reset.
    /// There is no timeout.
    pub fn busy_get<S: AsRef<str>>(&self, raw: &[S]) -> Result<Value, BlockError> {
        let args = self.shared.descriptor.signature().convert(raw)?;
        debug!(block = %self.name(), args = ?args, "busy_get");
        if self.has_do_read() {
            return self.read(&args);
        }
        let mut state = self.shared.state.lock();
        let since = state.value.sequence;
        let resets = state.value.resets;
        loop {
            let answered = state
                .value
                .stamps
                .get(&args)
                .is_some_and(|stamp| *stamp > since);
            if answered || state.value.resets != resets {
                return Ok(state.value.tree.resolve(&args));
            }
            self.shared.changed.wait(&mut state);
        }
    }

    /// Asynchronous request tagged `busy`. Always recorded as pending. With a read
    /// callback a worker thread performs the read and records the outcome; without one
    /// the next matching `set` resolves it. Returns the worker handle, if one was spawned.
    pub fn get_async<S: AsRef<str>>(
        &self,
        busy: Busy,
        raw: &[S],
    ) -> Result<Option<JoinHandle<Result<Value, BlockError>>>, BlockError> {
        let args = self.shared.descriptor.signature().convert(raw)?;
        info!(block = %self.name(), busy, args = ?args, "requester");
        let live = self.has_do_read();
        {
            let mut state = self.shared.state.lock();
            state.value.pending.insert(busy, args.clone());
            if live {
                state.busy.insert(busy);
            }
        }
        if !live {
            return Ok(None);
        }
        let this = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("requester {} [{}]", self.name(), busy))
            .spawn(move || {
                let mut record = ResultRecord {
                    block: this.clone(),
                    busy,
                    outcome: None,
                };
                let result = this.read(&args);
                record.outcome = Some(match &result {
                    Ok(v) => (v.clone(), None),
                    Err(e) => {
                        warn!(block = %this.name(), busy, error = %e, "requester worker failed");
                        (Value::from(INVALID), Some(e.to_string()))
                    }
                });
                result
            });
        match spawned {
            Ok(handle) => Ok(Some(handle)),
            Err(e) => {
                let mut state = self.shared.state.lock();
                state.value.pending.remove(&busy);
                state.busy.remove(&busy);
                Err(BlockError::Spawn(e))
            }
        }
    }

    /// Store `value` for `raw` and wake waiters. Without a read callback, every pending
    /// asynchronous request with the same arguments is resolved with `value`.
    pub fn set<S: AsRef<str>>(&self, value: impl Into<Value>, raw: &[S]) -> Result<(), BlockError> {
        let args = self.shared.descriptor.signature().convert(raw)?;
        let value = value.into();
        let resolve_pending = !self.has_do_read();
        let mut state = self.shared.state.lock();
        let s = &mut state.value;
        s.tree.store(value.clone(), &args);
        if resolve_pending {
            let mut matched: Vec<Busy> = s
                .pending
                .iter()
                .filter(|(_, a)| **a == args)
                .map(|(b, _)| *b)
                .collect();
            matched.sort_unstable();
            for busy in matched {
                s.pending.remove(&busy);
                s.results.push(AsyncResult {
                    busy,
                    value: value.clone(),
                    error: None,
                });
            }
        }
        s.sequence += 1;
        s.stamps.insert(args, s.sequence);
        self.shared.changed.notify_all();
        Ok(())
    }

    /// Completed asynchronous results, oldest first. Not drained.
    pub fn results(&self) -> Vec<AsyncResult> {
        self.shared.state.lock().value.results.clone()
    }

    /// Drain completed asynchronous results.
    pub fn get_results(&self) -> Vec<AsyncResult> {
        std::mem::take(&mut self.shared.state.lock().value.results)
    }

    pub fn set_do_read(&self, read: Option<ReadFn>) {
        self.shared.set_callback(read);
    }

    pub fn has_do_read(&self) -> bool {
        self.shared.callback.read().is_some()
    }
}

/// Records a worker's outcome when dropped, so a panicking read still completes its
/// busy bookkeeping.
struct ResultRecord {
    block: Requester,
    busy: Busy,
    outcome: Option<(Value, Option<String>)>,
}

impl Drop for ResultRecord {
    fn drop(&mut self) {
        let busy = self.busy;
        let (value, error) = self.outcome.take().unwrap_or_else(|| {
            (
                Value::from(INVALID),
                Some(BlockError::WorkerPanicked(busy).to_string()),
            )
        });
        let mut state = self.block.shared.state.lock();
        state.value.results.push(AsyncResult {
            busy: self.busy,
            value,
            error,
        });
        state.value.pending.remove(&self.busy);
        state.busy.remove(&self.busy);
        self.block.shared.changed.notify_all();
    }
}

impl Block for Requester {
    fn descriptor(&self) -> &Arc<BlockDescriptor> {
        &self.shared.descriptor
    }

    fn extension(&self) -> &str {
        &self.shared.extension
    }

    /// Running workers plus requests still waiting for a value.
    fn busy(&self) -> HashSet<Busy> {
        let state = self.shared.state.lock();
        state
            .busy
            .iter()
            .chain(state.value.pending.keys())
            .copied()
            .collect()
    }

    /// Releases blocked `busy_get` callers and drops pending requests. Stored values are
    /// kept. Running workers are not stopped and may still record a result afterwards.
    fn reset(&self) {
        self.shared.reset_with(|s| {
            s.results.clear();
            s.pending.clear();
            s.resets += 1;
        });
        self.shared.changed.notify_all();
    }

    /// `/<name>/<args>` reads synchronously; `/<name>/<busy>/<args>` starts an asynchronous
    /// request and answers immediately.
    fn get_cgi(&self, path: &str) -> Option<Cgi> {
        let mut args = self.shared.claim(path)?;
        let this = self.clone();
        if args.len() == self.signature().len() + 1 {
            let busy = args.remove(0);
            return Some(Cgi::new(move || {
                let busy = parse_busy(&busy)?;
                this.get_async(busy, &args)?;
                Ok(String::new())
            }));
        }
        Some(Cgi::new(move || Ok(this.busy_get(&args)?.to_string())))
    }

    fn take_results(&self) -> Vec<AsyncResult> {
        self.get_results()
    }

    fn set_on_reset(&self, hook: Option<ResetFn>) {
        *self.shared.on_reset.write() = hook;
    }
}
