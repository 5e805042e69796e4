//! Extension container: a named set of live blocks with aggregate poll, reset and routing.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::block::{AnyBlock, AsyncResult, Block, BlockError, Busy, Cgi, PollMap, ResetFn};
use crate::definition::ExtensionDefinition;
use crate::protocol::{BUSY_LINE, POLL_PATH, RESET_ALL_PATH, RESULT_LINE};
use crate::registry::RegistryError;
use crate::wire::WireDescription;

pub struct Extension {
    name: String,
    blocks: Vec<AnyBlock>,
    index: HashMap<String, usize>,
    on_reset: RwLock<Option<ResetFn>>,
}

impl Extension {
    /// Index `blocks` by name. A later block with a taken name replaces the earlier one
    /// in place.
    pub fn new(name: impl Into<String>, blocks: Vec<AnyBlock>) -> Self {
        let mut list: Vec<AnyBlock> = Vec::with_capacity(blocks.len());
        let mut index = HashMap::new();
        for block in blocks {
            match index.get(block.name()) {
                Some(&i) => list[i] = block,
                None => {
                    index.insert(block.name().to_string(), list.len());
                    list.push(block);
                }
            }
        }
        Self {
            name: name.into(),
            blocks: list,
            index,
            on_reset: RwLock::new(None),
        }
    }

    /// Build with `init`, which receives the extension name and returns its blocks.
    pub fn build(name: &str, init: impl FnOnce(&str) -> Vec<AnyBlock>) -> Self {
        let blocks = init(name);
        Self::new(name, blocks)
    }

    /// One live block per descriptor of `definition`.
    pub fn from_definition(definition: &ExtensionDefinition, name: &str) -> Self {
        Self::build(name, |ext| {
            definition
                .components()
                .iter()
                .map(|d| d.create(ext))
                .collect()
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Blocks in registration order.
    pub fn components(&self) -> &[AnyBlock] {
        &self.blocks
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.blocks.iter().map(|b| b.name()).collect()
    }

    pub fn component(&self, name: &str) -> Result<&AnyBlock, RegistryError> {
        self.index
            .get(name)
            .map(|&i| &self.blocks[i])
            .ok_or_else(|| RegistryError::NotFound {
                kind: "component",
                name: name.to_string(),
            })
    }

    /// Every readable block's cells, keyed by block name followed by the arguments.
    /// Hat events stay raised until a `/poll` response reports them.
    pub fn poll(&self) -> Result<PollMap, BlockError> {
        let mut out = PollMap::new();
        for block in self.blocks.iter().filter(|b| b.kind().is_readable()) {
            for (args, value) in block.poll()? {
                let mut key = Vec::with_capacity(args.len() + 1);
                key.push(block.name().into());
                key.extend(args);
                out.insert(key, value);
            }
        }
        Ok(out)
    }

    /// The `/poll` body: one `name[/args] value` line per cell, then one `_result` line
    /// per drained asynchronous result, then a `_busy` line when anything is in flight.
    pub fn render_poll(&self) -> Result<String, BlockError> {
        let mut body = String::new();
        for block in self.blocks.iter().filter(|b| b.kind().is_readable()) {
            let mut lines: Vec<String> = block
                .take_poll()?
                .into_iter()
                .map(|(args, value)| {
                    let mut key = block.name().to_string();
                    for arg in &args {
                        let _ = write!(key, "/{}", arg);
                    }
                    format!("{} {}", key, value)
                })
                .collect();
            lines.sort();
            for line in lines {
                body.push_str(&line);
                body.push('\n');
            }
        }
        for result in self.take_results() {
            let _ = writeln!(body, "{} {} {}", RESULT_LINE, result.busy, result.value);
        }
        let busy = self.busy();
        if !busy.is_empty() {
            body.push_str(BUSY_LINE);
            for token in busy {
                let _ = write!(body, " {}", token);
            }
            body.push('\n');
        }
        Ok(body)
    }

    /// Outstanding busy tokens across all blocks.
    pub fn busy(&self) -> BTreeSet<Busy> {
        self.blocks.iter().flat_map(|b| b.busy()).collect()
    }

    /// Drain every block's completed asynchronous results.
    pub fn take_results(&self) -> Vec<AsyncResult> {
        self.blocks.iter().flat_map(|b| b.take_results()).collect()
    }

    /// Reset every block, then run the extension's reset hook.
    pub fn reset(&self) {
        for block in &self.blocks {
            block.reset();
        }
        if let Some(hook) = self.on_reset.read().as_ref() {
            hook();
        }
    }

    pub fn set_on_reset(&self, hook: Option<ResetFn>) {
        *self.on_reset.write() = hook;
    }

    /// Route `path`: blocks first, then `/poll` and `/reset_all`.
    pub fn get_cgi(self: &Arc<Self>, path: &str) -> Option<Cgi> {
        if let Some(cgi) = self.blocks.iter().find_map(|b| b.get_cgi(path)) {
            return Some(cgi);
        }
        let this = Arc::clone(self);
        match path {
            POLL_PATH => Some(Cgi::new(move || this.render_poll())),
            RESET_ALL_PATH => Some(Cgi::new(move || {
                this.reset();
                Ok(String::new())
            })),
            _ => None,
        }
    }

    /// Wire description as served on `port`.
    pub fn description(&self, port: u16) -> WireDescription {
        let mut menus = std::collections::BTreeMap::new();
        for block in &self.blocks {
            menus.extend(block.descriptor().menu_lists());
        }
        WireDescription {
            extension_name: self.name.clone(),
            extension_port: port,
            block_specs: self.blocks.iter().map(|b| b.definition()).collect(),
            menus,
        }
    }
}
