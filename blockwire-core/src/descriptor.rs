//! Block descriptors: the immutable template a live block is created from.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::block::{AnyBlock, Callback};
use crate::menu::Menu;
pub use crate::protocol::BlockKind;
use crate::signature::Signature;
use crate::value::Value;

/// Error building a descriptor or wiring it to a callback. Raised at definition time only.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("description references missing menu {0:?}")]
    MissingMenu(String),
    #[error("menu {0:?} must be a list or a mapping")]
    InvalidMenuType(String),
    #[error("wrong description and/or values/menus for {0:?}")]
    Rejected(String),
    #[error("a {callback} callback cannot drive {kind} block {name:?}")]
    CallbackMismatch {
        name: String,
        kind: BlockKind,
        callback: &'static str,
    },
    #[error("component {0:?} already defined")]
    DuplicateComponent(String),
}

/// Check run on command-family descriptors at build time. Returns false to reject.
pub type DefinitionCheck = fn(&BlockDescriptor) -> bool;

/// Default arguments are shown in the block's slots, so there cannot be more of them than slots.
pub fn default_definition_check(d: &BlockDescriptor) -> bool {
    d.arguments.len() <= d.signature.len()
}

#[derive(Debug)]
pub struct BlockDescriptor {
    kind: BlockKind,
    name: String,
    description: String,
    default: Value,
    arguments: Vec<Value>,
    menus: BTreeMap<String, Arc<Menu>>,
    signature: Signature,
    owner: Option<String>,
}

impl BlockDescriptor {
    pub fn builder(kind: BlockKind, name: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder::new(kind, name)
    }

    pub fn sensor(name: impl Into<String>) -> DescriptorBuilder {
        Self::builder(BlockKind::Sensor, name)
    }

    pub fn boolean(name: impl Into<String>) -> DescriptorBuilder {
        Self::builder(BlockKind::Boolean, name)
    }

    pub fn reporter(name: impl Into<String>) -> DescriptorBuilder {
        Self::builder(BlockKind::Reporter, name)
    }

    pub fn requester(name: impl Into<String>) -> DescriptorBuilder {
        Self::builder(BlockKind::Requester, name)
    }

    pub fn command(name: impl Into<String>) -> DescriptorBuilder {
        Self::builder(BlockKind::Command, name)
    }

    pub fn waiter_command(name: impl Into<String>) -> DescriptorBuilder {
        Self::builder(BlockKind::WaiterCommand, name)
    }

    pub fn hat(name: impl Into<String>) -> DescriptorBuilder {
        Self::builder(BlockKind::Hat, name)
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Initial value of readable kinds.
    pub fn default(&self) -> &Value {
        &self.default
    }

    /// Argument literals shown in a command's slots.
    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    pub fn menus(&self) -> &BTreeMap<String, Arc<Menu>> {
        &self.menus
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Name of the definition this descriptor was added to, if any.
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Block spec: `[tag, description, name, ...arguments]`.
    pub fn definition(&self) -> Vec<Value> {
        let mut spec = vec![
            Value::from(self.kind.tag()),
            Value::from(self.description.as_str()),
            Value::from(self.name.as_str()),
        ];
        spec.extend(self.arguments.iter().cloned());
        spec
    }

    /// Each menu's tokens, sorted.
    pub fn menu_lists(&self) -> BTreeMap<String, Vec<String>> {
        self.menus
            .iter()
            .map(|(name, menu)| {
                let mut tokens = menu.tokens();
                tokens.sort();
                (name.clone(), tokens)
            })
            .collect()
    }

    /// Live block bound to `extension`, with no callback.
    pub fn create(self: &Arc<Self>, extension: &str) -> AnyBlock {
        AnyBlock::new(Arc::clone(self), extension)
    }

    /// Live block bound to `extension` driven by `callback`.
    pub fn create_with(
        self: &Arc<Self>,
        extension: &str,
        callback: impl Into<Callback>,
    ) -> Result<AnyBlock, DefinitionError> {
        let block = self.create(extension);
        block.install(callback.into())?;
        Ok(block)
    }
}

pub struct DescriptorBuilder {
    kind: BlockKind,
    name: String,
    description: Option<String>,
    default: Option<Value>,
    arguments: Vec<Value>,
    menus: BTreeMap<String, Arc<Menu>>,
    owner: Option<String>,
    check: DefinitionCheck,
}

impl DescriptorBuilder {
    pub fn new(kind: BlockKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            description: None,
            default: None,
            arguments: Vec::new(),
            menus: BTreeMap::new(),
            owner: None,
            check: default_definition_check,
        }
    }

    /// Description template; defaults to the name.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn arguments<I, V>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    pub fn menu(mut self, name: impl Into<String>, menu: Menu) -> Self {
        self.menus.insert(name.into(), Arc::new(menu));
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn check(mut self, check: DefinitionCheck) -> Self {
        self.check = check;
        self
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn build(self) -> Result<Arc<BlockDescriptor>, DefinitionError> {
        let description = self.description.unwrap_or_else(|| self.name.clone());
        let signature = Signature::parse(&description, &self.menus)?;
        let default = self.default.unwrap_or_else(|| match self.kind {
            BlockKind::Hat | BlockKind::Boolean => Value::Bool(false),
            BlockKind::Command | BlockKind::WaiterCommand => Value::Null,
            _ => Value::Text(String::new()),
        });
        let descriptor = BlockDescriptor {
            kind: self.kind,
            name: self.name,
            description,
            default,
            arguments: self.arguments,
            menus: self.menus,
            signature,
            owner: self.owner,
        };
        if descriptor.kind.is_command() && !(self.check)(&descriptor) {
            return Err(DefinitionError::Rejected(descriptor.name));
        }
        Ok(Arc::new(descriptor))
    }
}
