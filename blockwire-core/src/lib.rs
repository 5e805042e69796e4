//! Blockwire block/extension model.
//! Host-driven: no sockets or files; a transport resolves request paths to CGIs and
//! serves the text they return.

pub mod block;
pub mod definition;
pub mod descriptor;
pub mod extension;
pub mod factory;
pub mod menu;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod signature;
pub mod value;
pub mod wire;

pub use block::{
    command_fn, flag_fn, read_fn, reset_fn, AnyBlock, AsyncResult, Block, BlockError, BooleanBlock,
    Busy, Callback, Cgi, Command, Hat, Reporter, Requester, Sensor, WaiterCommand,
};
pub use definition::ExtensionDefinition;
pub use descriptor::{BlockDescriptor, BlockKind, DefinitionError, DescriptorBuilder};
pub use extension::Extension;
pub use factory::{
    port_generator, CreateExtensions, Created, ExtensionFactory, ExtensionGroup, FactoryError,
    GroupMember, Membership, PortSeed, ServiceError,
};
pub use menu::{Fallback, Menu, MenuChecker};
pub use protocol::{EXTENSION_DEFAULT_ADDRESS, EXTENSION_DEFAULT_PORT};
pub use registry::{Registries, Registry, RegistryError};
pub use service::ExtensionService;
pub use signature::{ConversionError, Converter, Signature};
pub use value::{Value, ValueTree};
pub use wire::{decode_description, encode_description, DescriptionError, WireDescription};
