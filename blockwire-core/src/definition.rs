//! Extension definitions: a named, registered set of block descriptors that extensions
//! are built from.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::descriptor::{BlockDescriptor, DefinitionError, DescriptorBuilder};
use crate::registry::{Registries, RegistryError};
use crate::value::Value;

#[derive(Debug)]
pub struct ExtensionDefinition {
    name: String,
    description: String,
    components: RwLock<Vec<Arc<BlockDescriptor>>>,
}

impl ExtensionDefinition {
    /// Create and register under `name`. The description defaults to the name.
    pub fn new(
        registries: &Registries,
        name: &str,
        description: Option<&str>,
    ) -> Result<Arc<Self>, RegistryError> {
        let definition = Arc::new(Self {
            name: name.to_string(),
            description: description.unwrap_or(name).to_string(),
            components: RwLock::new(Vec::new()),
        });
        registries
            .definitions
            .register(name, Arc::clone(&definition))?;
        Ok(definition)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Descriptors in registration order.
    pub fn components(&self) -> Vec<Arc<BlockDescriptor>> {
        self.components.read().clone()
    }

    pub fn get_component(&self, name: &str) -> Result<Arc<BlockDescriptor>, RegistryError> {
        self.components
            .read()
            .iter()
            .find(|c| c.name() == name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                kind: "component",
                name: name.to_string(),
            })
    }

    /// Register all of `components` or none of them. Re-registering the same descriptor
    /// is allowed; a different descriptor under a taken name is not.
    pub fn register_components(
        &self,
        components: &[Arc<BlockDescriptor>],
    ) -> Result<(), DefinitionError> {
        let mut current = self.components.write();
        for (i, c) in components.iter().enumerate() {
            let clash = current
                .iter()
                .chain(&components[..i])
                .any(|other| other.name() == c.name() && !Arc::ptr_eq(other, c));
            if clash {
                return Err(DefinitionError::DuplicateComponent(c.name().to_string()));
            }
        }
        for c in components {
            if !current.iter().any(|other| Arc::ptr_eq(other, c)) {
                current.push(Arc::clone(c));
            }
        }
        Ok(())
    }

    pub fn deregister_components(&self, names: &[&str]) -> Result<(), RegistryError> {
        let mut current = self.components.write();
        if let Some(missing) = names.iter().find(|n| !current.iter().any(|c| c.name() == **n)) {
            return Err(RegistryError::NotFound {
                kind: "component",
                name: missing.to_string(),
            });
        }
        current.retain(|c| !names.iter().any(|n| *n == c.name()));
        Ok(())
    }

    /// Build `builder` as a component of this definition and register it.
    pub fn add(&self, builder: DescriptorBuilder) -> Result<Arc<BlockDescriptor>, DefinitionError> {
        let descriptor = builder.owner(self.name.clone()).build()?;
        self.register_components(std::slice::from_ref(&descriptor))?;
        Ok(descriptor)
    }

    pub fn add_sensor(
        &self,
        name: &str,
        value: impl Into<Value>,
        description: Option<&str>,
    ) -> Result<Arc<BlockDescriptor>, DefinitionError> {
        let mut builder = BlockDescriptor::sensor(name).default_value(value);
        if let Some(d) = description {
            builder = builder.description(d);
        }
        self.add(builder)
    }

    /// Add a command. `menus` are applied to the builder before it is added.
    pub fn add_command(
        &self,
        name: &str,
        arguments: Vec<Value>,
        description: Option<&str>,
        menus: impl FnOnce(DescriptorBuilder) -> DescriptorBuilder,
    ) -> Result<Arc<BlockDescriptor>, DefinitionError> {
        let mut builder = BlockDescriptor::command(name).arguments(arguments);
        if let Some(d) = description {
            builder = builder.description(d);
        }
        self.add(menus(builder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::Menu;

    #[test]
    fn registered_by_name() {
        let reg = Registries::new();
        let ed = ExtensionDefinition::new(&reg, "robot", None).unwrap();
        assert_eq!(ed.description(), "robot");
        assert!(Arc::ptr_eq(&reg.definitions.get("robot").unwrap(), &ed));
        assert!(ExtensionDefinition::new(&reg, "robot", Some("again")).is_err());
    }

    #[test]
    fn add_sensor_and_command() {
        let reg = Registries::new();
        let ed = ExtensionDefinition::new(&reg, "robot", Some("A robot")).unwrap();
        let s = ed.add_sensor("speed", 3, None).unwrap();
        assert_eq!(s.owner(), Some("robot"));
        assert_eq!(s.default(), &Value::from(3));
        let c = ed
            .add_command(
                "turn",
                vec![Value::from("left")],
                Some("turn %m.dir"),
                |b| b.menu("dir", Menu::items(["left", "right"])),
            )
            .unwrap();
        assert_eq!(c.definition().len(), 4);
        let names: Vec<String> = ed.components().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["speed", "turn"]);
        assert!(Arc::ptr_eq(&ed.get_component("turn").unwrap(), &c));
        assert!(ed.get_component("jump").is_err());
    }

    #[test]
    fn duplicate_name_keeps_first() {
        let reg = Registries::new();
        let ed = ExtensionDefinition::new(&reg, "e", None).unwrap();
        let first = ed.add_sensor("x", 1, None).unwrap();
        let err = ed.add_sensor("x", 2, None).unwrap_err();
        assert!(matches!(err, DefinitionError::DuplicateComponent(ref n) if n == "x"));
        assert!(Arc::ptr_eq(&ed.get_component("x").unwrap(), &first));
        assert_eq!(ed.components().len(), 1);
    }

    #[test]
    fn register_components_is_all_or_nothing() {
        let reg = Registries::new();
        let ed = ExtensionDefinition::new(&reg, "e", None).unwrap();
        let a = BlockDescriptor::sensor("a").build().unwrap();
        let b = BlockDescriptor::sensor("b").build().unwrap();
        let b2 = BlockDescriptor::sensor("b").build().unwrap();
        assert!(ed.register_components(&[a.clone(), b.clone(), b2]).is_err());
        assert!(ed.components().is_empty());
        ed.register_components(&[a.clone(), b.clone()]).unwrap();
        ed.register_components(&[a.clone()]).unwrap();
        assert_eq!(ed.components().len(), 2);
    }

    #[test]
    fn deregister() {
        let reg = Registries::new();
        let ed = ExtensionDefinition::new(&reg, "e", None).unwrap();
        ed.add_sensor("a", "", None).unwrap();
        ed.add_sensor("b", "", None).unwrap();
        assert!(ed.deregister_components(&["a", "zz"]).is_err());
        assert_eq!(ed.components().len(), 2);
        ed.deregister_components(&["a"]).unwrap();
        assert_eq!(ed.components().len(), 1);
    }
}
