//! Factory that turns the configured definition into HTTP services.

use std::sync::{Arc, Weak};

use blockwire_core::{
    port_generator, CreateExtensions, Extension, ExtensionDefinition, ExtensionService,
    FactoryError, GroupMember, Registries,
};
use tracing::debug;

use crate::config::Config;
use crate::http::HttpService;

/// One service per replica, named `<name>` (single) or `<name>-<n>`, on ports drawn
/// from the configured first port.
pub struct ConfigFactory {
    registries: Weak<Registries>,
    definition: Arc<ExtensionDefinition>,
    name: String,
    address: String,
    port: u16,
    replicas: usize,
}

impl ConfigFactory {
    pub fn new(
        registries: &Arc<Registries>,
        definition: Arc<ExtensionDefinition>,
        config: &Config,
    ) -> Self {
        Self {
            registries: Arc::downgrade(registries),
            definition,
            name: config.name.clone(),
            address: config.address.clone(),
            port: config.port,
            replicas: config.replicas.max(1),
        }
    }

    fn replica_name(&self, index: usize) -> String {
        if self.replicas == 1 {
            self.name.clone()
        } else {
            format!("{}-{}", self.name, index + 1)
        }
    }

    fn failed(&self, reason: impl Into<String>) -> FactoryError {
        FactoryError::Create {
            factory: self.name.clone(),
            reason: reason.into(),
        }
    }
}

impl CreateExtensions for ConfigFactory {
    fn do_create(&self, group_name: &str) -> Result<Vec<Arc<dyn GroupMember>>, FactoryError> {
        let registries = self
            .registries
            .upgrade()
            .ok_or_else(|| self.failed("registries dropped"))?;
        let ports: Vec<u16> = port_generator(self.port).take(self.replicas).collect();
        if ports.len() < self.replicas {
            return Err(self.failed(format!(
                "{} replicas do not fit above port {}",
                self.replicas, self.port
            )));
        }
        let mut members: Vec<Arc<dyn GroupMember>> = Vec::with_capacity(self.replicas);
        for (i, port) in ports.into_iter().enumerate() {
            let name = self.replica_name(i);
            let extension = Arc::new(Extension::from_definition(&self.definition, &name));
            let service = ExtensionService::register(&registries, extension, port)?;
            debug!(group = group_name, extension = %name, port, "created service");
            members.push(HttpService::new(service, self.address.clone()));
        }
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockwire_core::ExtensionFactory;

    fn config(replicas: usize, port: u16) -> Config {
        Config::from_toml(&format!(
            r#"
name = "robot"
address = "127.0.0.1"
port = {port}
replicas = {replicas}

[[blocks]]
kind = "sensor"
name = "speed"
default = 3
"#
        ))
        .unwrap()
    }

    #[test]
    fn single_replica_keeps_the_name() {
        let reg = Arc::new(Registries::new());
        let cfg = config(1, 0);
        let def = cfg.definition(&reg).unwrap();
        let f = ExtensionFactory::named(&reg, "robot", ConfigFactory::new(&reg, def, &cfg)).unwrap();
        let created = f.create(None).unwrap();
        assert!(created.group.is_none());
        assert_eq!(created.members[0].name(), "robot");
        assert!(reg.services.contains("robot"));
    }

    #[test]
    fn replicas_form_a_group_on_consecutive_ports() {
        let reg = Arc::new(Registries::new());
        let cfg = config(3, 7100);
        let def = cfg.definition(&reg).unwrap();
        let f = ExtensionFactory::anonymous(ConfigFactory::new(&reg, def, &cfg));
        let created = f.create(None).unwrap();
        let group = created.group.as_ref().unwrap();
        assert_eq!(group.name(), "1");
        assert_eq!(reg.services.names(), vec!["robot-1", "robot-2", "robot-3"]);
        let ports: Vec<u16> = ["robot-1", "robot-2", "robot-3"]
            .iter()
            .map(|n| reg.services.get(n).unwrap().port())
            .collect();
        assert_eq!(ports, vec![7100, 7101, 7102]);
    }

    #[test]
    fn replicas_past_the_top_port_fail() {
        let reg = Arc::new(Registries::new());
        let cfg = config(3, 65534);
        let def = cfg.definition(&reg).unwrap();
        let f = ExtensionFactory::anonymous(ConfigFactory::new(&reg, def, &cfg));
        assert!(matches!(f.create(None), Err(FactoryError::Create { .. })));
    }

    #[test]
    fn second_creation_collides_on_service_names() {
        let reg = Arc::new(Registries::new());
        let cfg = config(1, 0);
        let def = cfg.definition(&reg).unwrap();
        let f = ExtensionFactory::anonymous(ConfigFactory::new(&reg, def, &cfg));
        let _first = f.create(None).unwrap();
        assert!(matches!(f.create(None), Err(FactoryError::Registry(_))));
    }
}
