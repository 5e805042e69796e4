//! The I/O-free record a transport serves: an extension plus the port it is bound to.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use crate::block::Cgi;
use crate::extension::Extension;
use crate::protocol::{crossdomain_policy, CROSSDOMAIN_PATH};
use crate::registry::{Registries, RegistryError};
use crate::wire::WireDescription;

pub struct ExtensionService {
    extension: Arc<Extension>,
    port: AtomicU16,
}

impl ExtensionService {
    /// Unregistered service. Port 0 until the transport binds.
    pub fn new(extension: Arc<Extension>, port: u16) -> Arc<Self> {
        Arc::new(Self {
            extension,
            port: AtomicU16::new(port),
        })
    }

    /// Create and register under the extension's name.
    pub fn register(
        registries: &Registries,
        extension: Arc<Extension>,
        port: u16,
    ) -> Result<Arc<Self>, RegistryError> {
        let service = Self::new(extension, port);
        registries
            .services
            .register(service.name(), Arc::clone(&service))?;
        Ok(service)
    }

    pub fn name(&self) -> &str {
        self.extension.name()
    }

    pub fn extension(&self) -> &Arc<Extension> {
        &self.extension
    }

    pub fn port(&self) -> u16 {
        self.port.load(Ordering::SeqCst)
    }

    /// Record the port actually bound.
    pub fn set_port(&self, port: u16) {
        self.port.store(port, Ordering::SeqCst);
    }

    pub fn description(&self) -> WireDescription {
        self.extension.description(self.port())
    }

    /// Extension routes first, then `/crossdomain.xml`.
    pub fn get_cgi(&self, path: &str) -> Option<Cgi> {
        if let Some(cgi) = self.extension.get_cgi(path) {
            return Some(cgi);
        }
        if path == CROSSDOMAIN_PATH {
            let body = crossdomain_policy(self.port());
            return Some(Cgi::new(move || Ok(body)).with_header("Content-Type", "text/xml"));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::BlockDescriptor;

    fn service(reg: &Registries) -> Arc<ExtensionService> {
        let d = BlockDescriptor::sensor("temp").default_value(1).build().unwrap();
        let ext = Arc::new(Extension::new("robot", vec![d.create("robot")]));
        ExtensionService::register(reg, ext, 0).unwrap()
    }

    #[test]
    fn registered_by_extension_name() {
        let reg = Registries::new();
        let s = service(&reg);
        assert!(Arc::ptr_eq(&reg.services.get("robot").unwrap(), &s));
        let again = ExtensionService::register(&reg, Arc::clone(s.extension()), 0);
        assert!(matches!(again, Err(RegistryError::Duplicate { .. })));
    }

    #[test]
    fn crossdomain_uses_bound_port() {
        let reg = Registries::new();
        let s = service(&reg);
        s.set_port(4242);
        let cgi = s.get_cgi("/crossdomain.xml").unwrap();
        assert_eq!(cgi.headers(), &[("Content-Type".to_string(), "text/xml".to_string())]);
        assert!(cgi.call().unwrap().contains("to-ports=\"4242\""));
        assert_eq!(s.description().extension_port, 4242);
    }

    #[test]
    fn extension_routes_first() {
        let reg = Registries::new();
        let s = service(&reg);
        assert_eq!(s.get_cgi("/poll").unwrap().call().unwrap(), "temp 1\n");
        assert!(s.get_cgi("/nothing").is_none());
    }
}
