use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::{debug, warn};

use crate::method::{MethodInfo, MethodSpec, ParamSpec, Service};

/// Service used by [`ServiceRegistry::register_method`] when none is given.
pub const DEFAULT_SERVICE: &str = "default";

/// Methods organized by service, plus a flat index for dispatch.
#[derive(Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, BTreeMap<String, MethodInfo>>,
    methods: HashMap<String, MethodInfo>,
}

/// Serializable description of one method.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodSummary {
    pub description: Option<String>,
    pub parameters: Option<Vec<ParamSpec>>,
    pub is_async: bool,
    pub requires_auth: bool,
    pub permissions: BTreeSet<String>,
}

/// Serializable description of a service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub method_count: usize,
    pub methods: BTreeMap<String, MethodSummary>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every method of a service, replacing a previous registration
    /// of the same service.
    pub fn register_service(&mut self, service: Service) {
        let (name, methods) = service.into_parts();
        if self.services.contains_key(&name) {
            warn!(service = %name, "service already registered, overwriting");
            self.unregister_service(&name);
        }
        self.services.entry(name.clone()).or_default();
        for (full_name, spec) in methods {
            self.insert(full_name, spec, &name);
        }
    }

    /// Register a single method under `service`.
    pub fn register_method(&mut self, spec: MethodSpec, service: &str) {
        let name = spec.name().to_string();
        self.insert(name, spec, service);
    }

    fn insert(&mut self, name: String, spec: MethodSpec, service: &str) {
        if let Some(previous) = self.methods.get(&name) {
            warn!(
                method = %name,
                previous_service = %previous.service,
                service = %service,
                "method already registered, replacing"
            );
            let previous_service = previous.service.clone();
            if let Some(methods) = self.services.get_mut(&previous_service) {
                methods.remove(&name);
            }
        }
        let info = spec.into_info(name.clone(), service);
        self.services
            .entry(service.to_string())
            .or_default()
            .insert(name.clone(), info.clone());
        self.methods.insert(name.clone(), info);
        debug!(method = %name, service = %service, "registered method");
    }

    /// Remove a service and all of its methods.
    pub fn unregister_service(&mut self, service: &str) -> bool {
        let Some(methods) = self.services.remove(service) else {
            return false;
        };
        for name in methods.keys() {
            self.methods.remove(name);
        }
        debug!(service = %service, "unregistered service");
        true
    }

    /// Remove one method.
    pub fn unregister_method(&mut self, name: &str) -> bool {
        let Some(info) = self.methods.remove(name) else {
            return false;
        };
        if let Some(methods) = self.services.get_mut(&info.service) {
            methods.remove(name);
        }
        debug!(method = %name, "unregistered method");
        true
    }

    /// Exact, case-sensitive lookup.
    pub fn get_method(&self, name: &str) -> Option<&MethodInfo> {
        self.methods.get(name)
    }

    /// Registered methods sorted by name, optionally for one service.
    pub fn list_methods(&self, service: Option<&str>) -> Vec<MethodInfo> {
        match service {
            Some(service) => self
                .services
                .get(service)
                .map(|methods| methods.values().cloned().collect())
                .unwrap_or_default(),
            None => {
                let mut all: Vec<MethodInfo> = self.methods.values().cloned().collect();
                all.sort_by(|a, b| a.name.cmp(&b.name));
                all
            }
        }
    }

    /// Registered service names, sorted.
    pub fn list_services(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    pub fn get_service_info(&self, service: &str) -> Option<ServiceInfo> {
        let methods = self.services.get(service)?;
        Some(ServiceInfo {
            name: service.to_string(),
            method_count: methods.len(),
            methods: methods
                .iter()
                .map(|(name, info)| {
                    (
                        name.clone(),
                        MethodSummary {
                            description: info.description.clone(),
                            parameters: info.parameters.clone(),
                            is_async: info.is_async,
                            requires_auth: info.requires_auth,
                            permissions: info.permissions.clone(),
                        },
                    )
                })
                .collect(),
        })
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }
}
