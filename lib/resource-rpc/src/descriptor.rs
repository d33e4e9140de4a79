//! Static descriptions of the services exposed on the shared endpoint

/// One callable method of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub name: &'static str,
}

impl MethodDescriptor {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }
}

/// Wire descriptor of a service: its routable name and method table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: &'static str,
    pub methods: &'static [MethodDescriptor],
}

impl ServiceDescriptor {
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }
}
