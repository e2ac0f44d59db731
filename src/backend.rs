//! Backend abstraction for provisioning compute instances that expose a shell.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::compute::{CommandExecutor, ExecScope};

/// Parameters required to create a new instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceSpec {
    /// Caller chosen name, recorded on the instance so it can be listed later.
    pub name: String,
    /// Image reference understood by the provider (for example `ubuntu:22.04`).
    pub image: String,
}

impl InstanceSpec {
    /// Starts a builder for an [`InstanceSpec`].
    #[must_use]
    pub fn builder() -> InstanceSpecBuilder {
        InstanceSpecBuilder::new()
    }

    /// Validates the spec, returning the name of the first empty field.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Validation`] when any field is empty.
    pub fn validate(&self) -> Result<(), BackendError> {
        if self.name.is_empty() {
            return Err(BackendError::Validation("name".to_owned()));
        }
        if self.image.is_empty() {
            return Err(BackendError::Validation("image".to_owned()));
        }
        Ok(())
    }
}

/// Builder for [`InstanceSpec`] that trims inputs and validates on build.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstanceSpecBuilder {
    name: String,
    image: String,
}

impl InstanceSpecBuilder {
    /// Creates an empty builder; fields must be populated before build.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the instance name.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = value.into();
        self
    }

    /// Sets the image reference.
    #[must_use]
    pub fn image(mut self, value: impl Into<String>) -> Self {
        self.image = value.into();
        self
    }

    /// Builds and validates the [`InstanceSpec`].
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Validation`] when any field is empty after
    /// trimming.
    pub fn build(self) -> Result<InstanceSpec, BackendError> {
        let spec = InstanceSpec {
            name: self.name.trim().to_owned(),
            image: self.image.trim().to_owned(),
        };
        spec.validate()?;
        Ok(spec)
    }
}

/// An instance managed by this tool.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceStatus {
    /// Provider specific identifier.
    pub id: String,
    /// Name supplied in the [`InstanceSpec`] that created the instance.
    pub name: String,
}

/// Address family of an [`Address`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AddressKind {
    /// IPv4.
    Ipv4,
    /// IPv6.
    Ipv6,
}

impl fmt::Display for AddressKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipv4 => formatter.write_str("IPv4"),
            Self::Ipv6 => formatter.write_str("IPv6"),
        }
    }
}

/// Network address reported by an instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Address {
    /// Textual address without the prefix length.
    pub address: String,
    /// Prefix length, as printed by `ip addr`.
    pub netmask: String,
    /// Address family.
    pub kind: AddressKind,
    /// `false` for private and unique local ranges.
    pub is_publicly_routable: bool,
}

/// Errors raised by backends.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum BackendError {
    /// Raised when a spec is missing a required field.
    #[error("missing or empty field: {0}")]
    Validation(String),
}

/// Future returned by backend operations.
pub type BackendFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Lifecycle and shell access for the instances of one provider.
pub trait Backend {
    /// Provider specific error type returned by the backend.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Lists the instances created by this tool.
    fn list(&self) -> BackendFuture<'_, Vec<InstanceStatus>, Self::Error>;

    /// Creates and starts an instance described by `spec`.
    fn create<'a>(&'a self, spec: &'a InstanceSpec)
    -> BackendFuture<'a, InstanceStatus, Self::Error>;

    /// Stops and removes the instance identified by `id`.
    fn delete<'a>(&'a self, id: &'a str) -> BackendFuture<'a, (), Self::Error>;

    /// Reports the addresses configured inside the instance.
    fn ip_addresses<'a>(
        &'a self,
        scope: &'a ExecScope,
        id: &'a str,
    ) -> BackendFuture<'a, Vec<Address>, Self::Error>;

    /// Opens a long-lived shell on the instance.
    ///
    /// # Errors
    ///
    /// Returns the provider error when the shell process cannot be started.
    fn command_executor(&self, id: &str) -> Result<CommandExecutor, Self::Error>;
}
