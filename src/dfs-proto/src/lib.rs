//! Shared protocol surface of the filesystem: the remote interface tables,
//! the typed stubs the servers and clients call through, and the handler
//! traits plus dispatch adapters the servers implement.

mod handlers;
mod interfaces;
mod stubs;

pub use handlers::{
    CommandDispatcher, CommandHandler, RegistrationDispatcher, RegistrationHandler,
    ServiceDispatcher, ServiceHandler, StorageDispatcher, StorageHandler,
};
pub use interfaces::{
    COMMAND_INTERFACE, REGISTRATION_INTERFACE, SERVICE_INTERFACE, STORAGE_INTERFACE,
};
pub use stubs::{CommandStub, RegistrationStub, ServiceStub, StorageStub};
