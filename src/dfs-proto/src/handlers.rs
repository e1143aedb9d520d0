use std::sync::Arc;

use async_trait::async_trait;
use dfs_lib::{DfsError, DfsPath, DfsResult};
use rmi::{error_value, CallHandler};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::stubs::{CommandStub, StorageStub};

/// Server-side contract for the naming server's Service interface.
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    async fn is_directory(&self, path: DfsPath) -> DfsResult<bool>;
    async fn list(&self, path: DfsPath) -> DfsResult<Vec<String>>;
    async fn create_file(&self, path: DfsPath) -> DfsResult<bool>;
    async fn create_directory(&self, path: DfsPath) -> DfsResult<bool>;
    async fn delete(&self, path: DfsPath) -> DfsResult<bool>;
    async fn get_storage(&self, path: DfsPath) -> DfsResult<StorageStub>;
    async fn lock(&self, path: DfsPath, exclusive: bool) -> DfsResult<()>;
    async fn unlock(&self, path: DfsPath, exclusive: bool) -> DfsResult<()>;
}

/// Server-side contract for the naming server's Registration interface.
#[async_trait]
pub trait RegistrationHandler: Send + Sync {
    async fn register(
        &self,
        storage: StorageStub,
        command: CommandStub,
        files: Vec<DfsPath>,
    ) -> DfsResult<Vec<DfsPath>>;
}

/// Server-side contract for a storage server's Storage interface.
#[async_trait]
pub trait StorageHandler: Send + Sync {
    async fn size(&self, path: DfsPath) -> DfsResult<u64>;
    async fn read(&self, path: DfsPath, offset: u64, length: u64) -> DfsResult<Vec<u8>>;
    async fn write(&self, path: DfsPath, offset: u64, data: Vec<u8>) -> DfsResult<()>;
}

/// Server-side contract for a storage server's Command interface.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn create(&self, path: DfsPath) -> DfsResult<bool>;
    async fn delete(&self, path: DfsPath) -> DfsResult<bool>;
    async fn copy(&self, path: DfsPath, source: StorageStub) -> DfsResult<bool>;
}

fn required<T: DeserializeOwned>(args: &[Value], idx: usize, name: &str) -> Result<T, Value> {
    let value = args.get(idx).ok_or_else(|| {
        error_value(&DfsError::NullArg(format!("missing argument: {}", name)))
    })?;
    if value.is_null() {
        return Err(error_value(&DfsError::NullArg(format!(
            "argument is null: {}",
            name
        ))));
    }
    serde_json::from_value(value.clone()).map_err(|e| {
        error_value(&DfsError::IllegalArg(format!("argument {}: {}", name, e)))
    })
}

fn reply<T: Serialize>(result: DfsResult<T>) -> Result<Value, Value> {
    match result {
        Ok(value) => serde_json::to_value(value)
            .map_err(|e| error_value(&DfsError::Remote(format!("result marshalling: {}", e)))),
        Err(err) => Err(error_value(&err)),
    }
}

fn unknown(method: &str) -> Result<Value, Value> {
    Err(error_value(&DfsError::Remote(format!(
        "unexpected method: {}",
        method
    ))))
}

/// Adapts a [`ServiceHandler`] to the skeleton's call interface.
pub struct ServiceDispatcher<T: ServiceHandler>(pub Arc<T>);

#[async_trait]
impl<T: ServiceHandler> CallHandler for ServiceDispatcher<T> {
    async fn handle_call(&self, method: &str, args: Vec<Value>) -> Result<Value, Value> {
        match method {
            "is_directory" => reply(self.0.is_directory(required(&args, 0, "path")?).await),
            "list" => reply(self.0.list(required(&args, 0, "path")?).await),
            "create_file" => reply(self.0.create_file(required(&args, 0, "path")?).await),
            "create_directory" => {
                reply(self.0.create_directory(required(&args, 0, "path")?).await)
            }
            "delete" => reply(self.0.delete(required(&args, 0, "path")?).await),
            "get_storage" => reply(self.0.get_storage(required(&args, 0, "path")?).await),
            "lock" => reply(
                self.0
                    .lock(required(&args, 0, "path")?, required(&args, 1, "exclusive")?)
                    .await,
            ),
            "unlock" => reply(
                self.0
                    .unlock(required(&args, 0, "path")?, required(&args, 1, "exclusive")?)
                    .await,
            ),
            other => unknown(other),
        }
    }
}

/// Adapts a [`RegistrationHandler`] to the skeleton's call interface.
pub struct RegistrationDispatcher<T: RegistrationHandler>(pub Arc<T>);

#[async_trait]
impl<T: RegistrationHandler> CallHandler for RegistrationDispatcher<T> {
    async fn handle_call(&self, method: &str, args: Vec<Value>) -> Result<Value, Value> {
        match method {
            "register" => reply(
                self.0
                    .register(
                        required(&args, 0, "storage")?,
                        required(&args, 1, "command")?,
                        required(&args, 2, "files")?,
                    )
                    .await,
            ),
            other => unknown(other),
        }
    }
}

/// Adapts a [`StorageHandler`] to the skeleton's call interface.
pub struct StorageDispatcher<T: StorageHandler>(pub Arc<T>);

#[async_trait]
impl<T: StorageHandler> CallHandler for StorageDispatcher<T> {
    async fn handle_call(&self, method: &str, args: Vec<Value>) -> Result<Value, Value> {
        match method {
            "size" => reply(self.0.size(required(&args, 0, "path")?).await),
            "read" => reply(
                self.0
                    .read(
                        required(&args, 0, "path")?,
                        required(&args, 1, "offset")?,
                        required(&args, 2, "length")?,
                    )
                    .await,
            ),
            "write" => reply(
                self.0
                    .write(
                        required(&args, 0, "path")?,
                        required(&args, 1, "offset")?,
                        required(&args, 2, "data")?,
                    )
                    .await,
            ),
            other => unknown(other),
        }
    }
}

/// Adapts a [`CommandHandler`] to the skeleton's call interface.
pub struct CommandDispatcher<T: CommandHandler>(pub Arc<T>);

#[async_trait]
impl<T: CommandHandler> CallHandler for CommandDispatcher<T> {
    async fn handle_call(&self, method: &str, args: Vec<Value>) -> Result<Value, Value> {
        match method {
            "create" => reply(self.0.create(required(&args, 0, "path")?).await),
            "delete" => reply(self.0.delete(required(&args, 0, "path")?).await),
            "copy" => reply(
                self.0
                    .copy(required(&args, 0, "path")?, required(&args, 1, "source")?)
                    .await,
            ),
            other => unknown(other),
        }
    }
}
