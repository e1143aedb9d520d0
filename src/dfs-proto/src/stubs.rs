use std::fmt;
use std::net::SocketAddr;

use dfs_lib::{DfsError, DfsPath, DfsResult};
use rmi::{InterfaceSpec, RawStub, Skeleton};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::interfaces::{
    COMMAND_INTERFACE, REGISTRATION_INTERFACE, SERVICE_INTERFACE, STORAGE_INTERFACE,
};

fn to_arg<T: Serialize>(value: &T) -> DfsResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| DfsError::Remote(format!("argument marshalling failed: {}", e)))
}

async fn call_typed<T: DeserializeOwned>(
    raw: &RawStub,
    interface: &'static InterfaceSpec,
    name: &str,
    args: Vec<Value>,
) -> DfsResult<T> {
    let method = interface.method(name).ok_or_else(|| {
        DfsError::IllegalState(format!("no method {} on {}", name, interface.name))
    })?;
    let value = raw.call(method, args).await?;
    serde_json::from_value(value)
        .map_err(|e| DfsError::Remote(format!("bad result for {}: {}", name, e)))
}

/// Typed stub for the naming server's Service interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceStub {
    raw: RawStub,
}

impl ServiceStub {
    pub fn connect(addr: SocketAddr) -> DfsResult<Self> {
        Ok(ServiceStub {
            raw: RawStub::from_address(&SERVICE_INTERFACE, addr)?,
        })
    }

    pub fn from_skeleton(skeleton: &Skeleton) -> DfsResult<Self> {
        Ok(ServiceStub {
            raw: RawStub::from_skeleton(skeleton)?,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.raw.addr()
    }

    pub async fn is_directory(&self, path: &DfsPath) -> DfsResult<bool> {
        call_typed(&self.raw, &SERVICE_INTERFACE, "is_directory", vec![to_arg(path)?]).await
    }

    pub async fn list(&self, path: &DfsPath) -> DfsResult<Vec<String>> {
        call_typed(&self.raw, &SERVICE_INTERFACE, "list", vec![to_arg(path)?]).await
    }

    pub async fn create_file(&self, path: &DfsPath) -> DfsResult<bool> {
        call_typed(&self.raw, &SERVICE_INTERFACE, "create_file", vec![to_arg(path)?]).await
    }

    pub async fn create_directory(&self, path: &DfsPath) -> DfsResult<bool> {
        call_typed(&self.raw, &SERVICE_INTERFACE, "create_directory", vec![to_arg(path)?]).await
    }

    pub async fn delete(&self, path: &DfsPath) -> DfsResult<bool> {
        call_typed(&self.raw, &SERVICE_INTERFACE, "delete", vec![to_arg(path)?]).await
    }

    pub async fn get_storage(&self, path: &DfsPath) -> DfsResult<StorageStub> {
        call_typed(&self.raw, &SERVICE_INTERFACE, "get_storage", vec![to_arg(path)?]).await
    }

    pub async fn lock(&self, path: &DfsPath, exclusive: bool) -> DfsResult<()> {
        call_typed(
            &self.raw,
            &SERVICE_INTERFACE,
            "lock",
            vec![to_arg(path)?, to_arg(&exclusive)?],
        )
        .await
    }

    pub async fn unlock(&self, path: &DfsPath, exclusive: bool) -> DfsResult<()> {
        call_typed(
            &self.raw,
            &SERVICE_INTERFACE,
            "unlock",
            vec![to_arg(path)?, to_arg(&exclusive)?],
        )
        .await
    }
}

/// Typed stub for the naming server's Registration interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationStub {
    raw: RawStub,
}

impl RegistrationStub {
    pub fn connect(addr: SocketAddr) -> DfsResult<Self> {
        Ok(RegistrationStub {
            raw: RawStub::from_address(&REGISTRATION_INTERFACE, addr)?,
        })
    }

    pub fn from_skeleton(skeleton: &Skeleton) -> DfsResult<Self> {
        Ok(RegistrationStub {
            raw: RawStub::from_skeleton(skeleton)?,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.raw.addr()
    }

    /// Registers a storage server and returns the paths it must delete as
    /// duplicates.
    pub async fn register(
        &self,
        storage: &StorageStub,
        command: &CommandStub,
        files: &[DfsPath],
    ) -> DfsResult<Vec<DfsPath>> {
        call_typed(
            &self.raw,
            &REGISTRATION_INTERFACE,
            "register",
            vec![to_arg(storage)?, to_arg(command)?, to_arg(&files)?],
        )
        .await
    }
}

/// Typed stub for a storage server's Storage interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageStub {
    raw: RawStub,
}

impl StorageStub {
    pub fn connect(addr: SocketAddr) -> DfsResult<Self> {
        Ok(StorageStub {
            raw: RawStub::from_address(&STORAGE_INTERFACE, addr)?,
        })
    }

    pub fn from_skeleton(skeleton: &Skeleton) -> DfsResult<Self> {
        Ok(StorageStub {
            raw: RawStub::from_skeleton(skeleton)?,
        })
    }

    pub fn from_skeleton_with_host(skeleton: &Skeleton, hostname: &str) -> DfsResult<Self> {
        Ok(StorageStub {
            raw: RawStub::from_skeleton_with_host(skeleton, hostname)?,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.raw.addr()
    }

    pub async fn size(&self, path: &DfsPath) -> DfsResult<u64> {
        call_typed(&self.raw, &STORAGE_INTERFACE, "size", vec![to_arg(path)?]).await
    }

    pub async fn read(&self, path: &DfsPath, offset: u64, length: u64) -> DfsResult<Vec<u8>> {
        call_typed(
            &self.raw,
            &STORAGE_INTERFACE,
            "read",
            vec![to_arg(path)?, to_arg(&offset)?, to_arg(&length)?],
        )
        .await
    }

    pub async fn write(&self, path: &DfsPath, offset: u64, data: &[u8]) -> DfsResult<()> {
        call_typed(
            &self.raw,
            &STORAGE_INTERFACE,
            "write",
            vec![to_arg(path)?, to_arg(&offset)?, to_arg(&data)?],
        )
        .await
    }
}

/// Typed stub for a storage server's Command interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandStub {
    raw: RawStub,
}

impl CommandStub {
    pub fn connect(addr: SocketAddr) -> DfsResult<Self> {
        Ok(CommandStub {
            raw: RawStub::from_address(&COMMAND_INTERFACE, addr)?,
        })
    }

    pub fn from_skeleton(skeleton: &Skeleton) -> DfsResult<Self> {
        Ok(CommandStub {
            raw: RawStub::from_skeleton(skeleton)?,
        })
    }

    pub fn from_skeleton_with_host(skeleton: &Skeleton, hostname: &str) -> DfsResult<Self> {
        Ok(CommandStub {
            raw: RawStub::from_skeleton_with_host(skeleton, hostname)?,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.raw.addr()
    }

    pub async fn create(&self, path: &DfsPath) -> DfsResult<bool> {
        call_typed(&self.raw, &COMMAND_INTERFACE, "create", vec![to_arg(path)?]).await
    }

    pub async fn delete(&self, path: &DfsPath) -> DfsResult<bool> {
        call_typed(&self.raw, &COMMAND_INTERFACE, "delete", vec![to_arg(path)?]).await
    }

    /// Commands the server to copy `path` from the given source storage
    /// server.
    pub async fn copy(&self, path: &DfsPath, source: &StorageStub) -> DfsResult<bool> {
        call_typed(
            &self.raw,
            &COMMAND_INTERFACE,
            "copy",
            vec![to_arg(path)?, to_arg(source)?],
        )
        .await
    }
}

impl fmt::Display for ServiceStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl fmt::Display for RegistrationStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl fmt::Display for StorageStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl fmt::Display for CommandStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}
