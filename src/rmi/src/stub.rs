use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{SocketAddr, ToSocketAddrs};

use dfs_lib::{DfsError, DfsResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;

use crate::interface::{InterfaceSpec, MethodSpec};
use crate::skeleton::Skeleton;
use crate::wire::{fault_error, read_frame, write_frame, CallReply};

/// Client-side proxy for a remote interface.
///
/// A stub carries the interface name and the remote address; it is
/// serializable so it can be handed to other processes (registration passes
/// storage and command stubs to the naming server this way). Two stubs are
/// equal iff they share interface and remote address, hashing and display
/// derive from the address, and none of those touch the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawStub {
    interface: String,
    addr: SocketAddr,
}

impl RawStub {
    /// Creates a stub from a skeleton, inheriting its address. The skeleton
    /// must have a declared address or have been started; a wildcard address
    /// cannot be turned into a routable one without a hostname.
    pub fn from_skeleton(skeleton: &Skeleton) -> DfsResult<RawStub> {
        let addr = skeleton.local_addr().ok_or_else(|| {
            DfsError::NotStarted("skeleton has no address and was not started".to_string())
        })?;
        if addr.ip().is_unspecified() {
            return Err(DfsError::UnknownHost(format!(
                "skeleton address {} is a wildcard; supply a hostname",
                addr
            )));
        }
        Ok(RawStub {
            interface: skeleton.interface().name.to_string(),
            addr,
        })
    }

    /// Creates a stub from a skeleton's port and a caller-supplied hostname,
    /// for hosts whose externally-routable name the system cannot assign.
    pub fn from_skeleton_with_host(skeleton: &Skeleton, hostname: &str) -> DfsResult<RawStub> {
        let port = skeleton
            .local_addr()
            .map(|a| a.port())
            .filter(|p| *p != 0)
            .ok_or_else(|| {
                DfsError::NotStarted("skeleton has not been assigned a port".to_string())
            })?;
        let addr = (hostname, port)
            .to_socket_addrs()
            .map_err(|e| DfsError::UnknownHost(format!("{}: {}", hostname, e)))?
            .next()
            .ok_or_else(|| {
                DfsError::UnknownHost(format!("no address found for {}", hostname))
            })?;
        Ok(RawStub {
            interface: skeleton.interface().name.to_string(),
            addr,
        })
    }

    /// Creates a stub from an explicit remote address, for bootstrapping.
    pub fn from_address(interface: &'static InterfaceSpec, addr: SocketAddr) -> DfsResult<RawStub> {
        interface.ensure_remote()?;
        Ok(RawStub {
            interface: interface.name.to_string(),
            addr,
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Performs one remote call: connect, write the method name, positional
    /// arguments and argument-type descriptors, read back the reply. A fault
    /// reply is re-raised with its original kind; transport failures raise
    /// `Remote`.
    pub async fn call(&self, method: &MethodSpec, args: Vec<Value>) -> DfsResult<Value> {
        let mut stream = TcpStream::connect(self.addr).await.map_err(|e| {
            DfsError::Remote(format!("connect to {} failed: {}", self.addr, e))
        })?;

        write_frame(&mut stream, &method.name).await?;
        write_frame(&mut stream, &args).await?;
        let arg_types: Vec<&str> = method.arg_types.to_vec();
        write_frame(&mut stream, &arg_types).await?;

        match read_frame(&mut stream).await? {
            CallReply::Return(value) => Ok(value),
            CallReply::Fault(fault) => Err(fault_error(fault)),
        }
    }
}

impl PartialEq for RawStub {
    fn eq(&self, other: &Self) -> bool {
        self.interface == other.interface && self.addr == other.addr
    }
}

impl Eq for RawStub {}

impl Hash for RawStub {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
    }
}

impl fmt::Display for RawStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::CallHandler;
    use crate::wire::error_value;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    static TEST_INTERFACE: InterfaceSpec = InterfaceSpec {
        name: "TestService",
        methods: &[
            MethodSpec {
                name: "echo",
                arg_types: &["string"],
                errors: &["Remote"],
            },
            MethodSpec {
                name: "fail",
                arg_types: &[],
                errors: &["NotFound", "Remote"],
            },
        ],
    };

    static LOCAL_INTERFACE: InterfaceSpec = InterfaceSpec {
        name: "LocalOnly",
        methods: &[MethodSpec {
            name: "noop",
            arg_types: &[],
            errors: &[],
        }],
    };

    struct TestHandler;

    #[async_trait]
    impl CallHandler for TestHandler {
        async fn handle_call(&self, method: &str, args: Vec<Value>) -> Result<Value, Value> {
            match method {
                "echo" => Ok(args.into_iter().next().unwrap_or(Value::Null)),
                "fail" => Err(error_value(&DfsError::NotFound("/missing".to_string()))),
                other => Err(error_value(&DfsError::Remote(format!(
                    "unexpected method {}",
                    other
                )))),
            }
        }
    }

    async fn started_skeleton() -> Skeleton {
        let mut skeleton = Skeleton::with_address(
            &TEST_INTERFACE,
            Arc::new(TestHandler),
            SocketAddr::from(([127, 0, 0, 1], 0)),
        )
        .unwrap();
        skeleton.start().await.unwrap();
        skeleton
    }

    #[tokio::test]
    async fn call_round_trips_a_value() {
        let mut skeleton = started_skeleton().await;
        let stub = RawStub::from_skeleton(&skeleton).unwrap();

        let method = TEST_INTERFACE.method("echo").unwrap();
        let result = stub.call(method, vec![json!("hello")]).await.unwrap();
        assert_eq!(result, json!("hello"));
        skeleton.stop().await;
    }

    #[tokio::test]
    async fn remote_error_kind_is_preserved() {
        let mut skeleton = started_skeleton().await;
        let stub = RawStub::from_skeleton(&skeleton).unwrap();

        let method = TEST_INTERFACE.method("fail").unwrap();
        let err = stub.call(method, vec![]).await.unwrap_err();
        assert_eq!(err, DfsError::NotFound("/missing".to_string()));
        skeleton.stop().await;
    }

    #[tokio::test]
    async fn unknown_signature_is_a_transport_fault() {
        let mut skeleton = started_skeleton().await;
        let stub = RawStub::from_skeleton(&skeleton).unwrap();

        // Argument types that resolve to no method on the interface.
        let bogus = MethodSpec {
            name: "echo",
            arg_types: &["string", "string"],
            errors: &["Remote"],
        };
        let err = stub.call(&bogus, vec![json!("a"), json!("b")]).await.unwrap_err();
        assert!(err.is_remote());
        skeleton.stop().await;
    }

    #[tokio::test]
    async fn unreachable_server_raises_remote() {
        let mut skeleton = started_skeleton().await;
        let stub = RawStub::from_skeleton(&skeleton).unwrap();
        skeleton.stop().await;

        let method = TEST_INTERFACE.method("echo").unwrap();
        let err = stub.call(method, vec![json!("x")]).await.unwrap_err();
        assert!(err.is_remote());
    }

    #[tokio::test]
    async fn stub_creation_checks_skeleton_state() {
        let skeleton = Skeleton::new(&TEST_INTERFACE, Arc::new(TestHandler)).unwrap();
        assert!(matches!(
            RawStub::from_skeleton(&skeleton),
            Err(DfsError::NotStarted(_))
        ));
        assert!(matches!(
            RawStub::from_skeleton_with_host(&skeleton, "localhost"),
            Err(DfsError::NotStarted(_))
        ));

        let mut wildcard = Skeleton::new(&TEST_INTERFACE, Arc::new(TestHandler)).unwrap();
        wildcard.start().await.unwrap();
        assert!(matches!(
            RawStub::from_skeleton(&wildcard),
            Err(DfsError::UnknownHost(_))
        ));
        let named = RawStub::from_skeleton_with_host(&wildcard, "localhost").unwrap();
        assert_eq!(named.addr().port(), wildcard.local_addr().unwrap().port());
        wildcard.stop().await;
    }

    #[tokio::test]
    async fn non_remote_interface_is_rejected() {
        assert!(matches!(
            Skeleton::new(&LOCAL_INTERFACE, Arc::new(TestHandler)),
            Err(DfsError::NotRemoteInterface(_))
        ));
        assert!(matches!(
            RawStub::from_address(&LOCAL_INTERFACE, SocketAddr::from(([127, 0, 0, 1], 9))),
            Err(DfsError::NotRemoteInterface(_))
        ));
    }

    #[tokio::test]
    async fn stubs_compare_by_interface_and_address() {
        let addr = SocketAddr::from(([127, 0, 0, 1], 4040));
        let a = RawStub::from_address(&TEST_INTERFACE, addr).unwrap();
        let b = RawStub::from_address(&TEST_INTERFACE, addr).unwrap();
        let c =
            RawStub::from_address(&TEST_INTERFACE, SocketAddr::from(([127, 0, 0, 1], 4041)))
                .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "127.0.0.1:4040");
    }

    #[tokio::test]
    async fn stopped_hook_fires_once_after_drain() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut skeleton = Skeleton::with_address(
            &TEST_INTERFACE,
            Arc::new(TestHandler),
            SocketAddr::from(([127, 0, 0, 1], 0)),
        )
        .unwrap();
        skeleton.on_stopped(move |cause| {
            tx.send(cause).unwrap();
        });
        skeleton.start().await.unwrap();
        skeleton.stop().await;
        assert_eq!(rx.try_recv().unwrap(), None);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn restart_is_not_supported() {
        let mut skeleton = started_skeleton().await;
        skeleton.stop().await;
        assert!(matches!(
            skeleton.start().await,
            Err(DfsError::IllegalState(_))
        ));
    }
}
