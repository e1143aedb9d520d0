use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use dfs_lib::{DfsError, DfsResult};
use log::{debug, warn};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use crate::interface::InterfaceSpec;
use crate::wire::{error_value, read_frame, write_frame, CallReply};

/// Server-side dispatch target bound to a skeleton.
///
/// Implementations match on the method name, decode the positional
/// arguments, and return either the method's result or the raised error,
/// both as self-describing JSON values.
#[async_trait]
pub trait CallHandler: Send + Sync {
    async fn handle_call(&self, method: &str, args: Vec<Value>) -> Result<Value, Value>;
}

/// Hook invoked exactly once after the skeleton has completely shut down.
pub type StoppedHook = Box<dyn FnOnce(Option<DfsError>) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
    Stopped,
}

/// A multithreaded TCP server for one remote interface.
///
/// `start` binds the listener (the OS assigns an address if none was
/// declared) and spawns one acceptor task; each accepted connection is
/// served by its own worker task for a single request/response exchange.
/// `stop` closes the listener and lets in-flight workers drain. A skeleton
/// cannot be restarted.
pub struct Skeleton {
    interface: &'static InterfaceSpec,
    handler: Arc<dyn CallHandler>,
    requested_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
    state: RunState,
    shutdown: Option<watch::Sender<bool>>,
    acceptor: Option<JoinHandle<()>>,
    on_stopped: Option<StoppedHook>,
}

impl Skeleton {
    /// Creates a skeleton with no declared address; the system picks one at
    /// `start`. Fails with `NotRemoteInterface` if any method of the
    /// interface omits the `Remote` error kind.
    pub fn new(
        interface: &'static InterfaceSpec,
        handler: Arc<dyn CallHandler>,
    ) -> DfsResult<Self> {
        interface.ensure_remote()?;
        Ok(Skeleton {
            interface,
            handler,
            requested_addr: None,
            local_addr: None,
            state: RunState::Idle,
            shutdown: None,
            acceptor: None,
            on_stopped: None,
        })
    }

    /// Creates a skeleton bound to a declared address. Used when the port
    /// number is significant, such as the naming server's well-known ports.
    pub fn with_address(
        interface: &'static InterfaceSpec,
        handler: Arc<dyn CallHandler>,
        addr: SocketAddr,
    ) -> DfsResult<Self> {
        let mut skeleton = Skeleton::new(interface, handler)?;
        skeleton.requested_addr = Some(addr);
        Ok(skeleton)
    }

    /// Installs the shutdown hook. The hook fires once, after the acceptor
    /// has exited and every in-flight worker has drained, with the error
    /// that stopped the server or `None` for an explicit `stop`.
    pub fn on_stopped(&mut self, hook: impl FnOnce(Option<DfsError>) + Send + 'static) {
        self.on_stopped = Some(Box::new(hook));
    }

    pub fn interface(&self) -> &'static InterfaceSpec {
        self.interface
    }

    /// The address declared at construction or assigned at `start`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.or(self.requested_addr)
    }

    pub fn is_started(&self) -> bool {
        self.state == RunState::Running
    }

    /// Binds the listening socket and spawns the acceptor task.
    pub async fn start(&mut self) -> DfsResult<()> {
        match self.state {
            RunState::Running => {
                return Err(DfsError::IllegalState(
                    "skeleton is already started".to_string(),
                ))
            }
            RunState::Stopped => {
                return Err(DfsError::IllegalState(
                    "skeleton cannot be restarted".to_string(),
                ))
            }
            RunState::Idle => {}
        }

        let bind_addr = self
            .requested_addr
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| DfsError::Remote(format!("bind {} failed: {}", bind_addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| DfsError::Remote(format!("local address unavailable: {}", e)))?;
        self.local_addr = Some(local_addr);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let acceptor = tokio::spawn(accept_loop(
            listener,
            self.interface,
            self.handler.clone(),
            shutdown_rx,
            self.on_stopped.take(),
        ));
        self.shutdown = Some(shutdown_tx);
        self.acceptor = Some(acceptor);
        self.state = RunState::Running;
        debug!("rmi: skeleton for {} listening on {}", self.interface.name, local_addr);
        Ok(())
    }

    /// Closes the listener and waits for the acceptor and all in-flight
    /// workers to finish. The stopped hook fires before this returns.
    pub async fn stop(&mut self) {
        if self.state != RunState::Running {
            return;
        }
        self.state = RunState::Stopped;
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(acceptor) = self.acceptor.take() {
            let _ = acceptor.await;
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    interface: &'static InterfaceSpec,
    handler: Arc<dyn CallHandler>,
    mut shutdown: watch::Receiver<bool>,
    on_stopped: Option<StoppedHook>,
) {
    let mut workers = JoinSet::new();
    let cause = loop {
        tokio::select! {
            _ = shutdown.changed() => break None,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("rmi: {} accepted connection from {}", interface.name, peer);
                    let _ = workers.spawn(serve_connection(stream, interface, handler.clone()));
                }
                Err(e) => {
                    warn!("rmi: {} listener failed: {}", interface.name, e);
                    break Some(DfsError::Remote(format!("listener failed: {}", e)));
                }
            },
        }
    };
    drop(listener);
    while workers.join_next().await.is_some() {}
    if let Some(hook) = on_stopped {
        hook(cause);
    }
}

/// One request/response exchange; the socket is closed on every exit path.
async fn serve_connection(
    mut stream: TcpStream,
    interface: &'static InterfaceSpec,
    handler: Arc<dyn CallHandler>,
) {
    if let Err(e) = serve_once(&mut stream, interface, handler).await {
        warn!("rmi: {} service worker failed: {}", interface.name, e);
    }
}

async fn serve_once(
    stream: &mut TcpStream,
    interface: &'static InterfaceSpec,
    handler: Arc<dyn CallHandler>,
) -> DfsResult<()> {
    let method: String = read_frame(stream).await?;
    let args: Vec<Value> = read_frame(stream).await?;
    let arg_types: Vec<String> = read_frame(stream).await?;

    let reply = match interface.resolve(&method, &arg_types) {
        None => CallReply::Fault(error_value(&DfsError::Remote(format!(
            "no method {}({}) on interface {}",
            method,
            arg_types.join(", "),
            interface.name
        )))),
        Some(_) => match handler.handle_call(&method, args).await {
            Ok(value) => CallReply::Return(value),
            Err(fault) => CallReply::Fault(fault),
        },
    };
    write_frame(stream, &reply).await
}
