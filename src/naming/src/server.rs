use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dfs_lib::{DfsError, DfsPath, DfsResult, REGISTRATION_PORT, SERVICE_PORT};
use dfs_proto::{
    CommandStub, RegistrationDispatcher, RegistrationHandler, ServiceDispatcher, ServiceHandler,
    StorageStub, REGISTRATION_INTERFACE, SERVICE_INTERFACE,
};
use log::{info, warn};
use rmi::Skeleton;
use tokio::sync::{Mutex, Notify};

use crate::replication::{desired_replicas, pick_candidate, DEFAULT_REPLICATION_FACTOR};
use crate::tree::{merge_paths, Node, StorageTarget};

/// Runtime knobs of the naming server.
#[derive(Debug, Clone)]
pub struct NamingConfig {
    pub service_addr: SocketAddr,
    pub registration_addr: SocketAddr,
    pub replication_factor: f64,
}

impl Default for NamingConfig {
    fn default() -> Self {
        NamingConfig {
            service_addr: SocketAddr::from(([0, 0, 0, 0], SERVICE_PORT)),
            registration_addr: SocketAddr::from(([0, 0, 0, 0], REGISTRATION_PORT)),
            replication_factor: DEFAULT_REPLICATION_FACTOR,
        }
    }
}

/// Everything the tree monitor protects: the directory tree and the global
/// registry of storage servers, in registration order.
pub(crate) struct NamingState {
    pub(crate) root: Node,
    pub(crate) servers: Vec<StorageTarget>,
}

/// The naming server's shared core: all tree structure, lock queues and the
/// storage registry live behind one mutex, and every queue waiter parks on
/// the one `Notify` that each release broadcasts to.
pub struct NamingCore {
    pub(crate) state: Mutex<NamingState>,
    wakeup: Notify,
    holder_seq: AtomicU64,
    alpha: f64,
}

impl NamingCore {
    pub fn new(replication_factor: f64) -> Self {
        NamingCore {
            state: Mutex::new(NamingState {
                root: Node::root(),
                servers: Vec::new(),
            }),
            wakeup: Notify::new(),
            holder_seq: AtomicU64::new(1),
            alpha: replication_factor,
        }
    }

    /// Acquires the lock on one node of the ancestor chain, suspending until
    /// the request reaches the head of the node's queue. When `target` is
    /// set this node is the end of the chain and the grant carries the
    /// replication side effects: invalidation for writers, a read-count bump
    /// and possibly one new replica for readers, both completed before the
    /// grant returns.
    async fn acquire(
        &self,
        node_path: &DfsPath,
        exclusive: bool,
        target: Option<&DfsPath>,
    ) -> DfsResult<()> {
        let holder = self.holder_seq.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock().await;

        let group = {
            let node = state
                .root
                .resolve_mut(node_path)
                .ok_or_else(|| DfsError::NotFound(format!("path does not exist: {}", node_path)))?;
            if exclusive {
                node.queue_mut().enqueue_exclusive(holder);
                holder
            } else {
                node.queue_mut().enqueue_shared(holder)
            }
        };

        loop {
            let granted = state
                .root
                .resolve(node_path)
                .ok_or_else(|| {
                    DfsError::NotFound(format!("path removed while waiting: {}", node_path))
                })?
                .queue()
                .granted(group);
            if granted {
                break;
            }
            let notified = self.wakeup.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            drop(state);
            notified.await;
            state = self.state.lock().await;
        }

        if let Some(path) = target {
            if exclusive {
                self.invalidate(&mut state, path).await;
            } else {
                self.replicate_on_read(&mut state, path).await;
            }
        }
        Ok(())
    }

    /// Deletes every replica of the file and resets its read bookkeeping.
    /// Runs under the tree monitor at the moment the writer's request
    /// reaches the queue head, so the writer is granted with no replicas in
    /// existence. Per-replica failures are logged and absorbed.
    async fn invalidate(&self, state: &mut NamingState, path: &DfsPath) {
        let replicas = match state.root.resolve_mut(path) {
            Some(Node::File(file)) => {
                file.read_count = 0;
                file.replica_count = 0;
                std::mem::take(&mut file.replicas)
            }
            _ => return,
        };
        for target in replicas {
            if let Err(e) = target.command.delete(path).await {
                warn!(
                    "naming: invalidation of {} on {} failed: {}",
                    path, target.command, e
                );
            }
        }
    }

    /// Counts one read and provisions at most one new replica when the
    /// coarsened demand exceeds what is already provisioned.
    async fn replicate_on_read(&self, state: &mut NamingState, path: &DfsPath) {
        let server_count = state.servers.len();
        let plan = match state.root.resolve_mut(path) {
            Some(Node::File(file)) => {
                file.read_count += 1;
                let desired = desired_replicas(file.read_count, self.alpha, server_count);
                if desired > file.replica_count {
                    file.replica_count = desired;
                    Some((file.primary.clone(), file.replicas.clone()))
                } else {
                    None
                }
            }
            _ => None,
        };
        let Some((primary, replicas)) = plan else {
            return;
        };
        let Some(candidate) = pick_candidate(&state.servers, &primary, &replicas).cloned() else {
            return;
        };
        match candidate.command.copy(path, &primary.storage).await {
            Ok(true) => {
                if let Some(Node::File(file)) = state.root.resolve_mut(path) {
                    file.replicas.push(candidate);
                }
            }
            Ok(false) => warn!(
                "naming: replica copy of {} to {} was refused",
                path, candidate.command
            ),
            Err(e) => warn!(
                "naming: replica copy of {} to {} failed: {}",
                path, candidate.command, e
            ),
        }
    }

    /// Locks the full ancestor chain: every strict ancestor shared, the
    /// target in the requested mode, root first. On failure the ancestors
    /// already held are released again.
    async fn lock_path(&self, path: &DfsPath, exclusive: bool) -> DfsResult<()> {
        {
            let state = self.state.lock().await;
            if state.root.resolve(path).is_none() {
                return Err(DfsError::NotFound(format!("path does not exist: {}", path)));
            }
        }
        let prefixes = path.prefixes();
        let last = prefixes.len() - 1;
        for (i, prefix) in prefixes.iter().enumerate() {
            let is_target = i == last;
            let mode = exclusive && is_target;
            let target = is_target.then_some(path);
            if let Err(err) = self.acquire(prefix, mode, target).await {
                self.unwind(&prefixes[..i]).await;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Releases the shared ancestor locks already acquired by a failed
    /// `lock_path`, deepest first.
    async fn unwind(&self, held: &[DfsPath]) {
        if held.is_empty() {
            return;
        }
        let mut state = self.state.lock().await;
        for prefix in held.iter().rev() {
            if let Some(node) = state.root.resolve_mut(prefix) {
                if let Err(e) = node.queue_mut().release_shared() {
                    warn!("naming: unwind of {} failed: {}", prefix, e);
                }
            }
        }
        self.wakeup.notify_waiters();
    }

    /// Unlocks the chain in reverse: the target in the requested mode, then
    /// each ancestor shared, leaf to root. Release never suspends; one
    /// broadcast at the end wakes every queue waiter to re-check.
    async fn unlock_path(&self, path: &DfsPath, exclusive: bool) -> DfsResult<()> {
        let mut state = self.state.lock().await;
        if state.root.resolve(path).is_none() {
            return Err(DfsError::IllegalArg(format!(
                "path does not exist: {}",
                path
            )));
        }
        let result = release_chain(&mut state, path, exclusive);
        self.wakeup.notify_waiters();
        result
    }
}

fn release_chain(state: &mut NamingState, path: &DfsPath, exclusive: bool) -> DfsResult<()> {
    {
        let node = state
            .root
            .resolve_mut(path)
            .ok_or_else(|| DfsError::IllegalArg(format!("path does not exist: {}", path)))?;
        if exclusive {
            node.queue_mut().release_exclusive()?;
        } else {
            node.queue_mut().release_shared()?;
        }
    }
    let prefixes = path.prefixes();
    for prefix in prefixes[..prefixes.len() - 1].iter().rev() {
        let node = state
            .root
            .resolve_mut(prefix)
            .ok_or_else(|| DfsError::IllegalArg(format!("path does not exist: {}", prefix)))?;
        node.queue_mut().release_shared()?;
    }
    Ok(())
}

#[async_trait]
impl ServiceHandler for NamingCore {
    async fn is_directory(&self, path: DfsPath) -> DfsResult<bool> {
        let state = self.state.lock().await;
        match state.root.resolve(&path) {
            Some(node) => Ok(node.is_dir()),
            None => Err(DfsError::NotFound(format!("path does not exist: {}", path))),
        }
    }

    async fn list(&self, path: DfsPath) -> DfsResult<Vec<String>> {
        let state = self.state.lock().await;
        match state.root.resolve(&path) {
            Some(Node::Dir(dir)) => Ok(dir.children.iter().map(|c| c.name().to_string()).collect()),
            Some(Node::File(_)) => Err(DfsError::NotFound(format!("not a directory: {}", path))),
            None => Err(DfsError::NotFound(format!("path does not exist: {}", path))),
        }
    }

    async fn create_file(&self, path: DfsPath) -> DfsResult<bool> {
        if path.is_root() {
            return Ok(false);
        }
        let parent = path.parent()?;
        let name = path.last()?.to_string();

        let mut state = self.state.lock().await;
        match state.root.resolve(&parent) {
            Some(Node::Dir(dir)) => {
                if dir.child(&name).is_some() {
                    return Ok(false);
                }
            }
            _ => {
                return Err(DfsError::NotFound(format!(
                    "parent is not a directory: {}",
                    parent
                )))
            }
        }
        let target = state
            .servers
            .first()
            .cloned()
            .ok_or_else(|| DfsError::IllegalState("no storage server registered".to_string()))?;

        // The primary creates the file before the leaf is installed.
        target.command.create(&path).await?;
        if let Some(Node::Dir(dir)) = state.root.resolve_mut(&parent) {
            dir.insert(Node::file(&name, target));
        }
        Ok(true)
    }

    async fn create_directory(&self, path: DfsPath) -> DfsResult<bool> {
        if path.is_root() {
            return Ok(false);
        }
        let parent = path.parent()?;
        let name = path.last()?.to_string();

        let mut state = self.state.lock().await;
        match state.root.resolve_mut(&parent) {
            Some(Node::Dir(dir)) => {
                if dir.child(&name).is_some() {
                    return Ok(false);
                }
                dir.insert(Node::dir(&name));
                Ok(true)
            }
            _ => Err(DfsError::NotFound(format!(
                "parent is not a directory: {}",
                parent
            ))),
        }
    }

    async fn delete(&self, path: DfsPath) -> DfsResult<bool> {
        if path.is_root() {
            return Ok(false);
        }
        let parent = path.parent()?;
        let name = path.last()?.to_string();

        let mut state = self.state.lock().await;
        let targets = {
            let node = state
                .root
                .resolve(&path)
                .ok_or_else(|| DfsError::NotFound(format!("path does not exist: {}", path)))?;
            let mut out = Vec::new();
            node.collect_targets(&mut out);
            out
        };
        // Best-effort fan-out: one faulty storage server must not block the
        // tree mutation.
        for target in targets {
            if let Err(e) = target.command.delete(&path).await {
                warn!("naming: delete of {} on {} failed: {}", path, target.command, e);
            }
        }
        if let Some(Node::Dir(dir)) = state.root.resolve_mut(&parent) {
            dir.remove_child(&name);
        }
        // Anyone queued on a node in the removed subtree must wake up and
        // observe that its path is gone.
        self.wakeup.notify_waiters();
        Ok(true)
    }

    async fn get_storage(&self, path: DfsPath) -> DfsResult<StorageStub> {
        let state = self.state.lock().await;
        match state.root.resolve(&path) {
            Some(Node::File(file)) => Ok(file.primary.storage.clone()),
            Some(Node::Dir(_)) => Err(DfsError::NotFound(format!(
                "not a file: {}",
                path
            ))),
            None => Err(DfsError::NotFound(format!("path does not exist: {}", path))),
        }
    }

    async fn lock(&self, path: DfsPath, exclusive: bool) -> DfsResult<()> {
        self.lock_path(&path, exclusive).await
    }

    async fn unlock(&self, path: DfsPath, exclusive: bool) -> DfsResult<()> {
        self.unlock_path(&path, exclusive).await
    }
}

#[async_trait]
impl RegistrationHandler for NamingCore {
    async fn register(
        &self,
        storage: StorageStub,
        command: CommandStub,
        files: Vec<DfsPath>,
    ) -> DfsResult<Vec<DfsPath>> {
        let mut state = self.state.lock().await;
        if state.servers.iter().any(|t| t.storage == storage) {
            return Err(DfsError::AlreadyRegistered(format!(
                "storage server {} is already registered",
                storage
            )));
        }
        let target = StorageTarget { storage, command };
        state.servers.push(target.clone());
        let duplicates = merge_paths(&mut state.root, &files, &target);
        info!(
            "naming: registered storage server {} with {} files, {} duplicates",
            target.storage,
            files.len(),
            duplicates.len()
        );
        Ok(duplicates)
    }
}

/// The naming server: one skeleton per interface, both dispatching into the
/// shared [`NamingCore`].
pub struct NamingServer {
    core: Arc<NamingCore>,
    service: Skeleton,
    registration: Skeleton,
}

impl NamingServer {
    pub fn new(config: NamingConfig) -> DfsResult<Self> {
        let core = Arc::new(NamingCore::new(config.replication_factor));
        let service = Skeleton::with_address(
            &SERVICE_INTERFACE,
            Arc::new(ServiceDispatcher(core.clone())),
            config.service_addr,
        )?;
        let registration = Skeleton::with_address(
            &REGISTRATION_INTERFACE,
            Arc::new(RegistrationDispatcher(core.clone())),
            config.registration_addr,
        )?;
        Ok(NamingServer {
            core,
            service,
            registration,
        })
    }

    pub async fn start(&mut self) -> DfsResult<()> {
        self.service.start().await?;
        self.registration.start().await?;
        info!(
            "naming: serving clients on {:?}, registrations on {:?}",
            self.service.local_addr(),
            self.registration.local_addr()
        );
        Ok(())
    }

    pub async fn stop(&mut self) {
        self.service.stop().await;
        self.registration.stop().await;
        info!("naming: server stopped");
    }

    pub fn core(&self) -> Arc<NamingCore> {
        self.core.clone()
    }

    pub fn service_addr(&self) -> Option<SocketAddr> {
        self.service.local_addr()
    }

    pub fn registration_addr(&self) -> Option<SocketAddr> {
        self.registration.local_addr()
    }
}
