use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dfs_lib::{DfsError, DfsPath, DfsResult};
use dfs_proto::{
    CommandStub, RegistrationDispatcher, RegistrationHandler, RegistrationStub, StorageStub,
    REGISTRATION_INTERFACE,
};
use rmi::Skeleton;
use tempfile::TempDir;

use crate::{StorageConfig, StorageServer};

type Registered = (StorageStub, CommandStub, Vec<DfsPath>);

/// Stands in for the naming server: records what registered and answers
/// with a fixed duplicates list.
struct MockRegistration {
    duplicates: Vec<DfsPath>,
    seen: Mutex<Option<Registered>>,
}

#[async_trait]
impl RegistrationHandler for MockRegistration {
    async fn register(
        &self,
        storage: StorageStub,
        command: CommandStub,
        files: Vec<DfsPath>,
    ) -> DfsResult<Vec<DfsPath>> {
        *self.seen.lock().unwrap() = Some((storage, command, files));
        Ok(self.duplicates.clone())
    }
}

struct Fixture {
    root: TempDir,
    server: StorageServer,
    registration: Skeleton,
    mock: Arc<MockRegistration>,
}

impl Fixture {
    async fn start(seed: &[(&str, &[u8])], duplicates: &[&str]) -> Fixture {
        let root = TempDir::new().unwrap();
        for (path, content) in seed {
            let local = root.path().join(path.trim_start_matches('/'));
            std::fs::create_dir_all(local.parent().unwrap()).unwrap();
            std::fs::write(local, content).unwrap();
        }

        let mock = Arc::new(MockRegistration {
            duplicates: duplicates.iter().map(|p| path(p)).collect(),
            seen: Mutex::new(None),
        });
        let mut registration = Skeleton::with_address(
            &REGISTRATION_INTERFACE,
            Arc::new(RegistrationDispatcher(mock.clone())),
            SocketAddr::from(([127, 0, 0, 1], 0)),
        )
        .unwrap();
        registration.start().await.unwrap();
        let naming = RegistrationStub::from_skeleton(&registration).unwrap();

        let mut server = StorageServer::new(StorageConfig {
            root: root.path().to_path_buf(),
            storage_addr: None,
            command_addr: None,
        })
        .unwrap();
        server.start("localhost", &naming).await.unwrap();

        Fixture {
            root,
            server,
            registration,
            mock,
        }
    }

    fn stubs(&self) -> (StorageStub, CommandStub) {
        let seen = self.mock.seen.lock().unwrap();
        let (storage, command, _) = seen.as_ref().unwrap();
        (storage.clone(), command.clone())
    }

    fn reported_files(&self) -> Vec<DfsPath> {
        let seen = self.mock.seen.lock().unwrap();
        seen.as_ref().unwrap().2.clone()
    }

    async fn shutdown(mut self) {
        self.server.stop().await;
        self.registration.stop().await;
    }
}

fn path(s: &str) -> DfsPath {
    DfsPath::parse(s).unwrap()
}

#[tokio::test]
async fn registration_reports_the_file_tree() {
    let fixture = Fixture::start(&[("/a/b", b"one"), ("/c", b"two")], &[]).await;
    let mut files = fixture.reported_files();
    files.sort();
    assert_eq!(files, vec![path("/a/b"), path("/c")]);
    fixture.shutdown().await;
}

#[tokio::test]
async fn duplicates_are_deleted_and_empty_directories_pruned() {
    let fixture = Fixture::start(
        &[("/dup/inner/file", b"x"), ("/keep", b"y")],
        &["/dup/inner/file"],
    )
    .await;
    let root = fixture.root.path();
    assert!(!root.join("dup").exists());
    assert!(root.join("keep").exists());
    fixture.shutdown().await;
}

#[tokio::test]
async fn size_and_read_follow_file_bounds() {
    let fixture = Fixture::start(&[("/f", b"hello world")], &[]).await;
    let (storage, _) = fixture.stubs();
    let f = path("/f");

    assert_eq!(storage.size(&f).await.unwrap(), 11);
    assert_eq!(storage.read(&f, 0, 11).await.unwrap(), b"hello world");
    assert_eq!(storage.read(&f, 6, 5).await.unwrap(), b"world");
    assert_eq!(storage.read(&f, 11, 0).await.unwrap(), b"");

    assert!(matches!(
        storage.read(&f, 6, 6).await,
        Err(DfsError::OutOfRange(_))
    ));
    assert!(matches!(
        storage.size(&path("/missing")).await,
        Err(DfsError::NotFound(_))
    ));
    fixture.shutdown().await;
}

#[tokio::test]
async fn write_seeks_to_offset_and_pads_past_eof() {
    let fixture = Fixture::start(&[("/f", b"hello world")], &[]).await;
    let (storage, _) = fixture.stubs();
    let f = path("/f");

    storage.write(&f, 6, b"still").await.unwrap();
    assert_eq!(storage.read(&f, 0, 11).await.unwrap(), b"hello still");

    // A write past the end zero-fills the gap.
    storage.write(&f, 13, b"!").await.unwrap();
    assert_eq!(storage.size(&f).await.unwrap(), 14);
    assert_eq!(storage.read(&f, 11, 3).await.unwrap(), b"\0\0!");

    assert!(matches!(
        storage.write(&path("/missing"), 0, b"x").await,
        Err(DfsError::NotFound(_))
    ));
    fixture.shutdown().await;
}

#[tokio::test]
async fn create_builds_parent_directories_once() {
    let fixture = Fixture::start(&[], &[]).await;
    let (storage, command) = fixture.stubs();
    let f = path("/deep/nested/file");

    assert!(command.create(&f).await.unwrap());
    assert!(!command.create(&f).await.unwrap());
    assert!(!command.create(&path("/")).await.unwrap());

    assert_eq!(storage.size(&f).await.unwrap(), 0);
    storage.write(&f, 0, b"data").await.unwrap();
    assert_eq!(storage.read(&f, 0, 4).await.unwrap(), b"data");
    fixture.shutdown().await;
}

#[tokio::test]
async fn delete_removes_files_and_whole_directories() {
    let fixture = Fixture::start(&[("/d/one", b"1"), ("/d/two", b"2"), ("/f", b"3")], &[]).await;
    let (_, command) = fixture.stubs();

    assert!(command.delete(&path("/f")).await.unwrap());
    assert!(!command.delete(&path("/f")).await.unwrap());
    assert!(command.delete(&path("/d")).await.unwrap());
    assert!(!fixture.root.path().join("d").exists());
    assert!(!command.delete(&path("/")).await.unwrap());
    fixture.shutdown().await;
}

#[tokio::test]
async fn copy_pulls_a_file_from_another_server() {
    let source = Fixture::start(&[("/shared/f", b"replicated bytes")], &[]).await;
    let dest = Fixture::start(&[], &[]).await;
    let (source_storage, _) = source.stubs();
    let (dest_storage, dest_command) = dest.stubs();
    let f = path("/shared/f");

    assert!(dest_command.copy(&f, &source_storage).await.unwrap());
    assert_eq!(
        dest_storage.read(&f, 0, 16).await.unwrap(),
        b"replicated bytes"
    );

    // Copying again overwrites the destination copy.
    source_storage.write(&f, 0, b"REPLICATED").await.unwrap();
    assert!(dest_command.copy(&f, &source_storage).await.unwrap());
    assert_eq!(
        dest_storage.read(&f, 0, 16).await.unwrap(),
        b"REPLICATED bytes"
    );

    assert!(matches!(
        dest_command.copy(&path("/missing"), &source_storage).await,
        Err(DfsError::NotFound(_))
    ));
    source.shutdown().await;
    dest.shutdown().await;
}
