use crate::tree::StorageTarget;

/// Default fraction of registered servers that should hold a hot file.
pub const DEFAULT_REPLICATION_FACTOR: f64 = 0.3;

/// Read counts are coarsened to multiples of this bucket before the
/// replication target is computed, so replicas are provisioned in steps
/// rather than on every read.
pub const READ_BUCKET: u64 = 20;

/// Number of replicas a file's accumulated read demand calls for, capped at
/// the number of registered storage servers.
pub fn desired_replicas(read_count: u64, alpha: f64, server_count: usize) -> usize {
    let coarse = (read_count as f64 / READ_BUCKET as f64).round() * READ_BUCKET as f64;
    let desired = (alpha * coarse).floor() as usize;
    desired.min(server_count)
}

/// Picks one server to host a new replica: the first registered server that
/// holds neither the primary copy nor an existing replica. The primary is
/// never a candidate.
pub fn pick_candidate<'a>(
    servers: &'a [StorageTarget],
    primary: &StorageTarget,
    replicas: &[StorageTarget],
) -> Option<&'a StorageTarget> {
    servers.iter().find(|t| {
        t.storage != primary.storage && !replicas.iter().any(|r| r.storage == t.storage)
    })
}
