use std::collections::VecDeque;

use dfs_lib::{DfsError, DfsResult};

/// One entry in a node's request queue.
///
/// For exclusive requests `readers` is zero; for shared requests it starts
/// at one and grows as later shared requests coalesce onto the entry. The
/// holder id is an opaque token handed out by the lock manager, not a
/// thread identity.
#[derive(Debug, Clone)]
pub struct LockRequest {
    pub holder: u64,
    pub exclusive: bool,
    pub readers: u64,
}

/// Per-node FIFO queue of lock requests with reader coalescing.
///
/// The head entry, if present, holds the node's current lock; everything
/// behind it is waiting. A shared request may only join the tail entry, so
/// no reader overtakes an earlier-arrived writer.
#[derive(Debug, Default)]
pub struct LockQueue {
    entries: VecDeque<LockRequest>,
}

impl LockQueue {
    pub fn new() -> Self {
        LockQueue {
            entries: VecDeque::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn head(&self) -> Option<&LockRequest> {
        self.entries.front()
    }

    /// Appends an exclusive request.
    pub fn enqueue_exclusive(&mut self, holder: u64) {
        self.entries.push_back(LockRequest {
            holder,
            exclusive: true,
            readers: 0,
        });
    }

    /// Appends a shared request, coalescing with the tail entry when that
    /// entry is shared. Returns the holder id of the entry the request ended
    /// up in; the request is granted once that entry reaches the head.
    pub fn enqueue_shared(&mut self, holder: u64) -> u64 {
        if let Some(tail) = self.entries.back_mut() {
            if !tail.exclusive {
                tail.readers += 1;
                return tail.holder;
            }
        }
        self.entries.push_back(LockRequest {
            holder,
            exclusive: false,
            readers: 1,
        });
        holder
    }

    /// True once the entry identified by `holder` is at the head.
    pub fn granted(&self, holder: u64) -> bool {
        self.entries
            .front()
            .map(|head| head.holder == holder)
            .unwrap_or(false)
    }

    /// Releases the exclusive lock at the head.
    pub fn release_exclusive(&mut self) -> DfsResult<()> {
        match self.entries.front() {
            Some(head) if head.exclusive => {
                self.entries.pop_front();
                Ok(())
            }
            _ => Err(DfsError::IllegalState(
                "exclusive lock is not held".to_string(),
            )),
        }
    }

    /// Releases one shared hold at the head. Returns true when the whole
    /// reader group drained and the queue advanced.
    pub fn release_shared(&mut self) -> DfsResult<bool> {
        match self.entries.front_mut() {
            Some(head) if !head.exclusive && head.readers > 0 => {
                head.readers -= 1;
                if head.readers == 0 {
                    self.entries.pop_front();
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            _ => Err(DfsError::IllegalState(
                "shared lock is not held".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_shared_request_is_granted_immediately() {
        let mut queue = LockQueue::new();
        let group = queue.enqueue_shared(1);
        assert_eq!(group, 1);
        assert!(queue.granted(1));
    }

    #[test]
    fn shared_requests_coalesce_onto_the_tail_group() {
        let mut queue = LockQueue::new();
        queue.enqueue_shared(1);
        let group = queue.enqueue_shared(2);
        assert_eq!(group, 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.head().unwrap().readers, 2);
    }

    #[test]
    fn readers_do_not_join_groups_across_a_writer() {
        let mut queue = LockQueue::new();
        queue.enqueue_shared(1);
        queue.enqueue_exclusive(2);
        let group = queue.enqueue_shared(3);
        assert_eq!(group, 3);
        assert_eq!(queue.len(), 3);
        assert!(queue.granted(1));
        assert!(!queue.granted(2));
        assert!(!queue.granted(3));
    }

    #[test]
    fn fifo_order_survives_releases() {
        let mut queue = LockQueue::new();
        queue.enqueue_shared(1);
        queue.enqueue_shared(2);
        queue.enqueue_exclusive(3);
        let group = queue.enqueue_shared(4);

        assert!(!queue.release_shared().unwrap());
        assert!(queue.release_shared().unwrap());
        assert!(queue.granted(3));
        queue.release_exclusive().unwrap();
        assert!(queue.granted(group));
        assert!(queue.release_shared().unwrap());
        assert!(queue.is_empty());
    }

    #[test]
    fn releasing_a_lock_that_is_not_held_is_an_error() {
        let mut queue = LockQueue::new();
        assert!(matches!(
            queue.release_exclusive(),
            Err(DfsError::IllegalState(_))
        ));
        assert!(matches!(
            queue.release_shared(),
            Err(DfsError::IllegalState(_))
        ));

        queue.enqueue_exclusive(1);
        assert!(matches!(
            queue.release_shared(),
            Err(DfsError::IllegalState(_))
        ));
    }
}
