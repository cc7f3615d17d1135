use cosmwasm_std::{Empty, Order, StdResult, Storage};
use cw_storage_plus::Map;

use super::TopKey;

/// A block height ordered multimap of request context IDs.
///
/// Every context is enqueued at most once: enqueueing a context again moves it to the
/// new height. Entries of one height are processed in ascending context ID order.
struct HeightQueue<'a> {
    /// (height, context ID) entries
    queue: Map<'a, (u64, &'a [u8]), Empty>,
    /// Reverse index from context ID to its current height
    heights: Map<'a, &'a [u8], u64>,
}

impl<'a> HeightQueue<'a> {
    const fn new(queue_namespace: &'a str, heights_namespace: &'a str) -> Self {
        Self {
            queue: Map::new(queue_namespace),
            heights: Map::new(heights_namespace),
        }
    }

    fn enqueue(&self, storage: &mut dyn Storage, context_id: &[u8], height: u64) -> StdResult<()> {
        if let Some(previous) = self.heights.may_load(storage, context_id)? {
            self.queue.remove(storage, (previous, context_id));
        }
        self.queue.save(storage, (height, context_id), &Empty {})?;
        self.heights.save(storage, context_id, &height)?;
        Ok(())
    }

    fn height(&self, storage: &dyn Storage, context_id: &[u8]) -> StdResult<Option<u64>> {
        self.heights.may_load(storage, context_id)
    }

    /// Removes and returns all context IDs enqueued at `height`
    fn dequeue_all(&self, storage: &mut dyn Storage, height: u64) -> StdResult<Vec<Vec<u8>>> {
        let context_ids = self
            .queue
            .prefix(height)
            .keys(storage, None, None, Order::Ascending)
            .collect::<StdResult<Vec<_>>>()?;
        for context_id in &context_ids {
            self.queue.remove(storage, (height, context_id.as_slice()));
            self.heights.remove(storage, context_id.as_slice());
        }
        Ok(context_ids)
    }
}

const NEW_BATCHES: HeightQueue = HeightQueue::new(
    TopKey::NewBatchQueue.as_str(),
    TopKey::NewBatchHeights.as_str(),
);

const EXPIRATIONS: HeightQueue = HeightQueue::new(
    TopKey::ExpirationQueue.as_str(),
    TopKey::ExpirationHeights.as_str(),
);

/// Schedules the next batch of a context at `height`
pub fn new_batch_enqueue(storage: &mut dyn Storage, context_id: &[u8], height: u64) -> StdResult<()> {
    NEW_BATCHES.enqueue(storage, context_id, height)
}

/// The height of the pending new batch of this context, if any
pub fn new_batch_height(storage: &dyn Storage, context_id: &[u8]) -> StdResult<Option<u64>> {
    NEW_BATCHES.height(storage, context_id)
}

pub fn new_batch_dequeue_all(storage: &mut dyn Storage, height: u64) -> StdResult<Vec<Vec<u8>>> {
    NEW_BATCHES.dequeue_all(storage, height)
}

/// Schedules the expiration of the running batch of a context at `height`
pub fn expiration_enqueue(storage: &mut dyn Storage, context_id: &[u8], height: u64) -> StdResult<()> {
    EXPIRATIONS.enqueue(storage, context_id, height)
}

/// The height at which the running batch of this context expires, if any
pub fn expiration_height(storage: &dyn Storage, context_id: &[u8]) -> StdResult<Option<u64>> {
    EXPIRATIONS.height(storage, context_id)
}

pub fn expiration_dequeue_all(storage: &mut dyn Storage, height: u64) -> StdResult<Vec<Vec<u8>>> {
    EXPIRATIONS.dequeue_all(storage, height)
}
