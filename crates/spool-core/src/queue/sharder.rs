//! Sharder: assigns a message to a processing partition at publish time.

use std::num::NonZeroU32;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::ShardId;

/// How FIFO messages are mapped to a shard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardHash {
    /// 64-bit FNV-1a over the UTF-8 bytes of the queue name.
    #[default]
    Fnv1a,
    /// Length of the queue name in UTF-16 code units. Queues whose names
    /// have the same length share a shard; kept for stores populated by
    /// older deployments.
    NameLength,
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

impl ShardHash {
    pub fn hash(self, queue_name: &str) -> u64 {
        match self {
            ShardHash::Fnv1a => queue_name.bytes().fold(FNV_OFFSET_BASIS, |h, b| {
                (h ^ u64::from(b)).wrapping_mul(FNV_PRIME)
            }),
            ShardHash::NameLength => queue_name.encode_utf16().count() as u64,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Sharder {
    count: NonZeroU32,
    hash: ShardHash,
}

impl Sharder {
    pub fn new(count: NonZeroU32, hash: ShardHash) -> Self {
        Self { count, hash }
    }

    pub fn count(&self) -> NonZeroU32 {
        self.count
    }

    /// FIFO messages of one queue always share a shard; others are spread
    /// uniformly at random.
    pub fn assign(&self, queue_name: &str, fifo: bool) -> ShardId {
        if fifo {
            self.fifo_shard(queue_name)
        } else {
            self.random_shard()
        }
    }

    pub fn fifo_shard(&self, queue_name: &str) -> ShardId {
        let shard = self.hash.hash(queue_name) % u64::from(self.count.get());
        // remainder of a u32 modulus always fits
        ShardId(shard as u32)
    }

    pub fn random_shard(&self) -> ShardId {
        ShardId(rand::thread_rng().gen_range(0..self.count.get()))
    }

    /// Every shard id, in order.
    pub fn shards(&self) -> impl Iterator<Item = ShardId> + use<> {
        (0..self.count.get()).map(ShardId)
    }
}
