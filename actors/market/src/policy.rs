// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::{Cid, Version};
use epik_actors_runtime::network::{EPOCHS_IN_DAY, EPOCHS_IN_HOUR};
use fvm_shared::clock::ChainEpoch;
use fvm_shared::commcid::{FIL_COMMITMENT_UNSEALED, SHA2_256_TRUNC254_PADDED};

pub mod detail {
    /// Maximum length of a deal label.
    pub const DEAL_MAX_LABEL_SIZE: usize = 256;
}

/// Width of the window over which a published deal's first cron processing is spread.
pub const DEAL_UPDATES_INTERVAL: ChainEpoch = EPOCHS_IN_DAY;

/// Delay between a sector termination and the cron tick that removes its deals.
pub const DEAL_TERMINATE_LATENCY: ChainEpoch = EPOCHS_IN_HOUR;

/// Number of winning activations a piece gets before an administrator resets it.
pub const DEFAULT_INITIAL_QUOTA: i64 = 10;

pub const PROPOSALS_AMT_BITWIDTH: u32 = 5;
pub const STATES_AMT_BITWIDTH: u32 = 6;

const PIECE_DIGEST_SIZE: u8 = 32;

/// Checks that a CID has the shape of a piece commitment.
pub fn is_piece_cid(c: &Cid) -> bool {
    c.version() == Version::V1
        && c.codec() == FIL_COMMITMENT_UNSEALED
        && c.hash().code() == SHA2_256_TRUNC254_PADDED
        && c.hash().size() == PIECE_DIGEST_SIZE
}

/// Epoch at which a terminated deal gets cleaned up, spread by deal id.
pub fn termination_process_epoch(curr_epoch: ChainEpoch, deal_id: u64) -> ChainEpoch {
    curr_epoch + DEAL_TERMINATE_LATENCY + (deal_id % DEAL_TERMINATE_LATENCY as u64) as ChainEpoch
}

#[cfg(test)]
mod tests {
    use super::*;
    use multihash::{Code, Multihash, MultihashDigest};

    #[test]
    fn piece_cid_shape() {
        let digest = [7u8; 32];
        let good = Cid::new_v1(
            FIL_COMMITMENT_UNSEALED,
            Multihash::wrap(SHA2_256_TRUNC254_PADDED, &digest).unwrap(),
        );
        assert!(is_piece_cid(&good));

        let short = Cid::new_v1(
            FIL_COMMITMENT_UNSEALED,
            Multihash::wrap(SHA2_256_TRUNC254_PADDED, &digest[..20]).unwrap(),
        );
        assert!(!is_piece_cid(&short));

        let wrong_codec = Cid::new_v1(0x71, Code::Blake2b256.digest(b"proposal"));
        assert!(!is_piece_cid(&wrong_codec));
    }

    #[test]
    fn termination_epoch_stays_within_latency_window() {
        assert_eq!(1000 + 120, termination_process_epoch(1000, 0));
        assert_eq!(1000 + 120 + 5, termination_process_epoch(1000, 125));
        assert_eq!(1000 + 239, termination_process_epoch(1000, 119));
    }
}
