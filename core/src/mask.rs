//! Precomputed channel masks
//!
//! A [`ChannelMaskTable`] is built once from the channel count and shared
//! read-only for the lifetime of the service. Single-channel writes and
//! position queries borrow its canonical arrays instead of allocating.

use crate::{ChannelId, Position};

/// Canonical mask and position arrays for a fixed channel count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMaskTable {
    all_off: Vec<bool>,
    zeros: Vec<Position>,
    identity: Vec<Vec<bool>>,
}

impl ChannelMaskTable {
    /// Build the table for `channel_count` channels
    pub fn new(channel_count: usize) -> Self {
        let identity = (0..channel_count)
            .map(|id| {
                let mut mask = vec![false; channel_count];
                mask[id] = true;
                mask
            })
            .collect();

        Self {
            all_off: vec![false; channel_count],
            zeros: vec![0; channel_count],
            identity,
        }
    }

    /// Number of channels the table was built for
    pub fn channel_count(&self) -> usize {
        self.all_off.len()
    }

    /// Whether `id` names a channel of this table
    pub fn contains(&self, id: ChannelId) -> bool {
        id < self.channel_count()
    }

    /// Mask with only `id` set, or `None` if `id` is out of range
    pub fn mask_for(&self, id: ChannelId) -> Option<&[bool]> {
        self.identity.get(id).map(Vec::as_slice)
    }

    /// Mask with no channel set
    pub fn all_off(&self) -> &[bool] {
        &self.all_off
    }

    /// Position vector with every channel at zero
    pub fn zeros(&self) -> &[Position] {
        &self.zeros
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_masks() {
        for n in 0..12 {
            let table = ChannelMaskTable::new(n);
            for id in 0..n {
                let mask = table.mask_for(id).expect("mask for valid id");
                assert_eq!(mask.len(), n);
                assert_eq!(mask.iter().filter(|&&set| set).count(), 1);
                assert!(mask[id]);
            }
            assert!(table.mask_for(n).is_none());
        }
    }

    #[test]
    fn test_all_off_and_zeros() {
        let table = ChannelMaskTable::new(5);
        assert_eq!(table.all_off(), &[false; 5]);
        assert_eq!(table.zeros(), &[0; 5]);
        assert_eq!(table.channel_count(), 5);
    }

    #[test]
    fn test_shared_arrays_are_stable() {
        let table = ChannelMaskTable::new(3);
        assert!(std::ptr::eq(table.all_off(), table.all_off()));
        assert!(std::ptr::eq(table.zeros(), table.zeros()));
        assert!(std::ptr::eq(
            table.mask_for(1).unwrap(),
            table.mask_for(1).unwrap()
        ));
    }

    #[test]
    fn test_empty_table() {
        let table = ChannelMaskTable::new(0);
        assert!(table.all_off().is_empty());
        assert!(table.zeros().is_empty());
        assert!(!table.contains(0));
        assert!(table.mask_for(0).is_none());
    }
}
