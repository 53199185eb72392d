//! Versioned load/save of the whole parameter tree.
//!
//! Layout in the store, at a configurable base offset:
//!
//! ```text
//! [version tag: 4 bytes][leaf 1][leaf 2]...[leaf k]
//! ```
//!
//! Leaf order is the registration order of the authoritative root and
//! each leaf's width is fixed at construction, so load and save always
//! agree on offsets. A tag mismatch is the regular first-boot outcome:
//! the tree falls back to defaults and `load` reports `false`.

use crate::parameter::Node;
use crate::store::ConfigStore;

/// Width of the version tag at the head of the region.
pub const VERSION_TAG_LEN: usize = 4;

pub struct VersionedStorage {
    tag: [u8; VERSION_TAG_LEN],
    base_offset: usize,
}

impl VersionedStorage {
    /// `config_version` identifies the registered schema; change it
    /// whenever a parameter's width or the registration order changes,
    /// forcing a default reset on the next boot. Only its first four
    /// bytes take part in the comparison, shorter strings are NUL
    /// padded.
    pub fn new(config_version: &str, base_offset: usize) -> Self {
        let mut tag = [0u8; VERSION_TAG_LEN];
        let bytes = config_version.as_bytes();
        let len = bytes.len().min(VERSION_TAG_LEN);
        tag[..len].copy_from_slice(&bytes[..len]);
        Self { tag, base_offset }
    }

    /// Full region size for the given root, tag and base offset
    /// included. Load and save both size the region through here.
    pub fn total_size(&self, root: &Node) -> usize {
        self.base_offset + VERSION_TAG_LEN + root.storage_size()
    }

    /// Read the tree from the store. Returns `true` when a
    /// configuration with the expected version tag was present,
    /// `false` when the tree was reset to defaults instead.
    pub fn load(&self, root: &mut Node, store: &mut dyn ConfigStore) -> bool {
        store.open_region(self.total_size(root));

        let valid = self.test_version(store);
        if valid {
            log::info!("loading configuration");
            let mut start = self.base_offset + VERSION_TAG_LEN;
            root.load_value(&mut |buf| {
                for (i, b) in buf.iter_mut().enumerate() {
                    *b = store.read_byte(start + i);
                }
                start += buf.len();
            });
        } else {
            log::info!("wrong config version, applying defaults");
            root.apply_default_value();
        }

        store.close_region();
        valid
    }

    /// Write the version tag and every leaf to the store. The saving
    /// hook fires with the computed total size before any byte is
    /// written, the saved hook after the region is released.
    pub fn save(
        &self,
        root: &Node,
        store: &mut dyn ConfigStore,
        mut saving_hook: Option<&mut (dyn FnMut(usize) + '_)>,
        mut saved_hook: Option<&mut (dyn FnMut() + '_)>,
    ) {
        let total = self.total_size(root);
        if let Some(hook) = saving_hook.as_mut() {
            hook(total);
        }

        store.open_region(total);
        log::info!("saving configuration");
        self.save_version(store);
        let mut start = self.base_offset + VERSION_TAG_LEN;
        root.store_value(&mut |buf| {
            for (i, &b) in buf.iter().enumerate() {
                store.write_byte(start + i, b);
            }
            start += buf.len();
        });
        store.close_region();

        if let Some(hook) = saved_hook.as_mut() {
            hook();
        }
    }

    fn test_version(&self, store: &mut dyn ConfigStore) -> bool {
        (0..VERSION_TAG_LEN).all(|t| store.read_byte(self.base_offset + t) == self.tag[t])
    }

    fn save_version(&self, store: &mut dyn ConfigStore) {
        for t in 0..VERSION_TAG_LEN {
            store.write_byte(self.base_offset + t, self.tag[t]);
        }
    }
}
