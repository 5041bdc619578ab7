//! Fixed-width key encodings.
//!
//! bincode writes fixed-size byte arrays without a length prefix, so these
//! keys sort bytewise and a 16-byte parent id is a true prefix of every
//! [`ChildKey`] under it.

use uuid::Uuid;

/// `(parent_id, child_id)` composite key
pub type ChildKey = [u8; 32];

/// Big-endian sequence number key
pub type SequenceKey = [u8; 8];

/// Build a composite key for an index row under `parent`
pub fn child_key(parent: &Uuid, child: &Uuid) -> ChildKey {
    let mut key = [0u8; 32];
    key[..16].copy_from_slice(parent.as_bytes());
    key[16..].copy_from_slice(child.as_bytes());
    key
}

/// Extract the child id from a raw [`ChildKey`] returned by a prefix scan
pub fn child_id_from_key(raw: &[u8]) -> Option<Uuid> {
    if raw.len() < 32 {
        return None;
    }
    let bytes: [u8; 16] = raw[16..32].try_into().ok()?;
    Some(Uuid::from_bytes(bytes))
}

/// Ordered key for append-only logs
pub fn sequence_key(sequence: u64) -> SequenceKey {
    sequence.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_key_layout() {
        let parent = Uuid::new_v4();
        let child = Uuid::new_v4();
        let key = child_key(&parent, &child);
        assert_eq!(&key[..16], parent.as_bytes());
        assert_eq!(child_id_from_key(&key), Some(child));
    }

    #[test]
    fn test_sequence_keys_sort_numerically() {
        assert!(sequence_key(2) < sequence_key(10));
        assert!(sequence_key(255) < sequence_key(256));
    }
}
