//! Owned row and key buffers
//!
//! Buffers are move-only: none of these types implement `Clone`. The codec
//! consumes a [`WireBuffer`] and hands back a fresh [`OnDiskRow`]; a cursor
//! then owns that row until it is closed. Ownership transfer replaces the
//! free-and-swap dance on raw pointers.

use std::collections::TryReserveError;

/// Row or key in the self-describing wire format
#[derive(Debug, PartialEq, Eq)]
pub struct WireBuffer(Vec<u8>);

impl WireBuffer {
    /// Wrap raw wire bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        WireBuffer(bytes)
    }

    /// Borrow the bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Take the bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for WireBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        WireBuffer(bytes)
    }
}

/// Record or key in the fixed on-disk layout
#[derive(Debug, PartialEq, Eq)]
pub struct OnDiskBuffer(Vec<u8>);

impl OnDiskBuffer {
    /// Allocate a zero-filled buffer, reporting allocation failure
    pub fn zeroed(size: usize) -> Result<Self, TryReserveError> {
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(size)?;
        bytes.resize(size, 0);
        Ok(OnDiskBuffer(bytes))
    }

    /// Wrap bytes already in on-disk layout
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        OnDiskBuffer(bytes)
    }

    /// Borrow the bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Borrow the bytes mutably
    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.0
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Take the bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// A converted row: fixed record plus out-of-line blob payloads
///
/// `blobs[i]` belongs to the i-th blob field of the schema; `None` means the
/// field is null.
#[derive(Debug, PartialEq, Eq)]
pub struct OnDiskRow {
    data: OnDiskBuffer,
    blobs: Vec<Option<Vec<u8>>>,
}

impl OnDiskRow {
    /// Assemble a row
    pub fn new(data: OnDiskBuffer, blobs: Vec<Option<Vec<u8>>>) -> Self {
        Self { data, blobs }
    }

    /// Fixed-size record
    pub fn data(&self) -> &OnDiskBuffer {
        &self.data
    }

    /// Blob payloads in schema order
    pub fn blobs(&self) -> &[Option<Vec<u8>>] {
        &self.blobs
    }

    /// Split into record and blobs
    pub fn into_parts(self) -> (OnDiskBuffer, Vec<Option<Vec<u8>>>) {
        (self.data, self.blobs)
    }
}

/// Key buffer for one index slot
#[derive(Debug, PartialEq, Eq)]
pub enum KeyBuffer {
    /// Key as received from the peer
    Wire(WireBuffer),
    /// Key converted to the on-disk layout
    OnDisk(OnDiskBuffer),
}

impl KeyBuffer {
    /// Borrow the key bytes, whichever format they are in
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            KeyBuffer::Wire(buf) => buf.as_bytes(),
            KeyBuffer::OnDisk(buf) => buf.as_bytes(),
        }
    }

    /// Check if the key has been converted
    pub fn is_on_disk(&self) -> bool {
        matches!(self, KeyBuffer::OnDisk(_))
    }
}

/// Per-index key buffers for one mutation
///
/// Slot `i` belongs to index number `i`; an empty slot means the mutation
/// does not touch that index.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IndexKeys {
    slots: Vec<Option<KeyBuffer>>,
}

impl IndexKeys {
    /// No keys for any index
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from explicit slots
    pub fn from_slots(slots: Vec<Option<KeyBuffer>>) -> Self {
        Self { slots }
    }

    /// Set the wire key for an index, growing the slot list as needed
    pub fn with_wire(mut self, ix: usize, key: WireBuffer) -> Self {
        self.set(ix, KeyBuffer::Wire(key));
        self
    }

    /// Set the key for an index, growing the slot list as needed
    pub fn set(&mut self, ix: usize, key: KeyBuffer) {
        if self.slots.len() <= ix {
            self.slots.resize_with(ix + 1, || None);
        }
        self.slots[ix] = Some(key);
    }

    /// Key for an index
    pub fn get(&self, ix: usize) -> Option<&KeyBuffer> {
        self.slots.get(ix).and_then(Option::as_ref)
    }

    /// Remove and return the key for an index
    pub fn take(&mut self, ix: usize) -> Option<KeyBuffer> {
        self.slots.get_mut(ix).and_then(Option::take)
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if there are no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of slots holding a key
    pub fn present(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Iterate over slots
    pub fn iter(&self) -> impl Iterator<Item = Option<&KeyBuffer>> {
        self.slots.iter().map(Option::as_ref)
    }

    /// Take the slots
    pub fn into_slots(self) -> Vec<Option<KeyBuffer>> {
        self.slots
    }
}
