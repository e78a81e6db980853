//! Fixed little-endian wire types for plan exchanges.

use bytemuck::{Pod, Zeroable};

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} bytes, got {actual}"))
    }
}

/// A site count as it travels between ranks.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable, Debug, PartialEq, Eq)]
pub struct WireCount {
    pub n_le: u64,
}

impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u64).to_le(),
        }
    }

    pub fn get(&self) -> usize {
        u64::from_le(self.n_le) as usize
    }

    /// Decode a count from exactly `size_of::<WireCount>()` bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, String> {
        expect_exact_len(bytes.len(), std::mem::size_of::<WireCount>())?;
        let mut out = WireCount::zeroed();
        cast_slice_mut(std::slice::from_mut(&mut out)).copy_from_slice(bytes);
        Ok(out)
    }
}

static_assertions::assert_eq_size!(WireCount, u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_bytes_are_little_endian() {
        let c = WireCount::new(0x0102);
        let bytes = cast_slice(std::slice::from_ref(&c));
        assert_eq!(&bytes[..2], &[0x02, 0x01]);
        assert_eq!(WireCount::decode(bytes).unwrap().get(), 0x0102);
    }

    #[test]
    fn short_count_is_rejected() {
        assert!(WireCount::decode(&[1, 2, 3]).is_err());
    }
}
