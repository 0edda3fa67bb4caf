use std::cell::Cell;

use crate::reference::Region;

/// [Szudzik pairing function][szudzik-pairing].
///
/// ```text
/// (a, b) -> if (a<b) then (b^2 + a) else (a^2 + a + b)
/// ```
///
/// [szudzik-pairing]: http://szudzik.com/ElegantPairing.pdf
pub fn pairing2(a: u64, b: u64) -> u64 {
    if a < b {
        b.wrapping_mul(b).wrapping_add(a)
    } else {
        a.wrapping_mul(a).wrapping_add(a).wrapping_add(b)
    }
}

/// Pairing function for three `u64` values.
pub fn pairing3(a: u64, b: u64, c: u64) -> u64 {
    pairing2(pairing2(a, b), c)
}

/// Hash used to pick a slot in an [`OpCache`].
pub trait SlotHash {
    fn slot_hash(&self) -> u64;
}

impl SlotHash for Region {
    fn slot_hash(&self) -> u64 {
        unsigned(*self)
    }
}

impl SlotHash for (Region, Region) {
    fn slot_hash(&self) -> u64 {
        pairing2(unsigned(self.0), unsigned(self.1))
    }
}

impl SlotHash for (Region, Region, Region) {
    fn slot_hash(&self) -> u64 {
        pairing3(unsigned(self.0), unsigned(self.1), unsigned(self.2))
    }
}

fn unsigned(r: Region) -> u64 {
    // Interleave signs so that `r` and `-r` land in different slots.
    let raw = r.raw();
    ((raw.unsigned_abs() as u64) << 1) | (raw < 0) as u64
}

/// Direct-mapped, lossy operation cache.
///
/// A colliding insert evicts the previous entry. Full keys are stored, so a
/// lookup never returns a result computed for a different key.
pub struct OpCache<K, V> {
    data: Vec<Option<(K, V)>>,
    bitmask: u64,
    hits: Cell<usize>,
    misses: Cell<usize>,
}

impl<K, V> OpCache<K, V>
where
    K: SlotHash + Eq,
    V: Copy,
{
    /// Create a new cache with `2^bits` slots.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Bits should be in the range 0..=31");

        let size = 1usize << bits;
        Self {
            data: std::iter::repeat_with(|| None).take(size).collect(),
            bitmask: (size - 1) as u64,
            hits: Cell::new(0),
            misses: Cell::new(0),
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.get()
    }
    pub fn misses(&self) -> usize {
        self.misses.get()
    }

    pub fn clear(&mut self) {
        self.data.fill_with(|| None);
    }

    fn index(&self, key: &K) -> usize {
        (key.slot_hash() & self.bitmask) as usize
    }

    pub fn get(&self, key: &K) -> Option<V> {
        match &self.data[self.index(key)] {
            Some((k, v)) if k == key => {
                self.hits.set(self.hits.get() + 1);
                Some(*v)
            }
            _ => {
                self.misses.set(self.misses.get() + 1);
                None
            }
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        let index = self.index(&key);
        self.data[index] = Some((key, value));
    }
}
