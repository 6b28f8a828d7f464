//! Lock-Free State Publication
//!
//! Triple buffering between exactly one writer and one reader:
//! - The writer owns one slot, the reader owns another, the third is shared
//! - Publishing swaps the writer's slot with the shared one in one atomic op
//! - Reading swaps the shared slot in only when it holds something new
//!
//! Neither side ever waits for the other and no allocation happens after
//! construction.

use std::cell::UnsafeCell;
use std::sync::Arc;

use portable_atomic::{AtomicU8, Ordering};

/// Bits 0-1: index of the shared slot
const INDEX_MASK: u8 = 0b011;
/// Bit 2: shared slot was published since the reader last took it
const FRESH: u8 = 0b100;

struct Shared<T> {
    slots: [UnsafeCell<T>; 3],
    back: AtomicU8,
}

// Each slot is touched by at most one side at a time; ownership moves only
// through the atomic swap on `back`.
unsafe impl<T: Send> Sync for Shared<T> {}

/// Create a writer/reader pair, filling each slot with `make()`
pub fn triple_buffer<T>(mut make: impl FnMut() -> T) -> (TripleWriter<T>, TripleReader<T>) {
    let shared = Arc::new(Shared {
        slots: [
            UnsafeCell::new(make()),
            UnsafeCell::new(make()),
            UnsafeCell::new(make()),
        ],
        back: AtomicU8::new(1),
    });

    (
        TripleWriter {
            shared: Arc::clone(&shared),
            input: 0,
        },
        TripleReader { shared, output: 2 },
    )
}

/// Producer side
pub struct TripleWriter<T> {
    shared: Arc<Shared<T>>,
    input: u8,
}

impl<T> TripleWriter<T> {
    /// Slot being prepared for the next publish.
    ///
    /// Holds whatever was last swapped in, so writers must overwrite every
    /// field they care about.
    pub fn input_mut(&mut self) -> &mut T {
        // SAFETY: `input` is owned by this writer until the next publish
        unsafe { &mut *self.shared.slots[self.input as usize].get() }
    }

    /// Make the input slot visible to the reader
    pub fn publish(&mut self) {
        let former = self.shared.back.swap(self.input | FRESH, Ordering::AcqRel);
        self.input = former & INDEX_MASK;
    }
}

/// Consumer side
pub struct TripleReader<T> {
    shared: Arc<Shared<T>>,
    output: u8,
}

impl<T> TripleReader<T> {
    /// Whether a newer value was published since the last read
    pub fn has_update(&self) -> bool {
        self.shared.back.load(Ordering::Relaxed) & FRESH != 0
    }

    /// Latest published value
    pub fn read(&mut self) -> &T {
        if self.has_update() {
            let former = self.shared.back.swap(self.output, Ordering::AcqRel);
            self.output = former & INDEX_MASK;
        }
        self.peek()
    }

    /// Value from the last `read`, without checking for updates
    pub fn peek(&self) -> &T {
        // SAFETY: `output` is owned by this reader until the next swap
        unsafe { &*self.shared.slots[self.output as usize].get() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_value_visible() {
        let (_writer, mut reader) = triple_buffer(|| 7u32);
        assert!(!reader.has_update());
        assert_eq!(*reader.read(), 7);
    }

    #[test]
    fn test_publish_then_read() {
        let (mut writer, mut reader) = triple_buffer(|| 0u32);

        *writer.input_mut() = 1;
        writer.publish();
        assert!(reader.has_update());
        assert_eq!(*reader.read(), 1);
        assert!(!reader.has_update());

        // Reading again without a publish keeps the value
        assert_eq!(*reader.read(), 1);
    }

    #[test]
    fn test_reader_sees_only_latest() {
        let (mut writer, mut reader) = triple_buffer(|| 0u32);
        for v in 1..=5 {
            *writer.input_mut() = v;
            writer.publish();
        }
        assert_eq!(*reader.read(), 5);
    }

    #[test]
    fn test_cross_thread_never_torn() {
        // Every published array holds one value repeated; a torn read would mix two
        let (mut writer, mut reader) = triple_buffer(|| [0u64; 64]);

        let producer = std::thread::spawn(move || {
            for v in 1..=20_000u64 {
                writer.input_mut().fill(v);
                writer.publish();
            }
        });

        let mut last = 0;
        while last < 20_000 {
            let value = reader.read();
            let first = value[0];
            assert!(value.iter().all(|&x| x == first), "torn snapshot");
            assert!(first >= last, "went backwards");
            last = first;
        }

        producer.join().unwrap();
    }
}
