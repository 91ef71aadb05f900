/// A read/write pair of fields with identical dimensions.
///
/// Passes sample `read` and render into `write`; `swap` exchanges the two
/// identities without touching their contents.
#[derive(Debug)]
pub struct DoubleBuffer<T> {
    read: T,
    write: T,
}

impl<T> DoubleBuffer<T> {
    pub fn new(read: T, write: T) -> Self {
        Self { read, write }
    }

    /// Build both halves with the same constructor.
    pub fn from_fn(mut make: impl FnMut() -> T) -> Self {
        let read = make();
        let write = make();
        Self { read, write }
    }

    pub fn read(&self) -> &T {
        &self.read
    }

    pub fn write(&mut self) -> &mut T {
        &mut self.write
    }

    /// Shared access to the current state and exclusive access to the scratch
    /// target, for passes that read one and write the other.
    pub fn split(&mut self) -> (&T, &mut T) {
        (&self.read, &mut self.write)
    }

    pub fn swap(&mut self) {
        std::mem::swap(&mut self.read, &mut self.write);
    }

    pub fn into_inner(self) -> (T, T) {
        (self.read, self.write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::field::{Channels, Field, Filter};

    #[test]
    fn swap_exchanges_identities() {
        let mut buf = DoubleBuffer::new("a", "b");
        buf.swap();
        assert_eq!(*buf.read(), "b");
        assert_eq!(*buf.write(), "a");
    }

    #[test]
    fn double_swap_is_identity() {
        let mut buf = DoubleBuffer::new(1u32, 2u32);
        for _ in 0..5 {
            buf.swap();
            buf.swap();
            assert_eq!((*buf.read(), *buf.write()), (1, 2));
        }
    }

    #[test]
    fn swap_moves_storage_not_data() {
        let mut buf = DoubleBuffer::from_fn(|| Field::new(8, 8, Channels::Scalar, Filter::Nearest));
        buf.write().fill(1.0);
        let write_ptr = buf.write().data().as_ptr();
        buf.swap();
        assert_eq!(buf.read().data().as_ptr(), write_ptr);
        assert!(buf.read().data().iter().all(|v| *v == 1.0));
        assert!(buf.write().data().iter().all(|v| *v == 0.0));
    }
}
