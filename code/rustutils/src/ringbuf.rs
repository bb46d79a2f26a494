/// Fixed-capacity ring buffer.  Once full, every push overwrites the oldest element.  Iteration is
/// always oldest-to-newest.

pub struct RingBuffer<T> {
    buf: Vec<T>,
    capacity: usize,
    next: usize,
}

impl<T> RingBuffer<T> {
    /// The capacity must be nonzero.

    pub fn new(capacity: usize) -> RingBuffer<T> {
        assert!(capacity > 0);
        RingBuffer {
            buf: Vec::with_capacity(capacity),
            capacity,
            next: 0,
        }
    }

    pub fn push(&mut self, x: T) {
        if self.buf.len() < self.capacity {
            self.buf.push(x);
        } else {
            self.buf[self.next] = x;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() == self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        // Until the buffer wraps, `next` equals the length and the second slice is empty.
        let (older, newer) = if self.is_full() {
            (&self.buf[self.next..], &self.buf[..self.next])
        } else {
            (&self.buf[..], &self.buf[..0])
        };
        older.iter().chain(newer.iter())
    }
}

#[test]
fn test_ringbuf() {
    let mut rb = RingBuffer::new(3);
    assert!(rb.is_empty());
    rb.push(1);
    rb.push(2);
    assert!(!rb.is_full());
    assert_eq!(rb.iter().copied().collect::<Vec<i32>>(), vec![1, 2]);
    rb.push(3);
    assert!(rb.is_full());
    assert_eq!(rb.iter().copied().collect::<Vec<i32>>(), vec![1, 2, 3]);
    rb.push(4);
    rb.push(5);
    assert_eq!(rb.len(), 3);
    assert_eq!(rb.iter().copied().collect::<Vec<i32>>(), vec![3, 4, 5]);
}

#[test]
fn test_ringbuf_single_slot() {
    let mut rb = RingBuffer::new(1);
    rb.push("a");
    rb.push("b");
    assert_eq!(rb.iter().copied().collect::<Vec<&str>>(), vec!["b"]);
}
