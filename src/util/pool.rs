//! A small buffer pool amortising allocation across zlib compression calls.
//!
//! Checkout is logical: callers receive a [`PooledBuffer`] guard and the
//! buffer is returned to the pool when the guard drops, on every exit path
//! including early returns via `?` and panics during unwinding.

use std::sync::Mutex;

use once_cell::sync::OnceCell;

static POOL: OnceCell<Mutex<Vec<Vec<u8>>>> = OnceCell::new();

fn pool() -> &'static Mutex<Vec<Vec<u8>>> {
    POOL.get_or_init(|| Mutex::new(Vec::new()))
}

pub struct PooledBuffer {
    buf: Option<Vec<u8>>,
}

impl PooledBuffer {
    pub fn checkout() -> Self {
        let mut buf = pool().lock().unwrap().pop().unwrap_or_default();
        buf.clear();
        PooledBuffer { buf: Some(buf) }
    }

    pub fn as_mut(&mut self) -> &mut Vec<u8> {
        self.buf.as_mut().expect("buffer only taken on drop")
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            let mut guard = pool().lock().unwrap();
            if guard.len() < 32 {
                guard.push(buf);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_and_return() {
        {
            let mut buf = PooledBuffer::checkout();
            buf.as_mut().extend_from_slice(b"hello");
        }
        let buf = PooledBuffer::checkout();
        // Pool reuse doesn't guarantee emptiness contract beyond `clear()`
        // having been called on checkout.
        assert_eq!(buf.buf.as_ref().unwrap().len(), 0);
    }
}
