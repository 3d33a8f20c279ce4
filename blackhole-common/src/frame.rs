use core::marker::PhantomData;

/// Bounds-checked view over the bytes of one frame
///
/// The same view backs the XDP and TC programs, where the bytes are the
/// packet data between `data` and `data_end`, and user space, where they are
/// a plain slice.
#[derive(Clone, Copy)]
pub struct Frame<'a> {
    start: usize,
    end: usize,
    _bytes: PhantomData<&'a [u8]>,
}
impl<'a> Frame<'a> {
    /// # Safety
    ///
    /// You must guarantee that `start..end` stays readable for `'a`
    pub unsafe fn from_raw(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            _bytes: PhantomData,
        }
    }

    pub fn from_bytes(bytes: &'a [u8]) -> Self {
        let start = bytes.as_ptr() as usize;
        Self {
            start,
            end: start + bytes.len(),
            _bytes: PhantomData,
        }
    }

    /// Get a pointer to a `T` at `offset` if the whole `T` lies inside the frame
    ///
    /// The pointer is not necessarily aligned for `T`
    pub fn ptr_at<T>(&self, offset: usize) -> Result<*const T, PointedOutOfRange> {
        let pointed = self.start + offset;
        let len = core::mem::size_of::<T>();
        if pointed + len > self.end {
            return Err(PointedOutOfRange);
        }
        Ok(pointed as _)
    }
}

#[derive(Debug)]
pub struct PointedOutOfRange;
