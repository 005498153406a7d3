use std::io;

/// Types that can be read back from the body of a framed message.
pub trait Deserialize<'a>: Sized {
    /// Parses `buf`, the returned value may borrow from it.
    fn deserialize(buf: &'a mut [u8]) -> io::Result<Self>;
}
