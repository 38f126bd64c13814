//! Connected stream endpoint used by a worker session.
//!
//! A `Channel` is an ordinary blocking `Read + Write` stream with two
//! extra socket primitives that the text framing strategies depend on:
//! a non-destructive peek and a query for the number of bytes already
//! buffered by the kernel.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

/// A connected, bidirectional, reliable byte stream.
pub trait Channel: Read + Write {
    /// Copy up to `buf.len()` pending bytes without consuming them.
    fn peek_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Number of bytes that can be read right now without blocking.
    fn pending(&mut self) -> io::Result<usize>;
}

macro_rules! impl_socket_channel {
    ($ty:ty) => {
        impl Channel for $ty {
            fn peek_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                peek_fd(self.as_raw_fd(), buf)
            }

            fn pending(&mut self) -> io::Result<usize> {
                pending_fd(self.as_raw_fd())
            }
        }
    };
}

impl_socket_channel!(TcpStream);
impl_socket_channel!(UnixStream);

/// `recv(2)` with `MSG_PEEK`.
fn peek_fd(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    // SAFETY: buf is a valid writable region of buf.len() bytes.
    let rc = unsafe {
        libc::recv(
            fd,
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
            libc::MSG_PEEK,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(rc as usize)
}

/// `ioctl(2)` with `FIONREAD`.
fn pending_fd(fd: RawFd) -> io::Result<usize> {
    let mut count: libc::c_int = 0;
    // SAFETY: FIONREAD writes a single c_int through the pointer.
    let rc = unsafe { libc::ioctl(fd, libc::FIONREAD, &mut count as *mut libc::c_int) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(count.max(0) as usize)
}

/// Read until `buf` is full or the peer closes.
///
/// Returns the number of bytes actually read, which is less than
/// `buf.len()` only when the stream reached EOF first. Errors are
/// returned as-is; nothing is retried.
pub fn recv_full(channel: &mut dyn Channel, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = channel.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Read exactly `buf.len()` bytes, treating early EOF as an error.
pub fn recv_exact(channel: &mut dyn Channel, buf: &mut [u8]) -> io::Result<()> {
    let n = recv_full(channel, buf)?;
    if n < buf.len() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("connection closed after {} of {} bytes", n, buf.len()),
        ));
    }
    Ok(())
}

/// A socket pair endpoint whose writes start failing with `EPIPE` after
/// a fixed number of successful ones. Reads are untouched.
#[cfg(test)]
pub(crate) struct WriteLimited {
    inner: UnixStream,
    writes_left: usize,
}

#[cfg(test)]
impl WriteLimited {
    pub(crate) fn new(inner: UnixStream, writes_left: usize) -> Self {
        Self { inner, writes_left }
    }
}

#[cfg(test)]
impl io::Read for WriteLimited {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut self.inner, buf)
    }
}

#[cfg(test)]
impl io::Write for WriteLimited {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.writes_left == 0 {
            return Err(io::Error::from_raw_os_error(libc::EPIPE));
        }
        self.writes_left -= 1;
        io::Write::write(&mut self.inner, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(&mut self.inner)
    }
}

#[cfg(test)]
impl Channel for WriteLimited {
    fn peek_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.peek_bytes(buf)
    }

    fn pending(&mut self) -> io::Result<usize> {
        self.inner.pending()
    }
}
