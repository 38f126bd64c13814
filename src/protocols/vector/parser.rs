//! Element codec and saturating summation for vector batches.

use bytes::{Buf, BufMut, BytesMut};
use serde::Deserialize;
use std::fmt;

/// A fixed-width integer that can travel in a vector payload.
///
/// Wire encoding is little-endian.
pub trait Element: Copy + PartialOrd + fmt::Display + Send + 'static {
    /// Encoded width in bytes.
    const SIZE: usize;
    const ZERO: Self;
    const MIN: Self;
    const MAX: Self;

    /// Decode from exactly `SIZE` bytes.
    fn decode(bytes: &[u8]) -> Self;

    fn encode(self, out: &mut BytesMut);

    fn wrapping_add(self, rhs: Self) -> Self;
}

impl Element for i64 {
    const SIZE: usize = 8;
    const ZERO: Self = 0;
    const MIN: Self = i64::MIN;
    const MAX: Self = i64::MAX;

    fn decode(mut bytes: &[u8]) -> Self {
        bytes.get_i64_le()
    }

    fn encode(self, out: &mut BytesMut) {
        out.put_i64_le(self);
    }

    fn wrapping_add(self, rhs: Self) -> Self {
        i64::wrapping_add(self, rhs)
    }
}

/// Element types a worker can be configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    #[default]
    Int64,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Int64 => f.write_str("int64"),
        }
    }
}

/// Running sum that clamps on overflow.
///
/// Once an addition would leave the representable range the sum is pinned
/// to `MAX` or `MIN` and every later element is ignored, so the result is
/// not the true sum of the in-range tail.
#[derive(Debug, Clone, Copy)]
pub struct SaturatingSum<E> {
    sum: E,
    saturated: bool,
}

impl<E: Element> SaturatingSum<E> {
    pub fn new() -> Self {
        Self {
            sum: E::ZERO,
            saturated: false,
        }
    }

    pub fn push(&mut self, x: E) {
        if self.saturated {
            return;
        }
        let next = self.sum.wrapping_add(x);
        // Overflow is only possible when both operands share a sign, and
        // shows up as a result of the opposite sign.
        if x > E::ZERO && self.sum > E::ZERO && next < E::ZERO {
            self.sum = E::MAX;
            self.saturated = true;
        } else if x < E::ZERO && self.sum < E::ZERO && next >= E::ZERO {
            self.sum = E::MIN;
            self.saturated = true;
        } else {
            self.sum = next;
        }
    }

    /// Feed every complete element encoded in `bytes`.
    pub fn push_encoded(&mut self, bytes: &[u8]) {
        if self.saturated {
            return;
        }
        for chunk in bytes.chunks_exact(E::SIZE) {
            self.push(E::decode(chunk));
        }
    }

    pub fn value(&self) -> E {
        self.sum
    }

    pub fn is_saturated(&self) -> bool {
        self.saturated
    }
}

impl<E: Element> Default for SaturatingSum<E> {
    fn default() -> Self {
        Self::new()
    }
}
