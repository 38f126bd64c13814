//! Vector batch processing over a borrowed channel.

use crate::error::{WorkerError, WorkerResult};
use crate::protocols::vector::parser::{Element, ElementType, SaturatingSum};
use crate::runtime::{recv_exact, recv_full, Channel};
use bytes::BytesMut;
use tracing::{debug, trace};

/// Elements read from the socket per chunk of a vector payload.
const CHUNK_ELEMENTS: usize = 8 * 1024;

/// Outcome of a completed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    /// Number of vectors summed and answered.
    pub vectors: u32,
    /// How many of those sums were clamped.
    pub saturated: u32,
}

/// Process one batch with the element type chosen at configuration time.
pub fn process(
    element_type: ElementType,
    channel: &mut dyn Channel,
) -> WorkerResult<BatchSummary> {
    match element_type {
        ElementType::Int64 => process_batch::<i64>(channel),
    }
}

/// Read a vector count, then answer each vector with its saturating sum.
///
/// Every vector's sum is sent before the next length is read. A payload
/// that ends early is a protocol violation and gets no reply.
pub fn process_batch<E: Element>(channel: &mut dyn Channel) -> WorkerResult<BatchSummary> {
    let count = read_u32(channel, "recv number of vectors")?;
    debug!(count, "batch started");

    let mut chunk = BytesMut::zeroed(CHUNK_ELEMENTS * E::SIZE);
    let mut reply = BytesMut::with_capacity(E::SIZE);
    let mut saturated = 0;

    for index in 0..count {
        let len = read_u32(channel, "recv vector size")?;
        let expected = u64::from(len) * E::SIZE as u64;
        trace!(index, len, "vector header");

        let mut acc = SaturatingSum::<E>::new();
        let mut received = 0u64;
        while received < expected {
            let take = (expected - received).min(chunk.len() as u64) as usize;
            let n = recv_full(channel, &mut chunk[..take])
                .map_err(|e| WorkerError::connection("recv vector", e))?;
            received += n as u64;
            if n < take {
                return Err(WorkerError::Vector(format!(
                    "size mismatch: vector {index} declared {expected} bytes, received {received}"
                )));
            }
            acc.push_encoded(&chunk[..n]);
        }

        let sum = acc.value();
        if acc.is_saturated() {
            saturated += 1;
        }

        reply.clear();
        sum.encode(&mut reply);
        channel
            .write_all(&reply)
            .map_err(|e| WorkerError::connection("send result", e))?;
        debug!(index, len, %sum, saturated = acc.is_saturated(), "sent vector sum");
    }

    Ok(BatchSummary {
        vectors: count,
        saturated,
    })
}

fn read_u32(channel: &mut dyn Channel, context: &'static str) -> WorkerResult<u32> {
    let mut buf = [0u8; 4];
    recv_exact(channel, &mut buf).map_err(|e| WorkerError::connection(context, e))?;
    Ok(u32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::WriteLimited;
    use std::io::{Read, Write};
    use std::net::Shutdown;
    use std::os::unix::net::UnixStream;
    use std::thread;

    fn encode_batch(vectors: &[&[i64]]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(vectors.len() as u32).to_le_bytes());
        for v in vectors {
            out.extend_from_slice(&(v.len() as u32).to_le_bytes());
            for x in *v {
                out.extend_from_slice(&x.to_le_bytes());
            }
        }
        out
    }

    fn read_sums(peer: &mut UnixStream, count: usize) -> Vec<i64> {
        (0..count)
            .map(|_| {
                let mut buf = [0u8; 8];
                peer.read_exact(&mut buf).unwrap();
                i64::from_le_bytes(buf)
            })
            .collect()
    }

    #[test]
    fn test_single_vector() {
        let (mut peer, mut local) = UnixStream::pair().unwrap();
        peer.write_all(&encode_batch(&[&[10, 20, 30]])).unwrap();

        let summary = process(ElementType::Int64, &mut local).unwrap();
        assert_eq!(summary, BatchSummary { vectors: 1, saturated: 0 });
        assert_eq!(read_sums(&mut peer, 1), vec![60]);
    }

    #[test]
    fn test_empty_batch_sends_nothing() {
        let (mut peer, mut local) = UnixStream::pair().unwrap();
        peer.write_all(&0u32.to_le_bytes()).unwrap();

        let summary = process_batch::<i64>(&mut local).unwrap();
        assert_eq!(summary.vectors, 0);
        drop(local);

        let mut rest = Vec::new();
        peer.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());
    }

    #[test]
    fn test_mixed_vectors() {
        let (mut peer, mut local) = UnixStream::pair().unwrap();
        let batch = encode_batch(&[&[], &[i64::MAX, 1], &[i64::MIN, -1], &[-7, 3]]);
        peer.write_all(&batch).unwrap();

        let summary = process_batch::<i64>(&mut local).unwrap();
        assert_eq!(summary, BatchSummary { vectors: 4, saturated: 2 });
        assert_eq!(read_sums(&mut peer, 4), vec![0, i64::MAX, i64::MIN, -4]);
    }

    #[test]
    fn test_batch_does_not_consume_trailing_bytes() {
        let (mut peer, mut local) = UnixStream::pair().unwrap();
        let mut batch = encode_batch(&[&[1, 2]]);
        batch.extend_from_slice(b"next");
        peer.write_all(&batch).unwrap();

        process_batch::<i64>(&mut local).unwrap();
        let mut rest = [0u8; 4];
        local.read_exact(&mut rest).unwrap();
        assert_eq!(&rest, b"next");
    }

    #[test]
    fn test_vector_spanning_chunks() {
        let (mut peer, mut local) = UnixStream::pair().unwrap();
        let values: Vec<i64> = (1..=(3 * CHUNK_ELEMENTS as i64 + 5)).collect();
        let expected: i64 = values.iter().sum();

        let batch = encode_batch(&[&values]);
        let writer = thread::spawn(move || {
            peer.write_all(&batch).unwrap();
            read_sums(&mut peer, 1)
        });

        process_batch::<i64>(&mut local).unwrap();
        assert_eq!(writer.join().unwrap(), vec![expected]);
    }

    #[test]
    fn test_short_payload_is_vector_error() {
        let (mut peer, mut local) = UnixStream::pair().unwrap();
        let mut batch = Vec::new();
        batch.extend_from_slice(&1u32.to_le_bytes());
        batch.extend_from_slice(&3u32.to_le_bytes());
        batch.extend_from_slice(&10i64.to_le_bytes());
        batch.extend_from_slice(&20i64.to_le_bytes());
        peer.write_all(&batch).unwrap();
        peer.shutdown(Shutdown::Write).unwrap();

        let err = process_batch::<i64>(&mut local).unwrap_err();
        assert!(matches!(err, WorkerError::Vector(_)));
        drop(local);

        let mut rest = Vec::new();
        peer.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty(), "no reply for a short vector");
    }

    #[test]
    fn test_reply_send_failure_is_connection_error() {
        let (mut peer, local) = UnixStream::pair().unwrap();
        peer.write_all(&encode_batch(&[&[5]])).unwrap();
        let mut channel = WriteLimited::new(local, 0);

        let err = process_batch::<i64>(&mut channel).unwrap_err();
        assert!(matches!(err, WorkerError::Connection { .. }));
        assert_eq!(err.raw_os_error(), Some(libc::EPIPE));
    }

    #[test]
    fn test_missing_count_is_connection_error() {
        let (peer, mut local) = UnixStream::pair().unwrap();
        drop(peer);

        let err = process_batch::<i64>(&mut local).unwrap_err();
        assert!(matches!(err, WorkerError::Connection { .. }));
    }

    #[test]
    fn test_truncated_length_is_connection_error() {
        let (mut peer, mut local) = UnixStream::pair().unwrap();
        peer.write_all(&2u32.to_le_bytes()).unwrap();
        peer.write_all(&encode_batch(&[&[5]])[4..]).unwrap();
        peer.write_all(&[1, 0]).unwrap();
        peer.shutdown(Shutdown::Write).unwrap();

        let err = process_batch::<i64>(&mut local).unwrap_err();
        assert!(matches!(err, WorkerError::Connection { .. }));
        assert_eq!(read_sums(&mut peer, 1), vec![5]);
    }
}
