/// Payloads at or under this size are sent as a single framed message:
/// `[len(4, big-endian)][payload]`.
pub const SINGLE_MESSAGE_LIMIT: usize = 16_380;

/// Chunk size used once a payload exceeds [`SINGLE_MESSAGE_LIMIT`]: a
/// length-only message announces the total size, then the payload follows
/// split into chunks no larger than this.
pub const CHUNK_SIZE: usize = 16_384;

/// Splits one encoded packet into the wire messages a data channel should
/// send, in order. Small payloads are a single `[len||payload]` message;
/// large payloads are a `[len]` announcement followed by fixed-size chunks.
pub fn frame_payload(payload: &[u8]) -> Vec<Vec<u8>> {
    let len_prefix = (payload.len() as u32).to_be_bytes();

    if payload.len() <= SINGLE_MESSAGE_LIMIT {
        let mut message = Vec::with_capacity(4 + payload.len());
        message.extend_from_slice(&len_prefix);
        message.extend_from_slice(payload);
        return vec![message];
    }

    let mut messages = Vec::with_capacity(1 + payload.len().div_ceil(CHUNK_SIZE));
    messages.push(len_prefix.to_vec());
    for chunk in payload.chunks(CHUNK_SIZE) {
        messages.push(chunk.to_vec());
    }
    messages
}

/// Reassembles frames on the receiving side: tracks an in-progress
/// multi-chunk payload across `feed()` calls, returning a complete payload
/// once all bytes have arrived. Mirrors the sender's framing discipline so
/// a test harness (or a non-browser client) can round-trip it.
#[derive(Default)]
pub struct FrameReassembler {
    expected_len: Option<usize>,
    buffer: Vec<u8>,
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, message: &[u8]) -> Option<Vec<u8>> {
        match self.expected_len {
            None => {
                if message.len() >= 4 && message.len() <= 4 + SINGLE_MESSAGE_LIMIT {
                    let len = u32::from_be_bytes(message[0..4].try_into().unwrap()) as usize;
                    let payload = &message[4..];
                    if payload.len() == len {
                        return Some(payload.to_vec());
                    }
                    self.expected_len = Some(len);
                    self.buffer.clear();
                    self.buffer.extend_from_slice(payload);
                } else if message.len() == 4 {
                    let len = u32::from_be_bytes(message.try_into().unwrap()) as usize;
                    self.expected_len = Some(len);
                    self.buffer.clear();
                }
                None
            }
            Some(len) => {
                self.buffer.extend_from_slice(message);
                if self.buffer.len() >= len {
                    self.expected_len = None;
                    let payload = std::mem::take(&mut self.buffer);
                    Some(payload)
                } else {
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_payload_is_one_message() {
        let payload = vec![1u8; 100];
        let messages = frame_payload(&payload);
        assert_eq!(messages.len(), 1);
        assert_eq!(&messages[0][0..4], &100u32.to_be_bytes());
    }

    #[test]
    fn large_payload_is_length_then_chunks() {
        let payload = vec![7u8; 40_000];
        let messages = frame_payload(&payload);
        assert_eq!(messages[0].len(), 4);
        assert_eq!(u32::from_be_bytes(messages[0].clone().try_into().unwrap()), 40_000);
        assert_eq!(messages.len(), 1 + 40_000usize.div_ceil(CHUNK_SIZE));
    }

    #[test]
    fn boundary_at_exactly_the_single_message_limit() {
        let payload = vec![5u8; SINGLE_MESSAGE_LIMIT];
        let messages = frame_payload(&payload);
        assert_eq!(messages.len(), 1, "exactly the limit still fits one message");
        assert_eq!(messages[0].len(), 4 + SINGLE_MESSAGE_LIMIT);
    }

    #[test]
    fn boundary_one_byte_over_the_limit_chunks() {
        let payload = vec![5u8; SINGLE_MESSAGE_LIMIT + 1];
        let messages = frame_payload(&payload);
        assert!(messages.len() > 1, "one byte over the limit takes the chunked path");
        assert_eq!(messages[0].len(), 4);
        assert_eq!(
            u32::from_be_bytes(messages[0].clone().try_into().unwrap()) as usize,
            SINGLE_MESSAGE_LIMIT + 1
        );
    }

    #[test]
    fn reassembler_round_trips_small_and_large_payloads() {
        let small = vec![3u8; 50];
        let mut reassembler = FrameReassembler::new();
        let messages = frame_payload(&small);
        let mut result = None;
        for message in &messages {
            result = reassembler.feed(message);
        }
        assert_eq!(result, Some(small));

        let large = vec![9u8; 50_000];
        let mut reassembler = FrameReassembler::new();
        let messages = frame_payload(&large);
        let mut result = None;
        for message in &messages {
            result = reassembler.feed(message);
        }
        assert_eq!(result, Some(large));
    }
}
