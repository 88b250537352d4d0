//! Body size capping

use crate::config::ContentLength;

/// A body after capping, with the length it had before
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CappedBody {
    pub bytes: Vec<u8>,
    pub truncated: bool,
    pub original_len: u64,
}

impl CappedBody {
    /// Stored form of the body: empty payloads are "no body"
    pub fn into_option(self) -> Option<Vec<u8>> {
        if self.bytes.is_empty() {
            None
        } else {
            Some(self.bytes)
        }
    }
}

/// Keep at most `max` bytes of `body`
pub fn cap_body(body: &[u8], max: ContentLength) -> CappedBody {
    let mut capture = BodyCapture::new(max);
    capture.push(body);
    capture.finish()
}

/// Capped capture of a body that arrives in chunks
#[derive(Debug)]
pub struct BodyCapture {
    buf: Vec<u8>,
    limit: Option<usize>,
    seen: u64,
}

impl BodyCapture {
    pub fn new(max: ContentLength) -> Self {
        Self {
            buf: Vec::new(),
            limit: max.limit(),
            seen: 0,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.seen += data.len() as u64;
        let to_take = match self.limit {
            Some(limit) => limit.saturating_sub(self.buf.len()).min(data.len()),
            None => data.len(),
        };
        if to_take > 0 {
            self.buf.extend_from_slice(&data[..to_take]);
        }
    }

    /// Bytes seen so far, kept or not
    pub fn seen(&self) -> u64 {
        self.seen
    }

    /// The whole body went through `push`
    pub fn finish(self) -> CappedBody {
        let truncated = self.seen > self.buf.len() as u64;
        CappedBody {
            bytes: self.buf,
            truncated,
            original_len: self.seen,
        }
    }

    /// The body stopped before its end; what was kept is a prefix
    pub fn finish_partial(self) -> CappedBody {
        CappedBody {
            bytes: self.buf,
            truncated: true,
            original_len: self.seen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_to_the_cap_and_keeps_original_length() {
        let body: Vec<u8> = (0..2048u32).map(|i| (i % 251) as u8).collect();

        let capped = cap_body(&body, ContentLength::Bytes(1024));

        assert_eq!(capped.bytes.len(), 1024);
        assert_eq!(capped.bytes[..], body[..1024]);
        assert!(capped.truncated);
        assert_eq!(capped.original_len, 2048);
    }

    #[test]
    fn payload_at_or_below_cap_is_unchanged() {
        let body = vec![7u8; 1024];

        let exact = cap_body(&body, ContentLength::Bytes(1024));
        assert_eq!(exact.bytes, body);
        assert!(!exact.truncated);
        assert_eq!(exact.original_len, 1024);

        let below = cap_body(&body[..10], ContentLength::Bytes(1024));
        assert_eq!(below.bytes.len(), 10);
        assert!(!below.truncated);
    }

    #[test]
    fn unlimited_cap_never_truncates() {
        let body = vec![1u8; ContentLength::DEFAULT_BYTES * 2];

        let full = cap_body(&body, ContentLength::Full);
        assert!(!full.truncated);
        assert_eq!(full.bytes.len(), body.len());

        let default = cap_body(&body, ContentLength::Default);
        assert!(default.truncated);
        assert_eq!(default.bytes.len(), ContentLength::DEFAULT_BYTES);
        assert_eq!(default.original_len, body.len() as u64);
    }

    #[test]
    fn chunked_capture_matches_one_shot_cap() {
        let body: Vec<u8> = (0..300u32).map(|i| i as u8).collect();
        let mut capture = BodyCapture::new(ContentLength::Bytes(100));
        for chunk in body.chunks(64) {
            capture.push(chunk);
        }
        assert_eq!(capture.seen(), 300);
        assert_eq!(capture.finish(), cap_body(&body, ContentLength::Bytes(100)));

        let mut small = BodyCapture::new(ContentLength::Bytes(100));
        small.push(b"abc");
        small.push(b"");
        small.push(b"de");
        let small = small.finish();
        assert_eq!(small.bytes, b"abcde");
        assert!(!small.truncated);
    }

    #[test]
    fn partial_capture_is_marked_truncated() {
        let mut capture = BodyCapture::new(ContentLength::Full);
        capture.push(b"data: 1\n\n");
        let partial = capture.finish_partial();
        assert!(partial.truncated);
        assert_eq!(partial.original_len, 9);
        assert_eq!(partial.bytes, b"data: 1\n\n");
    }

    #[test]
    fn empty_body_is_stored_as_none() {
        let capped = cap_body(&[], ContentLength::Default);
        assert_eq!(capped.original_len, 0);
        assert_eq!(capped.into_option(), None);
    }
}
