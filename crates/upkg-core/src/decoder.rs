//! Obfuscation hooks applied to the raw package bytes before any read.

/// Length-preserving transform over a span of the package buffer.
///
/// `position` is the file offset of `data[0]`, so keyed schemes can stay in
/// phase when only part of the file is decoded.
pub trait BufferDecoder {
    fn decode(&self, position: usize, data: &mut [u8]);
}

/// Repeating-key XOR.
#[derive(Debug, Clone)]
pub struct XorDecoder {
    key: Vec<u8>,
}

impl XorDecoder {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    pub fn single(key: u8) -> Self {
        Self::new(vec![key])
    }
}

impl BufferDecoder for XorDecoder {
    fn decode(&self, position: usize, data: &mut [u8]) {
        if self.key.is_empty() {
            return;
        }
        let n = self.key.len();
        for (i, b) in data.iter_mut().enumerate() {
            *b ^= self.key[(position + i) % n];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_is_positional() {
        let dec = XorDecoder::new(vec![0x11, 0x22, 0x33]);
        let plain = b"abcdefgh".to_vec();

        let mut whole = plain.clone();
        dec.decode(0, &mut whole);

        let mut tail = plain[5..].to_vec();
        dec.decode(5, &mut tail);
        assert_eq!(&whole[5..], &tail[..]);

        dec.decode(0, &mut whole);
        assert_eq!(whole, plain);
    }

    #[test]
    fn empty_key_is_identity() {
        let mut data = vec![1, 2, 3];
        XorDecoder::new(Vec::new()).decode(0, &mut data);
        assert_eq!(data, vec![1, 2, 3]);
    }
}
