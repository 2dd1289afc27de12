use crate::{BrickError, Result};

use md5::Digest;
use serde::{Deserialize, Serialize};

/// The whole-file checksum appended when a container is closed.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum ChecksumAlgorithm {
    None,
    Md5,
}

impl Default for ChecksumAlgorithm {
    fn default() -> Self {
        ChecksumAlgorithm::Md5
    }
}

impl ChecksumAlgorithm {
    pub fn tag(&self) -> u8 {
        match self {
            ChecksumAlgorithm::None => 0,
            ChecksumAlgorithm::Md5 => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(ChecksumAlgorithm::None),
            1 => Ok(ChecksumAlgorithm::Md5),
            other => Err(BrickError::integrity(format!(
                "unknown checksum algorithm {}",
                other
            ))),
        }
    }

    pub fn new_digest(&self) -> Box<dyn ChecksumDigest + Send> {
        match self {
            ChecksumAlgorithm::None => Box::new(NoDigest),
            ChecksumAlgorithm::Md5 => Box::new(Md5Digest(md5::Md5::new())),
        }
    }
}

/// Incremental digest over the bytes of a container.
pub trait ChecksumDigest {
    fn update(&mut self, bytes: &[u8]);
    fn finalize(self: Box<Self>) -> Vec<u8>;
}

struct NoDigest;

impl ChecksumDigest for NoDigest {
    fn update(&mut self, _bytes: &[u8]) {}

    fn finalize(self: Box<Self>) -> Vec<u8> {
        Vec::new()
    }
}

struct Md5Digest(md5::Md5);

impl ChecksumDigest for Md5Digest {
    fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        let Md5Digest(hasher) = *self;

        hasher.finalize().to_vec()
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_of_known_input() {
        let mut digest = ChecksumAlgorithm::Md5.new_digest();
        digest.update(b"The quick brown fox ");
        digest.update(b"jumps over the lazy dog");
        let bytes = digest.finalize();

        let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        assert_eq!(hex, "9e107d9d372bb6826bd81d3542a419d6");
    }

    #[test]
    fn tags_round_trip() {
        for algorithm in [ChecksumAlgorithm::None, ChecksumAlgorithm::Md5].iter() {
            assert_eq!(ChecksumAlgorithm::from_tag(algorithm.tag()).unwrap(), *algorithm);
        }
        assert!(ChecksumAlgorithm::from_tag(9).unwrap_err().is_integrity());
    }
}
