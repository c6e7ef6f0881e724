use sha1::{Digest, Sha1};

/// Lowercase hex SHA-1 of |bytes|.
pub fn sha1_hex(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

/// Running digests over the external-CV byte stream. The cv digest covers
/// every byte read from every external CV file, in the order CVs are
/// encountered during the load. The full-model digest is seeded with the
/// model document bytes and then fed the same CV bytes, so
/// `full = SHA1(modelBytes || cvBytes)`.
pub struct CvStream {
    cv: Sha1,
    full: Sha1,
}

impl CvStream {
    pub fn seeded(model_bytes: &[u8]) -> Self {
        let mut full = Sha1::new();
        full.update(model_bytes);
        Self {
            cv: Sha1::new(),
            full,
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.cv.update(bytes);
        self.full.update(bytes);
    }

    /// Consume the stream, returning (cvSHA1, fullmodelSHA1).
    pub fn finalize(self) -> (String, String) {
        (hex::encode(self.cv.finalize()), hex::encode(self.full.finalize()))
    }
}
