/// Opaque public identifiers
///
/// Record ids are sequential internally but exposed as salted hashid
/// strings. The encoding is bijective over assigned ids and stable across
/// restarts as long as the salt is unchanged.
use crate::error::{DirectoryError, DirectoryResult};
use harsh::Harsh;

pub struct IdCodec {
    harsh: Harsh,
}

impl IdCodec {
    pub fn new(salt: &str) -> DirectoryResult<Self> {
        let harsh = Harsh::builder()
            .salt(salt)
            .build()
            .map_err(|e| DirectoryError::Internal(format!("invalid hashid salt: {}", e)))?;

        Ok(Self { harsh })
    }

    pub fn encode(&self, id: i64) -> String {
        self.harsh.encode(&[id as u64])
    }

    pub fn decode(&self, public_id: &str) -> Option<i64> {
        self.harsh
            .decode(public_id)
            .ok()
            .and_then(|values| values.first().copied())
            .map(|value| value as i64)
    }
}
