use rand::RngCore;

pub const SESSION_ID_BYTES: usize = 48;

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct SessionToken([u8; SESSION_ID_BYTES]);

impl SessionToken {
    pub fn new() -> Result<Self, rand::Error> {
        let mut bytes = [0; SESSION_ID_BYTES];

        rand::thread_rng().try_fill_bytes(&mut bytes)?;

        Ok(SessionToken(bytes))
    }

    pub fn drain_vec(vec: &mut Vec<u8>) -> Self {
        let mut array = [0; SESSION_ID_BYTES];
        let mut index = 0;

        for v in vec.drain(0..SESSION_ID_BYTES) {
            array[index] = v;
            index += 1;
        }

        SessionToken(array)
    }

    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl AsRef<[u8]> for SessionToken {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl From<[u8; SESSION_ID_BYTES]> for SessionToken {
    fn from(bytes: [u8; SESSION_ID_BYTES]) -> Self {
        SessionToken(bytes)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("data does not have the proper length")]
pub struct InvalidLength;

impl TryFrom<Vec<u8>> for SessionToken {
    type Error = InvalidLength;

    fn try_from(vec: Vec<u8>) -> Result<Self, Self::Error> {
        if let Ok(array) = vec.try_into() {
            Ok(SessionToken(array))
        } else {
            Err(InvalidLength)
        }
    }
}
