#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Algo {
    SHA1,
    SHA256,
    SHA512,
}

impl Algo {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algo::SHA1 => "SHA1",
            Algo::SHA256 => "SHA256",
            Algo::SHA512 => "SHA512",
        }
    }
}
