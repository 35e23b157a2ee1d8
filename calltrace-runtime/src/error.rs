use crate::method::MethodId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no routine registered with id {0}")]
    NotFound(MethodId),
}
