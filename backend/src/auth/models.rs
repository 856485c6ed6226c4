use serde::{Deserialize, Serialize};

/// Claims of tokens issued by the account service; `sub` is the user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}
