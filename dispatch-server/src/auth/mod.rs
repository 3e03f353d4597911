//! 认证模块 - JWT 签发与校验
//!
//! Every surface of the engine (HTTP API and the realtime connection)
//! requires a valid token carrying the subject id and role. The realtime
//! handshake verifies the token before the WebSocket upgrade is accepted.

mod extract;
mod jwt;

pub use extract::CurrentUser;
pub use jwt::{Claims, JwtConfig, JwtError, JwtService};
