//! JWT Token 管理
//!
//! HS256 tokens carrying the subject id and role. The secret comes from
//! `JWT_SECRET`; development runs fall back to a random per-process
//! secret, which invalidates tokens across restarts.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use serde::{Deserialize, Serialize};
use shared::types::Role;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JwtError {
    #[error("Token 生成失败: {0}")]
    Generation(String),

    #[error("Token 无效或已过期")]
    Invalid,
}

/// JWT 配置
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// 签名密钥
    pub secret: String,
    /// Token 有效期（分钟）
    pub expiration_minutes: i64,
    /// 签发者
    pub issuer: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        let secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            tracing::warn!("JWT_SECRET not set, using a random development secret");
            let bytes: [u8; 32] = rand::thread_rng().r#gen();
            hex_string(&bytes)
        });
        Self {
            secret,
            expiration_minutes: 24 * 60,
            issuer: "dispatch-server".to_string(),
        }
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject id (customer/restaurant/partner/operator id)
    pub sub: String,
    pub role: Role,
    /// 签发时间 (Unix 秒)
    pub iat: i64,
    /// 过期时间 (Unix 秒)
    pub exp: i64,
    pub iss: String,
}

/// Token 签发与校验服务
pub struct JwtService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    config: JwtConfig,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding = DecodingKey::from_secret(config.secret.as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);
        Self {
            encoding,
            decoding,
            validation,
            config,
        }
    }

    /// 为一个主体签发 token
    pub fn generate_token(&self, subject: &str, role: Role) -> Result<String, JwtError> {
        let now = chrono::Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + chrono::Duration::minutes(self.config.expiration_minutes)).timestamp(),
            iss: self.config.issuer.clone(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| JwtError::Generation(e.to_string()))
    }

    /// 校验 token 并返回 claims
    pub fn verify_token(&self, token: &str) -> Result<Claims, JwtError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|_| JwtError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService::new(JwtConfig {
            secret: "test-secret".to_string(),
            expiration_minutes: 60,
            issuer: "dispatch-server".to_string(),
        })
    }

    #[test]
    fn token_round_trip() {
        let svc = service();
        let token = svc.generate_token("p-42", Role::Partner).unwrap();
        let claims = svc.verify_token(&token).unwrap();
        assert_eq!(claims.sub, "p-42");
        assert_eq!(claims.role, Role::Partner);
        assert_eq!(claims.iss, "dispatch-server");
    }

    #[test]
    fn wrong_secret_rejected() {
        let svc = service();
        let other = JwtService::new(JwtConfig {
            secret: "other-secret".to_string(),
            expiration_minutes: 60,
            issuer: "dispatch-server".to_string(),
        });
        let token = svc.generate_token("c-1", Role::Customer).unwrap();
        assert!(matches!(other.verify_token(&token), Err(JwtError::Invalid)));
    }

    #[test]
    fn garbage_token_rejected() {
        let svc = service();
        assert!(matches!(
            svc.verify_token("not.a.token"),
            Err(JwtError::Invalid)
        ));
    }

    #[test]
    fn wrong_issuer_rejected() {
        let other = JwtService::new(JwtConfig {
            secret: "test-secret".to_string(),
            expiration_minutes: 60,
            issuer: "someone-else".to_string(),
        });
        let token = other.generate_token("c-1", Role::Customer).unwrap();
        assert!(matches!(
            service().verify_token(&token),
            Err(JwtError::Invalid)
        ));
    }
}
