use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("内部服务器错误")]
    Internal(#[from] anyhow::Error),
}

/// 处理器的 Result 类型别名
pub type Result<T> = std::result::Result<T, ServerError>;
