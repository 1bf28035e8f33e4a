/// Protocol error types for the handshake and in-band control messages
use thiserror::Error;

/// 协议错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 连接在消息完整到达前关闭
    #[error("Handshake truncated: expected {expected} bytes, connection closed")]
    Truncated { expected: usize },

    /// 消息超过允许的长度
    #[error("Handshake frame of {0} bytes exceeds the {max} byte limit", max = super::handshake::MAX_FRAME_LEN)]
    TooLarge(usize),

    /// 消息反序列化错误
    #[error("Malformed handshake: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// 协议结果类型
pub type ProtocolResult<T> = Result<T, ProtocolError>;
