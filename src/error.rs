//! # kTLS エラー定義
//!
//! 設定経路 (validate / ULP / 鍵設定) のエラーはすべて回復可能で、
//! 呼び出し側はユーザー空間 TLS で処理を継続できます。
//! I/O 経路のエラーは呼び出し側へそのまま返します。

use std::fmt;
use std::io;

use crate::record::{BlockedStatus, Direction, Mode, RecordType};

/// コネクションが kTLS に対応していない理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedReason {
    /// TLS 1.2 以外のバージョン
    ProtocolVersion,
    /// kTLS 非対応の暗号スイート (またはネゴシエート前)
    Cipher,
    /// 指定方向のソケットが存在しない
    NoSocket(Direction),
    /// アプリケーションがカスタム I/O を設定している
    CustomIo(Direction),
}

impl fmt::Display for UnsupportedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProtocolVersion => write!(f, "protocol version is not TLS 1.2"),
            Self::Cipher => write!(f, "negotiated cipher does not support kTLS"),
            Self::NoSocket(d) => write!(f, "no {} socket", d),
            Self::CustomIo(d) => write!(f, "{} I/O is not managed by the connection", d),
        }
    }
}

/// kTLS エラー
#[derive(Debug)]
pub enum KtlsError {
    /// kTLS 非対応プラットフォーム
    UnsupportedPlatform,
    /// ハンドシェイク未完了
    HandshakeNotComplete,
    /// コネクションの状態が kTLS に対応していない
    UnsupportedConnection(UnsupportedReason),
    /// 指定方向は既に有効化済み
    AlreadyEnabled(Direction),
    /// TCP_ULP の設定失敗
    UlpAttach(io::Error),
    /// 鍵の設定 (SOL_TLS) 失敗
    KeyInstall(io::Error),
    /// ブロック (EAGAIN / EWOULDBLOCK)
    WouldBlock(BlockedStatus),
    /// ピアがコネクションをクローズした
    Closed,
    /// 一般的な I/O エラー
    Io(io::Error),
    /// kTLS では扱えないレコードタイプ
    Unimplemented(RecordType),
    /// テスト用にソケット設定が無効化されている
    DisabledForTest,
    /// 鍵長が不正
    InvalidKeyLength,
    /// ピアのトラフィックシークレットが存在しない
    MissingSecrets(Mode),
    /// 設定ファイルのエラー
    Config(String),
}

impl KtlsError {
    /// EAGAIN 相当か (呼び出し側でリトライする)
    pub fn is_blocked(&self) -> bool {
        matches!(self, KtlsError::WouldBlock(_))
    }

    /// ピアによるクローズか
    pub fn is_closed(&self) -> bool {
        matches!(self, KtlsError::Closed)
    }

    /// 設定経路のエラーか
    ///
    /// true の場合、コネクションはユーザー空間 TLS で引き続き使用できます。
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            KtlsError::UnsupportedPlatform
                | KtlsError::HandshakeNotComplete
                | KtlsError::UnsupportedConnection(_)
                | KtlsError::AlreadyEnabled(_)
                | KtlsError::UlpAttach(_)
                | KtlsError::KeyInstall(_)
                | KtlsError::DisabledForTest
                | KtlsError::InvalidKeyLength
                | KtlsError::MissingSecrets(_)
                | KtlsError::Config(_)
        )
    }

    /// 一般 I/O エラーを生成
    pub(crate) fn io(kind: io::ErrorKind, msg: &'static str) -> Self {
        KtlsError::Io(io::Error::new(kind, msg))
    }
}

impl fmt::Display for KtlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KtlsError::UnsupportedPlatform => write!(f, "kTLS is not supported on this platform"),
            KtlsError::HandshakeNotComplete => {
                write!(f, "kTLS can only be enabled after the handshake completes")
            }
            KtlsError::UnsupportedConnection(reason) => {
                write!(f, "Connection does not support kTLS: {}", reason)
            }
            KtlsError::AlreadyEnabled(d) => write!(f, "kTLS {} is already enabled", d),
            KtlsError::UlpAttach(e) => write!(f, "Failed to attach TLS ULP: {}", e),
            KtlsError::KeyInstall(e) => write!(f, "Failed to install kTLS keys: {}", e),
            KtlsError::WouldBlock(status) => write!(f, "Operation would block ({:?})", status),
            KtlsError::Closed => write!(f, "Connection closed by peer"),
            KtlsError::Io(e) => write!(f, "I/O error: {}", e),
            KtlsError::Unimplemented(rt) => {
                write!(f, "Record type {} is not supported by kTLS", rt)
            }
            KtlsError::DisabledForTest => write!(f, "kTLS socket configuration is disabled for testing"),
            KtlsError::InvalidKeyLength => write!(f, "Invalid key length"),
            KtlsError::MissingSecrets(mode) => write!(f, "Missing {} traffic secrets", mode),
            KtlsError::Config(msg) => write!(f, "kTLS config error: {}", msg),
        }
    }
}

impl std::error::Error for KtlsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KtlsError::UlpAttach(e) | KtlsError::KeyInstall(e) | KtlsError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<KtlsError> for io::Error {
    fn from(e: KtlsError) -> Self {
        match e {
            KtlsError::Io(inner) => inner,
            KtlsError::WouldBlock(_) => io::Error::new(io::ErrorKind::WouldBlock, e.to_string()),
            KtlsError::Closed => io::Error::new(io::ErrorKind::UnexpectedEof, e.to_string()),
            KtlsError::UnsupportedPlatform => {
                io::Error::new(io::ErrorKind::Unsupported, e.to_string())
            }
            other => io::Error::new(io::ErrorKind::Other, other.to_string()),
        }
    }
}
