//! # レコード層の基本型
//!
//! kTLS の設定と I/O で共通に使用する小さな列挙型を定義します。

use std::fmt;

use crate::platform;

// ====================
// レコードタイプ
// ====================

/// TLS レコードタイプ (RFC 5246 Section 6.2.1)
///
/// kTLS ではペイロードとは別に、制御メッセージ (cmsg) で 1 バイトとして運ばれます。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// ChangeCipherSpec (20)
    ChangeCipherSpec,
    /// Alert (21)
    Alert,
    /// Handshake (22)
    Handshake,
    /// ApplicationData (23)
    ApplicationData,
    /// 未知のタイプ
    Unknown(u8),
}

impl RecordType {
    /// ワイヤ上の値からインスタンスを作成
    pub fn from_u8(value: u8) -> Self {
        match value {
            20 => Self::ChangeCipherSpec,
            21 => Self::Alert,
            22 => Self::Handshake,
            23 => Self::ApplicationData,
            other => Self::Unknown(other),
        }
    }

    /// ワイヤ上の値を取得
    pub fn as_u8(self) -> u8 {
        match self {
            Self::ChangeCipherSpec => 20,
            Self::Alert => 21,
            Self::Handshake => 22,
            Self::ApplicationData => 23,
            Self::Unknown(v) => v,
        }
    }
}

impl From<u8> for RecordType {
    fn from(value: u8) -> Self {
        Self::from_u8(value)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChangeCipherSpec => write!(f, "change_cipher_spec"),
            Self::Alert => write!(f, "alert"),
            Self::Handshake => write!(f, "handshake"),
            Self::ApplicationData => write!(f, "application_data"),
            Self::Unknown(v) => write!(f, "unknown({})", v),
        }
    }
}

// ====================
// オフロード方向
// ====================

/// kTLS を有効化する方向
///
/// コネクションのロール (クライアント/サーバー) とは独立した軸です。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// 送信ソケット (TLS_TX)
    Send,
    /// 受信ソケット (TLS_RX)
    Recv,
}

impl Direction {
    /// 全方向
    pub const ALL: [Direction; 2] = [Direction::Send, Direction::Recv];

    /// 状態配列のインデックス
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Direction::Send => 0,
            Direction::Recv => 1,
        }
    }

    /// setsockopt(SOL_TLS, ...) に渡す TX/RX 定数
    #[inline]
    pub fn crypto_mode(self) -> libc::c_int {
        match self {
            Direction::Send => platform::TLS_TX,
            Direction::Recv => platform::TLS_RX,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Send => write!(f, "send"),
            Direction::Recv => write!(f, "recv"),
        }
    }
}

// ====================
// コネクションのロール
// ====================

/// TLS コネクションのロール
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Client,
    Server,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Client => write!(f, "client"),
            Mode::Server => write!(f, "server"),
        }
    }
}

// ====================
// プロトコルバージョン
// ====================

/// ネゴシエートされた TLS バージョン
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    SSLv3,
    TLSv1_0,
    TLSv1_1,
    TLSv1_2,
    TLSv1_3,
}

// ====================
// ブロック状態
// ====================

/// I/O 操作のブロック状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockedStatus {
    /// 読み込み待ち
    BlockedOnRead,
    /// 書き込み待ち
    BlockedOnWrite,
}
