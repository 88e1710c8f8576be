//! # コネクション境界
//!
//! ハンドシェイク状態機械・PRF・レコード層は外部コンポーネントです。
//! このモジュールは kTLS が必要とする最小限のインターフェースを
//! [`KtlsConnection`] トレイトとして定義します。

use std::os::unix::io::RawFd;

use crate::error::KtlsError;
use crate::key_material::{CipherInfo, KeyMaterial};
use crate::record::{Direction, Mode, ProtocolVersion};

/// implicit IV バッファ長 (AEAD nonce 長)
pub const IMPLICIT_IV_LEN: usize = 12;
/// シーケンス番号長
pub const SEQUENCE_NUMBER_LEN: usize = 8;

// ====================
// ピアごとのシークレット
// ====================

/// ピア (クライアント/サーバー) ごとのレコード暗号状態
#[derive(Clone, Default)]
pub struct PeerSecrets {
    /// implicit IV (先頭 4 バイトが salt)
    pub implicit_iv: [u8; IMPLICIT_IV_LEN],
    /// 次に使用するレコードシーケンス番号 (big-endian)
    pub sequence_number: [u8; SEQUENCE_NUMBER_LEN],
}

impl PeerSecrets {
    pub fn new(implicit_iv: [u8; IMPLICIT_IV_LEN], sequence_number: u64) -> Self {
        PeerSecrets {
            implicit_iv,
            sequence_number: sequence_number.to_be_bytes(),
        }
    }
}

impl std::fmt::Debug for PeerSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSecrets")
            .field("sequence_number", &u64::from_be_bytes(self.sequence_number))
            .finish_non_exhaustive()
    }
}

// ====================
// ソケット I/O
// ====================

/// 方向ごとのソケット
///
/// fd はコネクションが所有します。このクレートは複製もクローズもしません。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketIo {
    pub fd: RawFd,
    /// false の場合はアプリケーションがカスタム I/O を設定している
    pub managed: bool,
}

impl SocketIo {
    /// コネクション管理下のソケット
    pub fn managed(fd: RawFd) -> Self {
        SocketIo { fd, managed: true }
    }

    /// アプリケーション提供のカスタム I/O
    pub fn custom(fd: RawFd) -> Self {
        SocketIo { fd, managed: false }
    }
}

// ====================
// 方向ごとの有効化状態
// ====================

/// 方向ごとの kTLS 有効化フラグ
///
/// 一度セットしたフラグは戻せません。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KtlsState {
    enabled: [bool; 2],
}

impl KtlsState {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_enabled(&self, direction: Direction) -> bool {
        self.enabled[direction.index()]
    }

    /// 未有効化であることを確認
    pub fn ensure_disabled(&self, direction: Direction) -> Result<(), KtlsError> {
        if self.is_enabled(direction) {
            return Err(KtlsError::AlreadyEnabled(direction));
        }
        Ok(())
    }

    /// 有効化をコミット
    pub(crate) fn commit(&mut self, direction: Direction) -> Result<(), KtlsError> {
        self.ensure_disabled(direction)?;
        self.enabled[direction.index()] = true;
        Ok(())
    }
}

// ====================
// コネクショントレイト
// ====================

/// kTLS が参照する TLS コネクション
///
/// 送受信を複数スレッドから同時に呼び出す場合は、呼び出し側で同期してください。
pub trait KtlsConnection {
    /// コネクションのロール
    fn mode(&self) -> Mode;

    /// ハンドシェイクが完了しているか
    fn is_handshake_complete(&self) -> bool;

    /// ネゴシエートされたプロトコルバージョン
    fn actual_protocol_version(&self) -> Option<ProtocolVersion>;

    /// ネゴシエートされたレコード暗号
    fn negotiated_cipher(&self) -> Option<CipherInfo>;

    /// 指定ピアのトラフィックシークレット
    fn peer_secrets(&self, peer: Mode) -> Option<&PeerSecrets>;

    /// 指定方向のソケット
    fn socket_io(&self, direction: Direction) -> Option<SocketIo>;

    /// PRF で鍵ブロックを展開
    fn generate_key_material(&self) -> Result<KeyMaterial, KtlsError>;

    /// kTLS 有効化状態
    fn ktls_state(&self) -> &KtlsState;

    fn ktls_state_mut(&mut self) -> &mut KtlsState;

    /// 受信バッファ (ユーザー空間のアラート処理が読む) に追記
    fn append_incoming(&mut self, data: &[u8]) -> Result<(), KtlsError>;

    /// 受信側がクローズされたことを記録
    fn mark_read_closed(&mut self) {}
}

/// 指定方向の fd を取得
pub(crate) fn retrieve_fd<C: KtlsConnection + ?Sized>(
    conn: &C,
    direction: Direction,
) -> Result<RawFd, KtlsError> {
    conn.socket_io(direction)
        .map(|io| io.fd)
        .ok_or(KtlsError::UnsupportedConnection(
            crate::error::UnsupportedReason::NoSocket(direction),
        ))
}
