//! # kTLS 暗号化情報
//!
//! TLS 1.2 ハンドシェイク完了後の鍵マテリアルから、カーネルに渡す
//! `tls12_crypto_info_aes_gcm_128` を構築します。
//!
//! ## 鍵の選択
//!
//! | ロール | 方向 | 使用する鍵 |
//! |--------|------|------------|
//! | Server | Send | server     |
//! | Server | Recv | client     |
//! | Client | Send | client     |
//! | Client | Recv | server     |

use crate::connection::{KtlsConnection, IMPLICIT_IV_LEN};
use crate::error::KtlsError;
use crate::key_material::{secure_zero, KeyMaterial};
use crate::platform::{
    TLS_1_2_VERSION, TLS_CIPHER_AES_GCM_128, TLS_CIPHER_AES_GCM_128_IV_SIZE,
    TLS_CIPHER_AES_GCM_128_KEY_SIZE, TLS_CIPHER_AES_GCM_128_REC_SEQ_SIZE,
    TLS_CIPHER_AES_GCM_128_SALT_SIZE,
};
use crate::record::{Direction, Mode};

// ====================
// Linux カーネル構造体
// ====================

/// tls_crypto_info ヘッダー
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsCryptoInfoHeader {
    /// TLS バージョン (TLS_1_2_VERSION)
    pub version: u16,
    /// 暗号タイプ (TLS_CIPHER_AES_GCM_128)
    pub cipher_type: u16,
}

/// tls12_crypto_info_aes_gcm_128
#[repr(C)]
pub struct Tls12CryptoInfoAesGcm128 {
    /// 共通ヘッダー
    pub info: TlsCryptoInfoHeader,
    /// implicit IV 先頭 8 バイト
    pub iv: [u8; TLS_CIPHER_AES_GCM_128_IV_SIZE],
    /// 暗号鍵 (16 bytes)
    pub key: [u8; TLS_CIPHER_AES_GCM_128_KEY_SIZE],
    /// implicit IV 先頭 4 バイト
    pub salt: [u8; TLS_CIPHER_AES_GCM_128_SALT_SIZE],
    /// レコードシーケンス番号 (8 bytes, big-endian)
    pub rec_seq: [u8; TLS_CIPHER_AES_GCM_128_REC_SEQ_SIZE],
}

// ====================
// CryptoInfo
// ====================

/// カーネルに渡す暗号化情報
///
/// ドロップ時に鍵フィールドをゼロ化します。
pub struct CryptoInfo {
    direction: Direction,
    inner: Tls12CryptoInfoAesGcm128,
}

impl CryptoInfo {
    /// 方向
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// 構造体への参照
    pub fn get(&self) -> &Tls12CryptoInfoAesGcm128 {
        &self.inner
    }

    /// カーネル setsockopt 用のポインタを取得
    #[inline]
    pub fn as_ptr(&self) -> *const libc::c_void {
        &self.inner as *const Tls12CryptoInfoAesGcm128 as *const libc::c_void
    }

    /// 構造体サイズを取得 (setsockopt の optlen 用)
    #[inline]
    pub fn size(&self) -> usize {
        std::mem::size_of::<Tls12CryptoInfoAesGcm128>()
    }

    /// カーネルが読むバイト列そのもの
    pub fn as_bytes(&self) -> &[u8] {
        // repr(C) でパディングなし (4 + 8 + 16 + 4 + 8)
        unsafe { std::slice::from_raw_parts(self.as_ptr() as *const u8, self.size()) }
    }

    /// 鍵データをセキュアにゼロ化
    pub fn secure_clear(&mut self) {
        secure_zero(&mut self.inner.key);
        secure_zero(&mut self.inner.salt);
        secure_zero(&mut self.inner.iv);
        secure_zero(&mut self.inner.rec_seq);
    }
}

impl Drop for CryptoInfo {
    fn drop(&mut self) {
        self.secure_clear();
    }
}

impl std::fmt::Debug for CryptoInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoInfo")
            .field("direction", &self.direction)
            .field("header", &self.inner.info)
            .finish_non_exhaustive()
    }
}

/// 指定ロール・方向で使用する鍵の所有者
#[inline]
pub fn key_owner(mode: Mode, direction: Direction) -> Mode {
    match (mode, direction) {
        (Mode::Server, Direction::Send) | (Mode::Client, Direction::Recv) => Mode::Server,
        (Mode::Client, Direction::Send) | (Mode::Server, Direction::Recv) => Mode::Client,
    }
}

// iv と salt はどちらも implicit IV の先頭から切り出す
const _: () = assert!(
    IMPLICIT_IV_LEN >= TLS_CIPHER_AES_GCM_128_IV_SIZE
        && IMPLICIT_IV_LEN >= TLS_CIPHER_AES_GCM_128_SALT_SIZE
);

/// 単一方向の CryptoInfo を構築
///
/// 鍵はログに出力しません。
pub fn init_crypto_info<C: KtlsConnection + ?Sized>(
    conn: &C,
    direction: Direction,
    key_material: &KeyMaterial,
) -> Result<CryptoInfo, KtlsError> {
    let owner = key_owner(conn.mode(), direction);

    let key = match owner {
        Mode::Server => key_material.server_key(),
        Mode::Client => key_material.client_key(),
    };
    if key.len() != TLS_CIPHER_AES_GCM_128_KEY_SIZE {
        return Err(KtlsError::InvalidKeyLength);
    }

    let secrets = conn
        .peer_secrets(owner)
        .ok_or(KtlsError::MissingSecrets(owner))?;
    let implicit_iv = &secrets.implicit_iv;

    let mut info = CryptoInfo {
        direction,
        inner: Tls12CryptoInfoAesGcm128 {
            info: TlsCryptoInfoHeader {
                version: TLS_1_2_VERSION,
                cipher_type: TLS_CIPHER_AES_GCM_128,
            },
            iv: [0u8; TLS_CIPHER_AES_GCM_128_IV_SIZE],
            key: [0u8; TLS_CIPHER_AES_GCM_128_KEY_SIZE],
            salt: [0u8; TLS_CIPHER_AES_GCM_128_SALT_SIZE],
            rec_seq: secrets.sequence_number,
        },
    };
    info.inner.key.copy_from_slice(key);
    info.inner
        .iv
        .copy_from_slice(&implicit_iv[..TLS_CIPHER_AES_GCM_128_IV_SIZE]);
    info.inner
        .salt
        .copy_from_slice(&implicit_iv[..TLS_CIPHER_AES_GCM_128_SALT_SIZE]);

    Ok(info)
}

// ====================
// テスト
// ====================
