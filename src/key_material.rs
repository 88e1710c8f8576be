//! # 鍵マテリアル
//!
//! PRF (外部) がマスターシークレットから展開した鍵ブロックと、
//! クライアント/サーバーそれぞれの鍵へのビューを保持します。
//! IV はピアごとのシークレット (`PeerSecrets`) から取得します。
//!
//! 鍵ブロックは 1 回の鍵設定で使い切り、ドロップ時にゼロ化されます。

use std::ops::Range;

use crate::platform;

/// 鍵ブロックの最大長
///
/// 2 * (SHA-384 ダイジェスト 48 + AES-256 鍵 32 + 最大 IV 16)
pub const MAX_KEY_BLOCK_LEN: usize = 2 * (48 + 32 + 16);

// ====================
// 暗号スイート情報
// ====================

/// ネゴシエートされたレコード暗号の情報
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherInfo {
    /// 表示名
    pub name: &'static str,
    /// MAC 鍵長 (AEAD では 0)
    pub mac_key_len: usize,
    /// 暗号鍵長
    pub key_len: usize,
    /// implicit IV 長 (鍵ブロック上のサイズ)
    pub implicit_iv_len: usize,
    /// カーネルでオフロード可能か
    pub ktls_supported: bool,
}

impl CipherInfo {
    /// AES-128-GCM (kTLS 対応)
    pub const AES_128_GCM: CipherInfo = CipherInfo {
        name: "AES128-GCM",
        mac_key_len: 0,
        key_len: platform::TLS_CIPHER_AES_GCM_128_KEY_SIZE,
        implicit_iv_len: platform::TLS_CIPHER_AES_GCM_128_SALT_SIZE,
        ktls_supported: true,
    };

    /// AES-256-GCM (このクレートでは非対応)
    pub const AES_256_GCM: CipherInfo = CipherInfo {
        name: "AES256-GCM",
        mac_key_len: 0,
        key_len: 32,
        implicit_iv_len: 4,
        ktls_supported: false,
    };

    /// ChaCha20-Poly1305 (このクレートでは非対応)
    pub const CHACHA20_POLY1305: CipherInfo = CipherInfo {
        name: "CHACHA20-POLY1305",
        mac_key_len: 0,
        key_len: 32,
        implicit_iv_len: 12,
        ktls_supported: false,
    };

    /// 鍵ブロックのうち実際に使用する長さ
    pub fn key_block_len(&self) -> usize {
        2 * (self.mac_key_len + self.key_len + self.implicit_iv_len)
    }
}

// ====================
// 鍵マテリアル
// ====================

/// 展開済み鍵ブロック
///
/// レイアウト: client_mac | server_mac | client_key | server_key | client_iv | server_iv
///
/// kTLS が使用するのは鍵の 2 区間のみです。
pub struct KeyMaterial {
    key_block: [u8; MAX_KEY_BLOCK_LEN],
    client_key: Range<usize>,
    server_key: Range<usize>,
}

impl KeyMaterial {
    /// 暗号スイートのサイズに従ってビューを切り出す
    ///
    /// 鍵ブロックはゼロで初期化され、PRF が `key_block_mut()` 経由で書き込みます。
    pub fn new(cipher: &CipherInfo) -> Self {
        debug_assert!(cipher.key_block_len() <= MAX_KEY_BLOCK_LEN);

        // MAC 鍵 2 つの後ろから
        let key_start = 2 * cipher.mac_key_len;
        let client_key = key_start..key_start + cipher.key_len;
        let server_key = client_key.end..client_key.end + cipher.key_len;

        KeyMaterial {
            key_block: [0u8; MAX_KEY_BLOCK_LEN],
            client_key,
            server_key,
        }
    }

    /// PRF の出力先
    pub fn key_block_mut(&mut self) -> &mut [u8; MAX_KEY_BLOCK_LEN] {
        &mut self.key_block
    }

    pub fn client_key(&self) -> &[u8] {
        &self.key_block[self.client_key.clone()]
    }

    pub fn server_key(&self) -> &[u8] {
        &self.key_block[self.server_key.clone()]
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        secure_zero(&mut self.key_block);
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 鍵の内容は出力しない
        f.debug_struct("KeyMaterial")
            .field("client_key_len", &self.client_key.len())
            .field("server_key_len", &self.server_key.len())
            .finish_non_exhaustive()
    }
}

// ====================
// セキュアゼロ化
// ====================

/// セキュアなバイト配列のゼロ化
///
/// volatile 書き込みとメモリバリアでコンパイラ最適化を防止。
#[inline]
pub(crate) fn secure_zero(data: &mut [u8]) {
    for byte in data.iter_mut() {
        unsafe {
            std::ptr::write_volatile(byte, 0);
        }
    }
    std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
}
