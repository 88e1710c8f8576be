//! # プラットフォーム判定と kTLS 定数
//!
//! Linux のユーザー空間ヘッダーは kTLS の定義を公開していない
//! (glibc のバージョン依存) ため、include/uapi/linux/tls.h の値を直接定義します。
//!
//! Linux 以外ではソケットレベルの定数をすべて 0 に落とし、これらに依存する
//! 操作はシステムコールを発行する前に `UnsupportedPlatform` で失敗します。
//! 構造体のフィールドサイズはプラットフォームに関係なく同一です。

use once_cell::sync::Lazy;

// ====================
// Linux カーネル定数
// ====================

#[cfg(target_os = "linux")]
mod consts {
    /// TCP レベル
    pub const SOL_TCP: libc::c_int = 6;
    /// TCP に ULP をアタッチ
    pub const TCP_ULP: libc::c_int = 31;
    /// TLS ソケットオプションレベル
    pub const SOL_TLS: libc::c_int = 282;
    /// 送信パラメータの設定
    pub const TLS_TX: libc::c_int = 1;
    /// 受信パラメータの設定
    pub const TLS_RX: libc::c_int = 2;
    /// AES-GCM-128 暗号タイプ
    pub const TLS_CIPHER_AES_GCM_128: u16 = 51;
}

#[cfg(not(target_os = "linux"))]
mod consts {
    pub const SOL_TCP: libc::c_int = 0;
    pub const TCP_ULP: libc::c_int = 0;
    pub const SOL_TLS: libc::c_int = 0;
    pub const TLS_TX: libc::c_int = 0;
    pub const TLS_RX: libc::c_int = 0;
    pub const TLS_CIPHER_AES_GCM_128: u16 = 0;
}

pub use consts::*;

/// ULP 名 (NUL 終端込み)
pub const TLS_ULP_NAME: &[u8] = b"tls\0";

/// 送信時の cmsg タイプ
pub const TLS_SET_RECORD_TYPE: libc::c_int = 1;
/// 受信時の cmsg タイプ
pub const TLS_GET_RECORD_TYPE: libc::c_int = 2;

/// TLS 1.2 バージョン (0x0303)
pub const TLS_1_2_VERSION: u16 = 0x0303;

// フィールドサイズ定数
pub const TLS_CIPHER_AES_GCM_128_IV_SIZE: usize = 8;
pub const TLS_CIPHER_AES_GCM_128_KEY_SIZE: usize = 16;
pub const TLS_CIPHER_AES_GCM_128_SALT_SIZE: usize = 4;
pub const TLS_CIPHER_AES_GCM_128_REC_SEQ_SIZE: usize = 8;

/// kTLS がこのプラットフォームでサポートされているか
#[inline]
pub const fn is_supported_on_platform() -> bool {
    cfg!(target_os = "linux")
}

// ====================
// カーネルモジュール検出
// ====================

static KERNEL_MODULE_LOADED: Lazy<bool> = Lazy::new(check_kernel_module);

/// `tls` カーネルモジュールがロードされているかをチェック
///
/// 結果はプロセス内でキャッシュされます。
/// `Ktls::try_enable` の事前チェックでのみ使用し、`enable` 自体は参照しません。
pub fn is_kernel_module_loaded() -> bool {
    *KERNEL_MODULE_LOADED
}

fn check_kernel_module() -> bool {
    if !is_supported_on_platform() {
        return false;
    }

    // /proc/modules で tls モジュールがロードされているか確認
    match std::fs::read_to_string("/proc/modules") {
        Ok(modules) => {
            if !module_list_contains_tls(&modules) {
                ftlog::warn!("kTLS: TLS kernel module not loaded. Run 'modprobe tls' to enable.");
                return false;
            }
        }
        Err(_) => return false,
    }

    // カーネルバージョンをチェック (5.15+ 推奨)
    if let Ok(version) = std::fs::read_to_string("/proc/version") {
        if let Some((major, minor)) = parse_kernel_version(&version) {
            if major < 5 || (major == 5 && minor < 15) {
                ftlog::warn!(
                    "kTLS: Kernel version {}.{} detected. 5.15+ recommended for full kTLS support.",
                    major,
                    minor
                );
            }
        }
    }

    true
}

fn module_list_contains_tls(modules: &str) -> bool {
    modules.lines().any(|line| line.starts_with("tls "))
}

/// "/proc/version" から (major, minor) を取り出す
fn parse_kernel_version(version: &str) -> Option<(u32, u32)> {
    let ver_str = version.split_whitespace().nth(2)?;
    let mut parts = ver_str.split('.');
    let major = parts.next()?.parse::<u32>().ok()?;
    let minor = parts
        .next()?
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse::<u32>()
        .ok()?;
    Some((major, minor))
}
