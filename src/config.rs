//! kTLS 設定
//!
//! ```toml
//! [ktls]
//! enabled = true
//! send = true
//! recv = true
//! socket_config = "kernel"       # "kernel" | "disabled_for_test"
//! require_kernel_module = true
//! ```

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::KtlsError;
use crate::record::Direction;

/// ソケット設定モード
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SocketConfigMode {
    /// setsockopt を実際に発行する
    #[default]
    Kernel,

    /// 検証のみ行い、ソケットには触れない
    ///
    /// ソケット操作の直前で `KtlsError::DisabledForTest` を返します。
    DisabledForTest,
}

impl<'de> Deserialize<'de> for SocketConfigMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_lowercase().as_str() {
            "kernel" => Ok(SocketConfigMode::Kernel),
            "disabled_for_test" | "disabled-for-test" => Ok(SocketConfigMode::DisabledForTest),
            other => Err(serde::de::Error::custom(format!(
                "unknown socket_config: '{}', expected 'kernel' or 'disabled_for_test'",
                other
            ))),
        }
    }
}

fn default_true() -> bool { true }

/// kTLS 設定
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct KtlsConfig {
    /// kTLS を使用するか
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 送信方向 (TX) を有効化
    #[serde(default = "default_true")]
    pub send: bool,

    /// 受信方向 (RX) を有効化
    #[serde(default = "default_true")]
    pub recv: bool,

    #[serde(default)]
    pub socket_config: SocketConfigMode,

    /// `tls` カーネルモジュールがロードされていない場合は試行しない
    #[serde(default = "default_true")]
    pub require_kernel_module: bool,
}

impl Default for KtlsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            send: true,
            recv: true,
            socket_config: SocketConfigMode::Kernel,
            require_kernel_module: true,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    ktls: Option<KtlsConfig>,
}

impl KtlsConfig {
    /// kTLS を完全に無効化した設定
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// 指定方向を有効化する設定か
    pub fn wants(&self, direction: Direction) -> bool {
        self.enabled
            && match direction {
                Direction::Send => self.send,
                Direction::Recv => self.recv,
            }
    }

    /// TOML 文字列から読み込み
    ///
    /// `[ktls]` セクションがない場合はデフォルト値を返します。
    pub fn from_toml_str(s: &str) -> Result<Self, KtlsError> {
        let file: ConfigFile = toml::from_str(s)
            .map_err(|e| KtlsError::Config(format!("TOML parse error: {}", e)))?;
        Ok(file.ktls.unwrap_or_default())
    }

    /// TOML ファイルから読み込み
    pub fn load(path: &Path) -> Result<Self, KtlsError> {
        let s = fs::read_to_string(path)
            .map_err(|e| KtlsError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&s)
    }
}
