//! # zerocopy-ktls
//!
//! TLS 1.2 レコード層の暗号化/復号を Linux カーネル (kTLS) にオフロードします。
//!
//! ハンドシェイクはユーザー空間の TLS 実装が行い、完了後に
//! 鍵マテリアルをソケットに設定します。以降はカーネルがレコードの
//! 暗号化・復号を行い、アプリケーションは平文を `sendmsg` / `recvmsg` で扱います。
//!
//! ## 有効化条件
//!
//! ```bash
//! # tls モジュールのロード
//! sudo modprobe tls
//!
//! # 確認
//! lsmod | grep tls
//! ```
//!
//! - Linux 5.15 以上を推奨
//! - TLS 1.2 + AES-128-GCM のみ対応
//! - アプリケーションがカスタム I/O を設定していないこと
//!
//! ## 使用例
//!
//! ```ignore
//! use zerocopy_ktls::{Ktls, KtlsConfig, OffloadMode};
//!
//! let config = KtlsConfig::load(Path::new("ktls.toml"))?;
//! let ktls = Ktls::from_config(&config);
//!
//! // ハンドシェイク完了後
//! match ktls.try_enable(&mut conn, &config) {
//!     OffloadMode::Full => { /* 以降は io::send / io::recv */ }
//!     _ => { /* ユーザー空間 TLS で継続 */ }
//! }
//! ```
//!
//! ## モジュール構成
//!
//! | モジュール | 内容 |
//! |------------|------|
//! | `platform` | プラットフォーム判定とカーネル定数 |
//! | `key_material` / `crypto_info` | 鍵ブロックからカーネル構造体を構築 |
//! | `socket` | ULP 設定と鍵設定 (方向ごとの状態遷移) |
//! | `cmsg` / `io` | レコードタイプ付きの送受信 |
//! | `alert` | アラートの受信バッファへの転送 |
//!
//! ログは ftlog に出力します。ロガーの初期化はアプリケーション側で行ってください。

pub mod alert;
pub mod cmsg;
pub mod config;
pub mod connection;
pub mod crypto_info;
pub mod error;
pub mod io;
pub mod key_material;
pub mod platform;
pub mod record;
pub mod socket;

pub use alert::{receive_alert, ALERT_LENGTH};
pub use cmsg::{AncillaryBuffer, ControlEntry};
pub use config::{KtlsConfig, SocketConfigMode};
pub use connection::{KtlsConnection, KtlsState, PeerSecrets, SocketIo};
pub use crypto_info::{init_crypto_info, key_owner, CryptoInfo};
pub use error::{KtlsError, UnsupportedReason};
pub use key_material::{CipherInfo, KeyMaterial};
pub use platform::is_supported_on_platform;
pub use record::{BlockedStatus, Direction, Mode, ProtocolVersion, RecordType};
pub use socket::{KernelSocketOptions, Ktls, OffloadMode, SocketOptions};
