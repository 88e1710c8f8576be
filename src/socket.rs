//! # kTLS ソケット設定
//!
//! 方向ごとに次の順で状態が遷移します (逆方向の遷移はありません)。
//!
//! ```text
//! Unconfigured -> Validated -> ULP 設定済み -> 鍵設定済み (有効)
//! ```
//!
//! 途中で失敗してもソケットはユーザー空間 TLS でそのまま使用できます。
//! 有効化フラグは全ステップ成功後に一度だけセットされます。

use std::io;
use std::os::unix::io::RawFd;

use crate::config::{KtlsConfig, SocketConfigMode};
use crate::connection::{retrieve_fd, KtlsConnection, KtlsState};
use crate::crypto_info::{init_crypto_info, CryptoInfo};
use crate::error::{KtlsError, UnsupportedReason};
use crate::key_material::KeyMaterial;
use crate::platform;
use crate::record::{Direction, ProtocolVersion};

// ====================
// ソケットオプション
// ====================

/// kTLS 設定で発行するソケットオプション
pub trait SocketOptions {
    /// TCP_ULP に "tls" を設定
    fn attach_ulp(&self, fd: RawFd) -> io::Result<()>;

    /// SOL_TLS に TX/RX の暗号情報を設定
    fn set_crypto_info(&self, fd: RawFd, mode: libc::c_int, info: &CryptoInfo) -> io::Result<()>;
}

/// setsockopt を発行する実装
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelSocketOptions;

impl SocketOptions for KernelSocketOptions {
    fn attach_ulp(&self, fd: RawFd) -> io::Result<()> {
        let result = unsafe {
            libc::setsockopt(
                fd,
                platform::SOL_TCP,
                platform::TCP_ULP,
                platform::TLS_ULP_NAME.as_ptr() as *const libc::c_void,
                platform::TLS_ULP_NAME.len() as libc::socklen_t,
            )
        };

        if result < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    fn set_crypto_info(&self, fd: RawFd, mode: libc::c_int, info: &CryptoInfo) -> io::Result<()> {
        let result = unsafe {
            libc::setsockopt(
                fd,
                platform::SOL_TLS,
                mode,
                info.as_ptr(),
                info.size() as libc::socklen_t,
            )
        };

        if result < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

// ====================
// オフロード状態
// ====================

/// `try_enable` の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffloadMode {
    /// ユーザー空間 TLS のみ
    Userspace,
    /// 送信のみカーネルオフロード
    SendOnly,
    /// 受信のみカーネルオフロード
    RecvOnly,
    /// 送受信両方をカーネルオフロード
    Full,
}

impl OffloadMode {
    pub fn from_state(state: &KtlsState) -> Self {
        match (state.is_enabled(Direction::Send), state.is_enabled(Direction::Recv)) {
            (false, false) => OffloadMode::Userspace,
            (true, false) => OffloadMode::SendOnly,
            (false, true) => OffloadMode::RecvOnly,
            (true, true) => OffloadMode::Full,
        }
    }
}

// ====================
// kTLS コンテキスト
// ====================

/// kTLS 設定コンテキスト
///
/// ソケット設定モードとソケットオプションの発行方法を保持します。
/// コネクションごとの状態は持たないため、複数のコネクションで共有できます。
#[derive(Debug, Clone)]
pub struct Ktls<S = KernelSocketOptions> {
    mode: SocketConfigMode,
    ops: S,
    /// カーネルモジュールの有無の判定 (既定は /proc/modules)
    module_check: fn() -> bool,
}

impl Ktls<KernelSocketOptions> {
    pub fn new() -> Self {
        Self::with_socket_options(SocketConfigMode::Kernel, KernelSocketOptions)
    }

    /// 検証のみ行い、setsockopt の直前で `DisabledForTest` を返す
    pub fn disabled_for_test() -> Self {
        Self::with_socket_options(SocketConfigMode::DisabledForTest, KernelSocketOptions)
    }

    pub fn from_config(config: &KtlsConfig) -> Self {
        Self::with_socket_options(config.socket_config, KernelSocketOptions)
    }
}

impl Default for Ktls<KernelSocketOptions> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SocketOptions> Ktls<S> {
    pub fn with_socket_options(mode: SocketConfigMode, ops: S) -> Self {
        Ktls {
            mode,
            ops,
            module_check: platform::is_kernel_module_loaded,
        }
    }

    /// `require_kernel_module` で使用する判定を差し替え
    pub fn with_module_check(mut self, check: fn() -> bool) -> Self {
        self.module_check = check;
        self
    }

    pub fn socket_config(&self) -> SocketConfigMode {
        self.mode
    }

    pub fn socket_options(&self) -> &S {
        &self.ops
    }

    /// コネクションが kTLS に対応しているかを検証
    pub fn validate<C: KtlsConnection + ?Sized>(
        &self,
        conn: &C,
        direction: Direction,
    ) -> Result<(), KtlsError> {
        if !conn.is_handshake_complete() {
            return Err(KtlsError::HandshakeNotComplete);
        }

        if conn.actual_protocol_version() != Some(ProtocolVersion::TLSv1_2) {
            return Err(KtlsError::UnsupportedConnection(
                UnsupportedReason::ProtocolVersion,
            ));
        }

        match conn.negotiated_cipher() {
            Some(cipher) if cipher.ktls_supported => {}
            _ => return Err(KtlsError::UnsupportedConnection(UnsupportedReason::Cipher)),
        }

        let io = conn.socket_io(direction).ok_or(KtlsError::UnsupportedConnection(
            UnsupportedReason::NoSocket(direction),
        ))?;
        if !io.managed {
            return Err(KtlsError::UnsupportedConnection(
                UnsupportedReason::CustomIo(direction),
            ));
        }

        Ok(())
    }

    /// 指定方向の kTLS を有効化
    ///
    /// 成功した場合のみ有効化フラグがセットされます。
    /// エラーはすべて回復可能です (`KtlsError::is_recoverable`)。
    pub fn enable<C: KtlsConnection + ?Sized>(
        &self,
        conn: &mut C,
        direction: Direction,
    ) -> Result<(), KtlsError> {
        if !platform::is_supported_on_platform() {
            return Err(KtlsError::UnsupportedPlatform);
        }

        let result = self.enable_direction(conn, direction);

        match &result {
            Ok(()) => {
                ftlog::info!(
                    "kTLS: {} offload enabled ({} connection)",
                    direction,
                    conn.mode()
                );
            }
            Err(e) => {
                ftlog::debug!("kTLS: {} offload not enabled: {}", direction, e);
            }
        }

        result
    }

    fn enable_direction<C: KtlsConnection + ?Sized>(
        &self,
        conn: &mut C,
        direction: Direction,
    ) -> Result<(), KtlsError> {
        self.validate(&*conn, direction)?;
        self.configure_socket(&*conn, direction)?;
        self.configure_connection(&*conn, direction)?;
        conn.ktls_state_mut().commit(direction)
    }

    /// 送信方向の kTLS を有効化
    pub fn enable_send<C: KtlsConnection + ?Sized>(&self, conn: &mut C) -> Result<(), KtlsError> {
        self.enable(conn, Direction::Send)
    }

    /// 受信方向の kTLS を有効化
    pub fn enable_recv<C: KtlsConnection + ?Sized>(&self, conn: &mut C) -> Result<(), KtlsError> {
        self.enable(conn, Direction::Recv)
    }

    /// 指定方向が有効化済みか
    pub fn is_enabled<C: KtlsConnection + ?Sized>(&self, conn: &C, direction: Direction) -> bool {
        conn.ktls_state().is_enabled(direction)
    }

    /// 設定で指定された方向を可能な範囲で有効化
    ///
    /// 失敗した方向はユーザー空間 TLS にフォールバックします。
    pub fn try_enable<C: KtlsConnection + ?Sized>(
        &self,
        conn: &mut C,
        config: &KtlsConfig,
    ) -> OffloadMode {
        if !config.enabled {
            return OffloadMode::from_state(conn.ktls_state());
        }

        if config.require_kernel_module
            && self.mode == SocketConfigMode::Kernel
            && !(self.module_check)()
        {
            ftlog::warn!("kTLS: kernel module not available, falling back to userspace");
            return OffloadMode::from_state(conn.ktls_state());
        }

        for direction in Direction::ALL {
            if !config.wants(direction) || conn.ktls_state().is_enabled(direction) {
                continue;
            }
            if let Err(e) = self.enable(conn, direction) {
                ftlog::warn!("kTLS: {} setup failed: {}, falling back to userspace", direction, e);
            }
        }

        OffloadMode::from_state(conn.ktls_state())
    }

    /// 鍵マテリアルから暗号情報を構築してカーネルに設定
    ///
    /// 暗号情報は成否にかかわらず設定後にゼロ化されます。
    pub fn set_keys<C: KtlsConnection + ?Sized>(
        &self,
        conn: &C,
        direction: Direction,
        key_material: &KeyMaterial,
    ) -> Result<(), KtlsError> {
        self.validate(conn, direction)?;

        let fd = retrieve_fd(conn, direction)?;
        let mut info = init_crypto_info(conn, direction, key_material)?;

        if self.mode == SocketConfigMode::DisabledForTest {
            return Err(KtlsError::DisabledForTest);
        }

        let result = self
            .ops
            .set_crypto_info(fd, direction.crypto_mode(), &info)
            .map_err(KtlsError::KeyInstall);
        info.secure_clear();
        result
    }

    fn configure_socket<C: KtlsConnection + ?Sized>(
        &self,
        conn: &C,
        direction: Direction,
    ) -> Result<(), KtlsError> {
        conn.ktls_state().ensure_disabled(direction)?;

        let fd = retrieve_fd(conn, direction)?;

        if self.mode == SocketConfigMode::DisabledForTest {
            return Err(KtlsError::DisabledForTest);
        }

        match self.ops.attach_ulp(fd) {
            Ok(()) => Ok(()),
            // 送信/受信の 2 回目の呼び出しでは ULP が既に設定されている
            Err(e) if e.raw_os_error() == Some(libc::EEXIST) => Ok(()),
            Err(e) => Err(KtlsError::UlpAttach(e)),
        }
    }

    fn configure_connection<C: KtlsConnection + ?Sized>(
        &self,
        conn: &C,
        direction: Direction,
    ) -> Result<(), KtlsError> {
        let key_material = conn.generate_key_material()?;
        self.set_keys(conn, direction, &key_material)
    }
}

// ====================
// テスト
// ====================
