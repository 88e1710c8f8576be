//! kTLS 有効化の統合テスト

#![cfg(target_os = "linux")]

mod common;

use common::*;
use std::os::unix::io::AsRawFd;

use zerocopy_ktls::platform::{TLS_RX, TLS_TX};
use zerocopy_ktls::{
    CipherInfo, Direction, KeyMaterial, Ktls, KtlsConfig, KtlsConnection, KtlsError, Mode,
    OffloadMode, ProtocolVersion, SocketConfigMode, UnsupportedReason,
};

fn recording() -> Ktls<RecordingSocketOptions> {
    Ktls::with_socket_options(SocketConfigMode::Kernel, RecordingSocketOptions::default())
}

// ====================
// 検証
// ====================

#[test]
fn test_handshake_not_complete() {
    let ktls = Ktls::disabled_for_test();
    let (mut conn, _peer) = TestConnection::connected(Mode::Server);
    conn.handshake_complete = false;

    for direction in Direction::ALL {
        assert!(matches!(
            ktls.enable(&mut conn, direction),
            Err(KtlsError::HandshakeNotComplete)
        ));
        assert!(!ktls.is_enabled(&conn, direction));
    }
}

#[test]
fn test_unsupported_protocol_and_cipher() {
    let ktls = recording();
    let (mut conn, _peer) = TestConnection::connected(Mode::Client);

    conn.version = Some(ProtocolVersion::TLSv1_3);
    assert!(matches!(
        ktls.enable_send(&mut conn),
        Err(KtlsError::UnsupportedConnection(UnsupportedReason::ProtocolVersion))
    ));

    conn.version = Some(ProtocolVersion::TLSv1_2);
    conn.cipher = Some(CipherInfo::AES_256_GCM);
    assert!(matches!(
        ktls.enable_recv(&mut conn),
        Err(KtlsError::UnsupportedConnection(UnsupportedReason::Cipher))
    ));

    assert_eq!(ktls.socket_options().count(), 0);
}

#[test]
fn test_custom_io_is_rejected() {
    let ktls = recording();
    let (mut conn, _peer) = TestConnection::connected(Mode::Server);
    conn.custom_io = true;

    assert!(matches!(
        ktls.enable_send(&mut conn),
        Err(KtlsError::UnsupportedConnection(UnsupportedReason::CustomIo(Direction::Send)))
    ));
    assert_eq!(ktls.socket_options().count(), 0);
}

#[test]
fn test_disabled_for_test_validates_then_stops() {
    let ktls = Ktls::disabled_for_test();
    let (mut conn, _peer) = TestConnection::connected(Mode::Server);

    let err = ktls.enable_send(&mut conn).unwrap_err();
    assert!(matches!(err, KtlsError::DisabledForTest));
    assert!(err.is_recoverable());
    assert!(!ktls.is_enabled(&conn, Direction::Send));

    let km: KeyMaterial = conn.generate_key_material().unwrap();
    assert!(matches!(
        ktls.set_keys(&conn, Direction::Recv, &km),
        Err(KtlsError::DisabledForTest)
    ));
}

// ====================
// 有効化
// ====================

#[test]
fn test_enable_both_directions() {
    let ktls = recording();
    let (mut conn, _peer) = TestConnection::connected(Mode::Client);
    let fd = conn.stream().as_raw_fd();

    ktls.enable_send(&mut conn).unwrap();
    ktls.enable_recv(&mut conn).unwrap();
    assert!(ktls.is_enabled(&conn, Direction::Send));
    assert!(ktls.is_enabled(&conn, Direction::Recv));

    let calls = ktls.socket_options().calls.borrow();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[0], SocketCall::Ulp(fd));
    assert_eq!(calls[2], SocketCall::Ulp(fd));

    match (&calls[1], &calls[3]) {
        (
            SocketCall::CryptoInfo { mode: tx, bytes: tx_bytes, .. },
            SocketCall::CryptoInfo { mode: rx, bytes: rx_bytes, .. },
        ) => {
            assert_eq!((*tx, *rx), (TLS_TX, TLS_RX));
            // クライアント送信はクライアント鍵、受信はサーバー鍵
            assert_eq!(&tx_bytes[12..28], &[CLIENT_KEY_BYTE; 16]);
            assert_eq!(&rx_bytes[12..28], &[SERVER_KEY_BYTE; 16]);
            assert_eq!(&tx_bytes[32..40], &1u64.to_be_bytes());
            assert_eq!(&rx_bytes[32..40], &2u64.to_be_bytes());
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn test_double_enable_issues_no_syscalls() {
    let ktls = recording();
    let (mut conn, _peer) = TestConnection::connected(Mode::Server);

    ktls.enable_send(&mut conn).unwrap();
    let before = ktls.socket_options().count();

    let err = ktls.enable_send(&mut conn).unwrap_err();
    assert!(matches!(err, KtlsError::AlreadyEnabled(Direction::Send)));
    assert_eq!(ktls.socket_options().count(), before);
    assert!(ktls.is_enabled(&conn, Direction::Send));
}

#[test]
fn test_ulp_on_non_tcp_socket_is_recoverable() {
    let ktls = Ktls::new();
    let (mut conn, _peer) = TestConnection::connected(Mode::Server);

    match ktls.enable_send(&mut conn) {
        Err(e @ KtlsError::UlpAttach(_)) => assert!(e.is_recoverable()),
        other => panic!("unexpected: {:?}", other),
    }
    assert!(!ktls.is_enabled(&conn, Direction::Send));
}

// ====================
// フォールバック
// ====================

#[test]
fn test_try_enable_falls_back_to_userspace() {
    let config = KtlsConfig {
        require_kernel_module: false,
        ..KtlsConfig::default()
    };
    let ktls = Ktls::new();
    let (mut conn, _peer) = TestConnection::connected(Mode::Client);

    assert_eq!(ktls.try_enable(&mut conn, &config), OffloadMode::Userspace);
    assert!(!ktls.is_enabled(&conn, Direction::Send));
    assert!(!ktls.is_enabled(&conn, Direction::Recv));
}

#[test]
fn test_try_enable_without_kernel_module() {
    let config = KtlsConfig::default();
    let ktls = recording().with_module_check(|| false);
    let (mut conn, _peer) = TestConnection::connected(Mode::Server);

    assert_eq!(ktls.try_enable(&mut conn, &config), OffloadMode::Userspace);
    assert_eq!(ktls.socket_options().count(), 0);
    assert!(!ktls.is_enabled(&conn, Direction::Send));

    // モジュールがあれば同じ設定で両方向が有効化される
    let ktls = recording().with_module_check(|| true);
    assert_eq!(ktls.try_enable(&mut conn, &config), OffloadMode::Full);
    assert_eq!(ktls.socket_options().count(), 4);
}

#[test]
fn test_try_enable_with_config_file() {
    let config = KtlsConfig::from_toml_str(
        r#"
[ktls]
send = true
recv = false
socket_config = "disabled_for_test"
require_kernel_module = false
"#,
    )
    .unwrap();
    let ktls = Ktls::from_config(&config);
    assert_eq!(ktls.socket_config(), SocketConfigMode::DisabledForTest);

    let (mut conn, _peer) = TestConnection::connected(Mode::Server);
    assert_eq!(ktls.try_enable(&mut conn, &config), OffloadMode::Userspace);
}

#[test]
fn test_try_enable_send_only() {
    let config = KtlsConfig {
        recv: false,
        require_kernel_module: false,
        ..KtlsConfig::default()
    };
    let ktls = recording();
    let (mut conn, _peer) = TestConnection::connected(Mode::Server);

    assert_eq!(ktls.try_enable(&mut conn, &config), OffloadMode::SendOnly);
    assert_eq!(ktls.socket_options().count(), 2);
}
