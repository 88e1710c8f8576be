//! テスト用共通ヘルパーモジュール
//!
//! ハンドシェイク済みの TLS 1.2 コネクションを模した `TestConnection` と、
//! カーネルの代わりに UnixStream ペアを使うソケットを提供します。

#![allow(dead_code)]

use std::cell::RefCell;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

use zerocopy_ktls::{
    CipherInfo, CryptoInfo, Direction, KeyMaterial, KtlsConnection, KtlsError, KtlsState, Mode,
    PeerSecrets, ProtocolVersion, SocketIo, SocketOptions,
};

/// クライアント鍵の値
pub const CLIENT_KEY_BYTE: u8 = 0x11;
/// サーバー鍵の値
pub const SERVER_KEY_BYTE: u8 = 0x22;

/// ハンドシェイク済みコネクション
pub struct TestConnection {
    pub mode: Mode,
    pub handshake_complete: bool,
    pub version: Option<ProtocolVersion>,
    pub cipher: Option<CipherInfo>,
    pub client: PeerSecrets,
    pub server: PeerSecrets,
    pub stream: Option<UnixStream>,
    pub custom_io: bool,
    pub incoming: Vec<u8>,
    pub read_closed: bool,
    state: KtlsState,
}

impl TestConnection {
    /// ソケットなしのコネクション
    pub fn established(mode: Mode) -> Self {
        TestConnection {
            mode,
            handshake_complete: true,
            version: Some(ProtocolVersion::TLSv1_2),
            cipher: Some(CipherInfo::AES_128_GCM),
            client: PeerSecrets::new([0xC1; 12], 1),
            server: PeerSecrets::new([0x5E; 12], 2),
            stream: None,
            custom_io: false,
            incoming: Vec::new(),
            read_closed: false,
            state: KtlsState::new(),
        }
    }

    /// UnixStream ペアの片側を持つコネクションと、ピア側のストリーム
    pub fn connected(mode: Mode) -> (Self, UnixStream) {
        let (local, peer) = UnixStream::pair().unwrap();
        let mut conn = Self::established(mode);
        conn.stream = Some(local);
        (conn, peer)
    }

    pub fn stream(&self) -> &UnixStream {
        self.stream.as_ref().unwrap()
    }
}

impl KtlsConnection for TestConnection {
    fn mode(&self) -> Mode {
        self.mode
    }

    fn is_handshake_complete(&self) -> bool {
        self.handshake_complete
    }

    fn actual_protocol_version(&self) -> Option<ProtocolVersion> {
        self.version
    }

    fn negotiated_cipher(&self) -> Option<CipherInfo> {
        self.cipher
    }

    fn peer_secrets(&self, peer: Mode) -> Option<&PeerSecrets> {
        Some(match peer {
            Mode::Client => &self.client,
            Mode::Server => &self.server,
        })
    }

    fn socket_io(&self, _direction: Direction) -> Option<SocketIo> {
        let fd = self.stream.as_ref()?.as_raw_fd();
        Some(if self.custom_io {
            SocketIo::custom(fd)
        } else {
            SocketIo::managed(fd)
        })
    }

    fn generate_key_material(&self) -> Result<KeyMaterial, KtlsError> {
        let cipher = self.cipher.ok_or(KtlsError::HandshakeNotComplete)?;
        let mut km = KeyMaterial::new(&cipher);
        let key_len = cipher.key_len;
        let block = km.key_block_mut();
        block[..key_len].fill(CLIENT_KEY_BYTE);
        block[key_len..2 * key_len].fill(SERVER_KEY_BYTE);
        Ok(km)
    }

    fn ktls_state(&self) -> &KtlsState {
        &self.state
    }

    fn ktls_state_mut(&mut self) -> &mut KtlsState {
        &mut self.state
    }

    fn append_incoming(&mut self, data: &[u8]) -> Result<(), KtlsError> {
        self.incoming.extend_from_slice(data);
        Ok(())
    }

    fn mark_read_closed(&mut self) {
        self.read_closed = true;
    }
}

/// SCM_RIGHTS 付きで送信
///
/// SOL_SOCKET の制御メッセージは AF_UNIX でも受信側に届くため、
/// レコードタイプ以外の制御データを受け取った場合の確認に使用します。
pub fn send_with_fds(stream: &UnixStream, payload: &[u8], fds: &[RawFd]) -> io::Result<usize> {
    let data_len = std::mem::size_of_val(fds);
    let space = unsafe { libc::CMSG_SPACE(data_len as u32) } as usize;
    // cmsghdr のアラインメントを満たすため u64 で確保
    let mut control = vec![0u64; (space + 7) / 8];

    let mut iov = libc::iovec {
        iov_base: payload.as_ptr() as *mut libc::c_void,
        iov_len: payload.len(),
    };
    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = control.as_mut_ptr() as *mut libc::c_void;
    msg.msg_controllen = space as _;

    unsafe {
        let cmsg = libc::CMSG_FIRSTHDR(&msg);
        (*cmsg).cmsg_level = libc::SOL_SOCKET;
        (*cmsg).cmsg_type = libc::SCM_RIGHTS;
        (*cmsg).cmsg_len = libc::CMSG_LEN(data_len as u32) as _;
        std::ptr::copy_nonoverlapping(
            fds.as_ptr() as *const u8,
            libc::CMSG_DATA(cmsg),
            data_len,
        );
    }

    let result = unsafe { libc::sendmsg(stream.as_raw_fd(), &msg, 0) };
    if result < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(result as usize)
}

/// 発行されたソケットオプション
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketCall {
    Ulp(RawFd),
    CryptoInfo {
        fd: RawFd,
        mode: libc::c_int,
        bytes: Vec<u8>,
    },
}

/// setsockopt を発行せずに記録する
#[derive(Default)]
pub struct RecordingSocketOptions {
    pub calls: RefCell<Vec<SocketCall>>,
}

impl RecordingSocketOptions {
    pub fn count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl SocketOptions for RecordingSocketOptions {
    fn attach_ulp(&self, fd: RawFd) -> io::Result<()> {
        self.calls.borrow_mut().push(SocketCall::Ulp(fd));
        Ok(())
    }

    fn set_crypto_info(&self, fd: RawFd, mode: libc::c_int, info: &CryptoInfo) -> io::Result<()> {
        self.calls.borrow_mut().push(SocketCall::CryptoInfo {
            fd,
            mode,
            bytes: info.as_bytes().to_vec(),
        });
        Ok(())
    }
}
