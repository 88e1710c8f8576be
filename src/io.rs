//! # kTLS レコード I/O
//!
//! 暗号化・復号はカーネルが行います。ユーザー空間は平文とレコードタイプだけを扱い、
//! レコードタイプは `sendmsg` / `recvmsg` の制御メッセージで受け渡します。
//!
//! EAGAIN はリトライせず `KtlsError::WouldBlock` として返します。

use std::io::{self, IoSlice};
use std::os::unix::io::RawFd;

use crate::alert::intercept_alert;
use crate::cmsg::AncillaryBuffer;
use crate::connection::{retrieve_fd, KtlsConnection};
use crate::error::KtlsError;
use crate::platform;
use crate::record::{BlockedStatus, Direction, RecordType};

// ====================
// コネクション単位の送受信
// ====================

/// レコードタイプを付けて送信
///
/// ハンドシェイクレコードは kTLS では送信できません。
pub fn send<C: KtlsConnection + ?Sized>(
    conn: &C,
    bufs: &[IoSlice<'_>],
    record_type: RecordType,
) -> Result<usize, KtlsError> {
    if record_type == RecordType::Handshake {
        return Err(KtlsError::Unimplemented(RecordType::Handshake));
    }

    let fd = retrieve_fd(conn, Direction::Send)?;
    send_msg(fd, record_type, bufs)
}

/// 1 レコード分を受信
///
/// 戻り値は (バイト数, レコードタイプ)。
/// アラートは受信バッファにコピーされ、ハンドシェイクレコードは 0 バイトとして報告されます。
pub fn recv<C: KtlsConnection + ?Sized>(
    conn: &mut C,
    buf: &mut [u8],
) -> Result<(usize, RecordType), KtlsError> {
    let fd = retrieve_fd(&*conn, Direction::Recv)?;

    let (n, record_type) = match recv_msg(fd, buf) {
        Ok(received) => received,
        Err(KtlsError::Closed) => {
            conn.mark_read_closed();
            return Err(KtlsError::Closed);
        }
        Err(e) => return Err(e),
    };

    let n = intercept_alert(conn, &buf[..n], record_type)?;
    Ok((n, record_type))
}

// ====================
// fd 単位の送受信
// ====================

/// sendmsg でスキャッタ書き込み
///
/// 制御メッセージは `TLS_SET_RECORD_TYPE` 1 件のみ。
pub fn send_msg(fd: RawFd, record_type: RecordType, bufs: &[IoSlice<'_>]) -> Result<usize, KtlsError> {
    if !platform::is_supported_on_platform() {
        return Err(KtlsError::UnsupportedPlatform);
    }
    if bufs.iter().all(|b| b.is_empty()) {
        return Err(KtlsError::io(io::ErrorKind::InvalidInput, "empty payload"));
    }

    let mut control = AncillaryBuffer::for_send();
    control.set_record_type(record_type);

    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    // IoSlice は iovec と ABI 互換
    msg.msg_iov = bufs.as_ptr() as *mut libc::iovec;
    msg.msg_iovlen = bufs.len() as _;
    msg.msg_control = control.as_mut_ptr();
    msg.msg_controllen = control.len() as _;

    let result = unsafe { libc::sendmsg(fd, &msg, 0) };
    if result < 0 {
        return Err(map_errno(BlockedStatus::BlockedOnWrite));
    }

    Ok(result as usize)
}

/// recvmsg で 1 回読み込み
///
/// 制御メッセージがない場合は ApplicationData とみなします。
/// kTLS ソケット向けです。SCM_RIGHTS 等の想定外の制御メッセージは受け取った fd を
/// クローズしたうえで `InvalidData` を返します。
pub fn recv_msg(fd: RawFd, buf: &mut [u8]) -> Result<(usize, RecordType), KtlsError> {
    if !platform::is_supported_on_platform() {
        return Err(KtlsError::UnsupportedPlatform);
    }
    if buf.is_empty() {
        return Err(KtlsError::io(io::ErrorKind::InvalidInput, "empty receive buffer"));
    }

    let mut control = AncillaryBuffer::for_recv();

    let mut iov = libc::iovec {
        iov_base: buf.as_mut_ptr() as *mut libc::c_void,
        iov_len: buf.len(),
    };

    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = control.as_mut_ptr();
    msg.msg_controllen = control.capacity() as _;

    let result = unsafe { libc::recvmsg(fd, &mut msg, 0) };
    if result < 0 {
        return Err(map_errno(BlockedStatus::BlockedOnRead));
    }
    if result == 0 {
        return Err(KtlsError::Closed);
    }

    control.set_len(msg.msg_controllen as usize);

    if msg.msg_flags & libc::MSG_CTRUNC != 0 {
        control.close_passed_fds();
        return Err(KtlsError::io(
            io::ErrorKind::InvalidData,
            "control message truncated",
        ));
    }

    let record_type = if control.is_empty() {
        RecordType::ApplicationData
    } else {
        control.record_type().map_err(|e| {
            control.close_passed_fds();
            e
        })?
    };

    Ok((result as usize, record_type))
}

fn map_errno(blocked: BlockedStatus) -> KtlsError {
    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::WouldBlock {
        KtlsError::WouldBlock(blocked)
    } else {
        KtlsError::Io(err)
    }
}
