//! # 制御メッセージ (cmsg) バッファ
//!
//! kTLS はレコードタイプをペイロードとは別に `SOL_TLS` レベルの
//! 制御メッセージで受け渡します。
//!
//! `cmsghdr` 境界にアラインされたバイト配列を持ち、ヘッダーは明示的な
//! オフセットで読み書きします。エントリのレイアウトは CMSG_* マクロと同一です。
//!
//! ```text
//! | cmsghdr (align) | data | pad | cmsghdr (align) | data | pad | ...
//! ```

use std::mem;

use crate::error::KtlsError;
use crate::platform;
use crate::record::RecordType;

/// 受信バッファに格納できるエントリ数
pub const MAX_CONTROL_ENTRIES: usize = 4;

/// 受信バッファの容量 (CMSG_SPACE(sizeof(int)) * 4)
pub const CONTROL_CAPACITY: usize = cmsg_space(mem::size_of::<libc::c_int>()) * MAX_CONTROL_ENTRIES;

/// CMSG_ALIGN
#[inline]
pub const fn cmsg_align(len: usize) -> usize {
    let align = mem::size_of::<usize>();
    (len + align - 1) & !(align - 1)
}

/// ヘッダー長 (CMSG_LEN(0))
#[inline]
pub const fn cmsg_header_len() -> usize {
    cmsg_align(mem::size_of::<libc::cmsghdr>())
}

/// CMSG_LEN
#[inline]
pub const fn cmsg_len(data_len: usize) -> usize {
    cmsg_header_len() + data_len
}

/// CMSG_SPACE
#[inline]
pub const fn cmsg_space(data_len: usize) -> usize {
    cmsg_header_len() + cmsg_align(data_len)
}

#[repr(C)]
struct Arena {
    _align: [libc::cmsghdr; 0],
    bytes: [u8; CONTROL_CAPACITY],
}

/// 制御メッセージ 1 件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlEntry<'a> {
    pub level: libc::c_int,
    pub kind: libc::c_int,
    pub data: &'a [u8],
}

/// 制御メッセージバッファ
pub struct AncillaryBuffer {
    arena: Arena,
    /// 有効なバイト数 (msg_controllen)
    len: usize,
}

impl AncillaryBuffer {
    /// 送信用 (空)
    pub fn for_send() -> Self {
        AncillaryBuffer {
            arena: Arena {
                _align: [],
                bytes: [0u8; CONTROL_CAPACITY],
            },
            len: 0,
        }
    }

    /// 受信用 (全容量をカーネルに渡す)
    pub fn for_recv() -> Self {
        let mut buf = Self::for_send();
        buf.len = CONTROL_CAPACITY;
        buf
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len < cmsg_header_len()
    }

    pub fn capacity(&self) -> usize {
        CONTROL_CAPACITY
    }

    /// recvmsg が返した msg_controllen を反映
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(CONTROL_CAPACITY);
    }

    pub fn as_mut_ptr(&mut self) -> *mut libc::c_void {
        self.arena.bytes.as_mut_ptr() as *mut libc::c_void
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.arena.bytes[..self.len]
    }

    /// 送信レコードタイプを先頭 (唯一) のエントリとして書き込む
    pub fn set_record_type(&mut self, record_type: RecordType) {
        self.len = 0;
        self.encode(
            0,
            platform::SOL_TLS,
            platform::TLS_SET_RECORD_TYPE,
            &[record_type.as_u8()],
        );
        self.len = cmsg_space(1);
    }

    /// エントリを末尾に追加
    pub fn push(&mut self, level: libc::c_int, kind: libc::c_int, data: &[u8]) -> Result<(), KtlsError> {
        let offset = cmsg_align(self.len);
        let space = cmsg_space(data.len());
        if offset + space > CONTROL_CAPACITY {
            return Err(KtlsError::io(
                std::io::ErrorKind::InvalidInput,
                "control message buffer is full",
            ));
        }
        self.encode(offset, level, kind, data);
        self.len = offset + space;
        Ok(())
    }

    /// index 番目のエントリのレベルとタイプを書き換える
    ///
    /// エントリが存在しない場合は false を返します。
    pub fn set_entry_header(&mut self, index: usize, level: libc::c_int, kind: libc::c_int) -> bool {
        let offset = match self.offsets().nth(index) {
            Some(offset) => offset,
            None => return false,
        };
        let mut hdr = self.decode_header(offset);
        hdr.cmsg_level = level;
        hdr.cmsg_type = kind;
        self.write_header(offset, hdr);
        true
    }

    /// エントリを先頭から列挙
    pub fn entries(&self) -> impl Iterator<Item = ControlEntry<'_>> + '_ {
        self.offsets().map(move |offset| {
            let hdr = self.decode_header(offset);
            let start = offset + cmsg_header_len();
            let end = offset + hdr.cmsg_len as usize;
            ControlEntry {
                level: hdr.cmsg_level,
                kind: hdr.cmsg_type,
                data: &self.arena.bytes[start..end],
            }
        })
    }

    /// 受信レコードタイプを取得
    ///
    /// 全エントリを走査し、最後の (SOL_TLS, TLS_GET_RECORD_TYPE) を採用します。
    /// 該当するエントリがない場合は `InvalidData` を返します。
    pub fn record_type(&self) -> Result<RecordType, KtlsError> {
        let mut found = None;
        for entry in self.entries() {
            if entry.level == platform::SOL_TLS
                && entry.kind == platform::TLS_GET_RECORD_TYPE
                && !entry.data.is_empty()
            {
                found = Some(entry.data[0]);
            }
        }

        match found {
            Some(value) => Ok(RecordType::from_u8(value)),
            None => Err(KtlsError::io(
                std::io::ErrorKind::InvalidData,
                "missing TLS record type control message",
            )),
        }
    }

    /// SCM_RIGHTS で受け取った fd をクローズ
    ///
    /// kTLS ソケットでは届かない。UNIX ソケットで誤って受信した場合に使用します。
    pub fn close_passed_fds(&self) {
        const FD_LEN: usize = mem::size_of::<libc::c_int>();
        for entry in self.entries() {
            if entry.level != libc::SOL_SOCKET || entry.kind != libc::SCM_RIGHTS {
                continue;
            }
            for chunk in entry.data.chunks_exact(FD_LEN) {
                if let Ok(bytes) = <[u8; FD_LEN]>::try_from(chunk) {
                    unsafe {
                        libc::close(libc::c_int::from_ne_bytes(bytes));
                    }
                }
            }
        }
    }

    // ====================
    // エンコード / デコード
    // ====================

    fn offsets(&self) -> Offsets<'_> {
        Offsets { buf: self, offset: 0 }
    }

    fn decode_header(&self, offset: usize) -> libc::cmsghdr {
        debug_assert!(offset + cmsg_header_len() <= CONTROL_CAPACITY);
        unsafe {
            std::ptr::read_unaligned(self.arena.bytes.as_ptr().add(offset) as *const libc::cmsghdr)
        }
    }

    fn write_header(&mut self, offset: usize, hdr: libc::cmsghdr) {
        debug_assert!(offset + cmsg_header_len() <= CONTROL_CAPACITY);
        unsafe {
            std::ptr::write_unaligned(
                self.arena.bytes.as_mut_ptr().add(offset) as *mut libc::cmsghdr,
                hdr,
            );
        }
    }

    fn encode(&mut self, offset: usize, level: libc::c_int, kind: libc::c_int, data: &[u8]) {
        let space = cmsg_space(data.len());
        debug_assert!(offset + space <= CONTROL_CAPACITY);

        self.arena.bytes[offset..offset + space].fill(0);

        // musl ではパディングフィールドを持つため zeroed から組み立てる
        let mut hdr: libc::cmsghdr = unsafe { mem::zeroed() };
        hdr.cmsg_len = cmsg_len(data.len()) as _;
        hdr.cmsg_level = level;
        hdr.cmsg_type = kind;
        self.write_header(offset, hdr);

        let start = offset + cmsg_header_len();
        self.arena.bytes[start..start + data.len()].copy_from_slice(data);
    }
}

impl std::fmt::Debug for AncillaryBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries()).finish()
    }
}

/// CMSG_FIRSTHDR / CMSG_NXTHDR 相当
struct Offsets<'a> {
    buf: &'a AncillaryBuffer,
    offset: usize,
}

impl Iterator for Offsets<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let offset = self.offset;
        let header_len = cmsg_header_len();
        if offset + header_len > self.buf.len {
            return None;
        }

        let len = self.buf.decode_header(offset).cmsg_len as usize;
        if len < header_len || offset + len > self.buf.len {
            self.offset = self.buf.len;
            return None;
        }

        self.offset = offset + cmsg_align(len);
        Some(offset)
    }
}
