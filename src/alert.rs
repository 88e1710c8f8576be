//! # アラート受信
//!
//! kTLS 受信中に届いたアラートレコードを、ユーザー空間のアラート処理と
//! 同じ形でコネクションの受信バッファに渡します。

use crate::connection::{retrieve_fd, KtlsConnection};
use crate::error::KtlsError;
use crate::io::recv_msg;
use crate::record::{Direction, RecordType};

/// アラートメッセージ長 (level + description)
pub const ALERT_LENGTH: usize = 2;

/// アラートを 1 件受信
///
/// 受信ソケットから 2 バイトだけ読み込みます。
/// アラートであれば受信バッファに追記し、いずれの場合もレコードタイプを返します。
pub fn receive_alert<C: KtlsConnection + ?Sized>(conn: &mut C) -> Result<RecordType, KtlsError> {
    let fd = retrieve_fd(&*conn, Direction::Recv)?;

    let mut alert = [0u8; ALERT_LENGTH];
    let (n, record_type) = match recv_msg(fd, &mut alert) {
        Ok(received) => received,
        Err(KtlsError::Closed) => {
            conn.mark_read_closed();
            return Err(KtlsError::Closed);
        }
        Err(e) => return Err(e),
    };

    if record_type == RecordType::Alert {
        intercept_alert(conn, &alert[..n], record_type)?;
    }
    Ok(record_type)
}

/// 受信したレコードをタイプに応じて振り分ける
///
/// 戻り値は呼び出し側に報告するバイト数です。
pub(crate) fn intercept_alert<C: KtlsConnection + ?Sized>(
    conn: &mut C,
    data: &[u8],
    record_type: RecordType,
) -> Result<usize, KtlsError> {
    match record_type {
        RecordType::Alert => {
            if data.len() < ALERT_LENGTH {
                return Err(KtlsError::io(
                    std::io::ErrorKind::UnexpectedEof,
                    "short alert record",
                ));
            }
            ftlog::debug!("kTLS: alert received (level={}, description={})", data[0], data[1]);
            conn.append_incoming(&data[..ALERT_LENGTH])?;
            Ok(data.len())
        }
        RecordType::Handshake => {
            // TLS 1.2 の kTLS では再ネゴシエーションを扱わない
            ftlog::debug!("kTLS: ignoring {} byte handshake record", data.len());
            Ok(0)
        }
        _ => Ok(data.len()),
    }
}
