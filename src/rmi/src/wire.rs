use dfs_lib::{DfsError, DfsResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single wire object, framed or not.
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// The single object a skeleton writes back for one exchange: either the
/// method's return value or the error the invocation raised, both as
/// self-describing JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CallReply {
    Return(Value),
    Fault(Value),
}

/// Serializes an error for the fault side of a reply.
pub fn error_value(err: &DfsError) -> Value {
    serde_json::to_value(err).unwrap_or_else(|_| Value::String(err.to_string()))
}

/// Recovers the error carried by a fault, preserving its original kind when
/// the payload is a serialized [`DfsError`].
pub fn fault_error(fault: Value) -> DfsError {
    serde_json::from_value::<DfsError>(fault.clone())
        .unwrap_or_else(|_| DfsError::Remote(format!("unrecognized fault payload: {}", fault)))
}

/// Writes one length-prefixed JSON object.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> DfsResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(value)
        .map_err(|e| DfsError::Remote(format!("marshalling failed: {}", e)))?;
    if body.len() > MAX_FRAME_LEN as usize {
        return Err(DfsError::Remote(format!(
            "wire object of {} bytes exceeds the frame limit",
            body.len()
        )));
    }
    writer
        .write_all(&(body.len() as u32).to_be_bytes())
        .await
        .map_err(|e| DfsError::Remote(format!("write failed: {}", e)))?;
    writer
        .write_all(&body)
        .await
        .map_err(|e| DfsError::Remote(format!("write failed: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| DfsError::Remote(format!("write failed: {}", e)))?;
    Ok(())
}

/// Reads one length-prefixed JSON object.
pub async fn read_frame<R, T>(reader: &mut R) -> DfsResult<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len = [0u8; 4];
    reader
        .read_exact(&mut len)
        .await
        .map_err(|e| DfsError::Remote(format!("read failed: {}", e)))?;
    let len = u32::from_be_bytes(len);
    if len > MAX_FRAME_LEN {
        return Err(DfsError::Remote(format!(
            "peer announced a wire object of {} bytes",
            len
        )));
    }
    let mut body = vec![0u8; len as usize];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| DfsError::Remote(format!("read failed: {}", e)))?;
    serde_json::from_slice(&body)
        .map_err(|e| DfsError::Remote(format!("unmarshalling failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        write_frame(&mut client, &"hello".to_string()).await.unwrap();
        write_frame(&mut client, &vec![1u32, 2, 3]).await.unwrap();

        let s: String = read_frame(&mut server).await.unwrap();
        let v: Vec<u32> = read_frame(&mut server).await.unwrap();
        assert_eq!(s, "hello");
        assert_eq!(v, vec![1, 2, 3]);
    }

    #[test]
    fn fault_payload_preserves_error_kind() {
        let original = DfsError::NotFound("/a/b".to_string());
        let recovered = fault_error(error_value(&original));
        assert_eq!(recovered, original);
    }

    #[test]
    fn unrecognized_fault_becomes_remote_error() {
        let recovered = fault_error(Value::String("garbage".to_string()));
        assert!(recovered.is_remote());
    }
}
