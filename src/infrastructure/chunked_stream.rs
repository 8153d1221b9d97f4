// Chunked snapshot streaming - length-prefixed JSON frames
use crate::domain::view_state::ViewState;
use crate::infrastructure::http_response::brotli_compress;
use axum::{
    body::Body,
    http::{header, Response, StatusCode},
    response::IntoResponse,
};
use bytes::{BufMut, Bytes, BytesMut};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::watch;

/// Create a chunked streaming response, one frame per stream item.
pub fn chunked_json_stream<S, T>(stream: S, compress: bool) -> Result<Response<Body>, StatusCode>
where
    S: Stream<Item = T> + Send + 'static,
    T: Serialize + Send + 'static,
{
    let byte_stream = stream.then(move |item| async move { serialize_chunk(item, compress).await });

    // Frames are compressed individually, so no Content-Encoding header.
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::TRANSFER_ENCODING, "chunked")
        .body(Body::from_stream(byte_stream))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// 4-byte big-endian length followed by the (optionally compressed) JSON.
pub async fn serialize_chunk<T: Serialize>(item: T, compress: bool) -> Result<Bytes, std::io::Error> {
    let json = serde_json::to_vec(&item)?;
    let payload = if compress {
        brotli_compress(json).await?
    } else {
        json
    };

    let mut chunk = BytesMut::with_capacity(4 + payload.len());
    chunk.put_u32(payload.len() as u32);
    chunk.put_slice(&payload);
    Ok(chunk.freeze())
}

/// Yields the current snapshot, then one snapshot per published revision.
/// Ends after the snapshot marking the view as unmounted.
pub fn snapshots(mut rx: watch::Receiver<ViewState>) -> impl Stream<Item = ViewState> {
    async_stream::stream! {
        loop {
            let snapshot = rx.borrow_and_update().clone();
            let done = snapshot.cancelled;
            yield snapshot;
            if done || rx.changed().await.is_err() {
                break;
            }
        }
    }
}

pub fn stream_from_watch(rx: watch::Receiver<ViewState>, compress: bool) -> impl IntoResponse {
    match chunked_json_stream(snapshots(rx), compress) {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::layout_policy::initial_slot;
    use crate::domain::sample::ViewKind;

    #[tokio::test]
    async fn test_chunk_is_length_prefixed() {
        let chunk = serialize_chunk(vec!["COM1", "COM3"], false).await.unwrap();
        let body = br#"["COM1","COM3"]"#;
        assert_eq!(&chunk[..4], &(body.len() as u32).to_be_bytes());
        assert_eq!(&chunk[4..], body);
    }

    #[tokio::test]
    async fn test_stream_accepts_items_that_are_not_sync() {
        let items = futures::stream::iter(vec![std::cell::Cell::new(7u8)]);
        let response = chunked_json_stream(items, false).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stream_ends_after_unmount() {
        let kind = ViewKind::Tabular;
        let (tx, rx) = watch::channel(ViewState::new(kind, initial_slot(kind)));
        let mut stream = Box::pin(snapshots(rx));

        assert_eq!(stream.next().await.unwrap().revision, 0);

        tx.send_modify(|state| state.revision = 1);
        assert_eq!(stream.next().await.unwrap().revision, 1);

        tx.send_modify(|state| state.cancelled = true);
        assert!(stream.next().await.unwrap().cancelled);
        assert!(stream.next().await.is_none());
    }
}
