use std::sync::Arc;

use weave_core::crypto::b64url_encode;
use weave_core::wire::is_fatal_code;
use weave_core::ChunkPlan;
use weave_transfer::{
    ApiResponse, HttpTransport, Phase, SerializedUploader, Transport, UploadError, UploadSource,
    Uploader,
};

use crate::infra::MockGateway;
use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Sequential uploads
// ══════════════════════════════════════════════════════════════════════════════

/// 600 KiB: the tx goes first without data, then three chunks in order.
/// The upload reports complete only after the third chunk.
#[tokio::test]
async fn test_three_chunk_upload() {
    let gw = MockGateway::start().await.unwrap();
    let data = payload(600 * KIB);
    let transport = Arc::new(gw.transport());
    let mut up =
        Uploader::new(transport, signed_tx("three", &data), data.clone(), fast_settings()).unwrap();
    assert_eq!(up.total_chunks(), 3);

    up.upload_chunk().await.unwrap();
    assert_eq!(gw.tx_posts(), 1);
    assert!(gw.inline_payload("three").is_none());
    assert!(gw.chunk_offsets().is_empty());

    for _ in 0..3 {
        assert!(!up.is_complete());
        up.upload_chunk().await.unwrap();
        assert_eq!(up.last_response_status(), 200);
    }
    assert!(up.is_complete());

    let offsets: Vec<usize> = up.plan().proofs.iter().map(|p| p.offset).collect();
    assert_eq!(gw.chunk_offsets(), offsets);
    assert!(gw.holds(up.plan()));
}

#[tokio::test]
async fn test_small_payload_posted_inline() {
    let gw = MockGateway::start().await.unwrap();
    let data = payload(40 * KIB);
    let mut up = Uploader::new(
        Arc::new(gw.transport()),
        signed_tx("small", &data),
        data.clone(),
        fast_settings(),
    )
    .unwrap();

    up.once().await.unwrap();
    assert!(up.is_complete());
    assert_eq!(gw.inline_payload("small").as_deref(), Some(&data[..]));
    assert!(gw.chunk_offsets().is_empty());
}

#[tokio::test]
async fn test_fatal_rejection_stops_upload() {
    let gw = MockGateway::start().await.unwrap();
    let data = payload(600 * KIB);
    let plan = ChunkPlan::generate(&data);
    gw.reject_offset(plan.proofs[1].offset, 400, r#"{"error":"invalid_proof"}"#);

    let mut up = Uploader::new(
        Arc::new(gw.transport()),
        signed_tx("fatal", &data),
        data.clone(),
        fast_settings(),
    )
    .unwrap();

    let err = up.once().await.unwrap_err();
    match err {
        UploadError::Fatal {
            chunk_index,
            status,
            code,
        } => {
            assert_eq!(chunk_index, 1);
            assert_eq!(status, 400);
            assert_eq!(code, "invalid_proof");
        }
        other => panic!("expected fatal error, got {other:?}"),
    }
    assert_eq!(gw.chunk_offsets().len(), 2, "no request after the fatal one");
    assert_eq!(up.phase(), Phase::Abandoned);
}

#[tokio::test]
async fn test_transient_failures_retried() {
    let gw = MockGateway::start().await.unwrap();
    gw.script_tx(&[(503, "")]);
    gw.script_chunks(&[(500, "Internal Server Error"), (429, "Too Many Requests")]);

    let data = payload(600 * KIB);
    let mut up = Uploader::new(
        Arc::new(gw.transport()),
        signed_tx("flaky", &data),
        data.clone(),
        fast_settings(),
    )
    .unwrap();

    up.once().await.unwrap();
    assert!(up.is_complete());
    assert_eq!(gw.tx_posts(), 2);
    assert_eq!(gw.chunk_offsets().len(), 5);
    assert!(gw.holds(up.plan()));
}

/// Interrupt after two chunks, serialize, drop, and resume on a new
/// client: the gateway sees every chunk exactly once.
#[tokio::test]
async fn test_resume_sends_each_chunk_once() {
    let gw = MockGateway::start().await.unwrap();
    let data = payload(5 * 256 * KIB);
    let tx = signed_tx("resume", &data);

    let json = {
        let mut up =
            Uploader::new(Arc::new(gw.transport()), tx, data.clone(), fast_settings()).unwrap();
        for _ in 0..3 {
            up.upload_chunk().await.unwrap();
        }
        assert_eq!(up.uploaded_chunks(), 2);
        up.to_serialized().to_json().unwrap()
    };

    let state = SerializedUploader::from_json(&json).unwrap();
    let mut up = Uploader::from_source(
        Arc::new(gw.transport()),
        UploadSource::ResumeFromState(state),
        data.clone(),
        fast_settings(),
    )
    .await
    .unwrap();
    up.once().await.unwrap();

    assert_eq!(gw.tx_posts(), 1);
    let mut offsets = gw.chunk_offsets();
    offsets.sort_unstable();
    offsets.dedup();
    assert_eq!(offsets.len(), 5);
    assert_eq!(gw.chunk_offsets().len(), 5);
    assert!(gw.holds(up.plan()));
}

#[tokio::test]
async fn test_resume_by_transaction_id() {
    let gw = MockGateway::start().await.unwrap();
    let data = payload(700 * KIB);
    gw.insert_tx(signed_tx("known", &data));

    let mut up = Uploader::from_source(
        Arc::new(gw.transport()),
        UploadSource::ResumeById("known".to_string()),
        data.clone(),
        fast_settings(),
    )
    .await
    .unwrap();
    assert_eq!(up.phase(), Phase::TxPosted);

    up.once().await.unwrap();
    assert_eq!(gw.tx_posts(), 0);
    assert!(gw.holds(up.plan()));

    let missing = Uploader::from_source(
        Arc::new(gw.transport()),
        UploadSource::ResumeById("missing".to_string()),
        data,
        fast_settings(),
    )
    .await
    .err()
    .expect("unknown transaction must fail");
    assert!(matches!(missing, UploadError::NotFound { status: 404, .. }));
}

/// Nothing listens on the port: failures are recorded with status -1
/// until the breaker trips.
#[tokio::test]
async fn test_unreachable_gateway_exhausts() {
    let port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let transport = HttpTransport::new(
        format!("http://127.0.0.1:{port}"),
        std::time::Duration::from_secs(2),
    )
    .unwrap();
    let data = payload(600 * KIB);
    let settings = weave_core::config::UploadSettings {
        max_consecutive_errors: 2,
        ..fast_settings()
    };
    let mut up =
        Uploader::new(Arc::new(transport), signed_tx("offline", &data), data, settings).unwrap();

    up.upload_chunk().await.unwrap();
    assert_eq!(up.last_response_status(), -1);
    assert!(
        up.last_response_error().starts_with("gateway unreachable"),
        "{}",
        up.last_response_error()
    );

    let err = up.once().await.unwrap_err();
    assert!(matches!(err, UploadError::Exhausted { errors: 2, last_status: -1, .. }));
}

/// The gateway's own proof check rejects a tampered chunk with a code the
/// client treats as fatal.
#[tokio::test]
async fn test_gateway_rejects_tampered_chunk() {
    let gw = MockGateway::start().await.unwrap();
    let data = payload(600 * KIB);
    let plan = ChunkPlan::generate(&data);
    gw.insert_tx(signed_tx("tamper", &data));
    let transport = gw.transport();

    let good = plan.payload(0, &data).unwrap();
    assert_eq!(transport.post_chunk(&good).await.unwrap().status, 200);

    let mut bytes = plan.chunk_bytes(1, &data).unwrap().to_vec();
    bytes[0] ^= 0x01;
    let mut bad = plan.payload(1, &data).unwrap();
    bad.chunk = b64url_encode(&bytes);

    let resp: ApiResponse = transport.post_chunk(&bad).await.unwrap();
    assert_eq!(resp.status, 400);
    assert!(is_fatal_code(&resp.error_code()));

    // Honest bytes and proof, but an offset that is not the chunk's last byte.
    let mut shifted = plan.payload(1, &data).unwrap();
    shifted.offset = (plan.proofs[1].offset - 1).to_string();
    let resp = transport.post_chunk(&shifted).await.unwrap();
    assert_eq!(resp.status, 400);
    assert_eq!(resp.error_code(), "invalid_proof");
}
