//! End-to-end pipeline tests against mock storage, registry, store, and summary
//! services.
//!
//! All four collaborators are served by one `httpmock` server, distinguished by path:
//! storage objects under `/<bucket>/<key>`, the registry at `/patients`, the letter
//! store at `/letters`, and the summary provider at `/v1/messages`. Tests share the
//! server and keep their mocks disjoint through unique buckets, keys, and identifiers.

use httpmock::{
    Method::{GET, PATCH, POST},
    MockServer,
};
use letterflow::{event::UploadEvent, pipeline::PipelineService};
use serde_json::json;
use tokio::sync::OnceCell;

static SERVER: OnceCell<&'static MockServer> = OnceCell::const_new();

fn set_env(key: &str, value: &str) {
    // SAFETY: Tests run in a single process and establish deterministic configuration upfront.
    unsafe { std::env::set_var(key, value) }
}

async fn harness() -> &'static MockServer {
    SERVER
        .get_or_init(|| async {
            let server: &'static MockServer = Box::leak(Box::new(MockServer::start_async().await));
            let base_url = server.base_url();

            set_env("STORAGE_REGION", "us-east-1");
            set_env("STORAGE_ENDPOINT", &base_url);
            set_env("AWS_ACCESS_KEY_ID", "test-access-key");
            set_env("AWS_SECRET_ACCESS_KEY", "test-secret-key");
            set_env("REGISTRY_URL", &base_url);
            set_env("REGISTRY_API_KEY", "registry-key");
            set_env("LETTER_STORE_URL", &base_url);
            set_env("LETTER_STORE_API_KEY", "store-key");
            set_env("SUMMARY_API_URL", &base_url);
            set_env("SUMMARY_API_KEY", "summary-key");
            set_env("SUMMARY_MODEL", "test-model");

            letterflow::config::init_config();
            server
        })
        .await
}

/// Minimal single-page PDF whose extractable text is `text`.
///
/// Builds the body first, then an xref table with correct byte offsets so the PDF
/// decoder can parse it. `text` must not contain parentheses or backslashes.
fn letter_pdf(text: &str) -> Vec<u8> {
    let stream = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET\n");
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{stream}endstream endobj\n",
            stream.len()
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{xref_start}\n").as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn event_for(bucket: &str, keys: &[&str]) -> UploadEvent {
    let records: Vec<_> = keys
        .iter()
        .map(|key| {
            json!({
                "s3": {
                    "bucket": { "name": bucket },
                    "object": { "key": key }
                }
            })
        })
        .collect();
    serde_json::from_value(json!({ "Records": records })).expect("event payload")
}

#[tokio::test]
async fn letter_with_registered_patient_completes() {
    let server = harness().await;
    let key = "uploads/ok-1/letter.pdf";

    let storage_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/letters-ok/uploads/ok-1/letter.pdf");
            then.status(200)
                .body(letter_pdf("Patient NHS Number: 943 476 5919. Marker OKONE"));
        })
        .await;
    let registry_mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/patients")
                .query_param("select", "id")
                .query_param("identifier", "eq.9434765919");
            then.status(200).json_body(json!([{ "id": "patient-ok" }]));
        })
        .await;
    let summary_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/messages")
                .header("x-api-key", "summary-key")
                .body_contains("OKONE");
            then.status(200).json_body(json!({
                "content": [ { "type": "text", "text": "Summary OKONE" } ]
            }));
        })
        .await;
    let processing_mock = server
        .mock_async(|when, then| {
            when.method(PATCH)
                .path("/letters")
                .query_param("storage_key", format!("eq.{key}"))
                .json_body_partial(r#"{ "status": "PROCESSING" }"#);
            then.status(200).json_body(json!([{ "storage_key": key }]));
        })
        .await;
    let complete_mock = server
        .mock_async(|when, then| {
            when.method(PATCH)
                .path("/letters")
                .query_param("storage_key", format!("eq.{key}"))
                .json_body_partial(
                    r#"{ "status": "COMPLETE", "summary": "Summary OKONE", "patient_id": "patient-ok" }"#,
                );
            then.status(200).json_body(json!([{ "storage_key": key }]));
        })
        .await;

    let service = PipelineService::new().expect("service");
    let outcome = service.process_event(event_for("letters-ok", &[key])).await;

    assert_eq!(outcome.processed, 1);
    assert_eq!(outcome.failed, 0);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].storage_key, key);
    assert!(outcome.results[0].error.is_none());

    storage_mock.assert_async().await;
    registry_mock.assert_async().await;
    summary_mock.assert_async().await;
    processing_mock.assert_async().await;
    complete_mock.assert_async().await;
}

#[tokio::test]
async fn letter_without_identifier_is_marked_error() {
    let server = harness().await;
    let key = "uploads/noid-1/letter.pdf";

    let storage_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/letters-noid/uploads/noid-1/letter.pdf");
            then.status(200)
                .body(letter_pdf("Dear colleague, no reference number enclosed."));
        })
        .await;
    let processing_mock = server
        .mock_async(|when, then| {
            when.method(PATCH)
                .path("/letters")
                .query_param("storage_key", format!("eq.{key}"))
                .json_body_partial(r#"{ "status": "PROCESSING" }"#);
            then.status(200).json_body(json!([{ "storage_key": key }]));
        })
        .await;
    let error_mock = server
        .mock_async(|when, then| {
            when.method(PATCH)
                .path("/letters")
                .query_param("storage_key", format!("eq.{key}"))
                .json_body_partial(r#"{ "status": "ERROR" }"#);
            then.status(200).json_body(json!([{ "storage_key": key }]));
        })
        .await;

    let service = PipelineService::new().expect("service");
    let outcome = service
        .process_event(event_for("letters-noid", &[key]))
        .await;

    assert_eq!(outcome.processed, 0);
    assert_eq!(outcome.failed, 1);
    let error = outcome.results[0].error.as_deref().expect("failure reason");
    assert!(error.contains("identifier"));

    storage_mock.assert_async().await;
    processing_mock.assert_async().await;
    error_mock.assert_async().await;
}

#[tokio::test]
async fn unknown_patient_is_marked_error() {
    let server = harness().await;
    let key = "uploads/unknown-1/letter.pdf";

    let storage_mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/letters-unknown/uploads/unknown-1/letter.pdf");
            then.status(200)
                .body(letter_pdf("Patient NHS Number: 943 476 0001. Marker UNREG"));
        })
        .await;
    let registry_mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/patients")
                .query_param("identifier", "eq.9434760001");
            then.status(200).json_body(json!([]));
        })
        .await;
    let summary_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/messages").body_contains("UNREG");
            then.status(200).json_body(json!({
                "content": [ { "type": "text", "text": "Summary UNREG" } ]
            }));
        })
        .await;
    let processing_mock = server
        .mock_async(|when, then| {
            when.method(PATCH)
                .path("/letters")
                .query_param("storage_key", format!("eq.{key}"))
                .json_body_partial(r#"{ "status": "PROCESSING" }"#);
            then.status(200).json_body(json!([{ "storage_key": key }]));
        })
        .await;
    let error_mock = server
        .mock_async(|when, then| {
            when.method(PATCH)
                .path("/letters")
                .query_param("storage_key", format!("eq.{key}"))
                .json_body_partial(r#"{ "status": "ERROR" }"#);
            then.status(200).json_body(json!([{ "storage_key": key }]));
        })
        .await;

    let service = PipelineService::new().expect("service");
    let outcome = service
        .process_event(event_for("letters-unknown", &[key]))
        .await;

    assert_eq!(outcome.failed, 1);
    let error = outcome.results[0].error.as_deref().expect("failure reason");
    assert!(error.contains("9434760001"));

    storage_mock.assert_async().await;
    registry_mock.assert_async().await;
    processing_mock.assert_async().await;
    error_mock.assert_async().await;
    // Resolution failed, so no generation request was made.
    assert_eq!(summary_mock.hits_async().await, 0);
}

#[tokio::test]
async fn batch_isolates_failing_document() {
    let server = harness().await;
    let bad_key = "uploads/iso-bad.pdf";
    let good_key = "uploads/iso-good.pdf";

    server
        .mock_async(|when, then| {
            when.method(GET).path("/letters-iso/uploads/iso-bad.pdf");
            then.status(404).body("NoSuchKey");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/letters-iso/uploads/iso-good.pdf");
            then.status(200)
                .body(letter_pdf("Patient NHS Number: 943 476 0002. Marker ISOGOOD"));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/patients")
                .query_param("identifier", "eq.9434760002");
            then.status(200).json_body(json!([{ "id": "patient-iso" }]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/messages").body_contains("ISOGOOD");
            then.status(200).json_body(json!({
                "content": [ { "type": "text", "text": "Summary ISOGOOD" } ]
            }));
        })
        .await;
    for key in [bad_key, good_key] {
        server
            .mock_async(move |when, then| {
                when.method(PATCH)
                    .path("/letters")
                    .query_param("storage_key", format!("eq.{key}"))
                    .json_body_partial(r#"{ "status": "PROCESSING" }"#);
                then.status(200).json_body(json!([{ "storage_key": key }]));
            })
            .await;
    }
    let error_mock = server
        .mock_async(|when, then| {
            when.method(PATCH)
                .path("/letters")
                .query_param("storage_key", format!("eq.{bad_key}"))
                .json_body_partial(r#"{ "status": "ERROR" }"#);
            then.status(200).json_body(json!([{ "storage_key": bad_key }]));
        })
        .await;
    let complete_mock = server
        .mock_async(|when, then| {
            when.method(PATCH)
                .path("/letters")
                .query_param("storage_key", format!("eq.{good_key}"))
                .json_body_partial(r#"{ "status": "COMPLETE", "patient_id": "patient-iso" }"#);
            then.status(200).json_body(json!([{ "storage_key": good_key }]));
        })
        .await;

    let service = PipelineService::new().expect("service");
    let outcome = service
        .process_event(event_for("letters-iso", &[bad_key, good_key]))
        .await;

    assert_eq!(outcome.processed, 1);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.results[0].storage_key, bad_key);
    assert!(outcome.results[0].error.is_some());
    assert_eq!(outcome.results[1].storage_key, good_key);
    assert!(outcome.results[1].error.is_none());

    error_mock.assert_async().await;
    complete_mock.assert_async().await;
}

#[tokio::test]
async fn rerunning_the_same_event_converges() {
    let server = harness().await;
    let key = "uploads/idem-1.pdf";

    let storage_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/letters-idem/uploads/idem-1.pdf");
            then.status(200)
                .body(letter_pdf("Patient NHS Number: 943 476 0003. Marker IDEM"));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/patients")
                .query_param("identifier", "eq.9434760003");
            then.status(200).json_body(json!([{ "id": "patient-idem" }]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/messages").body_contains("IDEM");
            then.status(200).json_body(json!({
                "content": [ { "type": "text", "text": "Summary IDEM" } ]
            }));
        })
        .await;
    let processing_mock = server
        .mock_async(|when, then| {
            when.method(PATCH)
                .path("/letters")
                .query_param("storage_key", format!("eq.{key}"))
                .json_body_partial(r#"{ "status": "PROCESSING" }"#);
            then.status(200).json_body(json!([{ "storage_key": key }]));
        })
        .await;
    let complete_mock = server
        .mock_async(|when, then| {
            when.method(PATCH)
                .path("/letters")
                .query_param("storage_key", format!("eq.{key}"))
                .json_body_partial(
                    r#"{ "status": "COMPLETE", "summary": "Summary IDEM", "patient_id": "patient-idem" }"#,
                );
            then.status(200).json_body(json!([{ "storage_key": key }]));
        })
        .await;

    let service = PipelineService::new().expect("service");
    let first = service
        .process_event(event_for("letters-idem", &[key]))
        .await;
    let second = service
        .process_event(event_for("letters-idem", &[key]))
        .await;

    assert_eq!(first.processed, 1);
    assert_eq!(second.processed, 1);
    assert_eq!(first.results[0].storage_key, second.results[0].storage_key);

    // Both runs overwrite the same record; nothing accumulates.
    assert_eq!(storage_mock.hits_async().await, 2);
    assert_eq!(processing_mock.hits_async().await, 2);
    assert_eq!(complete_mock.hits_async().await, 2);

    let snapshot = service.metrics_snapshot();
    assert_eq!(snapshot.letters_completed, 2);
    assert_eq!(snapshot.letters_failed, 0);
}
