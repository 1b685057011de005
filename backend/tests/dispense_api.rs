use axum::http::StatusCode;
use serde_json::json;

use medidispense_backend::repositories::DispenseRepository;

#[path = "support/mod.rs"]
mod support;

#[tokio::test]
async fn direct_dispense_authorizes_and_records_in_one_step() {
    let (app, backend) = support::test_app();
    let patient = support::seed_patient(&backend, "1234567", "PAT-QR-001").await;
    let prescription = support::seed_prescription(&backend, &patient.id, 3).await;

    let (status, body) = support::post_json(
        &app,
        "/api/dispense",
        json!({ "identifier": "1234567", "identifierType": "cedula" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["dispense"]["patientId"], patient.id.as_str());
    assert_eq!(body["dispense"]["prescriptionId"], prescription.id.as_str());
    assert_eq!(body["dispense"]["status"], "successful");

    let records = backend
        .find_by_patient(&patient.id, 10)
        .await
        .expect("read records");
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn direct_dispense_denial_is_403_with_a_failed_record() {
    let (app, backend) = support::test_app();
    let patient = support::seed_patient(&backend, "1234567", "PAT-QR-001").await;
    support::seed_prescription(&backend, &patient.id, 1).await;

    // Use up the single allowed dose, then try again.
    let (status, _) = support::post_json(
        &app,
        "/api/dispense",
        json!({ "identifier": "1234567", "identifierType": "cedula" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = support::post_json(
        &app,
        "/api/dispense",
        json!({ "identifier": "1234567", "identifierType": "cedula" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Daily dose limit reached");

    let records = backend
        .find_by_patient(&patient.id, 10)
        .await
        .expect("read records");
    assert_eq!(records.len(), 2);
    assert!(records
        .iter()
        .any(|r| r.error_message.as_deref() == Some("Daily dose limit reached")));
}

#[tokio::test]
async fn direct_dispense_missing_fields_are_400() {
    let (app, _backend) = support::test_app();
    let (status, _) =
        support::post_json(&app, "/api/dispense", json!({ "identifier": "1234567" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = support::post_json(
        &app,
        "/api/dispense",
        json!({ "identifier": "1234567", "identifierType": "retina" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_patient_history_is_404() {
    let (app, _backend) = support::test_app();
    let (status, body) = support::get(&app, "/api/patient/9999999/history").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Patient not found");
}

#[tokio::test]
async fn patient_history_is_reachable_by_both_identifier_kinds() {
    let (app, backend) = support::test_app();
    let patient = support::seed_patient(&backend, "1234567", "PAT-QR-001").await;
    support::seed_prescription(&backend, &patient.id, 5).await;

    let (status, _) = support::post_json(
        &app,
        "/api/dispense",
        json!({ "identifier": "1234567", "identifierType": "cedula" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = support::get(&app, "/api/patient/1234567/history?limit=10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 1);
    assert_eq!(body["patient"]["cedula"], "1234567");
    assert_eq!(body["history"][0]["status"], "successful");

    // Lookup by scan code works too.
    let (status, _) = support::get(&app, "/api/patient/PAT-QR-001/history?type=qr").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn recent_dispenses_spans_patients() {
    let (app, backend) = support::test_app();
    let maria = support::seed_patient(&backend, "1234567", "PAT-QR-001").await;
    let carlos = support::seed_patient(&backend, "7654321", "PAT-QR-002").await;
    support::seed_prescription(&backend, &maria.id, 3).await;
    support::seed_prescription(&backend, &carlos.id, 3).await;

    for identifier in ["1234567", "7654321"] {
        let (status, _) = support::post_json(
            &app,
            "/api/dispense",
            json!({ "identifier": identifier, "identifierType": "cedula" }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = support::get(&app, "/api/dispenses/recent?limit=10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
}
