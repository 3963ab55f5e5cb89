use actix_http::Request;
use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::{test, web, App, Error};
use serde_json::{json, Value};
use uuid::Uuid;

use estate_backend::config::Config;
use estate_backend::state::AppState;
use estate_backend::{db, routes};

async fn test_state() -> web::Data<AppState> {
    let dir = std::env::temp_dir().join(format!("estate-test-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create test dir");
    let database_url = format!("sqlite://{}", dir.join("test.db").display());
    let pool = db::init_pool(&database_url).await.expect("init pool");
    let config = Config {
        port: 0,
        database_url,
        access_token_secret: "test-access-secret".to_string(),
        refresh_token_secret: "test-refresh-secret".to_string(),
        access_token_ttl_minutes: 15,
        refresh_token_ttl_days: 7,
        upload_dir: dir.join("uploads").display().to_string(),
        max_upload_bytes: 1024 * 1024,
        storage_api_url: None,
        storage_api_key: None,
    };
    web::Data::new(AppState::new(pool, config))
}

fn registration(email: &str) -> Value {
    json!({
        "email": email,
        "password": "secret1",
        "first_name": "Nino",
        "last_name": "Beridze",
        "age": 30,
        "address": "Rustaveli Ave 12, Tbilisi"
    })
}

async fn register_user<S, B>(app: &S, email: &str) -> Value
where
    S: Service<Request, Response = ServiceResponse<B>, Error = Error>,
    B: MessageBody,
    B::Error: std::fmt::Debug,
{
    let req = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(registration(email))
        .to_request();
    let resp = test::call_service(app, req).await;
    assert_eq!(resp.status(), 201);
    test::read_body_json(resp).await
}

fn multipart_body(
    boundary: &str,
    fields: &[(&str, &str)],
    files: &[(&str, &str, &str, &[u8])],
) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                boundary, name, value
            )
            .as_bytes(),
        );
    }
    for (name, filename, content_type, data) in files {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                boundary, name, filename, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}

async fn create_flat<S, B>(app: &S, token: &str) -> Value
where
    S: Service<Request, Response = ServiceResponse<B>, Error = Error>,
    B: MessageBody,
    B::Error: std::fmt::Debug,
{
    let boundary = "test-boundary";
    let body = multipart_body(
        boundary,
        &[
            ("square", "50"),
            ("price", "1000"),
            ("street", "Chavchavadze Ave 1"),
            ("city", "Tbilisi"),
        ],
        &[("image", "front.png", "image/png", b"png-bytes")],
    );
    let req = test::TestRequest::post()
        .uri("/flats")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .insert_header((
            "Content-Type",
            format!("multipart/form-data; boundary={}", boundary),
        ))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(app, req).await;
    assert_eq!(resp.status(), 201);
    test::read_body_json(resp).await
}

#[actix_web::test]
async fn register_login_refresh_flow() {
    let state = test_state().await;
    let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

    let created = register_user(&app, "nino@example.ge").await;
    assert!(created["access_token"].as_str().is_some());
    assert!(created["refresh_token"].as_str().is_some());
    assert_eq!(created["user"]["email"], "nino@example.ge");
    // password never serialized outward
    assert!(created["user"].get("password").is_none());

    // duplicate email is a conflict
    let req = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(registration("nino@example.ge"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);

    let req = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "email": "Nino@Example.GE", "password": "secret1" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    let refresh_token = body["refresh_token"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "email": "nino@example.ge", "password": "wrong-pass" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::post()
        .uri("/auth/refresh")
        .set_json(json!({ "refresh_token": refresh_token }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["access_token"].as_str().is_some());

    let req = test::TestRequest::post()
        .uri("/auth/refresh")
        .set_json(json!({ "refresh_token": "garbage" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn register_collects_all_violations() {
    let state = test_state().await;
    let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

    let req = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({ "email": "bad", "age": 200, "password": "short" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    let errors = body["errors"].as_array().unwrap();
    let joined = errors
        .iter()
        .filter_map(|e| e.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    assert!(joined.contains("valid address"), "{}", joined);
    assert!(joined.contains("between 0 and 150"), "{}", joined);
    assert!(joined.contains("at least 6"), "{}", joined);
}

#[actix_web::test]
async fn user_routes_require_bearer_token() {
    let state = test_state().await;
    let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

    let req = test::TestRequest::get().uri("/users").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let created = register_user(&app, "auth@example.ge").await;
    let token = created["access_token"].as_str().unwrap();
    let req = test::TestRequest::get()
        .uri("/users")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["users"].as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn user_patch_is_allow_listed() {
    let state = test_state().await;
    let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

    let created = register_user(&app, "patch@example.ge").await;
    let token = created["access_token"].as_str().unwrap().to_string();
    let user_id = created["user"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::patch()
        .uri(&format!("/users/{}", user_id))
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(json!({
            "first_name": "Tamar",
            "flat_ids": ["injected-flat"],
            "id": "injected-id",
            "created_at": "1999-01-01"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri(&format!("/users/{}", user_id))
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["first_name"], "Tamar");
    assert_eq!(body["id"], user_id.as_str());
    assert_eq!(body["flat_ids"].as_array().unwrap().len(), 0);
    assert_ne!(body["created_at"], "1999-01-01");
}

#[actix_web::test]
async fn flat_image_lifecycle() {
    let state = test_state().await;
    let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

    let created = register_user(&app, "owner@example.ge").await;
    let token = created["access_token"].as_str().unwrap().to_string();

    let flat = create_flat(&app, &token).await;
    assert_eq!(flat["square"], json!(50.0));
    assert_eq!(flat["price"], json!(1000.0));
    assert_eq!(flat["currency"], "GEL");
    assert_eq!(flat["street"], "Chavchavadze Ave 1");
    let images = flat["images"].as_array().unwrap();
    assert_eq!(images.len(), 1);
    let image = &images[0];
    assert_eq!(image["backend"], "local");
    assert!(image["id"].as_str().is_some());
    let image_url = image["url"].as_str().unwrap().to_string();
    assert!(image_url.starts_with("/uploads/"));

    // stored bytes are served back
    let req = test::TestRequest::get().uri(&image_url).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let bytes = test::read_body(resp).await;
    assert_eq!(&bytes[..], b"png-bytes");

    // append two more concurrently uploaded images
    let flat_id = flat["id"].as_str().unwrap().to_string();
    let boundary = "append-boundary";
    let body = multipart_body(
        boundary,
        &[],
        &[
            ("image", "a.jpg", "image/jpeg", b"jpeg-a"),
            ("image", "b.jpg", "image/jpeg", b"jpeg-b"),
        ],
    );
    let req = test::TestRequest::post()
        .uri(&format!("/flats/{}/images", flat_id))
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .insert_header((
            "Content-Type",
            format!("multipart/form-data; boundary={}", boundary),
        ))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["images"].as_array().unwrap().len(), 3);

    // removing the initial image leaves the other two
    let image_id = image["id"].as_str().unwrap();
    let req = test::TestRequest::delete()
        .uri(&format!("/flats/{}/images/{}", flat_id, image_id))
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["images"].as_array().unwrap().len(), 2);

    // and a second delete of the same image is a 404
    let req = test::TestRequest::delete()
        .uri(&format!("/flats/{}/images/{}", flat_id, image_id))
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn flat_create_and_delete_single_image() {
    let state = test_state().await;
    let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

    let created = register_user(&app, "single@example.ge").await;
    let token = created["access_token"].as_str().unwrap().to_string();

    let flat = create_flat(&app, &token).await;
    let flat_id = flat["id"].as_str().unwrap();
    let image_id = flat["images"][0]["id"].as_str().unwrap();

    let req = test::TestRequest::delete()
        .uri(&format!("/flats/{}/images/{}", flat_id, image_id))
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["images"].as_array().unwrap().len(), 0);
}

#[actix_web::test]
async fn flat_rejects_unknown_currency_and_missing_street() {
    let state = test_state().await;
    let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

    let created = register_user(&app, "currency@example.ge").await;
    let token = created["access_token"].as_str().unwrap().to_string();

    let boundary = "bad-boundary";
    let body = multipart_body(
        boundary,
        &[("square", "50"), ("price", "1000"), ("currency", "BTC")],
        &[("image", "front.png", "image/png", b"png-bytes")],
    );
    let req = test::TestRequest::post()
        .uri("/flats")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .insert_header((
            "Content-Type",
            format!("multipart/form-data; boundary={}", boundary),
        ))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    let joined = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    assert!(joined.contains("Unsupported currency"), "{}", joined);
    assert!(joined.contains("street address"), "{}", joined);
}

#[actix_web::test]
async fn flat_patch_backfills_legacy_location() {
    let state = test_state().await;
    let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

    let created = register_user(&app, "legacy@example.ge").await;
    let token = created["access_token"].as_str().unwrap().to_string();
    let flat = create_flat(&app, &token).await;
    let flat_id = flat["id"].as_str().unwrap();

    let req = test::TestRequest::patch()
        .uri(&format!("/flats/{}", flat_id))
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(json!({ "location": "Old Street 5", "currency": "usd" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["street"], "Old Street 5");
    assert_eq!(body["currency"], "USD");
}

#[actix_web::test]
async fn assigning_a_flat_twice_is_rejected() {
    let state = test_state().await;
    let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

    let created = register_user(&app, "assignee@example.ge").await;
    let token = created["access_token"].as_str().unwrap().to_string();
    let user_id = created["user"]["id"].as_str().unwrap().to_string();
    let flat = create_flat(&app, &token).await;
    let flat_id = flat["id"].as_str().unwrap().to_string();

    let assign = json!({ "user_id": user_id, "flat_id": flat_id });
    let req = test::TestRequest::post()
        .uri("/assign-flat")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(&assign)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::post()
        .uri("/assign-flat")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(&assign)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // no duplicate join record, and the flat is populated on the user
    let join_count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(1) FROM user_flats WHERE user_id = ?")
            .bind(&user_id)
            .fetch_one(&state.pool)
            .await
            .unwrap();
    assert_eq!(join_count, 1);

    let req = test::TestRequest::get()
        .uri(&format!("/users/{}", user_id))
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["flat_ids"].as_array().unwrap().len(), 1);
    assert_eq!(body["flats"].as_array().unwrap().len(), 1);
    assert_eq!(body["flats"][0]["id"], flat_id.as_str());
}

#[actix_web::test]
async fn question_lifecycle_and_duplicate_language() {
    let state = test_state().await;
    let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

    let created = register_user(&app, "faq@example.ge").await;
    let token = created["access_token"].as_str().unwrap().to_string();

    // duplicate language id is rejected even with otherwise valid entries
    let req = test::TestRequest::post()
        .uri("/questions")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(json!({
            "question_id": 7,
            "translations": [
                { "language_id": 1, "question": "q", "answer": "a" },
                { "language_id": "1", "question": "q2", "answer": "a2" }
            ]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::post()
        .uri("/questions")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(json!({
            "question_id": 7,
            "category_id": 2,
            "translations": [
                { "language_id": 1, "question": "რა ღირს?", "answer": "დამოკიდებულია" },
                { "language_id": 2, "question": "How much?", "answer": "It depends" }
            ]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let question: Value = test::read_body_json(resp).await;
    let question_id = question["id"].as_str().unwrap().to_string();
    assert_eq!(question["active"], json!(true));
    assert_eq!(question["translations"].as_array().unwrap().len(), 2);

    // reads are public
    let req = test::TestRequest::get()
        .uri(&format!("/questions/{}", question_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    // change-status with no body toggles
    let req = test::TestRequest::post()
        .uri(&format!("/questions/change-status/{}", question_id))
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["active"], json!(false));

    // and with an explicit value sets it
    let req = test::TestRequest::post()
        .uri(&format!("/questions/change-status/{}", question_id))
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(json!({ "active": true }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["active"], json!(true));
}

#[actix_web::test]
async fn product_crud() {
    let state = test_state().await;
    let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

    let created = register_user(&app, "shop@example.ge").await;
    let token = created["access_token"].as_str().unwrap().to_string();

    // price is required
    let req = test::TestRequest::post()
        .uri("/products")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(json!({ "name": "Lamp" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::post()
        .uri("/products")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(json!({ "name": "Lamp", "price": 45.5 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let product: Value = test::read_body_json(resp).await;
    let product_id = product["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::patch()
        .uri(&format!("/products/{}", product_id))
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(json!({ "name": "Desk lamp" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["name"], "Desk lamp");
    assert_eq!(body["price"], json!(45.5));

    // list is public
    let req = test::TestRequest::get().uri("/products").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::delete()
        .uri(&format!("/products/{}", product_id))
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri(&format!("/products/{}", product_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn info_card_unique_id_and_patch() {
    let state = test_state().await;
    let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

    let created = register_user(&app, "cards@example.ge").await;
    let token = created["access_token"].as_str().unwrap().to_string();

    let card = json!({
        "info_card_id": 42,
        "category_ids": [1, 2],
        "details": [
            { "language_id": 1, "title": "სათაური" },
            { "language_id": 2, "title": "Title", "subtitle": "Sub" }
        ]
    });
    let req = test::TestRequest::post()
        .uri("/users/info-card")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(&card)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let body: Value = test::read_body_json(resp).await;
    let card_id = body["id"].as_str().unwrap().to_string();
    assert_eq!(body["details"].as_array().unwrap().len(), 2);

    // the business id is globally unique
    let req = test::TestRequest::post()
        .uri("/users/info-card")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(&card)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);

    // patch is allow-listed: info_card_id cannot be overwritten
    let req = test::TestRequest::patch()
        .uri(&format!("/users/info-card/{}", card_id))
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(json!({ "active": false, "info_card_id": 999 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["active"], json!(false));
    assert_eq!(body["info_card_id"], json!(42));
}
