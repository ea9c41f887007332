use std::net::{SocketAddr, TcpListener};
use std::path::Path;
use std::time::Duration;

use httptest::matchers::{all_of, contains, request, url_decoded};
use httptest::responders::json_encoded;
use httptest::{Expectation, Server};
use rocket::http::{ContentType, Status};
use rocket::local::asynchronous::Client;
use rusqlite::Connection;
use secrecy::SecretString;
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use address_validator::{AppConfig, AppState, VALIDATE_PATH};

const AMPHITHEATRE: &str = "1600 Amphitheatre Parkway, Mountain View, CA, 94043";
const SWEDESFORD: &str = "54 E Swedesford Road, Malvern, PA, 19355";
const MAX_BODY_BYTES: usize = 64 * 1024;

struct Service {
    state: AppState,
    _data_dir: TempDir,
}

impl Service {
    fn db_path(&self) -> &Path {
        self.state.db_path()
    }
}

fn start_service(geocoder: &Server, port: u16) -> Service {
    let data_dir = tempdir().unwrap();
    let config = AppConfig {
        bind_address: "127.0.0.1".into(),
        port,
        max_body_bytes: MAX_BODY_BYTES,
        geocode_endpoint: geocoder.url("/maps/api/geocode/json").to_string(),
        geocode_timeout_secs: 5,
        database_dir: data_dir.path().to_path_buf(),
        database_file_name: "service.db".into(),
        google_api_key: Some(SecretString::from("test-key")),
    };
    Service {
        state: AppState::initialize(config).unwrap(),
        _data_dir: data_dir,
    }
}

async fn local_client(service: &Service) -> Client {
    Client::tracked(service.state.rocket().unwrap()).await.unwrap()
}

/// Launches the service on a free local port and waits until it accepts connections.
async fn run_server(geocoder: &Server) -> (SocketAddr, Service) {
    let address = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let service = start_service(geocoder, address.port());
    let rocket = service.state.rocket().unwrap();
    tokio::spawn(rocket.launch());

    for _ in 0..200 {
        if TcpStream::connect(address).await.is_ok() {
            return (address, service);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("server did not start on {address}");
}

/// Splits a raw HTTP/1.1 response into status and body, skipping an interim `100 Continue`.
fn split_response(raw: &str) -> (u16, String) {
    let raw = raw
        .strip_prefix("HTTP/1.1 100 Continue\r\n\r\n")
        .unwrap_or(raw);
    let (head, body) = raw.split_once("\r\n\r\n").unwrap();
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap();
    (status, body.to_string())
}

fn chunked(body: &str) -> String {
    let (first, second) = body.split_at(body.len() / 2);
    format!(
        "{:x}\r\n{first}\r\n{:x}\r\n{second}\r\n0\r\n\r\n",
        first.len(),
        second.len()
    )
}

fn expect_geocode(server: &Server, address: &'static str, response: Value) {
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/maps/api/geocode/json"),
            request::query(url_decoded(contains(("address", address)))),
        ])
        .respond_with(json_encoded(response)),
    );
}

fn located(lat: f64, lng: f64) -> Value {
    json!({
        "status": "OK",
        "results": [{ "geometry": { "location": { "lat": lat, "lng": lng } } }]
    })
}

fn sample_body() -> String {
    json!([
        {
            "address_line_one": "1600 Amphitheatre Parkway",
            "city": "Mountain View",
            "state": "CA",
            "zip_code": "94043"
        },
        {
            "address_line_one": "54 E Swedesford Road",
            "city": "Malvern",
            "state": "PA",
            "zip_code": "19355"
        }
    ])
    .to_string()
}

fn stored_rows(db_path: &Path) -> i64 {
    let conn = Connection::open(db_path).unwrap();
    conn.query_row("SELECT COUNT(*) FROM validated_addresses", [], |row| {
        row.get(0)
    })
    .unwrap()
}

#[tokio::test]
async fn validates_batch_and_serves_repeats_from_cache() {
    let geocoder = Server::run();
    expect_geocode(&geocoder, AMPHITHEATRE, located(1.0, 1.0));
    expect_geocode(&geocoder, SWEDESFORD, located(1.0, 1.0));
    let service = start_service(&geocoder, 0);
    let client = local_client(&service).await;

    let response = client
        .post(VALIDATE_PATH)
        .header(ContentType::JSON)
        .body(sample_body())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(response.content_type(), Some(ContentType::JSON));
    let results: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
    assert_eq!(
        results,
        json!([
            {
                "address_line_one": "1600 Amphitheatre Parkway",
                "city": "Mountain View",
                "state": "CA",
                "zip_code": "94043",
                "latitude": 1.0,
                "longitude": 1.0
            },
            {
                "address_line_one": "54 E Swedesford Road",
                "city": "Malvern",
                "state": "PA",
                "zip_code": "19355",
                "latitude": 1.0,
                "longitude": 1.0
            }
        ])
    );
    assert_eq!(stored_rows(service.db_path()), 2);

    // Each geocode expectation allows exactly one call; the repeat must hit the cache.
    let repeat = client
        .post(VALIDATE_PATH)
        .header(ContentType::JSON)
        .body(sample_body())
        .dispatch()
        .await;
    assert_eq!(repeat.status(), Status::Ok);
    let repeat: Value = serde_json::from_str(&repeat.into_string().await.unwrap()).unwrap();
    assert_eq!(repeat, results);
    assert_eq!(stored_rows(service.db_path()), 2);
}

#[tokio::test]
async fn unresolvable_addresses_return_error_items() {
    let geocoder = Server::run();
    expect_geocode(&geocoder, AMPHITHEATRE, located(37.4224, -122.0842));
    expect_geocode(
        &geocoder,
        SWEDESFORD,
        json!({ "status": "ZERO_RESULTS", "results": [] }),
    );
    let service = start_service(&geocoder, 0);
    let client = local_client(&service).await;

    let response = client.post(VALIDATE_PATH).body(sample_body()).dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let results: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
    assert_eq!(results[0]["latitude"], json!(37.4224));
    assert_eq!(
        results[1],
        json!({ "errorMessage": format!("Could not get info for address {SWEDESFORD}") })
    );
    assert_eq!(stored_rows(service.db_path()), 1);
}

#[tokio::test]
async fn batch_level_errors_are_bad_requests() {
    let geocoder = Server::run();
    let service = start_service(&geocoder, 0);
    let client = local_client(&service).await;

    let response = client.post(VALIDATE_PATH).dispatch().await;
    assert_eq!(response.status(), Status::BadRequest);
    assert_eq!(response.content_type(), Some(ContentType::Plain));
    assert_eq!(
        response.into_string().await.unwrap(),
        "No body found on validate address request."
    );

    let missing = json!([{ "city": "Malvern", "state": "PA" }]).to_string();
    let response = client.post(VALIDATE_PATH).body(missing).dispatch().await;
    assert_eq!(response.status(), Status::BadRequest);
    assert_eq!(
        response.into_string().await.unwrap(),
        "Missing key(s): address_line_one,zip_code"
    );
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let geocoder = Server::run();
    let service = start_service(&geocoder, 0);
    let client = local_client(&service).await;

    let response = client.get(VALIDATE_PATH).dispatch().await;
    assert_eq!(response.status(), Status::NotFound);
    assert_eq!(response.into_string().await.unwrap(), "Route not found");

    let response = client.post("/somewhere-else").body("[]").dispatch().await;
    assert_eq!(response.status(), Status::NotFound);
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let geocoder = Server::run();
    let service = start_service(&geocoder, 0);
    let client = local_client(&service).await;

    let body = format!("[\"{}\"]", "x".repeat(MAX_BODY_BYTES));
    let response = client.post(VALIDATE_PATH).body(body).dispatch().await;
    assert_eq!(response.status(), Status::PayloadTooLarge);
    assert_eq!(response.into_string().await.unwrap(), "Request body too large");
}

#[tokio::test(flavor = "multi_thread")]
async fn accepts_chunked_request_bodies() {
    let geocoder = Server::run();
    expect_geocode(&geocoder, AMPHITHEATRE, located(1.0, 1.0));
    expect_geocode(&geocoder, SWEDESFORD, located(1.0, 1.0));
    let (address, service) = run_server(&geocoder).await;

    let mut stream = TcpStream::connect(address).await.unwrap();
    let request = format!(
        "POST {VALIDATE_PATH} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n{}",
        chunked(&sample_body())
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();

    let (status, body) = split_response(&raw);
    assert_eq!(status, 200, "unexpected response: {raw}");
    let results: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(results.as_array().map(Vec::len), Some(2));
    assert_eq!(results[1]["city"], json!("Malvern"));
    assert_eq!(stored_rows(service.db_path()), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn answers_expect_continue_before_reading_the_body() {
    let geocoder = Server::run();
    let (address, _service) = run_server(&geocoder).await;

    let body = json!([{ "city": "Malvern", "state": "PA" }]).to_string();
    let mut stream = TcpStream::connect(address).await.unwrap();
    let head = format!(
        "POST {VALIDATE_PATH} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nExpect: 100-continue\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(head.as_bytes()).await.unwrap();

    let mut interim = [0u8; 64];
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut interim))
        .await
        .unwrap()
        .unwrap();
    assert!(String::from_utf8_lossy(&interim[..read]).starts_with("HTTP/1.1 100 Continue"));

    stream.write_all(body.as_bytes()).await.unwrap();
    let mut rest = String::new();
    stream.read_to_string(&mut rest).await.unwrap();
    let raw = format!("{}{rest}", String::from_utf8_lossy(&interim[..read]));

    let (status, body) = split_response(&raw);
    assert_eq!(status, 400);
    assert_eq!(body, "Missing key(s): address_line_one,zip_code");
}
