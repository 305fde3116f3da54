#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use actix_web::{App, HttpResponse, HttpServer, web};
use webcheck::worker::{CheckExecutor, ResultReporter, http_client_builder};
use webcheck::{CheckJob, CheckResult};

pub const FULL_PAGE: &str = r#"<!doctype html><html><head><title>Example</title>
<meta name="description" content="An example page"></head>
<body><h1>Example</h1></body></html>"#;

pub type Received = web::Data<Mutex<Vec<CheckResult>>>;

/// Serve `configure` on an ephemeral local port and return its base url.
pub fn spawn_server<F>(configure: F) -> String
where
    F: Fn(&mut web::ServiceConfig) + Send + Clone + 'static,
{
    let server = HttpServer::new(move || App::new().configure(configure.clone()))
        .workers(1)
        .disable_signals()
        .bind(("127.0.0.1", 0))
        .expect("bind stub server");
    let addr = server.addrs()[0];
    actix_web::rt::spawn(server.run());
    format!("http://{addr}")
}

/// A site answering `/` with a fully tagged html page.
pub fn spawn_target_site() -> String {
    spawn_server(|cfg| {
        cfg.route(
            "/",
            web::get().to(|| async { HttpResponse::Ok().content_type("text/html; charset=utf-8").body(FULL_PAGE) }),
        );
    })
}

async fn collect(received: Received, result: web::Json<CheckResult>) -> HttpResponse {
    received.lock().unwrap().push(result.into_inner());
    HttpResponse::Ok().finish()
}

/// A backend recording every submitted result.
pub fn spawn_backend() -> (String, Received) {
    let received: Received = web::Data::new(Mutex::new(Vec::new()));
    let shared = received.clone();
    let url = spawn_server(move |cfg| {
        cfg.app_data(shared.clone()).route("/api/worker/check-result", web::post().to(collect));
    });
    (url, received)
}

pub fn client() -> reqwest::Client {
    http_client_builder().no_proxy().build().unwrap()
}

pub fn executor() -> CheckExecutor {
    CheckExecutor::http(client())
}

pub fn reporter(backend_url: &str) -> ResultReporter {
    ResultReporter::new(client(), backend_url, Duration::from_secs(5)).unwrap()
}

pub fn job(site_id: i64, url: String, timeout: u64) -> CheckJob {
    CheckJob { site_id, user_id: format!("user-{site_id}"), url, timeout }
}

/// Wait until the backend holds `count` results or give up after a few seconds.
pub async fn wait_for_results(received: &Received, count: usize) -> Vec<CheckResult> {
    for _ in 0..100 {
        let results = received.lock().unwrap().clone();
        if results.len() >= count {
            return results;
        }
        actix_web::rt::time::sleep(Duration::from_millis(50)).await;
    }
    received.lock().unwrap().clone()
}
