//! A small device-style server: a status page, a led endpoint behind Digest
//! authentication and an event stream ticking once per second.
//!
//! Try it with `curl -N http://127.0.0.1:8080/events`.

use ember_http::connection::Request;
use ember_web::auth::Credentials;
use ember_web::router::filter::header;
use ember_web::router::{Rewrite, get, post};
use ember_web::{EventSource, Router, Server, ServerConfig};
use http::StatusCode;
use std::time::Duration;

fn status(request: &mut Request) {
    request.send_text(StatusCode::OK, "text/html", "<h1>ember</h1><p>listen on /events</p>");
}

#[tokio::main]
async fn main() {
    let config = ServerConfig::default()
        .with_address("127.0.0.1:8080")
        .with_default_header("Access-Control-Allow-Origin", "*");

    let events = EventSource::new("/events")
        .with_max_queued_messages(config.max_queued_messages)
        .on_connect(|client| {
            if client.last_id() > 0 {
                client.send("welcome back", Some("hello"), client.last_id(), 0);
            } else {
                client.send("hello", Some("hello"), 0, 1000);
            }
        });

    let router = Router::builder()
        .rewrite(Rewrite::new("/", "/index.html"))
        .route("/index.html", get(status))
        .route(
            "/led/{id}",
            post(|request| {
                let led = request.path_arg(0).unwrap_or_default().to_string();
                let state = request.param("state").unwrap_or("off").to_string();
                request.send_text(StatusCode::OK, "text/plain", format!("led {led} {state}"));
            })
            .with_authentication(Credentials::new("admin", "admin").with_digest()),
        )
        .route("/api/*", get(|request| request.send_text(StatusCode::OK, "application/json", "{\"v\":2}")).with(header("X-Api", "2")))
        .handler(events.clone())
        .not_found(|request| request.send_text(StatusCode::NOT_FOUND, "text/plain", "nothing here"))
        .build()
        .expect("routes are valid");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        let mut id = 0_u32;
        loop {
            ticker.tick().await;
            id += 1;
            events.send(&id.to_string(), Some("tick"), id, 0);
        }
    });

    let server = Server::builder().config(config).router(router).build().expect("configuration is valid");
    if let Err(e) = server.start().await {
        eprintln!("{e}");
    }
}
