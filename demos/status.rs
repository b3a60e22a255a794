//! A public status endpoint and a token-protected one.
//!
//! ```text
//! cargo run --example status
//! curl localhost:3000/status
//! curl -H 'authorization: Bearer dev-token' localhost:3000/me
//! ```

use lumen::{ApiError, BearerToken, Ctx, Server, ServerConfig};
use serde_json::json;

#[tokio::main]
async fn main() {
    let config = ServerConfig { port: 3000, debug: true, ..ServerConfig::default() };

    let server = match Server::new(config) {
        Ok(server) => server.with_auth(BearerToken::new(["dev-token"])),
        Err(e) => {
            eprintln!("cannot start: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = register(&server) {
        server.logger().tagged("demo").error_with("Endpoint rejected", json!({ "error": e.to_string() }));
        std::process::exit(1);
    }

    if let Err(e) = server.serve().await {
        eprintln!("server failed: {e}");
        std::process::exit(1);
    }
}

fn register(server: &Server) -> Result<(), lumen::ConfigError> {
    server.endpoint("status")
        .get()
        .public()
        .responds_at("/status")
        .max_requests_per_second(2)
        .controller(|ctx: Ctx| async move {
            ctx.logger().debug_with("Some data here!", json!({ "foo": 123 }));
            ctx.resolve("Hello!");
            Ok::<_, ApiError>(())
        })?;

    server.endpoint("me")
        .get()
        .responds_at("/me")
        .controller(|ctx: Ctx| async move {
            let agent = ctx.req().header("user-agent").unwrap_or("unknown").to_owned();
            ctx.resolve(json!({ "agent": agent }));
            Ok::<_, ApiError>(())
        })?;

    Ok(())
}
